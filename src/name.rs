//! Structured file-name convention.
//!
//! Recordings are conventionally named
//! `<experiment>_<station>_<scan>[_<aux>...].<ext>`, where each optional
//! auxiliary token is either the literal `compound` (the file holds more
//! than one data stream) or a two-letter code followed by its value:
//! `st` for a start time and `fd` for a format designator. A format
//! designator embedded this way uses `-` separators internally, e.g.
//! `m0921_Mp_264_fd8000-4-2.vdif`.

use std::path::Path;

use tracing::trace;

use crate::{Error, Result};

/// Fields recovered from a structured file name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileNameInfo {
    pub experiment: String,
    pub station: String,
    pub scan: String,
    /// Raw value of an `st` token, not interpreted further.
    pub start_time: Option<String>,
    /// Raw value of an `fd` token, parseable as a format designator.
    pub format_designator: Option<String>,
    /// Set by the literal `compound` token.
    pub compound: bool,
}

/// Parse a path's file name against the structured convention.
///
/// # Errors
/// [`Error::BadFileName`] when the name has no stem, fewer than three
/// `_`-separated fields, or an auxiliary token with an unknown prefix.
pub fn parse_structured_filename<P: AsRef<Path>>(path: P) -> Result<FileNameInfo> {
    let path = path.as_ref();
    let bad = || Error::BadFileName(path.display().to_string());

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(bad)?;

    let mut fields = stem.split('_');
    let mut info = FileNameInfo {
        experiment: fields.next().ok_or_else(bad)?.to_string(),
        station: fields.next().ok_or_else(bad)?.to_string(),
        scan: fields.next().ok_or_else(bad)?.to_string(),
        ..FileNameInfo::default()
    };
    if info.experiment.is_empty() || info.station.is_empty() || info.scan.is_empty() {
        return Err(bad());
    }

    for aux in fields {
        if aux == "compound" {
            info.compound = true;
            continue;
        }
        match (aux.get(..2), aux.get(2..)) {
            (Some("st"), Some(value)) if !value.is_empty() => {
                info.start_time = Some(value.to_string());
            }
            (Some("fd"), Some(value)) if !value.is_empty() => {
                info.format_designator = Some(value.to_string());
            }
            _ => return Err(bad()),
        }
    }

    trace!(?info, "parsed structured file name");
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_name() {
        let info = parse_structured_filename("m0921_Mp_264.vdif").unwrap();
        assert_eq!(info.experiment, "m0921");
        assert_eq!(info.station, "Mp");
        assert_eq!(info.scan, "264");
        assert!(info.start_time.is_none());
        assert!(info.format_designator.is_none());
        assert!(!info.compound);
    }

    #[test]
    fn all_auxiliary_tokens() {
        let info =
            parse_structured_filename("/data/m0921_Mp_264_st2021y091d_fd8000-4-2_compound.codif")
                .unwrap();
        assert_eq!(info.start_time.as_deref(), Some("2021y091d"));
        assert_eq!(info.format_designator.as_deref(), Some("8000-4-2"));
        assert!(info.compound);
    }

    #[test]
    fn rejects_malformed_names() {
        for name in [
            "",
            "m0921.vdif",
            "m0921_Mp.vdif",
            "m0921__264.vdif",
            "m0921_Mp_264_xx12.vdif",
            "m0921_Mp_264_st.vdif",
        ] {
            assert!(
                matches!(parse_structured_filename(name), Err(Error::BadFileName(_))),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn extension_is_ignored() {
        let a = parse_structured_filename("m0921_Mp_264.vdif").unwrap();
        let b = parse_structured_filename("m0921_Mp_264.raw").unwrap();
        assert_eq!(a, b);
    }
}
