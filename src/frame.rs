//! Reading single frames from a positioned byte source.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::extended::{CodifMetadata, ExtendedData};
use crate::header::{CodifHeader, DataFormat, FrameHeader, VdifHeader};
use crate::source::ByteSource;
use crate::stream::StreamConfig;
use crate::{Error, GapPolicy, Result};

/// Extended-data or metadata block read alongside a frame header.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum FrameExtension {
    Vdif(ExtendedData),
    Codif(CodifMetadata),
}

/// One parsed frame: header, any extension block, and the owned payload
/// of exactly `frame_length - header_length` bytes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub extension: Option<FrameExtension>,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Samples per channel held by this frame.
    #[must_use]
    pub fn num_samples(&self) -> u64 {
        self.header.num_samples_per_frame()
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Frame{{format: {}, thread: {}, number: {}, payload: [len={}]}}",
            self.header.format(),
            self.header.thread_id(),
            self.header.frame_number(),
            self.payload.len()
        )
    }
}

/// Policy hook deciding whether a frame is worth buffering. Frames from
/// unselected threads are skipped, as are frames flagged invalid when the
/// gap policy is [`GapPolicy::SkipInvalid`].
#[must_use]
pub fn should_buffer(config: &StreamConfig, header: &FrameHeader) -> bool {
    if !config.thread_selected(header.thread_id()) {
        return false;
    }
    !(header.invalid() && config.gap_policy == GapPolicy::SkipInvalid)
}

fn base_header_length(format: DataFormat) -> usize {
    match format {
        DataFormat::Vdif | DataFormat::VdifLegacy => VdifHeader::BASE_LEN,
        DataFormat::Codif => CodifHeader::BASE_LEN,
    }
}

fn extension_length(format: DataFormat) -> usize {
    match format {
        DataFormat::Vdif => VdifHeader::EXTENDED_LEN,
        DataFormat::VdifLegacy => 0,
        DataFormat::Codif => CodifHeader::METADATA_LEN,
    }
}

/// Read the next frame that passes `keep`, skipping the others in place.
///
/// Returns `Ok(None)` at a clean end of source, i.e. EOF falling exactly
/// on a frame boundary. On a live source that runs dry mid-frame, any
/// bytes already consumed are pushed back before
/// [`Error::BufferExhausted`] is returned, so the caller can simply retry
/// once more data has been fed.
///
/// # Errors
/// [`Error::TruncatedHeader`] on EOF inside a header,
/// [`Error::TruncatedPayload`] on EOF inside a payload or a declared
/// frame length shorter than the header itself.
pub fn read_frame<F>(
    source: &mut dyn ByteSource,
    format: DataFormat,
    mut keep: F,
) -> Result<Option<Frame>>
where
    F: FnMut(&FrameHeader) -> bool,
{
    let base_len = base_header_length(format);
    let ext_len = extension_length(format);

    loop {
        let mut head = vec![0u8; base_len];
        let n = source.fill(&mut head)?;
        if n == 0 {
            return Ok(None);
        }
        if n < base_len {
            return Err(Error::TruncatedHeader {
                actual: n,
                minimum: base_len,
            });
        }

        let header = FrameHeader::decode(&head, format)?;
        let Some(rest_len) = header
            .frame_length_bytes()
            .checked_sub(base_len as u64)
            .filter(|rest| *rest >= ext_len as u64)
        else {
            return Err(Error::TruncatedPayload {
                actual: header.frame_length_bytes() as usize,
                expected: header.header_length_bytes() as usize,
            });
        };

        if !keep(&header) {
            match source.skip(rest_len) {
                Ok(skipped) if skipped == rest_len => {
                    trace!(
                        thread_id = header.thread_id(),
                        frame_number = header.frame_number(),
                        skipped_bytes = rest_len,
                        "skipped frame"
                    );
                    continue;
                }
                Ok(skipped) => {
                    return Err(Error::TruncatedPayload {
                        actual: skipped as usize,
                        expected: rest_len as usize,
                    })
                }
                Err(Error::BufferExhausted) => {
                    source.push(&head);
                    return Err(Error::BufferExhausted);
                }
                Err(err) => return Err(err),
            }
        }

        let mut rest = vec![0u8; rest_len as usize];
        let n = match source.fill(&mut rest) {
            Ok(n) => n,
            Err(Error::BufferExhausted) => {
                source.push(&head);
                return Err(Error::BufferExhausted);
            }
            Err(err) => return Err(err),
        };
        if n < rest.len() {
            return Err(Error::TruncatedPayload {
                actual: n,
                expected: rest.len(),
            });
        }

        let extension = match format {
            DataFormat::Vdif => Some(FrameExtension::Vdif(ExtendedData::decode(&rest)?)),
            DataFormat::VdifLegacy => None,
            DataFormat::Codif => Some(FrameExtension::Codif(CodifMetadata::decode(&rest)?)),
        };
        rest.drain(..ext_len);

        trace!(
            thread_id = header.thread_id(),
            frame_number = header.frame_number(),
            payload_bytes = rest.len(),
            "read frame"
        );
        return Ok(Some(Frame {
            header,
            extension,
            payload: rest,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::RealOrComplex;
    use crate::source::SinkSource;

    fn legacy_header(frame_number: u32, thread_id: u16, payload_len: u32) -> VdifHeader {
        VdifHeader {
            seconds_from_epoch: 100,
            legacy_mode: true,
            invalid_flag: false,
            frame_number,
            reference_epoch: 2,
            frame_length_words: (16 + payload_len) / 8,
            log2_num_channels: 0,
            version: 0,
            station_id: u16::from_be_bytes([b'T', b't']),
            thread_id,
            bits_per_sample_minus1: 1,
            data_type: RealOrComplex::Real,
        }
    }

    fn legacy_frame_bytes(frame_number: u32, thread_id: u16, payload: &[u8]) -> Vec<u8> {
        let mut bytes = legacy_header(frame_number, thread_id, payload.len() as u32).to_vec();
        bytes.extend_from_slice(payload);
        bytes
    }

    impl VdifHeader {
        fn to_vec(self) -> Vec<u8> {
            self.encode().to_vec()
        }
    }

    fn closed_sink(dat: &[u8]) -> SinkSource {
        let mut src = SinkSource::new();
        src.feed(dat);
        src.close();
        src
    }

    #[test]
    fn reads_legacy_frame_with_payload() {
        let payload = vec![0xaa; 24];
        let mut src = closed_sink(&legacy_frame_bytes(7, 3, &payload));

        let frame = read_frame(&mut src, DataFormat::VdifLegacy, |_| true)
            .unwrap()
            .unwrap();
        assert_eq!(frame.header.frame_number(), 7);
        assert_eq!(frame.header.thread_id(), 3);
        assert!(frame.extension.is_none());
        assert_eq!(frame.payload, payload);
        assert!(src.at_end());
    }

    #[test]
    fn clean_eof_is_none() {
        let mut src = closed_sink(&[]);
        let zult = read_frame(&mut src, DataFormat::VdifLegacy, |_| true).unwrap();
        assert!(zult.is_none());
    }

    #[test]
    fn eof_mid_header_is_truncated_header() {
        let bytes = legacy_frame_bytes(0, 0, &[0u8; 8]);
        let mut src = closed_sink(&bytes[..10]);
        let err = read_frame(&mut src, DataFormat::VdifLegacy, |_| true).unwrap_err();
        assert!(matches!(err, Error::TruncatedHeader { actual: 10, .. }));
    }

    #[test]
    fn eof_mid_payload_is_truncated_payload() {
        let bytes = legacy_frame_bytes(0, 0, &[0u8; 16]);
        let mut src = closed_sink(&bytes[..bytes.len() - 4]);
        let err = read_frame(&mut src, DataFormat::VdifLegacy, |_| true).unwrap_err();
        assert!(matches!(
            err,
            Error::TruncatedPayload {
                actual: 12,
                expected: 16
            }
        ));
    }

    #[test]
    fn skip_advances_by_exactly_the_frame_data_length() {
        let mut dat = legacy_frame_bytes(0, 9, &[0x11; 24]);
        dat.extend(legacy_frame_bytes(1, 2, &[0x22; 24]));
        let mut src = closed_sink(&dat);

        // skip thread 9; the reader must land exactly on the next frame
        let frame = read_frame(&mut src, DataFormat::VdifLegacy, |h| h.thread_id() == 2)
            .unwrap()
            .unwrap();
        assert_eq!(frame.header.frame_number(), 1);
        assert_eq!(frame.payload, vec![0x22; 24]);
    }

    #[test]
    fn vdif_frame_carries_extended_data() {
        let mut header = legacy_header(0, 0, 0);
        header.legacy_mode = false;
        header.frame_length_words = (32 + 16) / 8; // 16-byte extension + 16-byte payload
        let mut dat = header.to_vec();
        dat.extend_from_slice(&[0u8; 16]); // EDV None
        dat.extend_from_slice(&[0x55; 16]);
        let mut src = closed_sink(&dat);

        let frame = read_frame(&mut src, DataFormat::Vdif, |_| true)
            .unwrap()
            .unwrap();
        assert_eq!(
            frame.extension,
            Some(FrameExtension::Vdif(ExtendedData::None))
        );
        assert_eq!(frame.payload, vec![0x55; 16]);
    }

    #[test]
    fn live_source_retry_after_buffer_exhausted() {
        let payload = vec![0x77; 16];
        let bytes = legacy_frame_bytes(5, 0, &payload);

        let mut src = SinkSource::new();
        src.feed(&bytes[..20]); // header plus a sliver of payload
        let zult = read_frame(&mut src, DataFormat::VdifLegacy, |_| true);
        assert!(matches!(zult, Err(Error::BufferExhausted)));

        // feeding the remainder makes the identical call succeed
        src.feed(&bytes[20..]);
        let frame = read_frame(&mut src, DataFormat::VdifLegacy, |_| true)
            .unwrap()
            .unwrap();
        assert_eq!(frame.header.frame_number(), 5);
        assert_eq!(frame.payload, payload);
    }

    #[test]
    fn declared_length_shorter_than_header_is_rejected() {
        let mut header = legacy_header(0, 0, 0);
        header.frame_length_words = 1; // 8 bytes, less than the 16-byte header
        let mut src = closed_sink(&header.to_vec());
        let err = read_frame(&mut src, DataFormat::VdifLegacy, |_| true).unwrap_err();
        assert!(matches!(err, Error::TruncatedPayload { .. }));
    }
}
