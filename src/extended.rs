//! VDIF extended data and CODIF metadata blocks.
//!
//! Non-legacy VDIF headers carry a 16-byte extended-data area whose layout
//! is selected by the extended data version (EDV) byte in its first word.
//! CODIF headers carry a 20-byte metadata block; only the `None` variant
//! has a decoded layout, other versions are kept as raw bytes.

use serde::{Deserialize, Serialize};

use crate::header::VdifHeader;
use crate::{CodifHeader, Error, Result};

fn word(buf: &[u8], idx: usize) -> u32 {
    let i = idx * 4;
    u32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]])
}

/// VDIF extended data, tagged by EDV.
///
/// See <https://vlbi.org/vlbi-standards/vdif/> for the registered layouts.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum ExtendedData {
    /// EDV 0x00: no interpretation assigned.
    None,
    /// EDV 0x01 (NICT).
    Nict {
        sample_rate: u32,
        /// True when `sample_rate` is in MHz rather than kHz.
        unit_is_mhz: bool,
        synch_pattern: u32,
        station_name: u64,
    },
    /// EDV 0x02 (ALMA).
    Alma { synch_identifier: u32 },
    /// EDV 0x03 (NRAO).
    Nrao {
        sample_rate: u32,
        unit_is_mhz: bool,
        synch_pattern: u32,
        tuning_word: u32,
        personality_type: u8,
        minor_revision: u8,
        major_revision: u8,
        electronic_sideband: bool,
        sub_band: u8,
        intermediate_frequency: u8,
        digital_backend: u8,
    },
    /// EDV 0x04 (multiplexed / corner-turned data).
    Multiplex {
        validity_mask_length: u8,
        synch_pattern: u32,
        validity_mask: u64,
    },
    /// EDV 0xab (Haystack): layout not interpreted here.
    Haystack { words: [u32; 4] },
    /// Any EDV without a registered layout, kept raw.
    Unknown { version: u8, words: [u32; 4] },
}

impl ExtendedData {
    /// Decode a 16-byte extended-data area.
    ///
    /// # Errors
    /// [`Error::TruncatedHeader`] on short input.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < VdifHeader::EXTENDED_LEN {
            return Err(Error::TruncatedHeader {
                actual: buf.len(),
                minimum: VdifHeader::EXTENDED_LEN,
            });
        }
        let w = [word(buf, 0), word(buf, 1), word(buf, 2), word(buf, 3)];
        let version = (w[0] >> 24) as u8;
        Ok(match version {
            0x00 => ExtendedData::None,
            0x01 => ExtendedData::Nict {
                sample_rate: w[0] & 0x7f_ffff,
                unit_is_mhz: (w[0] >> 23) & 0x1 == 1,
                synch_pattern: w[1],
                station_name: u64::from(w[2]) | (u64::from(w[3]) << 32),
            },
            0x02 => ExtendedData::Alma {
                synch_identifier: w[0] & 0xff_ffff,
            },
            0x03 => ExtendedData::Nrao {
                sample_rate: w[0] & 0x7f_ffff,
                unit_is_mhz: (w[0] >> 23) & 0x1 == 1,
                synch_pattern: w[1],
                tuning_word: w[2],
                personality_type: (w[3] & 0xff) as u8,
                minor_revision: ((w[3] >> 8) & 0xf) as u8,
                major_revision: ((w[3] >> 12) & 0xf) as u8,
                electronic_sideband: (w[3] >> 16) & 0x1 == 1,
                sub_band: ((w[3] >> 17) & 0x7) as u8,
                intermediate_frequency: ((w[3] >> 20) & 0xf) as u8,
                digital_backend: ((w[3] >> 24) & 0xf) as u8,
            },
            0x04 => ExtendedData::Multiplex {
                validity_mask_length: ((w[0] >> 16) & 0xff) as u8,
                synch_pattern: w[1],
                validity_mask: u64::from(w[2]) | (u64::from(w[3]) << 32),
            },
            0xab => ExtendedData::Haystack { words: w },
            _ => ExtendedData::Unknown { version, words: w },
        })
    }

    /// The EDV byte this variant was decoded from.
    #[must_use]
    pub fn version(&self) -> u8 {
        match self {
            ExtendedData::None => 0x00,
            ExtendedData::Nict { .. } => 0x01,
            ExtendedData::Alma { .. } => 0x02,
            ExtendedData::Nrao { .. } => 0x03,
            ExtendedData::Multiplex { .. } => 0x04,
            ExtendedData::Haystack { .. } => 0xab,
            ExtendedData::Unknown { version, .. } => *version,
        }
    }
}

/// CODIF metadata block. Decoding beyond the `None` variant is an open
/// extension point; unknown versions are carried raw.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum CodifMetadata {
    None {
        synch_pattern: u32,
    },
    Unknown {
        metadata_version: u16,
        bytes: Vec<u8>,
    },
}

impl CodifMetadata {
    /// Metadata version tag for the empty variant.
    pub const VERSION_NONE: u16 = 0x0000;

    /// Decode a 20-byte metadata block.
    ///
    /// # Errors
    /// [`Error::TruncatedHeader`] on short input.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < CodifHeader::METADATA_LEN {
            return Err(Error::TruncatedHeader {
                actual: buf.len(),
                minimum: CodifHeader::METADATA_LEN,
            });
        }
        let synch_pattern = word(buf, 0);
        let metadata_version = u16::from_le_bytes([buf[4], buf[5]]);
        Ok(match metadata_version {
            Self::VERSION_NONE => CodifMetadata::None { synch_pattern },
            _ => CodifMetadata::Unknown {
                metadata_version,
                bytes: buf[..CodifHeader::METADATA_LEN].to_vec(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_edv_none() {
        let buf = [0u8; 16];
        assert_eq!(ExtendedData::decode(&buf).unwrap(), ExtendedData::None);
    }

    #[test]
    fn decode_edv_nict() {
        let mut buf = [0u8; 16];
        // word 0: sample rate 1000, MHz flag, EDV 0x01
        let w0: u32 = 1000 | (1 << 23) | (0x01 << 24);
        buf[..4].copy_from_slice(&w0.to_le_bytes());
        buf[4..8].copy_from_slice(&0xacab_feed_u32.to_le_bytes());
        buf[8..12].copy_from_slice(&0x6767_6767u32.to_le_bytes());

        let ed = ExtendedData::decode(&buf).unwrap();
        assert_eq!(
            ed,
            ExtendedData::Nict {
                sample_rate: 1000,
                unit_is_mhz: true,
                synch_pattern: 0xacab_feed,
                station_name: 0x6767_6767,
            }
        );
        assert_eq!(ed.version(), 0x01);
    }

    #[test]
    fn decode_edv_unknown_keeps_raw_words() {
        let mut buf = [0u8; 16];
        let w0: u32 = 0x99 << 24;
        buf[..4].copy_from_slice(&w0.to_le_bytes());
        let ed = ExtendedData::decode(&buf).unwrap();
        assert!(matches!(ed, ExtendedData::Unknown { version: 0x99, .. }));
    }

    #[test]
    fn decode_metadata_none() {
        let mut buf = [0u8; 20];
        buf[..4].copy_from_slice(&0xdead_beef_u32.to_le_bytes());
        assert_eq!(
            CodifMetadata::decode(&buf).unwrap(),
            CodifMetadata::None {
                synch_pattern: 0xdead_beef
            }
        );
    }

    #[test]
    fn short_blocks_are_truncated_errors() {
        assert!(matches!(
            ExtendedData::decode(&[0u8; 7]),
            Err(Error::TruncatedHeader { .. })
        ));
        assert!(matches!(
            CodifMetadata::decode(&[0u8; 19]),
            Err(Error::TruncatedHeader { .. })
        ));
    }
}
