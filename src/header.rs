//! Frame header bit-field codec.
//!
//! Headers are stored as little-endian 32-bit words with fields packed
//! LSB-first within each word, per the published VDIF specification. The
//! CODIF word layout here covers the fields exercised by the decode path;
//! see DESIGN.md for the layout decision.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Wire format of a data stream.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub enum DataFormat {
    /// VDIF with the 16-byte extended-data area (32-byte header).
    Vdif,
    /// VDIF legacy mode, header only (16 bytes).
    VdifLegacy,
    /// CODIF (64-byte header including the metadata block).
    Codif,
}

impl DataFormat {
    /// Total header length in bytes, including any extended-data or
    /// metadata block.
    #[must_use]
    pub fn header_length(&self) -> usize {
        match self {
            DataFormat::VdifLegacy => 16,
            DataFormat::Vdif => 32,
            DataFormat::Codif => 64,
        }
    }
}

impl std::fmt::Display for DataFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataFormat::Vdif => write!(f, "VDIF"),
            DataFormat::VdifLegacy => write!(f, "VDIFL"),
            DataFormat::Codif => write!(f, "CODIF"),
        }
    }
}

/// Whether payload samples are real scalars or interleaved I/Q pairs.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RealOrComplex {
    Real,
    Complex,
}

impl std::fmt::Display for RealOrComplex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RealOrComplex::Real => write!(f, "real"),
            RealOrComplex::Complex => write!(f, "complex"),
        }
    }
}

/// Detect the stream format from the first 5 bytes of a source.
///
/// Bit 1 of byte 0 is the legacy-mode flag; the low 3 bits of byte 4 are
/// the version discriminator: 0 or 1 is the VDIF family, 7 is CODIF.
///
/// # Errors
/// [`Error::TruncatedHeader`] with fewer than 5 bytes,
/// [`Error::UnrecognisedFormat`] for any other version value.
pub fn detect_format(bytes: &[u8]) -> Result<DataFormat> {
    if bytes.len() < 5 {
        return Err(Error::TruncatedHeader {
            actual: bytes.len(),
            minimum: 5,
        });
    }
    let legacy_mode = (bytes[0] >> 1) & 0b1 == 1;
    let version = bytes[4] & 0b111;
    match version {
        0 | 1 if legacy_mode => Ok(DataFormat::VdifLegacy),
        0 | 1 => Ok(DataFormat::Vdif),
        7 => Ok(DataFormat::Codif),
        _ => Err(Error::UnrecognisedFormat {
            byte0: bytes[0],
            byte4: bytes[4],
        }),
    }
}

fn word(buf: &[u8], idx: usize) -> u32 {
    let i = idx * 4;
    u32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]])
}

fn put_word(buf: &mut [u8], idx: usize, w: u32) {
    buf[idx * 4..idx * 4 + 4].copy_from_slice(&w.to_le_bytes());
}

/// Render a 16-bit station id. Two printable ASCII letter/digit bytes are
/// shown as a 2-character code, anything else as the decimal value.
#[must_use]
pub fn station_id_string(id: u16) -> String {
    let hi = (id >> 8) as u8;
    let lo = (id & 0xff) as u8;
    if hi.is_ascii_alphanumeric() && lo.is_ascii_alphanumeric() {
        format!("{}{}", hi as char, lo as char)
    } else {
        format!("{id}")
    }
}

/// VDIF frame header (both legacy and standard modes).
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct VdifHeader {
    /// Offset from the reference epoch, 30 bits.
    pub seconds_from_epoch: u32,
    pub legacy_mode: bool,
    pub invalid_flag: bool,
    /// Sequence number within the current epoch-second, 24 bits.
    pub frame_number: u32,
    /// Half-year index since 2000, 6 bits. Even values are January,
    /// odd are July.
    pub reference_epoch: u8,
    /// Full frame length (header included) in units of 8 bytes, 24 bits.
    pub frame_length_words: u32,
    /// log2 of the channel count, 5 bits.
    pub log2_num_channels: u8,
    /// Format version, 3 bits. Only 0 and 1 are recognised.
    pub version: u8,
    pub station_id: u16,
    /// Data thread identity, 10 bits.
    pub thread_id: u16,
    /// Stored value is one less than the actual bit depth, 5 bits.
    pub bits_per_sample_minus1: u8,
    pub data_type: RealOrComplex,
}

impl VdifHeader {
    /// Length of the fixed header area, before any extended data.
    pub const BASE_LEN: usize = 16;
    /// Length of the extended-data area present in non-legacy mode.
    pub const EXTENDED_LEN: usize = 16;

    /// Decode the fixed 16-byte header area.
    ///
    /// # Errors
    /// [`Error::TruncatedHeader`] on short input,
    /// [`Error::UnrecognisedVersion`] if the version field is not 0 or 1.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::BASE_LEN {
            return Err(Error::TruncatedHeader {
                actual: buf.len(),
                minimum: Self::BASE_LEN,
            });
        }
        let w0 = word(buf, 0);
        let w1 = word(buf, 1);
        let w2 = word(buf, 2);
        let w3 = word(buf, 3);

        let version = ((w2 >> 29) & 0x7) as u8;
        if version > 1 {
            return Err(Error::UnrecognisedVersion(version));
        }

        Ok(VdifHeader {
            seconds_from_epoch: w0 & 0x3fff_ffff,
            legacy_mode: (w0 >> 30) & 0x1 == 1,
            invalid_flag: (w0 >> 31) & 0x1 == 1,
            frame_number: w1 & 0xff_ffff,
            reference_epoch: ((w1 >> 24) & 0x3f) as u8,
            frame_length_words: w2 & 0xff_ffff,
            log2_num_channels: ((w2 >> 24) & 0x1f) as u8,
            version,
            station_id: (w3 & 0xffff) as u16,
            thread_id: ((w3 >> 16) & 0x3ff) as u16,
            bits_per_sample_minus1: ((w3 >> 26) & 0x1f) as u8,
            data_type: if (w3 >> 31) & 0x1 == 1 {
                RealOrComplex::Complex
            } else {
                RealOrComplex::Real
            },
        })
    }

    /// Encode back to the 16-byte wire form. Exact inverse of
    /// [`VdifHeader::decode`] for in-range field values.
    #[must_use]
    pub fn encode(&self) -> [u8; Self::BASE_LEN] {
        let mut buf = [0u8; Self::BASE_LEN];
        let w0 = (self.seconds_from_epoch & 0x3fff_ffff)
            | (u32::from(self.legacy_mode) << 30)
            | (u32::from(self.invalid_flag) << 31);
        let w1 = (self.frame_number & 0xff_ffff) | (u32::from(self.reference_epoch & 0x3f) << 24);
        let w2 = (self.frame_length_words & 0xff_ffff)
            | (u32::from(self.log2_num_channels & 0x1f) << 24)
            | (u32::from(self.version & 0x7) << 29);
        let w3 = u32::from(self.station_id)
            | (u32::from(self.thread_id & 0x3ff) << 16)
            | (u32::from(self.bits_per_sample_minus1 & 0x1f) << 26)
            | (u32::from(matches!(self.data_type, RealOrComplex::Complex)) << 31);
        put_word(&mut buf, 0, w0);
        put_word(&mut buf, 1, w1);
        put_word(&mut buf, 2, w2);
        put_word(&mut buf, 3, w3);
        buf
    }

    #[must_use]
    pub fn format(&self) -> DataFormat {
        if self.legacy_mode {
            DataFormat::VdifLegacy
        } else {
            DataFormat::Vdif
        }
    }
}

/// CODIF frame header, fixed part. The 20-byte metadata block that
/// completes the 64-byte header is decoded separately.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct CodifHeader {
    /// Offset from the reference epoch, 30 bits.
    pub seconds_from_epoch: u32,
    pub invalid_flag: bool,
    pub data_type: RealOrComplex,
    /// Half-year index since 2020. Even values are January, odd are July.
    pub reference_epoch: u8,
    /// Bytes per sample block (one sample per channel), in units of
    /// 8 bytes.
    pub sample_block_length: u16,
    pub frame_number: u32,
    pub thread_id: u16,
    pub group_id: u16,
    /// Payload length in units of 8 bytes.
    pub data_array_length: u32,
    /// Actual bit depth, stored directly.
    pub bits_per_sample: u8,
    pub station_id: u16,
    /// Channel count, stored directly.
    pub num_channels: u16,
    /// Integration alignment period in seconds.
    pub alignment_period: u16,
    pub secondary_id: u16,
}

impl CodifHeader {
    /// CODIF version discriminator carried in the header.
    pub const VERSION: u8 = 7;
    /// Length of the fixed header area, before the metadata block.
    pub const BASE_LEN: usize = 44;
    /// Length of the metadata block.
    pub const METADATA_LEN: usize = 20;

    /// Decode the fixed 44-byte header area.
    ///
    /// # Errors
    /// [`Error::TruncatedHeader`] on short input,
    /// [`Error::UnrecognisedVersion`] if the version field is not 7.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::BASE_LEN {
            return Err(Error::TruncatedHeader {
                actual: buf.len(),
                minimum: Self::BASE_LEN,
            });
        }
        let w0 = word(buf, 0);
        let w1 = word(buf, 1);

        let version = (w1 & 0x7) as u8;
        if version != Self::VERSION {
            return Err(Error::UnrecognisedVersion(version));
        }

        Ok(CodifHeader {
            seconds_from_epoch: w0 & 0x3fff_ffff,
            invalid_flag: (w0 >> 31) & 0x1 == 1,
            data_type: if (w1 >> 3) & 0x1 == 1 {
                RealOrComplex::Complex
            } else {
                RealOrComplex::Real
            },
            reference_epoch: ((w1 >> 8) & 0xff) as u8,
            sample_block_length: ((w1 >> 16) & 0xffff) as u16,
            frame_number: word(buf, 2),
            thread_id: (word(buf, 3) & 0xffff) as u16,
            group_id: ((word(buf, 3) >> 16) & 0xffff) as u16,
            data_array_length: word(buf, 4),
            bits_per_sample: (word(buf, 5) & 0xff) as u8,
            station_id: ((word(buf, 5) >> 16) & 0xffff) as u16,
            num_channels: (word(buf, 6) & 0xffff) as u16,
            alignment_period: ((word(buf, 6) >> 16) & 0xffff) as u16,
            secondary_id: (word(buf, 7) & 0xffff) as u16,
        })
    }

    /// Encode back to the 44-byte wire form. Exact inverse of
    /// [`CodifHeader::decode`] for in-range field values.
    #[must_use]
    pub fn encode(&self) -> [u8; Self::BASE_LEN] {
        let mut buf = [0u8; Self::BASE_LEN];
        let w0 = (self.seconds_from_epoch & 0x3fff_ffff) | (u32::from(self.invalid_flag) << 31);
        let w1 = u32::from(Self::VERSION)
            | (u32::from(matches!(self.data_type, RealOrComplex::Complex)) << 3)
            | (u32::from(self.reference_epoch) << 8)
            | (u32::from(self.sample_block_length) << 16);
        put_word(&mut buf, 0, w0);
        put_word(&mut buf, 1, w1);
        put_word(&mut buf, 2, self.frame_number);
        put_word(
            &mut buf,
            3,
            u32::from(self.thread_id) | (u32::from(self.group_id) << 16),
        );
        put_word(&mut buf, 4, self.data_array_length);
        put_word(
            &mut buf,
            5,
            u32::from(self.bits_per_sample) | (u32::from(self.station_id) << 16),
        );
        put_word(
            &mut buf,
            6,
            u32::from(self.num_channels) | (u32::from(self.alignment_period) << 16),
        );
        put_word(&mut buf, 7, u32::from(self.secondary_id));
        buf
    }
}

/// Frame header of either format.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameHeader {
    Vdif(VdifHeader),
    Codif(CodifHeader),
}

impl FrameHeader {
    /// Decode a header of the given format from the start of `buf`.
    ///
    /// # Errors
    /// [`Error::TruncatedHeader`] with fewer bytes than the format's fixed
    /// header area, [`Error::UnrecognisedVersion`] on a bad version field.
    pub fn decode(buf: &[u8], format: DataFormat) -> Result<Self> {
        match format {
            DataFormat::Vdif | DataFormat::VdifLegacy => {
                Ok(FrameHeader::Vdif(VdifHeader::decode(buf)?))
            }
            DataFormat::Codif => Ok(FrameHeader::Codif(CodifHeader::decode(buf)?)),
        }
    }

    #[must_use]
    pub fn format(&self) -> DataFormat {
        match self {
            FrameHeader::Vdif(h) => h.format(),
            FrameHeader::Codif(_) => DataFormat::Codif,
        }
    }

    #[must_use]
    pub fn seconds_from_epoch(&self) -> u32 {
        match self {
            FrameHeader::Vdif(h) => h.seconds_from_epoch,
            FrameHeader::Codif(h) => h.seconds_from_epoch,
        }
    }

    #[must_use]
    pub fn reference_epoch(&self) -> u8 {
        match self {
            FrameHeader::Vdif(h) => h.reference_epoch,
            FrameHeader::Codif(h) => h.reference_epoch,
        }
    }

    #[must_use]
    pub fn frame_number(&self) -> u32 {
        match self {
            FrameHeader::Vdif(h) => h.frame_number,
            FrameHeader::Codif(h) => h.frame_number,
        }
    }

    #[must_use]
    pub fn thread_id(&self) -> u16 {
        match self {
            FrameHeader::Vdif(h) => h.thread_id,
            FrameHeader::Codif(h) => h.thread_id,
        }
    }

    #[must_use]
    pub fn station_id(&self) -> u16 {
        match self {
            FrameHeader::Vdif(h) => h.station_id,
            FrameHeader::Codif(h) => h.station_id,
        }
    }

    #[must_use]
    pub fn station_id_string(&self) -> String {
        station_id_string(self.station_id())
    }

    #[must_use]
    pub fn invalid(&self) -> bool {
        match self {
            FrameHeader::Vdif(h) => h.invalid_flag,
            FrameHeader::Codif(h) => h.invalid_flag,
        }
    }

    #[must_use]
    pub fn data_type(&self) -> RealOrComplex {
        match self {
            FrameHeader::Vdif(h) => h.data_type,
            FrameHeader::Codif(h) => h.data_type,
        }
    }

    /// Actual sample bit depth.
    #[must_use]
    pub fn bits_per_sample(&self) -> u8 {
        match self {
            FrameHeader::Vdif(h) => h.bits_per_sample_minus1 + 1,
            FrameHeader::Codif(h) => h.bits_per_sample,
        }
    }

    #[must_use]
    pub fn num_channels(&self) -> u64 {
        match self {
            FrameHeader::Vdif(h) => 1u64 << h.log2_num_channels,
            FrameHeader::Codif(h) => u64::from(h.num_channels),
        }
    }

    /// Total header length in bytes, including extended data or metadata.
    #[must_use]
    pub fn header_length_bytes(&self) -> u64 {
        self.format().header_length() as u64
    }

    /// Total frame length in bytes, header included.
    #[must_use]
    pub fn frame_length_bytes(&self) -> u64 {
        match self {
            FrameHeader::Vdif(h) => u64::from(h.frame_length_words) * 8,
            FrameHeader::Codif(h) => {
                DataFormat::Codif.header_length() as u64 + u64::from(h.data_array_length) * 8
            }
        }
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn data_length_bytes(&self) -> u64 {
        match self {
            FrameHeader::Vdif(_) => self
                .frame_length_bytes()
                .saturating_sub(self.header_length_bytes()),
            FrameHeader::Codif(h) => u64::from(h.data_array_length) * 8,
        }
    }

    /// Year and month of the reference epoch. Even epochs are January,
    /// odd are July; the base year is 2000 for VDIF and 2020 for CODIF.
    #[must_use]
    pub fn reference_epoch_year_month(&self) -> (i32, u32) {
        let base = match self {
            FrameHeader::Vdif(_) => 2000,
            FrameHeader::Codif(_) => 2020,
        };
        let epoch = i32::from(self.reference_epoch());
        (base + epoch / 2, 1 + (epoch as u32 % 2) * 6)
    }

    /// UTC timestamp of the first sample in the frame's epoch-second.
    /// `None` only if the epoch fields describe an unrepresentable date.
    #[must_use]
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        let (year, month) = self.reference_epoch_year_month();
        let epoch = Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()?;
        epoch.checked_add_signed(chrono::Duration::seconds(i64::from(
            self.seconds_from_epoch(),
        )))
    }

    /// Number of complete samples (one per channel) held by one frame.
    ///
    /// For VDIF a "segment" is one sample for every channel; segments
    /// smaller than a 32-bit word are packed several to a word with any
    /// leftover bits unused, a segment spanning multiple words is padded
    /// up to a whole number of words. CODIF divides the payload directly
    /// into sample blocks.
    #[must_use]
    pub fn num_samples_per_frame(&self) -> u64 {
        match self {
            FrameHeader::Vdif(_) => {
                let mult = match self.data_type() {
                    RealOrComplex::Real => 1,
                    RealOrComplex::Complex => 2,
                };
                let segment_bits = u64::from(self.bits_per_sample()) * self.num_channels() * mult;
                if segment_bits == 0 {
                    return 0;
                }
                let data_words = self.data_length_bytes() / 4;
                if segment_bits <= 32 {
                    data_words * (32 / segment_bits)
                } else {
                    let words_per_segment = segment_bits.div_ceil(32);
                    data_words / words_per_segment
                }
            }
            FrameHeader::Codif(h) => {
                let block = u64::from(h.sample_block_length) * 8;
                if block == 0 {
                    return 0;
                }
                self.data_length_bytes() / block
            }
        }
    }
}
