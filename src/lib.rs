//! Parsing and decoding for VDIF and CODIF baseband data streams.
//!
//! VDIF (VLBI Data Interchange Format) and CODIF (CSIRO Oversampled Data
//! Interchange Format) carry radio-telescope voltage samples as a
//! sequence of self-describing frames, each a short little-endian header
//! followed by a payload of packed offset-binary samples.
//!
//! The entry point is [`DataStream`]: open a recording with
//! [`DataStream::open`], or create a live stream with
//! [`DataStream::open_sink`] and push bytes into it as they arrive.
//! Frames come out in stream order via [`DataStream::next_frame`], and
//! [`DataStream::decode_samples`] unpacks payloads into per-channel
//! `f32` buffers using process-wide lookup tables.
//!
//! ```no_run
//! use vdif::DataStream;
//!
//! # fn main() -> vdif::Result<()> {
//! let mut stream = DataStream::open("m0921_Mp_264_fd8000-4-2.vdif")?;
//! let mut out = vec![Vec::new(); 4];
//! let mut valid = vec![0u64; 4];
//! let decoded = stream.decode_samples(8000, &mut out, &mut valid)?;
//! println!("decoded {decoded} samples per channel");
//! # Ok(())
//! # }
//! ```
//!
//! Lower layers are exposed for callers that want them: [`read_frame`]
//! pulls single frames from any [`ByteSource`], the header types decode
//! and encode the raw 32-bit word layouts, and [`get_table`] hands out
//! the sample lookup tables directly.

mod decode;
mod error;
mod extended;
mod frame;
mod header;
mod lookup;
mod name;
mod source;
mod stream;

pub use decode::{ChannelStats, DecodeMonitor};
pub use error::{Error, Result};
pub use extended::{CodifMetadata, ExtendedData};
pub use frame::{read_frame, should_buffer, Frame, FrameExtension};
pub use header::{
    detect_format, station_id_string, CodifHeader, DataFormat, FrameHeader, RealOrComplex,
    VdifHeader,
};
pub use lookup::{get_table, LookupTable};
pub use name::{parse_structured_filename, FileNameInfo};
pub use source::{ByteSource, FileSource, SinkSource};
pub use stream::{DataStream, FormatDesignator, GapPolicy, StreamConfig, StreamOptions};
