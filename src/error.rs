#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The first bytes of the source did not match any known format.
    #[error("unrecognised data format (byte 0: {byte0:#04x}, byte 4: {byte4:#04x})")]
    UnrecognisedFormat { byte0: u8, byte4: u8 },

    /// The version field embedded in a frame header did not map to a
    /// known format.
    #[error("unrecognised format version {0}")]
    UnrecognisedVersion(u8),

    #[error("truncated header: got {actual} of {minimum} bytes")]
    TruncatedHeader { actual: usize, minimum: usize },

    #[error("truncated frame payload: got {actual} of {expected} bytes")]
    TruncatedPayload { actual: usize, expected: usize },

    #[error("bad format designator {0:?}")]
    BadFormatDesignator(String),

    #[error("file name {0:?} does not follow the structured naming convention")]
    BadFileName(String),

    #[error("unsupported sample encoding: {bits}-bit {kind}")]
    UnsupportedEncoding {
        bits: u8,
        kind: crate::header::RealOrComplex,
    },

    #[error("expected {expected} output channel buffers, got {actual}")]
    OutputShape { expected: usize, actual: usize },

    /// Natural end of a finite byte source. Always carries the partial
    /// count (frames or samples, depending on the operation) achieved
    /// before the source ran out. Not corruption.
    #[error("end of file after {partial} of requested items")]
    EndOfFile { partial: u64 },

    /// No data currently available on a live source. Transient; the
    /// caller may feed more data and retry.
    #[error("no data currently available")]
    BufferExhausted,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
