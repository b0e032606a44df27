//! Data streams: a byte source plus a bounded lookahead buffer of
//! parsed frames.

use std::collections::{HashSet, VecDeque};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};
use typed_builder::TypedBuilder;

use crate::decode::DecodeMonitor;
use crate::frame::{read_frame, should_buffer, Frame};
use crate::header::{detect_format, DataFormat};
use crate::name;
use crate::source::{ByteSource, FileSource, SinkSource};
use crate::{Error, Result};

/// How frames flagged invalid by the recording device are treated.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum GapPolicy {
    /// Skip invalid frames at read time; they never enter the buffer.
    #[default]
    SkipInvalid,
    /// Buffer invalid frames; the decoder emits zero samples for them.
    InsertInvalid,
}

/// Stream construction options.
#[derive(TypedBuilder, Debug, Clone)]
pub struct StreamOptions {
    /// Maximum number of frames held in the lookahead buffer.
    #[builder(default = 16)]
    pub buffer_capacity: usize,
    #[builder(default)]
    pub gap_policy: GapPolicy,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Per-stream configuration. The rate/channel/bit-depth fields describe
/// the expected shape of the stream; decoding itself always trusts the
/// frame headers.
#[derive(Debug, Clone, Default)]
pub struct StreamConfig {
    pub data_rate: Option<u64>,
    pub num_channels: Option<u32>,
    pub bits_per_sample: Option<u8>,
    pub num_threads: Option<u32>,
    pub gap_policy: GapPolicy,
    /// `None` selects every thread.
    selected_threads: Option<HashSet<u16>>,
}

impl StreamConfig {
    #[must_use]
    pub fn thread_selected(&self, thread_id: u16) -> bool {
        match &self.selected_threads {
            None => true,
            Some(set) => set.contains(&thread_id),
        }
    }
}

/// Parsed `[name_]data_rate-num_channels-bits_per_sample[-num_threads]`
/// designator. Separators may be `_` or `-`; the thread count defaults
/// to 1 when omitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatDesignator {
    pub name: Option<String>,
    pub data_rate: u64,
    pub num_channels: u32,
    pub bits_per_sample: u8,
    pub num_threads: u32,
}

impl std::str::FromStr for FormatDesignator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || Error::BadFormatDesignator(s.to_string());
        let mut tokens: VecDeque<&str> = s.split(['-', '_']).collect();

        let mut name = None;
        if let Some(first) = tokens.front() {
            if first.chars().next().is_some_and(|c| !c.is_ascii_digit()) {
                name = Some((*first).to_string());
                tokens.pop_front();
            }
        }
        if !(3..=4).contains(&tokens.len()) {
            return Err(bad());
        }

        let mut numbers = Vec::with_capacity(4);
        for tok in &tokens {
            numbers.push(tok.parse::<u64>().map_err(|_| bad())?);
        }
        Ok(FormatDesignator {
            name,
            data_rate: numbers[0],
            num_channels: u32::try_from(numbers[1]).map_err(|_| bad())?,
            bits_per_sample: u8::try_from(numbers[2]).map_err(|_| bad())?,
            num_threads: match numbers.get(3) {
                Some(n) => u32::try_from(*n).map_err(|_| bad())?,
                None => 1,
            },
        })
    }
}

enum Source {
    File(FileSource),
    Sink(SinkSource),
}

impl Source {
    fn as_dyn(&mut self) -> &mut dyn ByteSource {
        match self {
            Source::File(s) => s,
            Source::Sink(s) => s,
        }
    }
}

/// An open VDIF/CODIF data stream.
///
/// Owns the byte source and a bounded buffer of parsed frames. One
/// stream is driven by one logical caller; nothing here is shared.
pub struct DataStream {
    source: Source,
    format: Option<DataFormat>,
    pub(crate) config: StreamConfig,
    capacity: usize,
    frames: VecDeque<Frame>,
    processed_count: u64,
    pub(crate) monitor: Option<DecodeMonitor>,
}

impl DataStream {
    /// Open a file-backed stream, detecting the format from the first
    /// bytes of the file.
    ///
    /// The structured-filename convention
    /// (`<experiment>_<station>_<scan>[_<aux>...].<ext>`) is applied when
    /// it matches; a non-matching name is only a warning.
    ///
    /// # Errors
    /// [`Error::Io`] if the file cannot be opened,
    /// [`Error::UnrecognisedFormat`] / [`Error::TruncatedHeader`] if the
    /// first bytes are not a valid frame header.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, StreamOptions::default())
    }

    /// [`DataStream::open`] with explicit options.
    ///
    /// # Errors
    /// See [`DataStream::open`].
    pub fn open_with<P: AsRef<Path>>(path: P, options: StreamOptions) -> Result<Self> {
        let source = FileSource::open(&path)?;
        let mut stream = Self::new(Source::File(source), options);
        stream.ensure_format()?;

        match name::parse_structured_filename(path.as_ref()) {
            Ok(info) => {
                if let Some(designator) = &info.format_designator {
                    if let Err(err) = stream.set_format_designator(designator) {
                        warn!(%err, "ignoring format designator from file name");
                    }
                }
            }
            Err(err) => warn!(%err, "file name not structured to specifications"),
        }
        Ok(stream)
    }

    /// Open an empty live-feed stream. The format stays unknown until the
    /// first bytes arrive via [`DataStream::feed`].
    #[must_use]
    pub fn open_sink() -> Self {
        Self::open_sink_with(StreamOptions::default())
    }

    #[must_use]
    pub fn open_sink_with(options: StreamOptions) -> Self {
        Self::new(Source::Sink(SinkSource::new()), options)
    }

    fn new(source: Source, options: StreamOptions) -> Self {
        DataStream {
            source,
            format: None,
            config: StreamConfig {
                gap_policy: options.gap_policy,
                ..StreamConfig::default()
            },
            capacity: options.buffer_capacity.max(1),
            frames: VecDeque::new(),
            processed_count: 0,
            monitor: None,
        }
    }

    /// Append bytes from a live feed. No-op for file-backed streams.
    pub fn feed(&mut self, dat: &[u8]) {
        if let Source::Sink(sink) = &mut self.source {
            sink.feed(dat);
        }
    }

    /// Mark a live feed finished; remaining buffered bytes drain and the
    /// stream then behaves like a file at its end.
    pub fn end_of_feed(&mut self) {
        if let Source::Sink(sink) = &mut self.source {
            sink.close();
        }
    }

    #[must_use]
    pub fn format(&self) -> Option<DataFormat> {
        self.format
    }

    #[must_use]
    pub fn gap_policy(&self) -> GapPolicy {
        self.config.gap_policy
    }

    pub fn set_gap_policy(&mut self, policy: GapPolicy) {
        self.config.gap_policy = policy;
    }

    #[must_use]
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Number of frames currently buffered ahead of the cursor.
    #[must_use]
    pub fn buffered_count(&self) -> usize {
        self.frames.len()
    }

    /// Total frames handed out by [`DataStream::next_frame`] so far.
    #[must_use]
    pub fn processed_count(&self) -> u64 {
        self.processed_count
    }

    #[must_use]
    pub fn buffer_capacity(&self) -> usize {
        self.capacity
    }

    /// Decode statistics, present once decoding has started.
    #[must_use]
    pub fn monitor(&self) -> Option<&DecodeMonitor> {
        self.monitor.as_ref()
    }

    /// Apply a compact format designator, e.g. `"m0921_8000-2-2-4"` or
    /// `"8000-4-2"`.
    ///
    /// # Errors
    /// [`Error::BadFormatDesignator`] if the string does not parse; the
    /// existing configuration is left untouched.
    pub fn set_format_designator(&mut self, designator: &str) -> Result<()> {
        let parsed: FormatDesignator = designator.parse()?;
        self.config.data_rate = Some(parsed.data_rate);
        self.config.num_channels = Some(parsed.num_channels);
        self.config.bits_per_sample = Some(parsed.bits_per_sample);
        self.config.num_threads = Some(parsed.num_threads);
        debug!(designator, "applied format designator");
        Ok(())
    }

    pub fn set_data_rate(&mut self, data_rate: u64) {
        self.config.data_rate = Some(data_rate);
    }

    pub fn set_num_channels(&mut self, num_channels: u32) {
        self.config.num_channels = Some(num_channels);
    }

    pub fn set_bits_per_sample(&mut self, bits_per_sample: u8) {
        self.config.bits_per_sample = Some(bits_per_sample);
    }

    pub fn set_num_threads(&mut self, num_threads: u32) {
        self.config.num_threads = Some(num_threads);
    }

    /// Restrict buffering to the given thread. Starting from the default
    /// all-threads selection, the first call selects only `thread_id`;
    /// further calls add to the set.
    pub fn select_thread(&mut self, thread_id: u16) {
        self.config
            .selected_threads
            .get_or_insert_with(HashSet::new)
            .insert(thread_id);
    }

    pub fn select_all_threads(&mut self) {
        self.config.selected_threads = None;
    }

    pub fn deselect_all_threads(&mut self) {
        self.config.selected_threads = Some(HashSet::new());
    }

    /// Close the stream, releasing the byte source and buffered frames.
    pub fn close(self) {
        drop(self);
    }

    fn ensure_format(&mut self) -> Result<DataFormat> {
        if let Some(format) = self.format {
            return Ok(format);
        }
        let mut head = [0u8; 5];
        let n = self.source.as_dyn().fill(&mut head)?;
        self.source.as_dyn().push(&head[..n]);
        if n < head.len() {
            return Err(Error::TruncatedHeader {
                actual: n,
                minimum: head.len(),
            });
        }
        let format = detect_format(&head)?;
        debug!(%format, "detected stream format");
        self.format = Some(format);
        Ok(format)
    }

    /// Read one bufferable frame straight from the source.
    fn read_one(&mut self) -> Result<Option<Frame>> {
        let format = self.ensure_format()?;
        let config = &self.config;
        read_frame(self.source.as_dyn(), format, |header| {
            should_buffer(config, header)
        })
    }

    /// Top up the buffer to `target_count` frames.
    ///
    /// # Errors
    /// [`Error::EndOfFile`] carrying the count actually buffered when the
    /// source ends first; [`Error::BufferExhausted`] when a live feed has
    /// no complete frame available right now.
    pub fn fill(&mut self, target_count: usize) -> Result<()> {
        let target = target_count.min(self.capacity);
        if target < target_count {
            warn!(
                requested = target_count,
                capacity = self.capacity,
                "fill target clamped to buffer capacity"
            );
        }
        while self.frames.len() < target {
            match self.read_one()? {
                Some(frame) => {
                    trace!(%frame, buffered = self.frames.len() + 1, "buffered frame");
                    self.frames.push_back(frame);
                }
                None => {
                    return Err(Error::EndOfFile {
                        partial: self.frames.len() as u64,
                    })
                }
            }
        }
        Ok(())
    }

    /// Take the next frame in stream order.
    ///
    /// An empty buffer triggers one refill attempt. A source that is out
    /// of frames fails with [`Error::EndOfFile`]; a live feed with no
    /// complete frame currently available fails with the transient
    /// [`Error::BufferExhausted`].
    pub fn next_frame(&mut self) -> Result<Frame> {
        if self.frames.is_empty() {
            match self.read_one()? {
                Some(frame) => self.frames.push_back(frame),
                None => return Err(Error::EndOfFile { partial: 0 }),
            }
        }
        // non-empty by construction
        let frame = self
            .frames
            .pop_front()
            .ok_or(Error::EndOfFile { partial: 0 })?;
        self.processed_count += 1;
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{RealOrComplex, VdifHeader};
    use std::io::Write;

    fn legacy_frame(frame_number: u32, thread_id: u16, invalid: bool, fill: u8) -> Vec<u8> {
        let header = VdifHeader {
            seconds_from_epoch: 102,
            legacy_mode: true,
            invalid_flag: invalid,
            frame_number,
            reference_epoch: 2,
            frame_length_words: 5, // 16-byte header + 24-byte payload
            log2_num_channels: 0,
            version: 0,
            station_id: u16::from_be_bytes([b'T', b't']),
            thread_id,
            bits_per_sample_minus1: 1,
            data_type: RealOrComplex::Real,
        };
        let mut bytes = header.encode().to_vec();
        bytes.extend_from_slice(&[fill; 24]);
        bytes
    }

    fn stream_of(frames: &[Vec<u8>], options: StreamOptions) -> DataStream {
        let mut ds = DataStream::open_sink_with(options);
        for f in frames {
            ds.feed(f);
        }
        ds.end_of_feed();
        ds
    }

    #[test]
    fn designator_parsing() {
        let d: FormatDesignator = "8000-2-2-4".parse().unwrap();
        assert_eq!(
            d,
            FormatDesignator {
                name: None,
                data_rate: 8000,
                num_channels: 2,
                bits_per_sample: 2,
                num_threads: 4,
            }
        );

        let d: FormatDesignator = "m0921_8000-4-2".parse().unwrap();
        assert_eq!(d.name.as_deref(), Some("m0921"));
        assert_eq!(d.num_threads, 1, "thread count defaults to 1");

        for bad in ["", "m0921", "8000-2", "8000-2-2-4-9", "80a0-2-2", "-2-2"] {
            assert!(
                bad.parse::<FormatDesignator>().is_err(),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn fill_and_next_frame_in_order() {
        let frames: Vec<Vec<u8>> = (0..3).map(|i| legacy_frame(i, 0, false, i as u8)).collect();
        let mut ds = stream_of(&frames, StreamOptions::default());

        ds.fill(3).unwrap();
        assert_eq!(ds.buffered_count(), 3);

        for i in 0..3u32 {
            let frame = ds.next_frame().unwrap();
            assert_eq!(frame.header.frame_number(), i);
        }
        assert_eq!(ds.processed_count(), 3);
        assert!(matches!(
            ds.next_frame(),
            Err(Error::EndOfFile { partial: 0 })
        ));
    }

    #[test]
    fn fill_past_eof_carries_partial_count() {
        let frames: Vec<Vec<u8>> = (0..2).map(|i| legacy_frame(i, 0, false, 0)).collect();
        let mut ds = stream_of(&frames, StreamOptions::default());

        let err = ds.fill(5).unwrap_err();
        assert!(matches!(err, Error::EndOfFile { partial: 2 }));
        // the partial frames remain available
        assert_eq!(ds.buffered_count(), 2);
        assert!(ds.next_frame().is_ok());
    }

    #[test]
    fn live_stream_distinguishes_exhaustion_from_eof() {
        let mut ds = DataStream::open_sink();
        let frame = legacy_frame(0, 0, false, 0);
        ds.feed(&frame[..frame.len() - 4]);

        assert!(matches!(ds.next_frame(), Err(Error::BufferExhausted)));

        ds.feed(&frame[frame.len() - 4..]);
        assert_eq!(ds.next_frame().unwrap().header.frame_number(), 0);

        // still open: exhausted again, not EOF
        assert!(matches!(ds.next_frame(), Err(Error::BufferExhausted)));
        ds.end_of_feed();
        assert!(matches!(
            ds.next_frame(),
            Err(Error::EndOfFile { partial: 0 })
        ));
    }

    #[test]
    fn sink_format_unknown_until_first_data() {
        let mut ds = DataStream::open_sink();
        assert!(ds.format().is_none());
        assert!(matches!(ds.next_frame(), Err(Error::BufferExhausted)));

        ds.feed(&legacy_frame(0, 0, false, 0));
        ds.next_frame().unwrap();
        assert_eq!(ds.format(), Some(DataFormat::VdifLegacy));
    }

    #[test]
    fn skip_invalid_frames_never_enter_the_buffer() {
        let frames = vec![
            legacy_frame(0, 0, true, 0xaa),
            legacy_frame(1, 0, false, 0xbb),
        ];
        let mut ds = stream_of(&frames, StreamOptions::default());
        let frame = ds.next_frame().unwrap();
        assert_eq!(frame.header.frame_number(), 1);
    }

    #[test]
    fn insert_invalid_keeps_invalid_frames() {
        let frames = vec![
            legacy_frame(0, 0, true, 0xaa),
            legacy_frame(1, 0, false, 0xbb),
        ];
        let options = StreamOptions::builder()
            .gap_policy(GapPolicy::InsertInvalid)
            .build();
        let mut ds = stream_of(&frames, options);
        assert!(ds.next_frame().unwrap().header.invalid());
    }

    #[test]
    fn thread_selection_filters_frames() {
        let frames = vec![
            legacy_frame(0, 1, false, 0),
            legacy_frame(1, 2, false, 0),
            legacy_frame(2, 1, false, 0),
        ];
        let mut ds = stream_of(&frames, StreamOptions::default());
        ds.select_thread(2);
        assert_eq!(ds.next_frame().unwrap().header.thread_id(), 2);
        assert!(matches!(
            ds.next_frame(),
            Err(Error::EndOfFile { partial: 0 })
        ));
    }

    #[test]
    fn open_reads_format_and_designator_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m0921_Tt_264_fd8000-2-2.vdif");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(&legacy_frame(0, 0, false, 0)).unwrap();
        drop(f);

        let ds = DataStream::open(&path).unwrap();
        assert_eq!(ds.format(), Some(DataFormat::VdifLegacy));
        assert_eq!(ds.config().data_rate, Some(8000));
        assert_eq!(ds.config().num_channels, Some(2));
    }

    #[test]
    fn open_missing_file_is_a_recoverable_error() {
        let zult = DataStream::open("/definitely/not/a/file.vdif");
        assert!(matches!(zult, Err(Error::Io(_))));
    }
}
