//! Unpacking frame payloads into floating-point sample buffers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, trace};

use crate::frame::Frame;
use crate::header::{FrameHeader, RealOrComplex};
use crate::lookup::get_table;
use crate::stream::DataStream;
use crate::{Error, Result};

/// Running totals for one output channel.
#[derive(Serialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStats {
    pub decoded_samples: u64,
    pub invalid_samples: u64,
}

/// Statistics accumulated across every decode call on one stream.
#[derive(Serialize, Debug, Default, Clone)]
pub struct DecodeMonitor {
    channels: Vec<ChannelStats>,
    pub decoded_frames: u64,
    pub invalid_frames: u64,
    /// Header timestamp of the earliest frame decoded.
    pub first_timestep: Option<DateTime<Utc>>,
    /// Header timestamp of the latest frame decoded.
    pub last_timestep: Option<DateTime<Utc>>,
}

impl DecodeMonitor {
    #[must_use]
    pub fn channels(&self) -> &[ChannelStats] {
        &self.channels
    }

    fn record(&mut self, header: &FrameHeader, samples: u64) {
        let channels = header.num_channels() as usize;
        if self.channels.len() < channels {
            self.channels.resize(channels, ChannelStats::default());
        }
        for stats in &mut self.channels[..channels] {
            if header.invalid() {
                stats.invalid_samples += samples;
            } else {
                stats.decoded_samples += samples;
            }
        }
        if header.invalid() {
            self.invalid_frames += 1;
        } else {
            self.decoded_frames += 1;
        }
        if let Some(time) = header.start_time() {
            if self.first_timestep.map_or(true, |first| time < first) {
                self.first_timestep = Some(time);
            }
            if self.last_timestep.map_or(true, |last| time > last) {
                self.last_timestep = Some(time);
            }
        }
    }
}

fn floats_per_sample(kind: RealOrComplex) -> usize {
    match kind {
        RealOrComplex::Real => 1,
        RealOrComplex::Complex => 2,
    }
}

/// Byte stride of one padded sample block, or `None` when samples pack
/// the payload contiguously.
///
/// VDIF segments up to one word pack without padding because bit depth
/// and channel count are both powers of two; larger segments are padded
/// to whole words. CODIF blocks are padded to the header's declared
/// block length.
fn segment_stride(header: &FrameHeader) -> Option<usize> {
    let mult = floats_per_sample(header.data_type()) as u64;
    let segment_bits = u64::from(header.bits_per_sample()) * header.num_channels() * mult;
    match header {
        FrameHeader::Vdif(_) => {
            if segment_bits <= 32 {
                None
            } else {
                Some((segment_bits.div_ceil(32) * 4) as usize)
            }
        }
        FrameHeader::Codif(h) => {
            let block_bytes = usize::from(h.sample_block_length) * 8;
            if block_bytes as u64 * 8 == segment_bits {
                None
            } else {
                Some(block_bytes)
            }
        }
    }
}

/// Unpack up to `budget` samples per channel from one frame, writing at
/// sample offset `offset` of each channel buffer. Returns the number of
/// samples per channel actually produced.
fn unpack_frame(
    frame: &Frame,
    offset: u64,
    budget: u64,
    out: &mut [Vec<f32>],
    valid_counts: &mut [u64],
    monitor: &mut DecodeMonitor,
) -> Result<u64> {
    let header = &frame.header;
    let channels = header.num_channels() as usize;
    if out.len() != channels {
        return Err(Error::OutputShape {
            expected: channels,
            actual: out.len(),
        });
    }

    let take = frame.num_samples().min(budget);
    let fps = floats_per_sample(header.data_type());

    if header.invalid() {
        // gap fill: zeros, not counted as valid
        for buf in out.iter_mut() {
            let start = offset as usize * fps;
            let end = (offset + take) as usize * fps;
            buf[start..end].fill(0.0);
        }
        monitor.record(header, take);
        trace!(
            frame_number = header.frame_number(),
            samples = take,
            "zero-filled invalid frame"
        );
        return Ok(take);
    }

    let table = get_table(header.bits_per_sample(), header.data_type())?;
    let samples_per_byte = table.samples_per_byte();
    let mut sample = 0u64;

    match segment_stride(header) {
        None => {
            let mut ch = 0usize;
            'payload: for &byte in &frame.payload {
                let row = table.row(byte);
                for s in 0..samples_per_byte {
                    let pos = (offset + sample) as usize * fps;
                    out[ch][pos..pos + fps].copy_from_slice(&row[s * fps..(s + 1) * fps]);
                    ch += 1;
                    if ch == channels {
                        ch = 0;
                        sample += 1;
                        if sample == take {
                            break 'payload;
                        }
                    }
                }
            }
        }
        Some(stride) => {
            for block in frame.payload.chunks_exact(stride) {
                if sample == take {
                    break;
                }
                let pos = (offset + sample) as usize * fps;
                let mut ch = 0usize;
                'block: for &byte in block {
                    let row = table.row(byte);
                    for s in 0..samples_per_byte {
                        out[ch][pos..pos + fps].copy_from_slice(&row[s * fps..(s + 1) * fps]);
                        ch += 1;
                        if ch == channels {
                            break 'block;
                        }
                    }
                }
                sample += 1;
            }
        }
    }

    for count in valid_counts.iter_mut() {
        *count += sample;
    }
    monitor.record(header, sample);
    Ok(sample)
}

impl DataStream {
    /// Decode `count` samples per channel into `out`, one buffer per
    /// channel, starting at the front of each buffer. Complex data
    /// occupies two floats per sample, re then im. `valid_counts` is
    /// incremented per channel for samples decoded from valid frames
    /// only; zero-filled gap samples count toward `count` but not toward
    /// `valid_counts`.
    ///
    /// Buffers in `out` are grown to `count` samples on first use; any
    /// existing capacity is reused. A frame only partially consumed when
    /// `count` is reached is not revisited, decoding always continues at
    /// the next frame boundary.
    ///
    /// Returns the number of samples per channel written. On a live
    /// stream this may be less than `count`: when the feed runs dry
    /// mid-request the samples decoded so far are returned, and a feed
    /// with no complete frame at all fails with the transient
    /// [`Error::BufferExhausted`].
    ///
    /// # Errors
    /// [`Error::EndOfFile`] carrying the partial sample count when the
    /// stream ends mid-request, [`Error::OutputShape`] if `out` or
    /// `valid_counts` do not have one entry per channel,
    /// [`Error::UnsupportedEncoding`] for a bit depth with no decode
    /// table.
    pub fn decode_samples(
        &mut self,
        count: u64,
        out: &mut [Vec<f32>],
        valid_counts: &mut [u64],
    ) -> Result<u64> {
        if count == 0 {
            return Ok(0);
        }

        let mut decoded = 0u64;
        let mut sized = false;
        while decoded < count {
            let frame = match self.next_frame() {
                Ok(frame) => frame,
                Err(Error::EndOfFile { .. }) => return Err(Error::EndOfFile { partial: decoded }),
                Err(Error::BufferExhausted) if decoded > 0 => {
                    debug!(decoded, requested = count, "live feed dry mid-request");
                    return Ok(decoded);
                }
                Err(err) => return Err(err),
            };

            if !sized {
                let channels = frame.header.num_channels() as usize;
                if out.len() != channels {
                    return Err(Error::OutputShape {
                        expected: channels,
                        actual: out.len(),
                    });
                }
                if valid_counts.len() != channels {
                    return Err(Error::OutputShape {
                        expected: channels,
                        actual: valid_counts.len(),
                    });
                }
                let need = count as usize * floats_per_sample(frame.header.data_type());
                for buf in out.iter_mut() {
                    if buf.len() < need {
                        buf.resize(need, 0.0);
                    }
                }
                sized = true;
            }

            let monitor = self.monitor.get_or_insert_with(DecodeMonitor::default);
            decoded += unpack_frame(
                &frame,
                decoded,
                count - decoded,
                out,
                valid_counts,
                monitor,
            )?;
        }
        Ok(decoded)
    }
}
