use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::channels::{Channel, SensorRecord};
use crate::error::{MonitorError, MonitorResult};

pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024;

const DELIMITER: u8 = b'\n';

/// Splits a byte stream into newline-terminated JSON frames.
///
/// Bytes after the last delimiter stay buffered until a later chunk completes
/// them. A frame that fails to decode yields an error and is skipped without
/// affecting the frames after it. A partial frame longer than
/// `max_frame_bytes` is thrown away and the decoder ignores input up to the
/// next delimiter.
#[derive(Debug)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
    max_frame_bytes: usize,
    discarding: bool,
    next_seq: u64,
}

impl StreamDecoder {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_frame_bytes: max_frame_bytes.max(1),
            discarding: false,
            next_seq: 0,
        }
    }

    /// Buffer `chunk` and iterate over the frames it completes.
    ///
    /// Frames not pulled from the iterator stay buffered for the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Frames<'_> {
        if self.discarding {
            if let Some(pos) = chunk.iter().position(|b| *b == DELIMITER) {
                self.discarding = false;
                self.buffer.extend_from_slice(&chunk[pos + 1..]);
            }
        } else {
            self.buffer.extend_from_slice(chunk);
        }
        Frames { decoder: self }
    }

    /// Bytes held back waiting for a delimiter.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }

    fn next_frame(&mut self) -> Option<MonitorResult<SensorRecord>> {
        loop {
            let Some(pos) = self.buffer.iter().position(|b| *b == DELIMITER) else {
                if self.buffer.len() > self.max_frame_bytes {
                    self.buffer.clear();
                    self.discarding = true;
                    return Some(Err(MonitorError::FrameTooLong {
                        limit: self.max_frame_bytes,
                    }));
                }
                return None;
            };

            let frame: Vec<u8> = self.buffer.drain(..=pos).collect();
            let body = frame[..pos].trim_ascii();

            if body.is_empty() {
                continue;
            }
            if body.len() > self.max_frame_bytes {
                return Some(Err(MonitorError::FrameTooLong {
                    limit: self.max_frame_bytes,
                }));
            }

            return Some(decode_frame(body).map(|values| {
                let seq = self.next_seq;
                self.next_seq += 1;
                SensorRecord::new(seq, values)
            }));
        }
    }
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

/// Frames completed by the most recent [`StreamDecoder::feed`].
pub struct Frames<'a> {
    decoder: &'a mut StreamDecoder,
}

impl Iterator for Frames<'_> {
    type Item = MonitorResult<SensorRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.decoder.next_frame()
    }
}

/// Decode one frame body. Unknown keys are ignored; known keys must be
/// non-negative numbers.
fn decode_frame(body: &[u8]) -> MonitorResult<BTreeMap<Channel, f64>> {
    let object: Map<String, Value> =
        serde_json::from_slice(body).map_err(|err| MonitorError::Decode(err.to_string()))?;

    let mut values = BTreeMap::new();
    for (key, value) in &object {
        let Ok(channel) = key.parse::<Channel>() else {
            continue;
        };
        let pressure = value
            .as_f64()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .ok_or_else(|| {
                MonitorError::Decode(format!(
                    "{channel} must be a non-negative number, got {value}"
                ))
            })?;
        values.insert(channel, pressure);
    }
    Ok(values)
}
