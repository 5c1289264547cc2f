// SPDX-License-Identifier: MPL-2.0
//! Bounded FIFO of resampled audio.
//!
//! The audio path mirrors the video one at a smaller scale: a decoder fills
//! the queue with interleaved `f32` buffers, the consumer drains samples at
//! its own pace, and a seek clears everything queued.

use std::collections::VecDeque;
use std::sync::Arc;

/// A decoded, resampled audio buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Interleaved audio samples (f32, normalized to [-1.0, 1.0]).
    pub samples: Arc<Vec<f32>>,

    /// Sample rate in Hz (e.g., 44100, 48000).
    pub sample_rate: u32,

    /// Number of audio channels (1 = mono, 2 = stereo).
    pub channels: u16,

    /// Presentation timestamp of the first sample, in seconds.
    pub pts_secs: f64,
}

impl DecodedAudio {
    /// Returns the total number of samples (across all channels).
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Returns the number of frames (samples per channel).
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.samples.len() / usize::from(self.channels.max(1))
    }

    /// Returns the playback length of the buffer in seconds.
    // Allow cast_precision_loss: audio buffers hold far fewer than 2^52 frames.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.frame_count() as f64 / f64::from(self.sample_rate)
        }
    }
}

/// FIFO of [`DecodedAudio`] bounded by a total sample count.
#[derive(Debug)]
pub struct AudioQueue {
    buffers: VecDeque<DecodedAudio>,
    /// Samples already consumed from the front buffer.
    front_offset: usize,
    queued_samples: usize,
    capacity_samples: usize,
}

impl AudioQueue {
    /// Creates a queue holding at most `capacity_samples` interleaved samples.
    #[must_use]
    pub fn new(capacity_samples: usize) -> Self {
        Self {
            buffers: VecDeque::new(),
            front_offset: 0,
            queued_samples: 0,
            capacity_samples: capacity_samples.max(1),
        }
    }

    /// Creates a queue sized for `secs` of audio at the given format.
    // Allow truncation and sign loss: the product is positive and small.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    #[must_use]
    pub fn with_duration(secs: f64, sample_rate: u32, channels: u16) -> Self {
        let samples = (secs.max(0.0) * f64::from(sample_rate) * f64::from(channels)) as usize;
        Self::new(samples)
    }

    /// Appends a buffer if it fits.
    ///
    /// An empty queue accepts any buffer so oversized buffers cannot stall
    /// the producer. Returns `false` when the buffer was rejected.
    pub fn push(&mut self, audio: DecodedAudio) -> bool {
        if !self.buffers.is_empty() && self.queued_samples + audio.sample_count() > self.capacity_samples {
            return false;
        }
        self.queued_samples += audio.sample_count();
        self.buffers.push_back(audio);
        true
    }

    /// Removes and returns the front buffer, minus any samples already read.
    pub fn pop(&mut self) -> Option<DecodedAudio> {
        let mut audio = self.buffers.pop_front()?;
        let offset = std::mem::take(&mut self.front_offset);
        self.queued_samples -= audio.sample_count() - offset;

        if offset > 0 {
            let frames_skipped = offset / usize::from(audio.channels.max(1));
            audio.pts_secs += frames_as_secs(frames_skipped, audio.sample_rate);
            audio.samples = Arc::new(audio.samples[offset..].to_vec());
        }
        Some(audio)
    }

    /// Copies queued samples into `out`, returning how many were written.
    pub fn read_samples(&mut self, out: &mut [f32]) -> usize {
        let mut written = 0;
        while written < out.len() {
            let Some(front) = self.buffers.front() else {
                break;
            };
            let available = &front.samples[self.front_offset..];
            let count = available.len().min(out.len() - written);
            out[written..written + count].copy_from_slice(&available[..count]);
            written += count;
            self.front_offset += count;
            self.queued_samples -= count;

            if self.front_offset >= front.samples.len() {
                self.buffers.pop_front();
                self.front_offset = 0;
            }
        }
        written
    }

    /// Timestamp of the next sample to be read.
    #[must_use]
    pub fn front_pts_secs(&self) -> Option<f64> {
        self.buffers.front().map(|front| {
            let frames = self.front_offset / usize::from(front.channels.max(1));
            front.pts_secs + frames_as_secs(frames, front.sample_rate)
        })
    }

    /// Drops everything queued, e.g. after a seek.
    pub fn clear(&mut self) {
        self.buffers.clear();
        self.front_offset = 0;
        self.queued_samples = 0;
    }

    #[must_use]
    pub fn len_samples(&self) -> usize {
        self.queued_samples
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queued_samples == 0
    }

    /// True when no further buffer would be accepted.
    #[must_use]
    pub fn is_full(&self) -> bool {
        !self.buffers.is_empty() && self.queued_samples >= self.capacity_samples
    }

    #[must_use]
    pub fn capacity_samples(&self) -> usize {
        self.capacity_samples
    }
}

#[allow(clippy::cast_precision_loss)]
fn frames_as_secs(frames: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        0.0
    } else {
        frames as f64 / f64::from(sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::assert_abs_diff_eq;

    fn stereo(pts_secs: f64, frames: usize) -> DecodedAudio {
        #[allow(clippy::cast_precision_loss)]
        let samples = (0..frames * 2).map(|i| i as f32).collect();
        DecodedAudio {
            samples: Arc::new(samples),
            sample_rate: 1000,
            channels: 2,
            pts_secs,
        }
    }

    #[test]
    fn decoded_audio_calculates_counts() {
        let audio = stereo(0.0, 500);
        assert_eq!(audio.sample_count(), 1000);
        assert_eq!(audio.frame_count(), 500);
        assert_abs_diff_eq!(audio.duration_secs(), 0.5);
    }

    #[test]
    fn push_respects_capacity() {
        let mut queue = AudioQueue::new(300);
        assert!(queue.push(stereo(0.0, 100)));
        assert!(!queue.push(stereo(0.1, 100)));
        assert_eq!(queue.len_samples(), 200);
        assert!(!queue.is_full());
    }

    #[test]
    fn empty_queue_accepts_oversized_buffer() {
        let mut queue = AudioQueue::new(10);
        assert!(queue.push(stereo(0.0, 100)));
        assert!(queue.is_full());
    }

    #[test]
    fn read_samples_spans_buffers() {
        let mut queue = AudioQueue::new(1000);
        queue.push(stereo(0.0, 2));
        queue.push(stereo(0.002, 2));

        let mut out = [0.0f32; 6];
        assert_eq!(queue.read_samples(&mut out), 6);
        assert_eq!(out, [0.0, 1.0, 2.0, 3.0, 0.0, 1.0]);
        assert_eq!(queue.len_samples(), 2);
        assert_abs_diff_eq!(queue.front_pts_secs().unwrap(), 0.003);
    }

    #[test]
    fn pop_returns_remaining_part_of_front_buffer() {
        let mut queue = AudioQueue::new(1000);
        queue.push(stereo(1.0, 4));

        let mut out = [0.0f32; 2];
        queue.read_samples(&mut out);
        let rest = queue.pop().unwrap();

        assert_eq!(rest.sample_count(), 6);
        assert_abs_diff_eq!(rest.pts_secs, 1.001);
        assert!(queue.is_empty());
    }

    #[test]
    fn clear_resets_everything() {
        let mut queue = AudioQueue::with_duration(1.0, 1000, 2);
        assert_eq!(queue.capacity_samples(), 2000);
        queue.push(stereo(0.0, 10));
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.front_pts_secs().is_none());
        assert!(queue.pop().is_none());
    }
}
