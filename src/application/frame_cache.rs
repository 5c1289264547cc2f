// SPDX-License-Identifier: MPL-2.0
//! Rolling cache of recently decoded frames.
//!
//! This module provides a fixed-capacity ring of frame slots that the decoder
//! writes into directly, so no decoded frame is ever copied on its way into
//! the cache.
//!
//! # Design
//!
//! - **Arena of slots**: frames live in a `Vec` of slots addressed by index;
//!   nothing outside the cache holds a reference into a slot across calls
//! - **Round-robin writes**: [`FrameCache::reserve`] hands out the slot under
//!   the write cursor, [`FrameCache::commit`] tags it and advances the cursor
//! - **Validity tags**: each slot carries its own timestamp tag, cleared while
//!   the slot is being rewritten, instead of relying on pointer identity
//! - **Nearest match**: lookups scan every valid slot for the smallest
//!   distance to the target; the ring position plays no part
//!
//! # Usage
//!
//! ```ignore
//! let mut cache = FrameCache::new(8, stream.time_base, || decoder.new_frame());
//! if decoder.receive_frame(cache.reserve())? {
//!     let pts_secs = cache.commit();
//! }
//! if let Some(nearest) = cache.find_nearest(1.25) {
//!     // Use nearest.frame
//! }
//! ```

use crate::application::port::MediaFrame;
use crate::config::{MAX_FRAME_CACHE_CAPACITY, MIN_FRAME_CACHE_CAPACITY};
use crate::domain::time::TimeBase;

/// Identity of one committed frame.
///
/// `write_index` grows monotonically, so an id never refers to a different
/// frame after its slot has been overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId {
    pub slot: usize,
    pub write_index: u64,
}

/// Result of a nearest-frame lookup.
#[derive(Debug)]
pub struct Nearest<'a, F> {
    pub frame: &'a F,
    pub id: FrameId,
    /// Presentation timestamp of the frame, in seconds.
    pub pts_secs: f64,
    /// `target - pts_secs`: negative when the cached frame lies after the target.
    pub distance_secs: f64,
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of slots currently holding a valid frame.
    pub frame_count: usize,

    /// Total number of slots.
    pub capacity: usize,

    /// Number of frames committed.
    pub commits: u64,

    /// Number of valid frames overwritten by newer ones.
    pub evictions: u64,
}

#[derive(Debug)]
struct Slot<F> {
    frame: F,
    /// Timestamp in stream ticks; `None` while empty or being rewritten.
    pts: Option<i64>,
    write_index: u64,
}

/// Fixed-capacity ring of decoded frames with nearest-timestamp lookup.
#[derive(Debug)]
pub struct FrameCache<F> {
    slots: Vec<Slot<F>>,
    time_base: TimeBase,
    /// Total number of commits; `cursor % capacity` is the next write slot.
    cursor: u64,
    commits: u64,
    evictions: u64,
}

impl<F: MediaFrame> FrameCache<F> {
    /// Creates a cache of `capacity` slots, each initialised by `new_frame`.
    ///
    /// `capacity` is clamped to the supported range. `time_base` is the owning
    /// stream's; every timestamp conversion goes through it.
    pub fn new(capacity: usize, time_base: TimeBase, mut new_frame: impl FnMut() -> F) -> Self {
        let capacity = capacity.clamp(MIN_FRAME_CACHE_CAPACITY, MAX_FRAME_CACHE_CAPACITY);
        let slots = (0..capacity)
            .map(|_| Slot {
                frame: new_frame(),
                pts: None,
                write_index: 0,
            })
            .collect();

        Self {
            slots,
            time_base,
            cursor: 0,
            commits: 0,
            evictions: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn write_slot(&self) -> usize {
        // Allow cast_possible_truncation: the modulo result is below capacity.
        #[allow(clippy::cast_possible_truncation)]
        let slot = (self.cursor % self.slots.len() as u64) as usize;
        slot
    }

    /// Returns the next write slot, to be filled by the decoder.
    ///
    /// The slot is invalidated until [`FrameCache::commit`] is called, so it is
    /// never returned by a lookup while half-written. Reserving again without
    /// committing returns the same slot.
    pub fn reserve(&mut self) -> &mut F {
        let index = self.write_slot();
        let slot = &mut self.slots[index];
        if slot.pts.take().is_some() {
            self.evictions += 1;
        }
        &mut slot.frame
    }

    /// Tags the reserved slot with its frame's timestamp and advances the cursor.
    ///
    /// Returns the committed timestamp in seconds, or `None` when the frame
    /// carries no timestamp (the slot then stays invalid).
    pub fn commit(&mut self) -> Option<f64> {
        let index = self.write_slot();
        let write_index = self.cursor;
        let slot = &mut self.slots[index];

        slot.pts = slot.frame.pts();
        slot.write_index = write_index;
        self.cursor += 1;
        self.commits += 1;

        slot.pts.map(|ticks| self.time_base.ticks_to_secs(ticks))
    }

    /// Finds the valid frame closest to `target_secs`.
    ///
    /// Ties prefer the frame before the target, then the most recent write.
    #[must_use]
    pub fn find_nearest(&self, target_secs: f64) -> Option<Nearest<'_, F>> {
        let mut best: Option<Nearest<'_, F>> = None;

        for (index, slot) in self.slots.iter().enumerate() {
            let Some(ticks) = slot.pts else {
                continue;
            };
            let pts_secs = self.time_base.ticks_to_secs(ticks);
            let distance_secs = target_secs - pts_secs;

            let better = match &best {
                None => true,
                Some(current) => {
                    let (new_abs, cur_abs) = (distance_secs.abs(), current.distance_secs.abs());
                    new_abs < cur_abs
                        || (new_abs == cur_abs
                            && (distance_secs > current.distance_secs
                                || (distance_secs == current.distance_secs
                                    && slot.write_index > current.id.write_index)))
                }
            };

            if better {
                best = Some(Nearest {
                    frame: &slot.frame,
                    id: FrameId {
                        slot: index,
                        write_index: slot.write_index,
                    },
                    pts_secs,
                    distance_secs,
                });
            }
        }

        best
    }

    /// Timestamp of the latest valid frame at or before `target_secs`.
    #[must_use]
    pub fn latest_at_or_before(&self, target_secs: f64) -> Option<f64> {
        self.slots
            .iter()
            .filter_map(|slot| slot.pts)
            .map(|ticks| self.time_base.ticks_to_secs(ticks))
            .filter(|pts| *pts <= target_secs)
            .max_by(f64::total_cmp)
    }

    /// Returns the frame committed under `id`, if it has not been overwritten.
    #[must_use]
    pub fn get(&self, id: FrameId) -> Option<&F> {
        self.slots
            .get(id.slot)
            .filter(|slot| slot.pts.is_some() && slot.write_index == id.write_index)
            .map(|slot| &slot.frame)
    }

    /// Invalidates every slot. Frame memory is kept for reuse.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.pts = None;
        }
    }

    /// Returns the current number of valid frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.pts.is_some()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|slot| slot.pts.is_none())
    }

    /// Returns the current cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            frame_count: self.len(),
            capacity: self.capacity(),
            commits: self.commits,
            evictions: self.evictions,
        }
    }

    /// Consumes the cache, returning the slot frames for explicit release.
    pub fn into_frames(self) -> impl Iterator<Item = F> {
        self.slots.into_iter().map(|slot| slot.frame)
    }
}
