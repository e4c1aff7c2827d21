//! Bounded Relay Arena with Borrow-Until-Release Slots
//!
//! ## Overview
//!
//! This module is the single-threaded bookkeeping behind every relay channel:
//! a fixed byte arena handing out contiguous slots for variable-length frames.
//! The runtime wraps it in a lock and adds waiting; everything about capacity,
//! ordering and slot lifetime is decided here.
//!
//! ## Slot Lifecycle
//!
//! ```text
//! try_reserve ──► Writing ──commit──► Committed ──pop_ready──► Borrowed ──release──► Free
//!                    │                                                               ▲
//!                    └───────────────────────abandon─────────────────────────────────┘
//! ```
//!
//! A slot keeps its bytes from reservation until it is released or abandoned,
//! even after the consumer has logically read it. This is what lets the
//! consumer decode straight out of the arena without copying.
//!
//! ## Algorithm
//!
//! Slots are carved out of a ring in allocation order, like a no-split ring
//! buffer: a frame never straddles the end of the arena. When the tail end is
//! too short the slot wraps to offset 0 and the skipped bytes are charged to
//! that slot as padding.
//!
//! ```text
//! ┌─────┬──────────────┬───────────┬─────────┬──────┐
//! │ new │     free     │  oldest   │  newer  │ pad  │
//! └─────┴──────────────┴───────────┴─────────┴──────┘
//!       ↑              ↑
//!      head           tail
//! ```
//!
//! Released slots in the middle of the ring stay charged until every older
//! slot is released too; space is reclaimed from the tail only. A consumer
//! that holds one record forever therefore stalls its producers, which is the
//! backpressure the pipeline wants.
//!
//! ## Handles
//!
//! Every reservation gets a fresh generation number. A [`SlotId`] carries it
//! and each operation checks both the generation and the phase, so a handle
//! used after release (or committed twice) fails with
//! [`RelayError::StaleHandle`] instead of touching reused bytes.
//!
//! ## Invariants
//!
//! - Bytes of live (non-free) slots never exceed the capacity
//! - Committed slots are delivered in commit order
//! - Live slots never overlap

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::vec;

use crate::errors::{RelayError, RelayResult};

/// Handle to one arena slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId {
    generation: u32,
}

impl SlotId {
    /// Generation stamped at reservation
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Writing,
    Committed,
    Borrowed,
    Free,
}

#[derive(Debug, Clone, Copy)]
struct Region {
    generation: u32,
    offset: usize,
    len: usize,
    /// Bytes skipped at the end of the arena to place this slot at offset 0
    padding: usize,
    phase: Phase,
}

/// Relay health counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Records committed by producers
    pub committed: u64,
    /// Records handed to the consumer
    pub delivered: u64,
    /// Records released by the consumer
    pub released: u64,
    /// Reservations dropped without commit
    pub abandoned: u64,
    /// Records producers gave up on because the relay was busy
    pub dropped: u64,
    /// Highest number of live bytes seen
    pub peak_in_flight: usize,
}

/// Fixed-capacity arena of framed records
pub struct RelayArena {
    storage: Box<[u8]>,
    /// Live regions in allocation (= generation) order
    regions: VecDeque<Region>,
    /// Committed generations in commit order
    ready: VecDeque<u32>,
    next_generation: u32,
    /// Start of the oldest live region
    tail: usize,
    /// Ring distance from `tail` to the next write position, padding included
    span: usize,
    in_flight: usize,
    stats: RelayStats,
}

impl RelayArena {
    /// Create an arena of `capacity` bytes; capacity never changes afterwards
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            regions: VecDeque::new(),
            ready: VecDeque::new(),
            next_generation: 0,
            tail: 0,
            span: 0,
            in_flight: 0,
            stats: RelayStats::default(),
        }
    }

    /// Total arena size in bytes
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Bytes held by live slots
    pub fn in_flight_bytes(&self) -> usize {
        self.in_flight
    }

    /// Bytes not charged to any slot (not necessarily contiguous)
    pub fn free_bytes(&self) -> usize {
        self.capacity() - self.span
    }

    /// Committed records not yet handed to the consumer
    pub fn pending(&self) -> usize {
        self.ready.len()
    }

    /// Health counters
    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    /// Count a record the producer gave up on
    pub fn note_dropped(&mut self) {
        self.stats.dropped += 1;
    }

    /// Reserve a contiguous slot of `len` bytes for writing
    ///
    /// Never waits: fails with `Busy` when no slot fits right now and with
    /// `Oversized` when no slot could ever fit.
    pub fn try_reserve(&mut self, len: usize) -> RelayResult<SlotId> {
        let capacity = self.capacity();
        if len > capacity {
            return Err(RelayError::Oversized { requested: len, capacity });
        }

        let (offset, padding) = self.find_space(len).ok_or(RelayError::Busy {
            requested: len,
            free: self.free_bytes(),
        })?;

        let generation = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1);
        self.regions.push_back(Region {
            generation,
            offset,
            len,
            padding,
            phase: Phase::Writing,
        });
        self.span += padding + len;
        self.in_flight += len;
        if self.in_flight > self.stats.peak_in_flight {
            self.stats.peak_in_flight = self.in_flight;
        }

        Ok(SlotId { generation })
    }

    /// Writable bytes of a reserved slot
    pub fn slot_mut(&mut self, id: SlotId) -> RelayResult<&mut [u8]> {
        let region = *self.region(id, Phase::Writing)?;
        Ok(&mut self.storage[region.offset..region.offset + region.len])
    }

    /// Publish a written slot to the consumer
    pub fn commit(&mut self, id: SlotId) -> RelayResult<()> {
        self.region_mut(id, Phase::Writing)?.phase = Phase::Committed;
        self.ready.push_back(id.generation);
        self.stats.committed += 1;
        Ok(())
    }

    /// Give back a slot that will never be committed
    pub fn abandon(&mut self, id: SlotId) -> RelayResult<()> {
        self.free(id, Phase::Writing)?;
        self.stats.abandoned += 1;
        Ok(())
    }

    /// Hand the oldest committed record to the consumer
    ///
    /// Returns its handle and length; the bytes stay borrowed until release.
    pub fn pop_ready(&mut self) -> Option<(SlotId, usize)> {
        let generation = self.ready.pop_front()?;
        let id = SlotId { generation };
        // Committed regions are only freed through release, after this pop
        let region = self.region_mut(id, Phase::Committed).ok()?;
        region.phase = Phase::Borrowed;
        let len = region.len;
        self.stats.delivered += 1;
        Some((id, len))
    }

    /// Read-only view of a borrowed record
    pub fn bytes(&self, id: SlotId) -> RelayResult<&[u8]> {
        let region = self.region(id, Phase::Borrowed)?;
        Ok(&self.storage[region.offset..region.offset + region.len])
    }

    /// Return a borrowed record's bytes to the arena
    pub fn release(&mut self, id: SlotId) -> RelayResult<()> {
        self.free(id, Phase::Borrowed)?;
        self.stats.released += 1;
        Ok(())
    }

    fn find_space(&mut self, len: usize) -> Option<(usize, usize)> {
        let capacity = self.capacity();
        if self.regions.is_empty() {
            self.tail = 0;
            self.span = 0;
        }

        if self.tail + self.span <= capacity {
            // Live bytes run from tail towards the end: free at both ends
            let head = self.tail + self.span;
            if len <= capacity - head {
                Some((head, 0))
            } else if len <= self.tail {
                Some((0, capacity - head))
            } else {
                None
            }
        } else {
            // Wrapped: the only free run is between head and tail
            let head = self.tail + self.span - capacity;
            (len <= self.tail - head).then_some((head, 0))
        }
    }

    fn index_of(&self, id: SlotId) -> Option<usize> {
        let front = self.regions.front()?;
        let index = id.generation.wrapping_sub(front.generation) as usize;
        match self.regions.get(index) {
            Some(region) if region.generation == id.generation => Some(index),
            _ => None,
        }
    }

    fn region(&self, id: SlotId, phase: Phase) -> RelayResult<&Region> {
        self.index_of(id)
            .map(|i| &self.regions[i])
            .filter(|r| r.phase == phase)
            .ok_or(RelayError::StaleHandle { generation: id.generation })
    }

    fn region_mut(&mut self, id: SlotId, phase: Phase) -> RelayResult<&mut Region> {
        let index = self
            .index_of(id)
            .filter(|&i| self.regions[i].phase == phase)
            .ok_or(RelayError::StaleHandle { generation: id.generation })?;
        Ok(&mut self.regions[index])
    }

    fn free(&mut self, id: SlotId, phase: Phase) -> RelayResult<()> {
        let region = self.region_mut(id, phase)?;
        region.phase = Phase::Free;
        let len = region.len;
        self.in_flight -= len;
        self.reclaim();
        Ok(())
    }

    fn reclaim(&mut self) {
        let capacity = self.capacity();
        while let Some(front) = self.regions.front() {
            if front.phase != Phase::Free {
                break;
            }
            let front = *front;
            self.regions.pop_front();
            self.span -= front.padding + front.len;
            self.tail = front.offset + front.len;
            if self.tail >= capacity {
                self.tail -= capacity;
            }
        }
        if self.regions.is_empty() {
            self.tail = 0;
            self.span = 0;
        }
    }
}
