//! Bounded relay channel between pipeline tasks
//!
//! ## Overview
//!
//! A [`RelayChannel`] is a [`RelayArena`] behind a lock plus two wakeup
//! points: one for the consumer (a record was committed) and one for
//! producers (space was released). Clones share the same arena.
//!
//! ```text
//!  producer                         arena                         consumer
//!  ────────                         ─────                         ────────
//!  try_acquire_write ──► WriteSlot ──commit──► [ready FIFO] ──receive──► Received
//!                                                                          │
//!           ◄──────────────── space returns only at release ◄──────────────┘
//! ```
//!
//! ## Ownership
//!
//! Both handles are owned values. [`WriteSlot::commit`] and
//! [`Received::release`] consume them, so a handle cannot be committed or
//! released twice. Dropping a [`WriteSlot`] abandons it; dropping a
//! [`Received`] releases it. The generation check in the arena is the second
//! line of defense for handles that escape this type system.
//!
//! ## Timeouts
//!
//! | Call | `Duration::ZERO` | finite | unbounded |
//! |------|------------------|--------|-----------|
//! | [`RelayChannel::try_acquire_write`] | single attempt, `Busy` | `Busy` at deadline | - |
//! | [`RelayChannel::receive`] | single attempt, `TimedOut` | `TimedOut` at deadline | `None` |
//!
//! `receive` is cancel-safe: a record is taken off the FIFO and returned in
//! the same poll, so a `select!` that drops the future never loses one.

use std::sync::Arc;
use std::time::Duration;

use log::{trace, warn};
use parking_lot::Mutex;
use thermguard_core::{
    Record, RecordResult, RelayArena, RelayError, RelayResult, RelayStats, SlotId,
};
use tokio::sync::Notify;
use tokio::time::{self, Instant};

struct Shared {
    name: &'static str,
    arena: Mutex<RelayArena>,
    readable: Notify,
    writable: Notify,
}

/// Capacity-limited FIFO of framed records with borrow-until-release reads
#[derive(Clone)]
pub struct RelayChannel {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for RelayChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let arena = self.shared.arena.lock();
        f.debug_struct("RelayChannel")
            .field("name", &self.shared.name)
            .field("capacity", &arena.capacity())
            .field("in_flight", &arena.in_flight_bytes())
            .field("pending", &arena.pending())
            .finish()
    }
}

impl RelayChannel {
    /// Create a channel with a fixed arena of `capacity` bytes
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                name,
                arena: Mutex::new(RelayArena::new(capacity)),
                readable: Notify::new(),
                writable: Notify::new(),
            }),
        }
    }

    /// Name used in log lines
    pub fn name(&self) -> &'static str {
        self.shared.name
    }

    /// Arena size in bytes
    pub fn capacity(&self) -> usize {
        self.shared.arena.lock().capacity()
    }

    /// Bytes not charged to any live record
    pub fn free_bytes(&self) -> usize {
        self.shared.arena.lock().free_bytes()
    }

    /// Bytes held by live records
    pub fn in_flight_bytes(&self) -> usize {
        self.shared.arena.lock().in_flight_bytes()
    }

    /// Committed records waiting for the consumer
    pub fn pending(&self) -> usize {
        self.shared.arena.lock().pending()
    }

    /// Health counters
    pub fn stats(&self) -> RelayStats {
        self.shared.arena.lock().stats()
    }

    /// Reserve a slot of `size` bytes, waiting at most `timeout` for space
    pub async fn try_acquire_write(
        &self,
        size: usize,
        timeout: Duration,
    ) -> RelayResult<WriteSlot> {
        let deadline = Instant::now() + timeout;
        loop {
            let space = self.shared.writable.notified();
            tokio::pin!(space);
            space.as_mut().enable();

            match self.shared.arena.lock().try_reserve(size) {
                Ok(id) => {
                    return Ok(WriteSlot {
                        channel: self.clone(),
                        id: Some(id),
                        len: size,
                    })
                }
                Err(busy @ RelayError::Busy { .. }) if Instant::now() >= deadline => {
                    return Err(busy)
                }
                Err(RelayError::Busy { .. }) => {}
                Err(other) => return Err(other),
            }

            // Elapsed or not, the next pass retries once before giving up
            let _ = time::timeout_at(deadline, space).await;
        }
    }

    /// Copy `bytes` into a new record
    pub async fn send(&self, bytes: &[u8], timeout: Duration) -> RelayResult<()> {
        let mut slot = self.try_acquire_write(bytes.len(), timeout).await?;
        slot.copy_from_slice(bytes)?;
        slot.commit()
    }

    /// Encode `record` directly into a new slot
    pub async fn send_record<R: Record>(
        &self,
        record: &R,
        timeout: Duration,
    ) -> Result<(), SendError> {
        let mut slot = self.try_acquire_write(R::FRAME_LEN, timeout).await?;
        slot.encode(record)??;
        slot.commit()?;
        Ok(())
    }

    /// Send `record`, or drop it with a warning when the channel stays busy
    ///
    /// Returns whether the record was committed. Errors other than `Busy`
    /// are returned; they mean the producer is misconfigured.
    pub async fn send_or_drop<R: Record + std::fmt::Debug>(
        &self,
        record: &R,
        timeout: Duration,
    ) -> Result<bool, SendError> {
        match self.send_record(record, timeout).await {
            Ok(()) => {
                trace!("{}: committed {:?}", self.name(), record);
                Ok(true)
            }
            Err(SendError::Relay(RelayError::Busy { requested, free })) => {
                self.shared.arena.lock().note_dropped();
                warn!(
                    "{}: no space for {} bytes within {:?} ({} free), dropping {:?}",
                    self.name(),
                    requested,
                    timeout,
                    free,
                    record
                );
                Ok(false)
            }
            Err(other) => Err(other),
        }
    }

    /// Take the oldest committed record
    ///
    /// `None` waits forever; `Some(timeout)` fails with `TimedOut` when
    /// nothing is committed before the deadline.
    pub async fn receive(&self, timeout: Option<Duration>) -> RelayResult<Received> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let committed = self.shared.readable.notified();
            tokio::pin!(committed);
            committed.as_mut().enable();

            if let Some((id, len)) = self.shared.arena.lock().pop_ready() {
                return Ok(Received {
                    channel: self.clone(),
                    id: Some(id),
                    len,
                });
            }

            match deadline {
                Some(deadline) => {
                    if time::timeout_at(deadline, committed).await.is_err() {
                        return Err(RelayError::TimedOut);
                    }
                }
                None => committed.await,
            }
        }
    }

    fn commit(&self, id: SlotId) -> RelayResult<()> {
        self.shared.arena.lock().commit(id)?;
        self.shared.readable.notify_one();
        Ok(())
    }

    fn abandon(&self, id: SlotId) -> RelayResult<()> {
        self.shared.arena.lock().abandon(id)?;
        self.shared.writable.notify_waiters();
        Ok(())
    }

    fn release(&self, id: SlotId) -> RelayResult<()> {
        self.shared.arena.lock().release(id)?;
        self.shared.writable.notify_waiters();
        Ok(())
    }
}

/// Why a typed send failed
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum SendError {
    /// Relay refused or timed out
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// Record could not be encoded into the slot
    #[error(transparent)]
    Record(#[from] thermguard_core::RecordError),
}

/// Reserved, not yet committed slot
///
/// Dropping it without [`commit`](WriteSlot::commit) returns the space.
#[derive(Debug)]
pub struct WriteSlot {
    channel: RelayChannel,
    id: Option<SlotId>,
    len: usize,
}

impl WriteSlot {
    /// Slot size in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the slot holds zero bytes
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Write into the slot in place
    pub fn with_bytes_mut<T>(&mut self, f: impl FnOnce(&mut [u8]) -> T) -> RelayResult<T> {
        let id = self.id.ok_or(RelayError::StaleHandle { generation: u32::MAX })?;
        let mut arena = self.channel.shared.arena.lock();
        Ok(f(arena.slot_mut(id)?))
    }

    /// Fill the slot from `bytes`, which must match its size exactly
    pub fn copy_from_slice(&mut self, bytes: &[u8]) -> RelayResult<()> {
        if bytes.len() != self.len {
            return Err(RelayError::LengthMismatch { expected: self.len, actual: bytes.len() });
        }
        self.with_bytes_mut(|slot| slot.copy_from_slice(bytes))
    }

    /// Encode a record straight into the slot
    pub fn encode<R: Record>(&mut self, record: &R) -> RelayResult<RecordResult<()>> {
        self.with_bytes_mut(|slot| record.encode(slot))
    }

    /// Publish the record to the consumer
    pub fn commit(mut self) -> RelayResult<()> {
        match self.id.take() {
            Some(id) => self.channel.commit(id),
            None => Err(RelayError::StaleHandle { generation: u32::MAX }),
        }
    }
}

impl Drop for WriteSlot {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            if let Err(err) = self.channel.abandon(id) {
                warn!("{}: abandoning slot failed: {}", self.channel.name(), err);
            }
        }
    }
}

/// Record borrowed from the channel until released
///
/// The bytes stay in place and unmodified until [`release`](Received::release)
/// or drop.
#[derive(Debug)]
pub struct Received {
    channel: RelayChannel,
    id: Option<SlotId>,
    len: usize,
}

impl Received {
    /// Record length in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether this is a zero-length record
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read the record in place
    pub fn with_bytes<T>(&self, f: impl FnOnce(&[u8]) -> T) -> RelayResult<T> {
        let id = self.id.ok_or(RelayError::StaleHandle { generation: u32::MAX })?;
        let arena = self.channel.shared.arena.lock();
        Ok(f(arena.bytes(id)?))
    }

    /// Copy the record out
    pub fn to_vec(&self) -> RelayResult<Vec<u8>> {
        self.with_bytes(<[u8]>::to_vec)
    }

    /// Decode the record in place
    pub fn decode<R: Record>(&self) -> RelayResult<RecordResult<R>> {
        self.with_bytes(R::decode)
    }

    /// Return the record's space to the channel
    pub fn release(mut self) -> RelayResult<()> {
        match self.id.take() {
            Some(id) => self.channel.release(id),
            None => Err(RelayError::StaleHandle { generation: u32::MAX }),
        }
    }
}

impl Drop for Received {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            if let Err(err) = self.channel.release(id) {
                warn!("{}: releasing record failed: {}", self.channel.name(), err);
            }
        }
    }
}
