//! # Stock-Change Audit Trail
//!
//! Append-only, in-process log of every ledger mutation.
//!
//! ```text
//! ┌──────────────┐  record()   ┌──────────────────────────────┐
//! │   Ledger     │────────────►│  #1 initialize MUG-01 0→10   │
//! │ (under the   │             │  #2 reserve    MUG-01 10→6   │
//! │  product     │             │  #3 confirm    MUG-01 6→6    │
//! │  lock)       │             │  ...                          │
//! └──────────────┘             └──────────────┬───────────────┘
//!                                             │ entries_since(n)
//!                                             ▼
//!                              StockChangeRepository (tally-db)
//! ```
//!
//! The ledger appends while still holding the product's lock, so for any one
//! product the trail order equals the mutation order.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use crate::types::{ProductStock, StockChange, StockChangeKind};

#[derive(Debug, Default)]
struct TrailState {
    entries: Vec<StockChange>,
    /// Sequence number of the last entry dropped by `truncate_through`.
    trimmed_through: i64,
}

impl TrailState {
    fn last_sequence(&self) -> i64 {
        self.trimmed_through + self.entries.len() as i64
    }

    /// Index of the first retained entry with a sequence above `sequence`.
    fn index_after(&self, sequence: i64) -> usize {
        (sequence - self.trimmed_through).clamp(0, self.entries.len() as i64) as usize
    }
}

/// Shared append-only trail of [`StockChange`] entries.
///
/// Sequence numbers keep counting across [`truncate_through`](Self::truncate_through),
/// so a reader that remembers the last sequence it saw never misses or
/// repeats an entry.
#[derive(Debug, Default)]
pub struct StockAuditTrail {
    state: Mutex<TrailState>,
}

impl StockAuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TrailState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends an entry describing the move from `before` to `after`.
    ///
    /// Returns the recorded entry with its assigned sequence number.
    pub fn record(
        &self,
        kind: StockChangeKind,
        before: &ProductStock,
        after: &ProductStock,
        reason: &str,
    ) -> StockChange {
        let mut state = self.lock();

        let change = StockChange {
            sequence: state.last_sequence() + 1,
            product_id: after.product_id.clone(),
            kind,
            old_quantity: before.available,
            new_quantity: after.available,
            delta: after.available - before.available,
            reserved_before: before.reserved,
            reserved_after: after.reserved,
            reason: reason.to_string(),
            recorded_at: Utc::now(),
        };
        state.entries.push(change.clone());
        change
    }

    /// Retained entries, oldest first.
    pub fn entries(&self) -> Vec<StockChange> {
        self.lock().entries.clone()
    }

    pub fn entries_for(&self, product_id: &str) -> Vec<StockChange> {
        self.lock()
            .entries
            .iter()
            .filter(|e| e.product_id == product_id)
            .cloned()
            .collect()
    }

    /// Retained entries with a sequence number greater than `sequence`.
    pub fn entries_since(&self, sequence: i64) -> Vec<StockChange> {
        let state = self.lock();
        let start = state.index_after(sequence);
        state.entries[start..].to_vec()
    }

    /// Drops every entry up to and including `sequence`.
    ///
    /// Called once those entries are stored elsewhere. Returns how many
    /// entries were dropped.
    pub fn truncate_through(&self, sequence: i64) -> usize {
        let mut state = self.lock();
        let count = state.index_after(sequence);
        state.entries.drain(..count);
        state.trimmed_through += count as i64;
        count
    }

    /// Sequence number of the newest entry ever recorded, 0 if none.
    pub fn last_sequence(&self) -> i64 {
        self.lock().last_sequence()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
