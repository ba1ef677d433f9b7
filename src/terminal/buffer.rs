//! Accumulator that batches received bytes for timed display flushes.
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::DisplaySurface;

/// Everything owed to the display by one flush. Deletions apply before the text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushBatch {
    pub deletions: usize,
    pub bytes: Vec<u8>,
}

impl FlushBatch {
    pub fn text(&self) -> String {
        decode_bytes(&self.bytes)
    }

    pub fn apply(&self, display: &dyn DisplaySurface) {
        for _ in 0..self.deletions {
            display.delete_previous_char();
        }
        if !self.bytes.is_empty() {
            display.append_text(&self.text());
        }
    }
}

/// One byte, one character (ISO-8859-1), so a flush boundary never splits a character.
pub fn decode_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

#[derive(Debug, Default)]
struct BufferState {
    pending: Vec<u8>,
    owed_deletions: usize,
    dirty: bool,
}

impl BufferState {
    /// Recompute the dirty flag; returns true on a clean to dirty transition.
    fn refresh(&mut self) -> bool {
        let was_dirty = self.dirty;
        self.dirty = !self.pending.is_empty() || self.owed_deletions > 0;
        !was_dirty && self.dirty
    }
}

/// Pending received bytes, shared by the receive path (append) and the flush tick (drain).
#[derive(Debug, Default)]
pub struct TerminalBuffer {
    state: Mutex<BufferState>,
}

impl TerminalBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one byte. Returns true when the buffer just became dirty, i.e. when the
    /// flush timer has to be armed.
    pub fn append(&self, byte: u8) -> bool {
        let mut state = self.lock();
        state.pending.push(byte);
        state.refresh()
    }

    /// Queue several bytes at once; same arming rule as [`TerminalBuffer::append`].
    pub fn extend(&self, bytes: &[u8]) -> bool {
        let mut state = self.lock();
        state.pending.extend_from_slice(bytes);
        state.refresh()
    }

    /// Remove the most recent character: the last pending byte if there is one, otherwise a
    /// character already on the display (owed to the next flush).
    pub fn erase_previous(&self) -> bool {
        let mut state = self.lock();
        if state.pending.pop().is_none() {
            state.owed_deletions += 1;
        }
        state.refresh()
    }

    /// Take everything pending and mark the buffer clean. `None` when nothing is owed.
    pub fn take(&self) -> Option<FlushBatch> {
        let mut state = self.lock();
        if !state.dirty {
            return None;
        }
        let batch = FlushBatch {
            deletions: std::mem::take(&mut state.owed_deletions),
            bytes: std::mem::take(&mut state.pending),
        };
        state.dirty = false;
        Some(batch)
    }

    /// Flush tick: drain into `display` as one update. Idle ticks do nothing.
    ///
    /// The display is written after the lock is released, so appends never wait on it.
    pub fn on_tick(&self, display: &dyn DisplaySurface) -> bool {
        match self.take() {
            Some(batch) => {
                batch.apply(display);
                true
            }
            None => false,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.lock().dirty
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
