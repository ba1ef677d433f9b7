//! Single-slot tracking of the last locally typed keystroke.
//!
//! Only the immediately preceding keystroke is reconciled against the remote echo;
//! typing ahead of the echo is not queued.
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoMatch {
    /// No keystroke is awaiting its echo
    Idle,
    /// The received byte is the echo of the pending keystroke
    Confirmed,
    /// The received byte differs from the pending keystroke. `displayed` is set when the
    /// keystroke already put a character on screen that has to be taken back.
    Mismatch { typed: u8, displayed: bool },
}

#[derive(Debug, Clone, Copy)]
struct Keystroke {
    byte: u8,
    typed_at: Instant,
    displayed: bool,
}

#[derive(Debug)]
pub struct EchoSlot {
    last_typed: Mutex<Option<Keystroke>>,
    window: Option<Duration>,
}

impl EchoSlot {
    /// `window` bounds how long a keystroke waits for its echo; `None` waits forever.
    pub fn new(window: Option<Duration>) -> Self {
        Self {
            last_typed: Mutex::new(None),
            window,
        }
    }

    /// Remember `byte` as the newest keystroke, replacing any older one. Call before the
    /// byte goes out so an echo racing the write still finds it.
    pub fn record(&self, byte: u8) {
        *self.lock() = Some(Keystroke {
            byte,
            typed_at: Instant::now(),
            displayed: false,
        });
    }

    /// Note that the pending keystroke `byte` appended a character to the display.
    /// Does nothing if its echo already arrived.
    pub fn mark_displayed(&self, byte: u8) {
        if let Some(keystroke) = self.lock().as_mut().filter(|k| k.byte == byte) {
            keystroke.displayed = true;
        }
    }

    pub fn clear(&self) {
        self.lock().take();
    }

    /// Compare a received byte with the remembered keystroke and clear the slot.
    pub fn reconcile(&self, received: u8) -> EchoMatch {
        match self.lock().take() {
            Some(k) if self.is_stale(k.typed_at) => EchoMatch::Idle,
            Some(k) if k.byte == received => EchoMatch::Confirmed,
            Some(k) => EchoMatch::Mismatch {
                typed: k.byte,
                displayed: k.displayed,
            },
            None => EchoMatch::Idle,
        }
    }

    fn is_stale(&self, typed_at: Instant) -> bool {
        self.window.map_or(false, |window| typed_at.elapsed() > window)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Keystroke>> {
        self.last_typed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_echo_is_confirmed_once() {
        let slot = EchoSlot::new(None);
        slot.record(b'a');
        assert_eq!(slot.reconcile(b'a'), EchoMatch::Confirmed);
        assert_eq!(slot.reconcile(b'a'), EchoMatch::Idle);
    }

    #[test]
    fn test_mismatch_reports_typed_byte() {
        let slot = EchoSlot::new(None);
        slot.record(b'a');
        assert_eq!(slot.reconcile(b'b'), EchoMatch::Mismatch { typed: b'a', displayed: false });
    }

    #[test]
    fn test_mark_displayed_applies_to_pending_keystroke() {
        let slot = EchoSlot::new(None);
        slot.record(b'a');
        slot.mark_displayed(b'z');
        slot.mark_displayed(b'a');
        assert_eq!(slot.reconcile(b'b'), EchoMatch::Mismatch { typed: b'a', displayed: true });

        // Echo already consumed the keystroke: nothing left to mark
        slot.record(b'c');
        assert_eq!(slot.reconcile(b'c'), EchoMatch::Confirmed);
        slot.mark_displayed(b'c');
        assert_eq!(slot.reconcile(b'x'), EchoMatch::Idle);
    }

    #[test]
    fn test_clear_forgets_keystroke() {
        let slot = EchoSlot::new(None);
        slot.record(b'a');
        slot.clear();
        assert_eq!(slot.reconcile(b'b'), EchoMatch::Idle);
    }

    #[test]
    fn test_only_last_keystroke_is_tracked() {
        let slot = EchoSlot::new(None);
        slot.record(b'a');
        slot.record(b'b');
        assert_eq!(slot.reconcile(b'a'), EchoMatch::Mismatch { typed: b'b', displayed: false });
        assert_eq!(slot.reconcile(b'b'), EchoMatch::Idle);
    }

    #[test]
    fn test_stale_keystroke_is_ignored() {
        let slot = EchoSlot::new(Some(Duration::from_millis(1)));
        slot.record(b'a');
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(slot.reconcile(b'a'), EchoMatch::Idle);
    }
}
