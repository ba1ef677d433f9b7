pub mod buffer;
pub mod echo;
pub mod scheduler;

pub use buffer::{decode_bytes, FlushBatch, TerminalBuffer};
pub use echo::{EchoMatch, EchoSlot};
pub use scheduler::{FlushScheduler, SchedulerConfig, TimerHandle};

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// ASCII backspace
pub const BACKSPACE: u8 = 8;

/// Surface the terminal text is shown on.
///
/// Receives one `append_text` call per flush carrying the whole coalesced chunk.
pub trait DisplaySurface: Send + Sync {
    fn append_text(&self, text: &str);

    /// Remove the last character shown
    fn delete_previous_char(&self);
}

/// What a received backspace (byte 8) does to the display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackspacePolicy {
    /// Remove the previously displayed character
    #[default]
    Erase,
    /// Drop the byte
    Ignore,
    /// Show it like any other byte
    Literal,
}

/// Receive-side policy of the terminal: echo reconciliation, backspace handling and
/// arming the flush timer when the buffer turns dirty.
pub struct Terminal {
    buffer: Arc<TerminalBuffer>,
    timer: TimerHandle,
    echo: EchoSlot,
    backspace: BackspacePolicy,
    local_echo: bool,
}

impl Terminal {
    pub fn new(buffer: Arc<TerminalBuffer>, timer: TimerHandle) -> Self {
        Self {
            buffer,
            timer,
            echo: EchoSlot::new(None),
            backspace: BackspacePolicy::default(),
            local_echo: true,
        }
    }

    pub fn with_backspace(mut self, policy: BackspacePolicy) -> Self {
        self.backspace = policy;
        self
    }

    pub fn with_echo_window(mut self, window: Option<Duration>) -> Self {
        self.echo = EchoSlot::new(window);
        self
    }

    /// Disable optimistic display of typed keystrokes; the remote echo alone shows them.
    pub fn with_local_echo(mut self, enabled: bool) -> Self {
        self.local_echo = enabled;
        self
    }

    pub fn buffer(&self) -> &Arc<TerminalBuffer> {
        &self.buffer
    }

    /// Receive path: called once per byte in wire order.
    pub fn byte_received(&self, byte: u8) {
        match self.echo.reconcile(byte) {
            EchoMatch::Confirmed => return,
            EchoMatch::Mismatch { typed, displayed } => {
                log::debug!("Echo mismatch: typed 0x{:02X}, received 0x{:02X}", typed, byte);
                if displayed {
                    self.arm_if(self.buffer.erase_previous());
                }
            }
            EchoMatch::Idle => {}
        }
        self.show(byte);
    }

    /// Register a keystroke that is about to be sent, so its echo is recognised even
    /// when it arrives before the write returns.
    pub fn expect_echo(&self, byte: u8) {
        if self.local_echo {
            self.echo.record(byte);
        }
    }

    /// Forget the registered keystroke, e.g. after its send failed.
    pub fn cancel_echo(&self) {
        self.echo.clear();
    }

    /// Show a keystroke that was just sent, ahead of the device's echo. Pair with
    /// [`Terminal::expect_echo`] before the send.
    pub fn local_echo(&self, byte: u8) {
        if !self.local_echo {
            return;
        }
        if self.show(byte) {
            self.echo.mark_displayed(byte);
        }
    }

    /// Flush tick; see [`TerminalBuffer::on_tick`].
    pub fn on_tick(&self, display: &dyn DisplaySurface) -> bool {
        self.buffer.on_tick(display)
    }

    /// Apply `byte` to the buffer. Returns true when it appended a character.
    fn show(&self, byte: u8) -> bool {
        let (appended, became_dirty) = match (byte, self.backspace) {
            (BACKSPACE, BackspacePolicy::Erase) => (false, self.buffer.erase_previous()),
            (BACKSPACE, BackspacePolicy::Ignore) => (false, false),
            _ => (true, self.buffer.append(byte)),
        };
        self.arm_if(became_dirty);
        appended
    }

    fn arm_if(&self, became_dirty: bool) {
        // Only the clean to dirty transition restarts the countdown, so a steady stream
        // of bytes still flushes once per interval.
        if became_dirty {
            self.timer.rearm();
        }
    }
}
