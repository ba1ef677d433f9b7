use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::{ConfigError, SettingsStore, TerminalConfig};
use crate::serial::{ByteObserver, PortError, PortSettings, SerialBackend, SerialChannel};
use crate::terminal::{DisplaySurface, FlushScheduler, Terminal, TerminalBuffer};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Port error: {0}")]
    Port(#[from] PortError),

    #[error("Settings error: {0}")]
    Config(#[from] ConfigError),

    #[error("Port settings cannot change while the port is open")]
    SettingsLocked,
}

/// One terminal window's worth of state: the serial channel, the receive buffer and
/// the flush timer that drains it into the display.
pub struct TerminalSession {
    channel: SerialChannel,
    terminal: Arc<Terminal>,
    display: Arc<dyn DisplaySurface>,
    scheduler: FlushScheduler,
    settings: Mutex<PortSettings>,
}

impl TerminalSession {
    /// Must be called inside a tokio runtime (the flush timer is a task).
    pub fn new(
        backend: Arc<dyn SerialBackend>,
        display: Arc<dyn DisplaySurface>,
        settings: PortSettings,
        config: &TerminalConfig,
    ) -> Self {
        let buffer = Arc::new(TerminalBuffer::new());

        let (tick_buffer, tick_display) = (buffer.clone(), display.clone());
        let scheduler = FlushScheduler::spawn(config.scheduler(), move || {
            tick_buffer.on_tick(tick_display.as_ref());
        });

        let terminal = Arc::new(
            Terminal::new(buffer, scheduler.handle())
                .with_backspace(config.backspace)
                .with_echo_window(config.echo_window())
                .with_local_echo(config.local_echo),
        );

        let receiver = terminal.clone();
        let observer: Arc<dyn ByteObserver> = Arc::new(move |byte: u8| receiver.byte_received(byte));
        let channel = SerialChannel::new(backend, observer);

        Self {
            channel,
            terminal,
            display,
            scheduler,
            settings: Mutex::new(settings),
        }
    }

    /// Open the port with the current settings. On failure the session stays closed and
    /// can be retried, e.g. after [`TerminalSession::update_settings`].
    pub fn open(&self) -> Result<(), PortError> {
        let settings = self.settings();
        self.channel.open(&settings)
    }

    pub fn close(&self) -> Result<(), PortError> {
        self.channel.close()
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_open()
    }

    /// Send a keystroke. Only a byte that reached the port is echoed locally.
    pub fn key_typed(&self, byte: u8) -> Result<(), PortError> {
        // The device may echo before the write returns
        self.terminal.expect_echo(byte);
        if let Err(e) = self.channel.send(byte) {
            self.terminal.cancel_echo();
            return Err(e);
        }
        self.terminal.local_echo(byte);
        Ok(())
    }

    pub fn settings(&self) -> PortSettings {
        lock(&self.settings).clone()
    }

    /// Replace the port settings; only allowed while the port is closed.
    pub fn update_settings(&self, settings: PortSettings) -> Result<(), SessionError> {
        let mut current = lock(&self.settings);
        if self.channel.port_name().is_some() {
            return Err(SessionError::SettingsLocked);
        }
        *current = settings;
        Ok(())
    }

    pub fn terminal(&self) -> &Arc<Terminal> {
        &self.terminal
    }

    /// End the session: persist the settings and close the port (each attempted even if
    /// the other fails), then stop the flush timer and flush what is still pending.
    /// Returns the first failure.
    pub async fn shutdown(self, store: Option<&SettingsStore>) -> Result<(), SessionError> {
        let saved = match store {
            Some(store) => store.save(&self.settings()).map_err(SessionError::from),
            None => Ok(()),
        };
        if let Err(e) = &saved {
            log::error!("Failed to save port settings: {}", e);
        }

        let closed = self.channel.close().map_err(SessionError::from);
        if let Err(e) = &closed {
            log::error!("Failed to close port: {}", e);
        }

        self.scheduler.stop().await;
        self.terminal.on_tick(self.display.as_ref());
        saved.and(closed)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
