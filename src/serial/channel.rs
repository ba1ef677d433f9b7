use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::backend::SerialBackend;
use super::settings::PortSettings;
use super::{PortError, PortKind, Result};

const READ_CHUNK: usize = 1024;
const IDLE_BACKOFF: Duration = Duration::from_millis(10);

/// Receiver of bytes read from an open port.
///
/// Called once per byte, in arrival order, from the channel's receive thread.
pub trait ByteObserver: Send + Sync {
    fn byte_received(&self, byte: u8);
}

impl<F> ByteObserver for F
where
    F: Fn(u8) + Send + Sync,
{
    fn byte_received(&self, byte: u8) {
        self(byte)
    }
}

/// Flags shared between one open port and its receive thread
struct ReaderFlags {
    running: AtomicBool,
    lost: AtomicBool,
}

impl ReaderFlags {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            lost: AtomicBool::new(false),
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// Hand `bytes` to the observer one at a time. Stops as soon as the port is closed,
    /// so a delivery racing `close()` is dropped instead of reaching the observer.
    fn deliver(&self, observer: &dyn ByteObserver, bytes: &[u8]) {
        for &byte in bytes {
            if !self.is_running() {
                return;
            }
            observer.byte_received(byte);
        }
    }
}

struct PortWriter {
    stream: Box<dyn Write + Send>,
    flags: Arc<ReaderFlags>,
}

struct OpenPort {
    settings: PortSettings,
    flags: Arc<ReaderFlags>,
    reader: Option<JoinHandle<()>>,
}

/// An exclusively owned serial port with an event-driven receive path.
///
/// The observer is registered once, at construction, and outlives every port the channel
/// opens. Reading and writing use separate locks so a slow write never delays delivery.
pub struct SerialChannel {
    backend: Arc<dyn SerialBackend>,
    observer: Arc<dyn ByteObserver>,
    state: Mutex<Option<OpenPort>>,
    writer: Mutex<Option<PortWriter>>,
}

impl SerialChannel {
    pub fn new(backend: Arc<dyn SerialBackend>, observer: Arc<dyn ByteObserver>) -> Self {
        Self {
            backend,
            observer,
            state: Mutex::new(None),
            writer: Mutex::new(None),
        }
    }

    /// Open the serial port named by `settings.port_name` (exact match) and start
    /// delivering received bytes to the observer.
    pub fn open(&self, settings: &PortSettings) -> Result<()> {
        let mut state = lock(&self.state);
        if let Some(open) = state.as_ref() {
            return Err(PortError::PortInUse(format!(
                "{} (channel already open on {})",
                settings.port_name, open.settings.port_name
            )));
        }

        let ports = self.backend.available_ports()?;
        let found = ports
            .iter()
            .any(|p| p.kind == PortKind::Serial && p.name == settings.port_name);
        if !found {
            return Err(PortError::PortNotFound(settings.port_name.clone()));
        }

        let streams = self.backend.open(settings)?;
        let flags = Arc::new(ReaderFlags::new());
        let reader = spawn_reader(
            streams.reader,
            flags.clone(),
            self.observer.clone(),
            settings.port_name.clone(),
        )?;

        *lock(&self.writer) = Some(PortWriter {
            stream: streams.writer,
            flags: flags.clone(),
        });
        *state = Some(OpenPort {
            settings: settings.clone(),
            flags,
            reader: Some(reader),
        });

        log::info!(
            "Opened {} at {} baud ({}/{}/{}, flow control {})",
            settings.port_name,
            settings.baud_rate,
            settings.data_bits.as_setting(),
            settings.parity.as_setting(),
            settings.stop_bits.as_setting(),
            settings.flow_control.as_setting()
        );
        Ok(())
    }

    /// Write one byte to the port immediately. There is no outbound queue.
    pub fn send(&self, byte: u8) -> Result<()> {
        let mut writer = lock(&self.writer);
        let port = writer.as_mut().ok_or_else(not_open)?;
        if port.flags.is_lost() {
            return Err(port_gone());
        }

        let written = port
            .stream
            .write_all(&[byte])
            .and_then(|_| port.stream.flush());
        if let Err(e) = written {
            if is_port_gone(e.kind()) {
                port.flags.lost.store(true, Ordering::Release);
            }
            return Err(PortError::IoError(e));
        }
        Ok(())
    }

    /// Close the port and stop the receive thread. Closing a closed channel does nothing.
    ///
    /// Once this returns the observer is not called again for the closed port. A port
    /// that disappeared while open is still released, but reported as an `IoError`.
    pub fn close(&self) -> Result<()> {
        let Some(mut open) = lock(&self.state).take() else {
            return Ok(());
        };

        open.flags.running.store(false, Ordering::Release);
        drop(lock(&self.writer).take());

        if let Some(handle) = open.reader.take() {
            if handle.thread().id() == thread::current().id() {
                // Closed from inside the observer; the thread exits once it returns
                log::debug!("{} closed from its receive thread", open.settings.port_name);
            } else if handle.join().is_err() {
                log::warn!("Receive thread for {} panicked", open.settings.port_name);
            }
        }

        log::info!("Closed {}", open.settings.port_name);
        if open.flags.is_lost() {
            return Err(port_gone());
        }
        Ok(())
    }

    /// True while a port is open and still present
    pub fn is_open(&self) -> bool {
        lock(&self.state)
            .as_ref()
            .map_or(false, |open| !open.flags.is_lost())
    }

    /// Settings the current port was opened with
    pub fn settings(&self) -> Option<PortSettings> {
        lock(&self.state).as_ref().map(|open| open.settings.clone())
    }

    pub fn port_name(&self) -> Option<String> {
        lock(&self.state)
            .as_ref()
            .map(|open| open.settings.port_name.clone())
    }
}

impl Drop for SerialChannel {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::debug!("Error closing port on drop: {}", e);
        }
    }
}

fn spawn_reader(
    mut reader: Box<dyn Read + Send>,
    flags: Arc<ReaderFlags>,
    observer: Arc<dyn ByteObserver>,
    port_name: String,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("serial-rx {}", port_name))
        .spawn(move || {
            let mut buf = [0u8; READ_CHUNK];
            while flags.is_running() {
                match reader.read(&mut buf) {
                    Ok(0) => thread::sleep(IDLE_BACKOFF),
                    Ok(n) => flags.deliver(observer.as_ref(), &buf[..n]),
                    Err(e) if is_idle(e.kind()) => {}
                    Err(e) if is_port_gone(e.kind()) => {
                        log::warn!("Port {} is no longer available: {}", port_name, e);
                        flags.lost.store(true, Ordering::Release);
                        break;
                    }
                    Err(e) => {
                        // No caller to report to; keep the port usable for later data
                        log::debug!("Read failure on {}: {}", port_name, e);
                        thread::sleep(IDLE_BACKOFF);
                    }
                }
            }
            log::debug!("Receive thread for {} stopped", port_name);
        })
}

fn is_idle(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

fn is_port_gone(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotFound
    )
}

fn not_open() -> PortError {
    PortError::IoError(io::Error::new(io::ErrorKind::NotConnected, "port is not open"))
}

fn port_gone() -> PortError {
    PortError::IoError(io::Error::new(
        io::ErrorKind::NotConnected,
        "port is no longer available",
    ))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn test_deliver_in_order() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        let observer = move |b: u8| sink.lock().unwrap().push(b);
        let flags = ReaderFlags::new();

        flags.deliver(&observer, b"abc");
        flags.deliver(&observer, b"de");

        assert_eq!(*seen.lock().unwrap(), b"abcde".to_vec());
    }

    #[test]
    fn test_deliver_after_close_is_dropped() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        let observer = move |b: u8| sink.lock().unwrap().push(b);
        let flags = ReaderFlags::new();
        flags.running.store(false, Ordering::Release);

        flags.deliver(&observer, b"late");

        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_close_mid_chunk_stops_delivery() {
        let flags = Arc::new(ReaderFlags::new());
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let (f, sink) = (flags.clone(), seen.clone());
        // The observer closes after the second byte
        let observer = move |b: u8| {
            let mut seen = sink.lock().unwrap();
            seen.push(b);
            if seen.len() == 2 {
                f.running.store(false, Ordering::Release);
            }
        };

        flags.deliver(&observer, b"12345");

        assert_eq!(*seen.lock().unwrap(), b"12".to_vec());
    }

    #[test]
    fn test_error_classification() {
        assert!(is_idle(io::ErrorKind::TimedOut));
        assert!(!is_idle(io::ErrorKind::BrokenPipe));
        assert!(is_port_gone(io::ErrorKind::BrokenPipe));
        assert!(is_port_gone(io::ErrorKind::NotConnected));
        assert!(!is_port_gone(io::ErrorKind::InvalidData));
    }
}
