#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sterm_x_lib::serial::{PortInfo, PortKind, PortStreams, SerialBackend};
use sterm_x_lib::{DisplaySurface, PortError, PortSettings};

const READ_TIMEOUT: Duration = Duration::from_millis(10);

enum Incoming {
    Data(Vec<u8>),
    Unplug,
}

/// In-memory serial backend. Bytes passed to [`LoopbackBackend::feed`] arrive on the
/// receive side of the most recently opened port; writes are collected for inspection.
pub struct LoopbackBackend {
    ports: Vec<PortInfo>,
    feeder: Mutex<Option<mpsc::Sender<Incoming>>>,
    written: Arc<Mutex<Vec<u8>>>,
    unplugged: Arc<AtomicBool>,
    echo_delay: Option<Duration>,
}

impl LoopbackBackend {
    pub fn new(names: &[&str]) -> Arc<Self> {
        Arc::new(Self::build(names, None))
    }

    /// A device that echoes every written byte straight back, while the write itself
    /// takes `flush_delay` to complete.
    pub fn echoing(names: &[&str], flush_delay: Duration) -> Arc<Self> {
        Arc::new(Self::build(names, Some(flush_delay)))
    }

    fn build(names: &[&str], echo_delay: Option<Duration>) -> Self {
        let mut ports: Vec<PortInfo> = names.iter().map(|n| PortInfo::new(*n, PortKind::Serial)).collect();
        ports.push(PortInfo::new("LPT1", PortKind::Parallel));

        Self {
            ports,
            feeder: Mutex::new(None),
            written: Arc::new(Mutex::new(Vec::new())),
            unplugged: Arc::new(AtomicBool::new(false)),
            echo_delay,
        }
    }

    pub fn feed(&self, bytes: &[u8]) {
        if let Some(tx) = self.feeder.lock().unwrap().as_ref() {
            let _ = tx.send(Incoming::Data(bytes.to_vec()));
        }
    }

    /// Simulate the device disappearing while open
    pub fn unplug(&self) {
        self.unplugged.store(true, Ordering::SeqCst);
        if let Some(tx) = self.feeder.lock().unwrap().as_ref() {
            let _ = tx.send(Incoming::Unplug);
        }
    }

    pub fn written(&self) -> Vec<u8> {
        self.written.lock().unwrap().clone()
    }
}

impl SerialBackend for LoopbackBackend {
    fn available_ports(&self) -> Result<Vec<PortInfo>, PortError> {
        Ok(self.ports.clone())
    }

    fn open(&self, _settings: &PortSettings) -> Result<PortStreams, PortError> {
        let (tx, rx) = mpsc::channel();
        let echo = self.echo_delay.map(|delay| (tx.clone(), delay));
        *self.feeder.lock().unwrap() = Some(tx);
        self.unplugged.store(false, Ordering::SeqCst);

        Ok(PortStreams {
            reader: Box::new(LoopbackReader { rx, pending: VecDeque::new() }),
            writer: Box::new(LoopbackWriter {
                sink: self.written.clone(),
                unplugged: self.unplugged.clone(),
                echo,
            }),
        })
    }
}

struct LoopbackReader {
    rx: mpsc::Receiver<Incoming>,
    pending: VecDeque<u8>,
}

impl Read for LoopbackReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv_timeout(READ_TIMEOUT) {
                Ok(Incoming::Data(bytes)) => self.pending.extend(bytes),
                Ok(Incoming::Unplug) => return Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")),
                Err(RecvTimeoutError::Timeout) => return Err(io::Error::new(io::ErrorKind::TimedOut, "timeout")),
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }

        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

struct LoopbackWriter {
    sink: Arc<Mutex<Vec<u8>>>,
    unplugged: Arc<AtomicBool>,
    echo: Option<(mpsc::Sender<Incoming>, Duration)>,
}

impl Write for LoopbackWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.unplugged.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"));
        }
        self.sink.lock().unwrap().extend_from_slice(buf);
        if let Some((tx, _)) = &self.echo {
            let _ = tx.send(Incoming::Data(buf.to_vec()));
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        // Hold the sender here while the echo is already on its way back
        if let Some((_, delay)) = &self.echo {
            std::thread::sleep(*delay);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayEvent {
    Append(String),
    Delete,
}

/// Display surface that records every call it receives
#[derive(Default)]
pub struct RecordingDisplay {
    events: Mutex<Vec<DisplayEvent>>,
}

impl RecordingDisplay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<DisplayEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn appends(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DisplayEvent::Append(text) => Some(text),
                DisplayEvent::Delete => None,
            })
            .collect()
    }

    /// What the screen shows after replaying every call
    pub fn text(&self) -> String {
        let mut screen = String::new();
        for event in self.events() {
            match event {
                DisplayEvent::Append(text) => screen.push_str(&text),
                DisplayEvent::Delete => {
                    screen.pop();
                }
            }
        }
        screen
    }
}

impl DisplaySurface for RecordingDisplay {
    fn append_text(&self, text: &str) {
        self.events.lock().unwrap().push(DisplayEvent::Append(text.to_string()));
    }

    fn delete_previous_char(&self) {
        self.events.lock().unwrap().push(DisplayEvent::Delete);
    }
}

/// Poll `cond` on the calling thread for up to two seconds.
pub fn wait_until(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}
