pub mod backend;
pub mod channel;
pub mod settings;

pub use backend::{PortStreams, SerialBackend, SystemBackend};
pub use channel::{ByteObserver, SerialChannel};
pub use settings::{DataBits, FlowControl, Parity, PortSettings, StopBits};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of communication endpoint reported by port enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortKind {
    Serial,
    Parallel,
    RS485,
    I2C,
    Raw,
    Unknown,
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PortKind::Serial => "Serial",
            PortKind::Parallel => "Parallel",
            PortKind::RS485 => "RS485",
            PortKind::I2C => "I2C",
            PortKind::Raw => "Raw",
            PortKind::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    pub name: String,
    pub kind: PortKind,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

impl PortInfo {
    pub fn new(name: impl Into<String>, kind: PortKind) -> Self {
        Self {
            name: name.into(),
            kind,
            manufacturer: None,
            product: None,
            serial_number: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Port in use: {0}")]
    PortInUse(String),

    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl PortError {
    /// Translate a serialport failure raised while opening `port_name`.
    pub fn from_open(port_name: &str, err: serialport::Error) -> Self {
        match err.kind() {
            serialport::ErrorKind::NoDevice => {
                PortError::PortInUse(format!("{} ({})", port_name, err.description))
            }
            serialport::ErrorKind::InvalidInput => {
                PortError::UnsupportedConfiguration(err.description)
            }
            serialport::ErrorKind::Io(kind) => {
                PortError::IoError(std::io::Error::new(kind, err.description))
            }
            _ => {
                PortError::IoError(std::io::Error::new(std::io::ErrorKind::Other, err.description))
            }
        }
    }
}

impl From<serialport::Error> for PortError {
    fn from(err: serialport::Error) -> Self {
        PortError::IoError(err.into())
    }
}

pub type Result<T> = std::result::Result<T, PortError>;

/// List the ports the operating system reports. Not cached.
pub fn list_ports() -> Result<Vec<PortInfo>> {
    SystemBackend::default().available_ports()
}

/// List only the serial ports, for populating a port selection.
pub fn list_serial_ports() -> Result<Vec<PortInfo>> {
    Ok(list_ports()?
        .into_iter()
        .filter(|p| p.kind == PortKind::Serial)
        .collect())
}
