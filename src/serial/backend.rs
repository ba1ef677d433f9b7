//! Platform access for the serial channel.
use std::io::{Read, Write};
use std::time::Duration;

use serialport::SerialPortType;

use super::settings::{
    to_serialport_data_bits, to_serialport_flow_control, to_serialport_parity,
    to_serialport_stop_bits, PortSettings,
};
use super::{PortError, PortInfo, PortKind, Result};

pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Independent byte streams of one open port. The reader is moved to the receive
/// thread while the writer stays with the sender, so neither direction waits on the other.
pub struct PortStreams {
    pub reader: Box<dyn Read + Send>,
    pub writer: Box<dyn Write + Send>,
}

/// Source of ports for a [`super::SerialChannel`].
pub trait SerialBackend: Send + Sync {
    /// Enumerate the ports currently present
    fn available_ports(&self) -> Result<Vec<PortInfo>>;

    /// Open and configure the port named in `settings`.
    ///
    /// Reads on the returned reader must return within a bounded time (a timeout error or
    /// `Ok(0)` when idle) so the receive thread can observe cancellation.
    fn open(&self, settings: &PortSettings) -> Result<PortStreams>;
}

/// Backend over the operating system's serial ports
pub struct SystemBackend {
    read_timeout: Duration,
}

impl SystemBackend {
    pub fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }
}

impl Default for SystemBackend {
    fn default() -> Self {
        Self::new(DEFAULT_READ_TIMEOUT)
    }
}

impl SerialBackend for SystemBackend {
    fn available_ports(&self) -> Result<Vec<PortInfo>> {
        let ports = serialport::available_ports()?;
        let mut infos = Vec::with_capacity(ports.len());

        for port in ports {
            // serialport only enumerates serial devices; the bus type just adds detail
            let mut info = PortInfo::new(port.port_name, PortKind::Serial);
            if let SerialPortType::UsbPort(usb_info) = port.port_type {
                info.manufacturer = usb_info.manufacturer;
                info.product = usb_info.product;
                info.serial_number = usb_info.serial_number;
            }
            infos.push(info);
        }

        Ok(infos)
    }

    fn open(&self, settings: &PortSettings) -> Result<PortStreams> {
        if settings.baud_rate == 0 {
            return Err(PortError::UnsupportedConfiguration(
                "baud rate 0".to_string(),
            ));
        }

        let port = serialport::new(settings.port_name.as_str(), settings.baud_rate)
            .data_bits(to_serialport_data_bits(settings.data_bits))
            .stop_bits(to_serialport_stop_bits(settings.stop_bits)?)
            .parity(to_serialport_parity(settings.parity)?)
            .flow_control(to_serialport_flow_control(settings.flow_control))
            .timeout(self.read_timeout)
            .open()
            .map_err(|e| PortError::from_open(&settings.port_name, e))?;

        let reader = port.try_clone()?;

        Ok(PortStreams {
            reader: Box::new(reader),
            writer: Box::new(port),
        })
    }
}
