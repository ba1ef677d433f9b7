pub mod config;
pub mod serial;
pub mod session;
pub mod terminal;

pub use config::{ConfigError, SettingsStore, TerminalConfig};
pub use serial::{list_ports, list_serial_ports, PortError, PortInfo, PortKind, PortSettings, SerialChannel};
pub use session::{SessionError, TerminalSession};
pub use terminal::{BackspacePolicy, DisplaySurface, FlushScheduler, Terminal, TerminalBuffer};
