//! Port configuration record and its string conversions.
//!
//! Every string conversion here is total: input that is not recognised resolves to the
//! documented default instead of failing. Possible string values (case agnostic):
//!
//! - data bits: `"5"`, `"6"`, `"7"`, `"8"`
//! - stop bits: `"1"`, `"1.5"`, `"2"`
//! - parity: `"None"`, `"Odd"`, `"Even"`, `"Mark"`, `"Space"`
//! - flow control: `"None"`, `"RtsCts In"`, `"RtsCts Out"`, `"XonXoff In"`, `"XonXoff Out"`
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{PortError, Result};

pub const KEY_DESCRIPTION: &str = "description";
pub const KEY_PORT_NAME: &str = "comm.port.name";
pub const KEY_BAUD_RATE: &str = "baud.rate";
pub const KEY_DATA_BITS: &str = "data.bits";
pub const KEY_STOP_BITS: &str = "stop.bits";
pub const KEY_PARITY: &str = "parity";
pub const KEY_FLOW_CONTROL: &str = "flow.control";

pub const DEFAULT_DESCRIPTION: &str = "Undefined";
pub const DEFAULT_BAUD_RATE: u32 = 4800;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    #[default]
    Eight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StopBits {
    #[default]
    One,
    OnePointFive,
    Two,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
    Mark,
    Space,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FlowControl {
    #[default]
    None,
    RtsCtsIn,
    RtsCtsOut,
    XonXoffIn,
    XonXoffOut,
}

impl DataBits {
    pub fn as_setting(&self) -> &'static str {
        match self {
            DataBits::Five => "5",
            DataBits::Six => "6",
            DataBits::Seven => "7",
            DataBits::Eight => "8",
        }
    }
}

impl StopBits {
    pub fn as_setting(&self) -> &'static str {
        match self {
            StopBits::One => "1",
            StopBits::OnePointFive => "1.5",
            StopBits::Two => "2",
        }
    }
}

impl Parity {
    pub fn as_setting(&self) -> &'static str {
        match self {
            Parity::None => "None",
            Parity::Odd => "Odd",
            Parity::Even => "Even",
            Parity::Mark => "Mark",
            Parity::Space => "Space",
        }
    }
}

impl FlowControl {
    pub fn as_setting(&self) -> &'static str {
        match self {
            FlowControl::None => "None",
            FlowControl::RtsCtsIn => "RtsCts In",
            FlowControl::RtsCtsOut => "RtsCts Out",
            FlowControl::XonXoffIn => "XonXoff In",
            FlowControl::XonXoffOut => "XonXoff Out",
        }
    }
}

/// Convert a data bits string to its enum value. Anything unrecognised is 8 data bits.
pub fn to_raw_data_bits(s: &str) -> DataBits {
    match s.trim().to_lowercase().as_str() {
        "5" => DataBits::Five,
        "6" => DataBits::Six,
        "7" => DataBits::Seven,
        _ => DataBits::Eight,
    }
}

/// Convert a stop bits string to its enum value. Anything unrecognised is 1 stop bit.
pub fn to_raw_stop_bits(s: &str) -> StopBits {
    match s.trim().to_lowercase().as_str() {
        "2" => StopBits::Two,
        "1.5" => StopBits::OnePointFive,
        _ => StopBits::One,
    }
}

/// Convert a parity string to its enum value. Anything unrecognised is no parity.
pub fn to_raw_parity(s: &str) -> Parity {
    match s.trim().to_lowercase().as_str() {
        "odd" => Parity::Odd,
        "even" => Parity::Even,
        "mark" => Parity::Mark,
        "space" => Parity::Space,
        _ => Parity::None,
    }
}

/// Convert a flow control string to its enum value. Anything unrecognised is no flow control.
pub fn to_raw_flow_control(s: &str) -> FlowControl {
    match s.trim().to_lowercase().as_str() {
        "rtscts in" => FlowControl::RtsCtsIn,
        "rtscts out" => FlowControl::RtsCtsOut,
        "xonxoff in" => FlowControl::XonXoffIn,
        "xonxoff out" => FlowControl::XonXoffOut,
        _ => FlowControl::None,
    }
}

/// Configuration of a named port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSettings {
    pub description: String,
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub flow_control: FlowControl,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            description: DEFAULT_DESCRIPTION.to_string(),
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::default(),
            stop_bits: StopBits::default(),
            parity: Parity::default(),
            flow_control: FlowControl::default(),
        }
    }
}

impl PortSettings {
    /// Settings for `port_name` at `baud_rate`, 8/N/1 without flow control.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Self::default()
        }
    }

    /// Build settings from persisted key-value pairs. Never fails: missing keys and
    /// unrecognised values resolve to the defaults.
    pub fn from_strings(map: &BTreeMap<String, String>) -> Self {
        let defaults = Self::default();
        let get = |key: &str| map.get(key).map(String::as_str);

        let baud_rate = match get(KEY_BAUD_RATE) {
            Some(raw) => raw.trim().parse::<u32>().unwrap_or_else(|_| {
                log::warn!("Invalid baud rate '{}', using {}", raw, DEFAULT_BAUD_RATE);
                DEFAULT_BAUD_RATE
            }),
            None => defaults.baud_rate,
        };

        let settings = Self {
            description: get(KEY_DESCRIPTION)
                .map(str::to_string)
                .unwrap_or(defaults.description),
            port_name: get(KEY_PORT_NAME)
                .map(str::to_string)
                .unwrap_or(defaults.port_name),
            baud_rate,
            data_bits: get(KEY_DATA_BITS).map(to_raw_data_bits).unwrap_or_default(),
            stop_bits: get(KEY_STOP_BITS).map(to_raw_stop_bits).unwrap_or_default(),
            parity: get(KEY_PARITY).map(to_raw_parity).unwrap_or_default(),
            flow_control: get(KEY_FLOW_CONTROL).map(to_raw_flow_control).unwrap_or_default(),
        };

        log_fallback(get(KEY_DATA_BITS), settings.data_bits.as_setting(), KEY_DATA_BITS);
        log_fallback(get(KEY_STOP_BITS), settings.stop_bits.as_setting(), KEY_STOP_BITS);
        log_fallback(get(KEY_PARITY), settings.parity.as_setting(), KEY_PARITY);
        log_fallback(get(KEY_FLOW_CONTROL), settings.flow_control.as_setting(), KEY_FLOW_CONTROL);

        settings
    }

    /// Render the settings as persisted key-value pairs using the canonical spellings.
    pub fn to_strings(&self) -> BTreeMap<String, String> {
        [
            (KEY_DESCRIPTION, self.description.clone()),
            (KEY_PORT_NAME, self.port_name.clone()),
            (KEY_BAUD_RATE, self.baud_rate.to_string()),
            (KEY_DATA_BITS, self.data_bits.as_setting().to_string()),
            (KEY_STOP_BITS, self.stop_bits.as_setting().to_string()),
            (KEY_PARITY, self.parity.as_setting().to_string()),
            (KEY_FLOW_CONTROL, self.flow_control.as_setting().to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    /// Human-readable block with one labelled line per field.
    pub fn to_display_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PortSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "-Port Settings-")?;
        writeln!(f, "  Description:  {}", self.description)?;
        writeln!(f, "  Port Name:  {}", self.port_name)?;
        writeln!(f, "  Baud Rate:  {}", self.baud_rate)?;
        writeln!(f, "  Data Bits:  {}", self.data_bits.as_setting())?;
        writeln!(f, "  Stop Bits:  {}", self.stop_bits.as_setting())?;
        writeln!(f, "  Parity:  {}", self.parity.as_setting())?;
        write!(f, "  Flow Control:  {}", self.flow_control.as_setting())
    }
}

fn log_fallback(raw: Option<&str>, resolved: &str, key: &str) {
    if let Some(raw) = raw {
        if !raw.trim().eq_ignore_ascii_case(resolved) {
            log::debug!("Setting {}='{}' not recognised, using '{}'", key, raw, resolved);
        }
    }
}

// ============================================================================
// serialport conversions
// ============================================================================

pub fn to_serialport_data_bits(bits: DataBits) -> serialport::DataBits {
    match bits {
        DataBits::Five => serialport::DataBits::Five,
        DataBits::Six => serialport::DataBits::Six,
        DataBits::Seven => serialport::DataBits::Seven,
        DataBits::Eight => serialport::DataBits::Eight,
    }
}

/// 1.5 stop bits has no serialport equivalent.
pub fn to_serialport_stop_bits(bits: StopBits) -> Result<serialport::StopBits> {
    match bits {
        StopBits::One => Ok(serialport::StopBits::One),
        StopBits::Two => Ok(serialport::StopBits::Two),
        StopBits::OnePointFive => Err(PortError::UnsupportedConfiguration(
            "1.5 stop bits".to_string(),
        )),
    }
}

/// Mark and space parity have no serialport equivalent.
pub fn to_serialport_parity(parity: Parity) -> Result<serialport::Parity> {
    match parity {
        Parity::None => Ok(serialport::Parity::None),
        Parity::Odd => Ok(serialport::Parity::Odd),
        Parity::Even => Ok(serialport::Parity::Even),
        Parity::Mark | Parity::Space => Err(PortError::UnsupportedConfiguration(format!(
            "{} parity",
            parity.as_setting()
        ))),
    }
}

pub fn to_serialport_flow_control(flow: FlowControl) -> serialport::FlowControl {
    match flow {
        FlowControl::None => serialport::FlowControl::None,
        FlowControl::RtsCtsIn | FlowControl::RtsCtsOut => serialport::FlowControl::Hardware,
        FlowControl::XonXoffIn | FlowControl::XonXoffOut => serialport::FlowControl::Software,
    }
}
