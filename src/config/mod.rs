pub mod profiles;
pub mod read_config;

use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt};

pub type BaudRate = u32;
pub const DEFAULT_BAUD_RATE: BaudRate = 115_200;
pub const DEFAULT_CAN_BAUD_RATE: BaudRate = 500_000;
pub const DEFAULT_PORT: &str = "/dev/tty.usbserial-1140";

/// How the adapter bridges serial bytes onto the bus.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(try_from = "u8", into = "u8")]
pub enum WorkMode {
    Transparent = 1,
    TransparentWithId = 2,
    FormatConversion = 3,
    ModbusRtu = 4,
}

impl TryFrom<u8> for WorkMode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(WorkMode::Transparent),
            2 => Ok(WorkMode::TransparentWithId),
            3 => Ok(WorkMode::FormatConversion),
            4 => Ok(WorkMode::ModbusRtu),
            _ => Err(format!("invalid work mode {}", value)),
        }
    }
}

impl From<WorkMode> for u8 {
    fn from(mode: WorkMode) -> u8 {
        mode as u8
    }
}

impl fmt::Display for WorkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkMode::Transparent => "TRANSPARENT",
            WorkMode::TransparentWithId => "TRANSPARENT_WITH_ID",
            WorkMode::FormatConversion => "FORMAT_CONVERSION",
            WorkMode::ModbusRtu => "MODBUS_RTU",
        };
        write!(f, "{}", name)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(try_from = "u8", into = "u8")]
pub enum FrameType {
    Standard = 0,
    Extended = 1,
}

impl TryFrom<u8> for FrameType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FrameType::Standard),
            1 => Ok(FrameType::Extended),
            _ => Err(format!("invalid frame type {}", value)),
        }
    }
}

impl From<FrameType> for u8 {
    fn from(frame_type: FrameType) -> u8 {
        frame_type as u8
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameType::Standard => write!(f, "STANDARD"),
            FrameType::Extended => write!(f, "EXTENDED"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    #[serde(rename = "N")]
    None,
    #[serde(rename = "E")]
    Even,
    #[serde(rename = "O")]
    Odd,
}

impl Parity {
    pub fn as_char(&self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Even => 'E',
            Parity::Odd => 'O',
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Adapter settings, both as last applied to the device and as stored in
/// JSON config files. Missing keys in a file fall back to these defaults.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct DeviceConfig {
    pub uart_baud: BaudRate,
    pub uart_data_bits: u8,
    pub uart_stop_bits: u8,
    pub uart_parity: Parity,
    pub can_baud: BaudRate,
    pub can_frame_type: FrameType,
    pub work_mode: WorkMode,
    pub can_filter_id: u32,
    pub can_filter_mask: u32,
    pub auto_answer: bool,
    /// Seconds between heartbeat frames, 0 disables.
    pub heartbeat_interval: u32,
    pub device_id: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            uart_baud: DEFAULT_BAUD_RATE,
            uart_data_bits: 8,
            uart_stop_bits: 1,
            uart_parity: Parity::None,
            can_baud: DEFAULT_CAN_BAUD_RATE,
            can_frame_type: FrameType::Standard,
            work_mode: WorkMode::Transparent,
            can_filter_id: 0x000,
            can_filter_mask: 0x000,
            auto_answer: false,
            heartbeat_interval: 0,
            device_id: 0x01,
        }
    }
}

impl fmt::Display for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "UART: {}bps, {}{}{}",
            self.uart_baud, self.uart_data_bits, self.uart_parity, self.uart_stop_bits
        )?;
        writeln!(f, "CAN: {}bps, {} frame", self.can_baud, self.can_frame_type)?;
        writeln!(f, "Work mode: {}", self.work_mode)?;
        writeln!(
            f,
            "Filter: ID=0x{:03X}, Mask=0x{:03X}",
            self.can_filter_id, self.can_filter_mask
        )?;
        write!(
            f,
            "Device ID: 0x{:02X}, heartbeat: {}s, auto answer: {}",
            self.device_id, self.heartbeat_interval, self.auto_answer
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_serialize_as_numbers() {
        let json = serde_json::to_value(DeviceConfig::default()).unwrap();
        assert_eq!(json["work_mode"], 1);
        assert_eq!(json["can_frame_type"], 0);
        assert_eq!(json["uart_parity"], "N");
        assert_eq!(json["can_baud"], 500_000);
    }

    #[test]
    fn bad_work_mode_is_rejected() {
        let res: Result<DeviceConfig, _> = serde_json::from_str(r#"{"work_mode": 9}"#);
        assert!(res.is_err());
    }

    #[test]
    fn display_summary() {
        let text = DeviceConfig::default().to_string();
        assert!(text.starts_with("UART: 115200bps, 8N1\n"));
        assert!(text.contains("Filter: ID=0x000, Mask=0x000"));
    }
}
