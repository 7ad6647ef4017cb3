use crate::config::{BaudRate, Parity, WorkMode};
use std::fmt::{self, Display};

pub const COMMAND_SUFFIX: &[u8] = b"\r\n";

/// AT command set understood by RS232/485/422-to-CAN converters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtCommand {
    At,
    Reset,
    Version,
    Info,
    Status,
    SetUart {
        baud: BaudRate,
        data_bits: u8,
        stop_bits: u8,
        parity: Parity,
    },
    /// Bus rate in kbit/s.
    SetCan { kbps: u32 },
    SetMode(WorkMode),
    SetFilter { id: u32, mask: u32 },
    Save,
    Load,
    SetId(u32),
    Heartbeat(u32),
    /// `AT+<PARAM>?`
    Query(&'static str),
    Raw(String),
}

impl AtCommand {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.to_string().into_bytes();
        bytes.extend_from_slice(COMMAND_SUFFIX);
        bytes
    }
}

impl Display for AtCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtCommand::At => write!(f, "AT"),
            AtCommand::Reset => write!(f, "AT+RST"),
            AtCommand::Version => write!(f, "AT+VER"),
            AtCommand::Info => write!(f, "AT+INFO"),
            AtCommand::Status => write!(f, "AT+STATUS"),
            AtCommand::SetUart {
                baud,
                data_bits,
                stop_bits,
                parity,
            } => write!(f, "AT+UART={},{},{},{}", baud, data_bits, stop_bits, parity),
            AtCommand::SetCan { kbps } => write!(f, "AT+CAN={}", kbps),
            AtCommand::SetMode(mode) => write!(f, "AT+WORK={}", *mode as u8),
            AtCommand::SetFilter { id, mask } => write!(f, "AT+FILTER={},{}", id, mask),
            AtCommand::Save => write!(f, "AT+SAVE"),
            AtCommand::Load => write!(f, "AT+LOAD"),
            AtCommand::SetId(id) => write!(f, "AT+ID={}", id),
            AtCommand::Heartbeat(interval) => write!(f, "AT+HEART={}", interval),
            AtCommand::Query(param) => write!(f, "AT+{}?", param),
            AtCommand::Raw(text) => write!(f, "{}", text),
        }
    }
}

/// Commands whose replies describe the device, in the order they are tried.
pub const INFO_COMMANDS: [AtCommand; 4] = [
    AtCommand::Version,
    AtCommand::Info,
    AtCommand::Status,
    AtCommand::At,
];
