use crate::{
    config::WorkMode,
    device::error::{ToolError, ToolResult},
};
use embedded_can::{ExtendedId, Id, StandardId};
use std::fmt;

pub const MAX_DATA_LEN: usize = 8;

/// A CAN frame as handed to the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanFrame {
    id: Id,
    data: Vec<u8>,
}

impl CanFrame {
    pub fn new(raw_id: u32, data: &[u8], extended: bool) -> ToolResult<Self> {
        let id = if extended {
            ExtendedId::new(raw_id).map(Id::Extended)
        } else {
            u16::try_from(raw_id)
                .ok()
                .and_then(StandardId::new)
                .map(Id::Standard)
        };
        let id = id.ok_or_else(|| {
            let kind = if extended { "extended" } else { "standard" };
            ToolError::InvalidFrame(format!("id 0x{:X} out of range for {} frame", raw_id, kind))
        })?;
        if data.len() > MAX_DATA_LEN {
            return Err(ToolError::InvalidFrame(format!(
                "{} data bytes, at most {} allowed",
                data.len(),
                MAX_DATA_LEN
            )));
        }
        Ok(Self {
            id,
            data: data.to_vec(),
        })
    }

    /// Standard when the id fits in 11 bits, extended otherwise.
    pub fn auto(raw_id: u32, data: &[u8]) -> ToolResult<Self> {
        Self::new(raw_id, data, raw_id > StandardId::MAX.as_raw() as u32)
    }

    pub fn raw_id(&self) -> u32 {
        match self.id {
            Id::Standard(id) => id.as_raw() as u32,
            Id::Extended(id) => id.as_raw(),
        }
    }

    pub fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Bytes written to the serial side. Transparent mode forwards payload
    /// only; the other modes prefix the id as a little-endian u32.
    pub fn encode(&self, work_mode: WorkMode) -> Vec<u8> {
        match work_mode {
            WorkMode::Transparent => self.data.clone(),
            _ => {
                let mut bytes = self.raw_id().to_le_bytes().to_vec();
                bytes.extend_from_slice(&self.data);
                bytes
            }
        }
    }

    pub fn id_string(&self) -> String {
        match self.id {
            Id::Standard(id) => format!("0x{:03X}", id.as_raw()),
            Id::Extended(id) => format!("0x{:08X}", id.as_raw()),
        }
    }
}

impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ID={}, Data={}", self.id_string(), to_hex(&self.data))
    }
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Parses an id such as `123`, `0x7DF` or `18FEF100` (always hex).
pub fn parse_id(text: &str) -> ToolResult<u32> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u32::from_str_radix(digits, 16).map_err(|_| ToolError::InvalidHex(text.to_string()))
}

/// Parses payload hex like `01020304` or `01 02 03 04`.
pub fn parse_data(text: &str) -> ToolResult<Vec<u8>> {
    let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 || !digits.is_ascii() {
        return Err(ToolError::InvalidHex(text.to_string()));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| ToolError::InvalidHex(text.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_id_limits() {
        assert!(CanFrame::new(0x7FF, &[], false).is_ok());
        assert!(matches!(
            CanFrame::new(0x800, &[1, 2, 3, 4], false),
            Err(ToolError::InvalidFrame(_))
        ));
        assert!(CanFrame::new(0x1FFF_FFFF, &[], true).is_ok());
        assert!(CanFrame::new(0x2000_0000, &[], true).is_err());
    }

    #[test]
    fn data_length_limit() {
        assert!(CanFrame::new(0x123, &[0; 8], false).is_ok());
        assert!(matches!(
            CanFrame::new(0x123, &[0; 9], false),
            Err(ToolError::InvalidFrame(_))
        ));
    }

    #[test]
    fn auto_picks_frame_kind() {
        assert!(!CanFrame::auto(0x7DF, &[]).unwrap().is_extended());
        assert!(CanFrame::auto(0x18FE_F100, &[]).unwrap().is_extended());
    }

    #[test]
    fn encode_per_work_mode() {
        let frame = CanFrame::new(0x123, &[0x01, 0x02], false).unwrap();
        assert_eq!(frame.encode(WorkMode::Transparent), vec![0x01, 0x02]);
        assert_eq!(
            frame.encode(WorkMode::TransparentWithId),
            vec![0x23, 0x01, 0x00, 0x00, 0x01, 0x02]
        );
    }

    #[test]
    fn display_frame() {
        let frame = CanFrame::new(0x123, &[0x01, 0xAB], false).unwrap();
        assert_eq!(frame.to_string(), "ID=0x123, Data=01ab");
        let frame = CanFrame::new(0x1FFF_FFFF, &[], true).unwrap();
        assert_eq!(frame.to_string(), "ID=0x1FFFFFFF, Data=");
    }

    #[test]
    fn parse_hex_inputs() {
        assert_eq!(parse_id("123").unwrap(), 0x123);
        assert_eq!(parse_id("0x7df").unwrap(), 0x7DF);
        assert!(parse_id("zz").is_err());
        assert_eq!(parse_data("01 02 0a").unwrap(), vec![1, 2, 10]);
        assert_eq!(parse_data("").unwrap(), Vec::<u8>::new());
        assert!(parse_data("123").is_err());
        assert!(parse_data("0g").is_err());
    }
}
