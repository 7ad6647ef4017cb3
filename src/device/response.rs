use serde::Serialize;

pub fn is_ok(reply: &str) -> bool {
    reply.contains("OK")
}

/// Returns the comma separated fields following `+<tag>:` on its line.
fn tagged_fields<'a>(reply: &'a str, tag: &str) -> Option<Vec<&'a str>> {
    let marker = format!("+{}:", tag);
    let start = reply.find(&marker)? + marker.len();
    let rest = &reply[start..];
    let line = rest.split(['\r', '\n']).next().unwrap_or(rest);
    Some(line.split(',').map(str::trim).collect())
}

fn field<T: std::str::FromStr>(fields: &[&str], idx: usize) -> Option<T> {
    fields.get(idx).and_then(|f| f.parse().ok())
}

#[derive(Serialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct UartParameters {
    pub baud_rate: Option<u32>,
    pub data_bits: Option<u8>,
    pub stop_bits: Option<u8>,
    pub parity: Option<char>,
    pub flow_control: Option<&'static str>,
}

#[derive(Serialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct CanParameters {
    pub baud_rate: Option<u32>,
    pub can_id: Option<String>,
    pub filter_id: Option<String>,
    pub mask_id: Option<String>,
}

#[derive(Serialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct ModeParameters {
    pub mode_id: Option<u8>,
    pub mode: Option<&'static str>,
}

#[derive(Serialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct StatusParameters {
    pub connected: Option<bool>,
    pub error_count: Option<u32>,
    pub frame_count: Option<u32>,
}

#[derive(Serialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub model: Option<String>,
    pub firmware_version: Option<String>,
    pub hardware_version: Option<String>,
    pub serial_number: Option<String>,
}

/// Everything the `?` queries can report.
#[derive(Serialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct DeviceParameters {
    pub uart_config: UartParameters,
    pub can_config: CanParameters,
    pub working_mode: ModeParameters,
    pub target_rate: Option<u32>,
    pub protocol_type: Option<&'static str>,
    pub status: StatusParameters,
    pub device_info: DeviceInfo,
}

pub fn mode_name(mode_id: u8) -> &'static str {
    match mode_id {
        0 => "transparent",
        1 => "transparent_id",
        2 => "format",
        3 => "modbus",
        _ => "unknown",
    }
}

pub fn protocol_name(proto_id: u8) -> &'static str {
    match proto_id {
        0 => "generic",
        1 => "obd2",
        2 => "j1939",
        3 => "isotp",
        4 => "uds",
        _ => "unknown",
    }
}

impl DeviceParameters {
    /// `+UART:115200,8,1,0,0`
    pub fn parse_uart(&mut self, reply: &str) {
        if let Some(fields) = tagged_fields(reply, "UART") {
            if fields.len() >= 5 {
                let uart = &mut self.uart_config;
                uart.baud_rate = field(&fields, 0);
                uart.data_bits = field(&fields, 1);
                uart.stop_bits = field(&fields, 2);
                uart.parity = Some(if fields[3] == "0" { 'N' } else { 'E' });
                uart.flow_control = Some(if fields[4] == "0" { "none" } else { "hardware" });
            }
        }
    }

    /// `+CAN:500000`
    pub fn parse_can(&mut self, reply: &str) {
        if let Some(fields) = tagged_fields(reply, "CAN") {
            self.can_config.baud_rate = field(&fields, 0);
        }
    }

    /// `+ID:0x123`
    pub fn parse_id(&mut self, reply: &str) {
        if let Some(fields) = tagged_fields(reply, "ID") {
            self.can_config.can_id = fields.first().map(|s| s.to_string());
        }
    }

    /// `+FILTER:0x000,0x000`
    pub fn parse_filter(&mut self, reply: &str) {
        if let Some(fields) = tagged_fields(reply, "FILTER") {
            if fields.len() >= 2 {
                self.can_config.filter_id = Some(fields[0].to_string());
                self.can_config.mask_id = Some(fields[1].to_string());
            }
        }
    }

    /// `+MODE:0`
    pub fn parse_mode(&mut self, reply: &str) {
        if let Some(mode_id) = tagged_fields(reply, "MODE").and_then(|f| field(&f, 0)) {
            self.working_mode.mode_id = Some(mode_id);
            self.working_mode.mode = Some(mode_name(mode_id));
        }
    }

    /// `+PERF:83`
    pub fn parse_performance(&mut self, reply: &str) {
        if let Some(rate) = tagged_fields(reply, "PERF").and_then(|f| field(&f, 0)) {
            self.target_rate = Some(rate);
        }
    }

    /// `+PROTO:0`
    pub fn parse_protocol(&mut self, reply: &str) {
        if let Some(proto_id) = tagged_fields(reply, "PROTO").and_then(|f| field(&f, 0)) {
            self.protocol_type = Some(protocol_name(proto_id));
        }
    }

    /// `+STATUS:OK,0,1234`
    pub fn parse_status(&mut self, reply: &str) {
        if let Some(fields) = tagged_fields(reply, "STATUS") {
            if fields.len() >= 3 {
                self.status.connected = Some(fields[0] == "OK");
                self.status.error_count = field(&fields, 1);
                self.status.frame_count = field(&fields, 2);
            }
        }
    }

    /// `+INFO:WS-CAN-V1.0,FW1.2,HW1.0,SN123456`
    pub fn parse_info(&mut self, reply: &str) {
        if let Some(fields) = tagged_fields(reply, "INFO") {
            if fields.len() >= 4 {
                let info = &mut self.device_info;
                info.model = Some(fields[0].to_string());
                info.firmware_version = Some(fields[1].to_string());
                info.hardware_version = Some(fields[2].to_string());
                info.serial_number = Some(fields[3].to_string());
            }
        }
    }
}

/// A query, the reply tag it answers with, and where the answer goes.
pub struct ParameterQuery {
    pub param: &'static str,
    pub parse: fn(&mut DeviceParameters, &str),
}

pub const PARAMETER_QUERIES: [ParameterQuery; 9] = [
    ParameterQuery { param: "UART", parse: DeviceParameters::parse_uart },
    ParameterQuery { param: "CAN", parse: DeviceParameters::parse_can },
    ParameterQuery { param: "ID", parse: DeviceParameters::parse_id },
    ParameterQuery { param: "FILTER", parse: DeviceParameters::parse_filter },
    ParameterQuery { param: "MODE", parse: DeviceParameters::parse_mode },
    ParameterQuery { param: "PERF", parse: DeviceParameters::parse_performance },
    ParameterQuery { param: "PROTO", parse: DeviceParameters::parse_protocol },
    ParameterQuery { param: "STATUS", parse: DeviceParameters::parse_status },
    ParameterQuery { param: "INFO", parse: DeviceParameters::parse_info },
];

impl ParameterQuery {
    /// A reply counts as an answer when it is tagged or acknowledged.
    pub fn answered(&self, reply: &str) -> bool {
        is_ok(reply) || reply.contains(&format!("+{}:", self.param))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_detection() {
        assert!(is_ok("OK"));
        assert!(is_ok("+CAN:500\r\nOK"));
        assert!(!is_ok("ERROR"));
    }

    #[test]
    fn uart_reply() {
        let mut params = DeviceParameters::default();
        params.parse_uart("+UART:115200,8,1,0,0\r\nOK\r\n");
        assert_eq!(
            params.uart_config,
            UartParameters {
                baud_rate: Some(115_200),
                data_bits: Some(8),
                stop_bits: Some(1),
                parity: Some('N'),
                flow_control: Some("none"),
            }
        );
    }

    #[test]
    fn short_uart_reply_is_ignored() {
        let mut params = DeviceParameters::default();
        params.parse_uart("+UART:115200,8");
        assert_eq!(params.uart_config, UartParameters::default());
    }

    #[test]
    fn can_id_and_filter_replies() {
        let mut params = DeviceParameters::default();
        params.parse_can("+CAN:500000\nOK");
        params.parse_id("+ID:0x123\r\n");
        params.parse_filter("+FILTER:0x100, 0x700");
        assert_eq!(params.can_config.baud_rate, Some(500_000));
        assert_eq!(params.can_config.can_id.as_deref(), Some("0x123"));
        assert_eq!(params.can_config.filter_id.as_deref(), Some("0x100"));
        assert_eq!(params.can_config.mask_id.as_deref(), Some("0x700"));
    }

    #[test]
    fn mode_and_protocol_names() {
        let mut params = DeviceParameters::default();
        params.parse_mode("+MODE:3");
        params.parse_protocol("+PROTO:2");
        params.parse_performance("+PERF:83");
        assert_eq!(params.working_mode.mode_id, Some(3));
        assert_eq!(params.working_mode.mode, Some("modbus"));
        assert_eq!(params.protocol_type, Some("j1939"));
        assert_eq!(params.target_rate, Some(83));
        assert_eq!(mode_name(7), "unknown");
        assert_eq!(protocol_name(9), "unknown");
    }

    #[test]
    fn bad_number_leaves_field_unset() {
        let mut params = DeviceParameters::default();
        params.parse_mode("+MODE:x");
        params.parse_can("+CAN:fast");
        assert_eq!(params.working_mode, ModeParameters::default());
        assert_eq!(params.can_config.baud_rate, None);
    }

    #[test]
    fn status_and_info_replies() {
        let mut params = DeviceParameters::default();
        params.parse_status("+STATUS:OK,0,1234");
        params.parse_info("+INFO:WS-CAN-V1.0,FW1.2,HW1.0,SN123456\r\nOK");
        assert_eq!(params.status.connected, Some(true));
        assert_eq!(params.status.error_count, Some(0));
        assert_eq!(params.status.frame_count, Some(1234));
        assert_eq!(params.device_info.model.as_deref(), Some("WS-CAN-V1.0"));
        assert_eq!(params.device_info.serial_number.as_deref(), Some("SN123456"));
    }

    #[test]
    fn query_answered() {
        let q = &PARAMETER_QUERIES[1];
        assert!(q.answered("+CAN:250000"));
        assert!(q.answered("OK"));
        assert!(!q.answered("ERROR"));
    }
}
