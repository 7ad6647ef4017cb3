use crate::{
    config::BaudRate,
    device::error::ToolResult,
};
use serialport::{available_ports, DataBits, FlowControl, Parity, SerialPort, SerialPortType, StopBits};
use std::{
    io::{Read, Write},
    time::Duration,
};

/// Byte pipe to the adapter. Implemented for real serial ports and for the
/// scripted link used in tests.
pub trait Link: Read + Write + Send {
    fn name(&self) -> String;
    fn bytes_to_read(&self) -> ToolResult<u32>;
}

impl Link for Box<dyn SerialPort> {
    fn name(&self) -> String {
        (**self).name().unwrap_or_else(|| String::from("<unnamed>"))
    }

    fn bytes_to_read(&self) -> ToolResult<u32> {
        Ok((**self).bytes_to_read()?)
    }
}

/// Opens `port` as 8N1 without flow control.
pub fn open_link(port: &str, baud_rate: BaudRate, timeout: Duration) -> ToolResult<Box<dyn Link>> {
    let serial_port = serialport::new(port, baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(timeout)
        .open()?;
    Ok(Box::new(serial_port))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortEntry {
    pub port_name: String,
    pub description: String,
    pub likely_adapter: bool,
}

impl PortEntry {
    fn new(port_name: String, port_type: &SerialPortType) -> Self {
        let (description, usb) = match port_type {
            SerialPortType::UsbPort(info) => {
                let mut description = format!("USB vid{:04x}:pid{:04x}", info.vid, info.pid);
                for part in [&info.manufacturer, &info.product].into_iter().flatten() {
                    description.push(' ');
                    description.push_str(part);
                }
                (description, true)
            }
            SerialPortType::PciPort => (String::from("PCI"), false),
            SerialPortType::BluetoothPort => (String::from("Bluetooth"), false),
            SerialPortType::Unknown => (String::from("unknown"), false),
        };
        let likely_adapter = usb || port_name.contains("usbserial");
        Self {
            port_name,
            description,
            likely_adapter,
        }
    }
}

pub fn list_ports() -> ToolResult<Vec<PortEntry>> {
    Ok(available_ports()?
        .into_iter()
        .map(|info| PortEntry::new(info.port_name, &info.port_type))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialport::UsbPortInfo;

    #[test]
    fn usb_port_is_likely_adapter() {
        let port_type = SerialPortType::UsbPort(UsbPortInfo {
            vid: 0x0403,
            pid: 0x6001,
            serial_number: None,
            manufacturer: Some("FTDI".into()),
            product: Some("FT232R".into()),
        });
        let entry = PortEntry::new("/dev/ttyUSB0".into(), &port_type);
        assert!(entry.likely_adapter);
        assert_eq!(entry.description, "USB vid0403:pid6001 FTDI FT232R");
    }

    #[test]
    fn name_heuristic() {
        let entry = PortEntry::new("/dev/tty.usbserial-1140".into(), &SerialPortType::Unknown);
        assert!(entry.likely_adapter);
        let entry = PortEntry::new("/dev/ttyS0".into(), &SerialPortType::PciPort);
        assert!(!entry.likely_adapter);
    }
}
