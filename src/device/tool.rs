use crate::{
    config::{BaudRate, DeviceConfig, FrameType, Parity, WorkMode, DEFAULT_BAUD_RATE, DEFAULT_PORT},
    device::{
        command::{AtCommand, INFO_COMMANDS},
        error::{ToolError, ToolResult},
        frame::CanFrame,
        link::{open_link, Link},
        response::{is_ok, DeviceParameters, PARAMETER_QUERIES},
    },
    threads::monitor_thread::{DisplayMode, MonitorThread},
    utils::user_io::BoxResult,
};
use std::{
    io::{self, Read, Write},
    path::Path,
    thread,
    time::Duration,
};

pub const MAX_RESPONSE_LEN: usize = 1000;

/// Host side serial settings and timings.
#[derive(Debug, Clone)]
pub struct ToolSettings {
    pub port: String,
    pub baud_rate: BaudRate,
    pub read_timeout: Duration,
    /// Pause between writing a command and reading its reply.
    pub response_delay: Duration,
    pub reset_delay: Duration,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            port: String::from(DEFAULT_PORT),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_millis(100),
            response_delay: Duration::from_millis(100),
            reset_delay: Duration::from_secs(1),
        }
    }
}

/// Connection to one adapter plus the configuration last applied to it.
pub struct CanTool {
    settings: ToolSettings,
    config: DeviceConfig,
    link: Option<Box<dyn Link>>,
    monitor: Option<MonitorThread>,
}

impl CanTool {
    pub fn new(settings: ToolSettings) -> Self {
        Self {
            settings,
            config: DeviceConfig::default(),
            link: None,
            monitor: None,
        }
    }

    pub fn port(&self) -> &str {
        &self.settings.port
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut DeviceConfig {
        &mut self.config
    }

    pub fn set_config(&mut self, config: DeviceConfig) {
        self.config = config;
    }

    pub fn load_config_file(&mut self, path: &Path) -> BoxResult<()> {
        self.config = DeviceConfig::read_config_file(path)?;
        Ok(())
    }

    pub fn save_config_file(&self, path: &Path) -> BoxResult<()> {
        self.config.save_config_file(path)
    }
}

impl CanTool {
    pub fn connect(&mut self) -> ToolResult<()> {
        let link = open_link(
            &self.settings.port,
            self.settings.baud_rate,
            self.settings.read_timeout,
        )?;
        self.attach(link);
        Ok(())
    }

    /// Uses an already opened link.
    pub fn attach(&mut self, link: Box<dyn Link>) {
        log::info!("[connect] connected to {}", link.name());
        self.link = Some(link);
    }

    pub fn disconnect(&mut self) -> ToolResult<()> {
        let stopped = self.stop_monitoring().map(|_| ());
        if let Some(link) = self.link.take() {
            log::info!("[disconnect] disconnected from {}", link.name());
        }
        stopped
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some() || self.monitor.is_some()
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor.is_some()
    }

    /// True once the monitor thread has exited on its own, e.g. after a read
    /// error. `stop_monitoring` still has to be called to get the link back.
    pub fn monitor_ended(&self) -> bool {
        self.monitor.as_ref().map_or(false, |m| m.is_finished())
    }
}

/// True when the last line of `reply` is a final `OK` or `ERROR`.
/// `OK` inside a line, as in `+STATUS:OK,...`, does not count.
fn ends_with_result(reply: &[u8]) -> bool {
    let text = String::from_utf8_lossy(reply);
    let last = text.trim_end().rsplit('\n').next().unwrap_or_default().trim();
    last == "OK" || last == "ERROR" || last.starts_with("ERROR:")
}

/// Reads until a final result line arrives, the port times out or
/// `MAX_RESPONSE_LEN` bytes have arrived.
fn read_reply(link: &mut Box<dyn Link>) -> ToolResult<Option<String>> {
    let mut reply = Vec::with_capacity(MAX_RESPONSE_LEN);
    let mut chunk = [0u8; 256];
    while reply.len() < MAX_RESPONSE_LEN {
        let len = chunk.len().min(MAX_RESPONSE_LEN - reply.len());
        match link.read(&mut chunk[..len]) {
            Ok(0) => break,
            Ok(count) => {
                reply.extend_from_slice(&chunk[..count]);
                if ends_with_result(&reply) {
                    break;
                }
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => break,
            Err(e) => return Err(e.into()),
        }
    }
    let text = String::from_utf8_lossy(&reply).trim().to_string();
    Ok(if text.is_empty() { None } else { Some(text) })
}

/// `Ok(false)` for a rejected command, transport errors pass through.
fn accepted(step: ToolResult<()>) -> ToolResult<bool> {
    match step {
        Ok(()) => Ok(true),
        Err(e @ ToolError::Rejected { .. }) => {
            log::warn!("[apply_config] {}", e);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

impl CanTool {
    /// Sends `command` followed by `\r\n`. With `wait_response` the trimmed
    /// reply is returned, `None` when the device stays silent. Without it the
    /// result is always `"OK"`.
    ///
    /// While monitoring the command is queued to the monitor thread and its
    /// reply, if any, appears in the monitor output, so `None` is returned.
    pub fn send_command(&mut self, command: &AtCommand, wait_response: bool) -> ToolResult<Option<String>> {
        let bytes = command.to_bytes();
        if let Some(monitor) = &mut self.monitor {
            monitor.write(&bytes);
            log::debug!("[send_command] {} queued to monitor", command);
            return Ok(None);
        }
        let link = self.link.as_mut().ok_or(ToolError::NotConnected)?;
        link.write_all(&bytes)?;
        link.flush()?;
        log::debug!("[send_command] {}", command);
        if !wait_response {
            return Ok(Some(String::from("OK")));
        }
        thread::sleep(self.settings.response_delay);
        let reply = read_reply(link)?;
        log::debug!("[send_command] {} => {:?}", command, reply);
        Ok(reply)
    }

    fn expect_ok(&mut self, command: AtCommand) -> ToolResult<String> {
        match self.send_command(&command, true)? {
            Some(reply) if is_ok(&reply) => Ok(reply),
            response => Err(ToolError::Rejected {
                command: command.to_string(),
                response,
            }),
        }
    }

    /// Replies to the identification commands, skipping silent ones and
    /// bare `OK`s.
    pub fn get_device_info(&mut self) -> ToolResult<Vec<(String, String)>> {
        let mut info = vec![];
        for command in INFO_COMMANDS {
            if let Some(reply) = self.send_command(&command, true)? {
                if reply != "OK" {
                    info.push((command.to_string(), reply));
                }
            }
        }
        Ok(info)
    }

    pub fn configure_uart(&mut self, baud: BaudRate, data_bits: u8, stop_bits: u8, parity: Parity) -> ToolResult<()> {
        self.expect_ok(AtCommand::SetUart {
            baud,
            data_bits,
            stop_bits,
            parity,
        })?;
        self.config.uart_baud = baud;
        self.config.uart_data_bits = data_bits;
        self.config.uart_stop_bits = stop_bits;
        self.config.uart_parity = parity;
        log::info!("[configure_uart] UART configured: {}bps, {}{}{}", baud, data_bits, parity, stop_bits);
        Ok(())
    }

    /// `baud` is in bit/s; the adapter takes kbit/s.
    pub fn configure_can(&mut self, baud: BaudRate, frame_type: FrameType) -> ToolResult<()> {
        self.expect_ok(AtCommand::SetCan { kbps: baud / 1000 })?;
        self.config.can_baud = baud;
        self.config.can_frame_type = frame_type;
        log::info!("[configure_can] CAN configured: {}bps, {} frame", baud, frame_type);
        Ok(())
    }

    pub fn set_work_mode(&mut self, mode: WorkMode) -> ToolResult<()> {
        self.expect_ok(AtCommand::SetMode(mode))?;
        self.config.work_mode = mode;
        log::info!("[set_work_mode] work mode set to {}", mode);
        Ok(())
    }

    pub fn set_can_filter(&mut self, filter_id: u32, filter_mask: u32) -> ToolResult<()> {
        self.expect_ok(AtCommand::SetFilter {
            id: filter_id,
            mask: filter_mask,
        })?;
        self.config.can_filter_id = filter_id;
        self.config.can_filter_mask = filter_mask;
        log::info!("[set_can_filter] ID=0x{:03X}, Mask=0x{:03X}", filter_id, filter_mask);
        Ok(())
    }

    pub fn set_device_id(&mut self, device_id: u32) -> ToolResult<()> {
        self.expect_ok(AtCommand::SetId(device_id))?;
        self.config.device_id = device_id;
        log::info!("[set_device_id] device id 0x{:02X}", device_id);
        Ok(())
    }

    pub fn set_heartbeat(&mut self, interval: u32) -> ToolResult<()> {
        self.expect_ok(AtCommand::Heartbeat(interval))?;
        self.config.heartbeat_interval = interval;
        log::info!("[set_heartbeat] heartbeat every {}s", interval);
        Ok(())
    }

    /// Persists the running configuration in the adapter.
    pub fn save_config(&mut self) -> ToolResult<()> {
        self.expect_ok(AtCommand::Save)?;
        log::info!("[save_config] configuration saved to device");
        Ok(())
    }

    /// Restores the configuration stored in the adapter.
    pub fn load_device_config(&mut self) -> ToolResult<()> {
        self.expect_ok(AtCommand::Load)?;
        log::info!("[load_device_config] configuration loaded on device");
        Ok(())
    }

    /// Sends `AT+RST` and waits for the adapter to come back. The reply is
    /// not checked since the adapter may reboot before answering.
    pub fn reset_device(&mut self) -> ToolResult<()> {
        let reply = self.send_command(&AtCommand::Reset, true)?;
        log::debug!("[reset_device] reply {:?}", reply);
        thread::sleep(self.settings.reset_delay);
        log::info!("[reset_device] device reset");
        Ok(())
    }

    pub fn send_can_frame(&mut self, frame: &CanFrame) -> ToolResult<()> {
        let bytes = frame.encode(self.config.work_mode);
        if let Some(monitor) = &mut self.monitor {
            monitor.send_frame(frame, &bytes);
        } else {
            let link = self.link.as_mut().ok_or(ToolError::NotConnected)?;
            link.write_all(&bytes)?;
            link.flush()?;
        }
        log::info!("[send_can_frame] CAN frame sent: {}", frame);
        Ok(())
    }

    /// Writes `bytes` as they are, queued to the monitor while monitoring.
    pub fn send_raw(&mut self, bytes: &[u8]) -> ToolResult<()> {
        if let Some(monitor) = &mut self.monitor {
            monitor.write(bytes);
        } else {
            let link = self.link.as_mut().ok_or(ToolError::NotConnected)?;
            link.write_all(bytes)?;
            link.flush()?;
        }
        log::debug!("[send_raw] {} bytes", bytes.len());
        Ok(())
    }

    /// UART, CAN, work mode and filter from the in-memory config, then
    /// `AT+SAVE` if all four were accepted. Rejections do not stop the
    /// sequence; transport errors do.
    pub fn apply_config(&mut self) -> ToolResult<bool> {
        let cfg = self.config.clone();
        log::info!("[apply_config] applying configuration to device");

        let mut success = accepted(self.configure_uart(
            cfg.uart_baud,
            cfg.uart_data_bits,
            cfg.uart_stop_bits,
            cfg.uart_parity,
        ))?;
        success &= accepted(self.configure_can(cfg.can_baud, cfg.can_frame_type))?;
        success &= accepted(self.set_work_mode(cfg.work_mode))?;
        success &= accepted(self.set_can_filter(cfg.can_filter_id, cfg.can_filter_mask))?;
        if success {
            success = accepted(self.save_config())?;
        }
        Ok(success)
    }

    /// Queries every `AT+<PARAM>?` and collects what the adapter reports.
    pub fn read_device_parameters(&mut self) -> ToolResult<DeviceParameters> {
        let mut params = DeviceParameters::default();
        for query in &PARAMETER_QUERIES {
            match self.send_command(&AtCommand::Query(query.param), true)? {
                Some(reply) if query.answered(&reply) => (query.parse)(&mut params, &reply),
                _ => log::warn!("[read_device_parameters] {} read timeout", query.param),
            }
        }
        Ok(params)
    }
}

impl CanTool {
    /// Hands the link to a monitor thread. With `log_file` the traffic is
    /// also written there; the file is created before the link is taken so
    /// a bad path leaves the tool untouched.
    pub fn start_monitoring(&mut self, log_file: Option<&Path>, display: DisplayMode) -> ToolResult<()> {
        if self.monitor.is_some() {
            return Err(ToolError::AlreadyMonitoring);
        }
        if self.link.is_none() {
            return Err(ToolError::NotConnected);
        }
        let logger = match log_file {
            Some(path) => Some(MonitorThread::open_log(path)?),
            None => None,
        };
        let link = self.link.take().ok_or(ToolError::NotConnected)?;
        self.monitor = Some(MonitorThread::spawn(link, logger, display));
        log::info!("[start_monitoring] monitoring started");
        Ok(())
    }

    /// Stops the monitor thread and takes the link back. Returns the number
    /// of bytes received, or the error that ended monitoring early.
    pub fn stop_monitoring(&mut self) -> ToolResult<usize> {
        let monitor = match self.monitor.take() {
            Some(monitor) => monitor,
            None => return Ok(0),
        };
        let exit = monitor.join()?;
        self.link = Some(exit.link);
        if let Some(lines) = exit.log_lines {
            log::info!("[stop_monitoring] {} lines logged", lines);
        }
        log::info!("[stop_monitoring] monitoring stopped");
        let rx_bytes = exit.rx_bytes;
        exit.result.map(|()| rx_bytes)
    }
}

impl Drop for CanTool {
    fn drop(&mut self) {
        if self.monitor.is_some() {
            let _ = self.stop_monitoring();
        }
    }
}
