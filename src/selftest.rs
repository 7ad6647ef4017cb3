use crate::{
    config::{profiles::Profile, FrameType},
    device::{
        command::AtCommand,
        error::ToolResult,
        frame::{to_hex, CanFrame},
        tool::CanTool,
    },
    threads::monitor_thread::DisplayMode,
    utils::user_io::BoxResult,
};
use chrono::Local;
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

const ISO_TIME_FMT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Commands tried while probing what the adapter answers to.
const PROBE_COMMANDS: [&str; 9] = [
    "AT", "AT+VER", "AT+INFO", "AT+STATUS", "AT+HELP", "AT+UART?", "AT+CAN?", "AT+WORK?", "AT+FILTER?",
];

#[derive(Debug, Clone)]
pub struct SelfTestSettings {
    /// Pause after each frame in the paced cases.
    pub frame_gap: Duration,
    pub burst_duration: Duration,
    pub burst_interval: Duration,
}

impl Default for SelfTestSettings {
    fn default() -> Self {
        Self {
            frame_gap: Duration::from_millis(100),
            burst_duration: Duration::from_secs(2),
            burst_interval: Duration::from_millis(10),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ActionEntry {
    pub timestamp: String,
    pub action: String,
    pub result: bool,
    pub details: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CaseResult {
    pub name: &'static str,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub total_tests: usize,
    pub passed: usize,
    pub failed: usize,
}

#[derive(Serialize, Debug)]
pub struct TestReport<'a> {
    pub timestamp: String,
    pub device_port: &'a str,
    pub configuration_log: &'a [ActionEntry],
    pub test_results: &'a [CaseResult],
    pub summary: Summary,
}

struct Outcome {
    success: bool,
    details: String,
}

type Case = fn(&mut SelfTest<'_>) -> ToolResult<Outcome>;

const CASES: [(&str, Case); 7] = [
    ("basic_communication", basic_communication),
    ("can_frame_transmission", can_frame_transmission),
    ("different_data_lengths", different_data_lengths),
    ("burst_transmission", burst_transmission),
    ("extended_frames", extended_frames),
    ("invalid_frame_rejection", invalid_frame_rejection),
    ("monitoring", monitoring),
];

pub struct SelfTest<'a> {
    tool: &'a mut CanTool,
    settings: SelfTestSettings,
    configuration_log: Vec<ActionEntry>,
    results: Vec<CaseResult>,
}

impl<'a> SelfTest<'a> {
    pub fn new(tool: &'a mut CanTool, settings: SelfTestSettings) -> Self {
        Self {
            tool,
            settings,
            configuration_log: vec![],
            results: vec![],
        }
    }

    pub fn configuration_log(&self) -> &[ActionEntry] {
        &self.configuration_log
    }

    pub fn results(&self) -> &[CaseResult] {
        &self.results
    }

    pub fn log_action(&mut self, action: &str, result: bool, details: &str) {
        let now = Local::now();
        println!(
            "[{}] {}: {} {}",
            now.format("%H:%M:%S"),
            action,
            if result { '✓' } else { '✗' },
            details
        );
        self.configuration_log.push(ActionEntry {
            timestamp: now.format(ISO_TIME_FMT).to_string(),
            action: action.to_string(),
            result,
            details: details.to_string(),
        });
    }

    /// Sends the identification and query commands and logs who answered.
    /// Returns how many did.
    pub fn probe_device(&mut self) -> ToolResult<usize> {
        let mut answered = 0;
        for text in PROBE_COMMANDS {
            let action = format!("Info Command {}", text);
            match self.tool.send_command(&AtCommand::Raw(text.to_string()), true)? {
                Some(reply) => {
                    answered += 1;
                    let preview: String = reply.chars().take(50).collect();
                    self.log_action(&action, true, &format!("Response: {}", preview));
                }
                None => self.log_action(&action, false, "No response"),
            }
        }
        Ok(answered)
    }

    /// Loads `profile` into the tool and applies it to the adapter.
    pub fn apply_profile(&mut self, profile: Profile) -> ToolResult<bool> {
        self.tool.set_config(profile.config());
        let success = self.tool.apply_config()?;
        self.log_action(
            "Profile Configuration",
            success,
            &format!("Applied {} profile", profile),
        );
        Ok(success)
    }

    /// Runs every case in order. A case that errors counts as failed and the
    /// run continues.
    pub fn run_cases(&mut self) -> Summary {
        for (name, case) in CASES {
            let result = match case(self) {
                Ok(outcome) => CaseResult {
                    name,
                    success: outcome.success,
                    details: Some(outcome.details),
                    error: None,
                },
                Err(e) => CaseResult {
                    name,
                    success: false,
                    details: None,
                    error: Some(e.to_string()),
                },
            };
            let details = match (&result.details, &result.error) {
                (Some(details), _) => details.clone(),
                (None, Some(error)) => format!("Exception: {}", error),
                (None, None) => String::new(),
            };
            self.log_action(&format!("Test: {}", name), result.success, &details);
            self.results.push(result);
        }
        self.summary()
    }

    pub fn summary(&self) -> Summary {
        let passed = self.results.iter().filter(|r| r.success).count();
        Summary {
            total_tests: self.results.len(),
            passed,
            failed: self.results.len() - passed,
        }
    }

    /// Writes `test_report_<YYYYmmdd_HHMMSS>.json` into `dir`.
    pub fn write_report(&self, dir: &Path) -> BoxResult<PathBuf> {
        let now = Local::now();
        let report = TestReport {
            timestamp: now.format(ISO_TIME_FMT).to_string(),
            device_port: self.tool.port(),
            configuration_log: &self.configuration_log,
            test_results: &self.results,
            summary: self.summary(),
        };
        let path = dir.join(format!("test_report_{}.json", now.format("%Y%m%d_%H%M%S")));
        fs::write(&path, serde_json::to_string_pretty(&report)?)?;
        log::info!("[write_report] {:?}", path);
        Ok(path)
    }

    fn send_frames(&mut self, frames: &[(u32, &[u8])]) -> usize {
        let mut sent = 0;
        for (raw_id, data) in frames {
            let result = CanFrame::auto(*raw_id, data).and_then(|frame| self.tool.send_can_frame(&frame));
            match result {
                Ok(()) => sent += 1,
                Err(e) => log::warn!("[send_frames] 0x{:X} {} => {}", raw_id, to_hex(data), e),
            }
            thread::sleep(self.settings.frame_gap);
        }
        sent
    }
}

fn basic_communication(test: &mut SelfTest<'_>) -> ToolResult<Outcome> {
    let data = [0x01, 0x02, 0x03, 0x04];
    test.tool.send_raw(&data)?;
    thread::sleep(test.settings.frame_gap);
    Ok(Outcome {
        success: true,
        details: format!("Sent {} bytes", data.len()),
    })
}

fn can_frame_transmission(test: &mut SelfTest<'_>) -> ToolResult<Outcome> {
    let frames: [(u32, &[u8]); 3] = [
        (0x123, &[0x01, 0x02, 0x03, 0x04]),
        (0x456, &[0x05, 0x06, 0x07, 0x08]),
        (0x789, &[0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F, 0x10]),
    ];
    let sent = test.send_frames(&frames);
    Ok(Outcome {
        success: sent > 0,
        details: format!("Sent {}/{} frames", sent, frames.len()),
    })
}

fn different_data_lengths(test: &mut SelfTest<'_>) -> ToolResult<Outcome> {
    let payloads: Vec<(u32, Vec<u8>)> = [1u8, 2, 4, 8]
        .iter()
        .map(|&len| (0x100 + len as u32, (0..len).collect()))
        .collect();
    let frames: Vec<(u32, &[u8])> = payloads.iter().map(|(id, data)| (*id, data.as_slice())).collect();
    let sent = test.send_frames(&frames);
    Ok(Outcome {
        success: sent > 0,
        details: format!("Tested {}/{} lengths", sent, frames.len()),
    })
}

fn burst_transmission(test: &mut SelfTest<'_>) -> ToolResult<Outcome> {
    let frame = CanFrame::new(0x200, &[0x01, 0x02, 0x03, 0x04], false)?;
    let start = Instant::now();
    let mut sent = 0usize;
    while start.elapsed() < test.settings.burst_duration {
        if test.tool.send_can_frame(&frame).is_ok() {
            sent += 1;
        }
        thread::sleep(test.settings.burst_interval);
    }
    let secs = test.settings.burst_duration.as_secs_f64();
    let frequency = if secs > 0.0 { sent as f64 / secs } else { 0.0 };
    Ok(Outcome {
        success: sent > 0,
        details: format!("Sent {} frames at {:.1} Hz", sent, frequency),
    })
}

fn extended_frames(test: &mut SelfTest<'_>) -> ToolResult<Outcome> {
    let raw_id = 0x1FFF_FFFF;
    let original = test.tool.config().can_frame_type;
    test.tool.config_mut().can_frame_type = FrameType::Extended;
    let result = CanFrame::new(raw_id, &[0x01, 0x02, 0x03, 0x04], true)
        .and_then(|frame| test.tool.send_can_frame(&frame));
    test.tool.config_mut().can_frame_type = original;
    result?;
    Ok(Outcome {
        success: true,
        details: format!("Extended ID: 0x{:08X}", raw_id),
    })
}

/// Out of range ids and oversized payloads must be refused before they
/// reach the adapter; an empty payload is legal.
fn invalid_frame_rejection(test: &mut SelfTest<'_>) -> ToolResult<Outcome> {
    let invalid: [(u32, &[u8]); 2] = [
        (0x800, &[0x01, 0x02, 0x03, 0x04]),
        (0x123, &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09]),
    ];
    let rejected = invalid
        .iter()
        .filter(|(raw_id, data)| CanFrame::new(*raw_id, data, false).is_err())
        .count();
    let empty = CanFrame::new(0x123, &[], false)?;
    test.tool.send_can_frame(&empty)?;
    Ok(Outcome {
        success: rejected == invalid.len(),
        details: format!("Rejected {}/{} invalid frames", rejected, invalid.len()),
    })
}

fn monitoring(test: &mut SelfTest<'_>) -> ToolResult<Outcome> {
    test.tool.start_monitoring(None, DisplayMode::Hex)?;
    let frames: Vec<(u32, Vec<u8>)> = (0..5u8)
        .map(|i| (0x300 + i as u32, vec![i, i + 1, i + 2, i + 3]))
        .collect();
    let frames: Vec<(u32, &[u8])> = frames.iter().map(|(id, data)| (*id, data.as_slice())).collect();
    let sent = test.send_frames(&frames);
    thread::sleep(test.settings.frame_gap * 5);
    let rx_bytes = test.tool.stop_monitoring()?;
    Ok(Outcome {
        success: sent == frames.len(),
        details: format!("Monitored {} frames sent, {} bytes received", sent, rx_bytes),
    })
}
