use crate::{
    config::{
        profiles::{save_profiles_file, Profile},
        BaudRate, DEFAULT_BAUD_RATE, DEFAULT_PORT,
    },
    device::{
        command::AtCommand,
        frame::{parse_data, parse_id, CanFrame},
        link::{list_ports, PortEntry},
        tool::{CanTool, ToolSettings},
    },
    selftest::{SelfTest, SelfTestSettings},
    threads::{
        monitor_thread::DisplayMode,
        user_console::{user_console_task, UserConsole, CONSOLE_HISTORY_PATH},
    },
    utils::user_io::{read_and_parse_user_entry, BoxResult, RaisedError, ReadAndParseUserEntryRes},
};
use clap::{Args, Parser, Subcommand};
use rustyline::Editor;
use std::{
    path::PathBuf,
    thread,
    time::{Duration, Instant},
};

#[derive(Parser, Debug)]
#[command(name = "wscantool", version, about = "Configure, test and monitor Waveshare USB-CAN adapters")]
pub struct Cli {
    /// Serial port of the adapter. If omitted a likely adapter is picked.
    #[arg(long, global = true)]
    pub port: Option<String>,

    /// Host side serial baud rate.
    #[arg(long, global = true, default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: BaudRate,

    /// Serial read timeout in milliseconds.
    #[arg(long, global = true, default_value_t = 100)]
    pub timeout_ms: u64,

    /// Pause between a command and reading its reply, in milliseconds.
    #[arg(long, global = true, default_value_t = 100)]
    pub response_delay_ms: u64,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List serial ports and flag likely CAN adapters.
    ListPorts,
    /// Query device version, info and status.
    Info,
    /// Send one AT command and print the reply.
    Command {
        /// e.g. `AT+VER`
        command: String,
    },
    /// Apply a configuration file or profile to the device and save it.
    Apply(ApplyArgs),
    /// Reset the device.
    Reset,
    /// Send a single CAN frame.
    Send {
        /// Hex id, e.g. `123` or `0x18FEF100`
        id: String,
        /// Hex payload, up to 8 bytes, e.g. `01020304`
        data: String,
        #[arg(long)]
        extended: bool,
    },
    /// Print incoming traffic until Enter or Ctrl-C.
    Monitor {
        /// Also write traffic to this file.
        #[arg(long)]
        log: Option<PathBuf>,
        /// Stop after this many seconds.
        #[arg(long)]
        duration: Option<u64>,
        /// Show received bytes as text lines instead of hex.
        #[arg(long)]
        text: bool,
    },
    /// Read all device parameters.
    Params {
        /// Also save them as JSON.
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Write a configuration file, from a profile or the defaults.
    ExportConfig {
        file: PathBuf,
        #[arg(long, value_enum)]
        profile: Option<Profile>,
    },
    /// Write every built-in profile to one JSON file.
    ExportProfiles { file: PathBuf },
    /// Interactive console.
    Console,
    /// Run the hardware self test and write a JSON report.
    Selftest {
        /// Apply this profile before testing.
        #[arg(long, value_enum)]
        profile: Option<Profile>,
        #[arg(long, default_value = ".")]
        report_dir: PathBuf,
    },
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct ApplyArgs {
    /// JSON configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long, value_enum)]
    pub profile: Option<Profile>,
}

impl Cli {
    fn tool_settings(&self, port: String) -> ToolSettings {
        ToolSettings {
            port,
            baud_rate: self.baud,
            read_timeout: Duration::from_millis(self.timeout_ms),
            response_delay: Duration::from_millis(self.response_delay_ms),
            ..ToolSettings::default()
        }
    }
}

fn print_ports(ports: &[PortEntry]) {
    println!("Available serial ports: {}", ports.len());
    for port in ports {
        println!("  {}: {}", port.port_name, port.description);
        if port.likely_adapter {
            println!("    -> Likely CAN device: {}", port.port_name);
        }
    }
}

/// One likely adapter is used directly, several are offered for selection,
/// none falls back to the default port name.
fn resolve_port(port: &Option<String>) -> BoxResult<String> {
    if let Some(port) = port {
        return Ok(port.clone());
    }
    let candidates: Vec<PortEntry> = list_ports()?.into_iter().filter(|p| p.likely_adapter).collect();
    match candidates.len() {
        0 => {
            log::warn!("[resolve_port] no adapter found, trying {}", DEFAULT_PORT);
            Ok(String::from(DEFAULT_PORT))
        }
        1 => Ok(candidates[0].port_name.clone()),
        _ => loop {
            println!("Adapters:");
            for (idx, entry) in candidates.iter().enumerate() {
                println!("{}) {} ({})", idx + 1, entry.port_name, entry.description);
            }
            match read_and_parse_user_entry::<usize>("Enter index of adapter to use") {
                ReadAndParseUserEntryRes::Ok(idx) if (1..=candidates.len()).contains(&idx) => {
                    return Ok(candidates[idx - 1].port_name.clone());
                }
                ReadAndParseUserEntryRes::Ok(_) | ReadAndParseUserEntryRes::EmptyEntry => {
                    println!("> Invalid entry\n");
                }
                ReadAndParseUserEntryRes::ParseErr { e, user_entry } => {
                    println!("> Invalid Entry {:?} {:?}\n", user_entry, e);
                }
                ReadAndParseUserEntryRes::ReadErr(e) => return Err(RaisedError::new(&e.to_string())),
            }
        },
    }
}

fn connect(cli: &Cli) -> BoxResult<CanTool> {
    let port = resolve_port(&cli.port)?;
    let mut tool = CanTool::new(cli.tool_settings(port));
    if let Err(e) = tool.connect() {
        return Err(RaisedError::new(&format!("failed to connect to {}: {}", tool.port(), e)));
    }
    println!("Connected to {} at {} baud", tool.port(), cli.baud);
    Ok(tool)
}

pub fn run(cli: Cli) -> BoxResult<()> {
    match &cli.command {
        Commands::ListPorts => {
            print_ports(&list_ports()?);
            return Ok(());
        }
        Commands::ExportConfig { file, profile } => {
            let cfg = profile.map(|p| p.config()).unwrap_or_default();
            cfg.save_config_file(file)?;
            println!("Configuration saved to {:?}", file);
            return Ok(());
        }
        Commands::ExportProfiles { file } => {
            save_profiles_file(file)?;
            println!("Profiles saved to {:?}", file);
            return Ok(());
        }
        _ => {}
    }

    let mut tool = connect(&cli)?;
    let res = run_on_device(&cli.command, &mut tool);
    let disconnected = tool.disconnect();
    res?;
    disconnected?;
    Ok(())
}

fn run_on_device(command: &Commands, tool: &mut CanTool) -> BoxResult<()> {
    match command {
        Commands::Info => {
            let info = tool.get_device_info()?;
            if info.is_empty() {
                println!("No device information received");
            }
            for (command, reply) in info {
                println!("{}: {}", command, reply);
            }
        }
        Commands::Command { command } => {
            match tool.send_command(&AtCommand::Raw(command.clone()), true)? {
                Some(reply) => println!("{}", reply),
                None => println!("No response"),
            }
        }
        Commands::Apply(args) => {
            match (&args.config, args.profile) {
                (Some(path), _) => tool.load_config_file(path)?,
                (None, Some(profile)) => tool.set_config(profile.config()),
                (None, None) => return Err(RaisedError::new("--config or --profile required")),
            }
            println!("{}", tool.config());
            if !tool.apply_config()? {
                return Err(RaisedError::new("configuration was not fully applied"));
            }
            println!("Configuration applied and saved");
        }
        Commands::Reset => {
            tool.reset_device()?;
            println!("Device reset");
        }
        Commands::Send { id, data, extended } => {
            let frame = CanFrame::new(parse_id(id)?, &parse_data(data)?, *extended)?;
            tool.send_can_frame(&frame)?;
            println!("Sent {}", frame);
        }
        Commands::Monitor { log, duration, text } => {
            let display = if *text { DisplayMode::Text } else { DisplayMode::Hex };
            tool.start_monitoring(log.as_deref(), display)?;
            match duration {
                Some(secs) => {
                    println!("Monitoring for {}s", secs);
                    let end = Instant::now() + Duration::from_secs(*secs);
                    while Instant::now() < end && !tool.monitor_ended() {
                        thread::sleep(Duration::from_millis(100));
                    }
                }
                None => {
                    println!("Monitoring, press Enter or Ctrl-C to stop");
                    let mut editor = Editor::<()>::new();
                    let _ = editor.readline("");
                }
            }
            let rx_bytes = tool.stop_monitoring()?;
            println!("Monitoring stopped, {} bytes received", rx_bytes);
        }
        Commands::Params { save } => {
            let params = tool.read_device_parameters()?;
            let json = serde_json::to_string_pretty(&params)?;
            println!("{}", json);
            if let Some(path) = save {
                std::fs::write(path, json)?;
                println!("Parameters saved to {:?}", path);
            }
        }
        Commands::Console => {
            let mut console = UserConsole::new(CONSOLE_HISTORY_PATH);
            let res = user_console_task(tool, &mut console);
            console.save_history();
            res?;
        }
        Commands::Selftest { profile, report_dir } => {
            let mut selftest = SelfTest::new(tool, SelfTestSettings::default());
            selftest.log_action("Device Detection", true, "Connected");
            let answered = selftest.probe_device()?;
            if answered == 0 {
                println!("Device does not answer AT commands, it may be in transparent mode");
            }
            if let Some(profile) = profile {
                selftest.apply_profile(*profile)?;
            }
            let summary = selftest.run_cases();
            let path = selftest.write_report(report_dir)?;
            println!(
                "Tests: {} passed, {} failed of {}",
                summary.passed, summary.failed, summary.total_tests
            );
            println!("Report: {:?}", path);
        }
        Commands::ListPorts | Commands::ExportConfig { .. } | Commands::ExportProfiles { .. } => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use clap::CommandFactory;

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_send() {
        let cli = Cli::try_parse_from(["wscantool", "--port", "/dev/ttyUSB0", "send", "18FEF100", "0102", "--extended"])
            .unwrap();
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyUSB0"));
        match cli.command {
            Commands::Send { id, data, extended } => {
                assert_eq!(id, "18FEF100");
                assert_eq!(data, "0102");
                assert!(extended);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn apply_needs_exactly_one_source() {
        assert!(Cli::try_parse_from(["wscantool", "apply"]).is_err());
        assert!(Cli::try_parse_from(["wscantool", "apply", "--config", "a.json", "--profile", "automotive"]).is_err());
        let cli = Cli::try_parse_from(["wscantool", "apply", "--profile", "heavy-machinery"]).unwrap();
        match cli.command {
            Commands::Apply(args) => assert_eq!(args.profile, Some(Profile::HeavyMachinery)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn global_options_after_subcommand() {
        let cli = Cli::try_parse_from(["wscantool", "monitor", "--duration", "5", "--baud", "9600"]).unwrap();
        assert_eq!(cli.baud, 9600);
        assert!(matches!(cli.command, Commands::Monitor { duration: Some(5), .. }));
    }

    #[test]
    fn export_config_writes_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("marine.json");
        let cli = Cli::try_parse_from([
            "wscantool",
            "export-config",
            path.to_str().unwrap(),
            "--profile",
            "marine-systems",
        ])
        .unwrap();
        run(cli).unwrap();
        let cfg = DeviceConfig::read_config_file(&path).unwrap();
        assert_eq!(cfg, Profile::MarineSystems.config());
    }
}
