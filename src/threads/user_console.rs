use crate::{
    device::{
        command::AtCommand,
        error::{ToolError, ToolResult},
        frame::{parse_data, parse_id, CanFrame},
        tool::CanTool,
    },
    threads::monitor_thread::DisplayMode,
};
use rustyline::{error::ReadlineError, Editor};

pub const CONSOLE_HISTORY_PATH: &str = "wscantool history.txt";

const HELP: &str = "\
Commands:
  AT...              send an AT command and print the reply
  send <id> <data>   send a CAN frame, id and data in hex
  hex:<bytes>        write raw hex bytes
  ascii:<text>       write raw text
  info               device information
  params             query device parameters
  id <n>             set the device id
  heartbeat <secs>   set the heartbeat interval, 0 turns it off
  load               restore the configuration stored in the device
  monitor start|stop background monitoring
  config             show the current configuration
  help               this list
  quit               exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Empty,
    At(String),
    Send(CanFrame),
    Raw(Vec<u8>),
    Info,
    Params,
    SetId(u32),
    Heartbeat(u32),
    Load,
    MonitorStart,
    MonitorStop,
    Config,
    Help,
    Quit,
}

fn usage(msg: &str) -> ToolError {
    ToolError::Usage(String::from(msg))
}

fn number_arg(word: Option<&str>, msg: &str) -> ToolResult<u32> {
    word.and_then(|w| w.parse().ok()).ok_or_else(|| usage(msg))
}

pub fn parse_console_line(line: &str) -> ToolResult<ConsoleCommand> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(ConsoleCommand::Empty);
    }
    if line.get(..2).map_or(false, |p| p.eq_ignore_ascii_case("AT")) {
        return Ok(ConsoleCommand::At(line.to_string()));
    }
    if let Some(hex) = line.strip_prefix("hex:") {
        return Ok(ConsoleCommand::Raw(parse_data(hex)?));
    }
    if let Some(text) = line.strip_prefix("ascii:") {
        return Ok(ConsoleCommand::Raw(text.as_bytes().to_vec()));
    }

    let mut words = line.split_whitespace();
    let cmd = words.next().unwrap_or_default().to_ascii_lowercase();
    match cmd.as_str() {
        "send" => {
            let id = words.next().ok_or_else(|| usage("usage: send <id> <data>"))?;
            let data: Vec<&str> = words.collect();
            CanFrame::auto(parse_id(id)?, &parse_data(&data.join(""))?).map(ConsoleCommand::Send)
        }
        "monitor" => match words.next() {
            Some("start") => Ok(ConsoleCommand::MonitorStart),
            Some("stop") => Ok(ConsoleCommand::MonitorStop),
            _ => Err(usage("usage: monitor start|stop")),
        },
        "info" => Ok(ConsoleCommand::Info),
        "params" => Ok(ConsoleCommand::Params),
        "id" => number_arg(words.next(), "usage: id <n>").map(ConsoleCommand::SetId),
        "heartbeat" => number_arg(words.next(), "usage: heartbeat <secs>").map(ConsoleCommand::Heartbeat),
        "load" => Ok(ConsoleCommand::Load),
        "config" => Ok(ConsoleCommand::Config),
        "help" | "?" => Ok(ConsoleCommand::Help),
        "quit" | "exit" => Ok(ConsoleCommand::Quit),
        _ => Err(usage("Unknown command")),
    }
}

pub fn run_console_command(tool: &mut CanTool, command: ConsoleCommand) -> ToolResult<()> {
    match command {
        ConsoleCommand::Empty | ConsoleCommand::Quit => {}
        ConsoleCommand::At(text) => {
            let monitoring = tool.is_monitoring();
            match tool.send_command(&AtCommand::Raw(text), true)? {
                Some(reply) => println!("{}", reply),
                None if monitoring => {}
                None => println!("(no response)"),
            }
        }
        ConsoleCommand::Send(frame) => tool.send_can_frame(&frame)?,
        ConsoleCommand::Raw(bytes) => tool.send_raw(&bytes)?,
        ConsoleCommand::Info => {
            let info = tool.get_device_info()?;
            if info.is_empty() {
                println!("(no information)");
            }
            for (command, reply) in info {
                println!("{}: {}", command, reply);
            }
        }
        ConsoleCommand::Params => {
            let params = tool.read_device_parameters()?;
            match serde_json::to_string_pretty(&params) {
                Ok(json) => println!("{}", json),
                Err(e) => println!("> [user_console_task] error: {}", e),
            }
        }
        ConsoleCommand::SetId(device_id) => tool.set_device_id(device_id)?,
        ConsoleCommand::Heartbeat(interval) => tool.set_heartbeat(interval)?,
        ConsoleCommand::Load => tool.load_device_config()?,
        ConsoleCommand::MonitorStart => tool.start_monitoring(None, DisplayMode::Hex)?,
        ConsoleCommand::MonitorStop => {
            let rx_bytes = tool.stop_monitoring()?;
            println!("{} bytes received", rx_bytes);
        }
        ConsoleCommand::Config => println!("{}", tool.config()),
        ConsoleCommand::Help => println!("{}", HELP),
    }
    Ok(())
}

/// Line editor with history kept across sessions.
pub struct UserConsole {
    editor: Editor<()>,
    history_path: String,
}

impl UserConsole {
    pub fn new(history_path: &str) -> Self {
        let mut console = Self {
            editor: Editor::new(),
            history_path: history_path.to_string(),
        };
        if console.editor.load_history(&console.history_path).is_err() {
            log::info!("[user_console] no previous history at {:?}", console.history_path);
        }
        console
    }

    pub fn save_history(mut self) {
        if let Err(e) = self.editor.save_history(&self.history_path) {
            log::warn!("[user_console] history not saved: {}", e);
        }
    }
}

/// Reads commands until `quit`, Ctrl-C or Ctrl-D. Monitoring is stopped on
/// the way out.
pub fn user_console_task(tool: &mut CanTool, console: &mut UserConsole) -> ToolResult<()> {
    println!("Interactive mode - type 'help' for commands, 'quit' to exit");
    loop {
        match console.editor.readline("> ") {
            Ok(line) => {
                console.editor.add_history_entry(line.as_str());
                match parse_console_line(&line) {
                    Ok(ConsoleCommand::Quit) => break,
                    Ok(command) => {
                        if let Err(e) = run_console_command(tool, command) {
                            println!("> [user_console_task] error: {}", e);
                        }
                    }
                    Err(e) => println!("{}", e),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("> [user_console_task] error: {:#?}", err);
                break;
            }
        }
    }
    log::info!("[user_console_task] end");
    tool.stop_monitoring().map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{
        mock_link::MockLink,
        tool::ToolSettings,
    };
    use std::time::Duration;

    #[test]
    fn parses_commands() {
        assert_eq!(parse_console_line("  ").unwrap(), ConsoleCommand::Empty);
        assert_eq!(
            parse_console_line("at+ver").unwrap(),
            ConsoleCommand::At(String::from("at+ver"))
        );
        assert_eq!(parse_console_line("QUIT").unwrap(), ConsoleCommand::Quit);
        assert_eq!(
            parse_console_line("monitor stop").unwrap(),
            ConsoleCommand::MonitorStop
        );
        assert_eq!(
            parse_console_line("hex:AA 55").unwrap(),
            ConsoleCommand::Raw(vec![0xAA, 0x55])
        );
        assert_eq!(
            parse_console_line("ascii:hi").unwrap(),
            ConsoleCommand::Raw(b"hi".to_vec())
        );
        assert_eq!(parse_console_line("id 16").unwrap(), ConsoleCommand::SetId(16));
        assert_eq!(
            parse_console_line("heartbeat 5").unwrap(),
            ConsoleCommand::Heartbeat(5)
        );
        assert_eq!(parse_console_line("load").unwrap(), ConsoleCommand::Load);
    }

    #[test]
    fn parses_send() {
        let expected = CanFrame::new(0x123, &[1, 2, 3, 4], false).unwrap();
        assert_eq!(
            parse_console_line("send 123 01 02 03 04").unwrap(),
            ConsoleCommand::Send(expected)
        );
        match parse_console_line("send 18FEF100 ff").unwrap() {
            ConsoleCommand::Send(frame) => assert!(frame.is_extended()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn rejects_bad_lines() {
        assert!(parse_console_line("send").is_err());
        assert!(parse_console_line("send 123 0102030405060708ff").is_err());
        assert!(parse_console_line("hex:abc").is_err());
        assert!(parse_console_line("monitor").is_err());
        assert!(parse_console_line("id").is_err());
        assert!(parse_console_line("heartbeat soon").is_err());
        match parse_console_line("frobnicate") {
            Err(e) => assert_eq!(e.to_string(), "Unknown command"),
            Ok(other) => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn device_settings_from_the_console() {
        let (link, handle) = MockLink::agreeable();
        let mut tool = CanTool::new(ToolSettings {
            response_delay: Duration::ZERO,
            ..ToolSettings::default()
        });
        tool.attach(Box::new(link));

        for line in ["id 16", "heartbeat 5", "load"] {
            run_console_command(&mut tool, parse_console_line(line).unwrap()).unwrap();
        }
        assert_eq!(handle.written_text(), "AT+ID=16\r\nAT+HEART=5\r\nAT+LOAD\r\n");
        assert_eq!(tool.config().device_id, 16);
        assert_eq!(tool.config().heartbeat_interval, 5);
    }

    #[test]
    fn commands_reach_the_device() {
        let (link, handle) = MockLink::agreeable();
        let mut tool = CanTool::new(ToolSettings {
            response_delay: Duration::ZERO,
            ..ToolSettings::default()
        });
        tool.attach(Box::new(link));

        run_console_command(&mut tool, parse_console_line("AT+SAVE").unwrap()).unwrap();
        run_console_command(&mut tool, parse_console_line("hex:0102").unwrap()).unwrap();
        run_console_command(&mut tool, parse_console_line("monitor start").unwrap()).unwrap();
        assert!(tool.is_monitoring());
        run_console_command(&mut tool, parse_console_line("monitor stop").unwrap()).unwrap();
        assert!(!tool.is_monitoring());
        assert_eq!(handle.written(), b"AT+SAVE\r\n\x01\x02".to_vec());
    }
}
