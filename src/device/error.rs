use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("not connected to device")]
    NotConnected,
    #[error("monitoring already running")]
    AlreadyMonitoring,
    #[error("{command} rejected: {}", .response.as_deref().unwrap_or("no response"))]
    Rejected {
        command: String,
        response: Option<String>,
    },
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("{0}")]
    Usage(String),
    #[error("invalid hex {0:?}")]
    InvalidHex(String),
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("{0}")]
    Thread(String),
    #[error("monitor log {0}")]
    MonitorLog(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ToolResult<T> = Result<T, ToolError>;
