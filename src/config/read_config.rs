use crate::{
    config::DeviceConfig,
    utils::user_io::{BoxResult, RaisedError},
};
use std::{
    fs::{self, File},
    io::BufReader,
    path::Path,
};

impl DeviceConfig {
    pub fn save_config_file(&self, path: &Path) -> BoxResult<()> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        log::info!("[save_config_file] saved {:?}", path);
        Ok(())
    }

    /// Reads a JSON config. Keys that are not part of `DeviceConfig` are
    /// ignored and keys that are absent keep their default value.
    pub fn read_config_file(path: &Path) -> BoxResult<Self> {
        if path.is_dir() {
            return Err(RaisedError::new("path to dir"));
        }
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let cfg: DeviceConfig = serde_json::from_reader(reader)?;
        log::info!("[read_config_file] loaded {:?}", path);
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FrameType, Parity, WorkMode};
    use std::io::Write;

    #[test]
    fn save_then_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.json");
        let cfg = DeviceConfig {
            uart_baud: 57_600,
            uart_parity: Parity::Even,
            can_frame_type: FrameType::Extended,
            work_mode: WorkMode::ModbusRtu,
            can_filter_id: 0x1800,
            can_filter_mask: 0x1F00,
            ..DeviceConfig::default()
        };
        cfg.save_config_file(&path).unwrap();
        assert_eq!(DeviceConfig::read_config_file(&path).unwrap(), cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"can_baud": 250000, "work_mode": 2, "comment": "bench"}}"#).unwrap();

        let cfg = DeviceConfig::read_config_file(file.path()).unwrap();
        assert_eq!(cfg.can_baud, 250_000);
        assert_eq!(cfg.work_mode, WorkMode::TransparentWithId);
        assert_eq!(cfg.uart_baud, 115_200);
        assert_eq!(cfg.device_id, 1);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(DeviceConfig::read_config_file(file.path()).is_err());
    }

    #[test]
    fn directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let e = DeviceConfig::read_config_file(dir.path()).unwrap_err();
        assert_eq!(e.to_string(), "path to dir");
    }
}
