use crate::{
    config::{DeviceConfig, FrameType, WorkMode},
    utils::user_io::BoxResult,
};
use std::{collections::BTreeMap, fmt, fs, path::Path};

/// Preset configurations for common bus setups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Profile {
    Automotive,
    IndustrialAutomation,
    HeavyMachinery,
    MarineSystems,
}

pub const ALL_PROFILES: [Profile; 4] = [
    Profile::Automotive,
    Profile::IndustrialAutomation,
    Profile::HeavyMachinery,
    Profile::MarineSystems,
];

impl Profile {
    pub fn name(&self) -> &'static str {
        match self {
            Profile::Automotive => "automotive",
            Profile::IndustrialAutomation => "industrial_automation",
            Profile::HeavyMachinery => "heavy_machinery",
            Profile::MarineSystems => "marine_systems",
        }
    }

    pub fn config(&self) -> DeviceConfig {
        let (uart_baud, can_baud, work_mode, can_frame_type, can_filter_id, can_filter_mask) =
            match self {
                Profile::Automotive => (
                    115_200,
                    500_000,
                    WorkMode::Transparent,
                    FrameType::Standard,
                    0x000,
                    0x000,
                ),
                Profile::IndustrialAutomation => (
                    115_200,
                    250_000,
                    WorkMode::TransparentWithId,
                    FrameType::Standard,
                    0x100,
                    0x700,
                ),
                Profile::HeavyMachinery => (
                    57_600,
                    125_000,
                    WorkMode::Transparent,
                    FrameType::Extended,
                    0x1800,
                    0x1F00,
                ),
                Profile::MarineSystems => (
                    38_400,
                    250_000,
                    WorkMode::Transparent,
                    FrameType::Standard,
                    0x000,
                    0x000,
                ),
            };
        DeviceConfig {
            uart_baud,
            can_baud,
            work_mode,
            can_frame_type,
            can_filter_id,
            can_filter_mask,
            ..DeviceConfig::default()
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

pub fn save_profiles_file(path: &Path) -> BoxResult<()> {
    let value: BTreeMap<&str, DeviceConfig> =
        ALL_PROFILES.iter().map(|p| (p.name(), p.config())).collect();
    fs::write(path, serde_json::to_string_pretty(&value)?)?;
    log::info!("[save_profiles_file] saved {} profiles to {:?}", ALL_PROFILES.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn industrial_profile_values() {
        let cfg = Profile::IndustrialAutomation.config();
        assert_eq!(cfg.can_baud, 250_000);
        assert_eq!(cfg.work_mode, WorkMode::TransparentWithId);
        assert_eq!(cfg.can_filter_id, 0x100);
        assert_eq!(cfg.can_filter_mask, 0x700);
        assert_eq!(cfg.uart_data_bits, 8);
    }

    #[test]
    fn cli_names() {
        use clap::ValueEnum;
        assert_eq!(
            Profile::from_str("heavy-machinery", false).unwrap(),
            Profile::HeavyMachinery
        );
        assert!(Profile::from_str("tractor", false).is_err());
    }

    #[test]
    fn profiles_file_has_every_preset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        save_profiles_file(&path).unwrap();

        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value.as_object().unwrap().len(), 4);
        assert_eq!(value["heavy_machinery"]["can_frame_type"], 1);
        assert_eq!(value["marine_systems"]["uart_baud"], 38_400);
    }
}
