use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings for one headless run. Every field may be left out of the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RunConfig {
    pub frames: Option<u64>,
    pub max_cycles: Option<u64>,
    /// Stop once the serial output contains this text.
    pub stop_on_serial: Option<String>,
    pub echo_serial: bool,
    pub save_ram: bool,
    pub state_out: Option<PathBuf>,
}

pub fn default_run_config_path() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("dmg-emu").join("run.toml");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("dmg-emu")
            .join("run.toml");
    }

    PathBuf::from("run.toml")
}

pub fn load_from_file(path: &Path) -> RunConfig {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => return RunConfig::default(),
    };

    match toml::from_str::<RunConfig>(&text) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(
                "Failed to parse run config {}: {e}; using defaults",
                path.display()
            );
            RunConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_from_file(&dir.path().join("absent.toml"));
        assert_eq!(cfg, RunConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(
            &path,
            "frames = 600\nstop_on_serial = \"Passed\"\necho_serial = true\n",
        )
        .unwrap();

        let cfg = load_from_file(&path);
        assert_eq!(cfg.frames, Some(600));
        assert_eq!(cfg.stop_on_serial.as_deref(), Some("Passed"));
        assert!(cfg.echo_serial);
        assert!(!cfg.save_ram);
        assert_eq!(cfg.max_cycles, None);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, "frames = \"many\"").unwrap();
        assert_eq!(load_from_file(&path), RunConfig::default());
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = RunConfig {
            max_cycles: Some(1_000_000),
            save_ram: true,
            state_out: Some(PathBuf::from("state.json")),
            ..RunConfig::default()
        };
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert_eq!(toml::from_str::<RunConfig>(&text).unwrap(), cfg);
    }
}
