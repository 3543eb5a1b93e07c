//! Configuration file support for mspm0flash.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (MSPM0FLASH_*)
//! 3. Local config file (./mspm0flash.toml)
//! 4. Global config file (~/.config/mspm0flash/config.toml)
//!
//! `--config <PATH>` replaces both files.

use directories::ProjectDirs;
use log::{debug, warn};
use mspm0flash::FlowControl;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the per-directory config file.
pub const LOCAL_CONFIG_FILE: &str = "mspm0flash.toml";

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Serial device (e.g., "/dev/ttyUSB0").
    pub serial: Option<String>,
    /// I2C character device (e.g., "/dev/i2c-1").
    pub i2c: Option<String>,
    /// 7-bit I2C address of the bootloader.
    pub i2c_address: Option<u16>,
    /// Serial baud rate used to open the port.
    pub baud: Option<u32>,
    /// Baud rate to switch to after connecting.
    pub target_baud: Option<u32>,
    /// Serial flow control.
    pub flow_control: Option<FlowControl>,
}

/// Flash configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlashConfig {
    /// Start the application after a successful flash.
    #[serde(default)]
    pub start: bool,
    /// Explicit CRC verification length.
    pub crc_len: Option<u32>,
    /// BSL password as 64 hex digits.
    pub password: Option<String>,
    /// Retries for chunks that fail at the transport level.
    pub retries: Option<usize>,
}

/// Control script configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Script path.
    pub path: Option<PathBuf>,
    /// Set to `false` to never run the script.
    pub enabled: Option<bool>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Flash configuration.
    #[serde(default)]
    pub flash: FlashConfig,
    /// Control script configuration.
    #[serde(default)]
    pub script: ScriptConfig,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "mspm0flash").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        let conn = other.connection;
        if conn.serial.is_some() {
            self.connection.serial = conn.serial;
        }
        if conn.i2c.is_some() {
            self.connection.i2c = conn.i2c;
        }
        if conn.i2c_address.is_some() {
            self.connection.i2c_address = conn.i2c_address;
        }
        if conn.baud.is_some() {
            self.connection.baud = conn.baud;
        }
        if conn.target_baud.is_some() {
            self.connection.target_baud = conn.target_baud;
        }
        if conn.flow_control.is_some() {
            self.connection.flow_control = conn.flow_control;
        }

        let flash = other.flash;
        if flash.start {
            self.flash.start = true;
        }
        if flash.crc_len.is_some() {
            self.flash.crc_len = flash.crc_len;
        }
        if flash.password.is_some() {
            self.flash.password = flash.password;
        }
        if flash.retries.is_some() {
            self.flash.retries = flash.retries;
        }

        if other.script.path.is_some() {
            self.script.path = other.script.path;
        }
        if other.script.enabled.is_some() {
            self.script.enabled = other.script.enabled;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.connection.serial.is_none());
        assert!(config.connection.i2c.is_none());
        assert!(config.connection.baud.is_none());
        assert!(!config.flash.start);
        assert!(config.flash.password.is_none());
        assert!(config.script.path.is_none());
    }

    #[test]
    fn test_config_merge_connection() {
        let mut base = Config::default();
        base.connection.baud = Some(9600);

        let mut other = Config::default();
        other.connection.i2c = Some("/dev/i2c-3".to_string());
        other.connection.baud = Some(115200);

        base.merge(other);
        assert_eq!(base.connection.i2c.as_deref(), Some("/dev/i2c-3"));
        assert_eq!(base.connection.baud, Some(115200));
    }

    #[test]
    fn test_config_merge_does_not_overwrite_with_none() {
        let mut base = Config::default();
        base.connection.serial = Some("/dev/ttyUSB0".to_string());
        base.flash.retries = Some(2);
        base.script.enabled = Some(false);

        base.merge(Config::default());

        assert_eq!(base.connection.serial.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(base.flash.retries, Some(2));
        assert_eq!(base.script.enabled, Some(false));
    }

    #[test]
    fn test_config_merge_start_is_sticky() {
        let mut base = Config::default();
        let mut other = Config::default();
        other.flash.start = true;
        base.merge(other);
        base.merge(Config::default());
        assert!(base.flash.start);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
[connection]
i2c = "/dev/i2c-1"
i2c_address = 0x48
flow_control = "software"

[flash]
start = true
crc_len = 0x2000
retries = 3

[script]
path = "/opt/board/bsl-ctrl"
enabled = true
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.connection.i2c.as_deref(), Some("/dev/i2c-1"));
        assert_eq!(config.connection.i2c_address, Some(0x48));
        assert_eq!(config.connection.flow_control, Some(FlowControl::Software));
        assert!(config.flash.start);
        assert_eq!(config.flash.crc_len, Some(0x2000));
        assert_eq!(config.flash.retries, Some(3));
        assert_eq!(
            config.script.path.as_deref(),
            Some(Path::new("/opt/board/bsl-ctrl"))
        );
    }

    #[test]
    fn test_config_from_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.connection.serial.is_none());
        assert!(config.flash.crc_len.is_none());
    }

    #[test]
    fn test_load_from_path_valid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("board.toml");
        fs::write(
            &path,
            r#"
[connection]
serial = "/dev/ttyS1"
baud = 9600
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path);
        assert_eq!(config.connection.serial.as_deref(), Some("/dev/ttyS1"));
        assert_eq!(config.connection.baud, Some(9600));
    }

    #[test]
    fn test_load_from_path_invalid_is_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "invalid toml [[[").unwrap();

        let config = Config::load_from_path(&path);
        assert!(config.connection.serial.is_none());
    }

    #[test]
    fn test_load_from_path_nonexistent() {
        let config = Config::load_from_path(Path::new("/nonexistent/path/config.toml"));
        assert!(config.connection.serial.is_none());
    }

    #[test]
    fn test_global_config_path() {
        if let Some(p) = Config::global_config_path() {
            assert!(p.to_string_lossy().contains("mspm0flash"));
            assert!(p.to_string_lossy().ends_with("config.toml"));
        }
    }
}
