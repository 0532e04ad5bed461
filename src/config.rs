//! Service configuration.
//!
//! Loaded from (highest precedence first):
//! 1. `PORT` and `DASHBOARD_*` environment variables
//! 2. `dashboard.toml` in the working directory, if present
//! 3. built-in defaults

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const CONFIG_FILE_NAME: &str = "dashboard.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Holds the live file of the current ISO week.
    pub data_dir: PathBuf,
    /// Receives every weekly file that is no longer current.
    pub archive_dir: PathBuf,
    /// Static page served on `GET /`.
    pub form_page: PathBuf,
    pub file_prefix: String,
    pub sheet_name: String,
    /// Extra characters added to the longest value of each column.
    pub column_padding: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            data_dir: PathBuf::from("data"),
            archive_dir: PathBuf::from("archive"),
            form_page: PathBuf::from("dash.htm"),
            file_prefix: "dashboard".to_string(),
            sheet_name: "Sheet1".to_string(),
            column_padding: 5,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE_NAME))
    }

    /// Loads defaults, then `config_file`, then the environment.
    pub fn load_from(config_file: &Path) -> Result<Self> {
        let figment = Self::file_figment(config_file)
            .merge(Env::prefixed("DASHBOARD_"))
            .merge(Env::raw().only(&["PORT"]));
        Self::extract(figment)
    }

    fn file_figment(config_file: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file))
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.file_prefix.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "file_prefix must not be empty".to_string(),
            });
        }
        if self.port == 0 {
            return Err(Error::ConfigValidation {
                message: "port must be greater than 0".to_string(),
            });
        }
        if self.data_dir == self.archive_dir {
            return Err(Error::ConfigValidation {
                message: format!(
                    "data_dir and archive_dir must differ (both {})",
                    self.data_dir.display()
                ),
            });
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| Error::ConfigValidation {
                message: format!("invalid listen address {}:{}: {e}", self.host, self.port),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 5000);
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.archive_dir, PathBuf::from("archive"));
        assert_eq!(config.file_prefix, "dashboard");
        assert_eq!(config.column_padding, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_keeps_defaults() -> Result<()> {
        let config = Config::extract(Config::file_figment(Path::new("/nonexistent/dashboard.toml")))?;
        assert_eq!(config, Config::default());
        Ok(())
    }

    #[test]
    fn test_toml_overrides_defaults() -> Result<()> {
        let dir = tempfile::tempdir().map_err(|e| Error::io("tempdir", e))?;
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "port = 8080\nfile_prefix = \"tenants\"\n")
            .map_err(|e| Error::io(&path, e))?;

        let config = Config::extract(Config::file_figment(&path))?;
        assert_eq!(config.port, 8080);
        assert_eq!(config.file_prefix, "tenants");
        assert_eq!(config.sheet_name, "Sheet1");
        Ok(())
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let empty_prefix = Config {
            file_prefix: " ".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            empty_prefix.validate(),
            Err(Error::ConfigValidation { .. })
        ));

        let zero_port = Config {
            port: 0,
            ..Config::default()
        };
        assert!(zero_port.validate().is_err());

        let same_dirs = Config {
            archive_dir: PathBuf::from("data"),
            ..Config::default()
        };
        let err = same_dirs.validate().unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn test_bind_addr() -> Result<()> {
        assert_eq!(Config::default().bind_addr()?.to_string(), "0.0.0.0:5000");
        let bad = Config {
            host: "not a host".to_string(),
            ..Config::default()
        };
        assert!(bad.bind_addr().is_err());
        Ok(())
    }
}
