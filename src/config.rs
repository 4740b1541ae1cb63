use crate::DEFAULT_PORT;
use crate::error::{AppResult, ConfigErrorKind, InfraError};
use serde::Deserialize;
use std::path::{Path, PathBuf};

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_passwd() -> PathBuf {
    PathBuf::from("passwd")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// TCP port for the telnet listener, e.g. 6789.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Flat credential file, one `login:hash:name:priv:blurb` per line.
    #[serde(default = "default_passwd")]
    pub passwd_file: PathBuf,
    /// Directory receiving the timestamped event logs.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Seconds a detached session survives before it is reaped.
    /// Zero keeps detached sessions around indefinitely.
    #[serde(default)]
    pub detach_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            passwd_file: default_passwd(),
            log_dir: default_log_dir(),
            detach_timeout_secs: 0,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let data = std::fs::read_to_string(&path).map_err(|e| InfraError::Config {
            path: path.as_ref().to_path_buf(),
            source: ConfigErrorKind::Read(e),
        })?;
        let cfg: Self = toml::from_str(&data).map_err(|e| InfraError::Config {
            path: path.as_ref().to_path_buf(),
            source: ConfigErrorKind::Parse(e),
        })?;
        Ok(cfg)
    }

    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::from_filename(".env");
        let mut cfg = Config::default();
        if let Ok(v) = std::env::var("PARLEY_PORT") {
            cfg.port = v.parse().map_err(|_| InfraError::Config {
                path: PathBuf::from(".env"),
                source: ConfigErrorKind::InvalidEnv("PARLEY_PORT".into(), v.clone()),
            })?;
        }
        if let Ok(v) = std::env::var("PARLEY_PASSWD") {
            cfg.passwd_file = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("PARLEY_LOG_DIR") {
            cfg.log_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("PARLEY_DETACH_TIMEOUT") {
            cfg.detach_timeout_secs = v.parse().map_err(|_| InfraError::Config {
                path: PathBuf::from(".env"),
                source: ConfigErrorKind::InvalidEnv("PARLEY_DETACH_TIMEOUT".into(), v.clone()),
            })?;
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_toml() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "port = 7000\ndetach_timeout_secs = 600").unwrap();
        let cfg = Config::load(f.path()).unwrap();
        assert_eq!(cfg.port, 7000);
        assert_eq!(cfg.detach_timeout_secs, 600);
        assert_eq!(cfg.passwd_file, PathBuf::from("passwd"));
    }

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.detach_timeout_secs, 0);
    }
}
