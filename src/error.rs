use thiserror::Error;

pub type AppResult<T> = Result<T, DomainError>;

/// Failures surfaced to callers of the library layer.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error(transparent)]
    Infra(#[from] InfraError),

    #[error(transparent)]
    Password(#[from] password_hash::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigErrorKind {
    #[error("failed to read file: {0}")]
    Read(std::io::Error),

    #[error("failed to parse file: {0}")]
    Parse(toml::de::Error),

    #[error("invalid environment variable {0}: {1}")]
    InvalidEnv(String, String),
}

/// Process-level failures: these are fatal at startup or tear a connection
/// down at runtime.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("invalid configuration in {path}: {source}")]
    Config {
        path: std::path::PathBuf,
        #[source]
        source: ConfigErrorKind,
    },

    #[error("could not bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("credential store {path}: {source}")]
    Passwd {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
