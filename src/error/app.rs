use thiserror::Error;

use super::{ClusterError, ConfigError, CycleError, RemoteError, StoreError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
    #[error("TOML error: {source}")]
    Toml {
        #[from]
        source: toml::de::Error,
    },
    #[error("Join error: {source}")]
    Join {
        #[from]
        source: tokio::task::JoinError,
    },
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Execution cycle error: {0}")]
    Cycle(#[from] CycleError),
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn config<E>(error: E) -> Self
    where
        E: Into<ConfigError>,
    {
        error.into().into()
    }

    pub fn cycle<E>(error: E) -> Self
    where
        E: Into<CycleError>,
    {
        error.into().into()
    }

    pub fn remote<E>(error: E) -> Self
    where
        E: Into<RemoteError>,
    {
        error.into().into()
    }

    pub fn cluster<E>(error: E) -> Self
    where
        E: Into<ClusterError>,
    {
        error.into().into()
    }

    pub fn store<E>(error: E) -> Self
    where
        E: Into<StoreError>,
    {
        error.into().into()
    }

    /// Process exit code for the CLI: 0 success, 1 unknown, 2 configuration,
    /// 3 execution-cycle conflict, 4 transient remote budget exhausted.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) | AppError::Toml { .. } => 2,
            AppError::Cycle(
                CycleError::CycleAlreadyStarted { .. } | CycleError::NoCurrentCycle { .. },
            ) => 3,
            AppError::Remote(
                RemoteError::Transient { .. }
                | RemoteError::AttemptsExhausted { .. }
                | RemoteError::Timeout { .. },
            ) => 4,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_class() {
        let config = AppError::config(ConfigError::MissingJmeterSource);
        assert_eq!(config.exit_code(), 2);

        let conflict = AppError::cycle(CycleError::CycleAlreadyStarted {
            project: "shop".to_owned(),
            cycle_id: 7,
        });
        assert_eq!(conflict.exit_code(), 3);

        let transient = AppError::remote(RemoteError::AttemptsExhausted {
            host: "10.0.0.1".to_owned(),
            attempts: 5,
            message: "connection reset".to_owned(),
        });
        assert_eq!(transient.exit_code(), 4);

        let other = AppError::from(std::io::Error::other("boom"));
        assert_eq!(other.exit_code(), 1);
    }
}
