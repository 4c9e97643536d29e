use std::path::PathBuf;
use thiserror::Error;

/// Problems found before the run starts. Any of these aborts startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid duration {0:?}, expected forms like \"500ms\", \"30s\", \"1m30s\"")]
    Duration(String),

    #[error("invalid stage {0:?}, expected DURATION:TARGET like \"30s:50\"")]
    Stage(String),

    #[error("invalid stage target {0:?}, expected a non-negative integer")]
    Target(String),

    #[error("at least one stage is required")]
    NoStages,

    #[error("invalid threshold {expr:?} on {metric}: {reason}")]
    Threshold {
        metric: String,
        expr: String,
        reason: String,
    },

    #[error("unknown metric {0:?}")]
    UnknownMetric(String),

    #[error("invalid check {name:?}: {reason}")]
    Check { name: String, reason: String },

    #[error("invalid target url {url:?}: {reason}")]
    Url { url: String, reason: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

pub type Result<T, E = ConfigError> = std::result::Result<T, E>;
