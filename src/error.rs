use thiserror::Error;

pub type Result<T> = std::result::Result<T, SensorError>;

/// Problems with the sensor's configuration or its dependency bindings.
/// Always fatal to the reconfiguration that produced them.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} dependency is required")]
    MissingAttribute(&'static str),

    #[error("invalid attribute {name}: {reason}")]
    InvalidAttribute { name: &'static str, reason: String },

    #[error("{kind} '{name}' is not among the resolved dependencies")]
    UnresolvedDependency { kind: DependencyKind, name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    SpeechService,
    SentimentService,
}

impl std::fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SpeechService => write!(f, "speech service"),
            Self::SentimentService => write!(f, "sentiment service"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("listen loop has no speech or sentiment service bound")]
    NotConfigured,

    #[error("listen loop task failed: {0}")]
    LoopJoin(String),
}
