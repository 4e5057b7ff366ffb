pub type LoopResult<T> = Result<T, LoopError>;

#[derive(thiserror::Error, Debug)]
pub enum LoopError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("geometry unavailable: {0}")]
    Geometry(String),

    #[error("listener leak: {0}")]
    Leak(String),

    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LoopError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn geometry(msg: impl Into<String>) -> Self {
        Self::Geometry(msg.into())
    }

    pub fn leak(msg: impl Into<String>) -> Self {
        Self::Leak(msg.into())
    }

    pub fn lifecycle(msg: impl Into<String>) -> Self {
        Self::Lifecycle(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

impl From<serde_json::Error> for LoopError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serde(e.to_string())
    }
}
