pub type VisResult<T> = Result<T, VisError>;

/// Failures surfaced by the particle core.
///
/// `Config` and `Gpu` are fatal at construction or first use. `Draw` covers a
/// single failed frame; the stage still runs its per-tick bookkeeping before
/// handing it back.
#[derive(thiserror::Error, Debug)]
pub enum VisError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("gpu error: {0}")]
    Gpu(String),

    #[error("draw error: {0}")]
    Draw(String),

    #[error("unknown object {0}")]
    UnknownObject(usize),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VisError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn gpu(msg: impl Into<String>) -> Self {
        Self::Gpu(msg.into())
    }

    pub fn draw(msg: impl Into<String>) -> Self {
        Self::Draw(msg.into())
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
