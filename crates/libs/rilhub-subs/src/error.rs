/// Errors surfaced by the subscription layer.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum SubsError {
    #[error("store error: {0}")]
    Store(String),

    #[error("slot {0} out of range")]
    InvalidSlot(usize),

    #[error("euicc backend error: {0}")]
    Euicc(String),
}

impl From<rusqlite::Error> for SubsError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store(err.to_string())
    }
}
