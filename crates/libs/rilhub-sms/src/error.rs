use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SmsError {
    #[error("unknown outbound message id {0}")]
    UnknownMessage(u64),

    #[error("message {0} is not awaiting confirmation")]
    NotAwaitingConfirmation(u64),

    #[error("a message needs at least one part")]
    EmptyMessage,
}
