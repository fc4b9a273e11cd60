use serde::Serialize;

/// Vendor HAL error enumeration. The numeric codes are an external
/// contract; unknown codes are preserved, never collapsed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RadioError {
    None,
    RadioNotAvailable,
    GenericFailure,
    PasswordIncorrect,
    RequestNotSupported,
    Cancelled,
    SmsSendFailRetry,
    SimAbsent,
    InvalidArguments,
    InvalidState,
    NoMemory,
    InternalError,
    SystemError,
    ModemError,
    NetworkNotReady,
    OperationNotAllowed,
    Unknown(u32),
}

impl RadioError {
    pub fn from_u32(code: u32) -> Self {
        match code {
            0 => Self::None,
            1 => Self::RadioNotAvailable,
            2 => Self::GenericFailure,
            3 => Self::PasswordIncorrect,
            6 => Self::RequestNotSupported,
            7 => Self::Cancelled,
            10 => Self::SmsSendFailRetry,
            11 => Self::SimAbsent,
            44 => Self::InvalidArguments,
            45 => Self::InvalidState,
            37 => Self::NoMemory,
            38 => Self::InternalError,
            46 => Self::SystemError,
            47 => Self::ModemError,
            51 => Self::NetworkNotReady,
            54 => Self::OperationNotAllowed,
            other => Self::Unknown(other),
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Self::None => 0,
            Self::RadioNotAvailable => 1,
            Self::GenericFailure => 2,
            Self::PasswordIncorrect => 3,
            Self::RequestNotSupported => 6,
            Self::Cancelled => 7,
            Self::SmsSendFailRetry => 10,
            Self::SimAbsent => 11,
            Self::InvalidArguments => 44,
            Self::InvalidState => 45,
            Self::NoMemory => 37,
            Self::InternalError => 38,
            Self::SystemError => 46,
            Self::ModemError => 47,
            Self::NetworkNotReady => 51,
            Self::OperationNotAllowed => 54,
            Self::Unknown(code) => code,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::None)
    }

    /// The one error class the SMS pipeline retries on.
    pub fn is_sms_retryable(self) -> bool {
        matches!(self, Self::SmsSendFailRetry)
    }
}

impl std::fmt::Display for RadioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "unknown({code})"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Errors raised by this crate itself, as opposed to error codes carried
/// inside HAL responses.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum HalError {
    #[error("serial {0} already has an outstanding request")]
    DuplicateSerial(u32),
}

#[cfg(test)]
mod tests {
    use super::RadioError;

    #[test]
    fn error_codes_round_trip() {
        for code in 0u32..64 {
            assert_eq!(RadioError::from_u32(code).as_u32(), code);
        }
    }

    #[test]
    fn unknown_codes_are_preserved() {
        assert_eq!(RadioError::from_u32(9999), RadioError::Unknown(9999));
        assert_eq!(RadioError::Unknown(9999).as_u32(), 9999);
    }

    #[test]
    fn only_fail_retry_is_sms_retryable() {
        assert!(RadioError::SmsSendFailRetry.is_sms_retryable());
        assert!(!RadioError::GenericFailure.is_sms_retryable());
        assert!(!RadioError::None.is_sms_retryable());
    }
}
