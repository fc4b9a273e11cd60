//! Premium short-code gating.
//!
//! The check runs synchronously before any network transmission. A
//! destination classified `AskUser` parks the whole message until the
//! host answers; `Deny` fails it without touching the radio.

use serde::Serialize;

/// Verdict for one destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortCodeVerdict {
    Allow,
    Deny,
    AskUser,
}

/// Destination policy seam. Implementations look the destination up in
/// carrier short-code tables; this crate only consumes the verdict.
pub trait ShortCodePolicy: Send {
    fn check(&self, destination: &str) -> ShortCodeVerdict;
}

/// Permits every destination. The default for hosts without a premium
/// short-code database.
#[derive(Default)]
pub struct AllowAllPolicy;

impl ShortCodePolicy for AllowAllPolicy {
    fn check(&self, _destination: &str) -> ShortCodeVerdict {
        ShortCodeVerdict::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_all_never_blocks() {
        let policy = AllowAllPolicy;
        assert_eq!(policy.check("12345"), ShortCodeVerdict::Allow);
        assert_eq!(policy.check("+15551234567"), ShortCodeVerdict::Allow);
    }
}
