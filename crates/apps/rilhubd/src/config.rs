use rilhub_sms::SmsConfig;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

fn default_slot_count() -> usize {
    2
}

fn default_euicc_card_id() -> String {
    "euicc-0".to_string()
}

#[derive(Debug, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_slot_count")]
    pub slot_count: usize,
    /// Subscription database path; in-memory when unset.
    pub db_path: Option<PathBuf>,
    #[serde(default = "default_euicc_card_id")]
    pub euicc_card_id: String,
    #[serde(default)]
    pub sms: SmsSection,
}

#[derive(Debug, Deserialize)]
pub struct SmsSection {
    #[serde(default = "SmsSection::default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "SmsSection::default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "SmsSection::default_max_pending_confirmations")]
    pub max_pending_confirmations: usize,
}

impl SmsSection {
    fn default_max_attempts() -> u32 {
        SmsConfig::default().max_attempts
    }

    fn default_retry_delay_ms() -> u64 {
        SmsConfig::default().retry_delay_ms
    }

    fn default_max_pending_confirmations() -> usize {
        SmsConfig::default().max_pending_confirmations
    }
}

impl Default for SmsSection {
    fn default() -> Self {
        Self {
            max_attempts: Self::default_max_attempts(),
            retry_delay_ms: Self::default_retry_delay_ms(),
            max_pending_confirmations: Self::default_max_pending_confirmations(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            slot_count: default_slot_count(),
            db_path: None,
            euicc_card_id: default_euicc_card_id(),
            sms: SmsSection::default(),
        }
    }
}

impl DaemonConfig {
    pub fn from_toml(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    }

    pub fn sms_config(&self) -> SmsConfig {
        SmsConfig {
            max_attempts: self.sms.max_attempts,
            retry_delay_ms: self.sms.retry_delay_ms,
            max_pending_confirmations: self.sms.max_pending_confirmations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = DaemonConfig::from_toml("").expect("parse");
        assert_eq!(config.slot_count, 2);
        assert_eq!(config.db_path, None);
        assert_eq!(config.euicc_card_id, "euicc-0");
        assert_eq!(config.sms_config(), SmsConfig::default());
    }

    #[test]
    fn full_config_parses() {
        let config = DaemonConfig::from_toml(
            r#"
            slot_count = 3
            db_path = "/var/lib/rilhub/subs.db"
            euicc_card_id = "euicc-1"

            [sms]
            max_attempts = 5
            retry_delay_ms = 500
            max_pending_confirmations = 8
            "#,
        )
        .expect("parse");
        assert_eq!(config.slot_count, 3);
        assert_eq!(config.db_path, Some(PathBuf::from("/var/lib/rilhub/subs.db")));
        assert_eq!(config.euicc_card_id, "euicc-1");
        let sms = config.sms_config();
        assert_eq!(sms.max_attempts, 5);
        assert_eq!(sms.retry_delay_ms, 500);
        assert_eq!(sms.max_pending_confirmations, 8);
    }

    #[test]
    fn partial_sms_section_fills_the_rest() {
        let config = DaemonConfig::from_toml("[sms]\nmax_attempts = 1\n").expect("parse");
        assert_eq!(config.sms_config().max_attempts, 1);
        assert_eq!(config.sms_config().retry_delay_ms, SmsConfig::default().retry_delay_ms);
    }
}
