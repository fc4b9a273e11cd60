//! Typed domain counterparts of the raw vendor records, with the fixed
//! per-field mapping rules applied: enum ints become sum types with an
//! `Unknown` fallback, sentinel values become `None`, hex/base64
//! sub-fields are decoded only when non-empty, and unbounded lists are
//! clamped.

use crate::raw::{
    RawCall, RawCdmaBroadcastConfigEntry, RawDataCall, RawIccApp, RawIccCardStatus,
    RawRadioCapability, RawSendSmsResult, RawSignalStrength,
};
use base64::Engine;
use serde::Serialize;

/// Maximum ICC applications retained per card; vendor lists beyond this
/// are truncated.
pub const MAX_ICC_APPS: usize = 8;

/// Number of known CDMA broadcast SMS service categories.
pub const CDMA_BROADCAST_SERVICE_CATEGORIES: u32 = 31;

/// CMAS language indicator for English.
pub const CDMA_BROADCAST_LANGUAGE_ENGLISH: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CardState {
    Absent,
    Present,
    Error,
    Restricted,
    Unknown,
}

impl CardState {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::Absent,
            1 => Self::Present,
            2 => Self::Error,
            3 => Self::Restricted,
            _ => Self::Unknown,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PinState {
    Unknown,
    EnabledNotVerified,
    EnabledVerified,
    Disabled,
    EnabledBlocked,
    EnabledPermBlocked,
}

impl PinState {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::EnabledNotVerified,
            2 => Self::EnabledVerified,
            3 => Self::Disabled,
            4 => Self::EnabledBlocked,
            5 => Self::EnabledPermBlocked,
            _ => Self::Unknown,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppType {
    Unknown,
    Sim,
    Usim,
    Ruim,
    Csim,
    Isim,
}

impl AppType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::Sim,
            2 => Self::Usim,
            3 => Self::Ruim,
            4 => Self::Csim,
            5 => Self::Isim,
            _ => Self::Unknown,
        }
    }

    /// RUIM and CSIM applications back CDMA subscriptions.
    pub fn is_cdma(self) -> bool {
        matches!(self, Self::Ruim | Self::Csim)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppState {
    Unknown,
    Detected,
    Pin,
    Puk,
    SubscriptionPersonalization,
    Ready,
}

impl AppState {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::Detected,
            2 => Self::Pin,
            3 => Self::Puk,
            4 => Self::SubscriptionPersonalization,
            5 => Self::Ready,
            _ => Self::Unknown,
        }
    }

    pub fn is_locked(self) -> bool {
        matches!(self, Self::Pin | Self::Puk | Self::SubscriptionPersonalization)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IccApp {
    pub app_type: AppType,
    pub app_state: AppState,
    /// Application id, decoded from the hex sub-field when non-empty.
    pub aid: Option<Vec<u8>>,
    pub label: String,
}

impl IccApp {
    pub fn from_raw(raw: &RawIccApp) -> Self {
        Self {
            app_type: AppType::from_u32(raw.app_type),
            app_state: AppState::from_u32(raw.app_state),
            aid: decode_hex_field(&raw.aid, "icc app aid"),
            label: raw.label.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IccCardStatus {
    pub card_state: CardState,
    pub universal_pin_state: PinState,
    pub gsm_umts_app_index: Option<usize>,
    pub cdma_app_index: Option<usize>,
    pub ims_app_index: Option<usize>,
    pub apps: Vec<IccApp>,
}

impl IccCardStatus {
    pub fn from_raw(raw: &RawIccCardStatus) -> Self {
        let apps: Vec<IccApp> = raw
            .applications
            .iter()
            .take(MAX_ICC_APPS)
            .map(IccApp::from_raw)
            .collect();
        Self {
            card_state: CardState::from_u32(raw.card_state),
            universal_pin_state: PinState::from_u32(raw.universal_pin_state),
            gsm_umts_app_index: app_index(raw.gsm_umts_subscription_app_index, apps.len()),
            cdma_app_index: app_index(raw.cdma_subscription_app_index, apps.len()),
            ims_app_index: app_index(raw.ims_subscription_app_index, apps.len()),
            apps,
        }
    }

    pub fn has_cdma_app(&self) -> bool {
        self.apps.iter().any(|app| app.app_type.is_cdma())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    Active,
    Holding,
    Dialing,
    Alerting,
    Incoming,
    Waiting,
    Unknown,
}

impl CallState {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::Active,
            1 => Self::Holding,
            2 => Self::Dialing,
            3 => Self::Alerting,
            4 => Self::Incoming,
            5 => Self::Waiting,
            _ => Self::Unknown,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Call {
    pub index: u32,
    pub state: CallState,
    pub toa: u32,
    pub number: Option<String>,
    pub name: Option<String>,
    pub is_mt: bool,
    pub is_voice: bool,
    pub is_multiparty: bool,
}

impl Call {
    pub fn from_raw(raw: &RawCall) -> Self {
        Self {
            index: raw.index,
            state: CallState::from_u32(raw.state),
            toa: raw.toa,
            number: non_empty(&raw.number),
            name: non_empty(&raw.name),
            is_mt: raw.is_mt,
            is_voice: raw.is_voice,
            is_multiparty: raw.is_mpty,
        }
    }
}

/// Signal strength with vendor sentinels mapped to `None`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SignalStrength {
    pub gsm_signal_strength: Option<u32>,
    pub gsm_bit_error_rate: Option<u32>,
    pub cdma_dbm: Option<i32>,
    pub lte_rsrp: Option<i32>,
    pub lte_rsrq: Option<i32>,
    pub lte_rssnr: Option<i32>,
}

impl SignalStrength {
    pub fn from_raw(raw: &RawSignalStrength) -> Self {
        Self {
            gsm_signal_strength: sentinel_u32(raw.gsm_signal_strength, 99),
            gsm_bit_error_rate: sentinel_u32(raw.gsm_bit_error_rate, 99),
            cdma_dbm: sentinel_i32(raw.cdma_dbm, i32::MAX),
            lte_rsrp: sentinel_i32(raw.lte_rsrp, i32::MAX),
            lte_rsrq: sentinel_i32(raw.lte_rsrq, i32::MAX),
            lte_rssnr: sentinel_i32(raw.lte_rssnr, i32::MAX),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataConnState {
    Inactive,
    Dormant,
    Up,
    Unknown,
}

impl DataConnState {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::Inactive,
            1 => Self::Dormant,
            2 => Self::Up,
            _ => Self::Unknown,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DataCall {
    pub status: u32,
    pub suggested_retry_time_ms: Option<i64>,
    pub cid: u32,
    pub active: DataConnState,
    pub pdp_type: String,
    pub ifname: String,
    pub addresses: Vec<String>,
    pub dnses: Vec<String>,
    pub gateways: Vec<String>,
    pub mtu: Option<u32>,
}

impl DataCall {
    pub fn from_raw(raw: &RawDataCall) -> Self {
        Self {
            status: raw.status,
            suggested_retry_time_ms: if raw.suggested_retry_time < 0 {
                None
            } else {
                Some(raw.suggested_retry_time)
            },
            cid: raw.cid,
            active: DataConnState::from_u32(raw.active),
            pdp_type: raw.pdp_type.clone(),
            ifname: raw.ifname.clone(),
            addresses: split_list(&raw.addresses),
            dnses: split_list(&raw.dnses),
            gateways: split_list(&raw.gateways),
            mtu: if raw.mtu == 0 { None } else { Some(raw.mtu) },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CdmaBroadcastConfigEntry {
    pub service_category: u32,
    pub language: u32,
    pub selected: bool,
}

impl CdmaBroadcastConfigEntry {
    pub fn from_raw(raw: &RawCdmaBroadcastConfigEntry) -> Self {
        Self {
            service_category: raw.service_category,
            language: raw.language,
            selected: raw.selected,
        }
    }
}

/// The protocol distinguishes "no config" from "explicitly disabled";
/// downstream consumers assume the table is always fully populated, so an
/// empty vendor response is replaced with one entry per known service
/// category, deselected, language English.
pub fn default_cdma_broadcast_config() -> Vec<CdmaBroadcastConfigEntry> {
    (1..=CDMA_BROADCAST_SERVICE_CATEGORIES)
        .map(|service_category| CdmaBroadcastConfigEntry {
            service_category,
            language: CDMA_BROADCAST_LANGUAGE_ENGLISH,
            selected: false,
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RadioCapabilityPhase {
    Configured,
    Start,
    Apply,
    UnsolResponse,
    Finish,
    Unknown,
}

impl RadioCapabilityPhase {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::Configured,
            1 => Self::Start,
            2 => Self::Apply,
            3 => Self::UnsolResponse,
            4 => Self::Finish,
            _ => Self::Unknown,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RadioCapabilityStatus {
    None,
    Success,
    Fail,
    Unknown,
}

impl RadioCapabilityStatus {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::None,
            1 => Self::Success,
            2 => Self::Fail,
            _ => Self::Unknown,
        }
    }
}

/// Radio access family bits covering every technology the static fallback
/// capability claims.
pub const RAF_ALL: u32 = 0x000F_FFFF;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RadioCapability {
    pub session: u32,
    pub phase: RadioCapabilityPhase,
    pub rat_bitmask: u32,
    pub logical_modem_uuid: String,
    pub status: RadioCapabilityStatus,
}

impl RadioCapability {
    pub fn from_raw(raw: &RawRadioCapability) -> Self {
        Self {
            session: raw.session,
            phase: RadioCapabilityPhase::from_u32(raw.phase),
            rat_bitmask: raw.rat_bitmask,
            logical_modem_uuid: raw.logical_modem_uuid.clone(),
            status: RadioCapabilityStatus::from_u32(raw.status),
        }
    }

    /// Static capability substituted when the modem does not implement the
    /// capability request at all.
    pub fn static_fallback() -> Self {
        Self {
            session: 0,
            phase: RadioCapabilityPhase::Configured,
            rat_bitmask: RAF_ALL,
            logical_modem_uuid: String::new(),
            status: RadioCapabilityStatus::Success,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SendSmsResult {
    pub message_ref: i32,
    /// Acknowledgement PDU, base64-decoded when the field is non-empty.
    pub ack_pdu: Option<Vec<u8>>,
    pub error_code: Option<i32>,
}

impl SendSmsResult {
    pub fn from_raw(raw: &RawSendSmsResult) -> Self {
        Self {
            message_ref: raw.message_ref,
            ack_pdu: decode_base64_field(&raw.ack_pdu_b64, "sms ack pdu"),
            error_code: if raw.error_code < 0 { None } else { Some(raw.error_code) },
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn split_list(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}

fn sentinel_u32(value: u32, sentinel: u32) -> Option<u32> {
    if value == sentinel {
        None
    } else {
        Some(value)
    }
}

fn sentinel_i32(value: i32, sentinel: i32) -> Option<i32> {
    if value == sentinel {
        None
    } else {
        Some(value)
    }
}

fn app_index(index: i32, len: usize) -> Option<usize> {
    usize::try_from(index).ok().filter(|idx| *idx < len)
}

fn decode_hex_field(value: &str, what: &str) -> Option<Vec<u8>> {
    if value.is_empty() {
        return None;
    }
    match hex::decode(value) {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            log::warn!("hal: malformed hex in {what}: {err}");
            None
        }
    }
}

fn decode_base64_field(value: &str, what: &str) -> Option<Vec<u8>> {
    if value.is_empty() {
        return None;
    }
    match base64::engine::general_purpose::STANDARD.decode(value) {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            log::warn!("hal: malformed base64 in {what}: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::{RawIccApp, RawIccCardStatus, RawSignalStrength};

    #[test]
    fn app_list_is_clamped() {
        let raw = RawIccCardStatus {
            card_state: 1,
            applications: (0..12)
                .map(|idx| RawIccApp { app_type: 2, app_state: 5, aid: format!("a{idx:03}"), ..Default::default() })
                .collect(),
            ..Default::default()
        };
        let status = IccCardStatus::from_raw(&raw);
        assert_eq!(status.apps.len(), MAX_ICC_APPS);
        assert_eq!(status.card_state, CardState::Present);
    }

    #[test]
    fn app_index_out_of_range_maps_to_none() {
        let raw = RawIccCardStatus {
            card_state: 1,
            gsm_umts_subscription_app_index: 0,
            cdma_subscription_app_index: 3,
            ims_subscription_app_index: -1,
            applications: vec![RawIccApp { app_type: 2, app_state: 5, ..Default::default() }],
            ..Default::default()
        };
        let status = IccCardStatus::from_raw(&raw);
        assert_eq!(status.gsm_umts_app_index, Some(0));
        assert_eq!(status.cdma_app_index, None);
        assert_eq!(status.ims_app_index, None);
    }

    #[test]
    fn ruim_and_csim_apps_mark_the_card_cdma_capable() {
        let raw = RawIccCardStatus {
            card_state: 1,
            applications: vec![
                RawIccApp { app_type: 2, app_state: 5, ..Default::default() },
                RawIccApp { app_type: 4, app_state: 5, ..Default::default() },
            ],
            ..Default::default()
        };
        assert!(IccCardStatus::from_raw(&raw).has_cdma_app());
        let gsm_only = RawIccCardStatus {
            card_state: 1,
            applications: vec![RawIccApp { app_type: 2, app_state: 5, ..Default::default() }],
            ..Default::default()
        };
        assert!(!IccCardStatus::from_raw(&gsm_only).has_cdma_app());
    }

    #[test]
    fn signal_sentinels_map_to_none() {
        let raw = RawSignalStrength {
            gsm_signal_strength: 99,
            gsm_bit_error_rate: 3,
            cdma_dbm: i32::MAX,
            lte_rsrp: -98,
            lte_rsrq: i32::MAX,
            lte_rssnr: i32::MAX,
        };
        let strength = SignalStrength::from_raw(&raw);
        assert_eq!(strength.gsm_signal_strength, None);
        assert_eq!(strength.gsm_bit_error_rate, Some(3));
        assert_eq!(strength.cdma_dbm, None);
        assert_eq!(strength.lte_rsrp, Some(-98));
    }

    #[test]
    fn default_cdma_config_covers_every_category() {
        let table = default_cdma_broadcast_config();
        assert_eq!(table.len(), CDMA_BROADCAST_SERVICE_CATEGORIES as usize);
        for (idx, entry) in table.iter().enumerate() {
            assert_eq!(entry.service_category, idx as u32 + 1);
            assert_eq!(entry.language, CDMA_BROADCAST_LANGUAGE_ENGLISH);
            assert!(!entry.selected);
        }
    }

    #[test]
    fn malformed_hex_aid_is_dropped() {
        let app = IccApp::from_raw(&RawIccApp {
            app_type: 2,
            app_state: 5,
            aid: "zzzz".to_string(),
            ..Default::default()
        });
        assert_eq!(app.aid, None);
        assert_eq!(app.app_type, AppType::Usim);
    }
}
