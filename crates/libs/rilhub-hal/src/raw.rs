//! Fixed-layout vendor callback records, exactly as the HAL hands them
//! over. Field order and integer widths follow the vendor ABI; nothing in
//! here is interpreted beyond transport demarshalling.

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawIccApp {
    pub app_type: u32,
    pub app_state: u32,
    pub aid: String,
    pub label: String,
    pub pin1: u32,
    pub pin2: u32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawIccCardStatus {
    pub card_state: u32,
    pub universal_pin_state: u32,
    pub gsm_umts_subscription_app_index: i32,
    pub cdma_subscription_app_index: i32,
    pub ims_subscription_app_index: i32,
    pub applications: Vec<RawIccApp>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawCall {
    pub index: u32,
    pub state: u32,
    pub toa: u32,
    pub is_mpty: bool,
    pub is_mt: bool,
    pub als: u32,
    pub is_voice: bool,
    pub number: String,
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawSignalStrength {
    pub gsm_signal_strength: u32,
    pub gsm_bit_error_rate: u32,
    pub cdma_dbm: i32,
    pub lte_rsrp: i32,
    pub lte_rsrq: i32,
    pub lte_rssnr: i32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawDataCall {
    pub status: u32,
    pub suggested_retry_time: i64,
    pub cid: u32,
    pub active: u32,
    pub pdp_type: String,
    pub ifname: String,
    pub addresses: String,
    pub dnses: String,
    pub gateways: String,
    pub mtu: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RawCdmaBroadcastConfigEntry {
    pub service_category: u32,
    pub language: u32,
    pub selected: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawRadioCapability {
    pub session: u32,
    pub phase: u32,
    pub rat_bitmask: u32,
    pub logical_modem_uuid: String,
    pub status: u32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawSendSmsResult {
    pub message_ref: i32,
    pub ack_pdu_b64: String,
    pub error_code: i32,
}
