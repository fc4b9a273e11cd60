use crate::error::SubsError;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::Serialize;

pub type SubId = i64;

/// Where a subscription's display name came from. Higher values win;
/// a user-set name is never overwritten by carrier data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NameSource {
    Default,
    CarrierId,
    Sim,
    Carrier,
    User,
}

impl NameSource {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Default => 0,
            Self::CarrierId => 1,
            Self::Sim => 2,
            Self::Carrier => 3,
            Self::User => 4,
        }
    }

    pub fn from_i64(value: i64) -> Self {
        match value {
            1 => Self::CarrierId,
            2 => Self::Sim,
            3 => Self::Carrier,
            4 => Self::User,
            _ => Self::Default,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SubscriptionRecord {
    pub sub_id: SubId,
    pub iccid: String,
    /// `None` means unassigned: the SIM is currently not in any slot.
    pub slot_index: Option<u32>,
    pub is_embedded: bool,
    pub is_opportunistic: bool,
    pub group_id: Option<String>,
    pub display_name: String,
    pub name_source: NameSource,
    pub carrier_id: Option<i64>,
    pub number: String,
    pub mcc: String,
    pub mnc: String,
    pub is_cdma: bool,
    pub access_rules: Vec<String>,
}

const RECORD_COLUMNS: &str = "sub_id, iccid, slot_index, is_embedded, is_opportunistic, group_id, \
     display_name, name_source, carrier_id, number, mcc, mnc, is_cdma, access_rules";

/// The persisted subscription table. Writes are narrow, field-scoped
/// updates; records are created once per ICCID and never duplicated or
/// deleted.
pub struct SubscriptionStore {
    conn: Connection,
}

impl SubscriptionStore {
    pub fn in_memory() -> Result<Self, SubsError> {
        let conn = Connection::open_in_memory().map_err(SubsError::from)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open(path: &std::path::Path) -> Result<Self, SubsError> {
        let conn = Connection::open(path).map_err(SubsError::from)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), SubsError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS subscriptions (
                    sub_id INTEGER PRIMARY KEY AUTOINCREMENT,
                    iccid TEXT NOT NULL UNIQUE,
                    slot_index INTEGER,
                    is_embedded INTEGER NOT NULL DEFAULT 0,
                    is_opportunistic INTEGER NOT NULL DEFAULT 0,
                    group_id TEXT,
                    display_name TEXT NOT NULL DEFAULT '',
                    name_source INTEGER NOT NULL DEFAULT 0,
                    carrier_id INTEGER,
                    number TEXT NOT NULL DEFAULT '',
                    mcc TEXT NOT NULL DEFAULT '',
                    mnc TEXT NOT NULL DEFAULT '',
                    is_cdma INTEGER NOT NULL DEFAULT 0,
                    access_rules TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_subscriptions_slot
                    ON subscriptions (slot_index);",
            )
            .map_err(SubsError::from)
    }

    /// Returns the record for `iccid`, creating it on first observation.
    /// A concurrent insert losing the race degrades to a lookup: the
    /// uniqueness constraint violation is caught narrowly, never bubbled.
    pub fn ensure_record(&self, iccid: &str) -> Result<SubscriptionRecord, SubsError> {
        let inserted = self
            .conn
            .execute("INSERT INTO subscriptions (iccid) VALUES (?1)", params![iccid]);
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation => {}
            Err(err) => return Err(err.into()),
        }
        self.get_by_iccid(iccid)?
            .ok_or_else(|| SubsError::Store(format!("record for iccid {iccid} vanished")))
    }

    pub fn get_by_iccid(&self, iccid: &str) -> Result<Option<SubscriptionRecord>, SubsError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM subscriptions WHERE iccid = ?1 LIMIT 1"
        ))?;
        stmt.query_row(params![iccid], row_to_record).optional().map_err(SubsError::from)
    }

    pub fn get_by_iccid_list(&self, iccids: &[String]) -> Result<Vec<SubscriptionRecord>, SubsError> {
        if iccids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; iccids.len()].join(", ");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM subscriptions WHERE iccid IN ({placeholders}) ORDER BY sub_id"
        ))?;
        let rows = stmt.query_map(rusqlite::params_from_iter(iccids.iter()), row_to_record)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(SubsError::from)
    }

    pub fn get_by_slot(&self, slot: u32) -> Result<Option<SubscriptionRecord>, SubsError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM subscriptions WHERE slot_index = ?1 LIMIT 1"
        ))?;
        stmt.query_row(params![slot], row_to_record).optional().map_err(SubsError::from)
    }

    /// Active records, meaning records currently assigned to a slot.
    pub fn active_records(&self) -> Result<Vec<SubscriptionRecord>, SubsError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM subscriptions WHERE slot_index IS NOT NULL ORDER BY slot_index"
        ))?;
        let rows = stmt.query_map([], row_to_record)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(SubsError::from)
    }

    pub fn embedded_records(&self) -> Result<Vec<SubscriptionRecord>, SubsError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM subscriptions WHERE is_embedded = 1 ORDER BY sub_id"
        ))?;
        let rows = stmt.query_map([], row_to_record)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(SubsError::from)
    }

    pub fn assign_slot(&self, sub_id: SubId, slot: u32) -> Result<bool, SubsError> {
        let changed = self.conn.execute(
            "UPDATE subscriptions SET slot_index = ?2 WHERE sub_id = ?1 AND slot_index IS NOT ?2",
            params![sub_id, slot],
        )?;
        Ok(changed > 0)
    }

    pub fn clear_slot(&self, sub_id: SubId) -> Result<bool, SubsError> {
        let changed = self.conn.execute(
            "UPDATE subscriptions SET slot_index = NULL WHERE sub_id = ?1 AND slot_index IS NOT NULL",
            params![sub_id],
        )?;
        Ok(changed > 0)
    }

    pub fn set_opportunistic(&self, sub_id: SubId, opportunistic: bool) -> Result<bool, SubsError> {
        let changed = self.conn.execute(
            "UPDATE subscriptions SET is_opportunistic = ?2 WHERE sub_id = ?1 AND is_opportunistic <> ?2",
            params![sub_id, opportunistic as i64],
        )?;
        Ok(changed > 0)
    }

    pub fn set_group(&self, sub_id: SubId, group_id: Option<&str>) -> Result<bool, SubsError> {
        let changed = self.conn.execute(
            "UPDATE subscriptions SET group_id = ?2 WHERE sub_id = ?1 AND group_id IS NOT ?2",
            params![sub_id, group_id],
        )?;
        Ok(changed > 0)
    }

    pub fn set_embedded(&self, sub_id: SubId, embedded: bool) -> Result<bool, SubsError> {
        let changed = self.conn.execute(
            "UPDATE subscriptions SET is_embedded = ?2 WHERE sub_id = ?1 AND is_embedded <> ?2",
            params![sub_id, embedded as i64],
        )?;
        Ok(changed > 0)
    }

    pub fn set_cdma(&self, sub_id: SubId, cdma: bool) -> Result<bool, SubsError> {
        let changed = self.conn.execute(
            "UPDATE subscriptions SET is_cdma = ?2 WHERE sub_id = ?1 AND is_cdma <> ?2",
            params![sub_id, cdma as i64],
        )?;
        Ok(changed > 0)
    }

    /// Writes the number only when it differs from the stored value, so
    /// an unchanged value produces no write and no change notification.
    pub fn update_number_if_changed(&self, sub_id: SubId, number: &str) -> Result<bool, SubsError> {
        let changed = self.conn.execute(
            "UPDATE subscriptions SET number = ?2 WHERE sub_id = ?1 AND number <> ?2",
            params![sub_id, number],
        )?;
        Ok(changed > 0)
    }

    pub fn update_mcc_mnc_if_changed(
        &self,
        sub_id: SubId,
        mcc: &str,
        mnc: &str,
    ) -> Result<bool, SubsError> {
        let changed = self.conn.execute(
            "UPDATE subscriptions SET mcc = ?2, mnc = ?3 WHERE sub_id = ?1 AND (mcc <> ?2 OR mnc <> ?3)",
            params![sub_id, mcc, mnc],
        )?;
        Ok(changed > 0)
    }

    pub fn update_carrier_id_if_changed(
        &self,
        sub_id: SubId,
        carrier_id: i64,
    ) -> Result<bool, SubsError> {
        let changed = self.conn.execute(
            "UPDATE subscriptions SET carrier_id = ?2 WHERE sub_id = ?1 AND carrier_id IS NOT ?2",
            params![sub_id, carrier_id],
        )?;
        Ok(changed > 0)
    }

    /// Sets the display name only when `source` outranks (or ties) the
    /// stored name source. A user-chosen name survives carrier updates.
    pub fn update_display_name(
        &self,
        sub_id: SubId,
        name: &str,
        source: NameSource,
    ) -> Result<bool, SubsError> {
        let changed = self.conn.execute(
            "UPDATE subscriptions SET display_name = ?2, name_source = ?3
             WHERE sub_id = ?1 AND name_source <= ?3 AND (display_name <> ?2 OR name_source <> ?3)",
            params![sub_id, name, source.as_i64()],
        )?;
        Ok(changed > 0)
    }

    pub fn update_access_rules_if_changed(
        &self,
        sub_id: SubId,
        rules: &[String],
    ) -> Result<bool, SubsError> {
        let encoded = serde_json::to_string(rules)
            .map_err(|err| SubsError::Store(format!("access rules encode: {err}")))?;
        let changed = self.conn.execute(
            "UPDATE subscriptions SET access_rules = ?2 WHERE sub_id = ?1 AND access_rules IS NOT ?2",
            params![sub_id, encoded],
        )?;
        Ok(changed > 0)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<SubscriptionRecord> {
    let slot_index: Option<i64> = row.get(2)?;
    let name_source: i64 = row.get(7)?;
    let access_rules_json: Option<String> = row.get(13)?;
    let access_rules = access_rules_json
        .as_deref()
        .and_then(|value| serde_json::from_str(value).ok())
        .unwrap_or_default();
    Ok(SubscriptionRecord {
        sub_id: row.get(0)?,
        iccid: row.get(1)?,
        slot_index: slot_index.and_then(|value| u32::try_from(value).ok()),
        is_embedded: row.get::<_, i64>(3)? != 0,
        is_opportunistic: row.get::<_, i64>(4)? != 0,
        group_id: row.get(5)?,
        display_name: row.get(6)?,
        name_source: NameSource::from_i64(name_source),
        carrier_id: row.get(8)?,
        number: row.get(9)?,
        mcc: row.get(10)?,
        mnc: row.get(11)?,
        is_cdma: row.get::<_, i64>(12)? != 0,
        access_rules,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_record_is_create_then_reuse() {
        let store = SubscriptionStore::in_memory().expect("store");
        let first = store.ensure_record("8901").expect("create");
        let second = store.ensure_record("8901").expect("reuse");
        assert_eq!(first.sub_id, second.sub_id);
        assert_eq!(second.slot_index, None);
    }

    #[test]
    fn conditional_updates_report_no_change_on_same_value() {
        let store = SubscriptionStore::in_memory().expect("store");
        let record = store.ensure_record("8901").expect("create");
        assert!(store.update_number_if_changed(record.sub_id, "+15551234").expect("update"));
        assert!(!store.update_number_if_changed(record.sub_id, "+15551234").expect("noop"));
        assert!(store.update_mcc_mnc_if_changed(record.sub_id, "310", "260").expect("update"));
        assert!(!store.update_mcc_mnc_if_changed(record.sub_id, "310", "260").expect("noop"));
        assert!(store.update_carrier_id_if_changed(record.sub_id, 1839).expect("update"));
        assert!(!store.update_carrier_id_if_changed(record.sub_id, 1839).expect("noop"));
    }

    #[test]
    fn user_display_name_outranks_carrier() {
        let store = SubscriptionStore::in_memory().expect("store");
        let record = store.ensure_record("8901").expect("create");
        assert!(store.update_display_name(record.sub_id, "Carrier Plan", NameSource::Carrier).expect("set"));
        assert!(store.update_display_name(record.sub_id, "My SIM", NameSource::User).expect("user set"));
        assert!(!store.update_display_name(record.sub_id, "Carrier Plan 2", NameSource::Carrier).expect("guarded"));
        let record = store.get_by_iccid("8901").expect("get").expect("record");
        assert_eq!(record.display_name, "My SIM");
        assert_eq!(record.name_source, NameSource::User);
    }

    #[test]
    fn iccid_in_list_query_matches_only_listed() {
        let store = SubscriptionStore::in_memory().expect("store");
        store.ensure_record("111").expect("a");
        store.ensure_record("222").expect("b");
        store.ensure_record("333").expect("c");
        let records = store
            .get_by_iccid_list(&["111".to_string(), "333".to_string()])
            .expect("query");
        let iccids: Vec<&str> = records.iter().map(|record| record.iccid.as_str()).collect();
        assert_eq!(iccids, ["111", "333"]);
    }

    #[test]
    fn slot_assignment_round_trip() {
        let store = SubscriptionStore::in_memory().expect("store");
        let record = store.ensure_record("111").expect("create");
        assert!(store.assign_slot(record.sub_id, 0).expect("assign"));
        assert!(!store.assign_slot(record.sub_id, 0).expect("idempotent"));
        assert_eq!(store.get_by_slot(0).expect("get").map(|r| r.sub_id), Some(record.sub_id));
        assert!(store.clear_slot(record.sub_id).expect("clear"));
        assert!(store.active_records().expect("active").is_empty());
        // The record survives removal with its slot unassigned.
        assert!(store.get_by_iccid("111").expect("get").is_some());
    }

    #[test]
    fn flag_setters_are_conditional() {
        let store = SubscriptionStore::in_memory().expect("store");
        let record = store.ensure_record("8901").expect("create");
        assert!(store.set_opportunistic(record.sub_id, true).expect("set"));
        assert!(!store.set_opportunistic(record.sub_id, true).expect("noop"));
        assert!(store.set_group(record.sub_id, Some("g1")).expect("set"));
        assert!(!store.set_group(record.sub_id, Some("g1")).expect("noop"));
        assert!(store.set_group(record.sub_id, None).expect("clear"));
        let record = store.get_by_iccid("8901").expect("get").expect("record");
        assert!(record.is_opportunistic);
        assert_eq!(record.group_id, None);
    }

    #[test]
    fn open_on_disk_persists_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("subs.db");
        {
            let store = SubscriptionStore::open(&path).expect("open");
            store.ensure_record("999").expect("create");
        }
        let store = SubscriptionStore::open(&path).expect("reopen");
        assert!(store.get_by_iccid("999").expect("get").is_some());
    }
}
