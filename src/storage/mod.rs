//! JSON snapshot persistence for whole-engine state: seasons, GIRO items,
//! and the audit log in one document. Writes go to a temp file first and
//! are renamed into place.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::{AuditEntry, AuditRecorder};
use crate::errors::Result;
use crate::giro::{GiroBatchItem, SettlementEngine};
use crate::season::Season;
use crate::store::SeasonStore;

const CURRENT_SCHEMA_VERSION: u8 = 1;
const TMP_SUFFIX: &str = "tmp";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    #[serde(default = "EngineSnapshot::schema_version_default")]
    pub schema_version: u8,
    pub saved_at: DateTime<Utc>,
    /// Currency every monetary amount in the snapshot is denominated in,
    /// taken from the engine configuration at capture time.
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub seasons: Vec<Season>,
    #[serde(default)]
    pub giro_items: Vec<GiroBatchItem>,
    #[serde(default)]
    pub audit_log: Vec<AuditEntry>,
}

impl EngineSnapshot {
    pub fn capture(
        store: &SeasonStore,
        settlement: &SettlementEngine,
        audit: &AuditRecorder,
    ) -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            saved_at: Utc::now(),
            currency: store.config().currency.clone(),
            seasons: store.snapshot(),
            giro_items: settlement.items(),
            audit_log: audit.entries(),
        }
    }

    /// Loads the snapshot back into the store, settlement engine, and audit
    /// recorder. Fails if any season is mid-mutation.
    pub fn restore(
        self,
        store: &SeasonStore,
        settlement: &SettlementEngine,
        audit: &AuditRecorder,
    ) -> Result<()> {
        store.replace_all(self.seasons)?;
        settlement.replace_all(self.giro_items);
        audit.replace_all(self.audit_log);
        Ok(())
    }

    fn schema_version_default() -> u8 {
        CURRENT_SCHEMA_VERSION
    }
}

pub fn save_to_path(snapshot: &EngineSnapshot, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot)?;
    let tmp = path.with_extension(TMP_SUFFIX);
    write_atomic(&tmp, &json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn load_from_path(path: &Path) -> Result<EngineSnapshot> {
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

fn write_atomic(path: &Path, data: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut file = File::create(path)?;
    file.write_all(data.as_bytes())?;
    file.flush()?;
    Ok(())
}
