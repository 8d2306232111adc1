//! Recurring direct-debit batches and their settlement against bank
//! outcomes.
//!
//! Items are append-mostly: once an outcome is recorded they are terminal
//! and never mutated again. A failed item is retried only through an
//! explicit `resubmit`, which issues a fresh pending item.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditAction, AuditRecorder};
use crate::calendar::{add_months_rollback, prorated_amount};
use crate::clock::Clock;
use crate::errors::{EngineError, Result};
use crate::lifecycle::LifecycleEngine;
use crate::season::PaymentMode;

/// One line of a settlement batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiroBatchItem {
    pub item_id: Uuid,
    pub batch_no: String,
    pub season_no: String,
    pub dda_reference: String,
    pub amount_due: f64,
    pub status: GiroStatus,
    /// Set when the item was enqueued by the renewal pipeline; a successful
    /// settlement then rolls the season forward by this many months.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renewal_months: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    pub applied_by: String,
    pub applied_on: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_on: Option<DateTime<Utc>>,
    /// Link back to the failed item this one replaces, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resubmitted_from: Option<Uuid>,
}

impl GiroBatchItem {
    pub fn is_pending(&self) -> bool {
        matches!(self.status, GiroStatus::Pending)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum GiroStatus {
    Pending,
    Success,
    Failed,
}

/// Bank settlement verdict fed in by the external reconciliation source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementOutcome {
    Success,
    Failed,
}

pub struct SettlementEngine {
    lifecycle: Arc<LifecycleEngine>,
    audit: Arc<AuditRecorder>,
    clock: Arc<dyn Clock>,
    items: Mutex<Vec<GiroBatchItem>>,
}

impl SettlementEngine {
    pub fn new(
        lifecycle: Arc<LifecycleEngine>,
        audit: Arc<AuditRecorder>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            lifecycle,
            audit,
            clock,
            items: Mutex::new(Vec::new()),
        }
    }

    /// Creates a pending item for an active DDA season. Renewal-pipeline
    /// items (`renewal_months` set) are priced for the *next* window; plain
    /// collection items for the current one.
    pub fn enqueue_for_batch(
        &self,
        season_no: &str,
        batch_no: &str,
        renewal_months: Option<u32>,
        applied_by: &str,
    ) -> Result<GiroBatchItem> {
        let season = self
            .lifecycle
            .store()
            .get(season_no)
            .ok_or_else(|| EngineError::SeasonNotFound(season_no.to_string()))?;
        if !season.is_active() {
            return Err(EngineError::IneligibleSeason(format!(
                "season {} is not active",
                season_no
            )));
        }
        if !matches!(season.payment_mode, PaymentMode::Dda) {
            return Err(EngineError::IneligibleSeason(format!(
                "season {} is not on DDA payment mode",
                season_no
            )));
        }
        let dda_reference = season.dda_reference.clone().ok_or_else(|| {
            EngineError::IneligibleSeason(format!("season {} has no DDA reference", season_no))
        })?;
        if matches!(renewal_months, Some(0)) {
            return Err(EngineError::Validation(
                "renewal period must be at least one month".into(),
            ));
        }

        let amount_due = match renewal_months {
            Some(months) => {
                let from = season.valid_to + Duration::days(1);
                let to = add_months_rollback(from, months);
                prorated_amount(season.monthly_rate, from, to)?
            }
            None => prorated_amount(season.monthly_rate, season.valid_from, season.valid_to)?,
        };

        let item = GiroBatchItem {
            item_id: Uuid::new_v4(),
            batch_no: batch_no.to_string(),
            season_no: season_no.to_string(),
            dda_reference,
            amount_due,
            status: GiroStatus::Pending,
            renewal_months,
            remarks: None,
            applied_by: applied_by.to_string(),
            applied_on: self.clock.now(),
            updated_by: None,
            updated_on: None,
            resubmitted_from: None,
        };
        self.items.lock().unwrap().push(item.clone());
        self.audit.record(
            applied_by,
            item.applied_on,
            item.item_id.to_string(),
            AuditAction::GiroEnqueue,
            None,
            Some(serde_json::to_value(&item)?),
        );
        info!(season_no, batch_no, amount_due, "GIRO item enqueued");
        Ok(item)
    }

    /// Applies a bank outcome to a pending item. Terminal: a second call on
    /// the same item fails with `AlreadySettled` whatever the outcome.
    ///
    /// A successful settlement of a renewal-linked item also renews the
    /// season, keeping money and lifecycle consistent. If that renewal fails
    /// the item stays settled (the money has moved) and the call surfaces
    /// `InconsistentSettlement` for manual reconciliation.
    pub fn record_outcome(
        &self,
        item_id: Uuid,
        outcome: SettlementOutcome,
        remarks: Option<&str>,
        actor: &str,
    ) -> Result<GiroBatchItem> {
        let now = self.clock.now();
        let (item, before) = {
            let mut items = self.items.lock().unwrap();
            let item = items
                .iter_mut()
                .find(|item| item.item_id == item_id)
                .ok_or(EngineError::ItemNotFound(item_id))?;
            if !item.is_pending() {
                return Err(EngineError::AlreadySettled(item_id));
            }
            let before = serde_json::to_value(&*item)?;
            item.status = match outcome {
                SettlementOutcome::Success => GiroStatus::Success,
                SettlementOutcome::Failed => GiroStatus::Failed,
            };
            item.remarks = remarks.map(str::to_string);
            item.updated_by = Some(actor.to_string());
            item.updated_on = Some(now);
            (item.clone(), before)
        };
        self.audit.record(
            actor,
            now,
            item.item_id.to_string(),
            AuditAction::GiroSettle,
            Some(before),
            Some(serde_json::to_value(&item)?),
        );

        if item.status == GiroStatus::Success {
            if let Some(months) = item.renewal_months {
                if let Err(source) =
                    self.lifecycle
                        .renew(&item.season_no, months, PaymentMode::Dda, actor)
                {
                    warn!(
                        item_id = %item.item_id,
                        season_no = %item.season_no,
                        error = %source,
                        "settlement succeeded but renewal failed; manual reconciliation required"
                    );
                    return Err(EngineError::InconsistentSettlement {
                        item_id: item.item_id,
                        season_no: item.season_no.clone(),
                        source: Box::new(source),
                    });
                }
            }
        }
        info!(item_id = %item.item_id, status = ?item.status, "GIRO outcome recorded");
        Ok(item)
    }

    /// Reissues a failed item as a fresh pending item in a new batch. The
    /// failed item itself is left untouched.
    pub fn resubmit(
        &self,
        item_id: Uuid,
        new_batch_no: &str,
        actor: &str,
    ) -> Result<GiroBatchItem> {
        let failed = self
            .get_item(item_id)
            .ok_or(EngineError::ItemNotFound(item_id))?;
        if failed.status != GiroStatus::Failed {
            return Err(EngineError::Validation(format!(
                "only failed items can be resubmitted (item {} is {:?})",
                item_id, failed.status
            )));
        }

        let item = GiroBatchItem {
            item_id: Uuid::new_v4(),
            batch_no: new_batch_no.to_string(),
            season_no: failed.season_no.clone(),
            dda_reference: failed.dda_reference.clone(),
            amount_due: failed.amount_due,
            status: GiroStatus::Pending,
            renewal_months: failed.renewal_months,
            remarks: None,
            applied_by: actor.to_string(),
            applied_on: self.clock.now(),
            updated_by: None,
            updated_on: None,
            resubmitted_from: Some(item_id),
        };
        self.items.lock().unwrap().push(item.clone());
        self.audit.record(
            actor,
            item.applied_on,
            item.item_id.to_string(),
            AuditAction::GiroResubmit,
            Some(serde_json::to_value(&failed)?),
            Some(serde_json::to_value(&item)?),
        );
        info!(
            old_item = %item_id,
            new_item = %item.item_id,
            batch_no = new_batch_no,
            "failed GIRO item resubmitted"
        );
        Ok(item)
    }

    pub fn get_item(&self, item_id: Uuid) -> Option<GiroBatchItem> {
        self.items
            .lock()
            .unwrap()
            .iter()
            .find(|item| item.item_id == item_id)
            .cloned()
    }

    pub fn items(&self) -> Vec<GiroBatchItem> {
        self.items.lock().unwrap().clone()
    }

    pub fn items_for_batch(&self, batch_no: &str) -> Vec<GiroBatchItem> {
        self.items
            .lock()
            .unwrap()
            .iter()
            .filter(|item| item.batch_no == batch_no)
            .cloned()
            .collect()
    }

    pub fn items_for_season(&self, season_no: &str) -> Vec<GiroBatchItem> {
        self.items
            .lock()
            .unwrap()
            .iter()
            .filter(|item| item.season_no == season_no)
            .cloned()
            .collect()
    }

    pub fn items_with_status(&self, status: GiroStatus) -> Vec<GiroBatchItem> {
        self.items
            .lock()
            .unwrap()
            .iter()
            .filter(|item| item.status == status)
            .cloned()
            .collect()
    }

    /// Wholesale replacement used when restoring a storage snapshot.
    pub(crate) fn replace_all(&self, items: Vec<GiroBatchItem>) {
        *self.items.lock().unwrap() = items;
    }
}
