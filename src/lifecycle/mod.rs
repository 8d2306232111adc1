//! State machine driving season transitions on top of the record store.
//!
//! Every mutating operation validates against a checked-out copy of the
//! season, then commits the new state, the season history event, and the
//! audit entry together. A failed validation drops the ticket and persists
//! nothing.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::audit::{AuditAction, AuditRecorder};
use crate::calendar::{add_months_rollback, prorated_amount, round_currency};
use crate::clock::Clock;
use crate::errors::{EngineError, Result};
use crate::season::{
    Holder, PaymentMode, Season, SeasonEventKind, SeasonStatus, Vehicle,
};
use crate::store::SeasonStore;

/// Intent payload for `create`. The presentation layer fills this from the
/// new-season form; the engine owns validation and number allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonDraft {
    /// Explicit season number, or `None` to let the store allocate one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season_no: Option<String>,
    pub carpark_id: String,
    pub vehicle: Vehicle,
    pub holder: Holder,
    pub monthly_rate: f64,
    pub payment_mode: PaymentMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dda_reference: Option<String>,
    pub valid_from: NaiveDate,
    pub valid_to: NaiveDate,
    pub initial_amount: f64,
    pub deposit: f64,
    pub admin_charge: f64,
}

/// Result of a successful renewal: the new inclusive window and the
/// prorated amount due for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewalOutcome {
    pub season: Season,
    pub valid_from: NaiveDate,
    pub valid_to: NaiveDate,
    pub amount_due: f64,
}

/// Result of a termination, refund already clamped and rounded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminationOutcome {
    pub season: Season,
    pub refund: f64,
}

/// Read-only listing of seasons running out within a window, with the
/// monthly revenue that lapses with them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiryOutlook {
    pub seasons: Vec<Season>,
    pub revenue_at_risk: f64,
}

pub struct LifecycleEngine {
    store: Arc<SeasonStore>,
    audit: Arc<AuditRecorder>,
    clock: Arc<dyn Clock>,
}

impl LifecycleEngine {
    pub fn new(store: Arc<SeasonStore>, audit: Arc<AuditRecorder>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            audit,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<SeasonStore> {
        &self.store
    }

    /// Validates the draft and inserts the season as `Active`. The store
    /// allocates a season number unless the draft carries one.
    pub fn create(&self, draft: SeasonDraft, actor: &str) -> Result<Season> {
        validate_draft(&draft)?;
        let now = self.clock.now();
        let mut season = Season {
            season_no: draft.season_no.unwrap_or_default(),
            carpark_id: draft.carpark_id,
            vehicle: draft.vehicle,
            holder: draft.holder,
            monthly_rate: draft.monthly_rate,
            payment_mode: draft.payment_mode,
            dda_reference: draft.dda_reference,
            valid_from: draft.valid_from,
            valid_to: draft.valid_to,
            status: SeasonStatus::Active,
            initial_amount: draft.initial_amount,
            deposit: draft.deposit,
            admin_charge: draft.admin_charge,
            total_amount: 0.0,
            refund_amount: None,
            history: Vec::new(),
            created_by: actor.to_string(),
            created_at: now,
            updated_by: actor.to_string(),
            updated_at: now,
        };
        season.compute_total();
        season.push_event(actor, now, SeasonEventKind::Created);

        let season = self.store.insert(season)?;
        self.audit.record(
            actor,
            now,
            season.season_no.as_str(),
            AuditAction::Create,
            None,
            Some(serde_json::to_value(&season)?),
        );
        info!(season_no = %season.season_no, plate = %season.vehicle.plate_no, "season created");
        Ok(season)
    }

    /// Rolls the validity window forward by `period_months` starting the day
    /// after the current `valid_to`, pricing the new window pro rata.
    pub fn renew(
        &self,
        season_no: &str,
        period_months: u32,
        payment_mode: PaymentMode,
        actor: &str,
    ) -> Result<RenewalOutcome> {
        if period_months == 0 {
            return Err(EngineError::Validation(
                "renewal period must be at least one month".into(),
            ));
        }
        let mut ticket = self.store.checkout(season_no)?;
        ensure_active(ticket.season())?;
        if matches!(payment_mode, PaymentMode::Dda) && ticket.season().dda_reference.is_none() {
            return Err(EngineError::Validation(
                "DDA payment mode requires a DDA reference".into(),
            ));
        }

        let before = serde_json::to_value(ticket.season())?;
        let new_from = ticket.season().valid_to + Duration::days(1);
        let new_to = add_months_rollback(new_from, period_months);
        let amount_due = prorated_amount(ticket.season().monthly_rate, new_from, new_to)?;

        let now = self.clock.now();
        let season = ticket.season_mut();
        season.valid_from = new_from;
        season.valid_to = new_to;
        season.payment_mode = payment_mode;
        season.push_event(
            actor,
            now,
            SeasonEventKind::Renewed {
                valid_from: new_from,
                valid_to: new_to,
                amount: amount_due,
            },
        );
        // The overlap check against other seasons for this plate runs inside
        // the commit, under the registry lock, so a season created for the
        // plate mid-renewal still rejects the extension.
        let season = ticket.commit_checked(new_from, new_to)?;

        self.audit.record(
            actor,
            now,
            season_no,
            AuditAction::Renew,
            Some(before),
            Some(serde_json::to_value(&season)?),
        );
        info!(season_no, %new_from, %new_to, amount_due, "season renewed");
        Ok(RenewalOutcome {
            season,
            valid_from: new_from,
            valid_to: new_to,
            amount_due,
        })
    }

    /// Transfers the season to a new vehicle as of `effective_date`. The old
    /// plate's access ends the day before; the new plate's starts that day.
    /// One atomic commit, so there is never a window where both or neither
    /// plate has access.
    pub fn change_vehicle(
        &self,
        season_no: &str,
        new_vehicle: Vehicle,
        effective_date: NaiveDate,
        actor: &str,
    ) -> Result<Season> {
        let mut ticket = self.store.checkout(season_no)?;
        ensure_active(ticket.season())?;
        if !ticket.season().covers(effective_date) {
            return Err(EngineError::Validation(format!(
                "effective date {} is outside the validity window",
                effective_date
            )));
        }
        let old_plate = ticket.season().vehicle.plate_no.clone();
        if new_vehicle.plate_no == old_plate {
            return Err(EngineError::Validation(
                "new vehicle matches the current vehicle".into(),
            ));
        }
        let window_end = ticket.season().valid_to;
        let before = serde_json::to_value(ticket.season())?;
        let now = self.clock.now();
        let new_plate = new_vehicle.plate_no.clone();
        let season = ticket.season_mut();
        season.vehicle = new_vehicle;
        season.push_event(
            actor,
            now,
            SeasonEventKind::VehicleChanged {
                old_plate: old_plate.clone(),
                new_plate: new_plate.clone(),
                effective_date,
            },
        );
        // The new plate must be clear of other active seasons from the
        // effective date to the end of the window, checked inside the commit
        // so a season created for that plate mid-transfer is caught.
        let season = ticket
            .commit_checked(effective_date, window_end)
            .map_err(|err| match err {
                EngineError::OverlappingWindow { plate, season_no } => {
                    EngineError::VehicleConflict { plate, season_no }
                }
                other => other,
            })?;

        self.audit.record(
            actor,
            now,
            season_no,
            AuditAction::ChangeVehicle,
            Some(before),
            Some(serde_json::to_value(&season)?),
        );
        info!(season_no, %old_plate, %new_plate, %effective_date, "vehicle transferred");
        Ok(season)
    }

    /// Terminates an active season. The refund covers `[termination_date,
    /// valid_to]` pro rata when termination lands inside the window; the
    /// recorded window itself is never altered retroactively.
    pub fn terminate(
        &self,
        season_no: &str,
        termination_date: NaiveDate,
        reason: &str,
        actor: &str,
    ) -> Result<TerminationOutcome> {
        if reason.trim().is_empty() {
            return Err(EngineError::MissingReason);
        }
        let mut ticket = self.store.checkout(season_no)?;
        ensure_active(ticket.season())?;
        if termination_date < ticket.season().valid_from {
            return Err(EngineError::Validation(format!(
                "termination date {} predates the validity window",
                termination_date
            )));
        }

        let before = serde_json::to_value(ticket.season())?;
        let refund = if termination_date < ticket.season().valid_to {
            prorated_amount(
                ticket.season().monthly_rate,
                termination_date,
                ticket.season().valid_to,
            )?
        } else {
            0.0
        };

        let now = self.clock.now();
        let season = ticket.season_mut();
        season.status = SeasonStatus::Terminated;
        season.refund_amount = Some(refund);
        season.push_event(
            actor,
            now,
            SeasonEventKind::Terminated {
                termination_date,
                reason: reason.trim().to_string(),
                refund,
            },
        );
        let season = ticket.commit();

        self.audit.record(
            actor,
            now,
            season_no,
            AuditAction::Terminate,
            Some(before),
            Some(serde_json::to_value(&season)?),
        );
        info!(season_no, %termination_date, refund, "season terminated");
        Ok(TerminationOutcome { season, refund })
    }

    /// Expires every active season whose `valid_to` lies before `as_of`.
    /// Takes a read snapshot first, then re-checks each season under its
    /// ticket so a concurrent renewal or termination mid-sweep is skipped
    /// rather than clobbered. Re-running with the same date is a no-op.
    pub fn expire_sweep(&self, as_of: NaiveDate, actor: &str) -> Result<Vec<String>> {
        let overdue: Vec<String> = self
            .store
            .active_seasons()
            .into_iter()
            .filter(|season| season.valid_to < as_of)
            .map(|season| season.season_no)
            .collect();

        let mut expired = Vec::new();
        for season_no in overdue {
            let mut ticket = match self.store.checkout(&season_no) {
                Ok(ticket) => ticket,
                // In flight elsewhere or gone; the next sweep picks it up if
                // it is still overdue.
                Err(EngineError::ConcurrentModification(_))
                | Err(EngineError::SeasonNotFound(_)) => continue,
                Err(err) => return Err(err),
            };
            if !ticket.season().is_active() || ticket.season().valid_to >= as_of {
                continue;
            }
            let before = serde_json::to_value(ticket.season())?;
            let now = self.clock.now();
            let season = ticket.season_mut();
            season.status = SeasonStatus::Expired;
            season.push_event(actor, now, SeasonEventKind::Expired { as_of });
            let season = ticket.commit();
            self.audit.record(
                actor,
                now,
                season_no.as_str(),
                AuditAction::Expire,
                Some(before),
                Some(serde_json::to_value(&season)?),
            );
            expired.push(season_no);
        }
        if !expired.is_empty() {
            info!(count = expired.len(), %as_of, "expiry sweep completed");
        }
        Ok(expired)
    }

    /// Replaces the holder and contact details of an active season. No
    /// window or money change.
    pub fn update_holder(&self, season_no: &str, holder: Holder, actor: &str) -> Result<Season> {
        if holder.name.trim().is_empty() || holder.contact_no.trim().is_empty() {
            return Err(EngineError::Validation(
                "holder name and contact number are required".into(),
            ));
        }
        let mut ticket = self.store.checkout(season_no)?;
        ensure_active(ticket.season())?;

        let before = serde_json::to_value(ticket.season())?;
        let now = self.clock.now();
        let season = ticket.season_mut();
        season.holder = holder;
        season.push_event(actor, now, SeasonEventKind::HolderUpdated);
        let season = ticket.commit();

        self.audit.record(
            actor,
            now,
            season_no,
            AuditAction::UpdateHolder,
            Some(before),
            Some(serde_json::to_value(&season)?),
        );
        Ok(season)
    }

    /// Active seasons whose `valid_to` falls in `[from, to]`, plus the sum
    /// of their monthly rates.
    pub fn expiring_within(&self, from: NaiveDate, to: NaiveDate) -> Result<ExpiryOutlook> {
        if to < from {
            return Err(EngineError::InvalidRange { from, to });
        }
        let seasons: Vec<Season> = self
            .store
            .active_seasons()
            .into_iter()
            .filter(|season| from <= season.valid_to && season.valid_to <= to)
            .collect();
        let revenue_at_risk =
            round_currency(seasons.iter().map(|season| season.monthly_rate).sum());
        Ok(ExpiryOutlook {
            seasons,
            revenue_at_risk,
        })
    }
}

fn ensure_active(season: &Season) -> Result<()> {
    if season.is_active() {
        Ok(())
    } else {
        Err(EngineError::NotActive {
            season_no: season.season_no.clone(),
            status: season.status,
        })
    }
}

fn validate_draft(draft: &SeasonDraft) -> Result<()> {
    let mut missing = Vec::new();
    if draft.carpark_id.trim().is_empty() {
        missing.push("carpark");
    }
    if draft.holder.name.trim().is_empty() {
        missing.push("holder name");
    }
    if draft.vehicle.plate_no.trim().is_empty() {
        missing.push("vehicle plate");
    }
    if !missing.is_empty() {
        return Err(EngineError::Validation(format!(
            "missing required fields: {}",
            missing.join(", ")
        )));
    }
    if draft.valid_to < draft.valid_from {
        return Err(EngineError::Validation(format!(
            "valid_from {} is after valid_to {}",
            draft.valid_from, draft.valid_to
        )));
    }
    if draft.monthly_rate <= 0.0 {
        return Err(EngineError::Validation(
            "monthly rate must be greater than zero".into(),
        ));
    }
    if draft.initial_amount < 0.0 || draft.deposit < 0.0 || draft.admin_charge < 0.0 {
        return Err(EngineError::Validation(
            "monetary fields must not be negative".into(),
        ));
    }
    if matches!(draft.payment_mode, PaymentMode::Dda)
        && draft
            .dda_reference
            .as_deref()
            .map_or(true, |dda| dda.trim().is_empty())
    {
        return Err(EngineError::Validation(
            "DDA payment mode requires a DDA reference".into(),
        ));
    }
    Ok(())
}
