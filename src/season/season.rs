use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::vehicle::Vehicle;
use crate::calendar::round_currency;

/// A time-bounded parking subscription tying one vehicle to one carpark.
///
/// `Renewed` and `VehicleChanged` are not resting states: both loop the
/// season straight back to `Active` under a new window or vehicle, and are
/// recorded in `history` instead. Only `Terminated` and `Expired` are
/// terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Season {
    pub season_no: String,
    pub carpark_id: String,
    pub vehicle: Vehicle,
    pub holder: Holder,
    pub monthly_rate: f64,
    pub payment_mode: PaymentMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dda_reference: Option<String>,
    pub valid_from: NaiveDate,
    pub valid_to: NaiveDate,
    pub status: SeasonStatus,
    pub initial_amount: f64,
    pub deposit: f64,
    pub admin_charge: f64,
    pub total_amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_amount: Option<f64>,
    #[serde(default)]
    pub history: Vec<SeasonEvent>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

impl Season {
    pub fn is_active(&self) -> bool {
        matches!(self.status, SeasonStatus::Active)
    }

    /// Whether the validity window contains `date` (inclusive bounds).
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.valid_from <= date && date <= self.valid_to
    }

    /// Whether the validity window intersects `[from, to]`.
    pub fn overlaps(&self, from: NaiveDate, to: NaiveDate) -> bool {
        self.valid_from <= to && from <= self.valid_to
    }

    pub fn compute_total(&mut self) {
        self.total_amount = round_currency(self.initial_amount + self.deposit + self.admin_charge);
    }

    pub fn push_event(&mut self, by: impl Into<String>, at: DateTime<Utc>, kind: SeasonEventKind) {
        let by = by.into();
        self.history.push(SeasonEvent {
            at,
            by: by.clone(),
            kind,
        });
        self.updated_by = by;
        self.updated_at = at;
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SeasonStatus {
    Active,
    Terminated,
    Expired,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentMode {
    Cash,
    Cheque,
    /// Recurring direct debit against a bank mandate (GIRO).
    Dda,
}

/// The season holder's identity and billing address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Holder {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub contact_no: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub address: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Address {
    pub block: String,
    pub street: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub postal_code: String,
}

/// One entry of a season's lifecycle trail, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeasonEvent {
    pub at: DateTime<Utc>,
    pub by: String,
    pub kind: SeasonEventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SeasonEventKind {
    Created,
    Renewed {
        valid_from: NaiveDate,
        valid_to: NaiveDate,
        amount: f64,
    },
    VehicleChanged {
        old_plate: String,
        new_plate: String,
        effective_date: NaiveDate,
    },
    Terminated {
        termination_date: NaiveDate,
        reason: String,
        refund: f64,
    },
    Expired {
        as_of: NaiveDate,
    },
    HolderUpdated,
}
