#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use season_core::audit::AuditRecorder;
use season_core::clock::FixedClock;
use season_core::config::EngineConfig;
use season_core::giro::SettlementEngine;
use season_core::lifecycle::{LifecycleEngine, SeasonDraft};
use season_core::season::{Address, Holder, PaymentMode, Vehicle, VehicleClass};
use season_core::store::SeasonStore;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub struct TestRig {
    pub store: Arc<SeasonStore>,
    pub audit: Arc<AuditRecorder>,
    pub lifecycle: Arc<LifecycleEngine>,
    pub settlement: Arc<SettlementEngine>,
}

pub fn rig() -> TestRig {
    rig_on(date(2026, 1, 15))
}

pub fn rig_on(today: NaiveDate) -> TestRig {
    let store = Arc::new(SeasonStore::new(EngineConfig::default()));
    let audit = Arc::new(AuditRecorder::new());
    let clock = Arc::new(FixedClock::on_date(today));
    let lifecycle = Arc::new(LifecycleEngine::new(
        Arc::clone(&store),
        Arc::clone(&audit),
        clock.clone(),
    ));
    let settlement = Arc::new(SettlementEngine::new(
        Arc::clone(&lifecycle),
        Arc::clone(&audit),
        clock,
    ));
    TestRig {
        store,
        audit,
        lifecycle,
        settlement,
    }
}

pub fn holder(name: &str) -> Holder {
    Holder {
        name: name.into(),
        company: None,
        contact_no: "91234567".into(),
        email: Some("holder@example.com".into()),
        address: Address {
            block: "123".into(),
            street: "Ang Mo Kio Ave 3".into(),
            unit: Some("#05-01".into()),
            postal_code: "560123".into(),
        },
    }
}

pub fn draft(plate: &str, from: NaiveDate, to: NaiveDate, rate: f64) -> SeasonDraft {
    SeasonDraft {
        season_no: None,
        carpark_id: "CP001".into(),
        vehicle: Vehicle::new(plate, "9900112233", VehicleClass::Car),
        holder: holder("Alex Rivera"),
        monthly_rate: rate,
        payment_mode: PaymentMode::Cash,
        dda_reference: None,
        valid_from: from,
        valid_to: to,
        initial_amount: rate,
        deposit: 50.0,
        admin_charge: 10.0,
    }
}

pub fn dda_draft(plate: &str, from: NaiveDate, to: NaiveDate, rate: f64) -> SeasonDraft {
    SeasonDraft {
        payment_mode: PaymentMode::Dda,
        dda_reference: Some("DDA88219".into()),
        ..draft(plate, from, to, rate)
    }
}
