#![doc(test(attr(deny(warnings))))]

//! Season Core owns the lifecycle and settlement rules for parking season
//! subscriptions: validity-window arithmetic, state transitions, GIRO batch
//! reconciliation, and the audit trail behind them. Presentation clients
//! call into the engines here; nothing here calls back out.

pub mod audit;
pub mod calendar;
pub mod clock;
pub mod config;
pub mod errors;
pub mod giro;
pub mod lifecycle;
pub mod season;
pub mod storage;
pub mod store;

use std::sync::Once;

static INIT_TRACING: Once = Once::new();

/// Initializes global tracing and emits a startup info log.
pub fn init() {
    INIT_TRACING.call_once(|| {
        init_tracing();
        tracing::info!("Season Core tracing initialized.");
    });
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::from_default_env().add_directive("season_core=info".parse().unwrap());

    fmt().with_env_filter(filter).init();
}

#[cfg(test)]
mod tests {
    #[test]
    fn init_does_not_panic() {
        super::init();
    }
}
