//! Season domain models and the identities they reference.

pub mod carpark;
#[allow(clippy::module_inception)]
pub mod season;
pub mod vehicle;

pub use carpark::Carpark;
pub use season::{
    Address, Holder, PaymentMode, Season, SeasonEvent, SeasonEventKind, SeasonStatus,
};
pub use vehicle::{Vehicle, VehicleClass};
