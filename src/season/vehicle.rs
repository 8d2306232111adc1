use serde::{Deserialize, Serialize};

/// A registered vehicle. The plate number is the system-wide identifier; the
/// IU number is the in-vehicle transponder granted carpark access.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Vehicle {
    pub plate_no: String,
    pub iu_no: String,
    pub class: VehicleClass,
}

impl Vehicle {
    pub fn new(plate_no: impl Into<String>, iu_no: impl Into<String>, class: VehicleClass) -> Self {
        Self {
            plate_no: plate_no.into().to_uppercase(),
            iu_no: iu_no.into(),
            class,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VehicleClass {
    Car,
    Motorcycle,
    Lorry,
}
