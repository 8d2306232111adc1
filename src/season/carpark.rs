use serde::{Deserialize, Serialize};

/// A carpark with its lot allocation per vehicle class. Capacity edits happen
/// on a separate administrative surface; the engines only read these records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Carpark {
    pub carpark_id: String,
    pub name: String,
    pub owner: String,
    pub car_lots: u32,
    pub motorcycle_lots: u32,
}

impl Carpark {
    pub fn new(
        carpark_id: impl Into<String>,
        name: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            carpark_id: carpark_id.into(),
            name: name.into(),
            owner: owner.into(),
            car_lots: 0,
            motorcycle_lots: 0,
        }
    }

    pub fn total_lots(&self) -> u32 {
        self.car_lots + self.motorcycle_lots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_lots_sums_the_class_breakdown() {
        let mut carpark = Carpark::new("CP001", "Central Plaza", "HDB");
        carpark.car_lots = 400;
        carpark.motorcycle_lots = 100;
        assert_eq!(carpark.total_lots(), 500);
    }
}
