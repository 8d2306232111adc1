//! Canonical owner of every `Season` record.
//!
//! Mutating lifecycle operations check a season out of the registry, work on
//! a private copy, and commit the result back in one step. While a season is
//! checked out it is marked in flight; a second checkout of the same season
//! number fails with `ConcurrentModification` instead of blocking, so at
//! most one of renew / change-vehicle / terminate runs per season at a time.
//! Operations on distinct seasons proceed in parallel. Reads take the
//! registry lock briefly and clone out committed state only. Commits that
//! widen a plate's coverage re-validate the overlap invariant under the same
//! lock acquisition as the write-back, so an insert landing between checkout
//! and commit cannot slip past the check.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use chrono::NaiveDate;

use crate::config::EngineConfig;
use crate::errors::{EngineError, Result};
use crate::season::Season;

#[derive(Debug, Default)]
struct StoreInner {
    seasons: BTreeMap<String, Season>,
    in_flight: HashSet<String>,
    next_seq: u64,
}

#[derive(Debug)]
pub struct SeasonStore {
    inner: Mutex<StoreInner>,
    config: EngineConfig,
}

impl SeasonStore {
    pub fn new(config: EngineConfig) -> Self {
        let next_seq = config.season_no_start;
        Self {
            inner: Mutex::new(StoreInner {
                next_seq,
                ..StoreInner::default()
            }),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Inserts a new season, enforcing season-number uniqueness and the
    /// no-overlapping-active-window invariant for its plate. A season with an
    /// empty `season_no` gets the next `<prefix>-<seq>` number. Atomic: the
    /// registry lock is held across the checks, the allocation, and the
    /// insert, so a rejected season never consumes a number.
    pub fn insert(&self, mut season: Season) -> Result<Season> {
        let mut inner = self.inner.lock().unwrap();
        if !season.season_no.is_empty() && inner.seasons.contains_key(&season.season_no) {
            return Err(EngineError::DuplicateSeason(season.season_no));
        }
        if let Some(existing) = overlapping_active(
            &inner.seasons,
            &season.vehicle.plate_no,
            season.valid_from,
            season.valid_to,
            Some(season.season_no.as_str()),
        ) {
            return Err(EngineError::OverlappingWindow {
                plate: season.vehicle.plate_no.clone(),
                season_no: existing,
            });
        }
        if season.season_no.is_empty() {
            season.season_no = format!("{}-{}", self.config.season_no_prefix, inner.next_seq);
            inner.next_seq += 1;
        }
        inner.seasons.insert(season.season_no.clone(), season.clone());
        Ok(season)
    }

    /// Clone-out read of one committed season.
    pub fn get(&self, season_no: &str) -> Option<Season> {
        self.inner.lock().unwrap().seasons.get(season_no).cloned()
    }

    pub fn snapshot(&self) -> Vec<Season> {
        self.inner.lock().unwrap().seasons.values().cloned().collect()
    }

    pub fn active_seasons(&self) -> Vec<Season> {
        self.inner
            .lock()
            .unwrap()
            .seasons
            .values()
            .filter(|season| season.is_active())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().seasons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks a season out for mutation. Fails with `SeasonNotFound` for an
    /// unknown number and `ConcurrentModification` when another operation
    /// already has it in flight.
    pub fn checkout(&self, season_no: &str) -> Result<SeasonTicket<'_>> {
        let mut inner = self.inner.lock().unwrap();
        let season = inner
            .seasons
            .get(season_no)
            .cloned()
            .ok_or_else(|| EngineError::SeasonNotFound(season_no.to_string()))?;
        if !inner.in_flight.insert(season_no.to_string()) {
            return Err(EngineError::ConcurrentModification(season_no.to_string()));
        }
        Ok(SeasonTicket {
            store: self,
            season_no: season_no.to_string(),
            season,
            committed: false,
        })
    }

    /// Which active season grants `plate` access on `date`, accounting for
    /// vehicle transfers: before a transfer's effective date the old plate is
    /// covered, from it onward the new plate is. Plate comparison is
    /// case-insensitive like plate entry in the field.
    pub fn vehicle_access_on(&self, plate: &str, date: NaiveDate) -> Option<String> {
        let plate = plate.to_uppercase();
        let inner = self.inner.lock().unwrap();
        inner
            .seasons
            .values()
            .find(|season| {
                season.is_active() && season.covers(date) && plate_on(season, date) == plate
            })
            .map(|season| season.season_no.clone())
    }

    fn commit(&self, season_no: &str, season: Season) {
        let mut inner = self.inner.lock().unwrap();
        inner.seasons.insert(season_no.to_string(), season);
        inner.in_flight.remove(season_no);
    }

    fn commit_checked(
        &self,
        season_no: &str,
        season: Season,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Season> {
        let mut inner = self.inner.lock().unwrap();
        inner.in_flight.remove(season_no);
        if let Some(existing) = overlapping_active(
            &inner.seasons,
            &season.vehicle.plate_no,
            from,
            to,
            Some(season_no),
        ) {
            return Err(EngineError::OverlappingWindow {
                plate: season.vehicle.plate_no.clone(),
                season_no: existing,
            });
        }
        inner.seasons.insert(season_no.to_string(), season.clone());
        Ok(season)
    }

    fn release(&self, season_no: &str) {
        self.inner.lock().unwrap().in_flight.remove(season_no);
    }

    /// Wholesale replacement used when restoring a storage snapshot. Fails
    /// if any season is currently checked out.
    pub(crate) fn replace_all(&self, seasons: Vec<Season>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(busy) = inner.in_flight.iter().next() {
            return Err(EngineError::ConcurrentModification(busy.clone()));
        }
        inner.seasons = seasons
            .into_iter()
            .map(|season| (season.season_no.clone(), season))
            .collect();
        let max_seq = highest_allocated_seq(&inner.seasons, &self.config.season_no_prefix);
        inner.next_seq = inner.next_seq.max(max_seq + 1);
        Ok(())
    }
}

/// Exclusive mutation handle for one season. Dropping without `commit`
/// discards every change and releases the in-flight marker, which keeps
/// failed operations all-or-nothing.
#[derive(Debug)]
pub struct SeasonTicket<'a> {
    store: &'a SeasonStore,
    season_no: String,
    season: Season,
    committed: bool,
}

impl SeasonTicket<'_> {
    pub fn season(&self) -> &Season {
        &self.season
    }

    pub fn season_mut(&mut self) -> &mut Season {
        &mut self.season
    }

    pub fn season_no(&self) -> &str {
        &self.season_no
    }

    /// Writes the mutated season back and releases the in-flight marker.
    pub fn commit(mut self) -> Season {
        self.committed = true;
        let season = self.season.clone();
        self.store.commit(&self.season_no, season.clone());
        season
    }

    /// Like `commit`, but re-runs the plate overlap check against the
    /// mutated season's plate over `[from, to]` under the same lock
    /// acquisition as the write-back. A season inserted for the plate after
    /// this ticket's checkout is caught here; on conflict nothing is written
    /// and the in-flight marker is released.
    pub fn commit_checked(mut self, from: NaiveDate, to: NaiveDate) -> Result<Season> {
        self.committed = true;
        self.store
            .commit_checked(&self.season_no, self.season.clone(), from, to)
    }
}

impl Drop for SeasonTicket<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.store.release(&self.season_no);
        }
    }
}

/// Largest numeric suffix among store-allocated season numbers, so the
/// allocator never re-issues a number after a snapshot restore.
fn highest_allocated_seq(seasons: &BTreeMap<String, Season>, prefix: &str) -> u64 {
    let prefix = format!("{}-", prefix);
    seasons
        .keys()
        .filter_map(|no| no.strip_prefix(&prefix))
        .filter_map(|suffix| suffix.parse::<u64>().ok())
        .max()
        .unwrap_or(0)
}

fn overlapping_active(
    seasons: &BTreeMap<String, Season>,
    plate: &str,
    from: NaiveDate,
    to: NaiveDate,
    exclude: Option<&str>,
) -> Option<String> {
    let plate = plate.to_uppercase();
    seasons
        .values()
        .find(|season| {
            exclude != Some(season.season_no.as_str())
                && season.is_active()
                && season.vehicle.plate_no == plate
                && season.overlaps(from, to)
        })
        .map(|season| season.season_no.clone())
}

/// Reconstructs which plate the season covered on `date` from its transfer
/// history. Before the first recorded transfer the original plate applies.
fn plate_on(season: &Season, date: NaiveDate) -> String {
    use crate::season::SeasonEventKind;

    let mut transfers: Vec<(&NaiveDate, &str, &str)> = season
        .history
        .iter()
        .filter_map(|event| match &event.kind {
            SeasonEventKind::VehicleChanged {
                old_plate,
                new_plate,
                effective_date,
            } => Some((effective_date, old_plate.as_str(), new_plate.as_str())),
            _ => None,
        })
        .collect();
    transfers.sort_by_key(|(effective, _, _)| **effective);

    let mut plate = transfers
        .first()
        .map(|(_, old, _)| old.to_string())
        .unwrap_or_else(|| season.vehicle.plate_no.clone());
    for (effective, _, new) in transfers {
        if date >= *effective {
            plate = new.to_string();
        }
    }
    plate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::season::{Address, Holder, PaymentMode, Season, SeasonStatus, Vehicle, VehicleClass};
    use chrono::Utc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_season(season_no: &str, plate: &str, from: NaiveDate, to: NaiveDate) -> Season {
        let now = Utc::now();
        Season {
            season_no: season_no.into(),
            carpark_id: "CP001".into(),
            vehicle: Vehicle::new(plate, "1234567890", VehicleClass::Car),
            holder: Holder {
                name: "Alex Rivera".into(),
                company: None,
                contact_no: "91234567".into(),
                email: None,
                address: Address::default(),
            },
            monthly_rate: 120.0,
            payment_mode: PaymentMode::Cash,
            dda_reference: None,
            valid_from: from,
            valid_to: to,
            status: SeasonStatus::Active,
            initial_amount: 120.0,
            deposit: 0.0,
            admin_charge: 0.0,
            total_amount: 120.0,
            refund_amount: None,
            history: Vec::new(),
            created_by: "tester".into(),
            created_at: now,
            updated_by: "tester".into(),
            updated_at: now,
        }
    }

    #[test]
    fn insert_rejects_duplicate_season_no() {
        let store = SeasonStore::new(EngineConfig::default());
        let from = date(2026, 1, 1);
        let to = date(2026, 1, 31);
        store.insert(sample_season("SN-1", "SGA1234A", from, to)).unwrap();
        let err = store
            .insert(sample_season("SN-1", "SGB9999Z", from, to))
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateSeason(_)));
    }

    #[test]
    fn insert_rejects_overlapping_active_window_for_same_plate() {
        let store = SeasonStore::new(EngineConfig::default());
        store
            .insert(sample_season("SN-1", "SGA1234A", date(2026, 1, 1), date(2026, 3, 31)))
            .unwrap();
        let err = store
            .insert(sample_season("SN-2", "sga1234a", date(2026, 3, 1), date(2026, 5, 31)))
            .unwrap_err();
        assert!(matches!(err, EngineError::OverlappingWindow { .. }));

        // Disjoint window on the same plate is fine.
        store
            .insert(sample_season("SN-3", "SGA1234A", date(2026, 4, 1), date(2026, 4, 30)))
            .unwrap();
    }

    #[test]
    fn checkout_is_exclusive_per_season() {
        let store = SeasonStore::new(EngineConfig::default());
        store
            .insert(sample_season("SN-1", "SGA1234A", date(2026, 1, 1), date(2026, 1, 31)))
            .unwrap();
        store
            .insert(sample_season("SN-2", "SGB5678B", date(2026, 1, 1), date(2026, 1, 31)))
            .unwrap();

        let ticket = store.checkout("SN-1").unwrap();
        let err = store.checkout("SN-1").unwrap_err();
        assert!(matches!(err, EngineError::ConcurrentModification(_)));
        // A different season stays available.
        let other = store.checkout("SN-2").unwrap();
        drop(other);
        drop(ticket);
        // Dropping without commit releases the marker.
        store.checkout("SN-1").unwrap();
    }

    #[test]
    fn dropped_ticket_discards_changes() {
        let store = SeasonStore::new(EngineConfig::default());
        store
            .insert(sample_season("SN-1", "SGA1234A", date(2026, 1, 1), date(2026, 1, 31)))
            .unwrap();
        {
            let mut ticket = store.checkout("SN-1").unwrap();
            ticket.season_mut().monthly_rate = 999.0;
        }
        assert_eq!(store.get("SN-1").unwrap().monthly_rate, 120.0);
    }

    #[test]
    fn insert_allocates_sequential_numbers() {
        let store = SeasonStore::new(EngineConfig::default());
        let first = store
            .insert(sample_season("", "SGA1234A", date(2026, 1, 1), date(2026, 1, 31)))
            .unwrap();
        let second = store
            .insert(sample_season("", "SGB5678B", date(2026, 1, 1), date(2026, 1, 31)))
            .unwrap();
        assert_eq!(first.season_no, "SN-1000");
        assert_eq!(second.season_no, "SN-1001");
    }

    #[test]
    fn rejected_insert_does_not_consume_a_number() {
        let store = SeasonStore::new(EngineConfig::default());
        store
            .insert(sample_season("", "SGA1234A", date(2026, 1, 1), date(2026, 1, 31)))
            .unwrap();
        let err = store
            .insert(sample_season("", "SGA1234A", date(2026, 1, 15), date(2026, 2, 14)))
            .unwrap_err();
        assert!(matches!(err, EngineError::OverlappingWindow { .. }));
        let next = store
            .insert(sample_season("", "SGB5678B", date(2026, 1, 1), date(2026, 1, 31)))
            .unwrap();
        assert_eq!(next.season_no, "SN-1001");
    }

    #[test]
    fn commit_checked_catches_a_season_inserted_after_checkout() {
        let store = SeasonStore::new(EngineConfig::default());
        store
            .insert(sample_season("SN-1", "SGA1234A", date(2026, 1, 1), date(2026, 1, 31)))
            .unwrap();
        let mut ticket = store.checkout("SN-1").unwrap();

        // Lands while SN-1 is checked out; no overlap with its committed
        // January window, so the insert is accepted.
        store
            .insert(sample_season("SN-2", "SGA1234A", date(2026, 2, 1), date(2026, 2, 28)))
            .unwrap();

        ticket.season_mut().valid_from = date(2026, 2, 1);
        ticket.season_mut().valid_to = date(2026, 2, 28);
        let err = ticket
            .commit_checked(date(2026, 2, 1), date(2026, 2, 28))
            .unwrap_err();
        assert!(matches!(err, EngineError::OverlappingWindow { .. }));

        // Nothing was written and the in-flight marker is gone.
        assert_eq!(store.get("SN-1").unwrap().valid_to, date(2026, 1, 31));
        store.checkout("SN-1").unwrap();
    }

    #[test]
    fn access_lookup_follows_current_plate() {
        let store = SeasonStore::new(EngineConfig::default());
        store
            .insert(sample_season("SN-1", "SGA1234A", date(2026, 1, 1), date(2026, 1, 31)))
            .unwrap();
        assert_eq!(
            store.vehicle_access_on("SGA1234A", date(2026, 1, 15)),
            Some("SN-1".into())
        );
        assert_eq!(store.vehicle_access_on("SGA1234A", date(2026, 2, 1)), None);
        assert_eq!(store.vehicle_access_on("SGZ0000X", date(2026, 1, 15)), None);
    }
}
