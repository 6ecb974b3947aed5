//! The append-only event log.
//!
//! Events are partitioned by simulation year. A partition is appended
//! atomically: [`EventLog::append_year`] validates the whole batch before
//! anything is stored, so a rejected batch leaves the log untouched.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Datelike;
use sha2::{Digest, Sha256};

use workforce_types::{EmployeeId, Event, EventDraft, EventId, EventKind};

use crate::EventLogError;
use crate::digest::{canonical_digest, sha256_hex};

// ---------------------------------------------------------------------------
// Identifier and sequence assignment
// ---------------------------------------------------------------------------

/// Derive the identifier of an event from its position in the log.
///
/// The identifier is the first 16 bytes of SHA-256 over the length-prefixed
/// tuple (year, sequence, kind tag, employee id).
pub fn event_id_for(
    year: i32,
    sequence: u64,
    kind: EventKind,
    employee_id: &EmployeeId,
) -> EventId {
    let mut hasher = Sha256::new();
    hasher.update(b"workforce-event");
    hasher.update(year.to_be_bytes());
    hasher.update(sequence.to_be_bytes());
    for part in [kind.tag(), employee_id.as_str()] {
        hasher.update(u64::try_from(part.len()).unwrap_or(u64::MAX).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    let digest: [u8; 32] = hasher.finalize().into();
    let prefix = digest.first_chunk::<16>().copied().unwrap_or_default();
    EventId::from_hash_prefix(prefix)
}

/// Turn drafts (already in causal order) into events numbered 1, 2, 3, ...
pub fn assign_sequence(year: i32, drafts: Vec<EventDraft>) -> Vec<Event> {
    (1_u64..)
        .zip(drafts)
        .map(|(sequence, draft)| {
            let event_id = event_id_for(year, sequence, draft.kind(), &draft.employee_id);
            Event::from_draft(draft, year, sequence, event_id)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// EventLog
// ---------------------------------------------------------------------------

/// Append-only store of every event generated during a run.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    /// Sealed partitions keyed by simulation year.
    partitions: BTreeMap<i32, Vec<Event>>,
    /// Every identifier present in any partition.
    event_ids: BTreeSet<EventId>,
}

impl EventLog {
    /// Create an empty log.
    pub const fn new() -> Self {
        Self {
            partitions: BTreeMap::new(),
            event_ids: BTreeSet::new(),
        }
    }

    /// Latest sealed year, if any partition exists.
    pub fn latest_year(&self) -> Option<i32> {
        self.partitions.keys().next_back().copied()
    }

    /// Whether `year` has been sealed.
    pub fn is_sealed(&self, year: i32) -> bool {
        self.partitions.contains_key(&year)
    }

    /// Sealed years in ascending order.
    pub fn sealed_years(&self) -> impl Iterator<Item = i32> + '_ {
        self.partitions.keys().copied()
    }

    /// Total number of events across all partitions.
    pub fn len(&self) -> usize {
        self.event_ids.len()
    }

    /// Whether the log holds no events.
    pub fn is_empty(&self) -> bool {
        self.event_ids.is_empty()
    }

    /// Check that `events` could be appended as partition `year`.
    pub fn validate_append(&self, year: i32, events: &[Event]) -> Result<(), EventLogError> {
        if let Some(sealed_through) = self.latest_year().filter(|latest| year <= *latest) {
            return Err(EventLogError::PartitionSealed {
                year,
                sealed_through,
            });
        }

        let mut batch_ids = BTreeSet::new();
        for (expected, event) in (1_u64..).zip(events) {
            if event.simulation_year != year {
                return Err(EventLogError::WrongPartition {
                    year,
                    event_year: event.simulation_year,
                    sequence: event.sequence,
                });
            }
            if event.effective_date.year() != year {
                return Err(EventLogError::OutOfYear {
                    year,
                    employee_id: event.employee_id.clone(),
                    effective_date: event.effective_date,
                });
            }
            if event.sequence != expected {
                return Err(EventLogError::NonContiguousSequence {
                    year,
                    expected,
                    found: event.sequence,
                });
            }
            if self.event_ids.contains(&event.event_id) || !batch_ids.insert(event.event_id) {
                return Err(EventLogError::DuplicateEventId {
                    year,
                    event_id: event.event_id,
                });
            }
        }
        Ok(())
    }

    /// Validate and seal partition `year`. Returns the number of events stored.
    pub fn append_year(&mut self, year: i32, events: Vec<Event>) -> Result<usize, EventLogError> {
        self.validate_append(year, &events)?;
        let count = events.len();
        self.event_ids.extend(events.iter().map(|e| e.event_id));
        self.partitions.insert(year, events);
        tracing::debug!(year, events = count, "event partition sealed");
        Ok(count)
    }

    /// All events of `year` in sequence order (empty if the year is unsealed).
    pub fn events_for_year(&self, year: i32) -> &[Event] {
        self.partitions.get(&year).map_or(&[][..], Vec::as_slice)
    }

    /// Events of one entity in `year`, in sequence order.
    pub fn events_for_entity<'a>(
        &'a self,
        employee_id: &'a EmployeeId,
        year: i32,
    ) -> impl Iterator<Item = &'a Event> + 'a {
        self.events_for_year(year)
            .iter()
            .filter(move |e| &e.employee_id == employee_id)
    }

    /// All events up to and including `year`, in (year, sequence) order.
    pub fn events_through(&self, year: i32) -> impl Iterator<Item = &Event> + '_ {
        self.partitions
            .range(..=year)
            .flat_map(|(_, events)| events.iter())
    }

    /// Event count per kind for `year`.
    pub fn counts_for_year(&self, year: i32) -> BTreeMap<EventKind, u32> {
        let mut counts = BTreeMap::new();
        for event in self.events_for_year(year) {
            let count: &mut u32 = counts.entry(event.kind).or_insert(0);
            *count = count.saturating_add(1);
        }
        counts
    }

    /// Digest of one partition, or `None` if the year is unsealed.
    pub fn partition_digest(&self, year: i32) -> Result<Option<String>, EventLogError> {
        self.partitions
            .get(&year)
            .map(|events| canonical_digest(events.as_slice()))
            .transpose()
            .map_err(|e| EventLogError::Serialization {
                message: e.to_string(),
            })
    }

    /// Digest of the whole log: hash over the ordered partition digests.
    pub fn digest(&self) -> Result<String, EventLogError> {
        let mut combined = String::new();
        for (year, events) in &self.partitions {
            let partition = canonical_digest(events).map_err(|e| EventLogError::Serialization {
                message: e.to_string(),
            })?;
            combined.push_str(&year.to_string());
            combined.push(':');
            combined.push_str(&partition);
            combined.push('\n');
        }
        Ok(sha256_hex(combined.as_bytes()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use workforce_types::EventPayload;

    use super::*;

    fn termination(id: &str, year: i32) -> EventDraft {
        EventDraft {
            employee_id: EmployeeId::new(id),
            effective_date: NaiveDate::from_ymd_opt(year, 5, 1).unwrap(),
            payload: EventPayload::Termination {
                compensation: Decimal::new(60_000, 0),
            },
        }
    }

    fn year_events(year: i32, ids: &[&str]) -> Vec<Event> {
        assign_sequence(year, ids.iter().map(|id| termination(id, year)).collect())
    }

    #[test]
    fn sequence_starts_at_one_and_is_contiguous() {
        let events = year_events(2025, &["A", "B", "C"]);
        let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[test]
    fn event_ids_are_reproducible() {
        let a = year_events(2025, &["A", "B"]);
        let b = year_events(2025, &["A", "B"]);
        assert_eq!(a, b);
        assert_ne!(a.first().unwrap().event_id, a.get(1).unwrap().event_id);
    }

    #[test]
    fn append_seals_partition() {
        let mut log = EventLog::new();
        assert_eq!(log.append_year(2025, year_events(2025, &["A"])).unwrap(), 1);
        assert!(log.is_sealed(2025));

        let again = log.append_year(2025, year_events(2025, &["B"]));
        assert!(matches!(again, Err(EventLogError::PartitionSealed { .. })));

        let earlier = log.append_year(2024, year_events(2024, &["B"]));
        assert!(matches!(earlier, Err(EventLogError::PartitionSealed { .. })));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn empty_partition_is_sealed() {
        let mut log = EventLog::new();
        log.append_year(2025, Vec::new()).unwrap();
        assert!(log.is_sealed(2025));
        assert!(log.events_for_year(2025).is_empty());
    }

    #[test]
    fn rejects_out_of_year_effective_date() {
        let mut events = year_events(2025, &["A"]);
        events.first_mut().unwrap().effective_date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let mut log = EventLog::new();
        let result = log.append_year(2025, events);
        assert!(matches!(result, Err(EventLogError::OutOfYear { .. })));
        assert!(log.is_empty());
    }

    #[test]
    fn rejects_gap_in_sequence() {
        let mut events = year_events(2025, &["A", "B"]);
        events.get_mut(1).unwrap().sequence = 5;
        let result = EventLog::new().validate_append(2025, &events);
        assert!(matches!(
            result,
            Err(EventLogError::NonContiguousSequence {
                expected: 2,
                found: 5,
                ..
            })
        ));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let mut events = year_events(2025, &["A", "B"]);
        let first_id = events.first().unwrap().event_id;
        events.get_mut(1).unwrap().event_id = first_id;
        let result = EventLog::new().validate_append(2025, &events);
        assert!(matches!(result, Err(EventLogError::DuplicateEventId { .. })));
    }

    #[test]
    fn rejects_event_from_other_year() {
        let events = year_events(2024, &["A"]);
        let result = EventLog::new().validate_append(2025, &events);
        assert!(matches!(result, Err(EventLogError::WrongPartition { .. })));
    }

    #[test]
    fn queries_by_entity_and_through_year() {
        let mut log = EventLog::new();
        log.append_year(2025, year_events(2025, &["A", "B"])).unwrap();
        log.append_year(2026, year_events(2026, &["C"])).unwrap();

        let id = EmployeeId::new("B");
        assert_eq!(log.events_for_entity(&id, 2025).count(), 1);
        assert_eq!(log.events_for_entity(&id, 2026).count(), 0);
        assert_eq!(log.events_through(2025).count(), 2);
        assert_eq!(log.events_through(2026).count(), 3);
        assert_eq!(log.latest_year(), Some(2026));
        assert_eq!(
            log.counts_for_year(2025).get(&EventKind::Termination),
            Some(&2)
        );
    }

    #[test]
    fn digest_depends_on_content() {
        let mut a = EventLog::new();
        a.append_year(2025, year_events(2025, &["A", "B"])).unwrap();
        let mut b = EventLog::new();
        b.append_year(2025, year_events(2025, &["A", "B"])).unwrap();
        let mut c = EventLog::new();
        c.append_year(2025, year_events(2025, &["B", "A"])).unwrap();

        assert_eq!(a.digest().unwrap(), b.digest().unwrap());
        assert_ne!(a.digest().unwrap(), c.digest().unwrap());
        assert!(a.partition_digest(2030).unwrap().is_none());
    }
}
