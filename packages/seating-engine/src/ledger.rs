//! # ledger
//!
//! Sync trigger ledger: a short, bounded history of "the guest list changed"
//! signals attached to a seating plan.
//!
//! A trigger only says that re-generation *may* be warranted. Nothing here
//! touches tables or arrangements; acting on a trigger is an explicit call
//! by whoever reads the pending list.
//!
//! ## Rules
//! - identical (change type, payload) pairs inside the debounce window
//!   collapse into one unprocessed entry
//! - the recording path keeps the newest `trigger_capacity` entries
//! - entries are acknowledged by timestamp, never deleted one by one

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::EngineConfig;

// ── Ring buffer ───────────────────────────────────────────────────────────────

const DEFAULT_RING_CAPACITY: usize = 10;

/// Fixed-capacity FIFO; pushing onto a full buffer evicts the oldest item.
/// Serialized as a plain sequence, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { items: VecDeque::with_capacity(capacity), capacity }
    }

    /// Append, returning the evicted item if the buffer was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Change the capacity, dropping the oldest items that no longer fit.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.items.len() > self.capacity {
            self.items.pop_front();
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items.iter_mut()
    }
}

impl<T> Default for RingBuffer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_RING_CAPACITY)
    }
}

impl<T: Serialize> Serialize for RingBuffer<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.items)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for RingBuffer<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let items = Vec::<T>::deserialize(deserializer)?;
        let capacity = items.len().max(DEFAULT_RING_CAPACITY);
        Ok(Self { items: items.into(), capacity })
    }
}

// ── Trigger types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    GuestAdded,
    GuestDeleted,
    GuestUpdated,
    RsvpUpdated,
    /// RSVP submitted through the public invitation link
    RsvpUpdatedPublic,
    BulkGuestsAdded,
    StatusConfirmed,
    StatusUnconfirmed,
    AttendingCountChanged,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = serde_json::to_string(self).unwrap_or_default();
        write!(f, "{}", s.trim_matches('"'))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncTrigger {
    pub timestamp: DateTime<Utc>,
    pub change_type: ChangeType,
    #[serde(default)]
    pub change_data: serde_json::Value,
    #[serde(default)]
    pub processed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordOutcome {
    Recorded,
    /// Identical unprocessed trigger already inside the debounce window
    Suppressed,
}

// ── Ledger ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerLedger {
    #[serde(default)]
    triggers: RingBuffer<SyncTrigger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_sync_trigger: Option<DateTime<Utc>>,
}

impl TriggerLedger {
    pub fn record(
        &mut self,
        change_type: ChangeType,
        change_data: serde_json::Value,
        now: DateTime<Utc>,
        config: &EngineConfig,
    ) -> RecordOutcome {
        let window_start = now - config.trigger_window();
        let duplicate = self.triggers.iter().any(|t| {
            !t.processed
                && t.timestamp >= window_start
                && t.change_type == change_type
                && t.change_data == change_data
        });
        if duplicate {
            return RecordOutcome::Suppressed;
        }

        self.triggers.set_capacity(config.trigger_capacity);
        self.triggers.push(SyncTrigger {
            timestamp: now,
            change_type,
            change_data,
            processed: false,
            processed_at: None,
            result: None,
        });
        self.last_sync_trigger = Some(now);
        RecordOutcome::Recorded
    }

    pub fn pending(&self) -> Vec<&SyncTrigger> {
        self.triggers.iter().filter(|t| !t.processed).collect()
    }

    /// Acknowledge unprocessed triggers whose timestamp is listed. Returns
    /// how many flipped.
    pub fn mark_processed(
        &mut self,
        timestamps: &[DateTime<Utc>],
        now: DateTime<Utc>,
        result: Option<&str>,
    ) -> usize {
        let mut marked = 0;
        for trigger in self.triggers.iter_mut() {
            if trigger.processed || !timestamps.contains(&trigger.timestamp) {
                continue;
            }
            trigger.processed = true;
            trigger.processed_at = Some(now);
            trigger.result = result.map(String::from);
            marked += 1;
        }
        marked
    }

    /// Enforce the stored-plan cap after loading from disk.
    pub fn clamp_history(&mut self, limit: usize) {
        if self.triggers.len() > limit {
            self.triggers.set_capacity(limit);
        }
    }

    pub fn triggers(&self) -> impl Iterator<Item = &SyncTrigger> {
        self.triggers.iter()
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    pub fn last_sync_trigger(&self) -> Option<DateTime<Utc>> {
        self.last_sync_trigger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn ring_buffer_evicts_oldest() {
        let mut ring = RingBuffer::new(2);
        assert_eq!(ring.push(1), None);
        assert_eq!(ring.push(2), None);
        assert_eq!(ring.push(3), Some(1));
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![2, 3]);
        ring.set_capacity(1);
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn identical_trigger_within_window_is_suppressed() {
        let cfg = EngineConfig::default();
        let mut ledger = TriggerLedger::default();
        let data = json!({"guestId": "g1"});

        assert_eq!(ledger.record(ChangeType::GuestAdded, data.clone(), t0(), &cfg), RecordOutcome::Recorded);
        assert_eq!(
            ledger.record(ChangeType::GuestAdded, data.clone(), t0() + Duration::seconds(10), &cfg),
            RecordOutcome::Suppressed
        );
        assert_eq!(ledger.pending().len(), 1);

        ledger.record(ChangeType::GuestDeleted, data, t0() + Duration::seconds(11), &cfg);
        assert_eq!(ledger.pending().len(), 2);
        assert_eq!(ledger.last_sync_trigger(), Some(t0() + Duration::seconds(11)));
    }

    #[test]
    fn identical_trigger_after_window_is_recorded() {
        let cfg = EngineConfig::default();
        let mut ledger = TriggerLedger::default();
        ledger.record(ChangeType::RsvpUpdated, json!(1), t0(), &cfg);
        ledger.record(ChangeType::RsvpUpdated, json!(1), t0() + Duration::seconds(31), &cfg);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn processed_trigger_does_not_suppress() {
        let cfg = EngineConfig::default();
        let mut ledger = TriggerLedger::default();
        ledger.record(ChangeType::GuestUpdated, json!("x"), t0(), &cfg);
        assert_eq!(ledger.mark_processed(&[t0()], t0() + Duration::seconds(1), Some("regenerated")), 1);
        assert!(ledger.pending().is_empty());

        let outcome = ledger.record(ChangeType::GuestUpdated, json!("x"), t0() + Duration::seconds(2), &cfg);
        assert_eq!(outcome, RecordOutcome::Recorded);
        let first = ledger.triggers().next().unwrap();
        assert_eq!(first.result.as_deref(), Some("regenerated"));
        assert_eq!(first.processed_at, Some(t0() + Duration::seconds(1)));
    }

    #[test]
    fn recording_keeps_only_newest_entries() {
        let cfg = EngineConfig::default();
        let mut ledger = TriggerLedger::default();
        for i in 0..15 {
            ledger.record(ChangeType::GuestAdded, json!({ "n": i }), t0() + Duration::seconds(i), &cfg);
        }
        assert_eq!(ledger.len(), 10);
        assert_eq!(ledger.triggers().next().unwrap().change_data, json!({ "n": 5 }));
    }

    #[test]
    fn stored_history_is_clamped_then_trimmed_on_record() {
        let cfg = EngineConfig::default();
        let entries: Vec<_> = (0..25)
            .map(|i| json!({
                "timestamp": t0() + Duration::seconds(i),
                "changeType": "bulk_guests_added",
                "changeData": i,
                "processed": true
            }))
            .collect();
        let mut ledger: TriggerLedger =
            serde_json::from_value(json!({ "triggers": entries })).unwrap();
        assert_eq!(ledger.len(), 25);

        ledger.clamp_history(cfg.trigger_history_limit);
        assert_eq!(ledger.len(), 20);

        ledger.record(ChangeType::StatusConfirmed, json!(null), t0() + Duration::minutes(5), &cfg);
        assert_eq!(ledger.len(), 10);
        assert_eq!(ledger.pending().len(), 1);
    }

    #[test]
    fn change_type_displays_wire_name() {
        assert_eq!(ChangeType::RsvpUpdatedPublic.to_string(), "rsvp_updated_public");
    }
}
