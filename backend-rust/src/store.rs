//! # store
//!
//! In-memory home of every [`SeatingPlan`].
//!
//! Each plan sits behind its own `tokio::sync::Mutex`, the map of plans
//! behind a `RwLock`. Writers to different plans never contend; two writers
//! to the same plan serialize on its mutex, and the version check inside
//! the critical section rejects whichever one arrives with a stale version.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use seating_engine::{ChangeType, EngineConfig, RecordOutcome};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::state::{PlanKey, SeatingPlan};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("seating plan for event {event_id} not found")]
    NotFound { event_id: String },

    #[error("stale plan version: expected {expected}, current is {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    #[error("event {event_id} already has a seating plan")]
    AlreadyExists { event_id: String },
}

type Slot = Arc<Mutex<SeatingPlan>>;

#[derive(Default)]
pub struct PlanStore {
    plans: RwLock<HashMap<PlanKey, Slot>>,
}

impl PlanStore {
    /// Rebuild from persisted plans, enforcing the stored trigger cap.
    pub fn from_plans(plans: Vec<SeatingPlan>, history_limit: usize) -> Self {
        let map = plans
            .into_iter()
            .map(|mut plan| {
                plan.sync.clamp_history(history_limit);
                (plan.key(), Arc::new(Mutex::new(plan)))
            })
            .collect();
        Self { plans: RwLock::new(map) }
    }

    async fn slot(&self, key: &PlanKey) -> Option<Slot> {
        self.plans.read().await.get(key).cloned()
    }

    pub async fn get(&self, key: &PlanKey) -> Option<SeatingPlan> {
        let slot = self.slot(key).await?;
        let plan = slot.lock().await;
        Some(plan.clone())
    }

    /// Apply `change` to the plan, creating an empty one first if needed.
    ///
    /// With `expected_version` set, the change only lands if the stored
    /// version still matches. A committed change bumps the version. A new
    /// plan is only inserted once its first change has been accepted.
    pub async fn commit<F>(
        &self,
        key: &PlanKey,
        expected_version: Option<u64>,
        config: &EngineConfig,
        change: F,
    ) -> Result<SeatingPlan, StoreError>
    where
        F: FnOnce(&mut SeatingPlan),
    {
        let slot = match self.slot(key).await {
            Some(slot) => slot,
            None => {
                let mut plans = self.plans.write().await;
                match plans.get(key) {
                    Some(slot) => slot.clone(),
                    None => {
                        let mut plan = SeatingPlan::shell(key, config, Utc::now());
                        apply_change(key, &mut plan, expected_version, change)?;
                        plans.insert(key.clone(), Arc::new(Mutex::new(plan.clone())));
                        return Ok(plan);
                    }
                }
            }
        };

        let mut plan = slot.lock().await;
        apply_change(key, &mut plan, expected_version, change)?;
        Ok(plan.clone())
    }

    /// Change an existing plan without touching its version (ledger upkeep).
    pub async fn update<F, R>(&self, key: &PlanKey, change: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut SeatingPlan) -> R,
    {
        let slot = self
            .slot(key)
            .await
            .ok_or_else(|| StoreError::NotFound { event_id: key.event_id.clone() })?;
        let mut plan = slot.lock().await;
        Ok(change(&mut plan))
    }

    /// Insert a brand-new plan; fails if the key is taken.
    pub async fn insert_new(&self, plan: SeatingPlan) -> Result<SeatingPlan, StoreError> {
        let mut plans = self.plans.write().await;
        let key = plan.key();
        if plans.contains_key(&key) {
            return Err(StoreError::AlreadyExists { event_id: key.event_id });
        }
        plans.insert(key, Arc::new(Mutex::new(plan.clone())));
        Ok(plan)
    }

    pub async fn remove(&self, key: &PlanKey) -> Result<SeatingPlan, StoreError> {
        let slot = self
            .plans
            .write()
            .await
            .remove(key)
            .ok_or_else(|| StoreError::NotFound { event_id: key.event_id.clone() })?;
        let plan = slot.lock().await;
        Ok(plan.clone())
    }

    /// Record a guest-list change on every plan of the event. Each plan is
    /// checked, appended to and trimmed under its own lock. Events without
    /// plans are a no-op.
    pub async fn record_trigger(
        &self,
        event_id: &str,
        change_type: ChangeType,
        change_data: &serde_json::Value,
        now: DateTime<Utc>,
        config: &EngineConfig,
    ) -> Vec<(String, RecordOutcome)> {
        let slots: Vec<Slot> = {
            let plans = self.plans.read().await;
            plans
                .iter()
                .filter(|(key, _)| key.event_id == event_id)
                .map(|(_, slot)| slot.clone())
                .collect()
        };

        let mut outcomes = Vec::with_capacity(slots.len());
        for slot in slots {
            let mut plan = slot.lock().await;
            let outcome = plan.sync.record(change_type, change_data.clone(), now, config);
            outcomes.push((plan.owner_id.clone(), outcome));
        }
        outcomes
    }

    /// Clone of every plan, ordered by key so snapshots are stable.
    pub async fn snapshot(&self) -> Vec<SeatingPlan> {
        let slots: Vec<(PlanKey, Slot)> = {
            let plans = self.plans.read().await;
            plans.iter().map(|(k, s)| (k.clone(), s.clone())).collect()
        };
        let mut out = Vec::with_capacity(slots.len());
        for (key, slot) in slots {
            out.push((key, slot.lock().await.clone()));
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out.into_iter().map(|(_, plan)| plan).collect()
    }
}

fn apply_change<F>(
    key: &PlanKey,
    plan: &mut SeatingPlan,
    expected_version: Option<u64>,
    change: F,
) -> Result<(), StoreError>
where
    F: FnOnce(&mut SeatingPlan),
{
    if let Some(expected) = expected_version {
        if plan.version != expected {
            return Err(StoreError::VersionConflict { expected, actual: plan.version });
        }
    }
    change(plan);
    plan.version += 1;
    plan.updated_at = Utc::now();
    debug!("Committed plan {}/{} at v{}", key.event_id, key.owner_id, plan.version);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key() -> PlanKey {
        PlanKey::new("ev-1", "owner-1")
    }

    #[tokio::test]
    async fn commit_creates_and_bumps_version() {
        let store = PlanStore::default();
        let cfg = EngineConfig::default();
        assert!(store.get(&key()).await.is_none());

        let plan = store.commit(&key(), None, &cfg, |_| {}).await.unwrap();
        assert_eq!(plan.version, 1);
        let plan = store.commit(&key(), Some(1), &cfg, |_| {}).await.unwrap();
        assert_eq!(plan.version, 2);
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let store = PlanStore::default();
        let cfg = EngineConfig::default();
        store.commit(&key(), None, &cfg, |_| {}).await.unwrap();

        let err = store
            .commit(&key(), Some(0), &cfg, |p| p.tables.clear())
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::VersionConflict { expected: 0, actual: 1 });
        assert_eq!(store.get(&key()).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn concurrent_writers_with_same_version_one_wins() {
        let store = Arc::new(PlanStore::default());
        let cfg = EngineConfig::default();
        store.commit(&key(), None, &cfg, |_| {}).await.unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let cfg = cfg.clone();
                tokio::spawn(async move { store.commit(&key(), Some(1), &cfg, |_| {}).await })
            })
            .collect();
        let mut wins = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(store.get(&key()).await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn triggers_reach_every_plan_of_the_event() {
        let store = PlanStore::default();
        let cfg = EngineConfig::default();
        store.commit(&PlanKey::new("ev-1", "a"), None, &cfg, |_| {}).await.unwrap();
        store.commit(&PlanKey::new("ev-1", "b"), None, &cfg, |_| {}).await.unwrap();
        store.commit(&PlanKey::new("ev-2", "a"), None, &cfg, |_| {}).await.unwrap();

        let data = json!({ "guestId": "g1" });
        let now = Utc::now();
        let outcomes = store.record_trigger("ev-1", ChangeType::GuestAdded, &data, now, &cfg).await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|(_, o)| *o == RecordOutcome::Recorded));

        let again = store.record_trigger("ev-1", ChangeType::GuestAdded, &data, now, &cfg).await;
        assert!(again.iter().all(|(_, o)| *o == RecordOutcome::Suppressed));

        let untouched = store.get(&PlanKey::new("ev-2", "a")).await.unwrap();
        assert!(untouched.sync.is_empty());
        assert!(store.record_trigger("nope", ChangeType::GuestAdded, &data, now, &cfg).await.is_empty());
    }

    #[tokio::test]
    async fn rejected_first_commit_leaves_no_plan_behind() {
        let store = PlanStore::default();
        let cfg = EngineConfig::default();

        let err = store
            .commit(&key(), Some(7), &cfg, |p| p.tables.clear())
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::VersionConflict { expected: 7, actual: 0 });
        assert!(store.get(&key()).await.is_none());
        assert!(store.snapshot().await.is_empty());

        let data = json!({ "guestId": "g1" });
        let outcomes = store
            .record_trigger("ev-1", ChangeType::GuestAdded, &data, Utc::now(), &cfg)
            .await;
        assert!(outcomes.is_empty());

        let plan = SeatingPlan::shell(&key(), &cfg, Utc::now());
        assert!(store.insert_new(plan).await.is_ok());
    }

    #[tokio::test]
    async fn first_commit_against_version_zero_creates_plan() {
        let store = PlanStore::default();
        let cfg = EngineConfig::default();
        let plan = store.commit(&key(), Some(0), &cfg, |_| {}).await.unwrap();
        assert_eq!(plan.version, 1);
        assert_eq!(store.get(&key()).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn concurrent_triggers_do_not_overwrite_each_other() {
        let store = Arc::new(PlanStore::default());
        let cfg = EngineConfig::default();
        store.commit(&key(), None, &cfg, |_| {}).await.unwrap();

        let writers = 16;
        let tasks: Vec<_> = (0..writers)
            .map(|i| {
                let store = store.clone();
                let cfg = cfg.clone();
                tokio::spawn(async move {
                    let data = json!({ "guestId": format!("g{i}") });
                    store
                        .record_trigger("ev-1", ChangeType::GuestAdded, &data, Utc::now(), &cfg)
                        .await
                })
            })
            .collect();
        for task in tasks {
            let outcomes = task.await.unwrap();
            assert_eq!(outcomes, vec![("owner-1".to_string(), RecordOutcome::Recorded)]);
        }

        let plan = store.get(&key()).await.unwrap();
        let expected = writers.min(cfg.trigger_capacity);
        assert_eq!(plan.sync.pending().len(), expected);
        let distinct: std::collections::HashSet<_> =
            plan.sync.pending().iter().map(|t| t.change_data["guestId"].to_string()).collect();
        assert_eq!(distinct.len(), expected);
    }

    #[tokio::test]
    async fn insert_new_refuses_existing_key() {
        let store = PlanStore::default();
        let cfg = EngineConfig::default();
        let plan = SeatingPlan::shell(&key(), &cfg, Utc::now());
        store.insert_new(plan.clone()).await.unwrap();
        assert!(matches!(
            store.insert_new(plan).await,
            Err(StoreError::AlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn remove_missing_plan_is_not_found() {
        let store = PlanStore::default();
        assert!(matches!(store.remove(&key()).await, Err(StoreError::NotFound { .. })));
    }
}
