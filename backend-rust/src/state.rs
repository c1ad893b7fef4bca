use std::sync::Arc;

use chrono::{DateTime, Utc};
use seating_engine::{Arrangement, EngineConfig, Preferences, Table, TriggerLedger};
use serde::{Deserialize, Serialize};
use socketioxide::SocketIo;
use tokio::sync::Mutex;
use tracing::warn;

use crate::audit::AuditLogger;
use crate::config::AppConfig;
use crate::guests::GuestDirectory;
use crate::persistence::{save_snapshot, Snapshot};
use crate::realtime::Realtime;
use crate::store::PlanStore;

// ─── Plan Key ─────────────────────────────────────────────────────────────────

/// One plan per (event, owner).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlanKey {
    pub event_id: String,
    pub owner_id: String,
}

impl PlanKey {
    pub fn new(event_id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self { event_id: event_id.into(), owner_id: owner_id.into() }
    }
}

// ─── Layout ───────────────────────────────────────────────────────────────────

/// Canvas settings of the floor-plan editor. Stored and returned as-is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LayoutSettings {
    pub canvas_width: f64,
    pub canvas_height: f64,
    pub grid_size: f64,
    pub show_grid: bool,
    pub snap_to_grid: bool,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            canvas_width: 1200.0,
            canvas_height: 800.0,
            grid_size: 20.0,
            show_grid: true,
            snap_to_grid: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GeneratedBy {
    #[default]
    Manual,
    Ai,
}

// ─── Seating Plan ─────────────────────────────────────────────────────────────

/// The unit of persistence and versioning: tables, arrangement, preferences
/// and the sync ledger of one owner's plan for one event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeatingPlan {
    pub event_id: String,
    pub owner_id: String,
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub arrangement: Arrangement,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default)]
    pub layout_settings: LayoutSettings,
    #[serde(default)]
    pub generated_by: GeneratedBy,
    /// Bumped on every committed change to tables, arrangement or preferences
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub sync: TriggerLedger,
}

impl SeatingPlan {
    /// Empty plan returned for an event nobody has saved yet (version 0).
    pub fn shell(key: &PlanKey, config: &EngineConfig, now: DateTime<Utc>) -> Self {
        Self {
            event_id: key.event_id.clone(),
            owner_id: key.owner_id.clone(),
            tables: Vec::new(),
            arrangement: Arrangement::new(),
            preferences: Preferences {
                preferred_table_size: config.default_table_size,
                ..Preferences::default()
            },
            layout_settings: LayoutSettings::default(),
            generated_by: GeneratedBy::Manual,
            version: 0,
            created_at: now,
            updated_at: now,
            sync: TriggerLedger::default(),
        }
    }

    pub fn key(&self) -> PlanKey {
        PlanKey::new(self.event_id.clone(), self.owner_id.clone())
    }
}

// ─── Shared State ─────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<PlanStore>,
    pub guests: Arc<GuestDirectory>,
    pub audit: AuditLogger,
    pub realtime: Realtime,
    save_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(config: AppConfig, snapshot: Snapshot, audit: AuditLogger, io: SocketIo) -> Self {
        let store = PlanStore::from_plans(snapshot.plans, config.engine.trigger_history_limit);
        let guests = GuestDirectory::from_rosters(snapshot.guests);
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            guests: Arc::new(guests),
            audit,
            realtime: Realtime::new(io),
            save_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Write the current plans and rosters to the state file. Failures are
    /// logged; the in-memory state stays authoritative.
    pub async fn persist(&self) {
        let _guard = self.save_lock.lock().await;
        let snapshot = Snapshot {
            plans: self.store.snapshot().await,
            guests: self.guests.snapshot().await,
        };
        if let Err(e) = save_snapshot(&self.config.state_file, &snapshot).await {
            warn!("Failed to persist {}: {e:#}", self.config.state_file.display());
        }
    }
}
