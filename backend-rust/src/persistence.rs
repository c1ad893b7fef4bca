use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use seating_engine::Guest;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};

use crate::state::SeatingPlan;

/// Everything the service keeps across restarts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub plans: Vec<SeatingPlan>,
    /// Event id → guest roster
    #[serde(default)]
    pub guests: BTreeMap<String, Vec<Guest>>,
}

/// Load the snapshot from disk. Returns an empty one if the file is missing
/// or corrupt.
pub async fn load_snapshot(path: &Path) -> Snapshot {
    if !path.exists() {
        info!("No {} found, starting with an empty store", path.display());
        return Snapshot::default();
    }

    match fs::read_to_string(path).await {
        Ok(data) => match serde_json::from_str::<Snapshot>(&data) {
            Ok(snapshot) => {
                info!(
                    "Loaded state from disk ({} plan(s), {} guest roster(s))",
                    snapshot.plans.len(),
                    snapshot.guests.len()
                );
                snapshot
            }
            Err(e) => {
                warn!("Failed to parse {}: {e}, starting empty", path.display());
                Snapshot::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {}: {e}, starting empty", path.display());
            Snapshot::default()
        }
    }
}

/// Write the snapshot next to its final location, then move it into place
/// so a crash mid-write never leaves a truncated file.
pub async fn save_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::PlanKey;
    use chrono::Utc;
    use seating_engine::{EngineConfig, GuestStatus};

    #[tokio::test]
    async fn missing_file_gives_empty_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = load_snapshot(&dir.path().join("nope.json")).await;
        assert!(snapshot.plans.is_empty());
        assert!(snapshot.guests.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_gives_empty_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_snapshot(&path).await.plans.is_empty());
    }

    #[tokio::test]
    async fn save_then_load_keeps_plans_and_guests() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut snapshot = Snapshot::default();
        snapshot.plans.push(SeatingPlan::shell(&PlanKey::new("ev", "u"), &EngineConfig::default(), Utc::now()));
        snapshot.guests.insert(
            "ev".into(),
            vec![Guest {
                id: "g1".into(),
                name: "Ada".into(),
                attending_count: 2,
                group: "family".into(),
                status: GuestStatus::Confirmed,
            }],
        );
        save_snapshot(&path, &snapshot).await.unwrap();

        let loaded = load_snapshot(&path).await;
        assert_eq!(loaded.plans, snapshot.plans);
        assert_eq!(loaded.guests["ev"][0].attending_count, 2);
        assert!(!path.with_extension("json.tmp").exists());
    }
}
