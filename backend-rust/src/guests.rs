//! Guest Source: per-event guest rosters.
//!
//! The seating side only ever reads these. Every mutation reports which
//! [`ChangeType`]s it amounts to so the caller can record sync triggers.

use std::collections::{BTreeMap, HashMap};

use seating_engine::{ChangeType, Guest, GuestStatus};
use serde::Deserialize;
use tokio::sync::RwLock;
use uuid::Uuid;

// ─── Input ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub attending_count: Option<u32>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub status: GuestStatus,
}

impl GuestInput {
    /// Problems with this input, empty when it is acceptable.
    pub fn problems(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.name.trim().is_empty() {
            out.push("Guest name is required".to_string());
        }
        if self.status == GuestStatus::Confirmed && self.attending_count == Some(0) {
            out.push(format!("Confirmed guest \"{}\" must bring at least 1 person", self.name));
        }
        out
    }

    fn into_guest(self, id: String) -> Guest {
        Guest {
            id,
            name: self.name.trim().to_string(),
            attending_count: self.attending_count.unwrap_or(1),
            group: self.group.unwrap_or_else(|| "other".to_string()),
            status: self.status,
        }
    }
}

/// RSVP answer for an existing guest.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RsvpUpdate {
    pub status: GuestStatus,
    #[serde(default)]
    pub attending_count: Option<u32>,
    /// Submitted through the public invitation link rather than by the planner
    #[serde(default)]
    pub via_public_link: bool,
}

// ─── Change Detection ─────────────────────────────────────────────────────────

/// Seating-relevant differences between two versions of a guest, in
/// addition to `primary`.
pub fn describe_changes(before: &Guest, after: &Guest, primary: ChangeType) -> Vec<ChangeType> {
    let mut changes = vec![primary];
    match (before.is_confirmed(), after.is_confirmed()) {
        (false, true) => changes.push(ChangeType::StatusConfirmed),
        (true, false) => changes.push(ChangeType::StatusUnconfirmed),
        _ => {}
    }
    if before.attending_count != after.attending_count {
        changes.push(ChangeType::AttendingCountChanged);
    }
    changes
}

// ─── Directory ────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct GuestDirectory {
    rosters: RwLock<HashMap<String, Vec<Guest>>>,
}

impl GuestDirectory {
    pub fn from_rosters(rosters: BTreeMap<String, Vec<Guest>>) -> Self {
        Self { rosters: RwLock::new(rosters.into_iter().collect()) }
    }

    pub async fn list(&self, event_id: &str) -> Vec<Guest> {
        self.rosters.read().await.get(event_id).cloned().unwrap_or_default()
    }

    /// Add guests, generating ids where missing. Returns `None` if any id
    /// already exists in the roster (nothing is added in that case).
    pub async fn add(&self, event_id: &str, inputs: Vec<GuestInput>) -> Option<Vec<Guest>> {
        let mut rosters = self.rosters.write().await;
        let roster = rosters.entry(event_id.to_string()).or_default();

        let guests: Vec<Guest> = inputs
            .into_iter()
            .map(|input| {
                let id = input.id.clone().unwrap_or_else(|| format!("guest-{}", Uuid::new_v4()));
                input.into_guest(id)
            })
            .collect();
        let mut ids: Vec<&str> = roster.iter().map(|g| g.id.as_str()).collect();
        for guest in &guests {
            if ids.contains(&guest.id.as_str()) {
                return None;
            }
            ids.push(guest.id.as_str());
        }
        roster.extend(guests.iter().cloned());
        Some(guests)
    }

    /// Replace a guest's details. Returns (before, after).
    pub async fn replace(&self, event_id: &str, guest_id: &str, input: GuestInput) -> Option<(Guest, Guest)> {
        self.modify(event_id, guest_id, |guest| {
            *guest = input.into_guest(guest.id.clone());
        })
        .await
    }

    pub async fn apply_rsvp(&self, event_id: &str, guest_id: &str, rsvp: &RsvpUpdate) -> Option<(Guest, Guest)> {
        self.modify(event_id, guest_id, |guest| {
            guest.status = rsvp.status;
            if let Some(count) = rsvp.attending_count {
                guest.attending_count = count;
            }
        })
        .await
    }

    async fn modify(
        &self,
        event_id: &str,
        guest_id: &str,
        change: impl FnOnce(&mut Guest),
    ) -> Option<(Guest, Guest)> {
        let mut rosters = self.rosters.write().await;
        let guest = rosters.get_mut(event_id)?.iter_mut().find(|g| g.id == guest_id)?;
        let before = guest.clone();
        change(guest);
        Some((before, guest.clone()))
    }

    pub async fn remove(&self, event_id: &str, guest_id: &str) -> Option<Guest> {
        let mut rosters = self.rosters.write().await;
        let roster = rosters.get_mut(event_id)?;
        let idx = roster.iter().position(|g| g.id == guest_id)?;
        Some(roster.remove(idx))
    }

    pub async fn snapshot(&self) -> BTreeMap<String, Vec<Guest>> {
        self.rosters
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(id: &str, status: GuestStatus, count: u32) -> GuestInput {
        GuestInput {
            id: Some(id.into()),
            name: format!("Guest {id}"),
            attending_count: Some(count),
            group: Some("family".into()),
            status,
        }
    }

    #[tokio::test]
    async fn add_rejects_duplicate_ids_atomically() {
        let dir = GuestDirectory::default();
        dir.add("ev", vec![input("a", GuestStatus::Confirmed, 1)]).await.unwrap();
        let clash = dir
            .add("ev", vec![input("b", GuestStatus::Confirmed, 1), input("a", GuestStatus::Pending, 1)])
            .await;
        assert!(clash.is_none());
        assert_eq!(dir.list("ev").await.len(), 1);
    }

    #[tokio::test]
    async fn missing_fields_get_defaults() {
        let dir = GuestDirectory::default();
        let raw: GuestInput = serde_json::from_str(r#"{"name": " Ada "}"#).unwrap();
        let added = dir.add("ev", vec![raw]).await.unwrap();
        assert!(added[0].id.starts_with("guest-"));
        assert_eq!(added[0].name, "Ada");
        assert_eq!(added[0].attending_count, 1);
        assert_eq!(added[0].group, "other");
        assert_eq!(added[0].status, GuestStatus::Pending);
    }

    #[tokio::test]
    async fn rsvp_reports_confirmation_and_count_change() {
        let dir = GuestDirectory::default();
        dir.add("ev", vec![input("a", GuestStatus::Pending, 1)]).await.unwrap();
        let rsvp = RsvpUpdate {
            status: GuestStatus::Confirmed,
            attending_count: Some(3),
            via_public_link: true,
        };
        let (before, after) = dir.apply_rsvp("ev", "a", &rsvp).await.unwrap();
        assert_eq!(
            describe_changes(&before, &after, ChangeType::RsvpUpdatedPublic),
            vec![
                ChangeType::RsvpUpdatedPublic,
                ChangeType::StatusConfirmed,
                ChangeType::AttendingCountChanged
            ]
        );
    }

    #[tokio::test]
    async fn declining_is_reported_as_unconfirmed() {
        let dir = GuestDirectory::default();
        dir.add("ev", vec![input("a", GuestStatus::Confirmed, 2)]).await.unwrap();
        let (before, after) = dir
            .replace("ev", "a", input("a", GuestStatus::Declined, 2))
            .await
            .unwrap();
        assert_eq!(
            describe_changes(&before, &after, ChangeType::GuestUpdated),
            vec![ChangeType::GuestUpdated, ChangeType::StatusUnconfirmed]
        );
    }

    #[tokio::test]
    async fn unknown_guest_is_none() {
        let dir = GuestDirectory::default();
        assert!(dir.remove("ev", "ghost").await.is_none());
        assert!(dir.replace("ev", "ghost", input("ghost", GuestStatus::Pending, 1)).await.is_none());
    }

    #[test]
    fn confirmed_guest_with_nobody_attending_is_a_problem() {
        let mut bad = input("a", GuestStatus::Confirmed, 0);
        bad.name = "  ".into();
        assert_eq!(bad.problems().len(), 2);
    }
}
