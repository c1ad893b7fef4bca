use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

// ─── Guests ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GuestStatus {
    #[default]
    Pending,
    Confirmed,
    Declined,
    Maybe,
}

/// Guest record as supplied by the guest list. Read-only to the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Guest {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Party size this record stands for
    #[serde(default = "default_attending")]
    pub attending_count: u32,
    /// Affinity label, e.g. "family", "friends" or anything custom
    #[serde(default = "default_group")]
    pub group: String,
    #[serde(default)]
    pub status: GuestStatus,
}

fn default_attending() -> u32 {
    1
}

fn default_group() -> String {
    "other".to_string()
}

impl Guest {
    pub fn is_confirmed(&self) -> bool {
        self.status == GuestStatus::Confirmed
    }

    /// Seats this record occupies. Confirmed records always take at least one.
    pub fn party_size(&self) -> u32 {
        self.attending_count.max(1)
    }
}

/// Confirmed guests keyed by id, in roster order.
pub fn confirmed_roster(guests: &[Guest]) -> Vec<&Guest> {
    let mut seen = HashSet::new();
    guests
        .iter()
        .filter(|g| g.is_confirmed() && seen.insert(g.id.as_str()))
        .collect()
}

/// Party size per confirmed guest id.
pub fn party_sizes(guests: &[Guest]) -> HashMap<&str, u32> {
    confirmed_roster(guests)
        .into_iter()
        .map(|g| (g.id.as_str(), g.party_size()))
        .collect()
}

// ─── Tables ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TableShape {
    #[default]
    Round,
    Rectangular,
    Square,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub shape: TableShape,
    pub capacity: u32,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default)]
    pub auto_created: bool,
    #[serde(default)]
    pub created_for_sync: bool,
}

// ─── Arrangement ──────────────────────────────────────────────────────────────

/// Table id → ordered guest ids.
///
/// Keys are kept sorted so serialized plans are stable; anything that cares
/// about inventory order walks the table list and looks keys up here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Arrangement(BTreeMap<String, Vec<String>>);

impl Arrangement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn guests_at(&self, table_id: &str) -> &[String] {
        self.0.get(table_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_table(&self, table_id: &str) -> bool {
        self.0.contains_key(table_id)
    }

    /// Ensure a (possibly empty) entry exists for `table_id`.
    pub fn ensure_table(&mut self, table_id: &str) {
        self.0.entry(table_id.to_string()).or_default();
    }

    pub fn seat(&mut self, table_id: &str, guest_id: &str) {
        self.0
            .entry(table_id.to_string())
            .or_default()
            .push(guest_id.to_string());
    }

    pub fn set_table(&mut self, table_id: &str, guests: Vec<String>) {
        self.0.insert(table_id.to_string(), guests);
    }

    pub fn remove_table(&mut self, table_id: &str) -> Option<Vec<String>> {
        self.0.remove(table_id)
    }

    /// First table (in key order) that lists `guest_id`.
    pub fn table_of(&self, guest_id: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(_, guests)| guests.iter().any(|g| g == guest_id))
            .map(|(table, _)| table.as_str())
    }

    pub fn seated_guests(&self) -> HashSet<&str> {
        self.0.values().flatten().map(String::as_str).collect()
    }

    pub fn table_ids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(t, g)| (t.as_str(), g.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    /// Total seated people at `table_id`, counting unknown ids as zero.
    pub fn occupancy(&self, table_id: &str, sizes: &HashMap<&str, u32>) -> u32 {
        self.guests_at(table_id)
            .iter()
            .map(|g| sizes.get(g.as_str()).copied().unwrap_or(0))
            .fold(0u32, u32::saturating_add)
    }
}

impl FromIterator<(String, Vec<String>)> for Arrangement {
    fn from_iter<I: IntoIterator<Item = (String, Vec<String>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ─── Preferences ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PairRule {
    pub guest_a: String,
    pub guest_b: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PairRule {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        Self { guest_a: a.into(), guest_b: b.into(), reason: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GroupRequest {
    pub name: String,
    pub guest_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GroupMixingRule {
    pub group_a: String,
    pub group_b: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default)]
    pub must_sit_together: Vec<PairRule>,
    #[serde(default)]
    pub cannot_sit_together: Vec<PairRule>,
    #[serde(default)]
    pub group_together: Vec<GroupRequest>,
    #[serde(default)]
    pub group_mixing_rules: Vec<GroupMixingRule>,
    #[serde(default)]
    pub allow_group_mixing: bool,
    #[serde(default = "default_table_size")]
    pub preferred_table_size: u32,
}

fn default_table_size() -> u32 {
    12
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            must_sit_together: Vec::new(),
            cannot_sit_together: Vec::new(),
            group_together: Vec::new(),
            group_mixing_rules: Vec::new(),
            allow_group_mixing: false,
            preferred_table_size: default_table_size(),
        }
    }
}
