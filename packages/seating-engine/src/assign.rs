//! # assign
//!
//! Seats confirmed guests at tables. Fresh generation and incremental
//! generation run the same steps; incremental generation simply starts from
//! a non-empty arrangement whose seats are never moved.
//!
//! Steps, each over guests that are still unseated:
//! 1. must-sit-together pairs
//! 2. explicit group-together requests
//! 3. group-mixing rules (only when mixing is allowed)
//! 4. remaining guests by affinity group, oversized groups split into
//!    balanced chunks first
//! 5. leftover individuals
//!
//! Every table lookup is gated by the separation rules and by a per-table
//! remaining-capacity counter that lives for one run only.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::auto_tables::TableFactory;
use crate::config::EngineConfig;
use crate::constraints::ConstraintIndex;
use crate::error::EngineError;
use crate::model::{confirmed_roster, Arrangement, GroupMixingRule, GroupRequest, Guest, PairRule, Preferences, Table};

// ── Request / Outcome ─────────────────────────────────────────────────────────

/// Whether the engine may add tables to cover a shortfall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TablePolicy {
    /// Create tables when capacity runs short
    AutoExtend,
    /// The caller already included every table it wants used
    AsSupplied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    Fresh,
    Incremental,
}

pub struct GenerationRequest<'a> {
    pub guests: &'a [Guest],
    pub tables: Vec<Table>,
    pub preferences: &'a Preferences,
    /// Seats to preserve. `Some` switches to incremental generation.
    pub existing: Option<Arrangement>,
    pub table_policy: TablePolicy,
}

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub mode: GenerationMode,
    pub arrangement: Arrangement,
    /// Tables used by the run, including any the engine created
    pub tables: Vec<Table>,
    /// Ids of tables created during this run
    pub created_tables: Vec<String>,
    /// Confirmed guests no table could take
    pub unseated: Vec<String>,
}

// ── Engine ────────────────────────────────────────────────────────────────────

pub struct SeatingEngine {
    config: EngineConfig,
}

impl SeatingEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn generate(&self, request: GenerationRequest<'_>) -> Result<GenerationOutcome, EngineError> {
        let roster = confirmed_roster(request.guests);
        if roster.is_empty() {
            return Err(EngineError::NoConfirmedGuests);
        }
        if let Some(bad) = request
            .tables
            .iter()
            .find(|t| t.capacity < self.config.min_table_capacity)
        {
            return Err(EngineError::InvalidCapacity {
                table_id: bad.id.clone(),
                capacity: bad.capacity,
                minimum: self.config.min_table_capacity,
            });
        }
        if let Some(table_id) = first_duplicate_id(&request.tables) {
            return Err(EngineError::DuplicateTableId { table_id: table_id.to_string() });
        }

        let prefs = request.preferences;
        let preferred = self.config.preferred_size(Some(prefs.preferred_table_size));
        let mode = if request.existing.is_some() {
            GenerationMode::Incremental
        } else {
            GenerationMode::Fresh
        };
        let auto_extend = request.table_policy == TablePolicy::AutoExtend;
        let for_sync = mode == GenerationMode::Incremental;
        let factory = TableFactory::new(&self.config, preferred);

        let mut run = Run::new(&self.config, preferred, request.tables, &roster, prefs, request.existing);
        if mode == GenerationMode::Fresh {
            run.ensure_all_keys();
        }

        let mut created = Vec::new();
        let (needed, free) = (run.pending_people(), run.free_seats());
        if auto_extend && needed > free {
            let extra = factory.plan(needed - free, run.tables.len(), for_sync);
            info!(
                "Capacity short by {} seat(s); adding {} table(s)",
                needed - free,
                extra.len()
            );
            created.extend(extra.iter().map(|t| t.id.clone()));
            run.add_tables(extra);
        }
        if run.tables.is_empty() {
            return Err(EngineError::NoTablesAvailable);
        }

        run.seat_must_pairs(&prefs.must_sit_together);
        run.seat_group_requests(&prefs.group_together);
        if prefs.allow_group_mixing {
            run.seat_mixed_groups(&prefs.group_mixing_rules);
        }
        run.seat_affinity_groups(mode == GenerationMode::Fresh);
        run.seat_leftovers();

        // Fragmentation can strand guests even when total capacity suffices.
        if auto_extend && run.has_pending() {
            let extra = factory.plan(run.pending_people(), run.tables.len(), for_sync);
            debug!("Topping up with {} table(s) for stranded guests", extra.len());
            created.extend(extra.iter().map(|t| t.id.clone()));
            run.add_tables(extra);
            run.seat_affinity_groups(mode == GenerationMode::Fresh);
            run.seat_leftovers();
        }

        let outcome = run.finish(mode, created);
        info!(
            "Generated {:?} arrangement: {} guest record(s) seated, {} unseated, {} table(s), {} created",
            mode,
            roster.len() - outcome.unseated.len(),
            outcome.unseated.len(),
            outcome.tables.len(),
            outcome.created_tables.len()
        );
        if !outcome.unseated.is_empty() {
            warn!("Could not seat guest(s): {:?}", outcome.unseated);
        }
        Ok(outcome)
    }
}

/// First table id that appears more than once, in table order.
pub fn first_duplicate_id(tables: &[Table]) -> Option<&str> {
    let mut seen = HashSet::new();
    tables.iter().map(|t| t.id.as_str()).find(|id| !seen.insert(*id))
}

/// Target chunk sizes for an oversized affinity group.
///
/// Totals close to twice the preferred size are split in two near-equal
/// halves; larger totals get as many near-preferred chunks as needed.
fn chunk_targets(total: u32, preferred: u32, slack: u32) -> Vec<u32> {
    if total <= preferred * 2 + slack {
        return vec![total.div_ceil(2), total / 2];
    }
    let count = total.div_ceil(preferred.max(1));
    let base = total / count;
    let extra = total % count;
    (0..count).map(|i| base + u32::from(i < extra)).collect()
}

// ── Working state for one run ─────────────────────────────────────────────────

struct Run<'a> {
    config: &'a EngineConfig,
    preferred: u32,
    tables: Vec<Table>,
    remaining: Vec<u32>,
    groups_at: Vec<HashSet<&'a str>>,
    arrangement: Arrangement,
    guests: HashMap<&'a str, &'a Guest>,
    order: Vec<&'a str>,
    pending: HashSet<&'a str>,
    seat_of: HashMap<&'a str, usize>,
    constraints: ConstraintIndex,
}

impl<'a> Run<'a> {
    fn new(
        config: &'a EngineConfig,
        preferred: u32,
        tables: Vec<Table>,
        roster: &[&'a Guest],
        prefs: &Preferences,
        existing: Option<Arrangement>,
    ) -> Self {
        let arrangement = existing.unwrap_or_default();
        let guests: HashMap<&'a str, &'a Guest> = roster.iter().map(|g| (g.id.as_str(), *g)).collect();
        let index_of: HashMap<&str, usize> = tables
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.as_str(), i))
            .collect();

        let mut remaining: Vec<u32> = tables.iter().map(|t| t.capacity).collect();
        let mut groups_at = vec![HashSet::new(); tables.len()];
        let mut seat_of = HashMap::new();
        for (table_id, seated) in arrangement.iter() {
            let Some(&idx) = index_of.get(table_id) else {
                continue;
            };
            for id in seated {
                if let Some(&guest) = guests.get(id.as_str()) {
                    remaining[idx] = remaining[idx].saturating_sub(guest.party_size());
                    groups_at[idx].insert(guest.group.as_str());
                    seat_of.entry(guest.id.as_str()).or_insert(idx);
                }
            }
        }

        let seated = arrangement.seated_guests();
        let order: Vec<&'a str> = roster.iter().map(|g| g.id.as_str()).collect();
        let pending = order.iter().copied().filter(|id| !seated.contains(id)).collect();

        Self {
            config,
            preferred,
            tables,
            remaining,
            groups_at,
            arrangement,
            guests,
            order,
            pending,
            seat_of,
            constraints: ConstraintIndex::from_preferences(prefs),
        }
    }

    fn ensure_all_keys(&mut self) {
        for table in &self.tables {
            self.arrangement.ensure_table(&table.id);
        }
    }

    fn add_tables(&mut self, tables: Vec<Table>) {
        for table in tables {
            self.remaining.push(table.capacity);
            self.groups_at.push(HashSet::new());
            self.arrangement.ensure_table(&table.id);
            self.tables.push(table);
        }
    }

    // ── Lookups ───────────────────────────────────────────────────────────────

    fn guest(&self, id: &str) -> Option<&'a Guest> {
        self.guests.get(id).copied()
    }

    fn size(&self, id: &str) -> u32 {
        self.guest(id).map_or(0, Guest::party_size)
    }

    fn group_of(&self, id: &str) -> &'a str {
        self.guest(id).map_or("", |g| g.group.as_str())
    }

    fn people(&self, ids: &[&str]) -> u32 {
        ids.iter().fold(0u32, |acc, id| acc.saturating_add(self.size(id)))
    }

    fn is_pending(&self, id: &str) -> bool {
        self.pending.contains(id)
    }

    fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn pending_in_order(&self) -> Vec<&'a str> {
        self.order.iter().copied().filter(|id| self.pending.contains(id)).collect()
    }

    fn pending_people(&self) -> u32 {
        self.pending.iter().fold(0u32, |acc, id| acc.saturating_add(self.size(id)))
    }

    fn free_seats(&self) -> u32 {
        self.remaining.iter().fold(0u32, |acc, &seats| acc.saturating_add(seats))
    }

    fn conflicts(&self, idx: usize, ids: &[&str]) -> bool {
        let seated = self.arrangement.guests_at(&self.tables[idx].id);
        self.constraints.has_separation_conflict(ids, seated)
    }

    fn fits(&self, idx: usize, ids: &[&str], need: u32) -> bool {
        self.remaining[idx] >= need && !self.conflicts(idx, ids)
    }

    /// Pick a table for `ids`, relaxing preferences in order: same group at
    /// preferred size, same group, preferred size, anything that fits.
    fn select_table(
        &self,
        ids: &[&str],
        need: u32,
        group: Option<&str>,
        window: Option<RangeInclusive<u32>>,
    ) -> Option<usize> {
        let candidates: Vec<usize> = (0..self.tables.len())
            .filter(|&i| window.as_ref().map_or(true, |w| w.contains(&self.tables[i].capacity)))
            .filter(|&i| self.fits(i, ids, need))
            .collect();

        let same_group = |i: usize| group.is_some_and(|g| self.groups_at[i].contains(g));
        let preferred = |i: usize| self.tables[i].capacity == self.preferred;

        candidates
            .iter()
            .copied()
            .find(|&i| same_group(i) && preferred(i))
            .or_else(|| candidates.iter().copied().find(|&i| same_group(i)))
            .or_else(|| candidates.iter().copied().find(|&i| preferred(i)))
            .or_else(|| candidates.first().copied())
    }

    // ── Seating ───────────────────────────────────────────────────────────────

    fn seat(&mut self, idx: usize, ids: &[&'a str]) {
        let table_id = self.tables[idx].id.clone();
        for &id in ids {
            let Some(guest) = self.guest(id) else {
                continue;
            };
            self.remaining[idx] = self.remaining[idx].saturating_sub(guest.party_size());
            self.groups_at[idx].insert(guest.group.as_str());
            self.arrangement.seat(&table_id, id);
            self.seat_of.insert(id, idx);
            self.pending.remove(id);
        }
    }

    fn seat_together(&mut self, ids: &[&'a str], group: Option<&'a str>) -> bool {
        if ids.is_empty() {
            return true;
        }
        if self.constraints.conflicts_within(ids) {
            return false;
        }
        match self.select_table(ids, self.people(ids), group, None) {
            Some(idx) => {
                self.seat(idx, ids);
                true
            }
            None => false,
        }
    }

    fn seat_single(&mut self, id: &'a str) -> bool {
        let group = self.group_of(id);
        self.seat_together(&[id], Some(group))
    }

    fn join_partner(&mut self, guest: &'a Guest, partner: &Guest) {
        let Some(&idx) = self.seat_of.get(partner.id.as_str()) else {
            return;
        };
        let ids = [guest.id.as_str()];
        if self.fits(idx, &ids, guest.party_size()) {
            self.seat(idx, &ids);
        }
    }

    fn seat_must_pairs(&mut self, rules: &[PairRule]) {
        for rule in rules {
            let (Some(a), Some(b)) = (self.guest(&rule.guest_a), self.guest(&rule.guest_b)) else {
                debug!("Skipping must-sit rule {} / {}: guest not confirmed", rule.guest_a, rule.guest_b);
                continue;
            };
            if a.id == b.id {
                continue;
            }
            match (self.is_pending(&a.id), self.is_pending(&b.id)) {
                (true, true) => {
                    if !self.seat_together(&[a.id.as_str(), b.id.as_str()], Some(a.group.as_str())) {
                        debug!("Must-sit pair {} / {} has no common table", a.id, b.id);
                    }
                }
                (true, false) => self.join_partner(a, b),
                (false, true) => self.join_partner(b, a),
                (false, false) => {}
            }
        }
    }

    fn seat_group_requests(&mut self, requests: &[GroupRequest]) {
        for request in requests {
            let mut seen = HashSet::new();
            let members: Vec<&'a Guest> = request
                .guest_ids
                .iter()
                .filter_map(|id| self.guest(id))
                .filter(|g| seen.insert(g.id.as_str()))
                .collect();
            let waiting: Vec<&'a str> = members
                .iter()
                .filter(|g| self.is_pending(&g.id))
                .map(|g| g.id.as_str())
                .collect();
            if waiting.is_empty() {
                continue;
            }

            let need = self.people(&waiting);
            let anchor = members.iter().find_map(|g| self.seat_of.get(g.id.as_str()).copied());
            if let Some(idx) = anchor {
                if !self.constraints.conflicts_within(&waiting) && self.fits(idx, &waiting, need) {
                    self.seat(idx, &waiting);
                    continue;
                }
            }

            let label = members.first().map(|g| g.group.as_str());
            if !self.seat_together(&waiting, label) {
                debug!("Group '{}' ({} people) does not fit at one table", request.name, need);
            }
        }
    }

    fn seat_mixed_groups(&mut self, rules: &[GroupMixingRule]) {
        let tolerance = self.config.mixing_tolerance;
        let window = self.preferred.saturating_sub(tolerance)..=self.preferred + tolerance;

        for rule in rules {
            if rule.group_a == rule.group_b {
                continue;
            }
            let pending = self.pending_in_order();
            let mut combined: Vec<&'a str> = pending
                .iter()
                .copied()
                .filter(|id| self.group_of(id) == rule.group_a)
                .collect();
            let side_b: Vec<&'a str> = pending
                .iter()
                .copied()
                .filter(|id| self.group_of(id) == rule.group_b)
                .collect();
            if combined.is_empty() || side_b.is_empty() {
                continue;
            }
            combined.extend(side_b);
            if self.constraints.conflicts_within(&combined) {
                continue;
            }

            let need = self.people(&combined);
            match self.select_table(&combined, need, None, Some(window.clone())) {
                Some(idx) => self.seat(idx, &combined),
                None => debug!(
                    "Mixed groups {} + {} ({} people) found no table near size {}",
                    rule.group_a, rule.group_b, need, self.preferred
                ),
            }
        }
    }

    fn seat_affinity_groups(&mut self, largest_first: bool) {
        let mut buckets: Vec<(&'a str, Vec<&'a str>)> = Vec::new();
        for id in self.pending_in_order() {
            let group = self.group_of(id);
            match buckets.iter_mut().find(|(g, _)| *g == group) {
                Some((_, ids)) => ids.push(id),
                None => buckets.push((group, vec![id])),
            }
        }
        if largest_first {
            buckets.sort_by_key(|(_, ids)| Reverse(self.people(ids)));
        }

        for (group, ids) in buckets {
            let ids: Vec<&'a str> = ids.into_iter().filter(|id| self.is_pending(id)).collect();
            if ids.is_empty() {
                continue;
            }
            let total = self.people(&ids);
            let chunks = if total > self.preferred + self.config.band_above {
                self.split_balanced(&ids, total)
            } else {
                vec![ids]
            };
            for chunk in chunks {
                if self.seat_together(&chunk, Some(group)) {
                    continue;
                }
                for id in chunk {
                    self.seat_single(id);
                }
            }
        }
    }

    fn split_balanced(&self, ids: &[&'a str], total: u32) -> Vec<Vec<&'a str>> {
        let targets = chunk_targets(total, self.preferred, self.config.band_above);
        let mut chunks: Vec<Vec<&'a str>> = vec![Vec::new(); targets.len()];
        let mut filled = vec![0u32; targets.len()];

        let mut by_size = ids.to_vec();
        by_size.sort_by_key(|id| Reverse(self.size(id)));
        for id in by_size {
            let slot = (0..targets.len())
                .max_by_key(|&i| (i64::from(targets[i]) - i64::from(filled[i]), Reverse(i)))
                .unwrap_or(0);
            filled[slot] += self.size(id);
            chunks[slot].push(id);
        }
        chunks.retain(|c| !c.is_empty());
        chunks
    }

    fn seat_leftovers(&mut self) {
        for id in self.pending_in_order() {
            if !self.seat_single(id) {
                debug!("No table can take guest {id} ({} people)", self.size(id));
            }
        }
    }

    fn finish(self, mode: GenerationMode, created_tables: Vec<String>) -> GenerationOutcome {
        let unseated = self.pending_in_order().into_iter().map(String::from).collect();
        GenerationOutcome {
            mode,
            arrangement: self.arrangement,
            tables: self.tables,
            created_tables,
            unseated,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
