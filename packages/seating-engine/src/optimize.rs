//! Post-processing for an existing arrangement: drop duplicate seats, fold
//! sparse tables into fuller ones and delete auto-created tables that end up
//! empty. Running it twice in a row changes nothing the second time.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::constraints::ConstraintIndex;
use crate::model::{party_sizes, Arrangement, Guest, Preferences, Table};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionReport {
    pub duplicates_removed: usize,
    pub tables_merged: usize,
    pub tables_removed: Vec<String>,
}

impl CompactionReport {
    pub fn changed(&self) -> bool {
        self.duplicates_removed > 0 || self.tables_merged > 0 || !self.tables_removed.is_empty()
    }
}

pub fn compact(
    tables: &mut Vec<Table>,
    arrangement: &mut Arrangement,
    guests: &[Guest],
    prefs: &Preferences,
    config: &EngineConfig,
) -> CompactionReport {
    let mut report = CompactionReport {
        duplicates_removed: remove_duplicates(tables, arrangement),
        ..Default::default()
    };
    report.tables_merged = merge_sparse_tables(tables, arrangement, guests, prefs, config);

    let doomed: HashSet<String> = tables
        .iter()
        .filter(|t| t.auto_created && arrangement.guests_at(&t.id).is_empty())
        .map(|t| t.id.clone())
        .collect();
    if !doomed.is_empty() {
        tables.retain(|t| !doomed.contains(&t.id));
        for id in &doomed {
            arrangement.remove_table(id);
        }
        report.tables_removed = doomed.into_iter().collect();
        report.tables_removed.sort();
    }

    if report.changed() {
        info!(
            "Compacted arrangement: {} duplicate seat(s), {} merge(s), {} table(s) removed",
            report.duplicates_removed,
            report.tables_merged,
            report.tables_removed.len()
        );
    }
    report
}

/// Keep each guest's first seat, walking tables in inventory order and then
/// any keys the inventory does not know.
fn remove_duplicates(tables: &[Table], arrangement: &mut Arrangement) -> usize {
    let known: HashSet<&str> = tables.iter().map(|t| t.id.as_str()).collect();
    let order: Vec<String> = tables
        .iter()
        .map(|t| t.id.clone())
        .chain(
            arrangement
                .table_ids()
                .filter(|id| !known.contains(id))
                .map(String::from)
                .collect::<Vec<_>>(),
        )
        .collect();

    let mut seen: HashSet<String> = HashSet::new();
    let mut removed = 0;
    for table_id in &order {
        if !arrangement.contains_table(table_id) {
            continue;
        }
        let current = arrangement.guests_at(table_id);
        let kept: Vec<String> = current
            .iter()
            .filter(|g| seen.insert((*g).clone()))
            .cloned()
            .collect();
        if kept.len() != current.len() {
            removed += current.len() - kept.len();
            arrangement.set_table(table_id, kept);
        }
    }
    removed
}

/// Move everyone from tables filled to at most 1/N of capacity onto another
/// occupied table with room. Repeats until a pass merges nothing.
fn merge_sparse_tables(
    tables: &[Table],
    arrangement: &mut Arrangement,
    guests: &[Guest],
    prefs: &Preferences,
    config: &EngineConfig,
) -> usize {
    let sizes = party_sizes(guests);
    let constraints = ConstraintIndex::from_preferences(prefs);
    let fraction = config.merge_fraction.max(1);
    let mut merges = 0;

    loop {
        let mut merged_this_pass = false;
        for (src, source) in tables.iter().enumerate() {
            let occupancy = arrangement.occupancy(&source.id, &sizes);
            if occupancy == 0 || occupancy.saturating_mul(fraction) > source.capacity {
                continue;
            }

            let movers: Vec<String> = arrangement.guests_at(&source.id).to_vec();
            let mover_ids: Vec<&str> = movers.iter().map(String::as_str).collect();
            let target = tables.iter().enumerate().find(|(dst, candidate)| {
                if *dst == src {
                    return false;
                }
                let filled = arrangement.occupancy(&candidate.id, &sizes);
                filled > 0
                    && candidate.capacity.saturating_sub(filled) >= occupancy
                    && !constraints.has_separation_conflict(&mover_ids, arrangement.guests_at(&candidate.id))
            });

            if let Some((_, target)) = target {
                debug!(
                    "Merging {} ({} people) into {}",
                    source.name, occupancy, target.name
                );
                for guest in &movers {
                    arrangement.seat(&target.id, guest);
                }
                arrangement.set_table(&source.id, Vec::new());
                merges += 1;
                merged_this_pass = true;
            }
        }
        if !merged_this_pass {
            return merges;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GuestStatus, PairRule, Position, TableShape};

    fn guests(ids: &[(&str, u32)]) -> Vec<Guest> {
        ids.iter()
            .map(|(id, n)| Guest {
                id: id.to_string(),
                name: String::new(),
                attending_count: *n,
                group: "family".into(),
                status: GuestStatus::Confirmed,
            })
            .collect()
    }

    fn table(id: &str, capacity: u32, auto_created: bool) -> Table {
        Table {
            id: id.into(),
            name: id.into(),
            shape: TableShape::Round,
            capacity,
            position: Position::default(),
            rotation: 0.0,
            auto_created,
            created_for_sync: false,
        }
    }

    fn arrangement(entries: &[(&str, &[&str])]) -> Arrangement {
        entries
            .iter()
            .map(|(t, gs)| (t.to_string(), gs.iter().map(|g| g.to_string()).collect()))
            .collect()
    }

    fn run(tables: &mut Vec<Table>, arr: &mut Arrangement, roster: &[Guest], prefs: &Preferences) -> CompactionReport {
        compact(tables, arr, roster, prefs, &EngineConfig::default())
    }

    #[test]
    fn duplicate_seats_keep_first_occurrence_in_inventory_order() {
        let roster = guests(&[("a", 1), ("b", 1), ("c", 1), ("d", 1)]);
        // z-table comes first in the inventory even though it sorts last
        let mut tables = vec![table("z", 4, false), table("a-table", 4, false)];
        let mut arr = arrangement(&[("z", &["a", "b", "a"]), ("a-table", &["b", "c", "d"])]);

        let report = run(&mut tables, &mut arr, &roster, &Preferences::default());
        assert_eq!(report.duplicates_removed, 2);
        assert_eq!(arr.guests_at("z"), ["a", "b"]);
        assert_eq!(arr.guests_at("a-table"), ["c", "d"]);
    }

    #[test]
    fn sparse_auto_table_is_merged_and_removed() {
        let roster = guests(&[("a", 4), ("b", 1), ("c", 1)]);
        let mut tables = vec![table("main", 10, false), table("extra", 10, true)];
        let mut arr = arrangement(&[("main", &["a", "b"]), ("extra", &["c"])]);

        let report = run(&mut tables, &mut arr, &roster, &Preferences::default());
        assert!(report.changed());
        // main (5/10) is not sparse; extra (1/10) folds into it
        assert_eq!(report.tables_merged, 1);
        assert_eq!(report.tables_removed, vec!["extra".to_string()]);
        assert_eq!(tables.len(), 1);
        assert_eq!(arr.guests_at("main"), ["a", "b", "c"]);
        assert!(!arr.contains_table("extra"));
    }

    #[test]
    fn user_tables_are_emptied_but_kept() {
        let roster = guests(&[("a", 5), ("b", 1)]);
        let mut tables = vec![table("main", 8, false), table("side", 6, false)];
        let mut arr = arrangement(&[("main", &["a"]), ("side", &["b"])]);

        run(&mut tables, &mut arr, &roster, &Preferences::default());
        assert_eq!(tables.len(), 2);
        assert!(arr.guests_at("side").is_empty());
        assert_eq!(arr.guests_at("main"), ["a", "b"]);
    }

    #[test]
    fn merge_respects_separation_rules() {
        let roster = guests(&[("a", 5), ("b", 1)]);
        let prefs = Preferences {
            cannot_sit_together: vec![PairRule::new("a", "b")],
            ..Default::default()
        };
        let mut tables = vec![table("main", 8, false), table("side", 6, true)];
        let mut arr = arrangement(&[("main", &["a"]), ("side", &["b"])]);

        let report = run(&mut tables, &mut arr, &roster, &prefs);
        assert!(!report.changed());
        assert_eq!(arr.guests_at("side"), ["b"]);
    }

    #[test]
    fn empty_auto_tables_are_dropped() {
        let roster = guests(&[("a", 3)]);
        let mut tables = vec![table("main", 4, false), table("spare", 10, true), table("user", 6, false)];
        let mut arr = arrangement(&[("main", &["a"]), ("spare", &[]), ("user", &[])]);

        let report = run(&mut tables, &mut arr, &roster, &Preferences::default());
        assert_eq!(report.tables_removed, vec!["spare".to_string()]);
        assert_eq!(tables.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(), ["main", "user"]);
    }

    #[test]
    fn compaction_is_idempotent() {
        let roster = guests(&[("a", 2), ("b", 1), ("c", 1), ("d", 6), ("e", 1)]);
        let mut tables = vec![
            table("t1", 12, false),
            table("t2", 12, true),
            table("t3", 12, true),
            table("t4", 10, true),
        ];
        let mut arr = arrangement(&[
            ("t1", &["a", "b"]),
            ("t2", &["c", "b"]),
            ("t3", &["d"]),
            ("t4", &["e"]),
        ]);

        let first = run(&mut tables, &mut arr, &roster, &Preferences::default());
        assert!(first.changed());
        let (tables_after, arr_after) = (tables.clone(), arr.clone());

        let second = run(&mut tables, &mut arr, &roster, &Preferences::default());
        assert!(!second.changed());
        assert_eq!(tables, tables_after);
        assert_eq!(arr, arr_after);
    }
}
