use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;

use crate::model::{party_sizes, Arrangement, Guest, Table};

// ── Findings ──────────────────────────────────────────────────────────────────

/// One problem found in an arrangement. Findings are data, not errors: the
/// validator reports everything it sees and leaves the decision to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    /// Arrangement references a table the inventory does not have
    #[serde(rename_all = "camelCase")]
    UnknownTable { table_id: String },
    /// Seated party sizes exceed the table's capacity
    #[serde(rename_all = "camelCase")]
    OverCapacity {
        table_id: String,
        table_name: String,
        occupancy: u32,
        capacity: u32,
    },
    /// Same guest listed under more than one table
    #[serde(rename_all = "camelCase")]
    DuplicateSeat { guest_id: String, table_ids: Vec<String> },
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::UnknownTable { table_id } => write!(f, "Table {table_id} does not exist"),
            Finding::OverCapacity { table_name, occupancy, capacity, .. } => write!(
                f,
                "Table \"{table_name}\" has {occupancy} guests but only {capacity} seats"
            ),
            Finding::DuplicateSeat { guest_id, table_ids } => write!(
                f,
                "Guest {guest_id} is seated at {} tables ({})",
                table_ids.len(),
                table_ids.join(", ")
            ),
        }
    }
}

impl Finding {
    pub fn is_over_capacity(&self) -> bool {
        matches!(self, Finding::OverCapacity { .. })
    }
}

// ── Validator ─────────────────────────────────────────────────────────────────

/// Check an arrangement against table capacities and the one-seat-per-guest
/// rule. Occupancy is recomputed from confirmed guests' party sizes; ids that
/// are not confirmed guests count as zero.
pub fn validate(tables: &[Table], arrangement: &Arrangement, guests: &[Guest]) -> Vec<Finding> {
    let sizes = party_sizes(guests);
    validate_with_sizes(tables, arrangement, &sizes)
}

pub(crate) fn validate_with_sizes(
    tables: &[Table],
    arrangement: &Arrangement,
    sizes: &HashMap<&str, u32>,
) -> Vec<Finding> {
    let by_id: HashMap<&str, &Table> = tables.iter().map(|t| (t.id.as_str(), t)).collect();
    let mut findings = Vec::new();
    let mut placements: BTreeMap<&str, Vec<String>> = BTreeMap::new();

    for (table_id, seated) in arrangement.iter() {
        for guest_id in seated {
            let seen = placements.entry(guest_id.as_str()).or_default();
            if !seen.iter().any(|t| t == table_id) {
                seen.push(table_id.to_string());
            }
        }

        let Some(table) = by_id.get(table_id) else {
            findings.push(Finding::UnknownTable { table_id: table_id.to_string() });
            continue;
        };
        let occupancy = arrangement.occupancy(table_id, sizes);
        if occupancy > table.capacity {
            findings.push(Finding::OverCapacity {
                table_id: table.id.clone(),
                table_name: table.name.clone(),
                occupancy,
                capacity: table.capacity,
            });
        }
    }

    findings.extend(
        placements
            .into_iter()
            .filter(|(_, tables)| tables.len() > 1)
            .map(|(guest_id, table_ids)| Finding::DuplicateSeat {
                guest_id: guest_id.to_string(),
                table_ids,
            }),
    );
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GuestStatus, Position, TableShape};

    fn guest(id: &str, attending: u32) -> Guest {
        Guest {
            id: id.into(),
            name: String::new(),
            attending_count: attending,
            group: "family".into(),
            status: GuestStatus::Confirmed,
        }
    }

    fn table(id: &str, name: &str, capacity: u32) -> Table {
        Table {
            id: id.into(),
            name: name.into(),
            shape: TableShape::Round,
            capacity,
            position: Position::default(),
            rotation: 0.0,
            auto_created: false,
            created_for_sync: false,
        }
    }

    fn arrangement(entries: &[(&str, &[&str])]) -> Arrangement {
        entries
            .iter()
            .map(|(t, gs)| (t.to_string(), gs.iter().map(|g| g.to_string()).collect()))
            .collect()
    }

    #[test]
    fn clean_arrangement_has_no_findings() {
        let guests = vec![guest("a", 2), guest("b", 2)];
        let tables = vec![table("t1", "One", 4)];
        assert!(validate(&tables, &arrangement(&[("t1", &["a", "b"])]), &guests).is_empty());
    }

    #[test]
    fn reports_every_kind_of_problem() {
        let guests = vec![guest("a", 3), guest("b", 2)];
        let tables = vec![table("t1", "One", 4), table("t2", "Two", 4)];
        let arr = arrangement(&[("t1", &["a", "b"]), ("t2", &["b"]), ("ghost", &[])]);

        let findings = validate(&tables, &arr, &guests);
        assert!(findings.contains(&Finding::UnknownTable { table_id: "ghost".into() }));
        assert!(findings.contains(&Finding::OverCapacity {
            table_id: "t1".into(),
            table_name: "One".into(),
            occupancy: 5,
            capacity: 4,
        }));
        assert!(findings.contains(&Finding::DuplicateSeat {
            guest_id: "b".into(),
            table_ids: vec!["t1".into(), "t2".into()],
        }));
        assert_eq!(findings.len(), 3);
    }

    #[test]
    fn over_capacity_message_names_the_table() {
        let finding = Finding::OverCapacity {
            table_id: "t1".into(),
            table_name: "Head Table".into(),
            occupancy: 14,
            capacity: 12,
        };
        assert_eq!(finding.to_string(), "Table \"Head Table\" has 14 guests but only 12 seats");
        let json = serde_json::to_value(&finding).unwrap();
        assert_eq!(json["kind"], "over_capacity");
        assert_eq!(json["tableName"], "Head Table");
    }

    #[test]
    fn unconfirmed_guests_do_not_count_toward_occupancy() {
        let mut declined = guest("d", 5);
        declined.status = GuestStatus::Declined;
        let guests = vec![guest("a", 2), declined];
        let tables = vec![table("t1", "One", 2)];
        assert!(validate(&tables, &arrangement(&[("t1", &["a", "d"])]), &guests).is_empty());
    }
}
