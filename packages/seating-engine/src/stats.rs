use serde::Serialize;

use crate::model::{confirmed_roster, party_sizes, Arrangement, Guest, Table};
use crate::validate::{validate_with_sizes, Finding};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TableStatistics {
    pub table_id: String,
    pub name: String,
    pub capacity: u32,
    pub occupancy: u32,
    pub guest_count: usize,
    pub utilization_rate: f64,
    pub over_capacity: bool,
    pub auto_created: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeatingStatistics {
    pub total_tables: usize,
    pub occupied_tables: usize,
    pub total_capacity: u32,
    /// Confirmed guest records
    pub total_guests: usize,
    /// Sum of confirmed party sizes
    pub total_people: u32,
    pub seated_guests: usize,
    pub unseated_guests: usize,
    pub seated_people: u32,
    pub unseated_people: u32,
    /// Seated people over total capacity, 0 without capacity
    pub utilization_rate: f64,
    pub tables: Vec<TableStatistics>,
    pub issues: Vec<Finding>,
}

fn rate(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        0.0
    } else {
        f64::from(part) / f64::from(whole)
    }
}

/// Occupancy and utilization for a snapshot of tables, seats and guests.
pub fn compute(tables: &[Table], arrangement: &Arrangement, guests: &[Guest]) -> SeatingStatistics {
    let roster = confirmed_roster(guests);
    let sizes = party_sizes(guests);
    let seated = arrangement.seated_guests();

    let per_table: Vec<TableStatistics> = tables
        .iter()
        .map(|t| {
            let occupancy = arrangement.occupancy(&t.id, &sizes);
            TableStatistics {
                table_id: t.id.clone(),
                name: t.name.clone(),
                capacity: t.capacity,
                occupancy,
                guest_count: arrangement.guests_at(&t.id).len(),
                utilization_rate: rate(occupancy, t.capacity),
                over_capacity: occupancy > t.capacity,
                auto_created: t.auto_created,
            }
        })
        .collect();

    let total_capacity = tables.iter().map(|t| t.capacity).fold(0u32, u32::saturating_add);
    let total_people: u32 = roster.iter().map(|g| g.party_size()).fold(0, u32::saturating_add);
    let (seated_roster, unseated_roster): (Vec<&Guest>, Vec<&Guest>) =
        roster.iter().copied().partition(|g| seated.contains(g.id.as_str()));
    let seated_people: u32 = seated_roster.iter().map(|g| g.party_size()).fold(0, u32::saturating_add);

    SeatingStatistics {
        total_tables: tables.len(),
        occupied_tables: per_table.iter().filter(|t| t.occupancy > 0).count(),
        total_capacity,
        total_guests: roster.len(),
        total_people,
        seated_guests: seated_roster.len(),
        unseated_guests: unseated_roster.len(),
        seated_people,
        unseated_people: total_people.saturating_sub(seated_people),
        utilization_rate: rate(seated_people, total_capacity),
        tables: per_table,
        issues: validate_with_sizes(tables, arrangement, &sizes),
    }
}
