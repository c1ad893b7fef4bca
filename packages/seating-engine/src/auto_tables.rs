use tracing::debug;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::model::{Position, Table, TableShape};

/// Creates tables to cover a capacity shortfall.
pub struct TableFactory<'a> {
    config: &'a EngineConfig,
    preferred: u32,
}

impl<'a> TableFactory<'a> {
    pub fn new(config: &'a EngineConfig, preferred: u32) -> Self {
        Self { config, preferred }
    }

    /// Capacity of the next table given how many seats are still missing.
    ///
    /// Inside the tolerance band around the preferred size a preferred-size
    /// table is used. Small remainders get the fallback table, which is never
    /// larger than the preferred size. Anything bigger keeps allocating
    /// preferred-size tables.
    fn next_capacity(&self, remaining: u32) -> u32 {
        let pref = self.preferred;
        let low = pref.saturating_sub(self.config.band_below);
        let high = pref + self.config.band_above;

        let capacity = if (low..=high).contains(&remaining) {
            pref
        } else if remaining <= self.config.small_table_capacity {
            self.config.small_table_capacity.min(pref)
        } else {
            pref
        };
        capacity.clamp(self.config.min_table_capacity, self.config.max_table_capacity)
    }

    /// Plan tables whose combined capacity is at least `additional`.
    ///
    /// `existing_count` continues the naming and the grid layout after the
    /// tables already in the inventory. Nothing is appended anywhere; the
    /// caller decides what to do with the records.
    pub fn plan(&self, additional: u32, existing_count: usize, for_sync: bool) -> Vec<Table> {
        let mut tables = Vec::new();
        let mut remaining = additional;

        while remaining > 0 {
            let capacity = self.next_capacity(remaining);
            let index = existing_count + tables.len();
            tables.push(Table {
                id: format!("table-{}", Uuid::new_v4()),
                name: format!("Table {}", index + 1),
                shape: TableShape::Round,
                capacity,
                position: self.grid_position(index),
                rotation: 0.0,
                auto_created: true,
                created_for_sync: for_sync,
            });
            remaining = remaining.saturating_sub(capacity);
        }

        debug!(
            "Planned {} table(s) for {} extra seat(s): {:?}",
            tables.len(),
            additional,
            tables.iter().map(|t| t.capacity).collect::<Vec<_>>()
        );
        tables
    }

    fn grid_position(&self, index: usize) -> Position {
        let columns = self.config.layout_columns.max(1) as usize;
        let spacing = self.config.layout_spacing;
        Position {
            x: self.config.layout_origin + (index % columns) as f64 * spacing,
            y: self.config.layout_origin + (index / columns) as f64 * spacing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capacities(tables: &[Table]) -> Vec<u32> {
        tables.iter().map(|t| t.capacity).collect()
    }

    #[test]
    fn covers_twenty_six_with_preferred_twelve() {
        let cfg = EngineConfig::default();
        let tables = TableFactory::new(&cfg, 12).plan(26, 0, false);
        let caps = capacities(&tables);
        assert!(caps.iter().sum::<u32>() >= 26);
        assert!(caps.iter().all(|&c| (2..=24).contains(&c)));
        assert_eq!(caps, vec![12, 12, 10]);
    }

    #[test]
    fn band_keeps_preferred_size() {
        let cfg = EngineConfig::default();
        let factory = TableFactory::new(&cfg, 12);
        assert_eq!(capacities(&factory.plan(11, 0, false)), vec![12]);
        assert_eq!(capacities(&factory.plan(3, 0, false)), vec![10]);
    }

    #[test]
    fn small_preferred_size_caps_fallback() {
        let cfg = EngineConfig::default();
        let tables = TableFactory::new(&cfg, 6).plan(2, 0, false);
        assert_eq!(capacities(&tables), vec![6]);
    }

    #[test]
    fn zero_requirement_creates_nothing() {
        let cfg = EngineConfig::default();
        assert!(TableFactory::new(&cfg, 12).plan(0, 4, false).is_empty());
    }

    #[test]
    fn names_and_positions_continue_after_existing() {
        let cfg = EngineConfig::default();
        let tables = TableFactory::new(&cfg, 12).plan(24, 4, true);
        assert_eq!(tables[0].name, "Table 5");
        assert_eq!(tables[0].position, Position { x: 300.0, y: 300.0 });
        assert_eq!(tables[1].position, Position { x: 500.0, y: 300.0 });
        assert!(tables.iter().all(|t| t.auto_created && t.created_for_sync));
        assert_ne!(tables[0].id, tables[1].id);
    }
}
