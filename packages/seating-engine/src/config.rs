//! Engine-wide constants, gathered in one place so the backend can override
//! them from the environment.

// ── Configuration ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Preferred table size when a plan does not specify one (default 12)
    pub default_table_size: u32,
    /// Lower bound for a plan's preferred table size (default 6)
    pub min_preferred_size: u32,
    /// Upper bound for a plan's preferred table size, and for any
    /// auto-created table (default 24)
    pub max_table_capacity: u32,
    /// Smallest capacity a table may have (default 2)
    pub min_table_capacity: u32,
    /// Tolerance band below the preferred size inside which the factory
    /// still allocates a preferred-size table (default 2)
    pub band_below: u32,
    /// Tolerance band above the preferred size (default 4). Also the slack
    /// before an affinity group counts as oversized.
    pub band_above: u32,
    /// Capacity of the fallback table used for small remainders (default 10)
    pub small_table_capacity: u32,
    /// ± tolerance on table capacity when seating mixed groups (default 2)
    pub mixing_tolerance: u32,
    /// A table at or below 1/N of its capacity is a merge candidate (default 3)
    pub merge_fraction: u32,
    /// Auto-created tables per layout row (default 3)
    pub layout_columns: u32,
    /// Distance between auto-created tables (default 200)
    pub layout_spacing: f64,
    /// Offset of the first auto-created table from the origin (default 100)
    pub layout_origin: f64,
    /// Window in which an identical sync trigger is suppressed (default 30s)
    pub trigger_window_secs: i64,
    /// Triggers kept per plan by the recording path (default 10)
    pub trigger_capacity: usize,
    /// Hard cap on triggers held by a stored plan (default 20)
    pub trigger_history_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_table_size: 12,
            min_preferred_size: 6,
            max_table_capacity: 24,
            min_table_capacity: 2,
            band_below: 2,
            band_above: 4,
            small_table_capacity: 10,
            mixing_tolerance: 2,
            merge_fraction: 3,
            layout_columns: 3,
            layout_spacing: 200.0,
            layout_origin: 100.0,
            trigger_window_secs: 30,
            trigger_capacity: 10,
            trigger_history_limit: 20,
        }
    }
}

impl EngineConfig {
    /// Clamp a requested preferred table size into the allowed range.
    /// `None` yields the default.
    pub fn preferred_size(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_table_size)
            .clamp(self.min_preferred_size, self.max_table_capacity)
    }

    pub fn trigger_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.trigger_window_secs)
    }
}
