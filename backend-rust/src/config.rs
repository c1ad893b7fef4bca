use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use seating_engine::EngineConfig;
use tracing::warn;

// ─── Service Configuration ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// JSON snapshot of every plan and guest roster
    pub state_file: PathBuf,
    /// Append-only SHA-256 chained audit log (JSON lines)
    pub audit_log: PathBuf,
    /// Upper bound on one generation run
    pub generation_timeout: Duration,
    pub engine: EngineConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            state_file: PathBuf::from("state.json"),
            audit_log: PathBuf::from("audit.jsonl"),
            generation_timeout: Duration::from_millis(10_000),
            engine: EngineConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source. Unparseable values fall back to the
    /// default with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let mut engine = defaults.engine.clone();
        engine.default_table_size = parsed(&lookup, "SEATING_DEFAULT_TABLE_SIZE", engine.default_table_size);
        engine.trigger_window_secs = parsed(&lookup, "SEATING_TRIGGER_WINDOW_SECS", engine.trigger_window_secs);
        engine.trigger_capacity = parsed(&lookup, "SEATING_TRIGGER_CAPACITY", engine.trigger_capacity);

        let timeout_ms = parsed(
            &lookup,
            "SEATING_GENERATION_TIMEOUT_MS",
            defaults.generation_timeout.as_millis() as u64,
        );

        Self {
            port: parsed(&lookup, "PORT", defaults.port),
            state_file: lookup("SEATING_STATE_FILE").map(PathBuf::from).unwrap_or(defaults.state_file),
            audit_log: lookup("SEATING_AUDIT_LOG").map(PathBuf::from).unwrap_or(defaults.audit_log),
            generation_timeout: Duration::from_millis(timeout_ms),
            engine,
        }
    }
}

fn parsed<T: FromStr + Copy>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring {key}={raw:?}: not a valid value");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let cfg = AppConfig::from_lookup(|_| None);
        assert_eq!(cfg.port, 3001);
        assert_eq!(cfg.state_file, PathBuf::from("state.json"));
        assert_eq!(cfg.generation_timeout, Duration::from_secs(10));
        assert_eq!(cfg.engine, EngineConfig::default());
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = AppConfig::from_lookup(lookup_from(&[
            ("PORT", "8080"),
            ("SEATING_AUDIT_LOG", "/tmp/audit.jsonl"),
            ("SEATING_GENERATION_TIMEOUT_MS", "250"),
            ("SEATING_DEFAULT_TABLE_SIZE", "8"),
            ("SEATING_TRIGGER_WINDOW_SECS", "5"),
            ("SEATING_TRIGGER_CAPACITY", "4"),
        ]));
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.audit_log, PathBuf::from("/tmp/audit.jsonl"));
        assert_eq!(cfg.generation_timeout, Duration::from_millis(250));
        assert_eq!(cfg.engine.default_table_size, 8);
        assert_eq!(cfg.engine.trigger_window_secs, 5);
        assert_eq!(cfg.engine.trigger_capacity, 4);
    }

    #[test]
    fn garbage_falls_back_to_default() {
        let cfg = AppConfig::from_lookup(lookup_from(&[("PORT", "not-a-port")]));
        assert_eq!(cfg.port, 3001);
    }
}
