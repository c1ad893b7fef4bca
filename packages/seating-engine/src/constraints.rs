use std::collections::{HashMap, HashSet};

use crate::model::Preferences;

/// Lookup structure for `cannotSitTogether` rules.
#[derive(Debug, Default, Clone)]
pub struct ConstraintIndex {
    separated: HashMap<String, HashSet<String>>,
}

impl ConstraintIndex {
    pub fn from_preferences(prefs: &Preferences) -> Self {
        let mut separated: HashMap<String, HashSet<String>> = HashMap::new();
        for rule in &prefs.cannot_sit_together {
            if rule.guest_a == rule.guest_b {
                continue;
            }
            separated
                .entry(rule.guest_a.clone())
                .or_default()
                .insert(rule.guest_b.clone());
            separated
                .entry(rule.guest_b.clone())
                .or_default()
                .insert(rule.guest_a.clone());
        }
        Self { separated }
    }

    pub fn must_separate(&self, a: &str, b: &str) -> bool {
        self.separated.get(a).is_some_and(|others| others.contains(b))
    }

    /// True iff a candidate has a separation rule against someone already
    /// seated at the table.
    pub fn has_separation_conflict(&self, candidates: &[&str], seated: &[String]) -> bool {
        candidates.iter().any(|c| match self.separated.get(*c) {
            Some(others) => seated.iter().any(|s| others.contains(s)),
            None => false,
        })
    }

    /// True iff two candidates of the same batch must be kept apart.
    pub fn conflicts_within(&self, candidates: &[&str]) -> bool {
        candidates.iter().enumerate().any(|(i, a)| {
            candidates[i + 1..].iter().any(|b| self.must_separate(a, b))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.separated.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PairRule;

    fn index() -> ConstraintIndex {
        let prefs = Preferences {
            cannot_sit_together: vec![PairRule::new("ann", "bob"), PairRule::new("cy", "cy")],
            ..Default::default()
        };
        ConstraintIndex::from_preferences(&prefs)
    }

    #[test]
    fn separation_is_symmetric() {
        let idx = index();
        assert!(idx.must_separate("ann", "bob"));
        assert!(idx.must_separate("bob", "ann"));
        assert!(!idx.must_separate("ann", "cy"));
    }

    #[test]
    fn detects_conflict_with_seated_guest() {
        let idx = index();
        let seated = vec!["bob".to_string(), "dee".to_string()];
        assert!(idx.has_separation_conflict(&["ann"], &seated));
        assert!(!idx.has_separation_conflict(&["dee", "cy"], &seated));
        assert!(!idx.has_separation_conflict(&["ann"], &[]));
    }

    #[test]
    fn detects_conflict_inside_batch() {
        let idx = index();
        assert!(idx.conflicts_within(&["cy", "bob", "ann"]));
        assert!(!idx.conflicts_within(&["cy", "ann"]));
    }

    #[test]
    fn self_rules_are_ignored() {
        assert!(!index().must_separate("cy", "cy"));
    }
}
