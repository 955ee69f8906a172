//! Machine Query Matching
//!
//! A query maps field names to expected values. Predicates combine with AND
//! unless the reserved `and` key is present and equals `"false"` (any case),
//! in which case they combine with OR.

use crate::observability::events;
use std::collections::BTreeMap;
use std::str::FromStr;
use strum::{Display, EnumString, IntoStaticStr};
use tinycluster_core::Machine;

/// Keys a query understands.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum QueryField {
    Mac,
    Name,
    Ipv4,
    /// Combination flag rather than a predicate
    And,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineQuery {
    fields: BTreeMap<QueryField, String>,
}

impl MachineQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`. Unknown keys are ignored and `false` is returned.
    pub fn insert(&mut self, key: &str, value: impl Into<String>) -> bool {
        match QueryField::from_str(key) {
            Ok(field) => {
                self.fields.insert(field, value.into());
                true
            }
            Err(_) => {
                events::query_key_ignored(key);
                false
            }
        }
    }

    pub fn with(mut self, field: QueryField, value: impl Into<String>) -> Self {
        self.fields.insert(field, value.into());
        self
    }

    /// Shorthand for `.with(QueryField::And, "false")`.
    pub fn any(self) -> Self {
        self.with(QueryField::And, "false")
    }

    pub fn get(&self, field: QueryField) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    pub fn is_conjunctive(&self) -> bool {
        !matches!(self.get(QueryField::And), Some(flag) if flag.eq_ignore_ascii_case("false"))
    }

    /// Whether `machine` satisfies the query. A query without predicates
    /// matches every machine.
    pub fn matches(&self, machine: &Machine) -> bool {
        let mut predicates = self
            .fields
            .iter()
            .filter_map(|(field, expected)| {
                let actual = match field {
                    QueryField::Mac => &machine.mac,
                    QueryField::Name => &machine.name,
                    QueryField::Ipv4 => &machine.ipv4_addr,
                    QueryField::And => return None,
                };
                Some(actual == expected)
            })
            .peekable();

        if predicates.peek().is_none() {
            return true;
        }
        if self.is_conjunctive() {
            predicates.all(|hit| hit)
        } else {
            predicates.any(|hit| hit)
        }
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for MachineQuery {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut query = Self::new();
        for (key, value) in iter {
            query.insert(key.as_ref(), value);
        }
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m1() -> Machine {
        Machine::new("m1mac", "m1", "10.0.0.1")
    }

    #[test]
    fn test_conjunctive_requires_every_field() {
        let query: MachineQuery = [("name", "m1"), ("mac", "bad")].into_iter().collect();
        assert!(!query.matches(&m1()));

        let query: MachineQuery = [("name", "m1"), ("mac", "m1mac")].into_iter().collect();
        assert!(query.matches(&m1()));
    }

    #[test]
    fn test_disjunctive_needs_one_field() {
        let query: MachineQuery = [("name", "m1"), ("mac", "bad"), ("and", "false")]
            .into_iter()
            .collect();
        assert!(query.matches(&m1()));

        let query = MachineQuery::new()
            .with(QueryField::Name, "x")
            .with(QueryField::Ipv4, "y")
            .any();
        assert!(!query.matches(&m1()));
    }

    #[test]
    fn test_and_flag_is_case_insensitive() {
        let query: MachineQuery = [("and", "FALSE")].into_iter().collect();
        assert!(!query.is_conjunctive());

        let query: MachineQuery = [("and", "no")].into_iter().collect();
        assert!(query.is_conjunctive());
    }

    #[test]
    fn test_every_field_is_evaluated() {
        // A failing predicate early in the map must not mask a later one
        let query = MachineQuery::new()
            .with(QueryField::Mac, "bad")
            .with(QueryField::Ipv4, "10.0.0.1")
            .any();
        assert!(query.matches(&m1()));

        let query = MachineQuery::new()
            .with(QueryField::Mac, "m1mac")
            .with(QueryField::Ipv4, "10.9.9.9");
        assert!(!query.matches(&m1()));
    }

    #[test]
    fn test_values_compare_exactly() {
        let query = MachineQuery::new().with(QueryField::Name, "M1");
        assert!(!query.matches(&m1()));
    }

    #[test]
    fn test_empty_query_matches_everything() {
        assert!(MachineQuery::new().matches(&m1()));
        assert!(MachineQuery::new().any().matches(&m1()));
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let mut query = MachineQuery::new();
        assert!(!query.insert("rack", "r1"));
        assert!(query.insert("ipv4", "10.0.0.1"));
        assert_eq!(query.get(QueryField::Ipv4), Some("10.0.0.1"));
        assert!(query.matches(&m1()));
    }
}
