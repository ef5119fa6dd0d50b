//! Metadata filtering for vector store operations
//!
//! Group-scoped access is enforced purely by equality filters on metadata;
//! the store never partitions physically. Only equality conditions exist,
//! combined by AND/OR groups.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single equality condition on a metadata key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub key: String,
    pub value: String,
}

impl FilterCondition {
    pub fn eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Logical connector for condition groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterConnector {
    And,
    Or,
}

/// A metadata predicate: one condition or a connected group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataFilter {
    Condition(FilterCondition),
    Group {
        connector: FilterConnector,
        filters: Vec<MetadataFilter>,
    },
}

impl MetadataFilter {
    /// Single equality condition.
    pub fn eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Condition(FilterCondition::eq(key, value))
    }

    pub fn and(filters: Vec<MetadataFilter>) -> Self {
        Self::Group {
            connector: FilterConnector::And,
            filters,
        }
    }

    pub fn or(filters: Vec<MetadataFilter>) -> Self {
        Self::Group {
            connector: FilterConnector::Or,
            filters,
        }
    }

    /// OR-of-equality over a key, one condition per value.
    pub fn any_of<I, S>(key: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::or(
            values
                .into_iter()
                .map(|v| Self::eq(key, v))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Condition(_) => false,
            Self::Group { filters, .. } => filters.iter().all(|f| f.is_empty()),
        }
    }

    /// Evaluate the predicate against a node's metadata. An empty group
    /// matches nothing.
    pub fn matches(&self, metadata: &BTreeMap<String, String>) -> bool {
        match self {
            Self::Condition(c) => metadata.get(&c.key).is_some_and(|v| *v == c.value),
            Self::Group { connector, filters } => {
                if filters.is_empty() {
                    return false;
                }
                match connector {
                    FilterConnector::And => filters.iter().all(|f| f.matches(metadata)),
                    FilterConnector::Or => filters.iter().any(|f| f.matches(metadata)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_eq_condition() {
        let filter = MetadataFilter::eq("group_id", "g1");
        assert!(filter.matches(&meta(&[("group_id", "g1")])));
        assert!(!filter.matches(&meta(&[("group_id", "g2")])));
        assert!(!filter.matches(&meta(&[])));
    }

    #[test]
    fn test_and_group() {
        let filter = MetadataFilter::and(vec![
            MetadataFilter::eq("group_id", "g1"),
            MetadataFilter::eq("file_id", "f1"),
        ]);
        assert!(filter.matches(&meta(&[("group_id", "g1"), ("file_id", "f1")])));
        assert!(!filter.matches(&meta(&[("group_id", "g1"), ("file_id", "f2")])));
    }

    #[test]
    fn test_any_of_or_group() {
        let filter = MetadataFilter::any_of("group_id", ["g1", "g2"]);
        assert!(filter.matches(&meta(&[("group_id", "g2")])));
        assert!(!filter.matches(&meta(&[("group_id", "g3")])));
    }

    #[test]
    fn test_empty_group_matches_nothing() {
        let filter = MetadataFilter::or(vec![]);
        assert!(filter.is_empty());
        assert!(!filter.matches(&meta(&[("group_id", "g1")])));
    }
}
