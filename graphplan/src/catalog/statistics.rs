// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Cardinality statistics oracle
//!
//! All estimates are f64 row counts against one statistics snapshot. The
//! oracle must be pure: identical inputs yield identical answers for the
//! lifetime of a snapshot, which is what makes planning reproducible.

use crate::catalog::indexes::IndexDescriptor;
use std::collections::BTreeMap;

/// The kind of predicate an index lookup would solve, used when asking the
/// oracle for index selectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPredicateKind {
    Equality,
    Range,
    Prefix,
    TextContains,
    TextEndsWith,
    Existence,
}

/// Cardinality and selectivity estimates for one statistics snapshot.
///
/// A `None` answer means the statistic is unknown; callers fall back to
/// configured defaults and never fail compilation over a miss.
pub trait GraphStatistics {
    fn all_nodes_cardinality(&self) -> f64;

    fn all_relationships_cardinality(&self) -> f64;

    fn label_cardinality(&self, label: &str) -> Option<f64>;

    /// Estimated count of relationships matching `(:from)-[:rel_type]->(:to)`
    /// where any component may be unconstrained.
    fn relationship_cardinality(
        &self,
        from_label: Option<&str>,
        rel_type: Option<&str>,
        to_label: Option<&str>,
    ) -> Option<f64>;

    /// Fraction of rows surviving one indexed predicate, in `0.0..=1.0`.
    fn index_selectivity(
        &self,
        index: &IndexDescriptor,
        predicate: IndexPredicateKind,
    ) -> Option<f64>;
}

/// In-memory statistics snapshot, used in tests and by embedders that
/// collect their own counts.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStatistics {
    all_nodes: f64,
    all_relationships: f64,
    label_counts: BTreeMap<String, f64>,
    relationship_counts: BTreeMap<String, f64>,
    index_selectivities: BTreeMap<String, f64>,
}

impl InMemoryStatistics {
    pub fn new(all_nodes: f64, all_relationships: f64) -> Self {
        InMemoryStatistics {
            all_nodes,
            all_relationships,
            ..Default::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>, count: f64) -> Self {
        self.label_counts.insert(label.into(), count);
        self
    }

    pub fn with_relationship_type(mut self, rel_type: impl Into<String>, count: f64) -> Self {
        self.relationship_counts.insert(rel_type.into(), count);
        self
    }

    pub fn with_index_selectivity(
        mut self,
        index: &IndexDescriptor,
        selectivity: f64,
    ) -> Self {
        self.index_selectivities
            .insert(index.identity(), selectivity);
        self
    }
}

impl GraphStatistics for InMemoryStatistics {
    fn all_nodes_cardinality(&self) -> f64 {
        self.all_nodes
    }

    fn all_relationships_cardinality(&self) -> f64 {
        self.all_relationships
    }

    fn label_cardinality(&self, label: &str) -> Option<f64> {
        self.label_counts.get(label).copied()
    }

    fn relationship_cardinality(
        &self,
        from_label: Option<&str>,
        rel_type: Option<&str>,
        to_label: Option<&str>,
    ) -> Option<f64> {
        let base = match rel_type {
            Some(t) => self.relationship_counts.get(t).copied()?,
            None => self.all_relationships,
        };
        // Endpoint labels scale the estimate by the labelled fraction of the
        // node population, assuming independence.
        let mut estimate = base;
        for label in [from_label, to_label].into_iter().flatten() {
            let label_count = self.label_cardinality(label)?;
            if self.all_nodes > 0.0 {
                estimate *= (label_count / self.all_nodes).min(1.0);
            }
        }
        Some(estimate)
    }

    fn index_selectivity(
        &self,
        index: &IndexDescriptor,
        _predicate: IndexPredicateKind,
    ) -> Option<f64> {
        self.index_selectivities.get(&index.identity()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::indexes::{IndexEntity, IndexType};

    #[test]
    fn relationship_estimate_scales_by_endpoint_labels() {
        let stats = InMemoryStatistics::new(100.0, 1000.0)
            .with_label("Person", 50.0)
            .with_relationship_type("KNOWS", 400.0);

        assert_eq!(
            stats.relationship_cardinality(None, Some("KNOWS"), None),
            Some(400.0)
        );
        assert_eq!(
            stats.relationship_cardinality(Some("Person"), Some("KNOWS"), None),
            Some(200.0)
        );
        // Unknown label is a miss, not a failure.
        assert_eq!(
            stats.relationship_cardinality(Some("Robot"), Some("KNOWS"), None),
            None
        );
    }

    #[test]
    fn index_selectivity_is_keyed_by_descriptor_identity() {
        let index = IndexDescriptor::new(
            IndexEntity::NodeLabel("Person".into()),
            vec!["name".into()],
            IndexType::Range,
        );
        let stats = InMemoryStatistics::new(100.0, 0.0).with_index_selectivity(&index, 0.01);
        assert_eq!(
            stats.index_selectivity(&index, IndexPredicateKind::Equality),
            Some(0.01)
        );
    }
}
