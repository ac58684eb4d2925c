// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Solved-parts descriptors
//!
//! Every plan records which portion of the original query it already
//! satisfies. Downstream planning queries this record instead of re-deriving
//! it from the plan's shape, and uses it to avoid solving anything twice.

use crate::ir::{Expression, PlanHint, Variable};
use crate::query_graph::Predicate;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What one plan has solved so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolvedParts {
    pub arguments: BTreeSet<Variable>,
    pub pattern_nodes: BTreeSet<Variable>,
    /// Names of solved connections (relationships, quantified paths).
    pub connections: BTreeSet<Variable>,
    pub predicates: Vec<Predicate>,
    pub hints: Vec<PlanHint>,
    /// The last horizon this plan committed to, when any.
    pub horizon: Option<SolvedHorizon>,
}

static EMPTY: Lazy<SolvedParts> = Lazy::new(SolvedParts::default);

impl SolvedParts {
    pub fn empty() -> Self {
        SolvedParts::default()
    }

    pub fn empty_ref() -> &'static SolvedParts {
        &EMPTY
    }

    pub fn for_arguments(arguments: BTreeSet<Variable>) -> Self {
        SolvedParts {
            arguments,
            ..SolvedParts::default()
        }
    }

    pub fn for_node(node: Variable) -> Self {
        SolvedParts {
            pattern_nodes: [node].into_iter().collect(),
            ..SolvedParts::default()
        }
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Merges two solved records (join/expand composition). The horizon of
    /// `other` wins when both are set; horizons are solved left to right.
    pub fn union(&self, other: &SolvedParts) -> SolvedParts {
        let mut out = self.clone();
        out.arguments.extend(other.arguments.iter().cloned());
        out.pattern_nodes.extend(other.pattern_nodes.iter().cloned());
        out.connections.extend(other.connections.iter().cloned());
        for predicate in &other.predicates {
            if !out.covers_predicate(&predicate.expression) {
                out.predicates.push(predicate.clone());
            }
        }
        out.hints.extend(other.hints.iter().cloned());
        if other.horizon.is_some() {
            out.horizon = other.horizon.clone();
        }
        out
    }

    /// True when a structurally equal predicate was already solved.
    pub fn covers_predicate(&self, expression: &Expression) -> bool {
        self.predicates.iter().any(|p| p.expression == *expression)
    }

    pub fn covers_connection(&self, name: &Variable) -> bool {
        self.connections.contains(name)
    }
}

/// The projection/aggregation map a horizon plan commits to, declared even
/// when no physical operator was needed for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SolvedHorizon {
    Projection {
        items: Vec<(Variable, Expression)>,
        distinct: bool,
    },
    Aggregation {
        grouping: Vec<(Variable, Expression)>,
        aggregations: Vec<(Variable, Expression)>,
    },
    Unwind {
        variable: Variable,
    },
    LoadCsv {
        variable: Variable,
    },
    CallSubquery,
    Updates,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_deduplicates_predicates() {
        let p = Predicate::new(Expression::eq(
            Expression::property("a", "x"),
            Expression::integer(1),
        ));
        let left = SolvedParts::for_node(Variable::new("a")).with_predicate(p.clone());
        let right = SolvedParts::for_node(Variable::new("b")).with_predicate(p.clone());
        let merged = left.union(&right);
        assert_eq!(merged.predicates.len(), 1);
        assert_eq!(merged.pattern_nodes.len(), 2);
    }
}
