// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Plan arena and per-plan side tables
//!
//! Operators are allocated into an arena and addressed by stable integer
//! handles. Metadata (solved parts, cardinality, cost) lives in side tables
//! keyed by handle: plans are compared structurally elsewhere, but every
//! constructed operator keeps its own metadata record.

use crate::plan::operator::Operator;
use crate::plan::solved::SolvedParts;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Stable handle of one operator in a [`PlanArena`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PlanId(pub u32);

impl PlanId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Estimated output row count of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cardinality(pub f64);

impl Cardinality {
    pub const SINGLE: Cardinality = Cardinality(1.0);

    pub fn amount(self) -> f64 {
        self.0.max(0.0)
    }

    pub fn cmp_total(self, other: Cardinality) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Estimated total work of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cost(pub f64);

impl Cost {
    pub fn cmp_total(self, other: Cost) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Arena of operators for one planning run.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PlanArena {
    ops: Vec<Operator>,
}

impl PlanArena {
    pub fn new() -> Self {
        PlanArena::default()
    }

    pub fn push(&mut self, op: Operator) -> PlanId {
        let id = PlanId(self.ops.len() as u32);
        self.ops.push(op);
        id
    }

    pub fn get(&self, id: PlanId) -> &Operator {
        &self.ops[id.index()]
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PlanId, &Operator)> {
        self.ops
            .iter()
            .enumerate()
            .map(|(i, op)| (PlanId(i as u32), op))
    }
}

/// Write-once metadata per plan handle.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PlanningAttributes {
    solveds: Vec<Option<SolvedParts>>,
    cardinalities: Vec<Option<Cardinality>>,
    costs: Vec<Option<Cost>>,
}

impl PlanningAttributes {
    pub fn new() -> Self {
        PlanningAttributes::default()
    }

    fn slot<T>(table: &mut Vec<Option<T>>, id: PlanId) -> &mut Option<T> {
        if table.len() <= id.index() {
            table.resize_with(id.index() + 1, || None);
        }
        &mut table[id.index()]
    }

    pub fn set_solved(&mut self, id: PlanId, solved: SolvedParts) {
        let slot = Self::slot(&mut self.solveds, id);
        debug_assert!(slot.is_none(), "solved recorded twice for {}", id);
        *slot = Some(solved);
    }

    pub fn set_cardinality(&mut self, id: PlanId, cardinality: Cardinality) {
        let slot = Self::slot(&mut self.cardinalities, id);
        debug_assert!(slot.is_none(), "cardinality recorded twice for {}", id);
        *slot = Some(cardinality);
    }

    pub fn set_cost(&mut self, id: PlanId, cost: Cost) {
        let slot = Self::slot(&mut self.costs, id);
        debug_assert!(slot.is_none(), "cost recorded twice for {}", id);
        *slot = Some(cost);
    }

    pub fn solved(&self, id: PlanId) -> &SolvedParts {
        self.solveds
            .get(id.index())
            .and_then(|s| s.as_ref())
            .unwrap_or_else(|| SolvedParts::empty_ref())
    }

    pub fn cardinality(&self, id: PlanId) -> Cardinality {
        self.cardinalities
            .get(id.index())
            .and_then(|c| *c)
            .unwrap_or(Cardinality::SINGLE)
    }

    pub fn cost(&self, id: PlanId) -> Cost {
        self.costs
            .get(id.index())
            .and_then(|c| *c)
            .unwrap_or(Cost(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Variable;
    use std::collections::BTreeSet;

    #[test]
    fn arena_hands_out_sequential_ids() {
        let mut arena = PlanArena::new();
        let a = arena.push(Operator::Argument {
            arguments: BTreeSet::new(),
        });
        let b = arena.push(Operator::AllNodesScan {
            node: Variable::new("n"),
            arguments: BTreeSet::new(),
        });
        assert_eq!(a, PlanId(0));
        assert_eq!(b, PlanId(1));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn attributes_default_when_missing() {
        let attrs = PlanningAttributes::new();
        assert_eq!(attrs.cardinality(PlanId(5)).0, 1.0);
        assert_eq!(attrs.cost(PlanId(5)).0, 0.0);
    }

    #[test]
    fn cost_ordering_is_total() {
        assert_eq!(Cost(1.0).cmp_total(Cost(2.0)), Ordering::Less);
        assert_eq!(Cost(2.0).cmp_total(Cost(2.0)), Ordering::Equal);
    }
}
