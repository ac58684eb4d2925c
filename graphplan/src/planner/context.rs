// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Planning context
//!
//! Everything one compilation needs, passed explicitly through the pipeline:
//! the statistics and index oracles, the plan arena with its side tables,
//! the anonymous-variable generator, and the optional trace. There is no
//! global state; recursive sub-planning borrows the same context.

use crate::catalog::{GraphStatistics, IndexCatalog};
use crate::ir::Variable;
use crate::plan::{
    Cardinality, Cost, CostModel, Operator, PlanArena, PlanId, PlanTrace, PlanningAttributes,
    PlanningPhase, SolvedParts,
};
use crate::planner::PlannerConfig;
use crate::query_graph::AnonymousVariableGenerator;
use std::collections::BTreeSet;

/// Mutable state of one query compilation.
pub struct PlanningContext<'a> {
    pub statistics: &'a dyn GraphStatistics,
    pub indexes: &'a dyn IndexCatalog,
    pub config: &'a PlannerConfig,
    pub arena: PlanArena,
    pub attributes: PlanningAttributes,
    pub anon: AnonymousVariableGenerator,
    pub trace: Option<PlanTrace>,
}

impl<'a> PlanningContext<'a> {
    pub fn new(
        statistics: &'a dyn GraphStatistics,
        indexes: &'a dyn IndexCatalog,
        config: &'a PlannerConfig,
        with_trace: bool,
    ) -> Self {
        PlanningContext {
            statistics,
            indexes,
            config,
            arena: PlanArena::new(),
            attributes: PlanningAttributes::new(),
            anon: AnonymousVariableGenerator::new(),
            trace: with_trace.then(PlanTrace::new),
        }
    }

    /// Allocates an operator, records its solved parts, and estimates its
    /// cardinality and cost from its children's recorded estimates.
    pub fn add_plan(&mut self, op: Operator, solved: SolvedParts) -> PlanId {
        let id = self.arena.push(op);
        let model = CostModel::new(self.statistics, self.config);
        let (cardinality, cost) = model.estimate(&self.arena, &self.attributes, id);
        self.attributes.set_solved(id, solved);
        self.attributes.set_cardinality(id, cardinality);
        self.attributes.set_cost(id, cost);
        id
    }

    pub fn solved(&self, id: PlanId) -> &SolvedParts {
        self.attributes.solved(id)
    }

    pub fn cardinality(&self, id: PlanId) -> Cardinality {
        self.attributes.cardinality(id)
    }

    pub fn cost(&self, id: PlanId) -> Cost {
        self.attributes.cost(id)
    }

    pub fn available(&self, id: PlanId) -> BTreeSet<Variable> {
        self.arena.available_symbols(id)
    }

    pub fn record_trace(
        &mut self,
        phase: PlanningPhase,
        detail: impl Into<String>,
        chosen: Option<PlanId>,
        candidates: usize,
    ) {
        if let Some(trace) = &mut self.trace {
            trace.record(phase, detail, chosen, candidates);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InMemoryIndexCatalog, InMemoryStatistics};
    use once_cell::sync::Lazy;

    static STATS: Lazy<InMemoryStatistics> = Lazy::new(|| InMemoryStatistics::new(100.0, 50.0));
    static INDEXES: Lazy<InMemoryIndexCatalog> = Lazy::new(InMemoryIndexCatalog::new);
    static CONFIG: Lazy<PlannerConfig> = Lazy::new(PlannerConfig::default);

    #[test]
    fn add_plan_records_all_three_attributes() {
        let mut ctx = PlanningContext::new(&*STATS, &*INDEXES, &*CONFIG, false);
        let id = ctx.add_plan(
            Operator::AllNodesScan {
                node: Variable::new("n"),
                arguments: BTreeSet::new(),
            },
            SolvedParts::for_node(Variable::new("n")),
        );
        assert_eq!(ctx.cardinality(id).0, 100.0);
        assert!(ctx.cost(id).0 > 0.0);
        assert!(ctx.solved(id).pattern_nodes.contains(&Variable::new("n")));
    }
}
