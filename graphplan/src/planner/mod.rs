// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! The planning pipeline
//!
//! For each query part: leaf planning produces candidate access paths, join
//! enumeration combines them, the rewriter lowers subquery-shaped predicates,
//! the horizon planner appends the clause-boundary operators, and the picker
//! arbitrates every choice on cost. Parts chain head to tail; subqueries
//! recurse through the same pipeline with the outer scope as arguments.

mod config;
mod context;
mod error;

pub(crate) mod eagerness;
pub(crate) mod horizon;
pub(crate) mod idp;
pub(crate) mod leaf;
pub(crate) mod picker;
pub(crate) mod rewrite;
pub(crate) mod selection;

pub use config::{PlannerConfig, DEFAULT_CONFIG};
pub use context::PlanningContext;
pub use error::PlanningError;
pub use leaf::LeafPlanRestrictions;

use crate::catalog::{GraphStatistics, IndexCatalog};
use crate::ir::{Query, SingleQuery, Variable};
use crate::plan::{
    nested_plans_of, Operator, PlanArena, PlanDisplay, PlanId, PlanTrace, PlanningAttributes,
    PlanningPhase,
};
use crate::query_graph::{build_planner_query, PlannerQuery, QueryHorizon};
use eagerness::WriteState;
use serde::Serialize;
use std::collections::BTreeSet;

/// The planner: immutable oracles plus configuration. One instance plans
/// any number of queries; each compilation is independent and
/// single-threaded.
pub struct Planner<S, C> {
    statistics: S,
    indexes: C,
    config: PlannerConfig,
}

impl<S: GraphStatistics, C: IndexCatalog> Planner<S, C> {
    pub fn new(statistics: S, indexes: C, config: PlannerConfig) -> Self {
        Planner {
            statistics,
            indexes,
            config,
        }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Plans a query into an executable logical operator tree.
    pub fn plan(&self, query: &Query) -> Result<PlannedQuery, PlanningError> {
        self.plan_internal(query, false)
    }

    /// Like [`plan`](Self::plan), additionally recording a planning trace.
    pub fn plan_traced(&self, query: &Query) -> Result<PlannedQuery, PlanningError> {
        self.plan_internal(query, true)
    }

    fn plan_internal(
        &self,
        query: &Query,
        with_trace: bool,
    ) -> Result<PlannedQuery, PlanningError> {
        let mut ctx =
            PlanningContext::new(&self.statistics, &self.indexes, &self.config, with_trace);
        let (root, columns) = plan_query_with_arguments(&mut ctx, query, &BTreeSet::new())?;
        let solved = ctx.solved(root).clone();
        let root = if columns.is_empty() {
            // Updating query without a RETURN: runs for effect only.
            ctx.add_plan(Operator::EmptyResult { input: root }, solved)
        } else {
            ctx.add_plan(
                Operator::ProduceResults {
                    input: root,
                    columns: columns.clone(),
                },
                solved,
            )
        };
        ctx.record_trace(PlanningPhase::PlanSelection, "final plan", Some(root), 1);
        log::debug!(
            "planned query with {} operators, estimated rows {:.1}",
            ctx.arena.len(),
            ctx.cardinality(root).0
        );
        Ok(PlannedQuery {
            arena: ctx.arena,
            attributes: ctx.attributes,
            root,
            columns,
            trace: ctx.trace,
        })
    }
}

/// A fully planned query: the operator arena, its side tables, the root
/// handle, and the output columns in order.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedQuery {
    pub arena: PlanArena,
    pub attributes: PlanningAttributes,
    pub root: PlanId,
    pub columns: Vec<Variable>,
    pub trace: Option<PlanTrace>,
}

impl PlannedQuery {
    /// Renders the operator tree.
    pub fn display(&self) -> String {
        PlanDisplay {
            arena: &self.arena,
            root: self.root,
            attributes: None,
        }
        .to_string()
    }

    /// Renders the operator tree with cardinality and cost estimates.
    pub fn display_with_estimates(&self) -> String {
        PlanDisplay {
            arena: &self.arena,
            root: self.root,
            attributes: Some(&self.attributes),
        }
        .to_string()
    }

    pub fn operator(&self, id: PlanId) -> &Operator {
        self.arena.get(id)
    }

    /// All operators reachable from the root, nested plans included, in
    /// depth-first order.
    pub fn reachable_operators(&self) -> Vec<PlanId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            out.push(id);
            let op = self.arena.get(id);
            for child in op.children() {
                stack.push(child);
            }
            for nested in nested_plans_of(op) {
                stack.push(nested);
            }
        }
        out
    }

    /// Handles of every reachable operator with the given name.
    pub fn find_operators(&self, name: &str) -> Vec<PlanId> {
        self.reachable_operators()
            .into_iter()
            .filter(|id| self.arena.get(*id).name() == name)
            .collect()
    }

    pub fn contains_operator(&self, name: &str) -> bool {
        !self.find_operators(name).is_empty()
    }
}

/// Plans a query (possibly a union) with the given outer argument scope.
/// Returns the root plan and its output columns. Subquery planning re-enters
/// here recursively.
pub(crate) fn plan_query_with_arguments(
    ctx: &mut PlanningContext<'_>,
    query: &Query,
    arguments: &BTreeSet<Variable>,
) -> Result<(PlanId, Vec<Variable>), PlanningError> {
    match query {
        Query::Single(single) => plan_single_query(ctx, single, arguments),
        Query::Union { lhs, rhs, all } => {
            let (left, left_columns) = plan_query_with_arguments(ctx, lhs, arguments)?;
            let (right, right_columns) = plan_single_query(ctx, rhs, arguments)?;
            if left_columns != right_columns {
                return Err(PlanningError::InvalidQuery(format!(
                    "UNION sides must produce the same columns, found {:?} and {:?}",
                    left_columns, right_columns
                )));
            }
            let solved = ctx.solved(left).union(ctx.solved(right));
            let union = ctx.add_plan(
                Operator::Union {
                    lhs: left,
                    rhs: right,
                    // Plain UNION deduplicates; UNION ALL concatenates.
                    distinct: !*all,
                },
                solved,
            );
            Ok((union, left_columns))
        }
    }
}

fn plan_single_query(
    ctx: &mut PlanningContext<'_>,
    single: &SingleQuery,
    arguments: &BTreeSet<Variable>,
) -> Result<(PlanId, Vec<Variable>), PlanningError> {
    let planner_query = build_planner_query(single, &mut ctx.anon, arguments)?;
    ctx.record_trace(
        PlanningPhase::QueryGraphConstruction,
        format!("{} parts", planner_query.parts().len()),
        None,
        0,
    );

    let mut state = WriteState::new();
    let mut plan: Option<PlanId> = None;
    for part in planner_query.parts() {
        plan = Some(plan_part(ctx, part, plan, &mut state)?);
    }
    let plan = plan.ok_or_else(|| {
        PlanningError::InvariantViolation("query normalized to zero parts".into())
    })?;
    Ok((plan, final_columns(&planner_query)))
}

fn final_columns(planner_query: &PlannerQuery) -> Vec<Variable> {
    let last = planner_query
        .parts()
        .into_iter()
        .next_back()
        .expect("at least one part");
    match &last.horizon {
        QueryHorizon::Projection(h) => h.items.iter().map(|i| i.alias.clone()).collect(),
        QueryHorizon::Aggregation(h) => h
            .grouping
            .iter()
            .chain(&h.aggregations)
            .map(|i| i.alias.clone())
            .collect(),
        _ => Vec::new(),
    }
}

/// Plans one query part on top of the incoming plan: conflict barriers,
/// pattern, remaining predicates, then the horizon.
fn plan_part(
    ctx: &mut PlanningContext<'_>,
    part: &PlannerQuery,
    input: Option<PlanId>,
    state: &mut WriteState,
) -> Result<PlanId, PlanningError> {
    let qg = &part.query_graph;

    let mut incoming = input;
    if state.has_writes() {
        let reads = eagerness::part_reads(part);
        let reasons = eagerness::conflict_reasons(state, &reads);
        if let (Some(plan), false) = (incoming, reasons.is_empty()) {
            ctx.record_trace(
                PlanningPhase::EagernessAnalysis,
                format!("{:?}", reasons),
                None,
                0,
            );
            incoming = Some(eagerness::apply_barrier(ctx, plan, reasons));
        }
    }

    let plan = match incoming {
        None => {
            let pattern = idp::plan_pattern(ctx, qg)?;
            rewrite::solve_predicates(ctx, qg, pattern)?
        }
        Some(lhs) if qg.is_pattern_empty() => lhs,
        Some(lhs) => {
            let rhs = idp::plan_pattern(ctx, qg)?;
            let rhs = rewrite::solve_predicates(ctx, qg, rhs)?;
            let correlated = qg.argument_ids.iter().any(|arg| {
                qg.pattern_nodes.contains(arg)
                    || qg
                        .selections
                        .iter()
                        .any(|s| s.dependencies.contains(arg))
                    || qg
                        .optional_matches
                        .iter()
                        .any(|o| o.argument_ids.contains(arg))
            });
            let solved = ctx.solved(lhs).union(ctx.solved(rhs));
            if correlated {
                ctx.add_plan(Operator::Apply { lhs, rhs }, solved)
            } else {
                ctx.add_plan(Operator::CartesianProduct { lhs, rhs }, solved)
            }
        }
    };

    horizon::plan_horizon(ctx, plan, part, state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InMemoryIndexCatalog, InMemoryStatistics};
    use crate::ir::{Clause, Expression, NodePattern, PathPattern, ProjectionItem};

    fn simple_planner() -> Planner<InMemoryStatistics, InMemoryIndexCatalog> {
        Planner::new(
            InMemoryStatistics::new(1_000.0, 2_000.0).with_label("Person", 100.0),
            InMemoryIndexCatalog::new(),
            PlannerConfig::default(),
        )
    }

    fn match_return(pattern: PathPattern, items: Vec<ProjectionItem>) -> Query {
        Query::single(vec![
            Clause::Match {
                optional: false,
                patterns: vec![pattern],
                hints: Vec::new(),
                predicate: None,
            },
            Clause::Return {
                distinct: false,
                items,
                order_by: Vec::new(),
                skip: None,
                limit: None,
            },
        ])
    }

    #[test]
    fn plans_a_minimal_match_return() {
        let planner = simple_planner();
        let query = match_return(
            PathPattern::node(NodePattern::named("a")),
            vec![ProjectionItem::new(Expression::var("a"), "a")],
        );
        let planned = planner.plan(&query).unwrap();
        assert!(planned.contains_operator("AllNodesScan"));
        assert!(planned.contains_operator("ProduceResults"));
        assert_eq!(planned.columns, vec![Variable::new("a")]);
    }

    #[test]
    fn label_scan_wins_over_full_scan_for_labelled_node() {
        let planner = simple_planner();
        let query = match_return(
            PathPattern::node(NodePattern::named("p").with_label("Person")),
            vec![ProjectionItem::new(Expression::var("p"), "p")],
        );
        let planned = planner.plan(&query).unwrap();
        assert!(planned.contains_operator("NodeByLabelScan"));
        assert!(!planned.contains_operator("AllNodesScan"));
    }

    #[test]
    fn union_requires_aligned_columns() {
        let planner = simple_planner();
        let lhs = match_return(
            PathPattern::node(NodePattern::named("a")),
            vec![ProjectionItem::new(Expression::var("a"), "x")],
        );
        let Query::Single(rhs) = match_return(
            PathPattern::node(NodePattern::named("b")),
            vec![ProjectionItem::new(Expression::var("b"), "y")],
        ) else {
            unreachable!()
        };
        let union = Query::Union {
            lhs: Box::new(lhs),
            rhs,
            all: false,
        };
        assert!(matches!(
            planner.plan(&union),
            Err(PlanningError::InvalidQuery(_))
        ));
    }
}
