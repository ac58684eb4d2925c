// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Residual predicate application
//!
//! Predicates that no access path consumed become Selection operators. The
//! conjunct order inside one Selection ranks the most selective predicate
//! first, judged by the label cardinalities recorded for the variables the
//! predicate touches; the information was gathered during query-graph
//! construction, not recomputed here.

use crate::plan::{Operator, PlanId, SolvedParts};
use crate::planner::PlanningContext;
use crate::query_graph::{Predicate, QueryGraph};

/// Applies every not-yet-solved plain predicate that has all dependencies
/// bound at `plan`. Subquery-shaped predicates are left for the rewriter.
pub fn apply_ready_predicates(
    ctx: &mut PlanningContext<'_>,
    plan: PlanId,
    qg: &QueryGraph,
) -> PlanId {
    let available = ctx.available(plan);
    let solved = ctx.solved(plan);
    let ready: Vec<Predicate> = qg
        .selections
        .iter()
        .filter(|p| {
            !solved.covers_predicate(&p.expression)
                && !p.expression.contains_subquery_construct()
                && p.is_solvable(&available)
        })
        .cloned()
        .collect();
    plan_selection(ctx, plan, ready, qg)
}

/// Emits one Selection solving `predicates`, ordered by ascending
/// per-variable selectivity. No-op for an empty set.
pub fn plan_selection(
    ctx: &mut PlanningContext<'_>,
    plan: PlanId,
    predicates: Vec<Predicate>,
    qg: &QueryGraph,
) -> PlanId {
    if predicates.is_empty() {
        return plan;
    }
    let mut ranked: Vec<(f64, usize, Predicate)> = predicates
        .into_iter()
        .enumerate()
        .map(|(i, p)| (selectivity_rank(ctx, &p, qg), i, p))
        .collect();
    // Most selective first; input order breaks ties so the result is stable.
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    let ordered: Vec<Predicate> = ranked.into_iter().map(|(_, _, p)| p).collect();
    let mut solved = ctx.solved(plan).clone();
    for p in &ordered {
        if !solved.covers_predicate(&p.expression) {
            solved.predicates.push(p.clone());
        }
    }
    ctx.add_plan(
        Operator::Selection {
            input: plan,
            predicates: ordered.iter().map(|p| p.expression.clone()).collect(),
        },
        solved,
    )
}

/// Smallest known cardinality among the predicate's variables: predicates on
/// rarer variables filter earlier.
fn selectivity_rank(ctx: &PlanningContext<'_>, predicate: &Predicate, qg: &QueryGraph) -> f64 {
    let mut rank = f64::MAX;
    for dep in &predicate.dependencies {
        let labels = qg.known_labels(dep);
        if labels.is_empty() {
            rank = rank.min(ctx.statistics.all_nodes_cardinality());
            continue;
        }
        for label in labels {
            let cardinality = ctx
                .statistics
                .label_cardinality(&label)
                .unwrap_or_else(|| {
                    ctx.statistics.all_nodes_cardinality() * ctx.config.unknown_label_fraction
                });
            rank = rank.min(cardinality);
        }
    }
    rank
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InMemoryIndexCatalog, InMemoryStatistics};
    use crate::ir::{Expression, Variable};
    use crate::plan::{Operator, SolvedParts};
    use crate::planner::PlannerConfig;
    use std::collections::BTreeSet;

    #[test]
    fn conjuncts_are_ordered_by_ascending_cardinality() {
        let stats = InMemoryStatistics::new(1_000.0, 0.0)
            .with_label("Rare", 1.0)
            .with_label("Mid", 10.0)
            .with_label("Common", 100.0);
        let indexes = InMemoryIndexCatalog::new();
        let config = PlannerConfig::default();
        let mut ctx = PlanningContext::new(&stats, &indexes, &config, false);

        let mut qg = QueryGraph::empty();
        for (var, label) in [("c", "Common"), ("a", "Rare"), ("b", "Mid")] {
            qg.pattern_nodes.insert(Variable::new(var));
            qg.selections.push(Predicate::new(Expression::has_labels(
                var,
                vec![label.to_string()],
            )));
        }
        let predicates: Vec<Predicate> = ["c", "a", "b"]
            .iter()
            .map(|v| {
                Predicate::new(Expression::eq(
                    Expression::property(*v, "x"),
                    Expression::integer(1),
                ))
            })
            .collect();

        let arg = ctx.add_plan(
            Operator::Argument {
                arguments: ["a", "b", "c"].iter().map(|v| Variable::new(*v)).collect(),
            },
            SolvedParts::empty(),
        );
        let selected = plan_selection(&mut ctx, arg, predicates, &qg);

        match ctx.arena.get(selected) {
            Operator::Selection { predicates, .. } => {
                let order: Vec<String> = predicates
                    .iter()
                    .map(|p| p.dependencies().iter().next().unwrap().name().to_string())
                    .collect();
                assert_eq!(order, vec!["a", "b", "c"]);
            }
            other => panic!("expected Selection, found {}", other.name()),
        }
    }

    #[test]
    fn empty_predicate_set_is_a_no_op() {
        let stats = InMemoryStatistics::new(10.0, 0.0);
        let indexes = InMemoryIndexCatalog::new();
        let config = PlannerConfig::default();
        let mut ctx = PlanningContext::new(&stats, &indexes, &config, false);
        let arg = ctx.add_plan(
            Operator::Argument {
                arguments: BTreeSet::new(),
            },
            SolvedParts::empty(),
        );
        assert_eq!(plan_selection(&mut ctx, arg, Vec::new(), &QueryGraph::empty()), arg);
    }
}
