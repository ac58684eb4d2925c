// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Eagerness analysis
//!
//! Inserts barrier operators wherever a later read could observe an earlier
//! write of the same query in an order-dependent way. The policy prefers the
//! most precise reason and placement it can prove, and falls back to a
//! conservative whole-row barrier when it cannot: over-inserting only costs
//! performance, under-inserting corrupts results.

use crate::ir::{Expression, Variable};
use crate::plan::{EagernessReason, Operator, PlanId};
use crate::planner::PlanningContext;
use crate::query_graph::{AggregationHorizon, PlannerQuery, ProjectionHorizon, UpdateAction};
use std::collections::BTreeSet;

/// Accumulated write effects of the parts planned so far.
#[derive(Debug, Default, Clone)]
pub struct WriteState {
    pub wrote_nodes: bool,
    pub wrote_relationships: bool,
    pub created_labels: BTreeSet<String>,
    pub deleted_variables: BTreeSet<Variable>,
    /// Entity variables captured into projected collections; a later delete
    /// of one of these must not be visible to the captured list.
    pub collected_variables: BTreeSet<Variable>,
}

impl WriteState {
    pub fn new() -> Self {
        WriteState::default()
    }

    pub fn has_writes(&self) -> bool {
        self.wrote_nodes || self.wrote_relationships || !self.deleted_variables.is_empty()
    }

    pub fn record_updates(&mut self, actions: &[UpdateAction]) {
        for action in actions {
            match action {
                UpdateAction::CreateNode { labels, .. } => {
                    self.wrote_nodes = true;
                    self.created_labels.extend(labels.iter().cloned());
                }
                UpdateAction::CreateRelationship { .. } => {
                    self.wrote_relationships = true;
                }
                UpdateAction::Merge { create_actions, .. } => {
                    self.record_updates(create_actions);
                }
                UpdateAction::Delete { expression, .. } => {
                    self.deleted_variables.extend(expression.dependencies());
                }
                UpdateAction::SetLabels { labels, .. } => {
                    self.wrote_nodes = true;
                    self.created_labels.extend(labels.iter().cloned());
                }
                UpdateAction::Foreach { actions, .. } => {
                    self.record_updates(actions);
                }
                UpdateAction::SetProperty { .. }
                | UpdateAction::RemoveProperty { .. }
                | UpdateAction::RemoveLabels { .. } => {}
            }
        }
    }

    /// Remembers entity variables captured into list-shaped projections.
    pub fn record_projection(&mut self, horizon: &ProjectionHorizon) {
        for item in &horizon.items {
            if captures_collection(&item.expression) {
                self.collected_variables
                    .extend(item.expression.dependencies());
            }
        }
    }

    /// Aggregations capture too: `collect(a)` holds the entity rows after
    /// the aggregation boundary.
    pub fn record_aggregation(&mut self, horizon: &AggregationHorizon) {
        for item in &horizon.aggregations {
            if captures_collection(&item.expression)
                || matches!(&item.expression, Expression::FunctionCall { args, .. }
                    if args.iter().any(captures_collection))
            {
                self.collected_variables
                    .extend(item.expression.dependencies());
            }
        }
    }
}

fn captures_collection(expr: &Expression) -> bool {
    match expr {
        Expression::ListLiteral(_)
        | Expression::ListComprehension { .. }
        | Expression::PatternComprehension { .. } => true,
        Expression::FunctionCall { name, .. } => name.eq_ignore_ascii_case("collect"),
        _ => false,
    }
}

/// What one query part reads, for conflict checks against earlier writes.
#[derive(Debug, Default)]
pub struct ReadSet {
    pub reads_nodes: bool,
    pub reads_relationships: bool,
    /// A node read with no label constraint observes every node.
    pub unlabeled: bool,
    pub labels: BTreeSet<String>,
    pub variables: BTreeSet<Variable>,
}

/// Collects the reads of a part: its pattern, its predicates, and any
/// subquery-shaped expression in its horizon (which scans the graph again).
pub fn part_reads(part: &PlannerQuery) -> ReadSet {
    let mut reads = ReadSet::default();
    let qg = &part.query_graph;
    for node in &qg.pattern_nodes {
        if qg.argument_ids.contains(node) {
            continue;
        }
        reads.reads_nodes = true;
        let labels = qg.known_labels(node);
        if labels.is_empty() {
            reads.unlabeled = true;
        } else {
            reads.labels.extend(labels);
        }
    }
    if !qg.connections.is_empty() {
        reads.reads_relationships = true;
    }
    for predicate in &qg.selections {
        reads.variables.extend(predicate.dependencies.iter().cloned());
    }
    for optional in &qg.optional_matches {
        reads.reads_nodes |= !optional.pattern_nodes.is_empty();
        reads.unlabeled = true;
    }
    for expression in part.horizon.expressions() {
        reads.variables.extend(expression.dependencies());
        if expression.contains_subquery_construct() {
            // The expression re-reads the graph; nothing narrower is known.
            reads.reads_nodes = true;
            reads.unlabeled = true;
        }
    }
    reads
}

/// Conflicts between the writes so far and the reads of the next part.
pub fn conflict_reasons(state: &WriteState, reads: &ReadSet) -> Vec<EagernessReason> {
    let mut reasons = Vec::new();
    if state.wrote_nodes && reads.reads_nodes {
        if reads.unlabeled {
            reasons.push(EagernessReason::Unknown);
        } else {
            for label in reads.labels.intersection(&state.created_labels) {
                reasons.push(EagernessReason::ReadCreateConflict(label.clone()));
            }
        }
    }
    if state.wrote_relationships && reads.reads_relationships {
        reasons.push(EagernessReason::Unknown);
    }
    if !state.deleted_variables.is_empty() {
        for variable in state.deleted_variables.intersection(&reads.variables) {
            reasons.push(EagernessReason::ReadDeleteConflict(variable.clone()));
        }
        if reads.reads_nodes {
            let variable = state
                .deleted_variables
                .iter()
                .next()
                .cloned()
                .expect("non-empty delete set");
            reasons.push(EagernessReason::ReadDeleteConflict(variable));
        }
    }
    reasons.dedup();
    reasons
}

/// Barrier needed before deleting `expression`, given what earlier horizons
/// captured into collections.
pub fn delete_conflicts(state: &WriteState, expression: &Expression) -> Vec<EagernessReason> {
    let deps = expression.dependencies();
    if deps
        .iter()
        .any(|v| state.collected_variables.contains(v))
    {
        vec![EagernessReason::WriteAfterProjection]
    } else {
        Vec::new()
    }
}

/// Wraps `plan` in an Eager barrier carrying `reasons`. Idempotent: a plan
/// already barrier-complete for these reasons is returned unchanged, and an
/// existing barrier is widened instead of stacked.
pub fn apply_barrier(
    ctx: &mut PlanningContext<'_>,
    plan: PlanId,
    reasons: Vec<EagernessReason>,
) -> PlanId {
    if reasons.is_empty() {
        return plan;
    }
    if let Operator::Eager {
        input,
        reasons: existing,
    } = ctx.arena.get(plan)
    {
        if reasons.iter().all(|r| existing.contains(r)) {
            return plan;
        }
        let input = *input;
        let mut merged = existing.clone();
        for reason in reasons {
            if !merged.contains(&reason) {
                merged.push(reason);
            }
        }
        let solved = ctx.solved(plan).clone();
        return ctx.add_plan(
            Operator::Eager {
                input,
                reasons: merged,
            },
            solved,
        );
    }
    let solved = ctx.solved(plan).clone();
    ctx.add_plan(
        Operator::Eager {
            input: plan,
            reasons,
        },
        solved,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InMemoryIndexCatalog, InMemoryStatistics};
    use crate::plan::SolvedParts;
    use crate::planner::PlannerConfig;

    #[test]
    fn barrier_insertion_is_idempotent() {
        let stats = InMemoryStatistics::new(10.0, 0.0);
        let indexes = InMemoryIndexCatalog::new();
        let config = PlannerConfig::default();
        let mut ctx = PlanningContext::new(&stats, &indexes, &config, false);

        let base = ctx.add_plan(
            Operator::Argument {
                arguments: BTreeSet::new(),
            },
            SolvedParts::empty(),
        );
        let once = apply_barrier(&mut ctx, base, vec![EagernessReason::Unknown]);
        let twice = apply_barrier(&mut ctx, once, vec![EagernessReason::Unknown]);
        assert_eq!(once, twice);
        assert!(matches!(ctx.arena.get(once), Operator::Eager { .. }));
    }

    #[test]
    fn widening_reuses_the_same_input() {
        let stats = InMemoryStatistics::new(10.0, 0.0);
        let indexes = InMemoryIndexCatalog::new();
        let config = PlannerConfig::default();
        let mut ctx = PlanningContext::new(&stats, &indexes, &config, false);

        let base = ctx.add_plan(
            Operator::Argument {
                arguments: BTreeSet::new(),
            },
            SolvedParts::empty(),
        );
        let narrow = apply_barrier(
            &mut ctx,
            base,
            vec![EagernessReason::ReadDeleteConflict(Variable::new("n"))],
        );
        let widened = apply_barrier(&mut ctx, narrow, vec![EagernessReason::Unknown]);
        match ctx.arena.get(widened) {
            Operator::Eager { input, reasons } => {
                assert_eq!(*input, base);
                assert_eq!(reasons.len(), 2);
            }
            other => panic!("expected Eager, found {}", other.name()),
        }
    }

    #[test]
    fn create_conflicts_with_unlabeled_read_are_unknown() {
        let mut state = WriteState::new();
        state.record_updates(&[UpdateAction::CreateNode {
            variable: Variable::new("a"),
            labels: vec!["Person".into()],
            properties: Vec::new(),
        }]);

        let mut reads = ReadSet::default();
        reads.reads_nodes = true;
        reads.unlabeled = true;
        assert_eq!(conflict_reasons(&state, &reads), vec![EagernessReason::Unknown]);

        let mut labeled = ReadSet::default();
        labeled.reads_nodes = true;
        labeled.labels.insert("Person".into());
        assert_eq!(
            conflict_reasons(&state, &labeled),
            vec![EagernessReason::ReadCreateConflict("Person".into())]
        );

        let mut disjoint = ReadSet::default();
        disjoint.reads_nodes = true;
        disjoint.labels.insert("Robot".into());
        assert!(conflict_reasons(&state, &disjoint).is_empty());
    }
}
