// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Join and expand enumeration
//!
//! Classic solved-set dynamic programming: the table maps each set of solved
//! pattern elements to the best plan solving exactly that set. Transitions
//! expand a solved node across an unsolved connection, or hash-join two
//! partial solutions sharing a node. Disconnected components are solved
//! separately and then combined, preferring a predicate-driven join over a
//! blind cartesian product. Components too large for the table fall back to
//! a greedy linear order to bound compile time.

use crate::ir::{Expression, PatternLength, Quantifier, Variable};
use crate::plan::{
    ExpansionMode, FoldedPredicate, Operator, PlanId, PlanningPhase, SolvedParts,
};
use crate::planner::{leaf, picker, selection, PlanningContext, PlanningError};
use crate::query_graph::{NodeConnection, PatternRelationship, Predicate, QueryGraph};
use std::collections::{BTreeMap, BTreeSet};

/// Compact bitset over the elements (nodes + connections) of one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SolvedSet(u128);

impl SolvedSet {
    pub const CAPACITY: usize = 128;

    pub fn singleton(bit: usize) -> Self {
        SolvedSet(1u128 << bit)
    }

    pub fn insert(&mut self, bit: usize) {
        self.0 |= 1u128 << bit;
    }

    pub fn contains(self, bit: usize) -> bool {
        self.0 & (1u128 << bit) != 0
    }

    pub fn union(self, other: Self) -> Self {
        SolvedSet(self.0 | other.0)
    }

    pub fn intersection(self, other: Self) -> Self {
        SolvedSet(self.0 & other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> u32 {
        self.0.count_ones()
    }
}

/// Plans the whole pattern of one query graph: leaves, expansion, joins,
/// ready predicates, and optional matches. Subquery-shaped predicates are
/// left to the rewriter.
pub fn plan_pattern(
    ctx: &mut PlanningContext<'_>,
    qg: &QueryGraph,
) -> Result<PlanId, PlanningError> {
    qg.validate().map_err(PlanningError::InvariantViolation)?;

    let mut plan = if qg.pattern_nodes.is_empty() && qg.connections.is_empty() {
        let arg = leaf::argument_plan(ctx, qg);
        selection::apply_ready_predicates(ctx, arg, qg)
    } else {
        let components = qg.connected_components();
        let leaves = leaf::plan_leaves(ctx, qg, None);
        let mut component_plans = Vec::new();
        for (nodes, conn_indices) in &components {
            let plan = solve_component(ctx, qg, nodes, conn_indices, &leaves)?;
            component_plans.push(plan);
        }
        let combined = combine_components(ctx, qg, component_plans)?;
        selection::apply_ready_predicates(ctx, combined, qg)
    };

    for optional in &qg.optional_matches {
        let rhs = plan_pattern(ctx, optional)?;
        let rhs_solved = ctx.solved(rhs).clone();
        let optional_plan = ctx.add_plan(
            Operator::Optional {
                input: rhs,
                arguments: optional.argument_ids.clone(),
            },
            rhs_solved,
        );
        let solved = ctx.solved(plan).union(ctx.solved(optional_plan));
        plan = ctx.add_plan(
            Operator::Apply {
                lhs: plan,
                rhs: optional_plan,
            },
            solved,
        );
    }

    Ok(plan)
}

/// Per-component element numbering: nodes first, then connections.
struct ElementBits<'a> {
    nodes: Vec<&'a Variable>,
    connections: Vec<usize>,
}

impl<'a> ElementBits<'a> {
    fn node_bit(&self, node: &Variable) -> Option<usize> {
        self.nodes.iter().position(|n| *n == node)
    }

    fn connection_bit(&self, connection_index: usize) -> Option<usize> {
        self.connections
            .iter()
            .position(|c| *c == connection_index)
            .map(|p| p + self.nodes.len())
    }

    fn total(&self) -> usize {
        self.nodes.len() + self.connections.len()
    }

    fn full(&self) -> SolvedSet {
        let mut set = SolvedSet::default();
        for bit in 0..self.total() {
            set.insert(bit);
        }
        set
    }
}

fn solve_component(
    ctx: &mut PlanningContext<'_>,
    qg: &QueryGraph,
    nodes: &BTreeSet<Variable>,
    conn_indices: &[usize],
    leaves: &BTreeMap<Variable, Vec<PlanId>>,
) -> Result<PlanId, PlanningError> {
    let bits = ElementBits {
        nodes: nodes.iter().collect(),
        connections: conn_indices.to_vec(),
    };

    if bits.total() > SolvedSet::CAPACITY
        || conn_indices.len() > ctx.config.greedy_component_threshold
    {
        log::debug!(
            "component with {} connections exceeds the enumeration threshold, using greedy join ordering",
            conn_indices.len()
        );
        return solve_component_greedy(ctx, qg, &bits, leaves);
    }

    let mut table: BTreeMap<SolvedSet, Vec<PlanId>> = BTreeMap::new();

    // Seed: one Argument entry covering every argument-bound node at once.
    let arg_nodes: Vec<&Variable> = bits
        .nodes
        .iter()
        .filter(|n| qg.argument_ids.contains(**n))
        .copied()
        .collect();
    if !arg_nodes.is_empty() {
        let mut set = SolvedSet::default();
        let mut solved = SolvedParts::for_arguments(qg.argument_ids.clone());
        for node in &arg_nodes {
            set.insert(bits.node_bit(node).expect("argument node in component"));
            solved.pattern_nodes.insert((*node).clone());
        }
        let arg_plan = ctx.add_plan(
            Operator::Argument {
                arguments: qg.argument_ids.clone(),
            },
            solved,
        );
        let plan = selection::apply_ready_predicates(ctx, arg_plan, qg);
        insert_candidate(ctx, &mut table, set, plan);
    }

    // Seed: leaf candidates per node.
    for (node, candidates) in leaves {
        if let Some(bit) = bits.node_bit(node) {
            for candidate in candidates {
                let plan = selection::apply_ready_predicates(ctx, *candidate, qg);
                insert_candidate(ctx, &mut table, SolvedSet::singleton(bit), plan);
            }
        }
    }

    // Seed: whole-relationship scans.
    for conn_index in conn_indices {
        for candidate in leaf::relationship_leaf_candidates(ctx, qg, *conn_index) {
            let connection = &qg.connections[*conn_index];
            let mut set = SolvedSet::default();
            if let (Some(l), Some(r), Some(c)) = (
                bits.node_bit(connection.left()),
                bits.node_bit(connection.right()),
                bits.connection_bit(*conn_index),
            ) {
                set.insert(l);
                set.insert(r);
                set.insert(c);
                let plan = selection::apply_ready_predicates(ctx, candidate, qg);
                insert_candidate(ctx, &mut table, set, plan);
            }
        }
    }

    let full = bits.full();
    // Grow solved sets one transition at a time; total bits bound the rounds.
    for _round in 0..bits.total().max(1) {
        let snapshot: Vec<(SolvedSet, Vec<PlanId>)> = table
            .iter()
            .map(|(set, plans)| (*set, plans.clone()))
            .collect();

        // Expansion transitions.
        for (set, plans) in &snapshot {
            for conn_index in conn_indices {
                let conn_bit = bits
                    .connection_bit(*conn_index)
                    .expect("connection in component");
                if set.contains(conn_bit) {
                    continue;
                }
                for plan in plans {
                    if let Some((new_set, new_plan)) =
                        expand_transition(ctx, qg, &bits, *set, *plan, *conn_index)?
                    {
                        let new_plan = selection::apply_ready_predicates(ctx, new_plan, qg);
                        insert_candidate(ctx, &mut table, new_set, new_plan);
                    }
                }
            }
        }

        // Join transitions: two partial solutions sharing only nodes.
        for i in 0..snapshot.len() {
            for j in (i + 1)..snapshot.len() {
                let (set_a, plans_a) = &snapshot[i];
                let (set_b, plans_b) = &snapshot[j];
                let overlap = set_a.intersection(*set_b);
                if overlap.is_empty() {
                    continue;
                }
                let union = set_a.union(*set_b);
                if union == *set_a || union == *set_b {
                    continue;
                }
                let shared_nodes: BTreeSet<Variable> = bits
                    .nodes
                    .iter()
                    .enumerate()
                    .filter(|(bit, _)| overlap.contains(*bit))
                    .map(|(_, v)| (*v).clone())
                    .collect();
                // Overlapping connections would double-solve a relationship.
                if overlap.len() as usize != shared_nodes.len() || shared_nodes.is_empty() {
                    continue;
                }
                for plan_a in plans_a {
                    for plan_b in plans_b {
                        let solved = ctx.solved(*plan_a).union(ctx.solved(*plan_b));
                        let join = ctx.add_plan(
                            Operator::NodeHashJoin {
                                nodes: shared_nodes.clone(),
                                lhs: *plan_a,
                                rhs: *plan_b,
                            },
                            solved,
                        );
                        let join = selection::apply_ready_predicates(ctx, join, qg);
                        insert_candidate(ctx, &mut table, union, join);
                    }
                }
            }
        }

    }

    let candidates = table.remove(&full).unwrap_or_default();
    ctx.record_trace(
        PlanningPhase::JoinEnumeration,
        format!("component with {} connections", conn_indices.len()),
        None,
        candidates.len(),
    );
    picker::pick_best(ctx, &candidates).ok_or_else(|| {
        PlanningError::InvariantViolation(
            "join enumeration failed to cover the full pattern component".into(),
        )
    })
}

/// Inserts a candidate and prunes the entry to the configured retention.
fn insert_candidate(
    ctx: &PlanningContext<'_>,
    table: &mut BTreeMap<SolvedSet, Vec<PlanId>>,
    set: SolvedSet,
    plan: PlanId,
) {
    let entry = table.entry(set).or_default();
    entry.push(plan);
    entry.sort_by(|a, b| picker::compare(ctx, *a, *b));
    entry.dedup();
    let keep = ctx.config.retained_per_solved_set.max(1);
    entry.truncate(keep);
}

/// One expansion across an unsolved connection from a solved endpoint.
fn expand_transition(
    ctx: &mut PlanningContext<'_>,
    qg: &QueryGraph,
    bits: &ElementBits<'_>,
    set: SolvedSet,
    plan: PlanId,
    conn_index: usize,
) -> Result<Option<(SolvedSet, PlanId)>, PlanningError> {
    let connection = &qg.connections[conn_index];
    let left_bit = bits.node_bit(connection.left());
    let right_bit = bits.node_bit(connection.right());
    let conn_bit = bits.connection_bit(conn_index).expect("connection bit");

    let left_solved = left_bit.map(|b| set.contains(b)).unwrap_or(false)
        || qg.argument_ids.contains(connection.left());
    let right_solved = right_bit.map(|b| set.contains(b)).unwrap_or(false)
        || qg.argument_ids.contains(connection.right());
    if !left_solved && !right_solved {
        return Ok(None);
    }

    let mut new_set = set;
    new_set.insert(conn_bit);
    // Both endpoints are bound after the transition, whichever side was the
    // entry point.
    for bit in [left_bit, right_bit].into_iter().flatten() {
        new_set.insert(bit);
    }

    let (from, to, both_bound) = if left_solved && right_solved {
        (connection.left().clone(), connection.right().clone(), true)
    } else if left_solved {
        (connection.left().clone(), connection.right().clone(), false)
    } else {
        (connection.right().clone(), connection.left().clone(), false)
    };

    let mut solved = ctx.solved(plan).clone();
    solved.pattern_nodes.insert(from.clone());
    solved.pattern_nodes.insert(to.clone());
    solved.connections.insert(connection.name().clone());

    let new_plan = match connection {
        NodeConnection::Relationship(rel) => {
            plan_relationship_expand(ctx, qg, plan, rel, &from, &to, both_bound, solved)
        }
        NodeConnection::QuantifiedPath(qpp) => {
            let mut inner_qg = (*qpp.query_graph).clone();
            inner_qg.argument_ids = [qpp.inner_left.clone()].into_iter().collect();
            let inner_plan = plan_pattern(ctx, &inner_qg)?;
            ctx.add_plan(
                Operator::Trail {
                    input: plan,
                    inner: inner_plan,
                    name: qpp.name.clone(),
                    left: from.clone(),
                    right: to.clone(),
                    inner_left: qpp.inner_left.clone(),
                    inner_right: qpp.inner_right.clone(),
                    repetition: qpp.repetition,
                    groupings: qpp.variable_groupings.clone(),
                },
                solved,
            )
        }
        NodeConnection::SelectivePath(spp) => ctx.add_plan(
            Operator::ShortestPath {
                input: plan,
                pattern: spp.clone(),
            },
            solved,
        ),
    };
    Ok(Some((new_set, new_plan)))
}

fn plan_relationship_expand(
    ctx: &mut PlanningContext<'_>,
    qg: &QueryGraph,
    input: PlanId,
    rel: &PatternRelationship,
    from: &Variable,
    to: &Variable,
    both_bound: bool,
    solved: SolvedParts,
) -> PlanId {
    let mode = if both_bound {
        ExpansionMode::Into
    } else {
        ExpansionMode::All
    };
    let direction = rel.direction_from(from);
    match rel.length {
        PatternLength::Simple => ctx.add_plan(
            Operator::Expand {
                input,
                from: from.clone(),
                rel: rel.variable.clone(),
                to: to.clone(),
                direction,
                types: rel.types.clone(),
                mode,
            },
            solved,
        ),
        PatternLength::Variable { min, max } => {
            // Predicates that only touch path-local variables fold into the
            // expansion instead of filtering downstream.
            let (relationship_predicate, folded) = folded_relationship_predicate(qg, rel);
            let mut solved = solved;
            for predicate in folded {
                if !solved.covers_predicate(&predicate.expression) {
                    solved.predicates.push(predicate);
                }
            }
            ctx.add_plan(
                Operator::VarExpand {
                    input,
                    from: from.clone(),
                    rel: rel.variable.clone(),
                    to: to.clone(),
                    direction,
                    types: rel.types.clone(),
                    min,
                    max,
                    mode,
                    node_predicate: None,
                    relationship_predicate,
                },
                solved,
            )
        }
    }
}

/// An `all(x IN rel | ...)` selection whose predicate only touches the
/// per-element variable folds into the traversal.
fn folded_relationship_predicate(
    qg: &QueryGraph,
    rel: &PatternRelationship,
) -> (Option<FoldedPredicate>, Vec<Predicate>) {
    for selection in &qg.selections {
        if let Expression::Quantified {
            quantifier: Quantifier::All,
            variable,
            list,
            predicate,
        } = &selection.expression
        {
            let over_this_rel =
                matches!(list.as_ref(), Expression::Variable(v) if *v == rel.variable);
            let path_local = predicate
                .dependencies()
                .iter()
                .all(|d| d == variable);
            if over_this_rel && path_local {
                return (
                    Some(FoldedPredicate {
                        variable: variable.clone(),
                        predicate: predicate.as_ref().clone(),
                    }),
                    vec![selection.clone()],
                );
            }
        }
    }
    (None, Vec::new())
}

/// Greedy linear join order for oversized components.
fn solve_component_greedy(
    ctx: &mut PlanningContext<'_>,
    qg: &QueryGraph,
    bits: &ElementBits<'_>,
    leaves: &BTreeMap<Variable, Vec<PlanId>>,
) -> Result<PlanId, PlanningError> {
    let mut set = SolvedSet::default();
    let mut plan;

    let arg_nodes: Vec<&Variable> = bits
        .nodes
        .iter()
        .filter(|n| qg.argument_ids.contains(**n))
        .copied()
        .collect();
    if !arg_nodes.is_empty() {
        let mut solved = SolvedParts::for_arguments(qg.argument_ids.clone());
        for node in &arg_nodes {
            set.insert(bits.node_bit(node).expect("argument node"));
            solved.pattern_nodes.insert((*node).clone());
        }
        plan = ctx.add_plan(
            Operator::Argument {
                arguments: qg.argument_ids.clone(),
            },
            solved,
        );
    } else {
        // Cheapest leaf over all nodes starts the chain.
        let mut best: Option<(usize, PlanId)> = None;
        for (node, candidates) in leaves {
            if let Some(bit) = bits.node_bit(node) {
                if let Some(candidate) = picker::pick_best(ctx, candidates) {
                    let better = match best {
                        None => true,
                        Some((_, current)) => {
                            picker::compare(ctx, candidate, current) == std::cmp::Ordering::Less
                        }
                    };
                    if better {
                        best = Some((bit, candidate));
                    }
                }
            }
        }
        let (bit, candidate) = best.ok_or_else(|| {
            PlanningError::InvariantViolation("component has no plannable leaf".into())
        })?;
        set.insert(bit);
        plan = selection::apply_ready_predicates(ctx, candidate, qg);
    }

    loop {
        let mut progressed = false;
        for conn_index in &bits.connections {
            let conn_bit = bits.connection_bit(*conn_index).expect("connection bit");
            if set.contains(conn_bit) {
                continue;
            }
            if let Some((new_set, new_plan)) =
                expand_transition(ctx, qg, bits, set, plan, *conn_index)?
            {
                set = new_set;
                plan = selection::apply_ready_predicates(ctx, new_plan, qg);
                progressed = true;
            }
        }
        let all_connections_solved = bits
            .connections
            .iter()
            .all(|c| set.contains(bits.connection_bit(*c).expect("connection bit")));
        if all_connections_solved {
            break;
        }
        if !progressed {
            return Err(PlanningError::InvariantViolation(
                "greedy join ordering could not connect the pattern".into(),
            ));
        }
    }
    Ok(plan)
}

/// Combines disconnected component plans, preferring any predicate-driven
/// join over a blind cartesian product.
fn combine_components(
    ctx: &mut PlanningContext<'_>,
    qg: &QueryGraph,
    mut plans: Vec<PlanId>,
) -> Result<PlanId, PlanningError> {
    if plans.is_empty() {
        return Ok(leaf::argument_plan(ctx, qg));
    }
    while plans.len() > 1 {
        if let Some((a, b, lhs_expr, rhs_expr, predicate)) = find_join_predicate(ctx, qg, &plans)
        {
            let (plan_a, plan_b) = (plans[a], plans[b]);
            let solved = ctx
                .solved(plan_a)
                .union(ctx.solved(plan_b))
                .with_predicate(predicate);
            let join = ctx.add_plan(
                Operator::ValueHashJoin {
                    lhs: plan_a,
                    rhs: plan_b,
                    lhs_expression: lhs_expr,
                    rhs_expression: rhs_expr,
                },
                solved,
            );
            let join = selection::apply_ready_predicates(ctx, join, qg);
            remove_two(&mut plans, a, b);
            plans.push(join);
            continue;
        }

        // Cheapest pair first keeps intermediate products small.
        plans.sort_by(|x, y| {
            ctx.cardinality(*x)
                .cmp_total(ctx.cardinality(*y))
                .then_with(|| picker::compare(ctx, *x, *y))
        });
        let lhs = plans.remove(0);
        let rhs = plans.remove(0);
        let solved = ctx.solved(lhs).union(ctx.solved(rhs));
        let product = ctx.add_plan(Operator::CartesianProduct { lhs, rhs }, solved);
        let product = selection::apply_ready_predicates(ctx, product, qg);
        plans.push(product);
    }
    Ok(plans[0])
}

/// An unsolved equality predicate whose sides resolve in two different
/// component plans, usable as a hash-join key.
#[allow(clippy::type_complexity)]
fn find_join_predicate(
    ctx: &PlanningContext<'_>,
    qg: &QueryGraph,
    plans: &[PlanId],
) -> Option<(usize, usize, Expression, Expression, Predicate)> {
    for predicate in &qg.selections {
        if predicate.expression.contains_subquery_construct() {
            continue;
        }
        let Expression::Binary {
            op: crate::ir::BinaryOp::Eq,
            lhs,
            rhs,
        } = &predicate.expression
        else {
            continue;
        };
        let lhs_deps = lhs.dependencies();
        let rhs_deps = rhs.dependencies();
        if lhs_deps.is_empty() || rhs_deps.is_empty() {
            continue;
        }
        for a in 0..plans.len() {
            if ctx.solved(plans[a]).covers_predicate(&predicate.expression) {
                continue;
            }
            let avail_a = ctx.available(plans[a]);
            for b in 0..plans.len() {
                if a == b {
                    continue;
                }
                let avail_b = ctx.available(plans[b]);
                let lhs_in_a = lhs_deps.iter().all(|d| avail_a.contains(d));
                let rhs_in_b = rhs_deps.iter().all(|d| avail_b.contains(d));
                let lhs_touches_b = lhs_deps.iter().any(|d| avail_b.contains(d));
                let rhs_touches_a = rhs_deps.iter().any(|d| avail_a.contains(d));
                if lhs_in_a && rhs_in_b && !lhs_touches_b && !rhs_touches_a {
                    return Some((
                        a,
                        b,
                        lhs.as_ref().clone(),
                        rhs.as_ref().clone(),
                        predicate.clone(),
                    ));
                }
            }
        }
    }
    None
}

fn remove_two(plans: &mut Vec<PlanId>, a: usize, b: usize) {
    let (first, second) = if a > b { (a, b) } else { (b, a) };
    plans.remove(first);
    plans.remove(second);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InMemoryIndexCatalog, InMemoryStatistics};
    use crate::ir::Direction;
    use crate::ir::{
        Clause, NodePattern, PathPattern, ProjectionItem, RelationshipPattern, SingleQuery,
    };
    use crate::planner::PlannerConfig;
    use crate::query_graph::{build_planner_query, AnonymousVariableGenerator};

    fn pattern_qg(patterns: Vec<PathPattern>) -> QueryGraph {
        let query = SingleQuery {
            clauses: vec![
                Clause::Match {
                    optional: false,
                    patterns,
                    hints: Vec::new(),
                    predicate: None,
                },
                Clause::Return {
                    distinct: false,
                    items: vec![ProjectionItem::new(Expression::integer(1), "one")],
                    order_by: Vec::new(),
                    skip: None,
                    limit: None,
                },
            ],
        };
        let mut anon = AnonymousVariableGenerator::new();
        build_planner_query(&query, &mut anon, &BTreeSet::new())
            .unwrap()
            .query_graph
    }

    #[test]
    fn solved_set_operations() {
        let mut a = SolvedSet::singleton(0);
        a.insert(3);
        let b = SolvedSet::singleton(3);
        assert!(a.contains(0) && a.contains(3));
        assert_eq!(a.intersection(b), b);
        assert_eq!(a.union(b), a);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn single_relationship_plans_scan_plus_expand() {
        let stats = InMemoryStatistics::new(1_000.0, 2_000.0).with_relationship_type("X", 500.0);
        let indexes = InMemoryIndexCatalog::new();
        let config = PlannerConfig::default();
        let mut ctx = PlanningContext::new(&stats, &indexes, &config, false);

        let qg = pattern_qg(vec![PathPattern::node(NodePattern::named("a")).step(
            RelationshipPattern::named("r", Direction::Outgoing).with_type("X"),
            NodePattern::named("b"),
        )]);
        let plan = plan_pattern(&mut ctx, &qg).unwrap();
        let solved = ctx.solved(plan);
        assert!(solved.pattern_nodes.contains(&Variable::new("a")));
        assert!(solved.pattern_nodes.contains(&Variable::new("b")));
        assert!(solved.connections.contains(&Variable::new("r")));
    }

    #[test]
    fn disconnected_patterns_combine_with_cartesian_product() {
        let stats = InMemoryStatistics::new(1_000.0, 0.0);
        let indexes = InMemoryIndexCatalog::new();
        let config = PlannerConfig::default();
        let mut ctx = PlanningContext::new(&stats, &indexes, &config, false);

        let qg = pattern_qg(vec![
            PathPattern::node(NodePattern::named("a")),
            PathPattern::node(NodePattern::named("b")),
        ]);
        let plan = plan_pattern(&mut ctx, &qg).unwrap();
        assert_eq!(ctx.arena.get(plan).name(), "CartesianProduct");
    }

    #[test]
    fn equality_across_components_prefers_value_hash_join() {
        let stats = InMemoryStatistics::new(1_000.0, 0.0);
        let indexes = InMemoryIndexCatalog::new();
        let config = PlannerConfig::default();
        let mut ctx = PlanningContext::new(&stats, &indexes, &config, false);

        let mut qg = pattern_qg(vec![
            PathPattern::node(NodePattern::named("a")),
            PathPattern::node(NodePattern::named("b")),
        ]);
        qg.selections.push(Predicate::new(Expression::eq(
            Expression::property("a", "x"),
            Expression::property("b", "x"),
        )));
        let plan = plan_pattern(&mut ctx, &qg).unwrap();
        assert_eq!(ctx.arena.get(plan).name(), "ValueHashJoin");
    }

    #[test]
    fn planning_is_deterministic_across_runs() {
        let run = || {
            let stats =
                InMemoryStatistics::new(1_000.0, 2_000.0).with_relationship_type("X", 500.0);
            let indexes = InMemoryIndexCatalog::new();
            let config = PlannerConfig::default();
            let mut ctx = PlanningContext::new(&stats, &indexes, &config, false);
            let qg = pattern_qg(vec![PathPattern::node(NodePattern::named("a"))
                .step(
                    RelationshipPattern::named("r1", Direction::Outgoing).with_type("X"),
                    NodePattern::named("b"),
                )
                .step(
                    RelationshipPattern::named("r2", Direction::Outgoing).with_type("X"),
                    NodePattern::named("c"),
                )]);
            let plan = plan_pattern(&mut ctx, &qg).unwrap();
            picker::shape_key(&ctx, plan)
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn uniqueness_filter_appears_for_overlapping_relationships() {
        let stats = InMemoryStatistics::new(1_000.0, 2_000.0).with_relationship_type("X", 500.0);
        let indexes = InMemoryIndexCatalog::new();
        let config = PlannerConfig::default();
        let mut ctx = PlanningContext::new(&stats, &indexes, &config, false);

        let qg = pattern_qg(vec![PathPattern::node(NodePattern::named("a"))
            .step(
                RelationshipPattern::named("r1", Direction::Outgoing).with_type("X"),
                NodePattern::named("b"),
            )
            .step(
                RelationshipPattern::named("r2", Direction::Outgoing).with_type("X"),
                NodePattern::named("c"),
            )]);
        let plan = plan_pattern(&mut ctx, &qg).unwrap();
        let rendered = picker::shape_key(&ctx, plan);
        assert!(rendered.contains("NOT (r1 = r2)") || rendered.contains("NOT (r2 = r1)"));
    }
}
