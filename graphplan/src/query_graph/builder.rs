// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Clause list normalization
//!
//! Walks the clause list of a single query and produces the part chain the
//! planner consumes. Anonymous pattern elements receive synthesized names
//! here, in clause order, so that identical queries always number their
//! variables identically. Relationship-uniqueness predicates are also added
//! here, once per MATCH clause, and skipped only for relationship pairs
//! whose type constraints are provably disjoint.

use crate::ir::{
    Clause, Direction, Expression, NodePattern, PathPattern, PatternConnector, PatternLength,
    QuantifiedPattern, RelationshipPattern, SingleQuery, Variable,
};
use crate::planner::PlanningError;
use crate::query_graph::{
    AggregationHorizon, NodeConnection, PatternRelationship, PlannerQuery, Predicate,
    ProjectionHorizon, QuantifiedPathPattern, QueryGraph, QueryHorizon, SelectivePathPattern,
    UpdateAction, VariableGrouping,
};
use std::collections::BTreeSet;
use std::mem;

/// Names synthesized variables `anon_0`, `anon_1`, ... in allocation order.
///
/// One generator lives for one query compilation; numbering leaks into plan
/// equality, so allocation order must follow a fixed traversal of the input.
#[derive(Debug, Default)]
pub struct AnonymousVariableGenerator {
    next: u32,
}

impl AnonymousVariableGenerator {
    pub fn new() -> Self {
        AnonymousVariableGenerator { next: 0 }
    }

    pub fn fresh(&mut self) -> Variable {
        let v = Variable::new(format!("anon_{}", self.next));
        self.next += 1;
        v
    }
}

/// How a relationship participates in uniqueness checks: as one relationship
/// or as a list of them (variable length, group variables).
#[derive(Debug, Clone)]
enum RelRep {
    Single { var: Variable, types: Vec<String> },
    List { var: Variable, types: Vec<String> },
}

impl RelRep {
    fn types(&self) -> &[String] {
        match self {
            RelRep::Single { types, .. } | RelRep::List { types, .. } => types,
        }
    }

    fn var(&self) -> &Variable {
        match self {
            RelRep::Single { var, .. } | RelRep::List { var, .. } => var,
        }
    }
}

fn types_could_overlap(a: &[String], b: &[String]) -> bool {
    if a.is_empty() || b.is_empty() {
        return true;
    }
    a.iter().any(|t| b.contains(t))
}

/// Builds the part chain for a single query.
pub fn build_planner_query(
    query: &SingleQuery,
    anon: &mut AnonymousVariableGenerator,
    arguments: &BTreeSet<Variable>,
) -> Result<PlannerQuery, PlanningError> {
    if query.clauses.is_empty() {
        return Err(PlanningError::InvalidQuery("empty query".into()));
    }

    let mut parts: Vec<(QueryGraph, QueryHorizon)> = Vec::new();
    let mut current = QueryGraph::with_arguments(arguments.clone());
    let mut scope: BTreeSet<Variable> = arguments.clone();
    let mut pending_updates: Vec<UpdateAction> = Vec::new();

    fn close_pending_updates(
        parts: &mut Vec<(QueryGraph, QueryHorizon)>,
        current: &mut QueryGraph,
        pending: &mut Vec<UpdateAction>,
        scope: &BTreeSet<Variable>,
    ) {
        if !pending.is_empty() {
            let qg = mem::replace(current, QueryGraph::with_arguments(scope.clone()));
            parts.push((qg, QueryHorizon::Updates(mem::take(pending))));
        }
    }

    for clause in &query.clauses {
        match clause {
            Clause::Match {
                optional,
                patterns,
                hints,
                predicate,
            } => {
                close_pending_updates(&mut parts, &mut current, &mut pending_updates, &scope);
                if *optional {
                    let mut opt = QueryGraph::empty();
                    let mut reps = Vec::new();
                    for pattern in patterns {
                        reps.extend(add_path_pattern(&mut opt, pattern, anon)?);
                    }
                    add_uniqueness_predicates(&mut opt, &reps);
                    if let Some(p) = predicate {
                        for conjunct in p.clone().conjuncts() {
                            opt.selections.push(Predicate::new(conjunct));
                        }
                    }
                    opt.argument_ids = opt
                        .covered_ids()
                        .iter()
                        .chain(opt.selections.iter().flat_map(|s| s.dependencies.iter()))
                        .filter(|v| scope.contains(*v))
                        .cloned()
                        .collect();
                    scope.extend(opt.covered_ids());
                    current.optional_matches.push(opt);
                } else {
                    let mut reps = Vec::new();
                    for pattern in patterns {
                        reps.extend(add_path_pattern(&mut current, pattern, anon)?);
                    }
                    add_uniqueness_predicates(&mut current, &reps);
                    current.hints.extend(hints.iter().cloned());
                    if let Some(p) = predicate {
                        for conjunct in p.clone().conjuncts() {
                            current.selections.push(Predicate::new(conjunct));
                        }
                    }
                    scope.extend(current.covered_ids());
                }
            }
            Clause::Unwind { expression, variable } => {
                close_pending_updates(&mut parts, &mut current, &mut pending_updates, &scope);
                scope.extend(current.covered_ids());
                let horizon = QueryHorizon::Unwind {
                    variable: variable.clone(),
                    expression: expression.clone(),
                };
                scope = horizon.output_columns(&scope);
                let qg = mem::replace(&mut current, QueryGraph::with_arguments(scope.clone()));
                parts.push((qg, horizon));
            }
            Clause::LoadCsv {
                url,
                variable,
                with_headers,
            } => {
                close_pending_updates(&mut parts, &mut current, &mut pending_updates, &scope);
                scope.extend(current.covered_ids());
                let horizon = QueryHorizon::LoadCsv {
                    variable: variable.clone(),
                    url: url.clone(),
                    with_headers: *with_headers,
                };
                scope = horizon.output_columns(&scope);
                let qg = mem::replace(&mut current, QueryGraph::with_arguments(scope.clone()));
                parts.push((qg, horizon));
            }
            Clause::CallSubquery { query, imports } => {
                close_pending_updates(&mut parts, &mut current, &mut pending_updates, &scope);
                scope.extend(current.covered_ids());
                let horizon = QueryHorizon::CallSubquery {
                    query: query.clone(),
                    imports: imports.clone(),
                };
                scope = horizon.output_columns(&scope);
                let qg = mem::replace(&mut current, QueryGraph::with_arguments(scope.clone()));
                parts.push((qg, horizon));
            }
            Clause::With {
                distinct,
                items,
                order_by,
                skip,
                limit,
                predicate,
            } => {
                close_pending_updates(&mut parts, &mut current, &mut pending_updates, &scope);
                let horizon = projection_like_horizon(
                    items,
                    *distinct,
                    order_by,
                    skip,
                    limit,
                    predicate.clone(),
                );
                scope = horizon.output_columns(&scope);
                let qg = mem::replace(&mut current, QueryGraph::with_arguments(scope.clone()));
                parts.push((qg, horizon));
            }
            Clause::Return {
                distinct,
                items,
                order_by,
                skip,
                limit,
            } => {
                close_pending_updates(&mut parts, &mut current, &mut pending_updates, &scope);
                let horizon =
                    projection_like_horizon(items, *distinct, order_by, skip, limit, None);
                scope = horizon.output_columns(&scope);
                let qg = mem::replace(&mut current, QueryGraph::with_arguments(scope.clone()));
                parts.push((qg, horizon));
            }
            Clause::Create { patterns } => {
                for pattern in patterns {
                    pending_updates.extend(create_actions_for_pattern(
                        pattern, &mut scope, anon,
                    )?);
                }
            }
            Clause::Merge {
                pattern,
                on_create,
                on_match,
            } => {
                let action = merge_action(pattern, on_create, on_match, &mut scope, anon)?;
                pending_updates.push(action);
            }
            Clause::Delete { expressions, detach } => {
                for expression in expressions {
                    pending_updates.push(UpdateAction::Delete {
                        expression: expression.clone(),
                        detach: *detach,
                    });
                }
            }
            Clause::Set { items } => {
                for item in items {
                    pending_updates.push(set_item_action(item));
                }
            }
            Clause::Remove { items } => {
                for item in items {
                    pending_updates.push(remove_item_action(item));
                }
            }
            Clause::Foreach {
                variable,
                list,
                updates,
            } => {
                let mut actions = Vec::new();
                let mut foreach_scope = scope.clone();
                foreach_scope.insert(variable.clone());
                for inner in updates {
                    actions.extend(clause_to_actions(inner, &mut foreach_scope, anon)?);
                }
                pending_updates.push(UpdateAction::Foreach {
                    variable: variable.clone(),
                    list: list.clone(),
                    actions,
                });
            }
        }
    }

    close_pending_updates(&mut parts, &mut current, &mut pending_updates, &scope);

    if !current.is_pattern_empty() {
        return Err(PlanningError::InvalidQuery(
            "query must end with RETURN or an updating clause".into(),
        ));
    }
    if parts.is_empty() {
        return Err(PlanningError::InvalidQuery(
            "query produced no plannable parts".into(),
        ));
    }

    // Fold the flat part list into the head + tails chain.
    let mut chain: Option<PlannerQuery> = None;
    for (query_graph, horizon) in parts.into_iter().rev() {
        chain = Some(PlannerQuery {
            query_graph,
            horizon,
            tail: chain.map(Box::new),
        });
    }
    Ok(chain.expect("non-empty part list"))
}

fn projection_like_horizon(
    items: &[crate::ir::ProjectionItem],
    distinct: bool,
    order_by: &[crate::ir::SortItem],
    skip: &Option<Expression>,
    limit: &Option<Expression>,
    predicate: Option<Expression>,
) -> QueryHorizon {
    let has_aggregation = items.iter().any(|item| item.expression.contains_aggregate());
    if has_aggregation {
        let (aggregations, grouping): (Vec<_>, Vec<_>) = items
            .iter()
            .cloned()
            .partition(|item| item.expression.contains_aggregate());
        QueryHorizon::Aggregation(AggregationHorizon {
            grouping,
            aggregations,
            order_by: order_by.to_vec(),
            skip: skip.clone(),
            limit: limit.clone(),
            predicate,
        })
    } else {
        QueryHorizon::Projection(ProjectionHorizon {
            items: items.to_vec(),
            distinct,
            order_by: order_by.to_vec(),
            skip: skip.clone(),
            limit: limit.clone(),
            predicate,
        })
    }
}

/// Ensures the node has a name and registers it plus its label/property
/// constraints on the query graph. Returns the node's variable.
fn ensure_node(
    qg: &mut QueryGraph,
    node: &NodePattern,
    anon: &mut AnonymousVariableGenerator,
) -> Variable {
    let var = node
        .variable
        .clone()
        .unwrap_or_else(|| anon.fresh());
    qg.pattern_nodes.insert(var.clone());
    // One predicate per label so an access path can consume exactly the
    // label it solves.
    for label in &node.labels {
        qg.selections.push(Predicate::new(Expression::HasLabels {
            subject: Box::new(Expression::Variable(var.clone())),
            labels: vec![label.clone()],
        }));
    }
    for (key, value) in &node.properties {
        qg.selections.push(Predicate::new(Expression::eq(
            Expression::Property {
                subject: Box::new(Expression::Variable(var.clone())),
                key: key.clone(),
            },
            value.clone(),
        )));
    }
    var
}

fn add_relationship(
    qg: &mut QueryGraph,
    rel: &RelationshipPattern,
    left: Variable,
    right: Variable,
    anon: &mut AnonymousVariableGenerator,
) -> RelRep {
    let var = rel.variable.clone().unwrap_or_else(|| anon.fresh());
    for (key, value) in &rel.properties {
        let predicate = match rel.length {
            PatternLength::Simple => Expression::eq(
                Expression::Property {
                    subject: Box::new(Expression::Variable(var.clone())),
                    key: key.clone(),
                },
                value.clone(),
            ),
            PatternLength::Variable { .. } => {
                // A property map on a variable-length relationship constrains
                // every traversed relationship.
                let each = Variable::new(format!("{}_each", var.name()));
                Expression::Quantified {
                    quantifier: crate::ir::Quantifier::All,
                    variable: each.clone(),
                    list: Box::new(Expression::Variable(var.clone())),
                    predicate: Box::new(Expression::eq(
                        Expression::Property {
                            subject: Box::new(Expression::Variable(each)),
                            key: key.clone(),
                        },
                        value.clone(),
                    )),
                }
            }
        };
        qg.selections.push(Predicate::new(predicate));
    }
    qg.connections
        .push(NodeConnection::Relationship(PatternRelationship {
            variable: var.clone(),
            left,
            right,
            direction: rel.direction,
            types: rel.types.clone(),
            length: rel.length,
        }));
    match rel.length {
        PatternLength::Simple => RelRep::Single {
            var,
            types: rel.types.clone(),
        },
        PatternLength::Variable { .. } => RelRep::List {
            var,
            types: rel.types.clone(),
        },
    }
}

fn add_quantified(
    qg: &mut QueryGraph,
    qpp: &QuantifiedPattern,
    left: Variable,
    right: Variable,
    anon: &mut AnonymousVariableGenerator,
) -> Result<Vec<RelRep>, PlanningError> {
    let mut inner_qg = QueryGraph::empty();
    let inner_left = ensure_node(&mut inner_qg, &qpp.inner.start, anon);
    let mut cursor = inner_left.clone();
    let mut inner_reps = Vec::new();
    for (rel, node) in &qpp.inner.steps {
        let next = ensure_node(&mut inner_qg, node, anon);
        inner_reps.push(add_relationship(&mut inner_qg, rel, cursor, next.clone(), anon));
        cursor = next;
    }
    if let Some(p) = &qpp.predicate {
        for conjunct in p.as_ref().clone().conjuncts() {
            inner_qg.selections.push(Predicate::new(conjunct));
        }
    }
    let inner_right = cursor;

    // Each inner singleton surfaces as a group variable of the same name.
    let variable_groupings: Vec<VariableGrouping> = inner_qg
        .covered_ids()
        .into_iter()
        .map(|v| VariableGrouping {
            singleton: v.clone(),
            group: v,
        })
        .collect();

    let name = anon.fresh();
    // Uniqueness against the rest of the pattern goes through the exposed
    // relationship group lists.
    let reps = inner_reps
        .iter()
        .map(|rep| RelRep::List {
            var: rep.var().clone(),
            types: rep.types().to_vec(),
        })
        .collect();

    qg.connections
        .push(NodeConnection::QuantifiedPath(QuantifiedPathPattern {
            name,
            left,
            right,
            inner_left,
            inner_right,
            query_graph: Box::new(inner_qg),
            repetition: qpp.repetition,
            variable_groupings,
        }));
    Ok(reps)
}

/// Adds one path pattern and returns the relationship representations it
/// contributed, for uniqueness-predicate generation.
fn add_path_pattern(
    qg: &mut QueryGraph,
    pattern: &PathPattern,
    anon: &mut AnonymousVariableGenerator,
) -> Result<Vec<RelRep>, PlanningError> {
    if let Some(selector) = pattern.selector {
        // The whole path is kept under a selective selector: its connections
        // live inside one SelectivePathPattern boundary.
        let mut inner = QueryGraph::empty();
        let left = ensure_node(&mut inner, &pattern.start, anon);
        let mut cursor = left.clone();
        let mut reps = Vec::new();
        for (connector, node) in &pattern.steps {
            let next = ensure_node(&mut inner, node, anon);
            match connector {
                PatternConnector::Relationship(rel) => {
                    reps.push(add_relationship(&mut inner, rel, cursor, next.clone(), anon));
                }
                PatternConnector::Quantified(qpp) => {
                    reps.extend(add_quantified(&mut inner, qpp, cursor, next.clone(), anon)?);
                }
            }
            cursor = next;
        }
        // Uniqueness predicates for these relationships are added by the
        // caller, over the reps returned here, exactly once.
        let right = cursor;
        // Only the boundary nodes join the outer pattern; everything in
        // between is bound by the selective-path operator itself.
        qg.pattern_nodes.insert(left.clone());
        qg.pattern_nodes.insert(right.clone());
        qg.selections.extend(inner.selections.iter().cloned());
        let name = anon.fresh();
        qg.connections
            .push(NodeConnection::SelectivePath(SelectivePathPattern {
                name,
                left,
                right,
                connections: inner.connections,
                selector,
            }));
        return Ok(reps);
    }

    let mut reps = Vec::new();
    let mut cursor = ensure_node(qg, &pattern.start, anon);
    for (connector, node) in &pattern.steps {
        let next = ensure_node(qg, node, anon);
        match connector {
            PatternConnector::Relationship(rel) => {
                reps.push(add_relationship(qg, rel, cursor, next.clone(), anon));
            }
            PatternConnector::Quantified(qpp) => {
                reps.extend(add_quantified(qg, qpp, cursor, next.clone(), anon)?);
            }
        }
        cursor = next;
    }
    Ok(reps)
}

/// Query graph for a pattern chain appearing inside an expression (pattern
/// predicate, pattern comprehension, EXISTS body). Outer bindings become
/// arguments; uniqueness predicates are added like for any other pattern.
pub fn chain_query_graph(
    chain: &crate::ir::RelationshipChain,
    predicate: Option<&Expression>,
    outer: &BTreeSet<Variable>,
    anon: &mut AnonymousVariableGenerator,
) -> QueryGraph {
    let mut qg = QueryGraph::empty();
    let mut reps = Vec::new();
    let mut cursor = ensure_node(&mut qg, &chain.start, anon);
    for (rel, node) in &chain.steps {
        let next = ensure_node(&mut qg, node, anon);
        reps.push(add_relationship(&mut qg, rel, cursor, next.clone(), anon));
        cursor = next;
    }
    add_uniqueness_predicates(&mut qg, &reps);
    if let Some(p) = predicate {
        for conjunct in p.clone().conjuncts() {
            qg.selections.push(Predicate::new(conjunct));
        }
    }
    qg.argument_ids = qg
        .covered_ids()
        .into_iter()
        .filter(|v| outer.contains(v))
        .collect();
    qg
}

/// Pairwise distinctness between relationships that could structurally bind
/// the same stored relationship.
fn add_uniqueness_predicates(qg: &mut QueryGraph, reps: &[RelRep]) {
    for i in 0..reps.len() {
        for j in (i + 1)..reps.len() {
            let (a, b) = (&reps[i], &reps[j]);
            if !types_could_overlap(a.types(), b.types()) {
                continue;
            }
            let expression = match (a, b) {
                (RelRep::Single { var: va, .. }, RelRep::Single { var: vb, .. }) => {
                    Expression::not(Expression::eq(
                        Expression::Variable(va.clone()),
                        Expression::Variable(vb.clone()),
                    ))
                }
                (RelRep::Single { var: single, .. }, RelRep::List { var: list, .. })
                | (RelRep::List { var: list, .. }, RelRep::Single { var: single, .. }) => {
                    Expression::function(
                        "none_of_relationships",
                        vec![
                            Expression::Variable(single.clone()),
                            Expression::Variable(list.clone()),
                        ],
                    )
                }
                (RelRep::List { var: va, .. }, RelRep::List { var: vb, .. }) => {
                    Expression::function(
                        "relationships_disjoint",
                        vec![
                            Expression::Variable(va.clone()),
                            Expression::Variable(vb.clone()),
                        ],
                    )
                }
            };
            qg.selections.push(Predicate::new(expression));
        }
    }
}

fn create_actions_for_pattern(
    pattern: &PathPattern,
    scope: &mut BTreeSet<Variable>,
    anon: &mut AnonymousVariableGenerator,
) -> Result<Vec<UpdateAction>, PlanningError> {
    let mut actions = Vec::new();
    fn node_var(
        node: &NodePattern,
        scope: &mut BTreeSet<Variable>,
        actions: &mut Vec<UpdateAction>,
        anon: &mut AnonymousVariableGenerator,
    ) -> Variable {
        let var = node.variable.clone().unwrap_or_else(|| anon.fresh());
        if !scope.contains(&var) {
            actions.push(UpdateAction::CreateNode {
                variable: var.clone(),
                labels: node.labels.clone(),
                properties: node.properties.clone(),
            });
            scope.insert(var.clone());
        }
        var
    }

    let mut cursor = node_var(&pattern.start, scope, &mut actions, anon);
    for (connector, node) in &pattern.steps {
        let rel = match connector {
            PatternConnector::Relationship(rel) => rel,
            PatternConnector::Quantified(_) => {
                return Err(PlanningError::InvalidQuery(
                    "CREATE cannot contain a quantified path pattern".into(),
                ))
            }
        };
        if rel.direction == Direction::Both {
            return Err(PlanningError::InvalidQuery(
                "CREATE requires a directed relationship".into(),
            ));
        }
        let rel_type = rel.types.first().cloned().ok_or_else(|| {
            PlanningError::InvalidQuery("CREATE requires exactly one relationship type".into())
        })?;
        let next = node_var(node, scope, &mut actions, anon);
        let var = rel.variable.clone().unwrap_or_else(|| anon.fresh());
        scope.insert(var.clone());
        actions.push(UpdateAction::CreateRelationship {
            variable: var,
            left: cursor.clone(),
            rel_type,
            right: next.clone(),
            direction: rel.direction,
            properties: rel.properties.clone(),
        });
        cursor = next;
    }
    Ok(actions)
}

fn merge_action(
    pattern: &PathPattern,
    on_create: &[crate::ir::SetItem],
    on_match: &[crate::ir::SetItem],
    scope: &mut BTreeSet<Variable>,
    anon: &mut AnonymousVariableGenerator,
) -> Result<UpdateAction, PlanningError> {
    let mut read_graph = QueryGraph::empty();
    let reps = add_path_pattern(&mut read_graph, pattern, anon)?;
    add_uniqueness_predicates(&mut read_graph, &reps);
    read_graph.argument_ids = read_graph
        .covered_ids()
        .iter()
        .filter(|v| scope.contains(*v))
        .cloned()
        .collect();

    // The write side reuses the read graph's names so both sides stay in
    // sync; nothing new is named here.
    let mut create_scope: BTreeSet<Variable> = read_graph.argument_ids.clone();
    let mut create_actions: Vec<UpdateAction> = Vec::new();
    for node in &read_graph.pattern_nodes {
        if !create_scope.contains(node) {
            create_actions.push(UpdateAction::CreateNode {
                variable: node.clone(),
                labels: read_graph.known_labels(node),
                properties: Vec::new(),
            });
            create_scope.insert(node.clone());
        }
    }
    for rel in read_graph.relationships() {
        let rel_type = rel.types.first().cloned().ok_or_else(|| {
            PlanningError::InvalidQuery("MERGE requires exactly one relationship type".into())
        })?;
        create_actions.push(UpdateAction::CreateRelationship {
            variable: rel.variable.clone(),
            left: rel.left.clone(),
            rel_type,
            right: rel.right.clone(),
            direction: rel.direction,
            properties: Vec::new(),
        });
    }

    scope.extend(read_graph.covered_ids());
    Ok(UpdateAction::Merge {
        read_graph,
        create_actions,
        on_create: on_create.to_vec(),
        on_match: on_match.to_vec(),
    })
}

fn set_item_action(item: &crate::ir::SetItem) -> UpdateAction {
    match item {
        crate::ir::SetItem::Property {
            subject,
            key,
            value,
        } => UpdateAction::SetProperty {
            subject: subject.clone(),
            key: key.clone(),
            value: value.clone(),
        },
        crate::ir::SetItem::Labels { subject, labels } => UpdateAction::SetLabels {
            subject: subject.clone(),
            labels: labels.clone(),
        },
    }
}

fn remove_item_action(item: &crate::ir::RemoveItem) -> UpdateAction {
    match item {
        crate::ir::RemoveItem::Property { subject, key } => UpdateAction::RemoveProperty {
            subject: subject.clone(),
            key: key.clone(),
        },
        crate::ir::RemoveItem::Labels { subject, labels } => UpdateAction::RemoveLabels {
            subject: subject.clone(),
            labels: labels.clone(),
        },
    }
}

fn clause_to_actions(
    clause: &Clause,
    scope: &mut BTreeSet<Variable>,
    anon: &mut AnonymousVariableGenerator,
) -> Result<Vec<UpdateAction>, PlanningError> {
    match clause {
        Clause::Create { patterns } => {
            let mut actions = Vec::new();
            for pattern in patterns {
                actions.extend(create_actions_for_pattern(pattern, scope, anon)?);
            }
            Ok(actions)
        }
        Clause::Merge {
            pattern,
            on_create,
            on_match,
        } => Ok(vec![merge_action(pattern, on_create, on_match, scope, anon)?]),
        Clause::Delete { expressions, detach } => Ok(expressions
            .iter()
            .map(|e| UpdateAction::Delete {
                expression: e.clone(),
                detach: *detach,
            })
            .collect()),
        Clause::Set { items } => Ok(items.iter().map(set_item_action).collect()),
        Clause::Remove { items } => Ok(items.iter().map(remove_item_action).collect()),
        Clause::Foreach {
            variable,
            list,
            updates,
        } => {
            let mut inner_scope = scope.clone();
            inner_scope.insert(variable.clone());
            let mut actions = Vec::new();
            for inner in updates {
                actions.extend(clause_to_actions(inner, &mut inner_scope, anon)?);
            }
            Ok(vec![UpdateAction::Foreach {
                variable: variable.clone(),
                list: list.clone(),
                actions,
            }])
        }
        other => Err(PlanningError::InvalidQuery(format!(
            "only updating clauses are allowed here, found {:?}",
            std::mem::discriminant(other)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ProjectionItem;

    fn return_clause(items: Vec<ProjectionItem>) -> Clause {
        Clause::Return {
            distinct: false,
            items,
            order_by: Vec::new(),
            skip: None,
            limit: None,
        }
    }

    #[test]
    fn match_return_builds_single_part() {
        let query = SingleQuery {
            clauses: vec![
                Clause::Match {
                    optional: false,
                    patterns: vec![PathPattern::node(NodePattern::named("a"))],
                    hints: Vec::new(),
                    predicate: None,
                },
                return_clause(vec![ProjectionItem::new(Expression::var("a"), "a")]),
            ],
        };
        let mut anon = AnonymousVariableGenerator::new();
        let pq = build_planner_query(&query, &mut anon, &BTreeSet::new()).unwrap();
        assert!(pq.tail.is_none());
        assert!(pq.query_graph.pattern_nodes.contains(&Variable::new("a")));
        assert!(matches!(pq.horizon, QueryHorizon::Projection(_)));
    }

    #[test]
    fn uniqueness_predicates_skip_disjoint_types() {
        let pattern = PathPattern::node(NodePattern::named("a"))
            .step(
                RelationshipPattern::named("r1", Direction::Outgoing).with_type("KNOWS"),
                NodePattern::named("b"),
            )
            .step(
                RelationshipPattern::named("r2", Direction::Outgoing).with_type("LIKES"),
                NodePattern::named("c"),
            );
        let query = SingleQuery {
            clauses: vec![
                Clause::Match {
                    optional: false,
                    patterns: vec![pattern],
                    hints: Vec::new(),
                    predicate: None,
                },
                return_clause(vec![ProjectionItem::new(Expression::var("a"), "a")]),
            ],
        };
        let mut anon = AnonymousVariableGenerator::new();
        let pq = build_planner_query(&query, &mut anon, &BTreeSet::new()).unwrap();
        // KNOWS and LIKES are provably disjoint: no uniqueness predicate.
        assert!(pq.query_graph.selections.is_empty());
    }

    #[test]
    fn uniqueness_predicates_emitted_for_overlapping_types() {
        let pattern = PathPattern::node(NodePattern::named("a"))
            .step(
                RelationshipPattern::named("r1", Direction::Outgoing).with_type("KNOWS"),
                NodePattern::named("b"),
            )
            .step(
                RelationshipPattern::named("r2", Direction::Outgoing).with_type("KNOWS"),
                NodePattern::named("c"),
            );
        let query = SingleQuery {
            clauses: vec![
                Clause::Match {
                    optional: false,
                    patterns: vec![pattern],
                    hints: Vec::new(),
                    predicate: None,
                },
                return_clause(vec![ProjectionItem::new(Expression::var("a"), "a")]),
            ],
        };
        let mut anon = AnonymousVariableGenerator::new();
        let pq = build_planner_query(&query, &mut anon, &BTreeSet::new()).unwrap();
        assert_eq!(pq.query_graph.selections.len(), 1);
        assert!(matches!(
            &pq.query_graph.selections[0].expression,
            Expression::Not(inner) if matches!(inner.as_ref(), Expression::Binary { .. })
        ));
    }

    #[test]
    fn create_then_return_splits_parts() {
        let query = SingleQuery {
            clauses: vec![
                Clause::Create {
                    patterns: vec![PathPattern::node(NodePattern::named("a"))],
                },
                return_clause(vec![ProjectionItem::new(Expression::var("a"), "a")]),
            ],
        };
        let mut anon = AnonymousVariableGenerator::new();
        let pq = build_planner_query(&query, &mut anon, &BTreeSet::new()).unwrap();
        assert!(matches!(pq.horizon, QueryHorizon::Updates(_)));
        let tail = pq.tail.as_ref().unwrap();
        assert!(matches!(tail.horizon, QueryHorizon::Projection(_)));
        assert!(tail.query_graph.argument_ids.contains(&Variable::new("a")));
    }

    #[test]
    fn anonymous_numbering_is_deterministic() {
        let build = || {
            let pattern = PathPattern::node(NodePattern::named("a")).step(
                RelationshipPattern::new(Direction::Outgoing).with_type("X"),
                NodePattern::anonymous(),
            );
            let query = SingleQuery {
                clauses: vec![
                    Clause::Match {
                        optional: false,
                        patterns: vec![pattern],
                        hints: Vec::new(),
                        predicate: None,
                    },
                    return_clause(vec![ProjectionItem::new(Expression::var("a"), "a")]),
                ],
            };
            let mut anon = AnonymousVariableGenerator::new();
            build_planner_query(&query, &mut anon, &BTreeSet::new()).unwrap()
        };
        assert_eq!(build(), build());
    }
}
