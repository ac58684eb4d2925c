// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Horizon planning
//!
//! Plans the clause-boundary operations between query parts: projection,
//! aggregation, distinct, sort (Top when a literal limit bounds it), skip
//! and limit, CALL subqueries, and the updating horizons. Aggregation
//! switches to its ordered form when the input already guarantees the
//! grouping prefix's order, saving the hash table.

use crate::ir::{Expression, ProjectionItem, SortItem, Value, Variable};
use crate::plan::{
    CreateCommand, Operator, PlanId, SolvedHorizon, SolvedParts, SortColumn,
};
use crate::planner::{
    eagerness, eagerness::WriteState, idp, rewrite, PlanningContext, PlanningError,
};
use crate::query_graph::{
    AggregationHorizon, PlannerQuery, ProjectionHorizon, QueryHorizon, UpdateAction,
};
use std::collections::BTreeSet;

/// Plans the horizon of one query part on top of `plan`.
pub fn plan_horizon(
    ctx: &mut PlanningContext<'_>,
    plan: PlanId,
    part: &PlannerQuery,
    state: &mut WriteState,
) -> Result<PlanId, PlanningError> {
    match &part.horizon {
        QueryHorizon::Projection(h) => {
            let planned = plan_projection_horizon(ctx, plan, h)?;
            state.record_projection(h);
            Ok(planned)
        }
        QueryHorizon::Aggregation(h) => {
            let planned = plan_aggregation_horizon(ctx, plan, h)?;
            state.record_aggregation(h);
            Ok(planned)
        }
        QueryHorizon::Unwind { variable, expression } => {
            let (plan, expression) = rewrite::rewrite_expression(ctx, plan, expression, true)?;
            let solved = SolvedParts {
                horizon: Some(SolvedHorizon::Unwind {
                    variable: variable.clone(),
                }),
                ..ctx.solved(plan).clone()
            };
            Ok(ctx.add_plan(
                Operator::Unwind {
                    input: plan,
                    variable: variable.clone(),
                    expression,
                },
                solved,
            ))
        }
        QueryHorizon::LoadCsv {
            variable,
            url,
            with_headers,
        } => {
            let solved = SolvedParts {
                horizon: Some(SolvedHorizon::LoadCsv {
                    variable: variable.clone(),
                }),
                ..ctx.solved(plan).clone()
            };
            Ok(ctx.add_plan(
                Operator::LoadCsv {
                    input: plan,
                    variable: variable.clone(),
                    url: url.clone(),
                    with_headers: *with_headers,
                },
                solved,
            ))
        }
        QueryHorizon::CallSubquery { query, imports } => {
            let available = ctx.available(plan);
            let arguments: BTreeSet<Variable> = imports
                .iter()
                .filter(|v| available.contains(*v))
                .cloned()
                .collect();
            let (rhs, _columns) =
                crate::planner::plan_query_with_arguments(ctx, query, &arguments)?;
            let solved = SolvedParts {
                horizon: Some(SolvedHorizon::CallSubquery),
                ..ctx.solved(plan).union(ctx.solved(rhs))
            };
            let op = if arguments.is_empty() {
                Operator::CartesianProduct { lhs: plan, rhs }
            } else {
                Operator::Apply { lhs: plan, rhs }
            };
            Ok(ctx.add_plan(op, solved))
        }
        QueryHorizon::Updates(actions) => plan_updates_horizon(ctx, plan, actions, state),
    }
}

fn plan_projection_horizon(
    ctx: &mut PlanningContext<'_>,
    mut plan: PlanId,
    h: &ProjectionHorizon,
) -> Result<PlanId, PlanningError> {
    // A single bare COUNT subquery over a bare pattern needs no rows at all:
    // the count store answers it as a leaf.
    if let Some(direct) = try_count_store_projection(ctx, plan, h) {
        plan = direct;
    } else {
        let mut expressions: Vec<(Variable, Expression)> = Vec::with_capacity(h.items.len());
        for item in &h.items {
            let (next, expression) =
                rewrite::rewrite_expression(ctx, plan, &item.expression, true)?;
            plan = next;
            expressions.push((item.alias.clone(), expression));
        }
        let passthrough = expressions
            .iter()
            .all(|(alias, expression)| matches!(expression, Expression::Variable(v) if v == alias));
        if !passthrough {
            let keep: BTreeSet<Variable> = expressions
                .iter()
                .filter_map(|(_, e)| match e {
                    Expression::Variable(v) => Some(v.clone()),
                    _ => None,
                })
                .collect();
            let discard: BTreeSet<Variable> = ctx
                .available(plan)
                .into_iter()
                .filter(|v| !keep.contains(v))
                .collect();
            let solved = SolvedParts {
                horizon: Some(SolvedHorizon::Projection {
                    items: h
                        .items
                        .iter()
                        .map(|i| (i.alias.clone(), i.expression.clone()))
                        .collect(),
                    distinct: h.distinct,
                }),
                ..ctx.solved(plan).clone()
            };
            plan = ctx.add_plan(
                Operator::Projection {
                    input: plan,
                    expressions,
                    discard,
                },
                solved,
            );
        }
    }

    if h.distinct {
        let solved = ctx.solved(plan).clone();
        plan = ctx.add_plan(
            Operator::Distinct {
                input: plan,
                expressions: h
                    .items
                    .iter()
                    .map(|i| (i.alias.clone(), Expression::Variable(i.alias.clone())))
                    .collect(),
            },
            solved,
        );
    }

    plan = plan_sort_and_paging(ctx, plan, &h.items, &h.order_by, &h.skip, &h.limit)?;

    if let Some(predicate) = &h.predicate {
        plan = rewrite::solve_horizon_predicate(ctx, plan, predicate)?;
    }
    Ok(plan)
}

fn plan_aggregation_horizon(
    ctx: &mut PlanningContext<'_>,
    mut plan: PlanId,
    h: &AggregationHorizon,
) -> Result<PlanId, PlanningError> {
    let mut grouping: Vec<(Variable, Expression)> = Vec::with_capacity(h.grouping.len());
    for item in &h.grouping {
        let (next, expression) = rewrite::rewrite_expression(ctx, plan, &item.expression, true)?;
        plan = next;
        grouping.push((item.alias.clone(), expression));
    }
    let mut aggregations: Vec<(Variable, Expression)> = Vec::with_capacity(h.aggregations.len());
    for item in &h.aggregations {
        let (next, expression) = rewrite::rewrite_expression(ctx, plan, &item.expression, true)?;
        plan = next;
        aggregations.push((item.alias.clone(), expression));
    }

    let solved = SolvedParts {
        horizon: Some(SolvedHorizon::Aggregation {
            grouping: grouping.clone(),
            aggregations: aggregations.clone(),
        }),
        ..ctx.solved(plan).clone()
    };

    // When the input already delivers rows ordered by a grouping prefix the
    // aggregation can stream instead of hashing.
    let order = provided_order(ctx, plan);
    let ordered_prefix: Vec<Variable> = grouping
        .iter()
        .zip(order.iter())
        .take_while(|((_, expression), ordered)| {
            matches!(expression, Expression::Variable(v) if v == *ordered)
        })
        .map(|(_, ordered)| ordered.clone())
        .collect();

    plan = if ordered_prefix.is_empty() {
        ctx.add_plan(
            Operator::Aggregation {
                input: plan,
                grouping,
                aggregations,
            },
            solved,
        )
    } else {
        ctx.add_plan(
            Operator::OrderedAggregation {
                input: plan,
                grouping,
                aggregations,
                ordered_prefix,
            },
            solved,
        )
    };

    let items: Vec<ProjectionItem> = h.grouping.iter().chain(&h.aggregations).cloned().collect();
    plan = plan_sort_and_paging(ctx, plan, &items, &h.order_by, &h.skip, &h.limit)?;

    if let Some(predicate) = &h.predicate {
        plan = rewrite::solve_horizon_predicate(ctx, plan, predicate)?;
    }
    Ok(plan)
}

/// Sort, skip and limit. A literal limit turns the sort into Top; a skip in
/// front shifts the Top limit to `skip + limit` with the Skip applied after.
fn plan_sort_and_paging(
    ctx: &mut PlanningContext<'_>,
    mut plan: PlanId,
    items: &[ProjectionItem],
    order_by: &[SortItem],
    skip: &Option<Expression>,
    limit: &Option<Expression>,
) -> Result<PlanId, PlanningError> {
    if !order_by.is_empty() {
        let columns: Vec<SortColumn> = order_by
            .iter()
            .map(|sort| SortColumn {
                expression: sort_reference(items, &sort.expression),
                ascending: sort.ascending,
            })
            .collect();
        match limit {
            Some(limit_expression) if literal_row_count(limit_expression).is_some() => {
                let top_limit = match skip {
                    None => limit_expression.clone(),
                    Some(skip_expression) => match (
                        literal_row_count(skip_expression),
                        literal_row_count(limit_expression),
                    ) {
                        (Some(s), Some(l)) => Expression::integer(s + l),
                        _ => Expression::binary(
                            crate::ir::BinaryOp::Add,
                            skip_expression.clone(),
                            limit_expression.clone(),
                        ),
                    },
                };
                let solved = ctx.solved(plan).clone();
                plan = ctx.add_plan(
                    Operator::Top {
                        input: plan,
                        items: columns,
                        limit: top_limit,
                    },
                    solved,
                );
                if let Some(skip_expression) = skip {
                    let solved = ctx.solved(plan).clone();
                    plan = ctx.add_plan(
                        Operator::Skip {
                            input: plan,
                            expression: skip_expression.clone(),
                        },
                        solved,
                    );
                }
                return Ok(plan);
            }
            _ => {
                let solved = ctx.solved(plan).clone();
                plan = ctx.add_plan(
                    Operator::Sort {
                        input: plan,
                        items: columns,
                    },
                    solved,
                );
            }
        }
    }
    if let Some(skip_expression) = skip {
        let solved = ctx.solved(plan).clone();
        plan = ctx.add_plan(
            Operator::Skip {
                input: plan,
                expression: skip_expression.clone(),
            },
            solved,
        );
    }
    if let Some(limit_expression) = limit {
        let solved = ctx.solved(plan).clone();
        plan = ctx.add_plan(
            Operator::Limit {
                input: plan,
                expression: limit_expression.clone(),
            },
            solved,
        );
    }
    Ok(plan)
}

/// Sorting on a projected expression reuses its alias column.
fn sort_reference(items: &[ProjectionItem], expression: &Expression) -> Expression {
    for item in items {
        if item.expression == *expression {
            return Expression::Variable(item.alias.clone());
        }
    }
    expression.clone()
}

fn literal_row_count(expression: &Expression) -> Option<i64> {
    match expression {
        Expression::Literal(Value::Integer(i)) => Some(*i),
        _ => None,
    }
}

/// The column order the plan already guarantees, from its top operators.
fn provided_order(ctx: &PlanningContext<'_>, plan: PlanId) -> Vec<Variable> {
    let mut cursor = plan;
    loop {
        match ctx.arena.get(cursor) {
            Operator::Sort { items, .. } | Operator::Top { items, .. } => {
                return items
                    .iter()
                    .map_while(|c| match &c.expression {
                        Expression::Variable(v) if c.ascending => Some(v.clone()),
                        _ => None,
                    })
                    .collect();
            }
            Operator::Selection { input, .. }
            | Operator::Skip { input, .. }
            | Operator::Limit { input, .. }
            | Operator::Eager { input, .. } => cursor = *input,
            _ => return Vec::new(),
        }
    }
}

/// `RETURN COUNT { <bare pattern> } AS x` with nothing else in the part:
/// the count store leaf replaces row production entirely.
fn try_count_store_projection(
    ctx: &mut PlanningContext<'_>,
    plan: PlanId,
    h: &ProjectionHorizon,
) -> Option<PlanId> {
    if h.items.len() != 1 {
        return None;
    }
    let is_unit = matches!(
        ctx.arena.get(plan),
        Operator::Argument { arguments } if arguments.is_empty()
    );
    if !is_unit {
        return None;
    }
    let item = &h.items[0];
    let Expression::CountSubquery { query } = &item.expression else {
        return None;
    };
    let bound = ctx.available(plan);
    let direct = rewrite::count_store_plan(ctx, query, &bound, &item.alias)?;
    let solved = SolvedParts {
        horizon: Some(SolvedHorizon::Projection {
            items: vec![(item.alias.clone(), item.expression.clone())],
            distinct: h.distinct,
        }),
        ..ctx.solved(direct).clone()
    };
    // Re-keying the solved record requires its own operator; a pass-through
    // projection is the cheapest carrier.
    Some(ctx.add_plan(
        Operator::Projection {
            input: direct,
            expressions: vec![(
                item.alias.clone(),
                Expression::Variable(item.alias.clone()),
            )],
            discard: BTreeSet::new(),
        },
        solved,
    ))
}

fn plan_updates_horizon(
    ctx: &mut PlanningContext<'_>,
    mut plan: PlanId,
    actions: &[UpdateAction],
    state: &mut WriteState,
) -> Result<PlanId, PlanningError> {
    let mut pending_creates: Vec<CreateCommand> = Vec::new();

    fn flush_creates(
        ctx: &mut PlanningContext<'_>,
        plan: &mut PlanId,
        pending: &mut Vec<CreateCommand>,
    ) {
        if !pending.is_empty() {
            let solved = SolvedParts {
                horizon: Some(SolvedHorizon::Updates),
                ..ctx.solved(*plan).clone()
            };
            *plan = ctx.add_plan(
                Operator::Create {
                    input: *plan,
                    commands: std::mem::take(pending),
                },
                solved,
            );
        }
    }

    for action in actions {
        match action {
            UpdateAction::CreateNode {
                variable,
                labels,
                properties,
            } => pending_creates.push(CreateCommand::Node {
                variable: variable.clone(),
                labels: labels.clone(),
                properties: properties.clone(),
            }),
            UpdateAction::CreateRelationship {
                variable,
                left,
                rel_type,
                right,
                direction,
                properties,
            } => pending_creates.push(CreateCommand::Relationship {
                variable: variable.clone(),
                left: left.clone(),
                rel_type: rel_type.clone(),
                right: right.clone(),
                direction: *direction,
                properties: properties.clone(),
            }),
            UpdateAction::Merge {
                read_graph,
                create_actions,
                on_create,
                on_match,
            } => {
                flush_creates(ctx, &mut plan, &mut pending_creates);
                let match_plan = idp::plan_pattern(ctx, read_graph)?;
                let match_plan = rewrite::solve_predicates(ctx, read_graph, match_plan)?;
                let commands = create_actions
                    .iter()
                    .filter_map(|a| match a {
                        UpdateAction::CreateNode {
                            variable,
                            labels,
                            properties,
                        } => Some(CreateCommand::Node {
                            variable: variable.clone(),
                            labels: labels.clone(),
                            properties: properties.clone(),
                        }),
                        UpdateAction::CreateRelationship {
                            variable,
                            left,
                            rel_type,
                            right,
                            direction,
                            properties,
                        } => Some(CreateCommand::Relationship {
                            variable: variable.clone(),
                            left: left.clone(),
                            rel_type: rel_type.clone(),
                            right: right.clone(),
                            direction: *direction,
                            properties: properties.clone(),
                        }),
                        _ => None,
                    })
                    .collect();
                let solved = SolvedParts {
                    horizon: Some(SolvedHorizon::Updates),
                    ..ctx.solved(plan).union(ctx.solved(match_plan))
                };
                plan = ctx.add_plan(
                    Operator::Merge {
                        input: plan,
                        match_plan,
                        commands,
                        on_create: on_create.clone(),
                        on_match: on_match.clone(),
                    },
                    solved,
                );
            }
            UpdateAction::Delete { expression, detach } => {
                flush_creates(ctx, &mut plan, &mut pending_creates);
                let reasons = eagerness::delete_conflicts(state, expression);
                plan = eagerness::apply_barrier(ctx, plan, reasons);
                let (next, expression) =
                    rewrite::rewrite_expression(ctx, plan, expression, true)?;
                plan = next;
                let solved = SolvedParts {
                    horizon: Some(SolvedHorizon::Updates),
                    ..ctx.solved(plan).clone()
                };
                plan = ctx.add_plan(
                    Operator::Delete {
                        input: plan,
                        expression,
                        detach: *detach,
                    },
                    solved,
                );
            }
            UpdateAction::SetProperty {
                subject,
                key,
                value,
            } => {
                flush_creates(ctx, &mut plan, &mut pending_creates);
                let (next, value) = rewrite::rewrite_expression(ctx, plan, value, true)?;
                plan = next;
                let solved = SolvedParts {
                    horizon: Some(SolvedHorizon::Updates),
                    ..ctx.solved(plan).clone()
                };
                plan = ctx.add_plan(
                    Operator::SetProperty {
                        input: plan,
                        subject: subject.clone(),
                        key: key.clone(),
                        value,
                    },
                    solved,
                );
            }
            UpdateAction::SetLabels { subject, labels } => {
                flush_creates(ctx, &mut plan, &mut pending_creates);
                let solved = SolvedParts {
                    horizon: Some(SolvedHorizon::Updates),
                    ..ctx.solved(plan).clone()
                };
                plan = ctx.add_plan(
                    Operator::SetLabels {
                        input: plan,
                        subject: subject.clone(),
                        labels: labels.clone(),
                    },
                    solved,
                );
            }
            UpdateAction::RemoveProperty { subject, key } => {
                flush_creates(ctx, &mut plan, &mut pending_creates);
                let solved = SolvedParts {
                    horizon: Some(SolvedHorizon::Updates),
                    ..ctx.solved(plan).clone()
                };
                plan = ctx.add_plan(
                    Operator::RemoveProperty {
                        input: plan,
                        subject: subject.clone(),
                        key: key.clone(),
                    },
                    solved,
                );
            }
            UpdateAction::RemoveLabels { subject, labels } => {
                flush_creates(ctx, &mut plan, &mut pending_creates);
                let solved = SolvedParts {
                    horizon: Some(SolvedHorizon::Updates),
                    ..ctx.solved(plan).clone()
                };
                plan = ctx.add_plan(
                    Operator::RemoveLabels {
                        input: plan,
                        subject: subject.clone(),
                        labels: labels.clone(),
                    },
                    solved,
                );
            }
            UpdateAction::Foreach {
                variable,
                list,
                actions,
            } => {
                flush_creates(ctx, &mut plan, &mut pending_creates);
                let (next, list) = rewrite::rewrite_expression(ctx, plan, list, true)?;
                plan = next;
                let solved = SolvedParts {
                    horizon: Some(SolvedHorizon::Updates),
                    ..ctx.solved(plan).clone()
                };
                plan = ctx.add_plan(
                    Operator::Foreach {
                        input: plan,
                        variable: variable.clone(),
                        list,
                        actions: actions.clone(),
                    },
                    solved,
                );
            }
        }
    }
    flush_creates(ctx, &mut plan, &mut pending_creates);
    state.record_updates(actions);
    Ok(plan)
}
