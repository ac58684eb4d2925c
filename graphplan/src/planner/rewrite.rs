// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Pattern predicate and subquery rewriting
//!
//! Every predicate or projected expression containing a pattern construct is
//! lowered to the cheapest correct physical form. The precedence is fixed
//! and testable: a degree lookup beats the SemiApply family, which beats a
//! nested plan expression, which beats RollUpApply only where eager
//! collection would change semantics (inside coalesce/head, container
//! indexing, list slicing); everywhere else RollUpApply wins over a nested
//! plan. A construct that fits none of these aborts compilation: silently
//! dropping it would produce wrong results.

use crate::ir::{
    BinaryOp, Clause, Direction, Expression, NestedPlanKind, PathPattern, ProjectionItem, Query,
    RelationshipChain, SingleQuery, Variable,
};
use crate::plan::{Operator, PlanId, SolvedHorizon, SolvedParts};
use crate::planner::{idp, selection, PlanningContext, PlanningError};
use crate::query_graph::{chain_query_graph, Predicate, QueryGraph};
use std::collections::BTreeSet;

/// A degree-expressible pattern: one hop from a bound node to an
/// unconstrained anonymous neighbour over an unconstrained relationship.
#[derive(Debug, Clone, PartialEq)]
pub struct DegreeForm {
    pub node: Variable,
    pub rel_type: Option<String>,
    pub direction: Direction,
}

/// Recognizes the degree form of a chain given the variables bound outside.
pub fn degree_form(chain: &RelationshipChain, bound: &BTreeSet<Variable>) -> Option<DegreeForm> {
    if chain.steps.len() != 1 {
        return None;
    }
    let (rel, far) = &chain.steps[0];
    if !rel.length.is_simple()
        || !rel.properties.is_empty()
        || rel.variable.is_some()
        || rel.types.len() > 1
    {
        return None;
    }
    let rel_type = rel.types.first().cloned();
    let start_bound = chain
        .start
        .variable
        .as_ref()
        .map(|v| bound.contains(v))
        .unwrap_or(false);
    let far_bound = far
        .variable
        .as_ref()
        .map(|v| bound.contains(v))
        .unwrap_or(false);
    if start_bound && far.variable.is_none() && far.is_unconstrained() && chain.start.is_unconstrained()
    {
        return Some(DegreeForm {
            node: chain.start.variable.clone().expect("bound start"),
            rel_type,
            direction: rel.direction,
        });
    }
    if far_bound && chain.start.variable.is_none() && chain.start.is_unconstrained() && far.is_unconstrained()
    {
        return Some(DegreeForm {
            node: far.variable.clone().expect("bound far node"),
            rel_type,
            direction: rel.direction.reversed(),
        });
    }
    None
}

/// Solves every remaining selection of `qg` at `plan`: subquery-shaped
/// predicates through the Apply family, the rest through one ordered
/// Selection.
pub fn solve_predicates(
    ctx: &mut PlanningContext<'_>,
    qg: &QueryGraph,
    mut plan: PlanId,
) -> Result<PlanId, PlanningError> {
    let pending: Vec<Predicate> = qg
        .selections
        .iter()
        .filter(|p| !ctx.solved(plan).covers_predicate(&p.expression))
        .cloned()
        .collect();
    let mut residuals: Vec<Predicate> = Vec::new();
    for predicate in pending {
        if !predicate.is_solvable(&ctx.available(plan)) {
            return Err(PlanningError::InvariantViolation(format!(
                "predicate `{:?}` references variables the plan never binds",
                predicate.dependencies
            )));
        }
        if predicate.expression.contains_subquery_construct() {
            let (next, residual) = plan_shaped_predicate(ctx, plan, &predicate)?;
            plan = next;
            if let Some(expression) = residual {
                residuals.push(Predicate {
                    dependencies: predicate.dependencies.clone(),
                    expression,
                });
            }
        } else {
            residuals.push(predicate);
        }
    }
    Ok(selection::plan_selection(ctx, plan, residuals, qg))
}

/// Solves a WITH ... WHERE predicate against the projected columns, going
/// through the same shaped-predicate machinery as pattern selections.
pub fn solve_horizon_predicate(
    ctx: &mut PlanningContext<'_>,
    mut plan: PlanId,
    expression: &Expression,
) -> Result<PlanId, PlanningError> {
    let mut residuals: Vec<Predicate> = Vec::new();
    for conjunct in expression.clone().conjuncts() {
        let predicate = Predicate::new(conjunct);
        if predicate.expression.contains_subquery_construct() {
            let (next, residual) = plan_shaped_predicate(ctx, plan, &predicate)?;
            plan = next;
            if let Some(expression) = residual {
                residuals.push(Predicate::new(expression));
            }
        } else {
            residuals.push(predicate);
        }
    }
    Ok(selection::plan_selection(
        ctx,
        plan,
        residuals,
        &QueryGraph::empty(),
    ))
}

/// Lowers one subquery-shaped predicate. Returns the (possibly unchanged)
/// plan and a residual expression for the ordinary Selection when the
/// construct collapsed to a cheap test.
fn plan_shaped_predicate(
    ctx: &mut PlanningContext<'_>,
    plan: PlanId,
    predicate: &Predicate,
) -> Result<(PlanId, Option<Expression>), PlanningError> {
    let bound = ctx.available(plan);
    match &predicate.expression {
        Expression::PatternExpression { chain } => {
            if let Some(form) = degree_form(chain, &bound) {
                return Ok((plan, Some(degree_greater_than(&form, 0))));
            }
            let semi = plan_chain_apply(ctx, plan, chain, None, false, predicate)?;
            Ok((semi, None))
        }
        Expression::Not(inner) => match inner.as_ref() {
            Expression::PatternExpression { chain } => {
                if let Some(form) = degree_form(chain, &bound) {
                    return Ok((plan, Some(Expression::not(degree_greater_than(&form, 0)))));
                }
                let anti = plan_chain_apply(ctx, plan, chain, None, true, predicate)?;
                Ok((anti, None))
            }
            Expression::ExistsSubquery { query } => {
                if let Some(chain) = exists_as_chain(query) {
                    if let Some(form) = degree_form(&chain, &bound) {
                        return Ok((plan, Some(Expression::not(degree_greater_than(&form, 0)))));
                    }
                }
                let rhs = plan_inner_query(ctx, query, &bound)?.0;
                let solved = ctx.solved(plan).clone().with_predicate(predicate.clone());
                Ok((
                    ctx.add_plan(Operator::AntiSemiApply { lhs: plan, rhs }, solved),
                    None,
                ))
            }
            _ => {
                let (plan, expression) =
                    rewrite_expression(ctx, plan, &predicate.expression, true)?;
                Ok((plan, Some(expression)))
            }
        },
        Expression::ExistsSubquery { query } => {
            if let Some(chain) = exists_as_chain(query) {
                if let Some(form) = degree_form(&chain, &bound) {
                    return Ok((plan, Some(degree_greater_than(&form, 0))));
                }
                let semi = plan_chain_apply(ctx, plan, &chain, None, false, predicate)?;
                return Ok((semi, None));
            }
            let rhs = plan_inner_query(ctx, query, &bound)?.0;
            let solved = ctx.solved(plan).clone().with_predicate(predicate.clone());
            Ok((
                ctx.add_plan(Operator::SemiApply { lhs: plan, rhs }, solved),
                None,
            ))
        }
        Expression::Or(items) => plan_or_predicate(ctx, plan, items, predicate),
        Expression::Binary { op: BinaryOp::Gt, lhs, rhs } => {
            // COUNT { (a)-[:X]->() } > k collapses to a degree comparison.
            if let Expression::CountSubquery { query } = lhs.as_ref() {
                if let Some(chain) = exists_as_chain(query) {
                    if let Some(form) = degree_form(&chain, &bound) {
                        return Ok((
                            plan,
                            Some(Expression::HasDegreeGreaterThan {
                                node: form.node,
                                rel_type: form.rel_type,
                                direction: form.direction,
                                degree: Box::new(rhs.as_ref().clone()),
                            }),
                        ));
                    }
                }
            }
            let (plan, expression) = rewrite_expression(ctx, plan, &predicate.expression, true)?;
            Ok((plan, Some(expression)))
        }
        _ => {
            let (plan, expression) = rewrite_expression(ctx, plan, &predicate.expression, true)?;
            Ok((plan, Some(expression)))
        }
    }
}

fn degree_greater_than(form: &DegreeForm, threshold: i64) -> Expression {
    Expression::HasDegreeGreaterThan {
        node: form.node.clone(),
        rel_type: form.rel_type.clone(),
        direction: form.direction,
        degree: Box::new(Expression::integer(threshold)),
    }
}

/// Plans the right-hand side for a chain-shaped existence test and attaches
/// the requested Apply variant.
fn plan_chain_apply(
    ctx: &mut PlanningContext<'_>,
    plan: PlanId,
    chain: &RelationshipChain,
    extra_predicate: Option<&Expression>,
    negated: bool,
    original: &Predicate,
) -> Result<PlanId, PlanningError> {
    let bound = ctx.available(plan);
    let inner_qg = chain_query_graph(chain, extra_predicate, &bound, &mut ctx.anon);
    let rhs = idp::plan_pattern(ctx, &inner_qg)?;
    let rhs = solve_predicates(ctx, &inner_qg, rhs)?;
    let solved = ctx.solved(plan).clone().with_predicate(original.clone());
    let op = if negated {
        Operator::AntiSemiApply { lhs: plan, rhs }
    } else {
        Operator::SemiApply { lhs: plan, rhs }
    };
    Ok(ctx.add_plan(op, solved))
}

/// One subquery-shaped disjunct of an OR predicate; plain disjuncts are
/// collected separately.
enum OrItem {
    Pattern { chain: RelationshipChain, negated: bool },
    Exists { query: Box<Query>, negated: bool },
}

/// Plans `p1 OR p2 OR ...` where at least one disjunct is subquery-shaped.
/// Every pattern disjunct but the last binds an intermediate boolean through
/// a Let variant so later branches short-circuit on it; the final disjunct
/// becomes the closing SelectOr/Semi variant.
fn plan_or_predicate(
    ctx: &mut PlanningContext<'_>,
    mut plan: PlanId,
    items: &[Expression],
    original: &Predicate,
) -> Result<(PlanId, Option<Expression>), PlanningError> {
    let bound = ctx.available(plan);
    let mut plains: Vec<Expression> = Vec::new();
    let mut shaped: Vec<OrItem> = Vec::new();

    for item in items {
        match item {
            Expression::PatternExpression { chain } => {
                if let Some(form) = degree_form(chain, &bound) {
                    plains.push(degree_greater_than(&form, 0));
                } else {
                    shaped.push(OrItem::Pattern {
                        chain: chain.clone(),
                        negated: false,
                    });
                }
            }
            Expression::Not(inner) => match inner.as_ref() {
                Expression::PatternExpression { chain } => {
                    if let Some(form) = degree_form(chain, &bound) {
                        plains.push(Expression::not(degree_greater_than(&form, 0)));
                    } else {
                        shaped.push(OrItem::Pattern {
                            chain: chain.clone(),
                            negated: true,
                        });
                    }
                }
                Expression::ExistsSubquery { query } => shaped.push(OrItem::Exists {
                    query: query.clone(),
                    negated: true,
                }),
                _ => plains.push(item.clone()),
            },
            Expression::ExistsSubquery { query } => shaped.push(OrItem::Exists {
                query: query.clone(),
                negated: false,
            }),
            other if other.contains_subquery_construct() => {
                // Comprehensions and COUNT inside a disjunct lower through
                // the expression rewriter; the result is a plain test.
                let (next, expression) = rewrite_expression(ctx, plan, other, true)?;
                plan = next;
                plains.push(expression);
            }
            other => plains.push(other.clone()),
        }
    }

    if shaped.is_empty() {
        return Ok((plan, Some(Expression::or_all(plains))));
    }

    let mut carried: Option<Expression> = if plains.is_empty() {
        None
    } else {
        Some(Expression::or_all(plains))
    };

    let total = shaped.len();
    for (i, item) in shaped.into_iter().enumerate() {
        let last = i + 1 == total;
        let (rhs, negated) = match item {
            OrItem::Pattern { chain, negated } => {
                let bound = ctx.available(plan);
                let inner_qg = chain_query_graph(&chain, None, &bound, &mut ctx.anon);
                let rhs = idp::plan_pattern(ctx, &inner_qg)?;
                let rhs = solve_predicates(ctx, &inner_qg, rhs)?;
                (rhs, negated)
            }
            OrItem::Exists { query, negated } => {
                let bound = ctx.available(plan);
                let rhs = plan_inner_query(ctx, &query, &bound)?.0;
                (rhs, negated)
            }
        };
        let solved = if last {
            ctx.solved(plan).clone().with_predicate(original.clone())
        } else {
            ctx.solved(plan).clone()
        };
        let op = match (last, carried.take(), negated) {
            (true, None, false) => Operator::SemiApply { lhs: plan, rhs },
            (true, None, true) => Operator::AntiSemiApply { lhs: plan, rhs },
            (true, Some(expression), false) => Operator::SelectOrSemiApply {
                lhs: plan,
                rhs,
                expression,
            },
            (true, Some(expression), true) => Operator::SelectOrAntiSemiApply {
                lhs: plan,
                rhs,
                expression,
            },
            (false, carried_expr, negated) => {
                let variable = ctx.anon.fresh();
                let op = match (carried_expr, negated) {
                    (None, false) => Operator::LetSemiApply {
                        lhs: plan,
                        rhs,
                        variable: variable.clone(),
                    },
                    (None, true) => Operator::LetAntiSemiApply {
                        lhs: plan,
                        rhs,
                        variable: variable.clone(),
                    },
                    (Some(expression), false) => Operator::LetSelectOrSemiApply {
                        lhs: plan,
                        rhs,
                        variable: variable.clone(),
                        expression,
                    },
                    (Some(expression), true) => Operator::LetSelectOrAntiSemiApply {
                        lhs: plan,
                        rhs,
                        variable: variable.clone(),
                        expression,
                    },
                };
                carried = Some(Expression::Variable(variable));
                op
            }
        };
        plan = ctx.add_plan(op, solved);
    }
    Ok((plan, None))
}

/// Rewrites a projected expression, attaching whatever sub-plans it needs.
///
/// `eager_ok` is false inside contexts where eagerly collecting the whole
/// result list would change semantics (coalesce/head arguments, container
/// indexing, list slicing); there a nested plan expression is used instead
/// of RollUpApply. Nesting resets the flag: inside an inner plan the rule
/// applies afresh, so one expression tree can mix both forms.
pub fn rewrite_expression(
    ctx: &mut PlanningContext<'_>,
    plan: PlanId,
    expr: &Expression,
    eager_ok: bool,
) -> Result<(PlanId, Expression), PlanningError> {
    match expr {
        Expression::PatternComprehension {
            chain,
            predicate,
            projection,
        } => {
            let bound = ctx.available(plan);
            let inner_qg =
                chain_query_graph(chain, predicate.as_deref(), &bound, &mut ctx.anon);
            let rhs = idp::plan_pattern(ctx, &inner_qg)?;
            let rhs = solve_predicates(ctx, &inner_qg, rhs)?;
            // The projection runs against the inner rows; comprehensions
            // nested inside it plan against the inner plan.
            let (rhs, projected) = rewrite_expression(ctx, rhs, projection, true)?;
            if eager_ok {
                let item = ctx.anon.fresh();
                let rhs_solved = ctx.solved(rhs).clone();
                let projected_rhs = ctx.add_plan(
                    Operator::Projection {
                        input: rhs,
                        expressions: vec![(item.clone(), projected)],
                        discard: BTreeSet::new(),
                    },
                    SolvedParts {
                        horizon: Some(SolvedHorizon::Projection {
                            items: vec![(item.clone(), projection.as_ref().clone())],
                            distinct: false,
                        }),
                        ..rhs_solved
                    },
                );
                let collection = ctx.anon.fresh();
                let solved = ctx.solved(plan).clone();
                let rolled = ctx.add_plan(
                    Operator::RollUpApply {
                        lhs: plan,
                        rhs: projected_rhs,
                        collection: collection.clone(),
                        variable: item,
                    },
                    solved,
                );
                Ok((rolled, Expression::Variable(collection)))
            } else {
                Ok((
                    plan,
                    Expression::NestedPlan {
                        kind: NestedPlanKind::Collect,
                        plan: rhs,
                        projection: Some(Box::new(projected)),
                        column: None,
                    },
                ))
            }
        }
        Expression::PatternExpression { chain } => {
            let bound = ctx.available(plan);
            if let Some(form) = degree_form(chain, &bound) {
                return Ok((plan, degree_greater_than(&form, 0)));
            }
            let inner_qg = chain_query_graph(chain, None, &bound, &mut ctx.anon);
            let rhs = idp::plan_pattern(ctx, &inner_qg)?;
            let rhs = solve_predicates(ctx, &inner_qg, rhs)?;
            Ok((
                plan,
                Expression::NestedPlan {
                    kind: NestedPlanKind::Exists,
                    plan: rhs,
                    projection: None,
                    column: None,
                },
            ))
        }
        Expression::ExistsSubquery { query } => {
            let bound = ctx.available(plan);
            if let Some(chain) = exists_as_chain(query) {
                if let Some(form) = degree_form(&chain, &bound) {
                    return Ok((plan, degree_greater_than(&form, 0)));
                }
            }
            let rhs = plan_inner_query(ctx, query, &bound)?.0;
            Ok((
                plan,
                Expression::NestedPlan {
                    kind: NestedPlanKind::Exists,
                    plan: rhs,
                    projection: None,
                    column: None,
                },
            ))
        }
        Expression::CountSubquery { query } => plan_count(ctx, plan, query, eager_ok),
        // Eager collection is illegal inside these evaluation positions.
        Expression::FunctionCall { name, args, distinct }
            if name.eq_ignore_ascii_case("coalesce") || name.eq_ignore_ascii_case("head") =>
        {
            let mut plan = plan;
            let mut rewritten = Vec::with_capacity(args.len());
            for arg in args {
                let (next, expression) = rewrite_expression(ctx, plan, arg, false)?;
                plan = next;
                rewritten.push(expression);
            }
            Ok((
                plan,
                Expression::FunctionCall {
                    name: name.clone(),
                    args: rewritten,
                    distinct: *distinct,
                },
            ))
        }
        Expression::ContainerIndex { subject, index } => {
            let (plan, subject) = rewrite_expression(ctx, plan, subject, false)?;
            let (plan, index) = rewrite_expression(ctx, plan, index, false)?;
            Ok((
                plan,
                Expression::ContainerIndex {
                    subject: Box::new(subject),
                    index: Box::new(index),
                },
            ))
        }
        Expression::ListSlice { subject, from, to } => {
            let (mut plan, subject) = rewrite_expression(ctx, plan, subject, false)?;
            let from = match from {
                Some(e) => {
                    let (next, expression) = rewrite_expression(ctx, plan, e, false)?;
                    plan = next;
                    Some(Box::new(expression))
                }
                None => None,
            };
            let to = match to {
                Some(e) => {
                    let (next, expression) = rewrite_expression(ctx, plan, e, false)?;
                    plan = next;
                    Some(Box::new(expression))
                }
                None => None,
            };
            Ok((
                plan,
                Expression::ListSlice {
                    subject: Box::new(subject),
                    from,
                    to,
                },
            ))
        }
        other => rewrite_children(ctx, plan, other, eager_ok),
    }
}

/// Lowers a COUNT subquery: count store when the body is a bare pattern,
/// a degree lookup when it is a correlated single hop, and otherwise the
/// fully planned body under Aggregation(count(*)).
fn plan_count(
    ctx: &mut PlanningContext<'_>,
    plan: PlanId,
    query: &Query,
    eager_ok: bool,
) -> Result<(PlanId, Expression), PlanningError> {
    let bound = ctx.available(plan);

    if let Some(chain) = exists_as_chain(query) {
        if let Some(form) = degree_form(&chain, &bound) {
            return Ok((
                plan,
                Expression::GetDegree {
                    node: form.node,
                    rel_type: form.rel_type,
                    direction: form.direction,
                },
            ));
        }
    }

    let count_var = ctx.anon.fresh();
    let rhs = match count_store_plan(ctx, query, &bound, &count_var) {
        Some(plan) => plan,
        None => {
            let inner = plan_inner_query(ctx, query, &bound)?.0;
            let inner_solved = ctx.solved(inner).clone();
            ctx.add_plan(
                Operator::Aggregation {
                    input: inner,
                    grouping: Vec::new(),
                    aggregations: vec![(count_var.clone(), Expression::CountStar)],
                },
                SolvedParts {
                    horizon: Some(SolvedHorizon::Aggregation {
                        grouping: Vec::new(),
                        aggregations: vec![(count_var.clone(), Expression::CountStar)],
                    }),
                    ..inner_solved
                },
            )
        }
    };

    if eager_ok {
        let solved = ctx.solved(plan).union(ctx.solved(rhs));
        let applied = ctx.add_plan(Operator::Apply { lhs: plan, rhs }, solved);
        Ok((applied, Expression::Variable(count_var)))
    } else {
        Ok((
            plan,
            Expression::NestedPlan {
                kind: NestedPlanKind::GetByName,
                plan: rhs,
                projection: None,
                column: Some(count_var),
            },
        ))
    }
}

/// A count-store leaf for a bare, uncorrelated pattern body, if legal.
pub(crate) fn count_store_plan(
    ctx: &mut PlanningContext<'_>,
    query: &Query,
    bound: &BTreeSet<Variable>,
    count_var: &Variable,
) -> Option<PlanId> {
    let pattern = bare_match_pattern(query)?;
    if pattern.selector.is_some() {
        return None;
    }
    let named: Vec<&Variable> = pattern
        .start
        .variable
        .iter()
        .chain(pattern.steps.iter().filter_map(|(_, n)| n.variable.as_ref()))
        .collect();
    // A variable shared with the outer scope correlates the count.
    if named.iter().any(|v| bound.contains(*v)) {
        return None;
    }
    match pattern.steps.len() {
        0 => {
            let node = &pattern.start;
            if !node.properties.is_empty() || node.labels.len() > 1 {
                return None;
            }
            Some(ctx.add_plan(
                Operator::NodeCountFromCountStore {
                    variable: count_var.clone(),
                    labels: vec![node.labels.first().cloned()],
                },
                SolvedParts::empty(),
            ))
        }
        1 => {
            let (connector, far) = &pattern.steps[0];
            let rel = match connector {
                crate::ir::PatternConnector::Relationship(rel) => rel,
                crate::ir::PatternConnector::Quantified(_) => return None,
            };
            let near = &pattern.start;
            if !rel.length.is_simple()
                || !rel.properties.is_empty()
                || rel.types.len() > 1
                || !near.properties.is_empty()
                || !far.properties.is_empty()
                || near.labels.len() > 1
                || far.labels.len() > 1
            {
                return None;
            }
            // The count store indexes one labelled side at most.
            if !near.labels.is_empty() && !far.labels.is_empty() {
                return None;
            }
            let (from_label, to_label) = match rel.direction {
                Direction::Outgoing => {
                    (near.labels.first().cloned(), far.labels.first().cloned())
                }
                Direction::Incoming => {
                    (far.labels.first().cloned(), near.labels.first().cloned())
                }
                Direction::Both => {
                    if !near.labels.is_empty() || !far.labels.is_empty() {
                        return None;
                    }
                    (None, None)
                }
            };
            Some(ctx.add_plan(
                Operator::RelationshipCountFromCountStore {
                    variable: count_var.clone(),
                    from_label,
                    rel_type: rel.types.first().cloned(),
                    to_label,
                },
                SolvedParts::empty(),
            ))
        }
        _ => None,
    }
}

/// The single pattern of a body that is just `MATCH <pattern>` (with an
/// optional plain RETURN), or nothing.
fn bare_match_pattern(query: &Query) -> Option<&PathPattern> {
    let Query::Single(single) = query else {
        return None;
    };
    let mut match_pattern: Option<&PathPattern> = None;
    for (i, clause) in single.clauses.iter().enumerate() {
        match clause {
            Clause::Match {
                optional: false,
                patterns,
                hints,
                predicate: None,
            } if i == 0 && patterns.len() == 1 && hints.is_empty() => {
                match_pattern = Some(&patterns[0]);
            }
            Clause::Return {
                distinct: false,
                order_by,
                skip: None,
                limit: None,
                ..
            } if i == 1 && order_by.is_empty() => {}
            _ => return None,
        }
    }
    match_pattern
}

/// The chain form of an EXISTS/COUNT body that is a bare single-pattern
/// MATCH, used for the degree rewrite.
fn exists_as_chain(query: &Query) -> Option<RelationshipChain> {
    bare_match_pattern(query).and_then(|p| p.as_chain())
}

/// Plans a full inner query through the whole pipeline, with the outer
/// bindings as arguments. Returns the plan and its output columns.
pub fn plan_inner_query(
    ctx: &mut PlanningContext<'_>,
    query: &Query,
    outer: &BTreeSet<Variable>,
) -> Result<(PlanId, Vec<Variable>), PlanningError> {
    let arguments: BTreeSet<Variable> = query
        .external_references()
        .into_iter()
        .filter(|v| outer.contains(v))
        .collect();
    let query = ensure_terminated(query, ctx);
    crate::planner::plan_query_with_arguments(ctx, &query, &arguments)
}

/// EXISTS/COUNT bodies may omit RETURN; planning needs a horizon, so a
/// synthetic single-column RETURN is appended.
fn ensure_terminated(query: &Query, ctx: &mut PlanningContext<'_>) -> Query {
    fn needs_return(single: &SingleQuery) -> bool {
        !matches!(
            single.clauses.last(),
            Some(Clause::Return { .. }) | Some(Clause::With { .. })
        ) && !single.clauses.iter().any(|c| c.is_updating())
    }
    match query {
        Query::Single(single) if needs_return(single) => {
            let mut clauses = single.clauses.clone();
            let alias = ctx.anon.fresh();
            clauses.push(Clause::Return {
                distinct: false,
                items: vec![ProjectionItem {
                    expression: Expression::integer(1),
                    alias,
                }],
                order_by: Vec::new(),
                skip: None,
                limit: None,
            });
            Query::Single(SingleQuery { clauses })
        }
        other => other.clone(),
    }
}

/// A pattern construct whose dependencies include a list-bound variable
/// cannot be planned as a correlated sub-plan (the binder is not a plan
/// column). Rejecting it beats silently planning the wrong scope.
fn reject_binder_correlated_patterns(
    body: &Expression,
    binder: &Variable,
) -> Result<(), PlanningError> {
    fn correlated(expr: &Expression, binder: &Variable) -> bool {
        match expr {
            Expression::PatternExpression { chain } => {
                chain.named_variables().contains(binder)
            }
            Expression::PatternComprehension { chain, .. } => {
                chain.named_variables().contains(binder) || expr.dependencies().contains(binder)
            }
            Expression::ExistsSubquery { query } | Expression::CountSubquery { query } => {
                query.external_references().contains(binder)
            }
            other => {
                let mut found = false;
                other.for_each_child(&mut |child| {
                    if correlated(child, binder) {
                        found = true;
                    }
                });
                found
            }
        }
    }
    if correlated(body, binder) {
        return Err(PlanningError::UnsupportedFeature(format!(
            "pattern subquery correlated with list-bound variable `{}`",
            binder
        )));
    }
    Ok(())
}

/// Default recursion: rewrite child expressions and rebuild the node.
fn rewrite_children(
    ctx: &mut PlanningContext<'_>,
    mut plan: PlanId,
    expr: &Expression,
    eager_ok: bool,
) -> Result<(PlanId, Expression), PlanningError> {
    let mut rw = |ctx: &mut PlanningContext<'_>,
                  plan: &mut PlanId,
                  e: &Expression,
                  eager: bool|
     -> Result<Expression, PlanningError> {
        let (next, expression) = rewrite_expression(ctx, *plan, e, eager)?;
        *plan = next;
        Ok(expression)
    };

    let rebuilt = match expr {
        Expression::Variable(_)
        | Expression::Parameter(_)
        | Expression::Literal(_)
        | Expression::CountStar
        | Expression::GetDegree { .. }
        | Expression::NestedPlan { .. } => expr.clone(),
        Expression::Property { subject, key } => Expression::Property {
            subject: Box::new(rw(ctx, &mut plan, subject, eager_ok)?),
            key: key.clone(),
        },
        Expression::HasLabels { subject, labels } => Expression::HasLabels {
            subject: Box::new(rw(ctx, &mut plan, subject, eager_ok)?),
            labels: labels.clone(),
        },
        Expression::And(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(rw(ctx, &mut plan, item, eager_ok)?);
            }
            Expression::And(out)
        }
        Expression::Or(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(rw(ctx, &mut plan, item, eager_ok)?);
            }
            Expression::Or(out)
        }
        Expression::Not(inner) => {
            Expression::not(rw(ctx, &mut plan, inner, eager_ok)?)
        }
        Expression::Binary { op, lhs, rhs } => Expression::Binary {
            op: *op,
            lhs: Box::new(rw(ctx, &mut plan, lhs, eager_ok)?),
            rhs: Box::new(rw(ctx, &mut plan, rhs, eager_ok)?),
        },
        Expression::IsNull(inner) => {
            Expression::IsNull(Box::new(rw(ctx, &mut plan, inner, eager_ok)?))
        }
        Expression::IsNotNull(inner) => {
            Expression::IsNotNull(Box::new(rw(ctx, &mut plan, inner, eager_ok)?))
        }
        Expression::FunctionCall { name, args, distinct } => {
            let mut out = Vec::with_capacity(args.len());
            for arg in args {
                out.push(rw(ctx, &mut plan, arg, eager_ok)?);
            }
            Expression::FunctionCall {
                name: name.clone(),
                args: out,
                distinct: *distinct,
            }
        }
        Expression::ListLiteral(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(rw(ctx, &mut plan, item, eager_ok)?);
            }
            Expression::ListLiteral(out)
        }
        Expression::MapLiteral(entries) => {
            let mut out = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                out.push((key.clone(), rw(ctx, &mut plan, value, eager_ok)?));
            }
            Expression::MapLiteral(out)
        }
        Expression::ListComprehension {
            variable,
            list,
            predicate,
            projection,
        } => {
            for body in predicate.iter().chain(projection.iter()) {
                reject_binder_correlated_patterns(body, variable)?;
            }
            Expression::ListComprehension {
                variable: variable.clone(),
                list: Box::new(rw(ctx, &mut plan, list, eager_ok)?),
                predicate: match predicate {
                    Some(p) => Some(Box::new(rw(ctx, &mut plan, p, eager_ok)?)),
                    None => None,
                },
                projection: match projection {
                    Some(p) => Some(Box::new(rw(ctx, &mut plan, p, eager_ok)?)),
                    None => None,
                },
            }
        }
        Expression::Quantified {
            quantifier,
            variable,
            list,
            predicate,
        } => {
            reject_binder_correlated_patterns(predicate, variable)?;
            Expression::Quantified {
                quantifier: *quantifier,
                variable: variable.clone(),
                list: Box::new(rw(ctx, &mut plan, list, eager_ok)?),
                predicate: Box::new(rw(ctx, &mut plan, predicate, eager_ok)?),
            }
        }
        Expression::Reduce {
            accumulator,
            init,
            variable,
            list,
            expression,
        } => {
            reject_binder_correlated_patterns(expression, variable)?;
            Expression::Reduce {
                accumulator: accumulator.clone(),
                init: Box::new(rw(ctx, &mut plan, init, eager_ok)?),
                variable: variable.clone(),
                list: Box::new(rw(ctx, &mut plan, list, eager_ok)?),
                expression: Box::new(rw(ctx, &mut plan, expression, eager_ok)?),
            }
        }
        Expression::HasDegreeGreaterThan {
            node,
            rel_type,
            direction,
            degree,
        } => Expression::HasDegreeGreaterThan {
            node: node.clone(),
            rel_type: rel_type.clone(),
            direction: *direction,
            degree: Box::new(rw(ctx, &mut plan, degree, eager_ok)?),
        },
        // Handled by rewrite_expression before delegating here.
        Expression::PatternExpression { .. }
        | Expression::PatternComprehension { .. }
        | Expression::ExistsSubquery { .. }
        | Expression::CountSubquery { .. }
        | Expression::ContainerIndex { .. }
        | Expression::ListSlice { .. } => {
            return Err(PlanningError::Unrealizable(format!(
                "expression reached default recursion unexpectedly: {:?}",
                std::mem::discriminant(expr)
            )))
        }
    };
    Ok((plan, rebuilt))
}
