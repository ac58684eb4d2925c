// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Plan rendering
//!
//! Renders an operator tree one operator per line, children indented, with
//! the details that identify the operator semantically. The rendering is
//! deterministic and doubles as the structural fingerprint used by tests.

use crate::ir::{BinaryOp, Expression, NestedPlanKind, PatternLength, Quantifier};
use crate::plan::arena::{PlanArena, PlanId, PlanningAttributes};
use crate::plan::operator::{Operator, SeekKind};
use std::fmt;

/// Borrowing wrapper that renders a plan tree.
pub struct PlanDisplay<'a> {
    pub arena: &'a PlanArena,
    pub root: PlanId,
    pub attributes: Option<&'a PlanningAttributes>,
}

impl fmt::Display for PlanDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, self.root, 0)
    }
}

impl PlanDisplay<'_> {
    fn render(&self, f: &mut fmt::Formatter<'_>, id: PlanId, depth: usize) -> fmt::Result {
        let op = self.arena.get(id);
        for _ in 0..depth {
            write!(f, "| ")?;
        }
        write!(f, "+{}", op.name())?;
        let detail = operator_detail(op);
        if !detail.is_empty() {
            write!(f, " {}", detail)?;
        }
        if let Some(attrs) = self.attributes {
            write!(
                f,
                "  {{rows: {:.1}, cost: {:.1}}}",
                attrs.cardinality(id).0,
                attrs.cost(id).0
            )?;
        }
        writeln!(f)?;
        for child in op.children() {
            self.render(f, child, depth + 1)?;
        }
        // Nested plans embedded in expressions render as separate subtrees.
        for nested in nested_plans_of(op) {
            for _ in 0..(depth + 1) {
                write!(f, "| ")?;
            }
            writeln!(f, "(nested {})", nested)?;
            self.render(f, nested, depth + 2)?;
        }
        Ok(())
    }
}

/// Nested plan handles referenced from the operator's expressions.
pub(crate) fn nested_plans_of(op: &Operator) -> Vec<PlanId> {
    let mut out = Vec::new();
    for expr in operator_expressions(op) {
        collect_nested(expr, &mut out);
    }
    out
}

fn collect_nested(expr: &Expression, out: &mut Vec<PlanId>) {
    if let Expression::NestedPlan { plan, .. } = expr {
        out.push(*plan);
    }
    expr.for_each_child(&mut |child| collect_nested(child, out));
}

/// Expressions attached to an operator, for nested-plan discovery.
fn operator_expressions(op: &Operator) -> Vec<&Expression> {
    use Operator::*;
    match op {
        Selection { predicates, .. } => predicates.iter().collect(),
        Projection { expressions, .. } | Distinct { expressions, .. } => {
            expressions.iter().map(|(_, e)| e).collect()
        }
        Aggregation { grouping, aggregations, .. }
        | OrderedAggregation { grouping, aggregations, .. } => {
            grouping.iter().chain(aggregations).map(|(_, e)| e).collect()
        }
        SelectOrSemiApply { expression, .. }
        | SelectOrAntiSemiApply { expression, .. }
        | LetSelectOrSemiApply { expression, .. }
        | LetSelectOrAntiSemiApply { expression, .. } => vec![expression],
        Unwind { expression, .. } => vec![expression],
        _ => Vec::new(),
    }
}

fn operator_detail(op: &Operator) -> String {
    use Operator::*;
    match op {
        AllNodesScan { node, .. } => format!("({})", node),
        NodeByLabelScan { node, label, .. } => format!("({}:{})", node, label),
        NodeIndexSeek {
            node,
            label,
            properties,
            seek,
            ..
        } => format!(
            "({}:{}({})) {}",
            node,
            label,
            properties.join(","),
            seek_detail(seek)
        ),
        NodeByIdSeek { node, ids, .. } => format!("({}) ids={}", node, ids.len()),
        AllRelationshipsScan { rel, left, right, direction, .. } => {
            format!("({})-[{}]-({}) {}", left, rel, right, direction)
        }
        RelationshipTypeScan { rel, rel_type, left, right, direction, .. } => {
            format!("({})-[{}:{}]-({}) {}", left, rel, rel_type, right, direction)
        }
        RelationshipIndexSeek { rel, rel_type, left, right, properties, seek, .. } => format!(
            "({})-[{}:{}({})]-({}) {}",
            left,
            rel,
            rel_type,
            properties.join(","),
            right,
            seek_detail(seek)
        ),
        Argument { arguments } => format!(
            "({})",
            arguments.iter().map(|v| v.name()).collect::<Vec<_>>().join(", ")
        ),
        NodeCountFromCountStore { variable, labels } => format!(
            "{} <- count(labels={})",
            variable,
            labels
                .iter()
                .map(|l| l.as_deref().unwrap_or("*"))
                .collect::<Vec<_>>()
                .join(",")
        ),
        RelationshipCountFromCountStore { variable, from_label, rel_type, to_label } => {
            format!(
                "{} <- count(({})-[:{}]->({}))",
                variable,
                from_label.as_deref().unwrap_or(""),
                rel_type.as_deref().unwrap_or("*"),
                to_label.as_deref().unwrap_or("")
            )
        }
        Expand { from, rel, to, direction, types, .. }
        | VarExpand { from, rel, to, direction, types, .. } => {
            let length = match op {
                VarExpand { min, max, .. } => match max {
                    Some(max) => format!("*{}..{}", min, max),
                    None => format!("*{}..", min),
                },
                _ => String::new(),
            };
            format!(
                "({})-[{}:{}{}]-({}) {}",
                from,
                rel,
                types.join("|"),
                length,
                to,
                direction
            )
        }
        Trail { left, right, repetition, .. } => format!(
            "({})...({}) {{{},{}}}",
            left,
            right,
            repetition.min,
            repetition
                .max
                .map(|m| m.to_string())
                .unwrap_or_else(|| "".into())
        ),
        ShortestPath { pattern, .. } => format!(
            "({})...({}) {:?}",
            pattern.left, pattern.right, pattern.selector
        ),
        Selection { predicates, .. } => predicates
            .iter()
            .map(render_expression)
            .collect::<Vec<_>>()
            .join(" AND "),
        Projection { expressions, .. } => render_named(expressions),
        Aggregation { grouping, aggregations, .. }
        | OrderedAggregation { grouping, aggregations, .. } => format!(
            "group[{}] agg[{}]",
            render_named(grouping),
            render_named(aggregations)
        ),
        Distinct { expressions, .. } => render_named(expressions),
        Sort { items, .. } | Top { items, .. } => {
            let keys = items
                .iter()
                .map(|i| {
                    format!(
                        "{} {}",
                        render_expression(&i.expression),
                        if i.ascending { "ASC" } else { "DESC" }
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            match op {
                Top { limit, .. } => format!("{} limit={}", keys, render_expression(limit)),
                _ => keys,
            }
        }
        Skip { expression, .. } | Limit { expression, .. } => render_expression(expression),
        Optional { .. } => String::new(),
        Eager { reasons, .. } => format!("{:?}", reasons),
        Unwind { variable, expression, .. } => {
            format!("{} IN {}", variable, render_expression(expression))
        }
        LoadCsv { variable, url, with_headers, .. } => format!(
            "{} FROM {} headers={}",
            variable,
            render_expression(url),
            with_headers
        ),
        Create { commands, .. } => format!("{} commands", commands.len()),
        Merge { commands, .. } => format!("{} commands", commands.len()),
        Delete { expression, detach, .. } => format!(
            "{}{}",
            if *detach { "DETACH " } else { "" },
            render_expression(expression)
        ),
        SetProperty { subject, key, value, .. } => {
            format!("{}.{} = {}", subject, key, render_expression(value))
        }
        SetLabels { subject, labels, .. } => format!("{}:{}", subject, labels.join(":")),
        RemoveProperty { subject, key, .. } => format!("{}.{}", subject, key),
        RemoveLabels { subject, labels, .. } => format!("{}:{}", subject, labels.join(":")),
        Foreach { variable, list, actions, .. } => format!(
            "{} IN {} ({} actions)",
            variable,
            render_expression(list),
            actions.len()
        ),
        ProduceResults { columns, .. } => columns
            .iter()
            .map(|c| c.name().to_string())
            .collect::<Vec<_>>()
            .join(", "),
        EmptyResult { .. } => String::new(),
        CartesianProduct { .. } | Apply { .. } | SemiApply { .. } | AntiSemiApply { .. } => {
            String::new()
        }
        NodeHashJoin { nodes, .. } => format!(
            "on [{}]",
            nodes.iter().map(|v| v.name()).collect::<Vec<_>>().join(", ")
        ),
        ValueHashJoin { lhs_expression, rhs_expression, .. } => format!(
            "{} = {}",
            render_expression(lhs_expression),
            render_expression(rhs_expression)
        ),
        SelectOrSemiApply { expression, .. } | SelectOrAntiSemiApply { expression, .. } => {
            render_expression(expression)
        }
        LetSemiApply { variable, .. } | LetAntiSemiApply { variable, .. } => {
            format!("{}", variable)
        }
        LetSelectOrSemiApply { variable, expression, .. }
        | LetSelectOrAntiSemiApply { variable, expression, .. } => {
            format!("{} <- {}", variable, render_expression(expression))
        }
        RollUpApply { collection, variable, .. } => {
            format!("{} <- collect({})", collection, variable)
        }
        Union { distinct, .. } => if *distinct { "DISTINCT" } else { "ALL" }.to_string(),
    }
}

fn render_named(items: &[(crate::ir::Variable, Expression)]) -> String {
    items
        .iter()
        .map(|(v, e)| format!("{} AS {}", render_expression(e), v))
        .collect::<Vec<_>>()
        .join(", ")
}

fn seek_detail(seek: &SeekKind) -> String {
    match seek {
        SeekKind::Exact(values) => format!(
            "= [{}]",
            values.iter().map(render_expression).collect::<Vec<_>>().join(", ")
        ),
        SeekKind::Range { lower, upper } => {
            let side = |bound: &Option<(Expression, bool)>, open: &str, closed: &str| {
                bound
                    .as_ref()
                    .map(|(e, inclusive)| {
                        format!("{} {}", if *inclusive { closed } else { open }, render_expression(e))
                    })
                    .unwrap_or_default()
            };
            format!("{} {}", side(lower, ">", ">="), side(upper, "<", "<="))
                .trim()
                .to_string()
        }
        SeekKind::Prefix(e) => format!("STARTS WITH {}", render_expression(e)),
        SeekKind::Contains(e) => format!("CONTAINS {}", render_expression(e)),
        SeekKind::EndsWith(e) => format!("ENDS WITH {}", render_expression(e)),
        SeekKind::Existence => "EXISTS".to_string(),
    }
}

fn binary_op_token(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Eq => "=",
        BinaryOp::NotEq => "<>",
        BinaryOp::Lt => "<",
        BinaryOp::LtEq => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::GtEq => ">=",
        BinaryOp::Add => "+",
        BinaryOp::Subtract => "-",
        BinaryOp::Multiply => "*",
        BinaryOp::Divide => "/",
        BinaryOp::Modulo => "%",
        BinaryOp::Power => "^",
        BinaryOp::In => "IN",
        BinaryOp::StartsWith => "STARTS WITH",
        BinaryOp::EndsWith => "ENDS WITH",
        BinaryOp::Contains => "CONTAINS",
        BinaryOp::Xor => "XOR",
    }
}

/// Compact, deterministic expression rendering.
pub fn render_expression(expr: &Expression) -> String {
    match expr {
        Expression::Variable(v) => v.name().to_string(),
        Expression::Parameter(name) => format!("${}", name),
        Expression::Literal(value) => value.to_string(),
        Expression::Property { subject, key } => {
            format!("{}.{}", render_expression(subject), key)
        }
        Expression::HasLabels { subject, labels } => {
            format!("{}:{}", render_expression(subject), labels.join(":"))
        }
        Expression::And(items) => items
            .iter()
            .map(render_expression)
            .collect::<Vec<_>>()
            .join(" AND "),
        Expression::Or(items) => format!(
            "({})",
            items.iter().map(render_expression).collect::<Vec<_>>().join(" OR ")
        ),
        Expression::Not(inner) => format!("NOT ({})", render_expression(inner)),
        Expression::Binary { op, lhs, rhs } => format!(
            "{} {} {}",
            render_expression(lhs),
            binary_op_token(*op),
            render_expression(rhs)
        ),
        Expression::IsNull(inner) => format!("{} IS NULL", render_expression(inner)),
        Expression::IsNotNull(inner) => format!("{} IS NOT NULL", render_expression(inner)),
        Expression::FunctionCall { name, args, distinct } => format!(
            "{}({}{})",
            name,
            if *distinct { "DISTINCT " } else { "" },
            args.iter().map(render_expression).collect::<Vec<_>>().join(", ")
        ),
        Expression::CountStar => "count(*)".to_string(),
        Expression::ListLiteral(items) => format!(
            "[{}]",
            items.iter().map(render_expression).collect::<Vec<_>>().join(", ")
        ),
        Expression::MapLiteral(entries) => format!(
            "{{{}}}",
            entries
                .iter()
                .map(|(k, v)| format!("{}: {}", k, render_expression(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        Expression::ContainerIndex { subject, index } => {
            format!("{}[{}]", render_expression(subject), render_expression(index))
        }
        Expression::ListSlice { subject, from, to } => format!(
            "{}[{}..{}]",
            render_expression(subject),
            from.as_deref().map(render_expression).unwrap_or_default(),
            to.as_deref().map(render_expression).unwrap_or_default()
        ),
        Expression::PatternExpression { chain } => {
            format!("pattern({} steps)", chain.steps.len())
        }
        Expression::PatternComprehension { chain, projection, .. } => format!(
            "[pattern({} steps) | {}]",
            chain.steps.len(),
            render_expression(projection)
        ),
        Expression::ListComprehension { variable, list, .. } => {
            format!("[{} IN {} ...]", variable, render_expression(list))
        }
        Expression::Quantified { quantifier, variable, list, predicate } => {
            let name = match quantifier {
                Quantifier::All => "all",
                Quantifier::Any => "any",
                Quantifier::None => "none",
                Quantifier::Single => "single",
            };
            format!(
                "{}({} IN {} WHERE {})",
                name,
                variable,
                render_expression(list),
                render_expression(predicate)
            )
        }
        Expression::Reduce { accumulator, variable, list, .. } => format!(
            "reduce({}, {} IN {})",
            accumulator,
            variable,
            render_expression(list)
        ),
        Expression::ExistsSubquery { .. } => "EXISTS { ... }".to_string(),
        Expression::CountSubquery { .. } => "COUNT { ... }".to_string(),
        Expression::GetDegree { node, rel_type, direction } => format!(
            "getDegree({}, {}, {})",
            node,
            rel_type.as_deref().unwrap_or("*"),
            direction
        ),
        Expression::HasDegreeGreaterThan { node, rel_type, direction, degree } => format!(
            "hasDegreeGreaterThan({}, {}, {}, {})",
            node,
            rel_type.as_deref().unwrap_or("*"),
            direction,
            render_expression(degree)
        ),
        Expression::NestedPlan { kind, plan, projection, column } => {
            let kind = match kind {
                NestedPlanKind::Exists => "Exists",
                NestedPlanKind::Collect => "Collect",
                NestedPlanKind::GetByName => "GetByName",
            };
            let mut out = format!("NestedPlan{}({}", kind, plan);
            if let Some(p) = projection {
                out.push_str(&format!(" | {}", render_expression(p)));
            }
            if let Some(c) = column {
                out.push_str(&format!(" -> {}", c));
            }
            out.push(')');
            out
        }
    }
}

/// Variable-length display helper kept close to the renderer.
pub fn render_length(length: &PatternLength) -> String {
    match length {
        PatternLength::Simple => String::new(),
        PatternLength::Variable { min, max } => match max {
            Some(max) => format!("*{}..{}", min, max),
            None => format!("*{}..", min),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Variable;
    use std::collections::BTreeSet;

    #[test]
    fn renders_a_small_tree() {
        let mut arena = PlanArena::new();
        let scan = arena.push(Operator::AllNodesScan {
            node: Variable::new("a"),
            arguments: BTreeSet::new(),
        });
        let filter = arena.push(Operator::Selection {
            input: scan,
            predicates: vec![Expression::eq(
                Expression::property("a", "x"),
                Expression::integer(1),
            )],
        });
        let rendered = PlanDisplay {
            arena: &arena,
            root: filter,
            attributes: None,
        }
        .to_string();
        assert!(rendered.contains("+Selection a.x = 1"));
        assert!(rendered.contains("| +AllNodesScan (a)"));
    }

    #[test]
    fn expression_rendering_is_deterministic() {
        let expr = Expression::HasDegreeGreaterThan {
            node: Variable::new("a"),
            rel_type: Some("X".into()),
            direction: crate::ir::Direction::Outgoing,
            degree: Box::new(Expression::integer(0)),
        };
        assert_eq!(
            render_expression(&expr),
            "hasDegreeGreaterThan(a, X, OUTGOING, 0)"
        );
    }
}
