// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Query expressions
//!
//! One expression vocabulary serves the whole pipeline: the consumed IR uses
//! the declarative variants (pattern expressions, EXISTS/COUNT subqueries,
//! comprehensions), while planning lowers those into the operational variants
//! (degree lookups, nested plan expressions) that execution understands.

use crate::ir::pattern::{Direction, RelationshipChain, Variable};
use crate::ir::query::Query;
use crate::ir::value::Value;
use crate::plan::PlanId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
    In,
    StartsWith,
    EndsWith,
    Contains,
    Xor,
}

/// Quantifier functions over lists and patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quantifier {
    All,
    Any,
    None,
    Single,
}

/// The three nested-plan expression forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NestedPlanKind {
    /// Evaluates the plan and yields true when it produces at least one row.
    Exists,
    /// Evaluates the plan and collects the projected expression per row.
    Collect,
    /// Evaluates the plan and yields the named column of its single row.
    GetByName,
}

/// A query expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Variable(Variable),
    Parameter(String),
    Literal(Value),
    Property {
        subject: Box<Expression>,
        key: String,
    },
    HasLabels {
        subject: Box<Expression>,
        labels: Vec<String>,
    },
    And(Vec<Expression>),
    Or(Vec<Expression>),
    Not(Box<Expression>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    IsNull(Box<Expression>),
    IsNotNull(Box<Expression>),
    FunctionCall {
        name: String,
        args: Vec<Expression>,
        distinct: bool,
    },
    CountStar,
    ListLiteral(Vec<Expression>),
    MapLiteral(Vec<(String, Expression)>),
    ContainerIndex {
        subject: Box<Expression>,
        index: Box<Expression>,
    },
    ListSlice {
        subject: Box<Expression>,
        from: Option<Box<Expression>>,
        to: Option<Box<Expression>>,
    },
    /// Boolean pattern predicate: `(a)-[:X]->()`.
    PatternExpression {
        chain: RelationshipChain,
    },
    /// `[(a)-[:X]->(b) WHERE pred | proj]`
    PatternComprehension {
        chain: RelationshipChain,
        predicate: Option<Box<Expression>>,
        projection: Box<Expression>,
    },
    /// `[x IN list WHERE pred | proj]` over an ordinary list value.
    ListComprehension {
        variable: Variable,
        list: Box<Expression>,
        predicate: Option<Box<Expression>>,
        projection: Option<Box<Expression>>,
    },
    /// `all/any/none/single(x IN list WHERE pred)`
    Quantified {
        quantifier: Quantifier,
        variable: Variable,
        list: Box<Expression>,
        predicate: Box<Expression>,
    },
    /// `reduce(acc = init, x IN list | expr)`
    Reduce {
        accumulator: Variable,
        init: Box<Expression>,
        variable: Variable,
        list: Box<Expression>,
        expression: Box<Expression>,
    },
    /// `EXISTS { ... }` with a full inner query body.
    ExistsSubquery {
        query: Box<Query>,
    },
    /// `COUNT { ... }` with a full inner query body.
    CountSubquery {
        query: Box<Query>,
    },
    /// Direct degree lookup, produced by planning. Never appears in input.
    GetDegree {
        node: Variable,
        rel_type: Option<String>,
        direction: Direction,
    },
    /// Degree comparison avoiding row materialization, produced by planning.
    HasDegreeGreaterThan {
        node: Variable,
        rel_type: Option<String>,
        direction: Direction,
        degree: Box<Expression>,
    },
    /// A correlated sub-plan embedded in the expression tree, produced by
    /// planning. `projection` is set for Collect, `column` for GetByName.
    NestedPlan {
        kind: NestedPlanKind,
        plan: PlanId,
        projection: Option<Box<Expression>>,
        column: Option<Variable>,
    },
}

/// Aggregating function names recognized by the horizon planner.
const AGGREGATE_FUNCTIONS: &[&str] = &[
    "count", "sum", "avg", "min", "max", "collect", "stdev", "stdevp",
    "percentilecont", "percentiledisc",
];

pub fn is_aggregate_function(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    AGGREGATE_FUNCTIONS.iter().any(|f| *f == lower)
}

impl Expression {
    // --- constructors -----------------------------------------------------

    pub fn var(name: impl Into<String>) -> Expression {
        Expression::Variable(Variable::new(name))
    }

    pub fn param(name: impl Into<String>) -> Expression {
        Expression::Parameter(name.into())
    }

    pub fn integer(value: i64) -> Expression {
        Expression::Literal(Value::Integer(value))
    }

    pub fn string(value: impl Into<String>) -> Expression {
        Expression::Literal(Value::String(value.into()))
    }

    pub fn bool(value: bool) -> Expression {
        Expression::Literal(Value::Bool(value))
    }

    pub fn property(subject: impl Into<String>, key: impl Into<String>) -> Expression {
        Expression::Property {
            subject: Box::new(Expression::var(subject)),
            key: key.into(),
        }
    }

    pub fn has_labels(subject: impl Into<String>, labels: Vec<String>) -> Expression {
        Expression::HasLabels {
            subject: Box::new(Expression::var(subject)),
            labels,
        }
    }

    pub fn binary(op: BinaryOp, lhs: Expression, rhs: Expression) -> Expression {
        Expression::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn eq(lhs: Expression, rhs: Expression) -> Expression {
        Expression::binary(BinaryOp::Eq, lhs, rhs)
    }

    pub fn not(expr: Expression) -> Expression {
        Expression::Not(Box::new(expr))
    }

    /// Conjunction that flattens trivial cases.
    pub fn and_all(mut exprs: Vec<Expression>) -> Expression {
        match exprs.len() {
            0 => Expression::bool(true),
            1 => exprs.remove(0),
            _ => Expression::And(exprs),
        }
    }

    /// Disjunction that flattens trivial cases.
    pub fn or_all(mut exprs: Vec<Expression>) -> Expression {
        match exprs.len() {
            0 => Expression::bool(false),
            1 => exprs.remove(0),
            _ => Expression::Or(exprs),
        }
    }

    pub fn function(name: impl Into<String>, args: Vec<Expression>) -> Expression {
        Expression::FunctionCall {
            name: name.into(),
            args,
            distinct: false,
        }
    }

    // --- analysis ---------------------------------------------------------

    /// Splits a conjunctive predicate into its conjuncts.
    pub fn conjuncts(self) -> Vec<Expression> {
        match self {
            Expression::And(items) => items
                .into_iter()
                .flat_map(|item| item.conjuncts())
                .collect(),
            other => vec![other],
        }
    }

    /// Free variables referenced by this expression.
    ///
    /// Variables bound locally by comprehensions, quantifiers and reduce are
    /// excluded. Variables named inside pattern constructs are reported as
    /// free; the planner intersects them with the enclosing scope, which is
    /// the only place the inner/outer distinction is known.
    pub fn dependencies(&self) -> BTreeSet<Variable> {
        let mut out = BTreeSet::new();
        self.collect_dependencies(&mut out, &mut Vec::new());
        out
    }

    fn collect_dependencies(&self, out: &mut BTreeSet<Variable>, bound: &mut Vec<Variable>) {
        match self {
            Expression::Variable(v) => {
                if !bound.contains(v) {
                    out.insert(v.clone());
                }
            }
            Expression::Parameter(_) | Expression::Literal(_) | Expression::CountStar => {}
            Expression::Property { subject, .. }
            | Expression::Not(subject)
            | Expression::IsNull(subject)
            | Expression::IsNotNull(subject) => subject.collect_dependencies(out, bound),
            Expression::HasLabels { subject, .. } => subject.collect_dependencies(out, bound),
            Expression::And(items) | Expression::Or(items) | Expression::ListLiteral(items) => {
                for item in items {
                    item.collect_dependencies(out, bound);
                }
            }
            Expression::MapLiteral(entries) => {
                for (_, value) in entries {
                    value.collect_dependencies(out, bound);
                }
            }
            Expression::Binary { lhs, rhs, .. } => {
                lhs.collect_dependencies(out, bound);
                rhs.collect_dependencies(out, bound);
            }
            Expression::FunctionCall { args, .. } => {
                for arg in args {
                    arg.collect_dependencies(out, bound);
                }
            }
            Expression::ContainerIndex { subject, index } => {
                subject.collect_dependencies(out, bound);
                index.collect_dependencies(out, bound);
            }
            Expression::ListSlice { subject, from, to } => {
                subject.collect_dependencies(out, bound);
                if let Some(from) = from {
                    from.collect_dependencies(out, bound);
                }
                if let Some(to) = to {
                    to.collect_dependencies(out, bound);
                }
            }
            Expression::PatternExpression { chain } => {
                for v in chain.named_variables() {
                    if !bound.contains(&v) {
                        out.insert(v);
                    }
                }
            }
            Expression::PatternComprehension {
                chain,
                predicate,
                projection,
            } => {
                // Chain variables may be fresh bindings of the comprehension;
                // reporting them as free would make enclosing predicates look
                // unsolvable. Correlation with the outer scope is recomputed
                // against the actual bindings during rewriting.
                let locals = chain.named_variables();
                let depth = bound.len();
                bound.extend(locals);
                if let Some(p) = predicate {
                    p.collect_dependencies(out, bound);
                }
                projection.collect_dependencies(out, bound);
                bound.truncate(depth);
            }
            Expression::ListComprehension {
                variable,
                list,
                predicate,
                projection,
            } => {
                list.collect_dependencies(out, bound);
                bound.push(variable.clone());
                if let Some(p) = predicate {
                    p.collect_dependencies(out, bound);
                }
                if let Some(p) = projection {
                    p.collect_dependencies(out, bound);
                }
                bound.pop();
            }
            Expression::Quantified {
                variable,
                list,
                predicate,
                ..
            } => {
                list.collect_dependencies(out, bound);
                bound.push(variable.clone());
                predicate.collect_dependencies(out, bound);
                bound.pop();
            }
            Expression::Reduce {
                accumulator,
                init,
                variable,
                list,
                expression,
            } => {
                init.collect_dependencies(out, bound);
                list.collect_dependencies(out, bound);
                bound.push(accumulator.clone());
                bound.push(variable.clone());
                expression.collect_dependencies(out, bound);
                bound.pop();
                bound.pop();
            }
            Expression::ExistsSubquery { query } | Expression::CountSubquery { query } => {
                // Only variables the body cannot bind itself are free here;
                // the generous import set is computed separately when the
                // body is planned.
                for v in query.strictly_external_references() {
                    if !bound.contains(&v) {
                        out.insert(v);
                    }
                }
            }
            Expression::GetDegree { node, .. } => {
                if !bound.contains(node) {
                    out.insert(node.clone());
                }
            }
            Expression::HasDegreeGreaterThan { node, degree, .. } => {
                if !bound.contains(node) {
                    out.insert(node.clone());
                }
                degree.collect_dependencies(out, bound);
            }
            Expression::NestedPlan { projection, .. } => {
                if let Some(p) = projection {
                    p.collect_dependencies(out, bound);
                }
            }
        }
    }

    /// True if this expression is (or contains) an aggregating function call.
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expression::CountStar => true,
            Expression::FunctionCall { name, args, .. } => {
                is_aggregate_function(name) || args.iter().any(|a| a.contains_aggregate())
            }
            other => {
                let mut found = false;
                other.for_each_child(&mut |child| {
                    if child.contains_aggregate() {
                        found = true;
                    }
                });
                found
            }
        }
    }

    /// True if this expression contains a construct that needs sub-planning.
    pub fn contains_subquery_construct(&self) -> bool {
        match self {
            Expression::PatternExpression { .. }
            | Expression::PatternComprehension { .. }
            | Expression::ExistsSubquery { .. }
            | Expression::CountSubquery { .. } => true,
            other => {
                let mut found = false;
                other.for_each_child(&mut |child| {
                    if child.contains_subquery_construct() {
                        found = true;
                    }
                });
                found
            }
        }
    }

    /// Visits each direct child expression.
    pub fn for_each_child<F: FnMut(&Expression)>(&self, f: &mut F) {
        match self {
            Expression::Variable(_)
            | Expression::Parameter(_)
            | Expression::Literal(_)
            | Expression::CountStar
            | Expression::PatternExpression { .. }
            | Expression::GetDegree { .. } => {}
            Expression::Property { subject, .. }
            | Expression::HasLabels { subject, .. }
            | Expression::Not(subject)
            | Expression::IsNull(subject)
            | Expression::IsNotNull(subject) => f(subject),
            Expression::And(items) | Expression::Or(items) | Expression::ListLiteral(items) => {
                for item in items {
                    f(item);
                }
            }
            Expression::MapLiteral(entries) => {
                for (_, value) in entries {
                    f(value);
                }
            }
            Expression::Binary { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            Expression::FunctionCall { args, .. } => {
                for arg in args {
                    f(arg);
                }
            }
            Expression::ContainerIndex { subject, index } => {
                f(subject);
                f(index);
            }
            Expression::ListSlice { subject, from, to } => {
                f(subject);
                if let Some(from) = from {
                    f(from);
                }
                if let Some(to) = to {
                    f(to);
                }
            }
            Expression::PatternComprehension {
                predicate,
                projection,
                ..
            } => {
                if let Some(p) = predicate {
                    f(p);
                }
                f(projection);
            }
            Expression::ListComprehension {
                list,
                predicate,
                projection,
                ..
            } => {
                f(list);
                if let Some(p) = predicate {
                    f(p);
                }
                if let Some(p) = projection {
                    f(p);
                }
            }
            Expression::Quantified { list, predicate, .. } => {
                f(list);
                f(predicate);
            }
            Expression::Reduce {
                init,
                list,
                expression,
                ..
            } => {
                f(init);
                f(list);
                f(expression);
            }
            Expression::ExistsSubquery { .. } | Expression::CountSubquery { .. } => {}
            Expression::HasDegreeGreaterThan { degree, .. } => f(degree),
            Expression::NestedPlan { projection, .. } => {
                if let Some(p) = projection {
                    f(p);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::pattern::NodePattern;

    #[test]
    fn conjuncts_flatten_nested_ands() {
        let expr = Expression::And(vec![
            Expression::And(vec![Expression::var("a"), Expression::var("b")]),
            Expression::var("c"),
        ]);
        assert_eq!(expr.conjuncts().len(), 3);
    }

    #[test]
    fn list_comprehension_variable_is_not_free() {
        let expr = Expression::ListComprehension {
            variable: Variable::new("x"),
            list: Box::new(Expression::var("items")),
            predicate: Some(Box::new(Expression::eq(
                Expression::var("x"),
                Expression::var("outer"),
            ))),
            projection: None,
        };
        let deps = expr.dependencies();
        assert!(deps.contains(&Variable::new("items")));
        assert!(deps.contains(&Variable::new("outer")));
        assert!(!deps.contains(&Variable::new("x")));
    }

    #[test]
    fn aggregate_detection_sees_through_arithmetic() {
        let expr = Expression::binary(
            BinaryOp::Add,
            Expression::function("count", vec![Expression::var("n")]),
            Expression::integer(1),
        );
        assert!(expr.contains_aggregate());
        assert!(!Expression::var("n").contains_aggregate());
    }

    #[test]
    fn pattern_expression_reports_chain_variables() {
        let expr = Expression::PatternExpression {
            chain: RelationshipChain::new(NodePattern::named("a")),
        };
        assert!(expr.dependencies().contains(&Variable::new("a")));
        assert!(expr.contains_subquery_construct());
    }
}
