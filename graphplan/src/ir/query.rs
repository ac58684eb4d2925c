// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Clause-level query structure

use crate::ir::expr::Expression;
use crate::ir::pattern::{PathPattern, PatternConnector, Variable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A complete query: a single clause list, or a union of queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Query {
    Single(SingleQuery),
    Union {
        lhs: Box<Query>,
        rhs: SingleQuery,
        all: bool,
    },
}

impl Query {
    pub fn single(clauses: Vec<Clause>) -> Query {
        Query::Single(SingleQuery { clauses })
    }

    /// Variables this query references without an earlier clause binding
    /// them. A pattern variable in the first MATCH is reported here even
    /// though the MATCH would bind it when no outer binding exists: whether
    /// it is an implicit import or a fresh binding is only known to the
    /// enclosing scope, which intersects this set with its own bindings.
    pub fn external_references(&self) -> BTreeSet<Variable> {
        match self {
            Query::Single(single) => single.external_references(),
            Query::Union { lhs, rhs, .. } => {
                let mut out = lhs.external_references();
                out.extend(rhs.external_references());
                out
            }
        }
    }

    /// Variables this query reads but can never bind itself: each clause's
    /// own bindings mask its references. The strict set is what makes an
    /// enclosing predicate's solvability check honest; the generous set
    /// above still drives argument import when the body is planned.
    pub fn strictly_external_references(&self) -> BTreeSet<Variable> {
        match self {
            Query::Single(single) => single.strictly_external_references(),
            Query::Union { lhs, rhs, .. } => {
                let mut out = lhs.strictly_external_references();
                out.extend(rhs.strictly_external_references());
                out
            }
        }
    }
}

/// An ordered clause list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleQuery {
    pub clauses: Vec<Clause>,
}

impl SingleQuery {
    pub fn external_references(&self) -> BTreeSet<Variable> {
        let mut bound: BTreeSet<Variable> = BTreeSet::new();
        let mut free: BTreeSet<Variable> = BTreeSet::new();
        for clause in &self.clauses {
            for dep in clause.references() {
                if !bound.contains(&dep) {
                    free.insert(dep);
                }
            }
            bound.extend(clause.bindings());
        }
        free
    }

    pub fn strictly_external_references(&self) -> BTreeSet<Variable> {
        let mut bound: BTreeSet<Variable> = BTreeSet::new();
        let mut free: BTreeSet<Variable> = BTreeSet::new();
        for clause in &self.clauses {
            bound.extend(clause.bindings());
            for dep in clause.references() {
                if !bound.contains(&dep) {
                    free.insert(dep);
                }
            }
        }
        free
    }
}

/// A projected item: `expression AS alias`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionItem {
    pub expression: Expression,
    pub alias: Variable,
}

impl ProjectionItem {
    pub fn new(expression: Expression, alias: impl Into<String>) -> Self {
        ProjectionItem {
            expression,
            alias: Variable::new(alias),
        }
    }

    /// `n AS n` style pass-through.
    pub fn is_passthrough(&self) -> bool {
        matches!(&self.expression, Expression::Variable(v) if *v == self.alias)
    }
}

/// A sort key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortItem {
    pub expression: Expression,
    pub ascending: bool,
}

/// SET clause item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SetItem {
    Property {
        subject: Variable,
        key: String,
        value: Expression,
    },
    Labels {
        subject: Variable,
        labels: Vec<String>,
    },
}

/// REMOVE clause item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RemoveItem {
    Property { subject: Variable, key: String },
    Labels { subject: Variable, labels: Vec<String> },
}

/// Planner hints attached to a MATCH clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanHint {
    UseIndex {
        variable: Variable,
        label: String,
        properties: Vec<String>,
    },
    UseScan {
        variable: Variable,
        label: String,
    },
}

/// One clause of a single query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Clause {
    Match {
        optional: bool,
        patterns: Vec<PathPattern>,
        hints: Vec<PlanHint>,
        predicate: Option<Expression>,
    },
    Unwind {
        expression: Expression,
        variable: Variable,
    },
    With {
        distinct: bool,
        items: Vec<ProjectionItem>,
        order_by: Vec<SortItem>,
        skip: Option<Expression>,
        limit: Option<Expression>,
        predicate: Option<Expression>,
    },
    Return {
        distinct: bool,
        items: Vec<ProjectionItem>,
        order_by: Vec<SortItem>,
        skip: Option<Expression>,
        limit: Option<Expression>,
    },
    Create {
        patterns: Vec<PathPattern>,
    },
    Merge {
        pattern: PathPattern,
        on_create: Vec<SetItem>,
        on_match: Vec<SetItem>,
    },
    Delete {
        expressions: Vec<Expression>,
        detach: bool,
    },
    Set {
        items: Vec<SetItem>,
    },
    Remove {
        items: Vec<RemoveItem>,
    },
    Foreach {
        variable: Variable,
        list: Expression,
        updates: Vec<Clause>,
    },
    LoadCsv {
        url: Expression,
        variable: Variable,
        with_headers: bool,
    },
    CallSubquery {
        query: Box<Query>,
        imports: Vec<Variable>,
    },
}

impl Clause {
    /// Variables this clause introduces into scope.
    pub fn bindings(&self) -> BTreeSet<Variable> {
        let mut out = BTreeSet::new();
        match self {
            Clause::Match { patterns, .. } | Clause::Create { patterns } => {
                for pattern in patterns {
                    collect_pattern_bindings(pattern, &mut out);
                }
            }
            Clause::Merge { pattern, .. } => collect_pattern_bindings(pattern, &mut out),
            Clause::Unwind { variable, .. } | Clause::LoadCsv { variable, .. } => {
                out.insert(variable.clone());
            }
            Clause::With { items, .. } | Clause::Return { items, .. } => {
                for item in items {
                    out.insert(item.alias.clone());
                }
            }
            Clause::CallSubquery { query, .. } => {
                if let Some(columns) = final_return_aliases(query) {
                    out.extend(columns);
                }
            }
            Clause::Delete { .. }
            | Clause::Set { .. }
            | Clause::Remove { .. }
            | Clause::Foreach { .. } => {}
        }
        out
    }

    /// Variables this clause reads.
    pub fn references(&self) -> BTreeSet<Variable> {
        let mut out = BTreeSet::new();
        match self {
            Clause::Match { patterns, predicate, .. } => {
                for pattern in patterns {
                    collect_pattern_references(pattern, &mut out);
                }
                if let Some(p) = predicate {
                    out.extend(p.dependencies());
                }
            }
            Clause::Create { patterns } => {
                for pattern in patterns {
                    collect_pattern_references(pattern, &mut out);
                }
            }
            Clause::Merge { pattern, on_create, on_match } => {
                collect_pattern_references(pattern, &mut out);
                for item in on_create.iter().chain(on_match) {
                    out.extend(set_item_references(item));
                }
            }
            Clause::Unwind { expression, .. } => out.extend(expression.dependencies()),
            Clause::With { items, order_by, skip, limit, predicate, .. } => {
                for item in items {
                    out.extend(item.expression.dependencies());
                }
                for sort in order_by {
                    out.extend(sort.expression.dependencies());
                }
                for e in skip.iter().chain(limit.iter()) {
                    out.extend(e.dependencies());
                }
                if let Some(p) = predicate {
                    out.extend(p.dependencies());
                }
            }
            Clause::Return { items, order_by, skip, limit, .. } => {
                for item in items {
                    out.extend(item.expression.dependencies());
                }
                for sort in order_by {
                    out.extend(sort.expression.dependencies());
                }
                for e in skip.iter().chain(limit.iter()) {
                    out.extend(e.dependencies());
                }
            }
            Clause::Delete { expressions, .. } => {
                for e in expressions {
                    out.extend(e.dependencies());
                }
            }
            Clause::Set { items } => {
                for item in items {
                    out.extend(set_item_references(item));
                }
            }
            Clause::Remove { items } => {
                for item in items {
                    match item {
                        RemoveItem::Property { subject, .. }
                        | RemoveItem::Labels { subject, .. } => {
                            out.insert(subject.clone());
                        }
                    }
                }
            }
            Clause::Foreach { list, updates, variable } => {
                out.extend(list.dependencies());
                for update in updates {
                    out.extend(update.references());
                }
                out.remove(variable);
            }
            Clause::LoadCsv { url, .. } => out.extend(url.dependencies()),
            Clause::CallSubquery { imports, .. } => out.extend(imports.iter().cloned()),
        }
        out
    }

    /// True for clauses that write graph data.
    pub fn is_updating(&self) -> bool {
        matches!(
            self,
            Clause::Create { .. }
                | Clause::Merge { .. }
                | Clause::Delete { .. }
                | Clause::Set { .. }
                | Clause::Remove { .. }
                | Clause::Foreach { .. }
        )
    }
}

fn set_item_references(item: &SetItem) -> BTreeSet<Variable> {
    let mut out = BTreeSet::new();
    match item {
        SetItem::Property { subject, value, .. } => {
            out.insert(subject.clone());
            out.extend(value.dependencies());
        }
        SetItem::Labels { subject, .. } => {
            out.insert(subject.clone());
        }
    }
    out
}

fn collect_pattern_bindings(pattern: &PathPattern, out: &mut BTreeSet<Variable>) {
    if let Some(v) = &pattern.start.variable {
        out.insert(v.clone());
    }
    for (connector, node) in &pattern.steps {
        match connector {
            PatternConnector::Relationship(rel) => {
                if let Some(v) = &rel.variable {
                    out.insert(v.clone());
                }
            }
            PatternConnector::Quantified(qpp) => {
                // Inner singleton variables are exposed as group variables
                // under the same names.
                out.extend(qpp.inner.named_variables());
            }
        }
        if let Some(v) = &node.variable {
            out.insert(v.clone());
        }
    }
}

fn collect_pattern_references(pattern: &PathPattern, out: &mut BTreeSet<Variable>) {
    fn visit_props(props: &[(String, Expression)], out: &mut BTreeSet<Variable>) {
        for (_, value) in props {
            out.extend(value.dependencies());
        }
    }
    visit_props(&pattern.start.properties, out);
    if let Some(v) = &pattern.start.variable {
        out.insert(v.clone());
    }
    for (connector, node) in &pattern.steps {
        match connector {
            PatternConnector::Relationship(rel) => visit_props(&rel.properties, out),
            PatternConnector::Quantified(qpp) => {
                if let Some(p) = &qpp.predicate {
                    out.extend(p.dependencies());
                }
            }
        }
        visit_props(&node.properties, out);
        if let Some(v) = &node.variable {
            out.insert(v.clone());
        }
    }
}

/// Column aliases of the query's final RETURN, if it has one.
pub fn final_return_aliases(query: &Query) -> Option<Vec<Variable>> {
    match query {
        Query::Single(single) => single.clauses.iter().rev().find_map(|c| match c {
            Clause::Return { items, .. } => {
                Some(items.iter().map(|i| i.alias.clone()).collect())
            }
            _ => None,
        }),
        Query::Union { lhs, .. } => final_return_aliases(lhs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::pattern::NodePattern;

    #[test]
    fn match_binds_pattern_variables() {
        let clause = Clause::Match {
            optional: false,
            patterns: vec![PathPattern::node(NodePattern::named("a"))],
            hints: Vec::new(),
            predicate: None,
        };
        assert!(clause.bindings().contains(&Variable::new("a")));
        assert!(!clause.is_updating());
    }

    #[test]
    fn external_references_exclude_earlier_bindings() {
        let query = SingleQuery {
            clauses: vec![
                Clause::Match {
                    optional: false,
                    patterns: vec![PathPattern::node(NodePattern::named("a"))],
                    hints: Vec::new(),
                    predicate: None,
                },
                Clause::Return {
                    distinct: false,
                    items: vec![ProjectionItem::new(
                        Expression::eq(
                            Expression::property("a", "x"),
                            Expression::property("outer", "x"),
                        ),
                        "eq",
                    )],
                    order_by: Vec::new(),
                    skip: None,
                    limit: None,
                },
            ],
        };
        let free = query.external_references();
        assert!(free.contains(&Variable::new("outer")));
        // The MATCH's own pattern variable is reported as potentially
        // external; the enclosing scope resolves the ambiguity.
        assert!(free.contains(&Variable::new("a")));
    }
}
