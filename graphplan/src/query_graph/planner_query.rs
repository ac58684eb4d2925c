// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! The normalized form the planner consumes: a chain of query parts, each a
//! query graph plus the horizon operation at its clause boundary.

use crate::ir::{Direction, Expression, ProjectionItem, Query, SetItem, SortItem, Variable};
use crate::query_graph::QueryGraph;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One query part and everything after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerQuery {
    pub query_graph: QueryGraph,
    pub horizon: QueryHorizon,
    pub tail: Option<Box<PlannerQuery>>,
}

impl PlannerQuery {
    /// Iterates this part and all tail parts.
    pub fn parts(&self) -> Vec<&PlannerQuery> {
        let mut out = vec![self];
        let mut cursor = self;
        while let Some(tail) = cursor.tail.as_deref() {
            out.push(tail);
            cursor = tail;
        }
        out
    }
}

/// Projection-shaped horizon (WITH / RETURN without aggregation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionHorizon {
    pub items: Vec<ProjectionItem>,
    pub distinct: bool,
    pub order_by: Vec<SortItem>,
    pub skip: Option<Expression>,
    pub limit: Option<Expression>,
    /// Post-projection WHERE (only WITH allows one).
    pub predicate: Option<Expression>,
}

/// Aggregating horizon (WITH / RETURN containing aggregate functions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationHorizon {
    pub grouping: Vec<ProjectionItem>,
    pub aggregations: Vec<ProjectionItem>,
    pub order_by: Vec<SortItem>,
    pub skip: Option<Expression>,
    pub limit: Option<Expression>,
    pub predicate: Option<Expression>,
}

/// A graph-writing action inside an updating horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UpdateAction {
    CreateNode {
        variable: Variable,
        labels: Vec<String>,
        properties: Vec<(String, Expression)>,
    },
    CreateRelationship {
        variable: Variable,
        left: Variable,
        rel_type: String,
        right: Variable,
        direction: Direction,
        properties: Vec<(String, Expression)>,
    },
    /// MERGE: match the pattern, create it when absent.
    Merge {
        read_graph: QueryGraph,
        create_actions: Vec<UpdateAction>,
        on_create: Vec<SetItem>,
        on_match: Vec<SetItem>,
    },
    Delete {
        expression: Expression,
        detach: bool,
    },
    SetProperty {
        subject: Variable,
        key: String,
        value: Expression,
    },
    SetLabels {
        subject: Variable,
        labels: Vec<String>,
    },
    RemoveProperty {
        subject: Variable,
        key: String,
    },
    RemoveLabels {
        subject: Variable,
        labels: Vec<String>,
    },
    Foreach {
        variable: Variable,
        list: Expression,
        actions: Vec<UpdateAction>,
    },
}

impl UpdateAction {
    /// Variables this action binds.
    pub fn bindings(&self) -> BTreeSet<Variable> {
        let mut out = BTreeSet::new();
        match self {
            UpdateAction::CreateNode { variable, .. }
            | UpdateAction::CreateRelationship { variable, .. } => {
                out.insert(variable.clone());
            }
            UpdateAction::Merge { read_graph, create_actions, .. } => {
                out.extend(read_graph.covered_ids());
                for action in create_actions {
                    out.extend(action.bindings());
                }
            }
            _ => {}
        }
        out
    }

    /// Labels this action can attach to nodes, for conflict analysis.
    pub fn written_labels(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        match self {
            UpdateAction::CreateNode { labels, .. }
            | UpdateAction::SetLabels { labels, .. } => {
                out.extend(labels.iter().cloned());
            }
            UpdateAction::Merge { create_actions, .. } => {
                for action in create_actions {
                    out.extend(action.written_labels());
                }
            }
            UpdateAction::Foreach { actions, .. } => {
                for action in actions {
                    out.extend(action.written_labels());
                }
            }
            _ => {}
        }
        out
    }

    pub fn is_delete(&self) -> bool {
        match self {
            UpdateAction::Delete { .. } => true,
            UpdateAction::Foreach { actions, .. } => actions.iter().any(|a| a.is_delete()),
            _ => false,
        }
    }
}

/// The operation at a query part's clause boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryHorizon {
    Projection(ProjectionHorizon),
    Aggregation(AggregationHorizon),
    Unwind {
        variable: Variable,
        expression: Expression,
    },
    LoadCsv {
        variable: Variable,
        url: Expression,
        with_headers: bool,
    },
    CallSubquery {
        query: Box<Query>,
        imports: Vec<Variable>,
    },
    Updates(Vec<UpdateAction>),
}

impl QueryHorizon {
    /// The columns in scope after this horizon, given the columns in scope
    /// before it. Projection-shaped horizons replace the scope; the others
    /// extend it.
    pub fn output_columns(&self, incoming: &BTreeSet<Variable>) -> BTreeSet<Variable> {
        match self {
            QueryHorizon::Projection(h) => {
                h.items.iter().map(|item| item.alias.clone()).collect()
            }
            QueryHorizon::Aggregation(h) => h
                .grouping
                .iter()
                .chain(&h.aggregations)
                .map(|item| item.alias.clone())
                .collect(),
            QueryHorizon::Unwind { variable, .. } | QueryHorizon::LoadCsv { variable, .. } => {
                let mut out = incoming.clone();
                out.insert(variable.clone());
                out
            }
            QueryHorizon::CallSubquery { query, .. } => {
                let mut out = incoming.clone();
                if let Some(columns) = crate::ir::final_return_aliases(query) {
                    out.extend(columns);
                }
                out
            }
            QueryHorizon::Updates(actions) => {
                let mut out = incoming.clone();
                for action in actions {
                    out.extend(action.bindings());
                }
                out
            }
        }
    }

    /// Expressions the horizon evaluates, for dependency analysis.
    pub fn expressions(&self) -> Vec<&Expression> {
        let mut out = Vec::new();
        match self {
            QueryHorizon::Projection(h) => {
                out.extend(h.items.iter().map(|i| &i.expression));
                out.extend(h.order_by.iter().map(|s| &s.expression));
                out.extend(h.skip.iter());
                out.extend(h.limit.iter());
                out.extend(h.predicate.iter());
            }
            QueryHorizon::Aggregation(h) => {
                out.extend(h.grouping.iter().map(|i| &i.expression));
                out.extend(h.aggregations.iter().map(|i| &i.expression));
                out.extend(h.order_by.iter().map(|s| &s.expression));
                out.extend(h.skip.iter());
                out.extend(h.limit.iter());
                out.extend(h.predicate.iter());
            }
            QueryHorizon::Unwind { expression, .. } => out.push(expression),
            QueryHorizon::LoadCsv { url, .. } => out.push(url),
            QueryHorizon::CallSubquery { .. } => {}
            QueryHorizon::Updates(actions) => {
                for action in actions {
                    collect_action_expressions(action, &mut out);
                }
            }
        }
        out
    }
}

fn collect_action_expressions<'a>(action: &'a UpdateAction, out: &mut Vec<&'a Expression>) {
    match action {
        UpdateAction::CreateNode { properties, .. }
        | UpdateAction::CreateRelationship { properties, .. } => {
            out.extend(properties.iter().map(|(_, e)| e));
        }
        UpdateAction::Merge { create_actions, on_create, on_match, .. } => {
            for inner in create_actions {
                collect_action_expressions(inner, out);
            }
            for item in on_create.iter().chain(on_match) {
                if let SetItem::Property { value, .. } = item {
                    out.push(value);
                }
            }
        }
        UpdateAction::Delete { expression, .. } => out.push(expression),
        UpdateAction::SetProperty { value, .. } => out.push(value),
        UpdateAction::Foreach { list, actions, .. } => {
            out.push(list);
            for inner in actions {
                collect_action_expressions(inner, out);
            }
        }
        UpdateAction::SetLabels { .. }
        | UpdateAction::RemoveProperty { .. }
        | UpdateAction::RemoveLabels { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_horizon_replaces_scope() {
        let horizon = QueryHorizon::Projection(ProjectionHorizon {
            items: vec![ProjectionItem::new(Expression::var("a"), "b")],
            distinct: false,
            order_by: Vec::new(),
            skip: None,
            limit: None,
            predicate: None,
        });
        let incoming: BTreeSet<Variable> =
            [Variable::new("a"), Variable::new("x")].into_iter().collect();
        let out = horizon.output_columns(&incoming);
        assert_eq!(out.len(), 1);
        assert!(out.contains(&Variable::new("b")));
    }

    #[test]
    fn updates_horizon_extends_scope_with_created_bindings() {
        let horizon = QueryHorizon::Updates(vec![UpdateAction::CreateNode {
            variable: Variable::new("n"),
            labels: vec!["Person".into()],
            properties: Vec::new(),
        }]);
        let incoming: BTreeSet<Variable> = [Variable::new("a")].into_iter().collect();
        let out = horizon.output_columns(&incoming);
        assert!(out.contains(&Variable::new("a")));
        assert!(out.contains(&Variable::new("n")));
    }
}
