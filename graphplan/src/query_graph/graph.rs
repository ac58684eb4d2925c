// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Query graph data model

use crate::ir::{
    Direction, Expression, PatternLength, PlanHint, Repetition, Selector, Variable,
};
use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A boolean predicate plus its free-variable dependency set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub dependencies: BTreeSet<Variable>,
    pub expression: Expression,
}

impl Predicate {
    pub fn new(expression: Expression) -> Self {
        Predicate {
            dependencies: expression.dependencies(),
            expression,
        }
    }

    /// True once every dependency is bound.
    pub fn is_solvable(&self, bound: &BTreeSet<Variable>) -> bool {
        self.dependencies.iter().all(|dep| bound.contains(dep))
    }
}

/// A single pattern relationship between two endpoint nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRelationship {
    pub variable: Variable,
    pub left: Variable,
    pub right: Variable,
    pub direction: Direction,
    pub types: Vec<String>,
    pub length: PatternLength,
}

impl PatternRelationship {
    pub fn endpoints(&self) -> (&Variable, &Variable) {
        (&self.left, &self.right)
    }

    pub fn other_end(&self, node: &Variable) -> Option<&Variable> {
        if *node == self.left {
            Some(&self.right)
        } else if *node == self.right {
            Some(&self.left)
        } else {
            None
        }
    }

    /// Direction of traversal when entering from `node`.
    pub fn direction_from(&self, node: &Variable) -> Direction {
        if *node == self.left {
            self.direction
        } else {
            self.direction.reversed()
        }
    }

    pub fn covered_ids(&self) -> BTreeSet<Variable> {
        [&self.left, &self.right, &self.variable]
            .into_iter()
            .cloned()
            .collect()
    }

    /// Whether this relationship and `other` could bind the same stored
    /// relationship. False only when both carry non-empty type lists with an
    /// empty intersection: that disjointness is provable from the pattern.
    pub fn could_coincide_with(&self, other: &PatternRelationship) -> bool {
        if self.types.is_empty() || other.types.is_empty() {
            return true;
        }
        self.types.iter().any(|t| other.types.contains(t))
    }
}

/// Exposes one group variable per inner singleton variable of a quantified
/// path pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableGrouping {
    pub singleton: Variable,
    pub group: Variable,
}

/// A repeated sub-pattern with its own nested query graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantifiedPathPattern {
    /// Synthetic identity of the whole quantified section.
    pub name: Variable,
    pub left: Variable,
    pub right: Variable,
    /// Boundary nodes of the inner pattern, bound per repetition.
    pub inner_left: Variable,
    pub inner_right: Variable,
    pub query_graph: Box<QueryGraph>,
    pub repetition: Repetition,
    pub variable_groupings: Vec<VariableGrouping>,
}

impl QuantifiedPathPattern {
    pub fn covered_ids(&self) -> BTreeSet<Variable> {
        let mut out: BTreeSet<Variable> = [&self.left, &self.right, &self.name]
            .into_iter()
            .cloned()
            .collect();
        out.extend(self.variable_groupings.iter().map(|g| g.group.clone()));
        out
    }
}

/// A path section kept under a selective selector (`ANY k`, `SHORTEST k`,
/// `SHORTEST k GROUPS`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectivePathPattern {
    pub name: Variable,
    pub left: Variable,
    pub right: Variable,
    pub connections: Vec<NodeConnection>,
    pub selector: Selector,
}

impl SelectivePathPattern {
    pub fn covered_ids(&self) -> BTreeSet<Variable> {
        let mut out: BTreeSet<Variable> = [&self.left, &self.right, &self.name]
            .into_iter()
            .cloned()
            .collect();
        for connection in &self.connections {
            out.extend(connection.covered_ids());
        }
        out
    }
}

/// Anything that connects two boundary nodes of the pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeConnection {
    Relationship(PatternRelationship),
    QuantifiedPath(QuantifiedPathPattern),
    SelectivePath(SelectivePathPattern),
}

impl NodeConnection {
    pub fn left(&self) -> &Variable {
        match self {
            NodeConnection::Relationship(r) => &r.left,
            NodeConnection::QuantifiedPath(q) => &q.left,
            NodeConnection::SelectivePath(s) => &s.left,
        }
    }

    pub fn right(&self) -> &Variable {
        match self {
            NodeConnection::Relationship(r) => &r.right,
            NodeConnection::QuantifiedPath(q) => &q.right,
            NodeConnection::SelectivePath(s) => &s.right,
        }
    }

    /// The identifying variable of the connection itself.
    pub fn name(&self) -> &Variable {
        match self {
            NodeConnection::Relationship(r) => &r.variable,
            NodeConnection::QuantifiedPath(q) => &q.name,
            NodeConnection::SelectivePath(s) => &s.name,
        }
    }

    pub fn other_end(&self, node: &Variable) -> Option<&Variable> {
        if node == self.left() {
            Some(self.right())
        } else if node == self.right() {
            Some(self.left())
        } else {
            None
        }
    }

    /// Union of all variables bound by this connection.
    pub fn covered_ids(&self) -> BTreeSet<Variable> {
        match self {
            NodeConnection::Relationship(r) => r.covered_ids(),
            NodeConnection::QuantifiedPath(q) => q.covered_ids(),
            NodeConnection::SelectivePath(s) => s.covered_ids(),
        }
    }
}

/// The pattern one query part must match: nodes, connections, predicates,
/// and the variables imported from an enclosing plan. Built once per query
/// part and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryGraph {
    pub argument_ids: BTreeSet<Variable>,
    pub pattern_nodes: BTreeSet<Variable>,
    pub connections: Vec<NodeConnection>,
    pub selections: Vec<Predicate>,
    pub hints: Vec<PlanHint>,
    pub optional_matches: Vec<QueryGraph>,
}

impl QueryGraph {
    pub fn empty() -> Self {
        QueryGraph::default()
    }

    pub fn with_arguments(argument_ids: BTreeSet<Variable>) -> Self {
        QueryGraph {
            argument_ids,
            ..QueryGraph::default()
        }
    }

    /// True when there is nothing to match (arguments only).
    pub fn is_pattern_empty(&self) -> bool {
        self.pattern_nodes.is_empty()
            && self.connections.is_empty()
            && self.selections.is_empty()
            && self.optional_matches.is_empty()
    }

    /// The single-relationship connections.
    pub fn relationships(&self) -> impl Iterator<Item = &PatternRelationship> {
        self.connections.iter().filter_map(|c| match c {
            NodeConnection::Relationship(r) => Some(r),
            _ => None,
        })
    }

    /// Every variable the pattern binds (not including arguments).
    pub fn covered_ids(&self) -> BTreeSet<Variable> {
        let mut out = self.pattern_nodes.clone();
        for connection in &self.connections {
            out.extend(connection.covered_ids());
        }
        out
    }

    /// Labels known for a pattern node, harvested from HasLabels selections.
    pub fn known_labels(&self, node: &Variable) -> Vec<String> {
        let mut labels = Vec::new();
        for predicate in &self.selections {
            if let Expression::HasLabels { subject, labels: ls } = &predicate.expression {
                if matches!(subject.as_ref(), Expression::Variable(v) if v == node) {
                    labels.extend(ls.iter().cloned());
                }
            }
        }
        labels.sort();
        labels.dedup();
        labels
    }

    /// Groups pattern nodes into connected components; each component lists
    /// its node set and the indices of the connections inside it. Components
    /// are returned in a deterministic order (smallest member variable).
    pub fn connected_components(&self) -> Vec<(BTreeSet<Variable>, Vec<usize>)> {
        let nodes: Vec<&Variable> = self.pattern_nodes.iter().collect();
        if nodes.is_empty() {
            return Vec::new();
        }
        let index_of = |v: &Variable| nodes.iter().position(|n| *n == v);
        let mut uf: UnionFind<usize> = UnionFind::new(nodes.len());
        for connection in &self.connections {
            if let (Some(l), Some(r)) = (index_of(connection.left()), index_of(connection.right()))
            {
                uf.union(l, r);
            }
        }
        // Arguments shared between components also connect them: both sides
        // are constrained by the same incoming row.
        let mut components: Vec<(BTreeSet<Variable>, Vec<usize>)> = Vec::new();
        let mut roots: Vec<usize> = Vec::new();
        for (i, node) in nodes.iter().enumerate() {
            let root = uf.find(i);
            let slot = match roots.iter().position(|r| *r == root) {
                Some(pos) => pos,
                None => {
                    roots.push(root);
                    components.push((BTreeSet::new(), Vec::new()));
                    components.len() - 1
                }
            };
            components[slot].0.insert((*node).clone());
        }
        for (ci, connection) in self.connections.iter().enumerate() {
            if let Some(pos) = components
                .iter()
                .position(|(members, _)| members.contains(connection.left()))
            {
                components[pos].1.push(ci);
            }
        }
        components.sort_by(|a, b| a.0.iter().next().cmp(&b.0.iter().next()));
        components
    }

    /// Checks the structural invariants: connection endpoints must be known
    /// pattern nodes or arguments, and every selection's dependencies must be
    /// coverable by this graph.
    pub fn validate(&self) -> Result<(), String> {
        let mut known = self.covered_ids();
        known.extend(self.argument_ids.iter().cloned());
        for connection in &self.connections {
            for end in [connection.left(), connection.right()] {
                if !self.pattern_nodes.contains(end) && !self.argument_ids.contains(end) {
                    return Err(format!(
                        "connection endpoint `{}` is neither a pattern node nor an argument",
                        end
                    ));
                }
            }
        }
        for predicate in &self.selections {
            for dep in &predicate.dependencies {
                if !known.contains(dep) {
                    return Err(format!(
                        "selection depends on `{}` which this query graph cannot bind",
                        dep
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rel(name: &str, left: &str, right: &str, types: &[&str]) -> PatternRelationship {
        PatternRelationship {
            variable: Variable::new(name),
            left: Variable::new(left),
            right: Variable::new(right),
            direction: Direction::Outgoing,
            types: types.iter().map(|t| t.to_string()).collect(),
            length: PatternLength::Simple,
        }
    }

    #[test]
    fn coincidence_requires_type_overlap() {
        let knows = rel("r1", "a", "b", &["KNOWS"]);
        let likes = rel("r2", "b", "c", &["LIKES"]);
        let any = rel("r3", "c", "d", &[]);
        assert!(!knows.could_coincide_with(&likes));
        assert!(knows.could_coincide_with(&any));
        assert!(knows.could_coincide_with(&rel("r4", "x", "y", &["KNOWS", "LIKES"])));
    }

    #[test]
    fn components_split_disconnected_patterns() {
        let mut qg = QueryGraph::empty();
        for n in ["a", "b", "c", "d"] {
            qg.pattern_nodes.insert(Variable::new(n));
        }
        qg.connections
            .push(NodeConnection::Relationship(rel("r1", "a", "b", &[])));

        let components = qg.connected_components();
        assert_eq!(components.len(), 3);
        assert!(components[0].0.contains(&Variable::new("a")));
        assert_eq!(components[0].1, vec![0]);
        assert!(components[1].1.is_empty());
    }

    #[test]
    fn validate_rejects_unbound_predicate_dependencies() {
        let mut qg = QueryGraph::empty();
        qg.pattern_nodes.insert(Variable::new("a"));
        qg.selections.push(Predicate::new(Expression::eq(
            Expression::property("a", "x"),
            Expression::property("ghost", "x"),
        )));
        assert!(qg.validate().is_err());

        let mut ok = QueryGraph::empty();
        ok.pattern_nodes.insert(Variable::new("a"));
        ok.argument_ids.insert(Variable::new("ghost"));
        ok.selections.push(Predicate::new(Expression::eq(
            Expression::property("a", "x"),
            Expression::property("ghost", "x"),
        )));
        assert!(ok.validate().is_ok());
    }
}
