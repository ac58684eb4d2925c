// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Graph pattern syntax: node/relationship patterns, path patterns,
//! quantified path patterns, and path selectors

use crate::ir::expr::Expression;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A resolved variable name.
///
/// Upstream semantic analysis guarantees that equal names refer to the same
/// binding within one query part. Synthesized variables produced during
/// planning use the reserved `anon_<n>` namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Variable(pub String);

impl Variable {
    pub fn new(name: impl Into<String>) -> Self {
        Variable(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// True for planner-synthesized variables.
    pub fn is_anonymous(&self) -> bool {
        self.0.starts_with("anon_")
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Variable {
    fn from(name: &str) -> Self {
        Variable(name.to_string())
    }
}

/// Direction of a relationship pattern, read left to right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

impl Direction {
    pub fn reversed(self) -> Direction {
        match self {
            Direction::Outgoing => Direction::Incoming,
            Direction::Incoming => Direction::Outgoing,
            Direction::Both => Direction::Both,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Outgoing => write!(f, "OUTGOING"),
            Direction::Incoming => write!(f, "INCOMING"),
            Direction::Both => write!(f, "BOTH"),
        }
    }
}

/// Hop count of a relationship pattern: a single hop, or a variable-length
/// range such as `*2..5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternLength {
    Simple,
    Variable { min: u32, max: Option<u32> },
}

impl PatternLength {
    pub fn is_simple(&self) -> bool {
        matches!(self, PatternLength::Simple)
    }

    /// Combines two range constraints on the same relationship: the larger
    /// minimum and the smaller of the two maxima win.
    pub fn intersect(self, other: PatternLength) -> PatternLength {
        match (self, other) {
            (PatternLength::Simple, PatternLength::Simple) => PatternLength::Simple,
            (PatternLength::Simple, v @ PatternLength::Variable { .. })
            | (v @ PatternLength::Variable { .. }, PatternLength::Simple) => v,
            (
                PatternLength::Variable { min: min_a, max: max_a },
                PatternLength::Variable { min: min_b, max: max_b },
            ) => PatternLength::Variable {
                min: min_a.max(min_b),
                max: match (max_a, max_b) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (Some(a), None) => Some(a),
                    (None, Some(b)) => Some(b),
                    (None, None) => None,
                },
            },
        }
    }
}

/// A node pattern: `(n:Label {prop: value})`.
///
/// A missing variable means the node is anonymous; the query-graph builder
/// assigns it a synthesized name so every endpoint is addressable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePattern {
    pub variable: Option<Variable>,
    pub labels: Vec<String>,
    pub properties: Vec<(String, Expression)>,
}

impl NodePattern {
    pub fn anonymous() -> Self {
        NodePattern {
            variable: None,
            labels: Vec::new(),
            properties: Vec::new(),
        }
    }

    pub fn named(variable: impl Into<String>) -> Self {
        NodePattern {
            variable: Some(Variable::new(variable)),
            labels: Vec::new(),
            properties: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Expression) -> Self {
        self.properties.push((key.into(), value));
        self
    }

    /// A node with no constraints at all (no labels, no properties).
    pub fn is_unconstrained(&self) -> bool {
        self.labels.is_empty() && self.properties.is_empty()
    }
}

/// A relationship pattern: `-[r:TYPE*1..3 {prop: value}]->`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipPattern {
    pub variable: Option<Variable>,
    pub types: Vec<String>,
    pub direction: Direction,
    pub length: PatternLength,
    pub properties: Vec<(String, Expression)>,
}

impl RelationshipPattern {
    pub fn new(direction: Direction) -> Self {
        RelationshipPattern {
            variable: None,
            types: Vec::new(),
            direction,
            length: PatternLength::Simple,
            properties: Vec::new(),
        }
    }

    pub fn named(variable: impl Into<String>, direction: Direction) -> Self {
        RelationshipPattern {
            variable: Some(Variable::new(variable)),
            ..RelationshipPattern::new(direction)
        }
    }

    pub fn with_type(mut self, rel_type: impl Into<String>) -> Self {
        self.types.push(rel_type.into());
        self
    }

    pub fn with_length(mut self, length: PatternLength) -> Self {
        self.length = length;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Expression) -> Self {
        self.properties.push((key.into(), value));
        self
    }

    pub fn is_unconstrained(&self) -> bool {
        self.properties.is_empty()
    }
}

/// A linear chain `(a)-[r1]->(b)-[r2]->(c)`: the pattern form allowed inside
/// pattern expressions and pattern comprehensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipChain {
    pub start: NodePattern,
    pub steps: Vec<(RelationshipPattern, NodePattern)>,
}

impl RelationshipChain {
    pub fn new(start: NodePattern) -> Self {
        RelationshipChain {
            start,
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, rel: RelationshipPattern, node: NodePattern) -> Self {
        self.steps.push((rel, node));
        self
    }

    /// All variables explicitly named anywhere in the chain.
    pub fn named_variables(&self) -> Vec<Variable> {
        let mut out = Vec::new();
        if let Some(v) = &self.start.variable {
            out.push(v.clone());
        }
        for (rel, node) in &self.steps {
            if let Some(v) = &rel.variable {
                out.push(v.clone());
            }
            if let Some(v) = &node.variable {
                out.push(v.clone());
            }
        }
        out
    }
}

/// Repetition bounds of a quantified path pattern: `((a)-[r]->(b)){1,5}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repetition {
    pub min: u32,
    pub max: Option<u32>,
}

/// A quantified path pattern as written in the query: a repeated inner chain.
///
/// During query-graph construction each named singleton variable of the inner
/// chain is exposed outside the quantification as a group variable carrying
/// one element per repetition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantifiedPattern {
    pub inner: RelationshipChain,
    pub repetition: Repetition,
    pub predicate: Option<Box<Expression>>,
}

/// Path selector limiting which matching paths are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selector {
    /// `ANY k`: any k matching paths.
    Any(u32),
    /// `SHORTEST k`: the k shortest paths.
    Shortest(u32),
    /// `SHORTEST k GROUPS`: all paths within the k shortest path lengths.
    ShortestGroups(u32),
}

/// One connector inside a path pattern: a plain relationship hop or a
/// quantified sub-pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PatternConnector {
    Relationship(RelationshipPattern),
    Quantified(QuantifiedPattern),
}

/// A full path pattern from a MATCH clause: a start node followed by a
/// sequence of connector/node pairs, optionally governed by a selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathPattern {
    pub selector: Option<Selector>,
    pub start: NodePattern,
    pub steps: Vec<(PatternConnector, NodePattern)>,
}

impl PathPattern {
    pub fn node(start: NodePattern) -> Self {
        PathPattern {
            selector: None,
            start,
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, rel: RelationshipPattern, node: NodePattern) -> Self {
        self.steps
            .push((PatternConnector::Relationship(rel), node));
        self
    }

    pub fn quantified_step(mut self, qpp: QuantifiedPattern, node: NodePattern) -> Self {
        self.steps.push((PatternConnector::Quantified(qpp), node));
        self
    }

    pub fn with_selector(mut self, selector: Selector) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Converts a selector-free, quantifier-free path into a plain chain.
    pub fn as_chain(&self) -> Option<RelationshipChain> {
        if self.selector.is_some() {
            return None;
        }
        let mut chain = RelationshipChain::new(self.start.clone());
        for (connector, node) in &self.steps {
            match connector {
                PatternConnector::Relationship(rel) => {
                    chain.steps.push((rel.clone(), node.clone()));
                }
                PatternConnector::Quantified(_) => return None,
            }
        }
        Some(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersect_takes_tighter_bounds() {
        let a = PatternLength::Variable { min: 1, max: Some(8) };
        let b = PatternLength::Variable { min: 3, max: Some(5) };
        assert_eq!(
            a.intersect(b),
            PatternLength::Variable { min: 3, max: Some(5) }
        );

        let open = PatternLength::Variable { min: 2, max: None };
        assert_eq!(
            a.intersect(open),
            PatternLength::Variable { min: 2, max: Some(8) }
        );
    }

    #[test]
    fn intersect_with_simple_keeps_range() {
        let v = PatternLength::Variable { min: 0, max: Some(2) };
        assert_eq!(PatternLength::Simple.intersect(v), v);
        assert_eq!(
            PatternLength::Simple.intersect(PatternLength::Simple),
            PatternLength::Simple
        );
    }

    #[test]
    fn chain_collects_named_variables_in_order() {
        let chain = RelationshipChain::new(NodePattern::named("a")).step(
            RelationshipPattern::named("r", Direction::Outgoing),
            NodePattern::anonymous(),
        );
        assert_eq!(
            chain.named_variables(),
            vec![Variable::new("a"), Variable::new("r")]
        );
    }
}
