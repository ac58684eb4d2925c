// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Cardinality and cost estimation
//!
//! Estimates propagate bottom-up: each operator's output cardinality is
//! derived from its children's recorded estimates, and its cost adds the
//! operator's own work to the children's. The concrete constants are policy
//! (see `PlannerConfig`); the invariants that matter are monotonicity in
//! input cardinality and seeks beating scans at equal output.

use crate::catalog::{GraphStatistics, IndexDescriptor, IndexEntity, IndexPredicateKind};
use crate::ir::{BinaryOp, Expression};
use crate::plan::arena::{Cardinality, Cost, PlanArena, PlanId, PlanningAttributes};
use crate::plan::operator::{Operator, SeekKind};
use crate::planner::PlannerConfig;

/// Statistics-backed estimator for one planning run.
pub struct CostModel<'a> {
    stats: &'a dyn GraphStatistics,
    config: &'a PlannerConfig,
}

impl<'a> CostModel<'a> {
    pub fn new(stats: &'a dyn GraphStatistics, config: &'a PlannerConfig) -> Self {
        CostModel { stats, config }
    }

    /// Estimates the operator at `id`, whose children must already carry
    /// recorded estimates.
    pub fn estimate(
        &self,
        arena: &PlanArena,
        attrs: &PlanningAttributes,
        id: PlanId,
    ) -> (Cardinality, Cost) {
        let op = arena.get(id);
        let children = op.children();
        let child_card = |i: usize| attrs.cardinality(children[i]).amount();
        let child_cost = |i: usize| attrs.cost(children[i]).0;
        let children_cost: f64 = children.iter().map(|c| attrs.cost(*c).0).sum();

        let cfg = self.config;
        use Operator::*;
        let (rows, work) = match op {
            AllNodesScan { .. } => {
                let n = self.stats.all_nodes_cardinality();
                (n, n * cfg.scan_row_cost)
            }
            NodeByLabelScan { label, .. } => {
                let n = self.label_cardinality(label);
                (n, n * cfg.scan_row_cost)
            }
            NodeIndexSeek { label, seek, properties, index_type, .. } => {
                let base = self.label_cardinality(label);
                let selectivity =
                    self.seek_selectivity(label, properties, *index_type, seek);
                let n = (base * selectivity).max(0.0);
                (n, n.max(1.0) * cfg.seek_row_cost)
            }
            NodeByIdSeek { ids, .. } => {
                let n = ids.len().max(1) as f64;
                (n, n * cfg.seek_row_cost)
            }
            AllRelationshipsScan { .. } => {
                let n = self.stats.all_relationships_cardinality();
                (n, n * cfg.scan_row_cost)
            }
            RelationshipTypeScan { rel_type, .. } => {
                let n = self.relationship_cardinality(Some(rel_type));
                (n, n * cfg.scan_row_cost)
            }
            RelationshipIndexSeek { rel_type, properties, seek, index_type, .. } => {
                let base = self.relationship_cardinality(Some(rel_type));
                let kind = seek_predicate_kind(seek);
                let descriptor = IndexDescriptor::new(
                    IndexEntity::RelationshipType(rel_type.clone()),
                    properties.clone(),
                    *index_type,
                );
                let selectivity = self
                    .stats
                    .index_selectivity(&descriptor, kind)
                    .unwrap_or_else(|| self.default_seek_selectivity(seek, properties.len()));
                let n = (base * selectivity).max(0.0);
                (n, n.max(1.0) * cfg.seek_row_cost)
            }
            Argument { .. } => (1.0, 0.0),
            NodeCountFromCountStore { .. } | RelationshipCountFromCountStore { .. } => {
                (1.0, cfg.row_cost)
            }
            Expand { types, mode, .. } => {
                let input = child_card(0);
                let degree = self.average_degree(types);
                let rows = match mode {
                    crate::plan::operator::ExpansionMode::All => input * degree,
                    crate::plan::operator::ExpansionMode::Into => {
                        let nodes = self.stats.all_nodes_cardinality().max(1.0);
                        input * (degree / nodes).min(1.0)
                    }
                };
                (rows, rows.max(input) * cfg.expand_row_cost)
            }
            VarExpand { types, min, max, .. } => {
                let input = child_card(0);
                let degree = self.average_degree(types).max(1.0);
                let hops = effective_hops(*min, *max, cfg.var_length_default_hops);
                let fan_out = degree.powi(hops as i32);
                let rows = input * fan_out;
                (rows, rows.max(input) * cfg.expand_row_cost)
            }
            Trail { repetition, .. } => {
                let input = child_card(0);
                let per_iteration = child_card(1);
                let hops = effective_hops(
                    repetition.min.max(1),
                    repetition.max,
                    cfg.var_length_default_hops,
                );
                let rows = input * per_iteration.max(1.0).powi(hops as i32);
                let work = input * child_cost(1) * hops as f64;
                (rows, work + rows * cfg.expand_row_cost)
            }
            ShortestPath { pattern, .. } => {
                let input = child_card(0);
                let kept = match pattern.selector {
                    crate::ir::Selector::Any(k)
                    | crate::ir::Selector::Shortest(k)
                    | crate::ir::Selector::ShortestGroups(k) => k.max(1) as f64,
                };
                let rows = input * kept;
                (rows, rows * cfg.expand_row_cost * 4.0)
            }
            Selection { predicates, .. } => {
                let input = child_card(0);
                let selectivity: f64 = predicates
                    .iter()
                    .map(|p| self.predicate_selectivity(p))
                    .product();
                (
                    input * selectivity,
                    input * predicates.len() as f64 * cfg.filter_row_cost,
                )
            }
            Projection { .. } | ProduceResults { .. } => {
                let input = child_card(0);
                (input, input * cfg.row_cost)
            }
            Aggregation { grouping, .. } | OrderedAggregation { grouping, .. } => {
                let input = child_card(0);
                let rows = if grouping.is_empty() {
                    1.0
                } else {
                    input.sqrt().max(1.0)
                };
                (rows, input * cfg.row_cost)
            }
            Distinct { .. } => {
                let input = child_card(0);
                (input * 0.95, input * cfg.row_cost)
            }
            Sort { .. } => {
                let input = child_card(0);
                let work = input * (input.max(2.0)).log2() * cfg.row_cost;
                (input, work)
            }
            Top { limit, .. } => {
                let input = child_card(0);
                let kept = self.limit_rows(limit).min(input);
                let work = input * (kept.max(2.0)).log2() * cfg.row_cost;
                (kept, work)
            }
            Skip { expression, .. } => {
                let input = child_card(0);
                let skipped = self.limit_rows(expression);
                ((input - skipped).max(0.0), input * cfg.row_cost)
            }
            Limit { expression, .. } => {
                let input = child_card(0);
                (self.limit_rows(expression).min(input), input * cfg.row_cost)
            }
            Optional { .. } => (child_card(0).max(1.0), child_card(0) * cfg.row_cost),
            Eager { .. } => {
                let input = child_card(0);
                (input, input * cfg.eager_row_cost)
            }
            Unwind { .. } => {
                let input = child_card(0);
                (input * 10.0, input * cfg.row_cost)
            }
            LoadCsv { .. } => {
                let input = child_card(0);
                (input * 1000.0, input * cfg.row_cost)
            }
            Create { .. }
            | Delete { .. }
            | SetProperty { .. }
            | SetLabels { .. }
            | RemoveProperty { .. }
            | RemoveLabels { .. }
            | Foreach { .. }
            | EmptyResult { .. } => {
                let input = child_card(0);
                (input, input * cfg.row_cost)
            }
            Merge { .. } => {
                let input = child_card(0);
                let work = input * child_cost(1);
                (input.max(1.0), work + input * cfg.row_cost)
            }
            CartesianProduct { .. } => {
                let rows = child_card(0) * child_card(1);
                // Nested-loop shape: the rhs re-runs per lhs row.
                let work = child_card(0) * child_cost(1) + rows * cfg.row_cost;
                (rows, work)
            }
            NodeHashJoin { .. } => {
                let nodes = self.stats.all_nodes_cardinality().max(1.0);
                let rows = (child_card(0) * child_card(1) / nodes).max(1.0);
                let work = child_card(0) + child_card(1) + rows * cfg.row_cost;
                (rows, work)
            }
            ValueHashJoin { .. } => {
                let rows = child_card(0) * child_card(1) * cfg.equality_selectivity;
                let work = child_card(0) + child_card(1) + rows * cfg.row_cost;
                (rows, work)
            }
            Apply { .. } => {
                let rows = child_card(0) * child_card(1);
                let work = child_card(0) * child_cost(1) + rows * cfg.row_cost;
                (rows, work)
            }
            SemiApply { .. } | AntiSemiApply { .. } => {
                let rows = child_card(0) * 0.5;
                let work = child_card(0) * child_cost(1);
                (rows, work)
            }
            SelectOrSemiApply { .. } | SelectOrAntiSemiApply { .. } => {
                let rows = child_card(0) * 0.75;
                // The cheap predicate short-circuits part of the rhs work.
                let work = child_card(0) * child_cost(1) * 0.5;
                (rows, work)
            }
            LetSemiApply { .. }
            | LetAntiSemiApply { .. }
            | LetSelectOrSemiApply { .. }
            | LetSelectOrAntiSemiApply { .. } => {
                let rows = child_card(0);
                let work = child_card(0) * child_cost(1);
                (rows, work)
            }
            RollUpApply { .. } => {
                let rows = child_card(0);
                let work = child_card(0) * child_cost(1) + rows * cfg.row_cost;
                (rows, work)
            }
            Union { distinct, .. } => {
                let rows = child_card(0) + child_card(1);
                let rows = if *distinct { rows * 0.95 } else { rows };
                (rows, rows * cfg.row_cost)
            }
        };

        // Apply-shaped operators already charge their rhs per lhs row; their
        // rhs one-shot cost must not be double counted.
        let base_cost = match op {
            CartesianProduct { .. }
            | Apply { .. }
            | SemiApply { .. }
            | AntiSemiApply { .. }
            | SelectOrSemiApply { .. }
            | SelectOrAntiSemiApply { .. }
            | LetSemiApply { .. }
            | LetAntiSemiApply { .. }
            | LetSelectOrSemiApply { .. }
            | LetSelectOrAntiSemiApply { .. }
            | RollUpApply { .. }
            | Merge { .. }
            | Trail { .. } => child_cost(0),
            _ => children_cost,
        };

        (Cardinality(rows.max(0.0)), Cost(base_cost + work.max(0.0)))
    }

    fn label_cardinality(&self, label: &str) -> f64 {
        match self.stats.label_cardinality(label) {
            Some(n) => n,
            None => {
                let fallback =
                    self.stats.all_nodes_cardinality() * self.config.unknown_label_fraction;
                log::trace!(
                    "no cardinality for label `{}`, assuming {:.1}",
                    label,
                    fallback
                );
                fallback
            }
        }
    }

    fn relationship_cardinality(&self, rel_type: Option<&str>) -> f64 {
        match self.stats.relationship_cardinality(None, rel_type, None) {
            Some(n) => n,
            None => {
                let fallback = self.stats.all_relationships_cardinality()
                    * self.config.unknown_label_fraction;
                log::trace!(
                    "no cardinality for relationship type {:?}, assuming {:.1}",
                    rel_type,
                    fallback
                );
                fallback
            }
        }
    }

    /// Average out-degree over the given types (all types when empty).
    fn average_degree(&self, types: &[String]) -> f64 {
        let rels: f64 = if types.is_empty() {
            self.stats.all_relationships_cardinality()
        } else {
            types
                .iter()
                .map(|t| self.relationship_cardinality(Some(t)))
                .sum()
        };
        let nodes = self.stats.all_nodes_cardinality().max(1.0);
        rels / nodes
    }

    /// Selectivity of one index seek: the oracle's per-index answer when it
    /// has one, the configured defaults otherwise.
    fn seek_selectivity(
        &self,
        label: &str,
        properties: &[String],
        index_type: crate::catalog::IndexType,
        seek: &SeekKind,
    ) -> f64 {
        let descriptor = IndexDescriptor::new(
            IndexEntity::NodeLabel(label.to_string()),
            properties.to_vec(),
            index_type,
        );
        self.stats
            .index_selectivity(&descriptor, seek_predicate_kind(seek))
            .unwrap_or_else(|| self.default_seek_selectivity(seek, properties.len()))
    }

    fn default_seek_selectivity(&self, seek: &SeekKind, property_count: usize) -> f64 {
        let cfg = self.config;
        match seek {
            SeekKind::Exact(_) => cfg.equality_selectivity.powi(property_count.max(1) as i32),
            SeekKind::Range { .. } => cfg.range_selectivity,
            SeekKind::Prefix(_) => cfg.prefix_selectivity,
            SeekKind::Contains(_) | SeekKind::EndsWith(_) => cfg.contains_selectivity,
            SeekKind::Existence => cfg.existence_selectivity,
        }
    }

    /// Selectivity of one residual predicate.
    pub fn predicate_selectivity(&self, predicate: &Expression) -> f64 {
        let cfg = self.config;
        match predicate {
            Expression::HasLabels { labels, .. } => {
                let nodes = self.stats.all_nodes_cardinality().max(1.0);
                labels
                    .iter()
                    .map(|l| (self.label_cardinality(l) / nodes).min(1.0))
                    .product()
            }
            Expression::Binary { op, .. } => match op {
                BinaryOp::Eq => cfg.equality_selectivity,
                BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
                    cfg.range_selectivity
                }
                BinaryOp::StartsWith => cfg.prefix_selectivity,
                BinaryOp::EndsWith | BinaryOp::Contains => cfg.contains_selectivity,
                BinaryOp::In => cfg.range_selectivity,
                _ => cfg.default_predicate_selectivity,
            },
            Expression::Not(inner) => 1.0 - self.predicate_selectivity(inner),
            Expression::And(items) => items
                .iter()
                .map(|i| self.predicate_selectivity(i))
                .product(),
            Expression::Or(items) => {
                let none: f64 = items
                    .iter()
                    .map(|i| 1.0 - self.predicate_selectivity(i))
                    .product();
                1.0 - none
            }
            _ => cfg.default_predicate_selectivity,
        }
    }

    fn limit_rows(&self, expression: &Expression) -> f64 {
        match expression {
            Expression::Literal(value) => value
                .as_integer()
                .map(|i| i.max(0) as f64)
                .unwrap_or(self.config.default_limit_rows),
            _ => self.config.default_limit_rows,
        }
    }
}

fn seek_predicate_kind(seek: &SeekKind) -> IndexPredicateKind {
    match seek {
        SeekKind::Exact(_) => IndexPredicateKind::Equality,
        SeekKind::Range { .. } => IndexPredicateKind::Range,
        SeekKind::Prefix(_) => IndexPredicateKind::Prefix,
        SeekKind::Contains(_) => IndexPredicateKind::TextContains,
        SeekKind::EndsWith(_) => IndexPredicateKind::TextEndsWith,
        SeekKind::Existence => IndexPredicateKind::Existence,
    }
}

fn effective_hops(min: u32, max: Option<u32>, default_extra: u32) -> u32 {
    match max {
        Some(max) => (min.max(1) + max.max(1)) / 2,
        None => min.max(1) + default_extra,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryStatistics;
    use crate::ir::Variable;
    use crate::plan::operator::PropertyRetrieval;
    use std::collections::BTreeSet;

    fn record(
        model: &CostModel<'_>,
        arena: &PlanArena,
        attrs: &mut PlanningAttributes,
        id: PlanId,
    ) {
        let (card, cost) = model.estimate(arena, attrs, id);
        attrs.set_cardinality(id, card);
        attrs.set_cost(id, cost);
    }

    #[test]
    fn index_seek_beats_label_scan_at_equal_selectivity() {
        let stats = InMemoryStatistics::new(10_000.0, 0.0).with_label("Person", 1_000.0);
        let config = PlannerConfig::default();
        let model = CostModel::new(&stats, &config);
        let mut arena = PlanArena::new();
        let mut attrs = PlanningAttributes::new();

        let scan = arena.push(Operator::NodeByLabelScan {
            node: Variable::new("n"),
            label: "Person".into(),
            arguments: BTreeSet::new(),
        });
        record(&model, &arena, &mut attrs, scan);

        let seek = arena.push(Operator::NodeIndexSeek {
            node: Variable::new("n"),
            label: "Person".into(),
            properties: vec!["name".into()],
            seek: SeekKind::Exact(vec![Expression::string("x")]),
            get_value: PropertyRetrieval::GetValue,
            index_type: crate::catalog::IndexType::Range,
            arguments: BTreeSet::new(),
        });
        record(&model, &arena, &mut attrs, seek);

        assert!(attrs.cost(seek).0 < attrs.cost(scan).0);
        assert!(attrs.cardinality(seek).0 < attrs.cardinality(scan).0);
    }

    #[test]
    fn expand_cardinality_scales_with_degree() {
        let stats = InMemoryStatistics::new(100.0, 500.0).with_relationship_type("X", 300.0);
        let config = PlannerConfig::default();
        let model = CostModel::new(&stats, &config);
        let mut arena = PlanArena::new();
        let mut attrs = PlanningAttributes::new();

        let scan = arena.push(Operator::AllNodesScan {
            node: Variable::new("a"),
            arguments: BTreeSet::new(),
        });
        record(&model, &arena, &mut attrs, scan);

        let expand = arena.push(Operator::Expand {
            input: scan,
            from: Variable::new("a"),
            rel: Variable::new("r"),
            to: Variable::new("b"),
            direction: crate::ir::Direction::Outgoing,
            types: vec!["X".into()],
            mode: crate::plan::operator::ExpansionMode::All,
        });
        record(&model, &arena, &mut attrs, expand);

        // 100 nodes, degree 3 over type X.
        assert!((attrs.cardinality(expand).0 - 300.0).abs() < 1.0);
    }

    #[test]
    fn statistics_miss_falls_back_instead_of_failing() {
        let stats = InMemoryStatistics::new(1_000.0, 0.0);
        let config = PlannerConfig::default();
        let model = CostModel::new(&stats, &config);
        let mut arena = PlanArena::new();
        let mut attrs = PlanningAttributes::new();

        let scan = arena.push(Operator::NodeByLabelScan {
            node: Variable::new("n"),
            label: "Mystery".into(),
            arguments: BTreeSet::new(),
        });
        record(&model, &arena, &mut attrs, scan);
        assert!((attrs.cardinality(scan).0 - 100.0).abs() < f64::EPSILON);
    }
}
