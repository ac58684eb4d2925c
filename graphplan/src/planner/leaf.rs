// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Leaf planning
//!
//! Produces every directly-executable access path for the pattern nodes of a
//! query graph: scans, label scans, index seek variants, id seeks, and
//! Argument. Competing candidates for the same node are all retained; the
//! cost comparator arbitrates later. Every candidate records exactly which
//! predicates it consumed so remaining-predicate accounting stays correct.

use crate::catalog::{IndexDescriptor, IndexType};
use crate::ir::{BinaryOp, Expression, PlanHint, Variable};
use crate::plan::{Operator, PlanId, PropertyRetrieval, SeekKind, SolvedParts};
use crate::planner::PlanningContext;
use crate::query_graph::{Predicate, QueryGraph};
use std::collections::{BTreeMap, BTreeSet};

/// Narrows leaf planning on the right side of an Apply: the given variable
/// must be solved by a seek whose value expressions depend only on `bound`.
#[derive(Debug, Clone)]
pub struct LeafPlanRestrictions {
    pub required_variable: Variable,
    pub bound: BTreeSet<Variable>,
}

/// The Argument leaf declaring the query graph's imported variables.
pub fn argument_plan(ctx: &mut PlanningContext<'_>, qg: &QueryGraph) -> PlanId {
    ctx.add_plan(
        Operator::Argument {
            arguments: qg.argument_ids.clone(),
        },
        SolvedParts::for_arguments(qg.argument_ids.clone()),
    )
}

/// Leaf candidates for every non-argument pattern node.
pub fn plan_leaves(
    ctx: &mut PlanningContext<'_>,
    qg: &QueryGraph,
    restrictions: Option<&LeafPlanRestrictions>,
) -> BTreeMap<Variable, Vec<PlanId>> {
    let mut out = BTreeMap::new();
    for node in &qg.pattern_nodes {
        if qg.argument_ids.contains(node) {
            continue;
        }
        let candidates = node_leaf_candidates(ctx, qg, node, restrictions);
        out.insert(node.clone(), candidates);
    }
    out
}

/// One property predicate usable by an index, with the selection index that
/// must be marked solved when it is consumed.
#[derive(Debug, Clone)]
struct SeekablePredicate {
    property: String,
    form: SeekForm,
    selection_index: usize,
}

#[derive(Debug, Clone)]
enum SeekForm {
    Equals(Expression),
    Lower(Expression, bool),
    Upper(Expression, bool),
    Prefix(Expression),
    Contains(Expression),
    EndsWith(Expression),
    Existence,
}

/// All candidates for one node, most generic first.
pub fn node_leaf_candidates(
    ctx: &mut PlanningContext<'_>,
    qg: &QueryGraph,
    node: &Variable,
    restrictions: Option<&LeafPlanRestrictions>,
) -> Vec<PlanId> {
    let labels = qg.known_labels(node);
    let bound: BTreeSet<Variable> = match restrictions {
        Some(r) if r.required_variable == *node => r.bound.clone(),
        _ => qg.argument_ids.clone(),
    };
    let seek_required =
        matches!(restrictions, Some(r) if r.required_variable == *node);

    let node_hints: Vec<&PlanHint> = qg
        .hints
        .iter()
        .filter(|h| match h {
            PlanHint::UseIndex { variable, .. } | PlanHint::UseScan { variable, .. } => {
                variable == node
            }
        })
        .collect();

    let mut candidates = Vec::new();

    if !seek_required && node_hints.is_empty() {
        candidates.push(ctx.add_plan(
            Operator::AllNodesScan {
                node: node.clone(),
                arguments: qg.argument_ids.clone(),
            },
            leaf_solved(qg, node, Vec::new(), None),
        ));
    }

    let seekables = collect_seekable_predicates(qg, node, &bound);

    for label in labels.iter() {
        let label_predicate = find_label_predicate(qg, node, label);

        let scan_allowed = node_hints.is_empty()
            || node_hints.iter().any(
                |h| matches!(h, PlanHint::UseScan { label: l, .. } if l == label),
            );
        if !seek_required && scan_allowed {
            let hint = node_hints
                .iter()
                .find(|h| matches!(h, PlanHint::UseScan { label: l, .. } if l == label))
                .map(|h| (*h).clone());
            candidates.push(ctx.add_plan(
                Operator::NodeByLabelScan {
                    node: node.clone(),
                    label: label.clone(),
                    arguments: qg.argument_ids.clone(),
                },
                leaf_solved(qg, node, label_predicate.clone().into_iter().collect(), hint),
            ));
        }

        // Multiple index providers contribute independently; all candidates
        // are retained and compete on cost.
        for index in ctx.indexes.node_indexes(label) {
            let index_hint = node_hints.iter().find(|h| {
                matches!(h, PlanHint::UseIndex { label: l, properties, .. }
                    if l == label && *properties == index.properties)
            });
            if !node_hints.is_empty() && index_hint.is_none() {
                continue;
            }
            if let Some((seek, get_value, consumed)) = best_seek_for_index(&index, &seekables) {
                let mut solved_predicates: Vec<Predicate> =
                    label_predicate.clone().into_iter().collect();
                for i in &consumed {
                    solved_predicates.push(qg.selections[*i].clone());
                }
                candidates.push(ctx.add_plan(
                    Operator::NodeIndexSeek {
                        node: node.clone(),
                        label: label.clone(),
                        properties: index.properties.clone(),
                        seek,
                        get_value,
                        index_type: index.index_type,
                        arguments: qg.argument_ids.clone(),
                    },
                    leaf_solved(
                        qg,
                        node,
                        solved_predicates,
                        index_hint.map(|h| (*h).clone()),
                    ),
                ));
            }
        }
    }

    // Seeks on the node id.
    if let Some((ids, selection_index)) = id_seek_expressions(qg, node, &bound) {
        let solved = vec![qg.selections[selection_index].clone()];
        candidates.push(ctx.add_plan(
            Operator::NodeByIdSeek {
                node: node.clone(),
                ids,
                arguments: qg.argument_ids.clone(),
            },
            leaf_solved(qg, node, solved, None),
        ));
    }

    candidates
}

/// Scan-style candidates solving a whole simple relationship (both endpoint
/// nodes and the relationship itself).
pub fn relationship_leaf_candidates(
    ctx: &mut PlanningContext<'_>,
    qg: &QueryGraph,
    connection_index: usize,
) -> Vec<PlanId> {
    let rel = match &qg.connections[connection_index] {
        crate::query_graph::NodeConnection::Relationship(r) if r.length.is_simple() => r,
        _ => return Vec::new(),
    };
    if qg.argument_ids.contains(&rel.left) || qg.argument_ids.contains(&rel.right) {
        return Vec::new();
    }
    let solved = SolvedParts {
        arguments: qg.argument_ids.clone(),
        pattern_nodes: [rel.left.clone(), rel.right.clone()].into_iter().collect(),
        connections: [rel.variable.clone()].into_iter().collect(),
        ..SolvedParts::default()
    };
    match rel.types.len() {
        0 => vec![ctx.add_plan(
            Operator::AllRelationshipsScan {
                rel: rel.variable.clone(),
                left: rel.left.clone(),
                right: rel.right.clone(),
                direction: rel.direction,
                arguments: qg.argument_ids.clone(),
            },
            solved,
        )],
        1 => {
            let rel_type = rel.types[0].clone();
            let mut candidates = vec![ctx.add_plan(
                Operator::RelationshipTypeScan {
                    rel: rel.variable.clone(),
                    rel_type: rel_type.clone(),
                    left: rel.left.clone(),
                    right: rel.right.clone(),
                    direction: rel.direction,
                    arguments: qg.argument_ids.clone(),
                },
                solved.clone(),
            )];
            // Property predicates on the relationship open up index seeks.
            let seekables =
                collect_seekable_predicates(qg, &rel.variable, &qg.argument_ids);
            for index in ctx.indexes.relationship_indexes(&rel_type) {
                if let Some((seek, get_value, consumed)) =
                    best_seek_for_index(&index, &seekables)
                {
                    let mut seek_solved = solved.clone();
                    for i in &consumed {
                        seek_solved.predicates.push(qg.selections[*i].clone());
                    }
                    candidates.push(ctx.add_plan(
                        Operator::RelationshipIndexSeek {
                            rel: rel.variable.clone(),
                            rel_type: rel_type.clone(),
                            left: rel.left.clone(),
                            right: rel.right.clone(),
                            direction: rel.direction,
                            properties: index.properties.clone(),
                            seek,
                            get_value,
                            index_type: index.index_type,
                            arguments: qg.argument_ids.clone(),
                        },
                        seek_solved,
                    ));
                }
            }
            candidates
        }
        _ => Vec::new(),
    }
}

fn leaf_solved(
    qg: &QueryGraph,
    node: &Variable,
    predicates: Vec<Predicate>,
    hint: Option<PlanHint>,
) -> SolvedParts {
    SolvedParts {
        arguments: qg.argument_ids.clone(),
        pattern_nodes: [node.clone()].into_iter().collect(),
        predicates,
        hints: hint.into_iter().collect(),
        ..SolvedParts::default()
    }
}

fn find_label_predicate(qg: &QueryGraph, node: &Variable, label: &str) -> Option<Predicate> {
    qg.selections
        .iter()
        .find(|p| {
            matches!(&p.expression, Expression::HasLabels { subject, labels }
                if matches!(subject.as_ref(), Expression::Variable(v) if v == node)
                    && labels.len() == 1
                    && labels[0] == label)
        })
        .cloned()
}

fn is_property_of<'e>(expr: &'e Expression, node: &Variable) -> Option<&'e str> {
    match expr {
        Expression::Property { subject, key }
            if matches!(subject.as_ref(), Expression::Variable(v) if v == node) =>
        {
            Some(key)
        }
        _ => None,
    }
}

fn depends_only_on(expr: &Expression, bound: &BTreeSet<Variable>) -> bool {
    expr.dependencies().iter().all(|d| bound.contains(d))
}

fn collect_seekable_predicates(
    qg: &QueryGraph,
    node: &Variable,
    bound: &BTreeSet<Variable>,
) -> Vec<SeekablePredicate> {
    let mut out = Vec::new();
    for (i, predicate) in qg.selections.iter().enumerate() {
        match &predicate.expression {
            Expression::Binary { op, lhs, rhs } => {
                let (property, value, op) = if let Some(p) = is_property_of(lhs, node) {
                    (p, rhs.as_ref(), *op)
                } else if let Some(p) = is_property_of(rhs, node) {
                    // Normalize `5 < n.prop` to `n.prop > 5`.
                    let flipped = match op {
                        BinaryOp::Lt => BinaryOp::Gt,
                        BinaryOp::LtEq => BinaryOp::GtEq,
                        BinaryOp::Gt => BinaryOp::Lt,
                        BinaryOp::GtEq => BinaryOp::LtEq,
                        other => *other,
                    };
                    (p, lhs.as_ref(), flipped)
                } else {
                    continue;
                };
                if !depends_only_on(value, bound) {
                    continue;
                }
                let form = match op {
                    BinaryOp::Eq => SeekForm::Equals(value.clone()),
                    BinaryOp::Gt => SeekForm::Lower(value.clone(), false),
                    BinaryOp::GtEq => SeekForm::Lower(value.clone(), true),
                    BinaryOp::Lt => SeekForm::Upper(value.clone(), false),
                    BinaryOp::LtEq => SeekForm::Upper(value.clone(), true),
                    BinaryOp::StartsWith => SeekForm::Prefix(value.clone()),
                    BinaryOp::Contains => SeekForm::Contains(value.clone()),
                    BinaryOp::EndsWith => SeekForm::EndsWith(value.clone()),
                    _ => continue,
                };
                out.push(SeekablePredicate {
                    property: property.to_string(),
                    form,
                    selection_index: i,
                });
            }
            Expression::IsNotNull(inner) => {
                if let Some(p) = is_property_of(inner, node) {
                    out.push(SeekablePredicate {
                        property: p.to_string(),
                        form: SeekForm::Existence,
                        selection_index: i,
                    });
                }
            }
            _ => {}
        }
    }
    out
}

/// The strongest seek this index can answer from the available predicates,
/// with the selection indices it consumes.
fn best_seek_for_index(
    index: &IndexDescriptor,
    seekables: &[SeekablePredicate],
) -> Option<(SeekKind, PropertyRetrieval, Vec<usize>)> {
    let for_property = |prop: &str| -> Vec<&SeekablePredicate> {
        seekables.iter().filter(|s| s.property == *prop).collect()
    };

    if index.is_composite() {
        // Composite indexes require equality on every indexed property.
        let mut values = Vec::new();
        let mut consumed = Vec::new();
        for prop in &index.properties {
            let eq = for_property(prop)
                .into_iter()
                .find(|s| matches!(s.form, SeekForm::Equals(_)))?;
            if let SeekForm::Equals(value) = &eq.form {
                values.push(value.clone());
                consumed.push(eq.selection_index);
            }
        }
        return Some((SeekKind::Exact(values), PropertyRetrieval::GetValue, consumed));
    }

    let prop = index.properties.first()?;
    let available = for_property(prop);
    if available.is_empty() {
        return None;
    }

    match index.index_type {
        IndexType::Range => {
            if let Some(eq) = available.iter().find(|s| matches!(s.form, SeekForm::Equals(_))) {
                if let SeekForm::Equals(value) = &eq.form {
                    return Some((
                        SeekKind::Exact(vec![value.clone()]),
                        PropertyRetrieval::GetValue,
                        vec![eq.selection_index],
                    ));
                }
            }
            let mut lower = None;
            let mut upper = None;
            let mut consumed = Vec::new();
            for s in &available {
                match &s.form {
                    SeekForm::Lower(value, inclusive) if lower.is_none() => {
                        lower = Some((value.clone(), *inclusive));
                        consumed.push(s.selection_index);
                    }
                    SeekForm::Upper(value, inclusive) if upper.is_none() => {
                        upper = Some((value.clone(), *inclusive));
                        consumed.push(s.selection_index);
                    }
                    _ => {}
                }
            }
            if lower.is_some() || upper.is_some() {
                return Some((
                    SeekKind::Range { lower, upper },
                    PropertyRetrieval::GetValue,
                    consumed,
                ));
            }
            if let Some(prefix) =
                available.iter().find(|s| matches!(s.form, SeekForm::Prefix(_)))
            {
                if let SeekForm::Prefix(value) = &prefix.form {
                    return Some((
                        SeekKind::Prefix(value.clone()),
                        PropertyRetrieval::GetValue,
                        vec![prefix.selection_index],
                    ));
                }
            }
            // A range index cannot answer CONTAINS / ENDS WITH; it can still
            // pre-filter on property existence, without values.
            available
                .iter()
                .find(|s| matches!(s.form, SeekForm::Existence))
                .map(|s| {
                    (
                        SeekKind::Existence,
                        PropertyRetrieval::DoNotGetValue,
                        vec![s.selection_index],
                    )
                })
        }
        IndexType::Text => {
            for s in &available {
                let kind = match &s.form {
                    SeekForm::Equals(v) => Some(SeekKind::Exact(vec![v.clone()])),
                    SeekForm::Prefix(v) => Some(SeekKind::Prefix(v.clone())),
                    SeekForm::Contains(v) => Some(SeekKind::Contains(v.clone())),
                    SeekForm::EndsWith(v) => Some(SeekKind::EndsWith(v.clone())),
                    _ => None,
                };
                if let Some(kind) = kind {
                    return Some((kind, PropertyRetrieval::GetValue, vec![s.selection_index]));
                }
            }
            None
        }
        IndexType::Lookup | IndexType::Point => available
            .iter()
            .find(|s| matches!(s.form, SeekForm::Existence))
            .map(|s| {
                (
                    SeekKind::Existence,
                    PropertyRetrieval::DoNotGetValue,
                    vec![s.selection_index],
                )
            }),
    }
}

fn id_seek_expressions(
    qg: &QueryGraph,
    node: &Variable,
    bound: &BTreeSet<Variable>,
) -> Option<(Vec<Expression>, usize)> {
    for (i, predicate) in qg.selections.iter().enumerate() {
        if let Expression::Binary { op, lhs, rhs } = &predicate.expression {
            let is_id_of_node = |e: &Expression| {
                matches!(e, Expression::FunctionCall { name, args, .. }
                    if name.eq_ignore_ascii_case("id")
                        && args.len() == 1
                        && matches!(&args[0], Expression::Variable(v) if v == node))
            };
            match op {
                BinaryOp::Eq if is_id_of_node(lhs) && depends_only_on(rhs, bound) => {
                    return Some((vec![rhs.as_ref().clone()], i));
                }
                BinaryOp::Eq if is_id_of_node(rhs) && depends_only_on(lhs, bound) => {
                    return Some((vec![lhs.as_ref().clone()], i));
                }
                BinaryOp::In if is_id_of_node(lhs) && depends_only_on(rhs, bound) => {
                    let ids = match rhs.as_ref() {
                        Expression::ListLiteral(items) => items.clone(),
                        other => vec![other.clone()],
                    };
                    return Some((ids, i));
                }
                _ => {}
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{IndexEntity, InMemoryIndexCatalog, InMemoryStatistics};
    use crate::planner::PlannerConfig;

    fn qg_with_labeled_node(label: &str) -> QueryGraph {
        let mut qg = QueryGraph::empty();
        qg.pattern_nodes.insert(Variable::new("n"));
        qg.selections.push(Predicate::new(Expression::has_labels(
            "n",
            vec![label.to_string()],
        )));
        qg
    }

    #[test]
    fn produces_scan_label_scan_and_seek_candidates() {
        let stats = InMemoryStatistics::new(1_000.0, 0.0).with_label("Person", 100.0);
        let indexes = InMemoryIndexCatalog::new().with_index(IndexDescriptor::new(
            IndexEntity::NodeLabel("Person".into()),
            vec!["name".into()],
            IndexType::Range,
        ));
        let config = PlannerConfig::default();
        let mut ctx = PlanningContext::new(&stats, &indexes, &config, false);

        let mut qg = qg_with_labeled_node("Person");
        qg.selections.push(Predicate::new(Expression::eq(
            Expression::property("n", "name"),
            Expression::string("Ada"),
        )));

        let candidates = node_leaf_candidates(&mut ctx, &qg, &Variable::new("n"), None);
        let names: Vec<&str> = candidates
            .iter()
            .map(|c| ctx.arena.get(*c).name())
            .collect();
        assert!(names.contains(&"AllNodesScan"));
        assert!(names.contains(&"NodeByLabelScan"));
        assert!(names.contains(&"NodeIndexSeek"));
    }

    #[test]
    fn index_seek_records_consumed_predicates() {
        let stats = InMemoryStatistics::new(1_000.0, 0.0).with_label("Person", 100.0);
        let indexes = InMemoryIndexCatalog::new().with_index(IndexDescriptor::new(
            IndexEntity::NodeLabel("Person".into()),
            vec!["name".into()],
            IndexType::Range,
        ));
        let config = PlannerConfig::default();
        let mut ctx = PlanningContext::new(&stats, &indexes, &config, false);

        let mut qg = qg_with_labeled_node("Person");
        let eq = Expression::eq(
            Expression::property("n", "name"),
            Expression::string("Ada"),
        );
        qg.selections.push(Predicate::new(eq.clone()));

        let candidates = node_leaf_candidates(&mut ctx, &qg, &Variable::new("n"), None);
        let seek = candidates
            .iter()
            .find(|c| ctx.arena.get(**c).name() == "NodeIndexSeek")
            .copied()
            .unwrap();
        assert!(ctx.solved(seek).covers_predicate(&eq));
    }

    #[test]
    fn text_index_answers_contains() {
        let stats = InMemoryStatistics::new(1_000.0, 0.0).with_label("Doc", 500.0);
        let indexes = InMemoryIndexCatalog::new().with_index(IndexDescriptor::new(
            IndexEntity::NodeLabel("Doc".into()),
            vec!["body".into()],
            IndexType::Text,
        ));
        let config = PlannerConfig::default();
        let mut ctx = PlanningContext::new(&stats, &indexes, &config, false);

        let mut qg = qg_with_labeled_node("Doc");
        qg.selections.push(Predicate::new(Expression::binary(
            BinaryOp::Contains,
            Expression::property("n", "body"),
            Expression::string("graph"),
        )));

        let candidates = node_leaf_candidates(&mut ctx, &qg, &Variable::new("n"), None);
        let has_contains_seek = candidates.iter().any(|c| {
            matches!(
                ctx.arena.get(*c),
                Operator::NodeIndexSeek { seek: SeekKind::Contains(_), .. }
            )
        });
        assert!(has_contains_seek);
    }

    #[test]
    fn existence_only_support_uses_do_not_get_value() {
        let stats = InMemoryStatistics::new(1_000.0, 0.0).with_label("Person", 100.0);
        let indexes = InMemoryIndexCatalog::new().with_index(IndexDescriptor::new(
            IndexEntity::NodeLabel("Person".into()),
            vec!["name".into()],
            IndexType::Range,
        ));
        let config = PlannerConfig::default();
        let mut ctx = PlanningContext::new(&stats, &indexes, &config, false);

        let mut qg = qg_with_labeled_node("Person");
        qg.selections.push(Predicate::new(Expression::IsNotNull(
            Box::new(Expression::property("n", "name")),
        )));

        let candidates = node_leaf_candidates(&mut ctx, &qg, &Variable::new("n"), None);
        let existence = candidates.iter().find_map(|c| match ctx.arena.get(*c) {
            Operator::NodeIndexSeek { seek: SeekKind::Existence, get_value, .. } => {
                Some(*get_value)
            }
            _ => None,
        });
        assert_eq!(existence, Some(PropertyRetrieval::DoNotGetValue));
    }

    #[test]
    fn relationship_property_predicate_enables_index_seek() {
        let stats = InMemoryStatistics::new(1_000.0, 5_000.0).with_relationship_type("KNOWS", 2_000.0);
        let indexes = InMemoryIndexCatalog::new().with_index(IndexDescriptor::new(
            IndexEntity::RelationshipType("KNOWS".into()),
            vec!["since".into()],
            IndexType::Range,
        ));
        let config = PlannerConfig::default();
        let mut ctx = PlanningContext::new(&stats, &indexes, &config, false);

        let mut qg = QueryGraph::empty();
        qg.pattern_nodes.insert(Variable::new("a"));
        qg.pattern_nodes.insert(Variable::new("b"));
        qg.connections.push(crate::query_graph::NodeConnection::Relationship(
            crate::query_graph::PatternRelationship {
                variable: Variable::new("r"),
                left: Variable::new("a"),
                right: Variable::new("b"),
                direction: crate::ir::Direction::Outgoing,
                types: vec!["KNOWS".into()],
                length: crate::ir::PatternLength::Simple,
            },
        ));
        qg.selections.push(Predicate::new(Expression::eq(
            Expression::property("r", "since"),
            Expression::integer(2020),
        )));

        let candidates = relationship_leaf_candidates(&mut ctx, &qg, 0);
        let names: Vec<&str> = candidates
            .iter()
            .map(|c| ctx.arena.get(*c).name())
            .collect();
        assert!(names.contains(&"RelationshipTypeScan"));
        assert!(names.contains(&"RelationshipIndexSeek"));
    }

    #[test]
    fn restriction_rejects_seeks_on_unbound_values() {
        let stats = InMemoryStatistics::new(1_000.0, 0.0).with_label("Person", 100.0);
        let indexes = InMemoryIndexCatalog::new().with_index(IndexDescriptor::new(
            IndexEntity::NodeLabel("Person".into()),
            vec!["name".into()],
            IndexType::Range,
        ));
        let config = PlannerConfig::default();
        let mut ctx = PlanningContext::new(&stats, &indexes, &config, false);

        let mut qg = qg_with_labeled_node("Person");
        // Value depends on `m`, which the restriction does not consider bound.
        qg.selections.push(Predicate::new(Expression::eq(
            Expression::property("n", "name"),
            Expression::property("m", "name"),
        )));

        let restriction = LeafPlanRestrictions {
            required_variable: Variable::new("n"),
            bound: BTreeSet::new(),
        };
        let candidates =
            node_leaf_candidates(&mut ctx, &qg, &Variable::new("n"), Some(&restriction));
        assert!(candidates.is_empty());

        let mut bound = BTreeSet::new();
        bound.insert(Variable::new("m"));
        let restriction = LeafPlanRestrictions {
            required_variable: Variable::new("n"),
            bound,
        };
        let candidates =
            node_leaf_candidates(&mut ctx, &qg, &Variable::new("n"), Some(&restriction));
        assert_eq!(candidates.len(), 1);
        assert_eq!(ctx.arena.get(candidates[0]).name(), "NodeIndexSeek");
    }
}
