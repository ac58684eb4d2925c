// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Logical plan operators
//!
//! The complete operator vocabulary the planner can emit. Operators are
//! immutable once constructed; children are arena handles, so sharing a
//! sub-plan between candidate trees is free.

use crate::catalog::IndexType;
use crate::ir::{Direction, Expression, Repetition, Variable};
use crate::plan::arena::{PlanArena, PlanId};
use crate::query_graph::{SelectivePathPattern, UpdateAction, VariableGrouping};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How an index seek locates entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SeekKind {
    /// Equality per indexed property (composite indexes take one value
    /// expression per property).
    Exact(Vec<Expression>),
    Range {
        lower: Option<(Expression, bool)>,
        upper: Option<(Expression, bool)>,
    },
    /// `STARTS WITH`
    Prefix(Expression),
    /// `CONTAINS` (text indexes only)
    Contains(Expression),
    /// `ENDS WITH` (text indexes only)
    EndsWith(Expression),
    /// Property-existence only.
    Existence,
}

/// Whether the seek also retrieves the property value for downstream reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyRetrieval {
    GetValue,
    DoNotGetValue,
}

/// Expand flavor: `All` binds a fresh end node, `Into` checks a relationship
/// between two already-bound nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpansionMode {
    All,
    Into,
}

/// Why an eagerness barrier exists, recorded for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EagernessReason {
    /// Conservative blanket barrier.
    Unknown,
    /// A later read could observe an earlier delete of this variable.
    ReadDeleteConflict(Variable),
    /// A later read of this label could observe an earlier create.
    ReadCreateConflict(String),
    /// A write follows a projection that captured the written entity.
    WriteAfterProjection,
}

/// A predicate folded into a variable-length expansion, applied per element
/// while traversing instead of by a downstream filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldedPredicate {
    /// The per-element variable the predicate is phrased over.
    pub variable: Variable,
    pub predicate: Expression,
}

/// A sort column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortColumn {
    pub expression: Expression,
    pub ascending: bool,
}

/// A graph-writing command of a Create or Merge operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CreateCommand {
    Node {
        variable: Variable,
        labels: Vec<String>,
        properties: Vec<(String, Expression)>,
    },
    Relationship {
        variable: Variable,
        left: Variable,
        rel_type: String,
        right: Variable,
        direction: Direction,
        properties: Vec<(String, Expression)>,
    },
}

impl CreateCommand {
    pub fn variable(&self) -> &Variable {
        match self {
            CreateCommand::Node { variable, .. }
            | CreateCommand::Relationship { variable, .. } => variable,
        }
    }
}

/// A logical plan operator. 0, 1 or 2 children, plus nested sub-plans for
/// the operators that embed one (Trail, Merge).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operator {
    // ----- leaves ---------------------------------------------------------
    AllNodesScan {
        node: Variable,
        arguments: BTreeSet<Variable>,
    },
    NodeByLabelScan {
        node: Variable,
        label: String,
        arguments: BTreeSet<Variable>,
    },
    NodeIndexSeek {
        node: Variable,
        label: String,
        properties: Vec<String>,
        seek: SeekKind,
        get_value: PropertyRetrieval,
        index_type: IndexType,
        arguments: BTreeSet<Variable>,
    },
    NodeByIdSeek {
        node: Variable,
        ids: Vec<Expression>,
        arguments: BTreeSet<Variable>,
    },
    AllRelationshipsScan {
        rel: Variable,
        left: Variable,
        right: Variable,
        direction: Direction,
        arguments: BTreeSet<Variable>,
    },
    RelationshipTypeScan {
        rel: Variable,
        rel_type: String,
        left: Variable,
        right: Variable,
        direction: Direction,
        arguments: BTreeSet<Variable>,
    },
    RelationshipIndexSeek {
        rel: Variable,
        rel_type: String,
        left: Variable,
        right: Variable,
        direction: Direction,
        properties: Vec<String>,
        seek: SeekKind,
        get_value: PropertyRetrieval,
        index_type: IndexType,
        arguments: BTreeSet<Variable>,
    },
    /// Declares already-bound variables; the unit row of Apply right sides.
    Argument {
        arguments: BTreeSet<Variable>,
    },
    /// Count of nodes straight from the count store; one row, no scan.
    NodeCountFromCountStore {
        variable: Variable,
        labels: Vec<Option<String>>,
    },
    /// Count of relationships straight from the count store; one row.
    RelationshipCountFromCountStore {
        variable: Variable,
        from_label: Option<String>,
        rel_type: Option<String>,
        to_label: Option<String>,
    },

    // ----- single child ---------------------------------------------------
    Expand {
        input: PlanId,
        from: Variable,
        rel: Variable,
        to: Variable,
        direction: Direction,
        types: Vec<String>,
        mode: ExpansionMode,
    },
    VarExpand {
        input: PlanId,
        from: Variable,
        rel: Variable,
        to: Variable,
        direction: Direction,
        types: Vec<String>,
        min: u32,
        max: Option<u32>,
        mode: ExpansionMode,
        /// Folded per-node predicate, applied while traversing.
        node_predicate: Option<FoldedPredicate>,
        /// Folded per-relationship predicate, applied while traversing.
        relationship_predicate: Option<FoldedPredicate>,
    },
    /// Repeats an inner sub-plan for a quantified path pattern.
    Trail {
        input: PlanId,
        inner: PlanId,
        name: Variable,
        left: Variable,
        right: Variable,
        inner_left: Variable,
        inner_right: Variable,
        repetition: Repetition,
        groupings: Vec<VariableGrouping>,
    },
    /// Finds paths kept by a selective selector between bound endpoints.
    ShortestPath {
        input: PlanId,
        pattern: SelectivePathPattern,
    },
    Selection {
        input: PlanId,
        /// Conjuncts ordered most-selective first.
        predicates: Vec<Expression>,
    },
    Projection {
        input: PlanId,
        expressions: Vec<(Variable, Expression)>,
        /// Columns intentionally not carried forward.
        discard: BTreeSet<Variable>,
    },
    Aggregation {
        input: PlanId,
        grouping: Vec<(Variable, Expression)>,
        aggregations: Vec<(Variable, Expression)>,
    },
    OrderedAggregation {
        input: PlanId,
        grouping: Vec<(Variable, Expression)>,
        aggregations: Vec<(Variable, Expression)>,
        /// Grouping prefix already ordered by the input.
        ordered_prefix: Vec<Variable>,
    },
    Distinct {
        input: PlanId,
        expressions: Vec<(Variable, Expression)>,
    },
    Sort {
        input: PlanId,
        items: Vec<SortColumn>,
    },
    /// Sort bounded by a known limit; replaces Sort + Limit.
    Top {
        input: PlanId,
        items: Vec<SortColumn>,
        limit: Expression,
    },
    Skip {
        input: PlanId,
        expression: Expression,
    },
    Limit {
        input: PlanId,
        expression: Expression,
    },
    /// Yields a single all-null row when the input is empty.
    Optional {
        input: PlanId,
        arguments: BTreeSet<Variable>,
    },
    /// Materializes all input rows before any downstream row is produced.
    Eager {
        input: PlanId,
        reasons: Vec<EagernessReason>,
    },
    Unwind {
        input: PlanId,
        variable: Variable,
        expression: Expression,
    },
    LoadCsv {
        input: PlanId,
        variable: Variable,
        url: Expression,
        with_headers: bool,
    },
    Create {
        input: PlanId,
        commands: Vec<CreateCommand>,
    },
    /// Match-or-create: runs the embedded match plan per row, creating the
    /// pattern when it found nothing.
    Merge {
        input: PlanId,
        match_plan: PlanId,
        commands: Vec<CreateCommand>,
        on_create: Vec<crate::ir::SetItem>,
        on_match: Vec<crate::ir::SetItem>,
    },
    Delete {
        input: PlanId,
        expression: Expression,
        detach: bool,
    },
    SetProperty {
        input: PlanId,
        subject: Variable,
        key: String,
        value: Expression,
    },
    SetLabels {
        input: PlanId,
        subject: Variable,
        labels: Vec<String>,
    },
    RemoveProperty {
        input: PlanId,
        subject: Variable,
        key: String,
    },
    RemoveLabels {
        input: PlanId,
        subject: Variable,
        labels: Vec<String>,
    },
    Foreach {
        input: PlanId,
        variable: Variable,
        list: Expression,
        actions: Vec<UpdateAction>,
    },
    ProduceResults {
        input: PlanId,
        columns: Vec<Variable>,
    },
    EmptyResult {
        input: PlanId,
    },

    // ----- two children ---------------------------------------------------
    CartesianProduct {
        lhs: PlanId,
        rhs: PlanId,
    },
    NodeHashJoin {
        nodes: BTreeSet<Variable>,
        lhs: PlanId,
        rhs: PlanId,
    },
    ValueHashJoin {
        lhs: PlanId,
        rhs: PlanId,
        lhs_expression: Expression,
        rhs_expression: Expression,
    },
    Apply {
        lhs: PlanId,
        rhs: PlanId,
    },
    SemiApply {
        lhs: PlanId,
        rhs: PlanId,
    },
    AntiSemiApply {
        lhs: PlanId,
        rhs: PlanId,
    },
    SelectOrSemiApply {
        lhs: PlanId,
        rhs: PlanId,
        expression: Expression,
    },
    SelectOrAntiSemiApply {
        lhs: PlanId,
        rhs: PlanId,
        expression: Expression,
    },
    LetSemiApply {
        lhs: PlanId,
        rhs: PlanId,
        variable: Variable,
    },
    LetAntiSemiApply {
        lhs: PlanId,
        rhs: PlanId,
        variable: Variable,
    },
    LetSelectOrSemiApply {
        lhs: PlanId,
        rhs: PlanId,
        variable: Variable,
        expression: Expression,
    },
    LetSelectOrAntiSemiApply {
        lhs: PlanId,
        rhs: PlanId,
        variable: Variable,
        expression: Expression,
    },
    /// Collects the rhs single column into a list per lhs row.
    RollUpApply {
        lhs: PlanId,
        rhs: PlanId,
        collection: Variable,
        variable: Variable,
    },
    Union {
        lhs: PlanId,
        rhs: PlanId,
        distinct: bool,
    },
}

impl Operator {
    /// Child plans in evaluation order (embedded sub-plans included).
    pub fn children(&self) -> Vec<PlanId> {
        use Operator::*;
        match self {
            AllNodesScan { .. }
            | NodeByLabelScan { .. }
            | NodeIndexSeek { .. }
            | NodeByIdSeek { .. }
            | AllRelationshipsScan { .. }
            | RelationshipTypeScan { .. }
            | RelationshipIndexSeek { .. }
            | Argument { .. }
            | NodeCountFromCountStore { .. }
            | RelationshipCountFromCountStore { .. } => Vec::new(),
            Expand { input, .. }
            | VarExpand { input, .. }
            | ShortestPath { input, .. }
            | Selection { input, .. }
            | Projection { input, .. }
            | Aggregation { input, .. }
            | OrderedAggregation { input, .. }
            | Distinct { input, .. }
            | Sort { input, .. }
            | Top { input, .. }
            | Skip { input, .. }
            | Limit { input, .. }
            | Optional { input, .. }
            | Eager { input, .. }
            | Unwind { input, .. }
            | LoadCsv { input, .. }
            | Create { input, .. }
            | Delete { input, .. }
            | SetProperty { input, .. }
            | SetLabels { input, .. }
            | RemoveProperty { input, .. }
            | RemoveLabels { input, .. }
            | Foreach { input, .. }
            | ProduceResults { input, .. }
            | EmptyResult { input } => vec![*input],
            Trail { input, inner, .. } => vec![*input, *inner],
            Merge { input, match_plan, .. } => vec![*input, *match_plan],
            CartesianProduct { lhs, rhs }
            | NodeHashJoin { lhs, rhs, .. }
            | ValueHashJoin { lhs, rhs, .. }
            | Apply { lhs, rhs }
            | SemiApply { lhs, rhs }
            | AntiSemiApply { lhs, rhs }
            | SelectOrSemiApply { lhs, rhs, .. }
            | SelectOrAntiSemiApply { lhs, rhs, .. }
            | LetSemiApply { lhs, rhs, .. }
            | LetAntiSemiApply { lhs, rhs, .. }
            | LetSelectOrSemiApply { lhs, rhs, .. }
            | LetSelectOrAntiSemiApply { lhs, rhs, .. }
            | RollUpApply { lhs, rhs, .. }
            | Union { lhs, rhs, .. } => vec![*lhs, *rhs],
        }
    }

    /// Operator name for rendering and diagnostics.
    pub fn name(&self) -> &'static str {
        use Operator::*;
        match self {
            AllNodesScan { .. } => "AllNodesScan",
            NodeByLabelScan { .. } => "NodeByLabelScan",
            NodeIndexSeek { .. } => "NodeIndexSeek",
            NodeByIdSeek { .. } => "NodeByIdSeek",
            AllRelationshipsScan { .. } => "AllRelationshipsScan",
            RelationshipTypeScan { .. } => "RelationshipTypeScan",
            RelationshipIndexSeek { .. } => "RelationshipIndexSeek",
            Argument { .. } => "Argument",
            NodeCountFromCountStore { .. } => "NodeCountFromCountStore",
            RelationshipCountFromCountStore { .. } => "RelationshipCountFromCountStore",
            Expand { mode: ExpansionMode::All, .. } => "ExpandAll",
            Expand { mode: ExpansionMode::Into, .. } => "ExpandInto",
            VarExpand { .. } => "VarExpand",
            Trail { .. } => "Trail",
            ShortestPath { .. } => "ShortestPath",
            Selection { .. } => "Selection",
            Projection { .. } => "Projection",
            Aggregation { .. } => "Aggregation",
            OrderedAggregation { .. } => "OrderedAggregation",
            Distinct { .. } => "Distinct",
            Sort { .. } => "Sort",
            Top { .. } => "Top",
            Skip { .. } => "Skip",
            Limit { .. } => "Limit",
            Optional { .. } => "Optional",
            Eager { .. } => "Eager",
            Unwind { .. } => "Unwind",
            LoadCsv { .. } => "LoadCsv",
            Create { .. } => "Create",
            Merge { .. } => "Merge",
            Delete { .. } => "Delete",
            SetProperty { .. } => "SetProperty",
            SetLabels { .. } => "SetLabels",
            RemoveProperty { .. } => "RemoveProperty",
            RemoveLabels { .. } => "RemoveLabels",
            Foreach { .. } => "Foreach",
            ProduceResults { .. } => "ProduceResults",
            EmptyResult { .. } => "EmptyResult",
            CartesianProduct { .. } => "CartesianProduct",
            NodeHashJoin { .. } => "NodeHashJoin",
            ValueHashJoin { .. } => "ValueHashJoin",
            Apply { .. } => "Apply",
            SemiApply { .. } => "SemiApply",
            AntiSemiApply { .. } => "AntiSemiApply",
            SelectOrSemiApply { .. } => "SelectOrSemiApply",
            SelectOrAntiSemiApply { .. } => "SelectOrAntiSemiApply",
            LetSemiApply { .. } => "LetSemiApply",
            LetAntiSemiApply { .. } => "LetAntiSemiApply",
            LetSelectOrSemiApply { .. } => "LetSelectOrSemiApply",
            LetSelectOrAntiSemiApply { .. } => "LetSelectOrAntiSemiApply",
            RollUpApply { .. } => "RollUpApply",
            Union { .. } => "Union",
        }
    }
}

impl PlanArena {
    /// Variables available to consumers of `id`, computed bottom-up.
    pub fn available_symbols(&self, id: PlanId) -> BTreeSet<Variable> {
        use Operator::*;
        let op = self.get(id);
        match op {
            AllNodesScan { node, arguments } | NodeByLabelScan { node, arguments, .. } => {
                let mut out = arguments.clone();
                out.insert(node.clone());
                out
            }
            NodeIndexSeek { node, arguments, .. } | NodeByIdSeek { node, arguments, .. } => {
                let mut out = arguments.clone();
                out.insert(node.clone());
                out
            }
            AllRelationshipsScan { rel, left, right, arguments, .. }
            | RelationshipTypeScan { rel, left, right, arguments, .. }
            | RelationshipIndexSeek { rel, left, right, arguments, .. } => {
                let mut out = arguments.clone();
                out.extend([rel.clone(), left.clone(), right.clone()]);
                out
            }
            Argument { arguments } => arguments.clone(),
            NodeCountFromCountStore { variable, .. }
            | RelationshipCountFromCountStore { variable, .. } => {
                [variable.clone()].into_iter().collect()
            }
            Expand { input, rel, to, .. } => {
                let mut out = self.available_symbols(*input);
                out.extend([rel.clone(), to.clone()]);
                out
            }
            VarExpand { input, rel, to, .. } => {
                let mut out = self.available_symbols(*input);
                out.extend([rel.clone(), to.clone()]);
                out
            }
            Trail { input, right, groupings, .. } => {
                let mut out = self.available_symbols(*input);
                out.insert(right.clone());
                out.extend(groupings.iter().map(|g| g.group.clone()));
                out
            }
            ShortestPath { input, pattern } => {
                let mut out = self.available_symbols(*input);
                out.extend(pattern.covered_ids());
                out
            }
            Selection { input, .. }
            | Sort { input, .. }
            | Top { input, .. }
            | Skip { input, .. }
            | Limit { input, .. }
            | Optional { input, .. }
            | Eager { input, .. }
            | Delete { input, .. }
            | SetProperty { input, .. }
            | SetLabels { input, .. }
            | RemoveProperty { input, .. }
            | RemoveLabels { input, .. }
            | Foreach { input, .. }
            | EmptyResult { input } => self.available_symbols(*input),
            Projection { input, expressions, discard } => {
                let mut out = self.available_symbols(*input);
                out.extend(expressions.iter().map(|(v, _)| v.clone()));
                out.retain(|v| !discard.contains(v));
                out
            }
            Aggregation { grouping, aggregations, .. }
            | OrderedAggregation { grouping, aggregations, .. } => grouping
                .iter()
                .chain(aggregations)
                .map(|(v, _)| v.clone())
                .collect(),
            Distinct { expressions, .. } => {
                expressions.iter().map(|(v, _)| v.clone()).collect()
            }
            Unwind { input, variable, .. } | LoadCsv { input, variable, .. } => {
                let mut out = self.available_symbols(*input);
                out.insert(variable.clone());
                out
            }
            Create { input, commands } => {
                let mut out = self.available_symbols(*input);
                out.extend(commands.iter().map(|c| c.variable().clone()));
                out
            }
            Merge { input, match_plan, .. } => {
                let mut out = self.available_symbols(*input);
                out.extend(self.available_symbols(*match_plan));
                out
            }
            ProduceResults { input, columns } => {
                let mut out = self.available_symbols(*input);
                out.extend(columns.iter().cloned());
                out
            }
            CartesianProduct { lhs, rhs }
            | NodeHashJoin { lhs, rhs, .. }
            | ValueHashJoin { lhs, rhs, .. }
            | Apply { lhs, rhs }
            | Union { lhs, rhs, .. } => {
                let mut out = self.available_symbols(*lhs);
                out.extend(self.available_symbols(*rhs));
                out
            }
            SemiApply { lhs, .. } | AntiSemiApply { lhs, .. } => self.available_symbols(*lhs),
            SelectOrSemiApply { lhs, .. } | SelectOrAntiSemiApply { lhs, .. } => {
                self.available_symbols(*lhs)
            }
            LetSemiApply { lhs, variable, .. }
            | LetAntiSemiApply { lhs, variable, .. }
            | LetSelectOrSemiApply { lhs, variable, .. }
            | LetSelectOrAntiSemiApply { lhs, variable, .. } => {
                let mut out = self.available_symbols(*lhs);
                out.insert(variable.clone());
                out
            }
            RollUpApply { lhs, collection, .. } => {
                let mut out = self.available_symbols(*lhs);
                out.insert(collection.clone());
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_adds_rel_and_target_symbols() {
        let mut arena = PlanArena::new();
        let scan = arena.push(Operator::AllNodesScan {
            node: Variable::new("a"),
            arguments: BTreeSet::new(),
        });
        let expand = arena.push(Operator::Expand {
            input: scan,
            from: Variable::new("a"),
            rel: Variable::new("r"),
            to: Variable::new("b"),
            direction: Direction::Outgoing,
            types: vec!["X".into()],
            mode: ExpansionMode::All,
        });
        let symbols = arena.available_symbols(expand);
        for name in ["a", "r", "b"] {
            assert!(symbols.contains(&Variable::new(name)));
        }
    }

    #[test]
    fn semi_apply_does_not_leak_rhs_symbols() {
        let mut arena = PlanArena::new();
        let lhs = arena.push(Operator::AllNodesScan {
            node: Variable::new("a"),
            arguments: BTreeSet::new(),
        });
        let rhs = arena.push(Operator::AllNodesScan {
            node: Variable::new("hidden"),
            arguments: BTreeSet::new(),
        });
        let semi = arena.push(Operator::SemiApply { lhs, rhs });
        let symbols = arena.available_symbols(semi);
        assert!(symbols.contains(&Variable::new("a")));
        assert!(!symbols.contains(&Variable::new("hidden")));
    }

    #[test]
    fn projection_respects_discard_set() {
        let mut arena = PlanArena::new();
        let scan = arena.push(Operator::AllNodesScan {
            node: Variable::new("a"),
            arguments: BTreeSet::new(),
        });
        let projection = arena.push(Operator::Projection {
            input: scan,
            expressions: vec![(Variable::new("b"), Expression::var("a"))],
            discard: [Variable::new("a")].into_iter().collect(),
        });
        let symbols = arena.available_symbols(projection);
        assert!(symbols.contains(&Variable::new("b")));
        assert!(!symbols.contains(&Variable::new("a")));
    }
}
