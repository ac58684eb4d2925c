// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Candidate selection
//!
//! One total order over competing plans for the same solved set: cost first,
//! estimated cardinality second, and a structural tie-break last, so that
//! planning the same query against the same statistics twice always picks
//! the same plan. A tie is never resolved by arbitrary choice.

use crate::plan::{PlanDisplay, PlanId};
use crate::planner::PlanningContext;
use std::cmp::Ordering;

/// Compares two candidate plans. Total and deterministic.
pub fn compare(ctx: &PlanningContext<'_>, a: PlanId, b: PlanId) -> Ordering {
    ctx.cost(a)
        .cmp_total(ctx.cost(b))
        .then_with(|| ctx.cardinality(a).cmp_total(ctx.cardinality(b)))
        .then_with(|| shape_key(ctx, a).cmp(&shape_key(ctx, b)))
        .then(a.cmp(&b))
}

/// Picks the best candidate, or `None` for an empty candidate set.
pub fn pick_best(ctx: &PlanningContext<'_>, candidates: &[PlanId]) -> Option<PlanId> {
    candidates
        .iter()
        .copied()
        .min_by(|a, b| compare(ctx, *a, *b))
}

/// Structural fingerprint used as the deterministic tie-break.
pub fn shape_key(ctx: &PlanningContext<'_>, id: PlanId) -> String {
    PlanDisplay {
        arena: &ctx.arena,
        root: id,
        attributes: None,
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InMemoryIndexCatalog, InMemoryStatistics};
    use crate::ir::Variable;
    use crate::plan::{Operator, SolvedParts};
    use crate::planner::PlannerConfig;
    use std::collections::BTreeSet;

    #[test]
    fn cheaper_plan_wins_and_ties_break_deterministically() {
        let stats = InMemoryStatistics::new(1_000.0, 0.0).with_label("Person", 10.0);
        let indexes = InMemoryIndexCatalog::new();
        let config = PlannerConfig::default();
        let mut ctx = PlanningContext::new(&stats, &indexes, &config, false);

        let all = ctx.add_plan(
            Operator::AllNodesScan {
                node: Variable::new("n"),
                arguments: BTreeSet::new(),
            },
            SolvedParts::for_node(Variable::new("n")),
        );
        let by_label = ctx.add_plan(
            Operator::NodeByLabelScan {
                node: Variable::new("n"),
                label: "Person".into(),
                arguments: BTreeSet::new(),
            },
            SolvedParts::for_node(Variable::new("n")),
        );

        assert_eq!(pick_best(&ctx, &[all, by_label]), Some(by_label));
        assert_eq!(pick_best(&ctx, &[by_label, all]), Some(by_label));

        // Identical plans tie on cost and shape; the handle decides.
        let twin = ctx.add_plan(
            Operator::AllNodesScan {
                node: Variable::new("n"),
                arguments: BTreeSet::new(),
            },
            SolvedParts::for_node(Variable::new("n")),
        );
        assert_eq!(pick_best(&ctx, &[twin, all]), Some(all));
    }
}
