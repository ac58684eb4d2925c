// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Planning trace
//!
//! Optional per-compilation record of what the planner did: which phases
//! ran, how many candidates each produced, and which alternative won.
//! Purely diagnostic; tracing never influences plan choice.

use crate::plan::arena::PlanId;
use serde::{Deserialize, Serialize};

/// Phases of the planning pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanningPhase {
    QueryGraphConstruction,
    LeafPlanning,
    JoinEnumeration,
    SubqueryRewriting,
    SelectionPlanning,
    HorizonPlanning,
    EagernessAnalysis,
    PlanSelection,
}

/// One recorded planning step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    pub phase: PlanningPhase,
    pub detail: String,
    pub chosen: Option<PlanId>,
    pub candidates: usize,
}

/// Collects trace steps for one compilation.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PlanTrace {
    pub steps: Vec<TraceStep>,
}

impl PlanTrace {
    pub fn new() -> Self {
        PlanTrace::default()
    }

    pub fn record(
        &mut self,
        phase: PlanningPhase,
        detail: impl Into<String>,
        chosen: Option<PlanId>,
        candidates: usize,
    ) {
        self.steps.push(TraceStep {
            phase,
            detail: detail.into(),
            chosen,
            candidates,
        });
    }

    pub fn steps_for(&self, phase: PlanningPhase) -> impl Iterator<Item = &TraceStep> {
        self.steps.iter().filter(move |s| s.phase == phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_steps_in_order() {
        let mut trace = PlanTrace::new();
        trace.record(PlanningPhase::LeafPlanning, "node a", None, 3);
        trace.record(PlanningPhase::PlanSelection, "picked", Some(PlanId(7)), 3);
        assert_eq!(trace.steps.len(), 2);
        assert_eq!(trace.steps_for(PlanningPhase::PlanSelection).count(), 1);
        assert_eq!(trace.steps[1].chosen, Some(PlanId(7)));
    }
}
