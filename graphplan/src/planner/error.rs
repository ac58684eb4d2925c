// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Planning errors
//!
//! Only genuinely fatal conditions surface here. A predicate without an
//! index, a statistics miss, or a cost tie are all handled inline with
//! fallbacks and never abort compilation.

use thiserror::Error;

/// Fatal planning failures. The caller sees either a complete plan or
/// exactly one of these; there is no partial output.
#[derive(Error, Debug)]
pub enum PlanningError {
    #[error("Invalid query structure: {0}")]
    InvalidQuery(String),

    /// A structural invariant of planning was violated. Continuing would
    /// risk emitting an incorrect plan, so compilation aborts.
    #[error("Planning invariant violated: {0}")]
    InvariantViolation(String),

    /// A construct with no legal physical realization. Well-typed input
    /// never produces this.
    #[error("No physical realization for construct: {0}")]
    Unrealizable(String),

    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),
}
