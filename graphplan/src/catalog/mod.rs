// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Read-only catalogs the planner consumes: cardinality statistics and
//! index metadata. Both are snapshots; the planner never writes to them.

mod indexes;
mod statistics;

pub use indexes::*;
pub use statistics::*;
