// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Query IR: the semantically-analyzed query representation the planner
//! consumes. Variables are already scoped and typed by an upstream semantic
//! phase; the planner treats the whole IR as read-only.

mod expr;
mod pattern;
mod query;
mod value;

pub use expr::*;
pub use pattern::*;
pub use query::*;
pub use value::*;
