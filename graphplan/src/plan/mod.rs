// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Logical plan representation
//!
//! Arena-allocated operator trees plus the write-once side tables recording,
//! per plan handle, what the plan solves and what it is estimated to cost.

mod arena;
mod cost;
mod display;
mod operator;
mod solved;
mod trace;

pub use arena::*;
pub use cost::*;
pub use display::*;
pub use operator::*;
pub use solved::*;
pub use trace::*;
