// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Plan caching to avoid recompilation

mod plan_cache;

pub use plan_cache::*;
