// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! GraphPlan - A cost-based logical query planner for property graph queries
//!
//! GraphPlan turns a parsed, semantically-analyzed graph query into an
//! executable logical operator tree. It is the planning core only: parsing,
//! semantic analysis, execution, and storage live in surrounding layers.
//!
//! # Features
//!
//! - **Cost-based planning**: candidate access paths and join orders are
//!   compared through a statistics-backed cost model
//! - **Join enumeration**: iterative dynamic programming over solved-set
//!   tables, with a greedy fallback for very large patterns
//! - **Subquery rewriting**: pattern predicates, EXISTS/COUNT subqueries and
//!   pattern comprehensions lower to the cheapest correct operator form
//! - **Deterministic output**: identical queries against identical statistics
//!   always produce structurally identical plans
//!
//! # Usage
//!
//! ```ignore
//! use graphplan::{Planner, PlannerConfig};
//! use graphplan::catalog::{InMemoryIndexCatalog, InMemoryStatistics};
//!
//! let stats = InMemoryStatistics::new(100_000.0, 250_000.0);
//! let indexes = InMemoryIndexCatalog::new();
//! let planner = Planner::new(stats, indexes, PlannerConfig::default());
//! let planned = planner.plan(&query)?;
//! println!("{}", planned.display());
//! ```

pub mod cache;
pub mod catalog;
pub mod ir;
pub mod plan;
pub mod planner;
pub mod query_graph;

// Re-export the public API - Planner is the main entry point
pub use plan::{Cardinality, Cost, PlanArena, PlanId};
pub use planner::{PlannedQuery, Planner, PlannerConfig, PlanningError};

/// GraphPlan version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// GraphPlan crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
