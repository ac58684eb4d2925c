// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Planner configuration
//!
//! Cost constants are tunable policy, not a correctness contract: any values
//! keep plans correct, they only shift which alternative wins. Structural
//! knobs (thresholds, retention) bound compile time.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Tunable planning parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Selectivity of a predicate nothing more specific is known about.
    pub default_predicate_selectivity: f64,
    /// Selectivity of an equality predicate.
    pub equality_selectivity: f64,
    /// Selectivity of a range predicate.
    pub range_selectivity: f64,
    /// Selectivity of a STARTS WITH predicate.
    pub prefix_selectivity: f64,
    /// Selectivity of CONTAINS / ENDS WITH predicates.
    pub contains_selectivity: f64,
    /// Fraction of labelled entities that carry an indexed property.
    pub existence_selectivity: f64,
    /// Fraction of all nodes assumed under a label with no statistics.
    pub unknown_label_fraction: f64,
    /// Hops assumed for an unbounded variable-length expansion, beyond min.
    pub var_length_default_hops: u32,
    /// Above this many connections in one component, join enumeration falls
    /// back to a greedy linear order to bound compile time.
    pub greedy_component_threshold: usize,
    /// Candidate plans retained per solved set during enumeration.
    pub retained_per_solved_set: usize,
    /// Rows assumed for a LIMIT whose expression is not a literal.
    pub default_limit_rows: f64,

    // Per-row work factors. Seeks stay cheaper than scans of equal output.
    pub scan_row_cost: f64,
    pub seek_row_cost: f64,
    pub expand_row_cost: f64,
    pub filter_row_cost: f64,
    pub row_cost: f64,
    pub eager_row_cost: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            default_predicate_selectivity: 0.75,
            equality_selectivity: 0.1,
            range_selectivity: 0.3,
            prefix_selectivity: 0.2,
            contains_selectivity: 0.25,
            existence_selectivity: 0.9,
            unknown_label_fraction: 0.1,
            var_length_default_hops: 2,
            greedy_component_threshold: 8,
            retained_per_solved_set: 1,
            default_limit_rows: 100.0,
            scan_row_cost: 1.0,
            seek_row_cost: 0.4,
            expand_row_cost: 1.5,
            filter_row_cost: 0.1,
            row_cost: 0.1,
            eager_row_cost: 1.0,
        }
    }
}

/// Shared default configuration.
pub static DEFAULT_CONFIG: Lazy<PlannerConfig> = Lazy::new(PlannerConfig::default);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeks_are_cheaper_than_scans_by_default() {
        let config = PlannerConfig::default();
        assert!(config.seek_row_cost < config.scan_row_cost);
    }
}
