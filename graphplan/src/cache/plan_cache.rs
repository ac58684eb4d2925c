// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Query plan caching
//!
//! Read-mostly cache keyed by normalized query text plus the planner
//! configuration that produced the plan. Entries are immutable once
//! published (shared through `Arc`), so concurrent lookups never observe a
//! partially built plan. The cache is safe to share between worker threads;
//! each planning run itself stays single-threaded.

use crate::planner::{PlannedQuery, PlannerConfig};
use parking_lot::RwLock;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Key for plan cache entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlanCacheKey {
    /// Hash of the normalized query text.
    pub query_hash: u64,
    /// Hash of the planner configuration in effect.
    pub config_hash: u64,
}

impl PlanCacheKey {
    pub fn new(normalized_query: &str, config: &PlannerConfig) -> Self {
        let mut hasher = DefaultHasher::new();
        normalized_query.hash(&mut hasher);
        let query_hash = hasher.finish();

        // Config has floats; its serialized form is the hashable identity.
        let mut hasher = DefaultHasher::new();
        serde_json::to_string(config)
            .unwrap_or_default()
            .hash(&mut hasher);
        let config_hash = hasher.finish();

        PlanCacheKey {
            query_hash,
            config_hash,
        }
    }
}

/// Plan cache statistics.
#[derive(Debug, Default, Clone)]
pub struct PlanCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub current_entries: usize,
}

impl PlanCacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Thread-safe plan cache with a bounded entry count.
pub struct PlanCache {
    entries: RwLock<HashMap<PlanCacheKey, Arc<PlannedQuery>>>,
    stats: RwLock<PlanCacheStats>,
    max_entries: usize,
}

impl PlanCache {
    pub fn new(max_entries: usize) -> Self {
        PlanCache {
            entries: RwLock::new(HashMap::new()),
            stats: RwLock::new(PlanCacheStats::default()),
            max_entries: max_entries.max(1),
        }
    }

    /// Looks up a published plan.
    pub fn get(&self, key: &PlanCacheKey) -> Option<Arc<PlannedQuery>> {
        let found = self.entries.read().get(key).cloned();
        let mut stats = self.stats.write();
        match &found {
            Some(_) => stats.hits += 1,
            None => stats.misses += 1,
        }
        found
    }

    /// Publishes a plan. The entry is immutable from here on; a concurrent
    /// insert for the same key keeps the first published entry.
    pub fn insert(&self, key: PlanCacheKey, plan: PlannedQuery) -> Arc<PlannedQuery> {
        let mut entries = self.entries.write();
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            // Bounded and simple: discard everything rather than track
            // recency. Plans are cheap to rebuild relative to running them.
            entries.clear();
            let mut stats = self.stats.write();
            stats.evictions += 1;
        }
        let published = entries
            .entry(key)
            .or_insert_with(|| Arc::new(plan))
            .clone();
        self.stats.write().current_entries = entries.len();
        published
    }

    pub fn stats(&self) -> PlanCacheStats {
        self.stats.read().clone()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
        self.stats.write().current_entries = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InMemoryIndexCatalog, InMemoryStatistics};
    use crate::ir::{Clause, Expression, NodePattern, PathPattern, ProjectionItem, Query};
    use crate::planner::Planner;

    fn planned() -> PlannedQuery {
        let planner = Planner::new(
            InMemoryStatistics::new(10.0, 0.0),
            InMemoryIndexCatalog::new(),
            PlannerConfig::default(),
        );
        let query = Query::single(vec![
            Clause::Match {
                optional: false,
                patterns: vec![PathPattern::node(NodePattern::named("a"))],
                hints: Vec::new(),
                predicate: None,
            },
            Clause::Return {
                distinct: false,
                items: vec![ProjectionItem::new(Expression::var("a"), "a")],
                order_by: Vec::new(),
                skip: None,
                limit: None,
            },
        ]);
        planner.plan(&query).unwrap()
    }

    #[test]
    fn hit_after_insert_and_stable_entry() {
        let cache = PlanCache::new(16);
        let key = PlanCacheKey::new("MATCH (a) RETURN a", &PlannerConfig::default());
        assert!(cache.get(&key).is_none());

        let published = cache.insert(key.clone(), planned());
        let fetched = cache.get(&key).unwrap();
        assert!(Arc::ptr_eq(&published, &fetched));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn different_config_means_different_key() {
        let default_key = PlanCacheKey::new("MATCH (a) RETURN a", &PlannerConfig::default());
        let mut config = PlannerConfig::default();
        config.equality_selectivity = 0.5;
        let tuned_key = PlanCacheKey::new("MATCH (a) RETURN a", &config);
        assert_ne!(default_key, tuned_key);
    }

    #[test]
    fn first_publication_wins() {
        let cache = PlanCache::new(16);
        let key = PlanCacheKey::new("q", &PlannerConfig::default());
        let first = cache.insert(key.clone(), planned());
        let second = cache.insert(key, planned());
        assert!(Arc::ptr_eq(&first, &second));
    }
}
