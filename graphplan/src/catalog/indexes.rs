// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Index and constraint metadata

use serde::{Deserialize, Serialize};

/// What the index is built over.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IndexEntity {
    NodeLabel(String),
    RelationshipType(String),
}

/// Index implementation families. Range indexes answer equality, range and
/// prefix predicates; text indexes additionally answer CONTAINS / ENDS WITH;
/// lookup indexes only answer existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IndexType {
    Range,
    Text,
    Point,
    Lookup,
}

/// One available index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub entity: IndexEntity,
    pub properties: Vec<String>,
    pub index_type: IndexType,
    pub unique: bool,
}

impl IndexDescriptor {
    pub fn new(entity: IndexEntity, properties: Vec<String>, index_type: IndexType) -> Self {
        IndexDescriptor {
            entity,
            properties,
            index_type,
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn is_composite(&self) -> bool {
        self.properties.len() > 1
    }

    /// Stable string identity used as a statistics key.
    pub fn identity(&self) -> String {
        let entity = match &self.entity {
            IndexEntity::NodeLabel(l) => format!("label:{}", l),
            IndexEntity::RelationshipType(t) => format!("type:{}", t),
        };
        format!(
            "{}[{}]:{:?}",
            entity,
            self.properties.join(","),
            self.index_type
        )
    }
}

/// Enumerates available indexes for one schema snapshot.
pub trait IndexCatalog {
    /// Indexes over nodes with the given label, in a stable order.
    fn node_indexes(&self, label: &str) -> Vec<IndexDescriptor>;

    /// Indexes over relationships of the given type, in a stable order.
    fn relationship_indexes(&self, rel_type: &str) -> Vec<IndexDescriptor>;
}

/// In-memory index catalog for tests and embedders.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIndexCatalog {
    indexes: Vec<IndexDescriptor>,
}

impl InMemoryIndexCatalog {
    pub fn new() -> Self {
        InMemoryIndexCatalog::default()
    }

    pub fn with_index(mut self, index: IndexDescriptor) -> Self {
        self.indexes.push(index);
        self.indexes.sort();
        self
    }
}

impl IndexCatalog for InMemoryIndexCatalog {
    fn node_indexes(&self, label: &str) -> Vec<IndexDescriptor> {
        self.indexes
            .iter()
            .filter(|ix| matches!(&ix.entity, IndexEntity::NodeLabel(l) if l == label))
            .cloned()
            .collect()
    }

    fn relationship_indexes(&self, rel_type: &str) -> Vec<IndexDescriptor> {
        self.indexes
            .iter()
            .filter(|ix| matches!(&ix.entity, IndexEntity::RelationshipType(t) if t == rel_type))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_filters_by_label() {
        let catalog = InMemoryIndexCatalog::new()
            .with_index(IndexDescriptor::new(
                IndexEntity::NodeLabel("Person".into()),
                vec!["name".into()],
                IndexType::Range,
            ))
            .with_index(IndexDescriptor::new(
                IndexEntity::NodeLabel("Person".into()),
                vec!["name".into()],
                IndexType::Text,
            ))
            .with_index(IndexDescriptor::new(
                IndexEntity::RelationshipType("KNOWS".into()),
                vec!["since".into()],
                IndexType::Range,
            ));

        assert_eq!(catalog.node_indexes("Person").len(), 2);
        assert_eq!(catalog.node_indexes("Robot").len(), 0);
        assert_eq!(catalog.relationship_indexes("KNOWS").len(), 1);
    }
}
