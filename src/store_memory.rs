//! In-memory [`RecordStore`] implementation for tests and embedded use.
//!
//! Uses a `HashMap` behind `std::sync::RwLock` for thread safety.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ItemKind, ItemStatus, KnowledgeItem};
use crate::store::RecordStore;

/// In-process record store backed by a map of item id to item.
pub struct MemoryStore {
    items: RwLock<HashMap<String, KnowledgeItem>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.items.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert(&self, item: &KnowledgeItem) -> Result<()> {
        let mut items = self.items.write().unwrap();
        items.insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<KnowledgeItem>> {
        let items = self.items.read().unwrap();
        Ok(items.get(id).cloned())
    }

    async fn get_for_workspace(
        &self,
        ids: &[String],
        workspace_id: &str,
    ) -> Result<Vec<KnowledgeItem>> {
        let items = self.items.read().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| items.get(id))
            .filter(|item| item.workspace_id == workspace_id)
            .cloned()
            .collect())
    }

    async fn list_ready(
        &self,
        workspace_id: &str,
        collection_id: Option<&str>,
        kinds: Option<&[ItemKind]>,
        limit: usize,
    ) -> Result<Vec<KnowledgeItem>> {
        let items = self.items.read().unwrap();
        let mut matching: Vec<KnowledgeItem> = items
            .values()
            .filter(|item| item.workspace_id == workspace_id)
            .filter(|item| item.status == ItemStatus::Ready)
            .filter(|item| match collection_id {
                Some(c) => item.collection_id.as_deref() == Some(c),
                None => true,
            })
            .filter(|item| match kinds {
                Some(kinds) if !kinds.is_empty() => kinds.contains(&item.kind),
                _ => true,
            })
            .cloned()
            .collect();

        matching.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn update(&self, item: &KnowledgeItem) -> Result<()> {
        let mut items = self.items.write().unwrap();
        if let Some(existing) = items.get_mut(&item.id) {
            *existing = item.clone();
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut items = self.items.write().unwrap();
        items.remove(id);
        Ok(())
    }
}
