//! Conversation registry. Conversations are the scopes that uploaded chunks
//! can be tied to.
//!
//! Deleting a conversation only removes it from the registry; its chunks stay
//! in the vector index. Ids are never reused, so no later conversation can
//! ever match those chunks again.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::ScopeError;
use crate::models::Conversation;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScopeFile {
    next_id: i64,
    conversations: Vec<Conversation>,
}

impl Default for ScopeFile {
    fn default() -> Self {
        Self {
            next_id: 1,
            conversations: Vec::new(),
        }
    }
}

pub struct ScopeRegistry {
    inner: RwLock<ScopeFile>,
    persist_path: Option<PathBuf>,
}

impl ScopeRegistry {
    pub fn open(path: PathBuf) -> Result<Self> {
        let file = if path.exists() {
            let data = std::fs::read_to_string(&path).context("Failed to read scope registry")?;
            serde_json::from_str(&data).context("Failed to parse scope registry")?
        } else {
            ScopeFile::default()
        };

        Ok(Self {
            inner: RwLock::new(file),
            persist_path: Some(path),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            inner: RwLock::new(ScopeFile::default()),
            persist_path: None,
        }
    }

    /// Register a new conversation. If the registry cannot be written the
    /// conversation is not created and `next_id` is left unchanged.
    pub fn create(&self, title: Option<String>) -> Result<Conversation, ScopeError> {
        let mut inner = self.inner.write();
        let conversation = Conversation {
            id: inner.next_id,
            title: title
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "New Chat".to_string()),
            created_at: Utc::now(),
        };
        inner.next_id += 1;
        inner.conversations.push(conversation.clone());

        if let Err(e) = self.persist(&inner) {
            inner.conversations.pop();
            inner.next_id -= 1;
            tracing::error!("Scope creation rolled back: {e}");
            return Err(e);
        }
        Ok(conversation)
    }

    pub fn get(&self, id: i64) -> Result<Conversation, ScopeError> {
        self.inner
            .read()
            .conversations
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or(ScopeError::NotFound(id))
    }

    /// `Ok` for no scope or a live scope.
    pub fn ensure(&self, scope_id: Option<i64>) -> Result<(), ScopeError> {
        match scope_id {
            Some(id) => self.get(id).map(|_| ()),
            None => Ok(()),
        }
    }

    /// Newest first.
    pub fn list(&self) -> Vec<Conversation> {
        let mut conversations = self.inner.read().conversations.clone();
        conversations.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        conversations
    }

    /// Remove a conversation. If the registry cannot be written the
    /// conversation stays registered.
    pub fn delete(&self, id: i64) -> Result<Conversation, ScopeError> {
        let mut inner = self.inner.write();
        let pos = inner
            .conversations
            .iter()
            .position(|c| c.id == id)
            .ok_or(ScopeError::NotFound(id))?;
        let removed = inner.conversations.remove(pos);

        if let Err(e) = self.persist(&inner) {
            inner.conversations.insert(pos, removed);
            tracing::error!("Scope deletion rolled back: {e}");
            return Err(e);
        }
        Ok(removed)
    }

    /// Atomic write via temp file + rename.
    fn persist(&self, file: &ScopeFile) -> Result<(), ScopeError> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        let data = serde_json::to_string_pretty(file)
            .map_err(|e| ScopeError::Persistence(e.to_string()))?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, data)
            .and_then(|_| std::fs::rename(&tmp_path, path))
            .map_err(|e| ScopeError::Persistence(format!("{}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_assigns_increasing_ids() {
        let registry = ScopeRegistry::in_memory();
        let a = registry.create(None).unwrap();
        let b = registry.create(Some("Tower B".into())).unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(a.title, "New Chat");
        assert_eq!(b.title, "Tower B");
    }

    #[test]
    fn test_deleted_ids_are_never_reused() {
        let registry = ScopeRegistry::in_memory();
        let a = registry.create(None).unwrap();
        registry.delete(a.id).unwrap();
        let c = registry.create(None).unwrap();
        assert_ne!(c.id, a.id);
        assert_eq!(registry.get(a.id), Err(ScopeError::NotFound(a.id)));
    }

    #[test]
    fn test_unknown_scope_not_found() {
        let registry = ScopeRegistry::in_memory();
        assert_eq!(registry.ensure(Some(9)), Err(ScopeError::NotFound(9)));
        assert_eq!(registry.ensure(None), Ok(()));
        assert!(registry.delete(9).is_err());
    }

    #[test]
    fn test_registry_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scopes.json");

        let registry = ScopeRegistry::open(path.clone()).unwrap();
        let a = registry.create(Some("A".into())).unwrap();
        registry.delete(a.id).unwrap();
        registry.create(Some("B".into())).unwrap();

        let reopened = ScopeRegistry::open(path).unwrap();
        let list = reopened.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].title, "B");
        assert_eq!(reopened.create(None).unwrap().id, 3);
    }

    #[test]
    fn test_failed_create_is_rolled_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("scopes.json");
        let registry = ScopeRegistry::open(path.clone()).unwrap();

        assert!(matches!(registry.create(None), Err(ScopeError::Persistence(_))));
        assert!(registry.list().is_empty());

        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        assert_eq!(registry.create(None).unwrap().id, 1);
    }

    #[test]
    fn test_deleted_id_not_reused_after_failed_write() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("registry");
        std::fs::create_dir_all(&parent).unwrap();
        let path = parent.join("scopes.json");

        let registry = ScopeRegistry::open(path.clone()).unwrap();
        let a = registry.create(Some("A".into())).unwrap();

        // The write fails, so the scope must stay registered.
        std::fs::remove_dir_all(&parent).unwrap();
        assert!(matches!(registry.delete(a.id), Err(ScopeError::Persistence(_))));
        assert_eq!(registry.get(a.id).unwrap().id, a.id);

        std::fs::create_dir_all(&parent).unwrap();
        registry.delete(a.id).unwrap();

        let reopened = ScopeRegistry::open(path).unwrap();
        assert_eq!(reopened.get(a.id), Err(ScopeError::NotFound(a.id)));
        let c = reopened.create(None).unwrap();
        assert_ne!(c.id, a.id);
    }
}
