//! Document persistence
//!
//! Entities are stored as JSON documents grouped in named collections and
//! addressed by a generated id. Backends only move strings around; typing
//! and filtering happen in `Collection<T>`.
//!
//! Guarantees are limited to single-document atomicity. Callers that
//! read-modify-write a document must serialize on their own key.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;

/// An entity that lives in a collection and carries its own id
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: &'static str;

    fn id(&self) -> &str;

    fn assign_id(&mut self, id: String);
}

/// Raw storage backend
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn put(&self, collection: &str, id: &str, body: String) -> Result<()>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<String>>;

    async fn scan(&self, collection: &str) -> Result<Vec<String>>;
}

/// Process-local backend, used for development and tests
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn put(&self, collection: &str, id: &str, body: String) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), body);
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<String>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn scan(&self, collection: &str) -> Result<Vec<String>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default())
    }
}

/// Typed view over one collection of a `DocumentStore`
pub struct Collection<T> {
    store: Arc<dyn DocumentStore>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Document> Collection<T> {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    /// Insert or replace a document. An empty id is replaced by a fresh UUID.
    pub async fn save(&self, mut doc: T) -> Result<T> {
        if doc.id().is_empty() {
            doc.assign_id(Uuid::new_v4().to_string());
        }
        let body = serde_json::to_string(&doc)?;
        self.store.put(T::COLLECTION, doc.id(), body).await?;
        Ok(doc)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<T>> {
        match self.store.get(T::COLLECTION, id).await? {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    /// Every document matching `predicate`, in no particular order
    pub async fn find_by<F>(&self, predicate: F) -> Result<Vec<T>>
    where
        F: Fn(&T) -> bool,
    {
        let mut matches = Vec::new();
        for body in self.store.scan(T::COLLECTION).await? {
            let doc: T = serde_json::from_str(&body)?;
            if predicate(&doc) {
                matches.push(doc);
            }
        }
        Ok(matches)
    }
}
