// Key-scoped mutual exclusion for read-modify-write on shared documents.
// Writers of different keys never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Prune idle entries once the table grows past this size
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Default)]
pub struct KeyedLocks {
    table: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`; released when the guard drops
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let handle = {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            if table.len() >= PRUNE_THRESHOLD {
                // Only the table holds idle handles
                table.retain(|_, m| Arc::strong_count(m) > 1);
            }
            table
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        handle.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn exercise_key(exercise_id: &str) -> String {
    format!("exercise:{}", exercise_id)
}

pub fn progress_key(user_id: &str, course_id: &str) -> String {
    format!("progress:{}:{}", user_id, course_id)
}

pub fn course_key(course_id: &str) -> String {
    format!("course:{}", course_id)
}

pub fn lesson_key(lesson_id: &str) -> String {
    format!("lesson:{}", lesson_id)
}
