pub mod access;
pub mod catalog;
pub mod evaluator;
pub mod locks;
pub mod progress;
pub mod runner;
pub mod stats;
pub mod submission;

#[cfg(test)]
mod test_support;

pub use access::{authorize, Permission, Principal, Role, RoleDirectory, RoleGrant};
pub use catalog::Catalog;
pub use evaluator::{Evaluation, Evaluator};
pub use progress::ProgressTracker;
pub use runner::{CodeRunner, PlaceholderRunner, QueueRunner, RunnerError};
pub use stats::{ExerciseStatistics, ExerciseStats};
pub use submission::SubmissionService;

use locks::KeyedLocks;
use odyssey_common::config::{Config, RunnerBackend, StoreBackend};
use odyssey_common::redis::RedisStore;
use odyssey_common::store::{Collection, DocumentStore, MemoryStore};
use odyssey_common::Result;
use std::sync::Arc;
use tracing::info;

/// Every service wired over one store, one runner and one lock table
#[derive(Clone)]
pub struct Platform {
    pub catalog: Catalog,
    pub progress: ProgressTracker,
    pub submissions: SubmissionService,
    pub roles: RoleDirectory,
}

impl Platform {
    pub fn new(store: Arc<dyn DocumentStore>, runner: Arc<dyn CodeRunner>, timeout_ms: u64) -> Self {
        let locks = Arc::new(KeyedLocks::new());
        let exercises = Collection::new(store.clone());

        let progress = ProgressTracker::new(
            Collection::new(store.clone()),
            Collection::new(store.clone()),
            Collection::new(store.clone()),
            locks.clone(),
        );
        let stats = ExerciseStats::new(exercises.clone(), locks.clone());
        let submissions = SubmissionService::new(
            Evaluator::new(runner, timeout_ms),
            exercises.clone(),
            Collection::new(store.clone()),
            stats,
            progress.clone(),
        );
        let catalog = Catalog::new(
            Collection::new(store.clone()),
            Collection::new(store.clone()),
            exercises,
            progress.clone(),
            locks,
        );

        Self {
            catalog,
            progress,
            submissions,
            roles: RoleDirectory::new(Collection::new(store)),
        }
    }

    /// Open the configured store and runner backends
    pub async fn connect(config: &Config) -> Result<Self> {
        let store: Arc<dyn DocumentStore> = match config.store_backend {
            StoreBackend::Memory => {
                info!("Using in-memory document store");
                Arc::new(MemoryStore::new())
            }
            StoreBackend::Redis => {
                let store = RedisStore::connect(&config.redis_url).await?;
                info!("Connected to Redis document store: {}", config.redis_url);
                Arc::new(store)
            }
        };

        let runner: Arc<dyn CodeRunner> = match config.runner_backend {
            RunnerBackend::Placeholder => {
                info!("Using placeholder code runner");
                Arc::new(PlaceholderRunner::new())
            }
            RunnerBackend::Queue => {
                let runner = QueueRunner::connect(&config.redis_url, config.runner_timeout_ms).await?;
                info!(timeout_ms = config.runner_timeout_ms, "Using queue code runner");
                Arc::new(runner)
            }
        };

        Ok(Self::new(store, runner, config.runner_timeout_ms))
    }
}
