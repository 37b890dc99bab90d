use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Lifecycle of a background generation task. State names follow the
/// task-queue vocabulary the API exposes to clients.
#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Pending,
    Progress {
        current: u32,
        total: u32,
        status: String,
    },
    Success {
        result: Value,
    },
    Failure {
        error: String,
    },
}

impl JobState {
    pub fn name(&self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Progress { .. } => "PROGRESS",
            JobState::Success { .. } => "SUCCESS",
            JobState::Failure { .. } => "FAILURE",
        }
    }
}

/// In-process registry of generation tasks, keyed by opaque task ids.
#[derive(Clone, Default)]
pub struct JobTracker {
    jobs: Arc<RwLock<HashMap<String, JobState>>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self) -> String {
        let task_id = Uuid::new_v4().to_string();
        self.jobs
            .write()
            .await
            .insert(task_id.clone(), JobState::Pending);
        task_id
    }

    pub async fn set_progress(&self, task_id: &str, current: u32, status: &str) {
        self.jobs.write().await.insert(
            task_id.to_string(),
            JobState::Progress {
                current,
                total: 100,
                status: status.to_string(),
            },
        );
    }

    pub async fn succeed(&self, task_id: &str, result: Value) {
        self.jobs
            .write()
            .await
            .insert(task_id.to_string(), JobState::Success { result });
    }

    pub async fn fail(&self, task_id: &str, error: &str) {
        self.jobs.write().await.insert(
            task_id.to_string(),
            JobState::Failure {
                error: error.to_string(),
            },
        );
    }

    pub async fn get(&self, task_id: &str) -> Option<JobState> {
        self.jobs.read().await.get(task_id).cloned()
    }
}
