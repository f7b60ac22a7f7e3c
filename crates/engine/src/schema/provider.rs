use async_trait::async_trait;
use uuid::Uuid;

use crate::{schema::WorkflowStep, Result};

/// Supplies the workflow schema for a project. The engine only ever reads
/// this structure; schema configuration lives elsewhere.
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    async fn workflow_steps(&self, project_id: Uuid) -> Result<Vec<WorkflowStep>>;
}

/// In-memory provider for tests and for callers that already hold the schema.
pub struct StaticSchemaProvider {
    steps: Vec<WorkflowStep>,
}

impl StaticSchemaProvider {
    pub fn new(steps: Vec<WorkflowStep>) -> Self {
        Self { steps }
    }
}

#[async_trait]
impl SchemaProvider for StaticSchemaProvider {
    async fn workflow_steps(&self, _project_id: Uuid) -> Result<Vec<WorkflowStep>> {
        Ok(self.steps.clone())
    }
}
