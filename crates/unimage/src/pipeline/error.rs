use thiserror::Error;

use crate::agents::AgentRole;
use crate::client::ClientError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Stage {role} failed: {source}")]
    Stage {
        role: AgentRole,
        #[source]
        source: ClientError,
    },
}

impl PipelineError {
    pub fn role(&self) -> AgentRole {
        match self {
            PipelineError::Stage { role, .. } => *role,
        }
    }
}
