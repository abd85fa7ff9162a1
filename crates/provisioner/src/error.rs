use mirror_gate_common::ImageReference;
use thiserror::Error;

use crate::engine::{ResourceAction, ResourceEvent};

/// Errors building or ordering the resource graph
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Resource not found: {0}")]
    UnknownResource(String),

    #[error("Resource declared twice: {0}")]
    DuplicateResource(String),

    #[error("Dependency cycle involving {0}")]
    Cycle(String),
}

/// Inconsistent mirror stack settings
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StackError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Trigger starts {triggered} but the stack mirrors {job}")]
    JobMismatch { job: String, triggered: String },

    #[error("Function {function} runs {image}, not the mirrored image {destination}")]
    ImageMismatch {
        function: String,
        image: ImageReference,
        destination: ImageReference,
    },
}

/// Why a provisioning pass was aborted
#[derive(Error, Debug)]
pub enum PassError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A hook failed; the state store was left as it was before the pass
    #[error("{action} of {logical_id} failed: {source:#}")]
    HookFailed {
        logical_id: String,
        action: ResourceAction,
        #[source]
        source: anyhow::Error,
        /// Resources handled before the failure, rolled back with the pass
        completed: Vec<ResourceEvent>,
    },
}

impl PassError {
    /// Resource whose hook failed
    pub fn failed_resource(&self) -> Option<&str> {
        match self {
            Self::HookFailed { logical_id, .. } => Some(logical_id),
            Self::Graph(_) => None,
        }
    }
}
