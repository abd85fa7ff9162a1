use mirror_gate_common::ImageReference;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Region is not set in the execution environment (AWS_REGION / AWS_DEFAULT_REGION)")]
    MissingRegion,

    #[error("Failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Could not read an image digest from the output of `{0}`")]
    MissingDigest(String),

    #[error("Image not found: {0}")]
    ImageNotFound(ImageReference),

    #[error("Not authenticated to registry {0}")]
    Unauthenticated(String),

    #[error("Credential not available: {0}")]
    MissingCredential(String),

    #[error("Step '{step}' needs '{requires}' to have run first")]
    OutOfOrder {
        step: &'static str,
        requires: &'static str,
    },

    #[error("Step '{step}' failed: {source}")]
    StepFailed {
        step: &'static str,
        #[source]
        source: Box<MirrorError>,
    },
}

impl MirrorError {
    /// Name of the step that aborted the job, if known
    pub fn failed_step(&self) -> Option<&'static str> {
        match self {
            Self::StepFailed { step, .. } => Some(step),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, MirrorError>;
