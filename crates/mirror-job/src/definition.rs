//! Mirror job definition

use mirror_gate_common::ImageReference;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the job authenticates to the private registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegistryCredentials {
    /// Exchange the ambient cloud identity for a registry password
    #[default]
    Ambient,

    /// Fixed username, password read from an environment variable when the job runs
    PasswordEnv {
        username: String,
        password_env: String,
    },
}

/// A repeatable copy of one image from a public registry into a private one
///
/// Defined once; every execution is independent and re-pushing the same tag
/// is an overwrite, so running it any number of times is safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorJob {
    /// Job name the runner starts it by
    pub name: String,

    /// Public image to copy
    pub source: ImageReference,

    /// Private image to create or overwrite
    pub destination: ImageReference,

    /// Credentials for the private registry
    #[serde(default)]
    pub credentials: RegistryCredentials,
}

/// One step of a mirror job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorStep {
    /// Resolve the account owning the private registry
    ResolveIdentity,
    /// Work out the registry host suffix from the region of the running environment
    DeriveRegistrySuffix,
    /// Log in to the private registry
    Authenticate,
    Pull(ImageReference),
    Tag {
        source: ImageReference,
        destination: ImageReference,
    },
    Push(ImageReference),
}

impl MirrorStep {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ResolveIdentity => "resolve_identity",
            Self::DeriveRegistrySuffix => "derive_registry_suffix",
            Self::Authenticate => "authenticate",
            Self::Pull(_) => "pull",
            Self::Tag { .. } => "tag",
            Self::Push(_) => "push",
        }
    }
}

impl fmt::Display for MirrorStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pull(image) | Self::Push(image) => write!(f, "{} {}", self.name(), image),
            Self::Tag {
                source,
                destination,
            } => write!(f, "tag {} as {}", source, destination),
            _ => f.write_str(self.name()),
        }
    }
}

impl MirrorJob {
    /// Create a job using ambient credentials
    pub fn new(name: impl Into<String>, source: ImageReference, destination: ImageReference) -> Self {
        Self {
            name: name.into(),
            source,
            destination,
            credentials: RegistryCredentials::Ambient,
        }
    }

    pub fn with_credentials(mut self, credentials: RegistryCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Ordered steps of one execution
    ///
    /// The region suffix is a step of its own and not a field of the job:
    /// the region is only known inside the environment that runs it.
    pub fn steps(&self) -> Vec<MirrorStep> {
        vec![
            MirrorStep::ResolveIdentity,
            MirrorStep::DeriveRegistrySuffix,
            MirrorStep::Authenticate,
            MirrorStep::Pull(self.source.clone()),
            MirrorStep::Tag {
                source: self.source.clone(),
                destination: self.destination.clone(),
            },
            MirrorStep::Push(self.destination.clone()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> MirrorJob {
        MirrorJob::new(
            "mirror-connector",
            ImageReference::new("public-registry", "app", "v1"),
            ImageReference::new("destination-registry", "app", "v1"),
        )
    }

    #[test]
    fn test_steps_are_ordered() {
        let names: Vec<_> = job().steps().iter().map(MirrorStep::name).collect();
        assert_eq!(
            names,
            vec![
                "resolve_identity",
                "derive_registry_suffix",
                "authenticate",
                "pull",
                "tag",
                "push"
            ]
        );
    }

    #[test]
    fn test_steps_are_deterministic() {
        assert_eq!(job().steps(), job().steps());
    }

    #[test]
    fn test_step_display() {
        let steps = job().steps();
        assert_eq!(steps[3].to_string(), "pull public-registry/app:v1");
        assert_eq!(
            steps[4].to_string(),
            "tag public-registry/app:v1 as destination-registry/app:v1"
        );
    }

    #[test]
    fn test_job_definition_json() {
        let json = serde_json::json!({
            "name": "mirror-connector",
            "source": { "registry": "public-registry", "repository": "app", "tag": "v1" },
            "destination": { "registry": "destination-registry", "repository": "app", "tag": "v1" }
        });

        let parsed: MirrorJob = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, job());
        assert_eq!(parsed.credentials, RegistryCredentials::Ambient);

        let with_password = serde_json::json!({
            "kind": "password_env",
            "username": "mirror",
            "password_env": "REGISTRY_PASSWORD"
        });
        let credentials: RegistryCredentials = serde_json::from_value(with_password).unwrap();
        assert!(matches!(credentials, RegistryCredentials::PasswordEnv { .. }));
    }
}
