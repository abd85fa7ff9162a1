use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A fully qualified container image reference
///
/// Used both for the public source of a mirror and for the private
/// destination the mirror pushes to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageReference {
    /// Registry host, e.g. `public.ecr.aws` or `123456789012.dkr.ecr.us-east-1.amazonaws.com`
    pub registry: String,

    /// Repository path inside the registry
    pub repository: String,

    /// Image tag
    pub tag: String,
}

impl ImageReference {
    /// Create a new image reference
    pub fn new(
        registry: impl Into<String>,
        repository: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            registry: registry.into(),
            repository: repository.into(),
            tag: tag.into(),
        }
    }

    /// Same repository and tag on another registry
    pub fn with_registry(&self, registry: impl Into<String>) -> Self {
        Self {
            registry: registry.into(),
            ..self.clone()
        }
    }

    /// Same registry and repository with another tag
    pub fn with_tag(&self, tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..self.clone()
        }
    }

    /// `registry/repository` without the tag
    pub fn repository_uri(&self) -> String {
        format!("{}/{}", self.registry, self.repository)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
    }
}

impl FromStr for ImageReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidImageReference {
            reference: s.to_string(),
            reason: reason.to_string(),
        };

        let (registry, rest) = s.split_once('/').ok_or_else(|| invalid("missing registry"))?;
        if registry.is_empty() {
            return Err(invalid("missing registry"));
        }

        // The registry may carry a port, so the tag separator is searched in the remainder only
        let (repository, tag) = rest.rsplit_once(':').ok_or_else(|| invalid("missing tag"))?;
        if repository.is_empty() {
            return Err(invalid("missing repository"));
        }
        if tag.is_empty() || tag.contains('/') {
            return Err(invalid("missing tag"));
        }

        Ok(Self::new(registry, repository, tag))
    }
}
