//! Container tooling seam used by the mirror executor

use async_trait::async_trait;
use mirror_gate_common::ImageReference;

use crate::definition::RegistryCredentials;
use crate::error::Result;

/// Content digest of an image, e.g. `sha256:4f1c...`
pub type Digest = String;

/// The registry operations a mirror job needs
///
/// Nothing beyond identity, login, pull, tag and push is used.
#[async_trait]
pub trait ContainerTooling: Send + Sync {
    /// Account that owns the private registry
    async fn caller_identity(&self) -> Result<String>;

    /// Log in to `registry_host`
    async fn login(
        &self,
        registry_host: &str,
        credentials: &RegistryCredentials,
        region: &str,
    ) -> Result<()>;

    /// Pull an image, returning its digest
    async fn pull(&self, image: &ImageReference) -> Result<Digest>;

    /// Tag a pulled image under another reference
    async fn tag(&self, source: &ImageReference, target: &ImageReference) -> Result<()>;

    /// Push an image, returning the digest the registry now holds for it
    ///
    /// Pushing a tag that already exists overwrites it.
    async fn push(&self, image: &ImageReference) -> Result<Digest>;
}
