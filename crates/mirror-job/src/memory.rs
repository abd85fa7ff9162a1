//! In-memory registry for development and testing
//!
//! Simulates public and private registries plus the local image store of the
//! machine running the job, without docker or network access.

use async_trait::async_trait;
use mirror_gate_common::ImageReference;
use sha2::{Digest as _, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::definition::RegistryCredentials;
use crate::error::{MirrorError, Result};
use crate::tooling::{ContainerTooling, Digest};

#[derive(Default)]
struct RegistryState {
    /// `registry/repository` -> tag -> digest
    remote: HashMap<String, HashMap<String, Digest>>,

    /// Images present on the executing machine, by full reference
    local: HashMap<ImageReference, Digest>,

    /// Registry hosts with an active login
    sessions: HashSet<String>,

    pushes: usize,
}

/// Registry double backing [`ContainerTooling`]
///
/// Clones share state, so a test can keep one handle while the executor owns another.
#[derive(Clone)]
pub struct InMemoryRegistry {
    account_id: String,
    state: Arc<Mutex<RegistryState>>,
}

impl InMemoryRegistry {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            state: Arc::new(Mutex::new(RegistryState::default())),
        }
    }

    /// Make an image available in its registry, returning its content digest
    pub async fn publish(&self, image: &ImageReference, content: &[u8]) -> Digest {
        let digest = content_digest(content);
        let mut state = self.state.lock().await;
        state
            .remote
            .entry(image.repository_uri())
            .or_default()
            .insert(image.tag.clone(), digest.clone());
        digest
    }

    /// Digest a registry holds for `image`
    pub async fn digest_of(&self, image: &ImageReference) -> Option<Digest> {
        let state = self.state.lock().await;
        state
            .remote
            .get(&image.repository_uri())
            .and_then(|tags| tags.get(&image.tag))
            .cloned()
    }

    /// Tags of a repository, sorted
    pub async fn tags(&self, repository_uri: &str) -> Vec<String> {
        let state = self.state.lock().await;
        let mut tags: Vec<String> = state
            .remote
            .get(repository_uri)
            .map(|tags| tags.keys().cloned().collect())
            .unwrap_or_default();
        tags.sort();
        tags
    }

    pub async fn is_logged_in(&self, registry_host: &str) -> bool {
        self.state.lock().await.sessions.contains(registry_host)
    }

    /// Number of pushes accepted so far
    pub async fn push_count(&self) -> usize {
        self.state.lock().await.pushes
    }
}

#[async_trait]
impl ContainerTooling for InMemoryRegistry {
    async fn caller_identity(&self) -> Result<String> {
        Ok(self.account_id.clone())
    }

    async fn login(
        &self,
        registry_host: &str,
        credentials: &RegistryCredentials,
        _region: &str,
    ) -> Result<()> {
        if let RegistryCredentials::PasswordEnv { password_env, .. } = credentials {
            if std::env::var(password_env).is_err() {
                return Err(MirrorError::MissingCredential(password_env.clone()));
            }
        }

        debug!("In-memory registry: login {}", registry_host);
        self.state
            .lock()
            .await
            .sessions
            .insert(registry_host.to_string());
        Ok(())
    }

    async fn pull(&self, image: &ImageReference) -> Result<Digest> {
        let digest = self
            .digest_of(image)
            .await
            .ok_or_else(|| MirrorError::ImageNotFound(image.clone()))?;

        debug!("In-memory registry: pull {} -> {}", image, digest);
        self.state
            .lock()
            .await
            .local
            .insert(image.clone(), digest.clone());
        Ok(digest)
    }

    async fn tag(&self, source: &ImageReference, target: &ImageReference) -> Result<()> {
        let mut state = self.state.lock().await;
        let digest = state
            .local
            .get(source)
            .cloned()
            .ok_or_else(|| MirrorError::ImageNotFound(source.clone()))?;
        state.local.insert(target.clone(), digest);
        Ok(())
    }

    async fn push(&self, image: &ImageReference) -> Result<Digest> {
        let mut state = self.state.lock().await;

        if !state.sessions.contains(&image.registry) {
            return Err(MirrorError::Unauthenticated(image.registry.clone()));
        }

        let digest = state
            .local
            .get(image)
            .cloned()
            .ok_or_else(|| MirrorError::ImageNotFound(image.clone()))?;

        // Existing tags are overwritten
        state
            .remote
            .entry(image.repository_uri())
            .or_default()
            .insert(image.tag.clone(), digest.clone());
        state.pushes += 1;

        debug!("In-memory registry: push {} -> {}", image, digest);
        Ok(digest)
    }
}

fn content_digest(content: &[u8]) -> Digest {
    format!("sha256:{}", hex::encode(Sha256::digest(content)))
}
