//! Dependent function
//!
//! The compute function that runs the mirrored image. It does no orchestration
//! of its own; ordering after the gate comes from its declared dependency.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mirror_gate_common::ImageReference;
use mirror_job::InMemoryRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::hook::{LifecycleHook, PhysicalId};

/// Function definition handed to the compute platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    /// Image in the private registry
    pub image: ImageReference,
    pub memory_mb: u32,
    pub timeout_secs: u32,
}

impl FunctionSpec {
    pub fn new(name: impl Into<String>, image: ImageReference) -> Self {
        Self {
            name: name.into(),
            image,
            memory_mb: 128,
            timeout_secs: 3,
        }
    }
}

/// Compute platform that hosts functions
#[async_trait]
pub trait FunctionPlatform: Send + Sync {
    /// Create a function, returning its platform identifier
    async fn create_function(&self, spec: &FunctionSpec) -> anyhow::Result<String>;

    /// Replace the definition of an existing function
    async fn update_function(&self, function_id: &str, spec: &FunctionSpec) -> anyhow::Result<String>;

    /// Run a function once, pulling its image; returns the digest it ran
    async fn invoke_function(&self, function_id: &str) -> anyhow::Result<String>;
}

/// One create or update the platform performed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDeployment {
    pub function_id: String,
    pub spec: FunctionSpec,
    pub created: bool,
    pub deployed_at: DateTime<Utc>,
}

/// Platform double recording every deployment
///
/// Definitions are accepted whether or not their image exists yet. The image
/// is only resolved, against the attached registry, when a function is invoked.
#[derive(Clone, Default)]
pub struct InMemoryFunctionPlatform {
    registry: Option<InMemoryRegistry>,
    deployments: Arc<Mutex<Vec<FunctionDeployment>>>,
}

impl InMemoryFunctionPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve function images against `registry`
    pub fn with_registry(mut self, registry: InMemoryRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub async fn deployments(&self) -> Vec<FunctionDeployment> {
        self.deployments.lock().await.clone()
    }

    /// Latest definition of a function
    pub async fn current(&self, name: &str) -> Option<FunctionDeployment> {
        self.deployments
            .lock()
            .await
            .iter()
            .rev()
            .find(|deployment| deployment.spec.name == name)
            .cloned()
    }

    async fn deploy(&self, function_id: String, spec: &FunctionSpec, created: bool) -> anyhow::Result<String> {
        self.deployments.lock().await.push(FunctionDeployment {
            function_id: function_id.clone(),
            spec: spec.clone(),
            created,
            deployed_at: Utc::now(),
        });
        Ok(function_id)
    }
}

#[async_trait]
impl FunctionPlatform for InMemoryFunctionPlatform {
    async fn create_function(&self, spec: &FunctionSpec) -> anyhow::Result<String> {
        let function_id = format!("function:{}", spec.name);
        self.deploy(function_id, spec, true).await
    }

    async fn update_function(&self, function_id: &str, spec: &FunctionSpec) -> anyhow::Result<String> {
        self.deploy(function_id.to_string(), spec, false).await
    }

    async fn invoke_function(&self, function_id: &str) -> anyhow::Result<String> {
        let image = self
            .deployments
            .lock()
            .await
            .iter()
            .rev()
            .find(|deployment| deployment.function_id == function_id)
            .map(|deployment| deployment.spec.image.clone())
            .with_context(|| format!("Function not found: {}", function_id))?;

        let registry = self
            .registry
            .as_ref()
            .with_context(|| format!("No registry to pull {} from", image))?;

        registry
            .digest_of(&image)
            .await
            .with_context(|| format!("Image {} cannot be pulled", image))
    }
}

/// Lifecycle hook deploying a function from the private registry
pub struct DependentFunction {
    spec: FunctionSpec,
    platform: Arc<dyn FunctionPlatform>,
}

impl DependentFunction {
    pub fn new(spec: FunctionSpec, platform: Arc<dyn FunctionPlatform>) -> Self {
        Self { spec, platform }
    }

    pub fn spec(&self) -> &FunctionSpec {
        &self.spec
    }
}

#[async_trait]
impl LifecycleHook for DependentFunction {
    fn logical_id(&self) -> &str {
        &self.spec.name
    }

    fn properties(&self) -> serde_json::Value {
        serde_json::to_value(&self.spec).unwrap_or_default()
    }

    async fn on_create(&self) -> anyhow::Result<PhysicalId> {
        let function_id = self
            .platform
            .create_function(&self.spec)
            .await
            .with_context(|| format!("Failed to create function {}", self.spec.name))?;

        info!("Created function {} with image {}", function_id, self.spec.image);
        Ok(PhysicalId(function_id))
    }

    async fn on_update(&self, previous: &PhysicalId) -> anyhow::Result<PhysicalId> {
        let function_id = self
            .platform
            .update_function(previous.as_str(), &self.spec)
            .await
            .with_context(|| format!("Failed to update function {}", self.spec.name))?;

        info!("Updated function {} with image {}", function_id, self.spec.image);
        Ok(PhysicalId(function_id))
    }
}
