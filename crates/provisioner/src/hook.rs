//! Provisioning lifecycle hooks

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity a hook reports for the resource it manages
///
/// A change from one pass to the next marks the resource as changed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhysicalId(pub String);

impl PhysicalId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhysicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PhysicalId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// When an existing resource is updated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicy {
    /// Only when its properties or an upstream resource changed
    #[default]
    OnChange,
    /// On every pass
    EveryPass,
}

/// A resource the engine creates and updates
#[async_trait]
pub trait LifecycleHook: Send + Sync {
    /// Stable name of the resource within its stack
    fn logical_id(&self) -> &str;

    /// Declared properties; a change triggers an update
    fn properties(&self) -> serde_json::Value;

    fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy::OnChange
    }

    async fn on_create(&self) -> anyhow::Result<PhysicalId>;

    async fn on_update(&self, previous: &PhysicalId) -> anyhow::Result<PhysicalId>;
}
