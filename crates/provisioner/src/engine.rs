//! Provisioning engine
//!
//! A pass walks the stack in dependency order and creates, updates or skips
//! each resource. The first failure aborts the pass; the state store is only
//! replaced when every resource succeeded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, error, info};

use crate::error::PassError;
use crate::hook::{LifecycleHook, PhysicalId, RefreshPolicy};
use crate::stack::Stack;

/// What a pass did to a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceAction {
    Create,
    Update,
    NoOp,
}

impl fmt::Display for ResourceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::NoOp => "no-op",
        })
    }
}

/// Last known state of a provisioned resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub physical_id: PhysicalId,
    /// sha256 of the properties the resource was last provisioned with
    pub fingerprint: String,
    pub updated_at: DateTime<Utc>,
}

/// Resource records carried from one pass to the next
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateStore {
    records: HashMap<String, ResourceRecord>,
}

impl StateStore {
    pub fn get(&self, logical_id: &str) -> Option<&ResourceRecord> {
        self.records.get(logical_id)
    }

    pub fn physical_id(&self, logical_id: &str) -> Option<&PhysicalId> {
        self.get(logical_id).map(|record| &record.physical_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// One resource handled in a pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEvent {
    pub logical_id: String,
    pub action: ResourceAction,
    pub physical_id: PhysicalId,
    pub completed_at: DateTime<Utc>,
}

/// Outcome of a successful pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// In the order resources were handled
    pub events: Vec<ResourceEvent>,
}

impl PassReport {
    pub fn event(&self, logical_id: &str) -> Option<&ResourceEvent> {
        self.events.iter().find(|event| event.logical_id == logical_id)
    }

    pub fn action_of(&self, logical_id: &str) -> Option<ResourceAction> {
        self.event(logical_id).map(|event| event.action)
    }
}

fn fingerprint(properties: &serde_json::Value) -> String {
    hex::encode(Sha256::digest(properties.to_string().as_bytes()))
}

#[derive(Debug, Default)]
pub struct ProvisioningEngine {
    state: StateStore,
}

impl ProvisioningEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from state saved by an earlier pass
    pub fn with_state(state: StateStore) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// Run one provisioning pass over `stack`
    pub async fn deploy(&mut self, stack: &Stack) -> Result<PassReport, PassError> {
        let started_at = Utc::now();
        let hooks = stack.hooks()?;

        info!("Provisioning pass over {} resource(s)", hooks.len());

        let mut next = self.state.clone();
        let mut changed: HashSet<String> = HashSet::new();
        let mut events = Vec::with_capacity(hooks.len());

        for hook in hooks {
            let logical_id = hook.logical_id().to_string();
            let upstream = stack.graph().upstream(&logical_id)?;
            let upstream_changed = upstream.iter().any(|id| changed.contains(id));
            let fingerprint = fingerprint(&hook.properties());

            let action = match next.get(&logical_id) {
                None => ResourceAction::Create,
                Some(record)
                    if record.fingerprint != fingerprint
                        || hook.refresh_policy() == RefreshPolicy::EveryPass
                        || upstream_changed =>
                {
                    ResourceAction::Update
                }
                Some(_) => ResourceAction::NoOp,
            };

            debug!("{}: {}", logical_id, action);

            let previous = next.physical_id(&logical_id).cloned();
            let physical_id = match self.apply(hook.as_ref(), action, previous.as_ref()).await {
                Ok(physical_id) => physical_id,
                Err(source) => {
                    error!("{} of {} failed, aborting pass: {:#}", action, logical_id, source);
                    return Err(PassError::HookFailed {
                        logical_id,
                        action,
                        source,
                        completed: events,
                    });
                }
            };

            let completed_at = Utc::now();
            if previous.as_ref() != Some(&physical_id) {
                changed.insert(logical_id.clone());
            }

            if action != ResourceAction::NoOp {
                info!("{} {} -> {}", action, logical_id, physical_id);
                next.records.insert(
                    logical_id.clone(),
                    ResourceRecord {
                        physical_id: physical_id.clone(),
                        fingerprint,
                        updated_at: completed_at,
                    },
                );
            }

            events.push(ResourceEvent {
                logical_id,
                action,
                physical_id,
                completed_at,
            });
        }

        self.state = next;

        Ok(PassReport {
            started_at,
            completed_at: Utc::now(),
            events,
        })
    }

    async fn apply(
        &self,
        hook: &dyn LifecycleHook,
        action: ResourceAction,
        previous: Option<&PhysicalId>,
    ) -> anyhow::Result<PhysicalId> {
        match (action, previous) {
            (ResourceAction::Create, _) | (ResourceAction::Update, None) => hook.on_create().await,
            (ResourceAction::Update, Some(previous)) => hook.on_update(previous).await,
            (ResourceAction::NoOp, Some(previous)) => Ok(previous.clone()),
            (ResourceAction::NoOp, None) => {
                anyhow::bail!("No recorded state for {}", hook.logical_id())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    /// Hook counting its calls; the physical id changes on every call
    struct CountingHook {
        id: String,
        properties: Mutex<serde_json::Value>,
        policy: RefreshPolicy,
        creates: AtomicUsize,
        updates: AtomicUsize,
        fail: AtomicBool,
        stable_id: bool,
    }

    impl CountingHook {
        fn new(id: &str) -> Arc<Self> {
            Self::build(id, RefreshPolicy::OnChange, true)
        }

        fn build(id: &str, policy: RefreshPolicy, stable_id: bool) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                properties: Mutex::new(serde_json::json!({ "name": id })),
                policy,
                creates: AtomicUsize::new(0),
                updates: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
                stable_id,
            })
        }

        fn calls(&self) -> usize {
            self.creates.load(Ordering::SeqCst) + self.updates.load(Ordering::SeqCst)
        }

        fn next_id(&self) -> PhysicalId {
            if self.stable_id {
                PhysicalId(format!("{}-physical", self.id))
            } else {
                PhysicalId(format!("{}-{}", self.id, self.calls()))
            }
        }
    }

    #[async_trait]
    impl LifecycleHook for CountingHook {
        fn logical_id(&self) -> &str {
            &self.id
        }

        fn properties(&self) -> serde_json::Value {
            self.properties
                .try_lock()
                .map(|properties| properties.clone())
                .unwrap_or_default()
        }

        fn refresh_policy(&self) -> RefreshPolicy {
            self.policy
        }

        async fn on_create(&self) -> anyhow::Result<PhysicalId> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("{} refused to create", self.id);
            }
            self.creates.fetch_add(1, Ordering::SeqCst);
            Ok(self.next_id())
        }

        async fn on_update(&self, _previous: &PhysicalId) -> anyhow::Result<PhysicalId> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("{} refused to update", self.id);
            }
            self.updates.fetch_add(1, Ordering::SeqCst);
            Ok(self.next_id())
        }
    }

    fn stack_of(upstream: Arc<CountingHook>, downstream: Arc<CountingHook>) -> Stack {
        let mut stack = Stack::new();
        stack.add(downstream.clone()).unwrap();
        stack.add(upstream.clone()).unwrap();
        stack.depends_on(&downstream.id, &upstream.id).unwrap();
        stack
    }

    #[tokio::test]
    async fn test_first_pass_creates_in_dependency_order() {
        let gate = CountingHook::new("gate");
        let function = CountingHook::new("function");
        let stack = stack_of(gate.clone(), function.clone());
        let mut engine = ProvisioningEngine::new();

        let report = engine.deploy(&stack).await.unwrap();

        let order: Vec<&str> = report.events.iter().map(|e| e.logical_id.as_str()).collect();
        assert_eq!(order, vec!["gate", "function"]);
        assert_eq!(report.action_of("gate"), Some(ResourceAction::Create));
        assert_eq!(report.action_of("function"), Some(ResourceAction::Create));
        assert_eq!(engine.state().len(), 2);
    }

    #[tokio::test]
    async fn test_unchanged_resources_are_left_alone() {
        let gate = CountingHook::new("gate");
        let function = CountingHook::new("function");
        let stack = stack_of(gate.clone(), function.clone());
        let mut engine = ProvisioningEngine::new();

        engine.deploy(&stack).await.unwrap();
        let report = engine.deploy(&stack).await.unwrap();

        assert_eq!(report.action_of("gate"), Some(ResourceAction::NoOp));
        assert_eq!(report.action_of("function"), Some(ResourceAction::NoOp));
        assert_eq!(gate.calls(), 1);
        assert_eq!(function.calls(), 1);
    }

    #[tokio::test]
    async fn test_property_change_triggers_update() {
        let gate = CountingHook::new("gate");
        let function = CountingHook::new("function");
        let stack = stack_of(gate.clone(), function.clone());
        let mut engine = ProvisioningEngine::new();

        engine.deploy(&stack).await.unwrap();
        *function.properties.lock().await = serde_json::json!({ "name": "function", "memory": 512 });
        let report = engine.deploy(&stack).await.unwrap();

        assert_eq!(report.action_of("gate"), Some(ResourceAction::NoOp));
        assert_eq!(report.action_of("function"), Some(ResourceAction::Update));
        assert_eq!(function.updates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_every_pass_refresh_propagates_downstream() {
        let gate = CountingHook::build("gate", RefreshPolicy::EveryPass, false);
        let function = CountingHook::new("function");
        let stack = stack_of(gate.clone(), function.clone());
        let mut engine = ProvisioningEngine::new();

        let first = engine.deploy(&stack).await.unwrap();
        let second = engine.deploy(&stack).await.unwrap();

        assert_eq!(second.action_of("gate"), Some(ResourceAction::Update));
        assert_ne!(
            first.event("gate").unwrap().physical_id,
            second.event("gate").unwrap().physical_id
        );
        assert_eq!(second.action_of("function"), Some(ResourceAction::Update));
        assert_eq!(function.updates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_aborts_pass_and_keeps_previous_state() {
        let gate = CountingHook::build("gate", RefreshPolicy::EveryPass, false);
        let function = CountingHook::new("function");
        let stack = stack_of(gate.clone(), function.clone());
        let mut engine = ProvisioningEngine::new();

        engine.deploy(&stack).await.unwrap();
        let before = engine.state().clone();

        gate.fail.store(true, Ordering::SeqCst);
        let err = engine.deploy(&stack).await.unwrap_err();

        assert_eq!(err.failed_resource(), Some("gate"));
        assert_eq!(engine.state(), &before);
        assert_eq!(function.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_first_create_leaves_no_record() {
        let gate = CountingHook::new("gate");
        let function = CountingHook::new("function");
        let stack = stack_of(gate.clone(), function.clone());
        let mut engine = ProvisioningEngine::new();

        function.fail.store(true, Ordering::SeqCst);
        match engine.deploy(&stack).await {
            Err(PassError::HookFailed {
                logical_id,
                action,
                completed,
                ..
            }) => {
                assert_eq!(logical_id, "function");
                assert_eq!(action, ResourceAction::Create);
                assert_eq!(completed.len(), 1);
            }
            other => panic!("unexpected pass result: {:?}", other.map(|r| r.events)),
        }
        assert!(engine.state().is_empty());
    }

    #[tokio::test]
    async fn test_cyclic_stack_is_rejected() {
        let a = CountingHook::new("a");
        let b = CountingHook::new("b");
        let mut stack = stack_of(a.clone(), b.clone());
        stack.depends_on("a", "b").unwrap();

        let err = ProvisioningEngine::new().deploy(&stack).await.unwrap_err();
        assert!(matches!(err, PassError::Graph(_)));
        assert_eq!(a.calls() + b.calls(), 0);
    }
}
