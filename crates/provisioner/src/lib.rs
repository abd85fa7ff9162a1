//! Mirror Gate Provisioner
//!
//! Runs provisioning passes over a stack of lifecycle hooks in dependency
//! order. The completion gate starts the mirror job and must succeed before
//! the dependent function is created or updated.

pub mod engine;
pub mod error;
pub mod function;
pub mod gate;
pub mod graph;
pub mod hook;
pub mod mirror_stack;
pub mod stack;

pub use engine::{PassReport, ProvisioningEngine, ResourceAction, ResourceEvent, ResourceRecord, StateStore};
pub use error::{GraphError, PassError, StackError};
pub use function::{DependentFunction, FunctionDeployment, FunctionPlatform, FunctionSpec, InMemoryFunctionPlatform};
pub use gate::{CompletionGate, GateOutcome, GateState, PhysicalIdSource, TriggerInvocation};
pub use graph::DependencyGraph;
pub use hook::{LifecycleHook, PhysicalId, RefreshPolicy};
pub use mirror_stack::{MirrorStack, MirrorStackConfig};
pub use stack::Stack;
