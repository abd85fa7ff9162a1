//! The mirror stack: completion gate in front of the dependent function

use std::sync::Arc;

use mirror_job::MirrorJob;
use mirror_trigger::{JobRunner, JobTrigger, TriggerConfig};

use crate::error::StackError;
use crate::function::{DependentFunction, FunctionPlatform, FunctionSpec};
use crate::gate::CompletionGate;
use crate::hook::{LifecycleHook, RefreshPolicy};
use crate::stack::Stack;

/// Settings of a mirror stack
#[derive(Debug, Clone)]
pub struct MirrorStackConfig {
    pub gate_id: String,
    /// Job the gate starts; its destination is the function image
    pub job: MirrorJob,
    pub trigger: TriggerConfig,
    pub gate_refresh: RefreshPolicy,
    pub function: FunctionSpec,
}

impl MirrorStackConfig {
    /// Gate starting `job`, and a function running the image it mirrors
    pub fn new(job: MirrorJob, trigger: TriggerConfig, function_name: impl Into<String>) -> Self {
        let function = FunctionSpec::new(function_name, job.destination.clone());
        Self {
            gate_id: "MirrorCompletionGate".to_string(),
            job,
            trigger,
            gate_refresh: RefreshPolicy::EveryPass,
            function,
        }
    }

    fn validate(&self) -> Result<(), StackError> {
        if self.trigger.job_name != self.job.name {
            return Err(StackError::JobMismatch {
                job: self.job.name.clone(),
                triggered: self.trigger.job_name.clone(),
            });
        }

        if self.function.image != self.job.destination {
            return Err(StackError::ImageMismatch {
                function: self.function.name.clone(),
                image: self.function.image.clone(),
                destination: self.job.destination.clone(),
            });
        }

        Ok(())
    }
}

pub struct MirrorStack {
    stack: Stack,
    gate: Arc<CompletionGate>,
    function: Arc<DependentFunction>,
}

impl MirrorStack {
    /// Wire the gate and the function, ordering the function after the gate
    pub fn build(
        config: MirrorStackConfig,
        runner: Arc<dyn JobRunner>,
        platform: Arc<dyn FunctionPlatform>,
    ) -> Result<Self, StackError> {
        config.validate()?;

        let trigger = JobTrigger::new(runner, config.trigger);
        let gate = Arc::new(
            CompletionGate::new(config.gate_id, trigger).with_refresh_policy(config.gate_refresh),
        );
        let function = Arc::new(DependentFunction::new(config.function, platform));

        let mut stack = Stack::new();
        stack.add(gate.clone())?;
        stack.add(function.clone())?;
        stack.depends_on(&function.spec().name, gate.logical_id())?;

        Ok(Self {
            stack,
            gate,
            function,
        })
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn gate(&self) -> &CompletionGate {
        &self.gate
    }

    pub fn function(&self) -> &DependentFunction {
        &self.function
    }
}
