//! Workflow execution engine.
//!
//! `WorkflowExecutor` is the central orchestrator:
//! 1. Validates the definition; an invalid one fails fast without running anything.
//! 2. Compiles it into an [`ExecutablePlan`] with this run's settings.
//! 3. Walks the graph from the entry point, one node at a time, choosing each
//!    next node from the outgoing edges of the last one.
//! 4. Polls external control signals and the step budget before every node.
//! 5. Folds every fault (including panics) into a `failed` result, so each
//!    call returns a populated [`ExecutionResult`].
//! 6. Drops the run's control signal on the way out, whatever the outcome.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::{Map, Value};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use capabilities::CapabilityInvoker;

use crate::conditions::ConditionRegistry;
use crate::config::EngineConfig;
use crate::control::ExecutionControl;
use crate::execution::{Execution, ExecutionResult};
use crate::extract::{default_extractor, OutputExtractor};
use crate::models::WorkflowDefinition;
use crate::plan::{ExecutablePlan, Route};
use crate::sink::{best_effort, NoopSink, PersistenceSink};
use crate::step::StepContext;
use crate::validation::validate;
use crate::EngineError;

/// Runs workflow executions. One instance can serve many concurrent runs;
/// each call to [`WorkflowExecutor::execute`] owns its own state.
pub struct WorkflowExecutor {
    invoker: Arc<dyn CapabilityInvoker>,
    sink: Arc<dyn PersistenceSink>,
    control: ExecutionControl,
    conditions: ConditionRegistry,
    extractor: OutputExtractor,
    config: EngineConfig,
}

impl WorkflowExecutor {
    /// An executor with no persistence, the built-in conditions, the default
    /// output extractor and default configuration.
    pub fn new(invoker: Arc<dyn CapabilityInvoker>) -> Self {
        Self {
            invoker,
            sink: Arc::new(NoopSink),
            control: ExecutionControl::new(),
            conditions: ConditionRegistry::with_builtins(),
            extractor: default_extractor(),
            config: EngineConfig::default(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn PersistenceSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Share a control board with whoever issues pause/cancel requests.
    pub fn with_control(mut self, control: ExecutionControl) -> Self {
        self.control = control;
        self
    }

    pub fn with_conditions(mut self, conditions: ConditionRegistry) -> Self {
        self.conditions = conditions;
        self
    }

    /// Register an extra named edge condition.
    pub fn with_condition<F>(mut self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Execution) -> bool + Send + Sync + 'static,
    {
        self.conditions.register(name, predicate);
        self
    }

    pub fn with_extractor(mut self, extractor: OutputExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn control(&self) -> &ExecutionControl {
        &self.control
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `definition` once for `tenant_id` with `input`.
    ///
    /// `config` overrides [`EngineConfig`] keys for this run only. Never
    /// fails: definition errors, step errors and engine faults all end up in
    /// the returned result's `errors`.
    #[instrument(
        skip(self, definition, input, config),
        fields(%tenant_id, %workflow_id, %execution_id)
    )]
    pub async fn execute(
        &self,
        definition: &WorkflowDefinition,
        tenant_id: &str,
        workflow_id: Uuid,
        execution_id: Uuid,
        input: Value,
        config: &Map<String, Value>,
    ) -> ExecutionResult {
        let execution = self
            .drive(definition, Execution::new(execution_id, workflow_id, tenant_id, input), config)
            .await;
        // Every exit path drops the run's control signal, rejected runs included.
        self.control.clear(execution_id);
        execution.result()
    }

    async fn drive(
        &self,
        definition: &WorkflowDefinition,
        mut execution: Execution,
        config: &Map<String, Value>,
    ) -> Execution {
        let execution_id = execution.id;

        // ------------------------------------------------------------------
        // Fail fast on a structurally invalid definition.
        // ------------------------------------------------------------------
        let report = validate(definition);
        if !report.valid {
            warn!(errors = ?report.messages(), "workflow definition rejected");
            best_effort("record rejected execution", self.sink.begin_execution(&execution)).await;
            if let Err(e) = execution.reject(report.messages()) {
                error!("{e}");
            }
            self.persist_final(&execution).await;
            return execution;
        }

        let settings = self.config.with_overrides(config);
        execution.max_retries = settings.max_retries;

        if let Err(e) = execution.start() {
            error!("{e}");
            execution.record_fault(&e);
            return execution;
        }
        best_effort("record execution start", self.sink.begin_execution(&execution)).await;
        info!("execution {} running", execution_id);

        // ------------------------------------------------------------------
        // Compile and traverse; nothing below may escape this boundary.
        // ------------------------------------------------------------------
        let outcome = AssertUnwindSafe(self.run_plan(definition, &settings, &mut execution))
            .catch_unwind()
            .await;

        let fault = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(fault)) => Some(fault),
            Err(payload) => Some(EngineError::Panicked(panic_message(payload.as_ref()))),
        };
        if let Some(fault) = fault {
            error!("execution {} aborted: {}", execution_id, fault);
            execution.record_fault(&fault);
        }

        if let Err(e) = execution.finish() {
            error!("{e}");
        }
        self.persist_final(&execution).await;

        info!(
            status = %execution.status,
            steps = execution.step_count,
            errors = execution.errors.len(),
            "execution {} finished",
            execution_id
        );
        execution
    }

    async fn run_plan(
        &self,
        definition: &WorkflowDefinition,
        settings: &EngineConfig,
        execution: &mut Execution,
    ) -> Result<(), EngineError> {
        let plan = ExecutablePlan::compile(definition, settings)?;
        let tenant_id = execution.tenant_id.clone();
        let ctx = StepContext {
            invoker: self.invoker.as_ref(),
            sink: self.sink.as_ref(),
            extractor: &self.extractor,
            tenant_id: &tenant_id,
            retry_base_delay: settings.retry_base_delay(),
        };

        let mut cursor = Some(plan.entry_point().to_owned());

        while let Some(node_id) = cursor.take() {
            if let Some(signal) = self.control.signal(execution.id) {
                info!(?signal, before = %node_id, "execution interrupted");
                execution.interrupt(signal)?;
                return Ok(());
            }

            if execution.step_count >= settings.max_steps {
                return Err(EngineError::StepBudgetExhausted(settings.max_steps));
            }

            let step = plan
                .step(&node_id)
                .ok_or_else(|| EngineError::UnknownNode(node_id.clone()))?;
            step.execute(&ctx, execution).await;

            match plan.route(&node_id, execution, &self.conditions) {
                Route::Next(next) => {
                    debug!(from = %node_id, to = next, "following edge");
                    cursor = Some(next.to_owned());
                }
                Route::Terminal => debug!(node = %node_id, "terminal node reached"),
                Route::NoMatch => debug!(node = %node_id, "no outgoing edge matched"),
            }
        }

        Ok(())
    }

    async fn persist_final(&self, execution: &Execution) {
        let snapshot = execution.snapshot();
        best_effort(
            "record final execution state",
            self.sink.update_execution(execution.id, &snapshot),
        )
        .await;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
