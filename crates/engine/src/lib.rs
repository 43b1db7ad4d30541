//! `engine` crate — workflow definitions, validation, compilation and the execution engine.

pub mod models;
pub mod error;
pub mod validation;
pub mod execution;
pub mod conditions;
pub mod extract;
pub mod config;
pub mod control;
pub mod sink;
pub mod plan;
pub mod step;
pub mod executor;

pub use models::{WorkflowDefinition, NodeSpec, EdgeSpec};
pub use error::{DefinitionError, EngineError};
pub use validation::{validate, is_acyclic, ValidationReport};
pub use execution::{Execution, ExecutionResult, ExecutionStatus, StepError, StepLog, StepStatus};
pub use conditions::ConditionRegistry;
pub use config::EngineConfig;
pub use control::{ControlSignal, ExecutionControl};
pub use sink::{MemorySink, NoopSink, PersistenceSink, PgSink};
pub use plan::ExecutablePlan;
pub use executor::WorkflowExecutor;

#[cfg(test)]
mod executor_tests;
