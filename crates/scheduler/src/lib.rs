//! Run dispatcher: launches one browser per run, executes the run's tests
//! through per-kind executors and always releases the browser afterwards.

pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod model;
pub mod visual;

pub use dispatcher::{DispatchHandle, RunDispatcher};
pub use error::SchedulerError;
pub use executor::{E2eExecutor, TestTypeExecutor};
pub use model::{
    DispatcherConfig, RunReport, RunRequest, TestDefinition, TestKind, TestResult,
    TestResultStatus, VisualCheck,
};
pub use visual::{
    BaselineStore, ByteDiffComparator, ImageComparator, InMemoryBaselineStore,
    VisualRegressionExecutor,
};
