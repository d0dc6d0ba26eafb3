pub mod context;
pub mod error;
pub mod progress;
pub mod runner;
pub mod tracker;

pub use context::PipelineContext;
pub use error::PipelineError;
pub use progress::{NoopReporter, StageEvent, StageReporter};
pub use runner::PipelineRunner;
pub use tracker::{
    estimate_from_length, estimate_video, PipelineProgress, PipelineStep, PipelineTracker,
    ProgressEstimator, StepStatus, TrackerError,
};
