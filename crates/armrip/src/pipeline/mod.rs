//! Drives one job from identification to notification.

pub mod context;
pub mod error;
pub mod plan;
pub mod runner;

pub use context::{Advisory, PipelineContext};
pub use error::{PipelineError, PipelineWarning};
pub use plan::{extraction_mode, plan_transcodes, rip_with_mkv, ExtractionMode, TranscodePlan};
pub use runner::Pipeline;
