pub mod batch;
pub mod orchestrator;

pub use batch::{BatchConversionRunner, BatchRunner, BatchStage};
pub use orchestrator::{ConversionOrchestrator, ConversionOutcome, EligibilityReport};
