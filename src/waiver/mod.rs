pub mod batch;
pub mod evaluator;
pub mod machine;
pub mod service;

pub use batch::{BatchRunner, BatchSummary};
pub use evaluator::{Evaluation, ProgressEvaluator, WaiverProgress};
pub use machine::{Transition, WaiverStateMachine};
pub use service::{FeeWaiverService, RecordOutcome};
