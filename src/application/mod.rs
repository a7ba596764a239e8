pub mod context;
pub mod cycle;
pub mod evaluator;
pub mod gateway;
pub mod prober;

pub use context::{CoreContext, CoreSettings};
pub use cycle::{
    Candidate, CycleDeadline, CycleError, CycleReport, CycleSettings, FiredAlert, ProbeCycle,
};
pub use evaluator::{AlertDecision, AlertEvaluator, SuppressCause};
pub use gateway::{FetchOutcome, GatewayError, ThrottledGateway};
pub use prober::Prober;
