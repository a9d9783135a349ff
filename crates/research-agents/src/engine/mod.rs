//! Report engine
//!
//! Fans a request out to the three retrieval agents and collects their
//! outcomes into one bundle.

pub mod orchestrator;
pub mod result;

pub use orchestrator::{ReportOrchestrator, ResearchOrchestrator, ResearchServices};
pub use result::{ReportBundle, StageFailure, StageOutcome};
