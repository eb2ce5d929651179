//! Insight engine: multi-agent content analysis orchestration.
//!
//! A task selects a set of analysis agents for one piece of ingested
//! content. The orchestrator fans the work out concurrently, isolates each
//! agent behind its own timeout and failure boundary, and fans the settled
//! results back into a single report that tolerates partial failure.
//!
//! The [`service::TaskService`] is the front door: create a task, watch it
//! through `task_status` or the audit stream, cancel it, or retry a failed
//! job. Persistence is pluggable through [`store::Store`], with in-memory
//! and libSQL backends provided. Generation goes through
//! [`llm::GenerationProvider`], backed by rig.

pub mod agents;
pub mod aggregator;
pub mod audit;
pub mod config;
pub mod error;
pub mod job;
pub mod llm;
pub mod orchestrator;
pub mod result;
pub mod service;
pub mod store;
pub mod task;

pub use error::{Error, Result};
