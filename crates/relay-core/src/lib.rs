//! relay-core - the routing brain of llm-relay
//!
//! This crate provides:
//! - Provider adapters that normalize OpenAI-compatible, Groq and Gemini wire
//!   formats into one chat-completion shape
//! - The model registry (entries, partial updates, pluggable stores)
//! - The failover router with key rotation and health bookkeeping
//! - The health checker used by the scheduled check job
//! - The starter catalog used by the seed operation

pub mod health;
pub mod model;
pub mod providers;
pub mod registry;
pub mod router;
pub mod seed;

pub use health::{CheckOutcome, CheckResult, HealthChecker};
pub use model::{HealthStatus, ModelEntry, ModelPatch, Provider};
pub use providers::{
    ChatCompletion, ChatRequest, Message, ProviderCaller, ProviderError, ProviderSet, Role,
    ToolSpec,
};
pub use registry::{ModelStore, Registry};
pub use router::{FailoverRouter, RouteError};
pub use seed::seed_catalog;
