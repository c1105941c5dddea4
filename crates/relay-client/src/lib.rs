//! relay-client - application-side orchestration for llm-relay
//!
//! Wraps calls to the gateway's chat endpoint with:
//! - a quota pre-check splitting capacity between pilot and student traffic
//! - retry with linear backoff
//! - a bounded-concurrency bulk engine
//! - centralized parsing of structured model output
//! - content generation helpers built on the above

pub mod bulk;
pub mod content;
pub mod error;
pub mod gateway;
pub mod parse;
pub mod quota;
pub mod retry;
pub mod service;

pub use bulk::run_bulk;
pub use content::{Chapter, ContentGenerator, DualNotes};
pub use error::ClientError;
pub use gateway::{CompletionBackend, GatewayClient};
pub use parse::{
    DualSections, ParseError, clean_json, parse_json, parse_json_or, split_dual_sections,
};
pub use quota::{QuotaGuard, UsageClass, UsageCounters, UsageSource};
pub use retry::RetryPolicy;
pub use service::AiService;
