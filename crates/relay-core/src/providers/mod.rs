//! Provider adapter set
//!
//! Supports every OpenAI-compatible chat-completions endpoint, Groq, and
//! Google Gemini. Adapters implement [`ProviderAdapter`]; [`ProviderSet`]
//! picks the right one for a registry entry and implements [`ProviderCaller`]
//! for the router and the health checker.

pub mod gemini;
pub mod groq;
pub mod openai_compat;
pub mod set;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use set::{DEFAULT_TIMEOUT, ProviderSet, default_endpoint};
pub use types::{
    ChatCompletion, ChatRequest, Choice, FunctionSpec, Message, ProviderAdapter, ProviderCaller,
    ProviderError, ResponseMessage, Role, ToolSpec,
};
