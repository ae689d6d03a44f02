//! LLM Provider implementations for Bonza.
//!
//! All providers implement the `bonza_core::Provider` trait.
//! The router maps a model name to a provider; [`Failover`] retries a
//! failed call once against the configured fallback route.

pub mod failover;
pub mod openai_compat;
pub mod router;

pub use failover::{Attempt, Failover};
pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, build_from_config};
