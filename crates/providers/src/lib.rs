//! # Pagemind Providers
//!
//! Concrete [`ChatProvider`](pagemind_core::ChatProvider) implementations.
//! One today: the OpenAI-compatible JSON-over-HTTP client, which covers
//! LM Studio, Ollama, vLLM, OpenRouter, and OpenAI itself.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
