//! Model invoker implementations for askwise.
//!
//! All invokers implement the `askwise_core::ModelInvoker` trait. Capability
//! prompts (instructions, output shape, model overrides) come from the
//! `[capabilities]` table of the configuration.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatInvoker;
