//! AI analysis providers.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatAnalyst;
