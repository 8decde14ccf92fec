//! LLM provider implementations for Nebula.
//!
//! All providers implement the `nebula_core::Provider` trait. The
//! engine works against that trait, so swapping a backend is a matter
//! of constructing a different provider at startup.

pub mod gemini;

pub use gemini::GeminiProvider;
