//! Pipeline stages for single-slide semantic conversion.
//!
//! Each submodule implements exactly one step, so each is testable on its
//! own and the model backend can be swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ encode ──▶ gateway ──▶ parse
//! (ordinal)  (base64)  (VLM call)  (JSON → blocks)
//! ```
//!
//! 1. [`input`]: fetch the slide screenshot; absence is a normal outcome
//! 2. [`encode`]: base64-wrap the screenshot for the multimodal request
//! 3. [`gateway`]: one timeout-bounded model call; the only stage with
//!    network I/O
//! 4. [`parse`]: recover and validate a structured result from free text
//!
//! The prompt itself is built in [`crate::prompts`]; orchestration lives in
//! [`crate::convert`].

pub mod encode;
pub mod gateway;
pub mod input;
pub mod parse;
