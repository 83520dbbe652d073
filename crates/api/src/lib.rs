//! Data model for answering "is any precompiled artifact of this bytecode archive still
//! valid, and if not, what kind of recompilation is required?".
//!
//! The types here carry no I/O. They are shared between the resolver in `oatscope-core`
//! and every consumer of its verdicts (the CLI, callers embedding the resolver).

pub mod error;
pub mod models;

pub use error::ApiError;
pub use models::*;
