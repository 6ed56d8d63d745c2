//! Collaborator services around a room: running code and keeping
//! snippets.
//!
//! Both are opaque to the room layer. This crate defines their interfaces
//! ([`CodeRunner`], [`SnippetStore`]), the shared wire handling for a
//! Judge0-compatible execution service, and an in-memory snippet store.

mod error;
pub mod execution;
pub mod snippets;

pub use error::ServiceError;
pub use execution::{CodeRunner, ExecutionRequest, ExecutionResult, ExecutionStatus, Language};
pub use snippets::{InMemorySnippetStore, NewSnippet, SavedCode, SnippetStore};
