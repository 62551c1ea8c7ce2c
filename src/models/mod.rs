//! Data models for the wiki backend.
//!
//! Wire names are camelCase; the same structs are embedded as JSON in the store.

mod group;
mod id;
mod page;
mod project;
mod user;

pub use group::*;
pub use id::*;
pub use page::*;
pub use project::*;
pub use user::*;
