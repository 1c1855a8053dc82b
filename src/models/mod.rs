//! Data models for notes, todos and user profiles.
//!
//! Field names are camelCase on the wire and inside stored documents.

mod item;
mod note;
mod profile;
mod revision;
pub mod timestamp;
mod todo;

pub use item::*;
pub use note::*;
pub use profile::*;
pub use revision::*;
pub use todo::*;
