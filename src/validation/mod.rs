//! Local checks that run before anything is sent to the server.

pub mod duplicates;

pub use duplicates::{annotate_duplicates, duplicate_message, find_duplicates, DuplicateMatch};
