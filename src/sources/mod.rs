//! Concrete collaborator implementations.
//!
//! - `packagist` - registry listing, package details and advisory counts
//! - `files` - suggestion mapping input and ranked-feed output on disk

pub mod files;
pub mod packagist;

pub use files::{JsonFileSink, JsonSuggestions};
pub use packagist::PackagistClient;
