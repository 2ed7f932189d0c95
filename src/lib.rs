pub mod config;
pub mod harvest;
pub mod model;
pub mod sources;
pub mod traits;

// Re-export common types for convenience
pub use config::*;
pub use model::*;
pub use traits::*;
