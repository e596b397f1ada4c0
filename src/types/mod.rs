//! Core types used throughout the library.

pub mod message;
pub mod tool;
pub mod usage;

// Re-export commonly used types
pub use message::*;
pub use tool::*;
pub use usage::*;
