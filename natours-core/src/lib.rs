//! Natours Core - shared data structures and collaborator contracts
//!
//! Defines the principal model, configuration, logging bootstrap and the
//! storage/notification traits used by the credential subsystem.

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod traits;
pub mod types;

pub use clock::*;
pub use config::*;
pub use error::*;
pub use logging::*;
pub use traits::*;
pub use types::*;

// Re-export commonly used external types
pub use async_trait::async_trait;
pub use tracing;
