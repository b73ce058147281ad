//! Core types, configuration, and errors for the Haruki event tracker.

pub mod config;
pub mod enums;
pub mod error;
pub mod master;
pub mod payload;
pub mod state;

pub use config::*;
pub use enums::*;
pub use error::{Error, Result};
pub use master::*;
pub use payload::*;
pub use state::*;
