pub mod action;
pub mod actions;
pub mod admission;
pub mod config;
pub mod engine;
pub mod error;
pub mod fact;
pub mod inputs;
pub mod io;
pub mod paths;
pub mod pattern;
pub mod plan;
pub mod registry;
pub mod sandbox;
pub mod stack;
pub mod types;
pub mod utilities;

pub use error::{Result, StackplanError};
pub use tokio_util::sync::CancellationToken;
