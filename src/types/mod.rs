//! Type definitions

pub mod client;
pub mod import;
pub mod import_job;
pub mod invoice;
pub mod messages;

pub use client::*;
pub use import::*;
pub use import_job::*;
pub use invoice::*;
pub use messages::*;
