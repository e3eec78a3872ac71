//! # Folio Runtime
//!
//! tokio driver for the folio preview engine.
//!
//! ## Design
//!
//! - One task owns the [`folio_engine::PreviewSession`]; nothing is shared
//!   behind locks
//! - The generator is reached through the [`Regenerator`] and
//!   [`PageHydrator`] traits; completed pages come in on any `Stream` of
//!   [`StreamMessage`]s
//! - Observers subscribe to a broadcast of [`PreviewUpdate`]s through a
//!   cloneable [`PreviewHandle`]
//! - [`sim`] provides an in-process generator for tests and the demo binary

pub mod collaborators;
pub mod config;
pub mod driver;
pub mod errors;
pub mod handle;
pub mod sim;

pub use collaborators::{PageHydrator, Regenerator, StreamMessage};
pub use config::{PreviewConfig, DEFAULT_CONFIG_NAME};
pub use driver::PreviewDriver;
pub use errors::{CollaboratorError, RuntimeError, RuntimeResult};
pub use handle::{PreviewHandle, PreviewUpdate, UserCommand};
