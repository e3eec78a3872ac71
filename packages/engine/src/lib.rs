//! # Folio Engine
//!
//! Preview synchronization core. Keeps a multi-page document preview in step
//! with the user's input while pages arrive incrementally, out of order, from
//! a remote generator.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ snapshot: input → ChangeReport              │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ scheduler: debounce + countdown → Fire      │
//! └─────────────────────────────────────────────┘
//!                     ↓  (Regenerate command)
//! ┌─────────────────────────────────────────────┐
//! │ store: epoch-scoped pages                   │
//! │  - stubs from the acknowledgement           │
//! │  - page_ready / status from the stream      │
//! │  - manual order overrides page numbers      │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ navigator: cursor + view state              │
//! │ hydration: deduplicated content fetches     │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! [`PreviewSession`] owns all of the above and is the only entry point a
//! driver needs.
//!
//! ## Design
//!
//! - **Sans-IO**: no clocks, sockets or tasks. Time is passed in as `now`,
//!   and work for the outside world comes back as [`SessionOutput`] commands.
//! - **Epochs**: every regeneration opens a new [`EpochId`]; anything tagged
//!   with an older one is dropped.
//! - **Forward-only lifecycle**: within an epoch a page never goes back from
//!   `ready` to `generating`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use folio_engine::{InputSnapshot, PreviewSession, SessionOutput};
//! use std::time::Instant;
//!
//! let mut session = PreviewSession::default();
//! for output in session.start(InputSnapshot::new(), Instant::now()) {
//!     if let SessionOutput::Regenerate(request) = output {
//!         // hand the request to the generator
//!     }
//! }
//! ```

pub mod errors;
pub mod hydration;
pub mod navigator;
pub mod page;
pub mod reorder;
pub mod scheduler;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod wire;

pub use errors::{EngineError, EngineResult};
pub use hydration::{HydrationPurpose, HydrationRequest, HydrationTracker};
pub use navigator::{Navigate, PageView, ReadyReaction, ShowOutcome, ViewState, ViewportNavigator};
pub use page::{EpochId, Lifecycle, Page, PageContent, PageGroup, PageOrigin, PageReady, PageStub};
pub use reorder::{validate_sequence, Column, ReorderBoard};
pub use scheduler::{RegenerationScheduler, SchedulerEvent, SchedulerPhase};
pub use session::{
    NoticeLevel, PageSummary, PreviewSession, RegenerationRequest, SessionOptions, SessionOutput,
};
pub use snapshot::{diff, ChangeReport, ExtraFields, InputSnapshot, ItemId};
pub use store::{PageStore, ReadyOutcome};
pub use wire::{decode_frame, encode_frame, Progress, StreamEnvelope, StreamEvent};
