//! # Lazy Hydration
//!
//! Tracks in-flight content fetches so the same page is never requested twice
//! at once, and so results that outlive their epoch can be recognised.

use crate::page::{EpochId, Page, PageOrigin};
use crate::snapshot::InputSnapshot;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Why a page is being fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HydrationPurpose {
    /// The user is waiting on this page
    Display,
    /// Speculative fetch of a neighbour; failures are swallowed
    Prefetch,
}

/// Command for the hydration collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HydrationRequest {
    pub epoch: EpochId,
    pub number: u32,
    pub origin: PageOrigin,
    pub purpose: HydrationPurpose,
    /// Snapshot the page set was generated from
    pub snapshot: Arc<InputSnapshot>,
}

#[derive(Debug, Default)]
pub struct HydrationTracker {
    in_flight: HashMap<(EpochId, u32), HydrationPurpose>,
}

impl HydrationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start fetching `page` unless its content is cached or a fetch is
    /// already running. A display request joining a running prefetch takes
    /// it over, so its failure gets reported.
    pub fn request(
        &mut self,
        epoch: EpochId,
        page: &Page,
        purpose: HydrationPurpose,
        snapshot: &Arc<InputSnapshot>,
    ) -> Option<HydrationRequest> {
        if !page.needs_hydration() {
            return None;
        }

        let key = (epoch, page.number);
        if let Some(running) = self.in_flight.get_mut(&key) {
            if purpose == HydrationPurpose::Display {
                *running = HydrationPurpose::Display;
            }
            return None;
        }

        self.in_flight.insert(key, purpose);
        Some(HydrationRequest {
            epoch,
            number: page.number,
            origin: page.origin.clone(),
            purpose,
            snapshot: Arc::clone(snapshot),
        })
    }

    /// A fetch settled. Returns the purpose it ended up with, or `None` if it
    /// was not being tracked (already settled, or its epoch was dropped).
    pub fn complete(&mut self, epoch: EpochId, number: u32) -> Option<HydrationPurpose> {
        self.in_flight.remove(&(epoch, number))
    }

    /// Forget every fetch that doesn't belong to `epoch`
    pub fn retain_epoch(&mut self, epoch: EpochId) {
        self.in_flight.retain(|(e, _), _| *e == epoch);
    }

    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }
}
