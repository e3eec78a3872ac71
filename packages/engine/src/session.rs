//! # Preview Session
//!
//! Single owner of everything the preview engine knows: the working input,
//! the last committed snapshot, the page store, the scheduler, the viewport
//! cursor and the in-flight hydrations.
//!
//! The session performs no I/O. Every input returns a list of
//! [`SessionOutput`]s: observable changes for the UI, plus
//! [`SessionOutput::Regenerate`] and [`SessionOutput::Hydrate`] commands for
//! whoever drives the session to carry out.

use crate::errors::{EngineError, EngineResult};
use crate::hydration::{HydrationPurpose, HydrationRequest, HydrationTracker};
use crate::navigator::{Navigate, PageView, ShowOutcome, ViewState, ViewportNavigator};
use crate::page::{EpochId, Lifecycle, PageContent, PageGroup, PageOrigin, PageStub};
use crate::reorder::{validate_sequence, ReorderBoard};
use crate::scheduler::{RegenerationScheduler, SchedulerEvent};
use crate::snapshot::{diff, ChangeReport, ExtraFields, InputSnapshot, ItemId};
use crate::store::PageStore;
use crate::wire::{decode_frame, Progress, StreamEnvelope, StreamEvent};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Tunables for a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub quiescence: Duration,
    pub countdown_tick: Duration,
    pub prefetch_radius: usize,
    /// Ignore edits until the first regeneration has been accepted
    pub initial_load_grace: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            quiescence: Duration::from_millis(2000),
            countdown_tick: Duration::from_millis(1000),
            prefetch_radius: 1,
            initial_load_grace: true,
        }
    }
}

/// Command for the regeneration collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegenerationRequest {
    pub epoch: EpochId,
    pub snapshot: Arc<InputSnapshot>,
    pub changes: ChangeReport,
    /// Manual page order to assemble the document in, if the user reordered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_order: Option<Vec<u32>>,
    pub forced: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// Page entry for the page list / tabs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageSummary {
    pub number: u32,
    pub origin: PageOrigin,
    pub lifecycle: Lifecycle,
    pub has_content: bool,
    pub order: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutput {
    CurrentPageChanged(PageView),
    StalenessChanged(bool),
    PageListChanged(Vec<PageSummary>),
    Countdown { remaining_secs: u64 },
    Progress(Progress),
    Notification { level: NoticeLevel, message: String },
    Regenerate(RegenerationRequest),
    Hydrate(HydrationRequest),
}

#[derive(Debug)]
pub struct PreviewSession {
    working: InputSnapshot,
    committed: Arc<InputSnapshot>,
    in_flight: Option<(EpochId, Arc<InputSnapshot>)>,
    last_epoch: EpochId,
    /// The open epoch belongs to a failed regeneration and takes no events
    epoch_closed: bool,
    pending_reorder: Option<Vec<u32>>,

    store: PageStore,
    scheduler: RegenerationScheduler,
    navigator: ViewportNavigator,
    hydration: HydrationTracker,
}

impl PreviewSession {
    pub fn new(options: SessionOptions) -> Self {
        let mut scheduler =
            RegenerationScheduler::with_timing(options.quiescence, options.countdown_tick);
        if !options.initial_load_grace {
            scheduler = scheduler.without_grace();
        }

        Self {
            working: InputSnapshot::default(),
            committed: Arc::new(InputSnapshot::default()),
            in_flight: None,
            last_epoch: EpochId::default(),
            epoch_closed: false,
            pending_reorder: None,
            store: PageStore::new(),
            scheduler,
            navigator: ViewportNavigator::with_prefetch_radius(options.prefetch_radius),
            hydration: HydrationTracker::new(),
        }
    }

    /// Populate the input and dispatch the first regeneration
    pub fn start(&mut self, initial: InputSnapshot, now: Instant) -> Vec<SessionOutput> {
        self.working = initial;
        let events = self.scheduler.force_now(now);
        self.absorb(events, now)
    }

    // ========================================================================
    // User input
    // ========================================================================

    pub fn on_user_edit(
        &mut self,
        field: impl Into<String>,
        value: impl Into<String>,
        now: Instant,
    ) -> Vec<SessionOutput> {
        self.working.fields.insert(field.into(), value.into());
        self.changed(now)
    }

    pub fn on_item_selection_changed(&mut self, items: Vec<ItemId>, now: Instant) -> Vec<SessionOutput> {
        self.working.items = items;
        self.changed(now)
    }

    /// Merge extra fields into the item's existing ones
    pub fn on_item_extra_fields_changed(
        &mut self,
        item_id: impl Into<ItemId>,
        fields: ExtraFields,
        now: Instant,
    ) -> Vec<SessionOutput> {
        self.working
            .extras
            .entry(item_id.into())
            .or_default()
            .extend(fields);
        self.changed(now)
    }

    /// Override the display order with `sequence` (page numbers). The new
    /// order travels with the next regeneration request.
    pub fn on_manual_reorder(
        &mut self,
        sequence: Vec<u32>,
        now: Instant,
    ) -> EngineResult<Vec<SessionOutput>> {
        validate_sequence(&sequence)?;
        if self.store.set_manual_order(&sequence) == 0 {
            return Err(EngineError::ReorderRejected(
                "sequence names no page of the current preview".to_string(),
            ));
        }
        debug!(?sequence, "Manual page order applied");

        self.navigator.follow(&self.store);
        self.pending_reorder = Some(sequence);

        let mut out = vec![
            SessionOutput::PageListChanged(self.page_list()),
            SessionOutput::CurrentPageChanged(self.current_view()),
        ];
        out.extend(self.changed(now));
        Ok(out)
    }

    /// Drop a card on the reorder board
    pub fn on_card_dropped(
        &mut self,
        number: u32,
        group: PageGroup,
        to_index: usize,
        now: Instant,
    ) -> EngineResult<Vec<SessionOutput>> {
        let mut board = self.reorder_board();
        board.drop_card(number, group, to_index)?;
        self.on_manual_reorder(board.sequence(), now)
    }

    pub fn on_force_refresh(&mut self, now: Instant) -> Vec<SessionOutput> {
        let events = self.scheduler.force_now(now);
        self.absorb(events, now)
    }

    pub fn on_navigate(&mut self, target: Navigate) -> Vec<SessionOutput> {
        let mut out = Vec::new();
        if let Some(outcome) = self.navigator.navigate(&self.store, target) {
            self.apply_show(outcome, &mut out);
        }
        out
    }

    /// Drive the debounce/countdown timer
    pub fn poll_timers(&mut self, now: Instant) -> Vec<SessionOutput> {
        let events = self.scheduler.poll(now);
        self.absorb(events, now)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    // ========================================================================
    // Collaborator results
    // ========================================================================

    /// The generator acknowledged the regeneration with its page stubs
    pub fn on_regeneration_accepted(
        &mut self,
        epoch: EpochId,
        stubs: Vec<PageStub>,
        now: Instant,
    ) -> Vec<SessionOutput> {
        let snapshot = match self.in_flight.take() {
            Some((e, snapshot)) if e == epoch => snapshot,
            other => {
                debug!(%epoch, "Dropping acknowledgement for superseded regeneration");
                self.in_flight = other;
                return Vec::new();
            }
        };

        let page_count = stubs.len();
        self.store.begin_epoch(epoch, stubs);
        self.committed = snapshot;
        info!(%epoch, pages = page_count, "Regeneration accepted");

        let mut out = vec![SessionOutput::PageListChanged(self.page_list())];

        if self.navigator.view() == &ViewState::Waiting {
            if let Some(outcome) = self.navigator.show_page(&self.store, 0) {
                self.apply_show(outcome, &mut out);
            }
        }

        let events = self.scheduler.mark_clean(now);
        out.extend(self.absorb(events, now));
        out
    }

    /// The regeneration call failed. The previous page set is already gone,
    /// so the viewport falls back to a failure placeholder. The failed epoch
    /// is closed: its early pages are dropped and later frames ignored.
    pub fn on_regeneration_failed(
        &mut self,
        epoch: EpochId,
        error: &EngineError,
        now: Instant,
    ) -> Vec<SessionOutput> {
        match self.in_flight {
            Some((e, _)) if e == epoch => self.in_flight = None,
            _ => {
                debug!(%epoch, "Dropping failure of superseded regeneration");
                return Vec::new();
            }
        }

        error!(%epoch, error = %error, "Regeneration failed");
        let closed = self.last_epoch.next();
        self.last_epoch = closed;
        self.store.open_epoch(closed);
        self.hydration.retain_epoch(closed);
        self.epoch_closed = true;
        self.navigator.fail(None, format!("generation failed: {}", error));

        let mut out = vec![
            SessionOutput::PageListChanged(Vec::new()),
            SessionOutput::Notification {
                level: NoticeLevel::Error,
                message: format!("Preview generation failed: {}", error),
            },
            SessionOutput::CurrentPageChanged(self.current_view()),
        ];

        let events = self.scheduler.mark_failed(now);
        out.extend(self.absorb(events, now));
        out
    }

    /// Raw completion-stream frame. Malformed frames are logged and dropped.
    pub fn on_stream_frame(&mut self, text: &str) -> Vec<SessionOutput> {
        match decode_frame(text, self.store.epoch()) {
            Ok(envelope) => self.on_stream_event(envelope),
            Err(e) => {
                warn!(error = %e, "Dropping malformed stream frame");
                Vec::new()
            }
        }
    }

    pub fn on_stream_event(&mut self, envelope: StreamEnvelope) -> Vec<SessionOutput> {
        let mut out = Vec::new();

        if self.epoch_closed
            || envelope.epoch != self.store.epoch()
            || envelope.epoch == EpochId::default()
        {
            debug!(
                event_epoch = %envelope.epoch,
                active_epoch = %self.store.epoch(),
                "Ignoring stream event from another epoch"
            );
            return out;
        }

        match envelope.event {
            StreamEvent::PageReady(ready) => {
                let number = ready.number;
                if let Err(e) = self.store.apply_page_ready(ready) {
                    warn!(error = %e, "Dropping page_ready event");
                    return out;
                }
                debug!(number, ready = self.store.ready_count(), total = self.store.len(), "Page ready");
                out.push(SessionOutput::PageListChanged(self.page_list()));

                let (_, outcome) = self.navigator.on_page_became_ready(&self.store, number);
                match outcome {
                    Some(outcome) => self.apply_show(outcome, &mut out),
                    // The page on screen was re-delivered: show the new content
                    None if self.navigator.view() == &(ViewState::Showing { number }) => {
                        self.reshow(&mut out)
                    }
                    None => {}
                }
            }
            StreamEvent::ItemStatus { item_id, lifecycle } => {
                let advanced = self.store.apply_status(&item_id, lifecycle);
                if advanced.is_empty() {
                    return out;
                }
                debug!(item_id = %item_id, ?lifecycle, pages = ?advanced, "Item status advanced");
                out.push(SessionOutput::PageListChanged(self.page_list()));

                let waiting_on = match self.navigator.view() {
                    ViewState::Generating { number } => Some(*number),
                    _ => None,
                };
                if waiting_on.is_some_and(|n| advanced.contains(&n)) {
                    self.reshow(&mut out);
                }
            }
            StreamEvent::Progress(progress) => out.push(SessionOutput::Progress(progress)),
        }

        out
    }

    /// A hydration fetch settled
    pub fn on_hydration_result(
        &mut self,
        epoch: EpochId,
        number: u32,
        result: Result<PageContent, EngineError>,
    ) -> Vec<SessionOutput> {
        let mut out = Vec::new();
        let purpose = self.hydration.complete(epoch, number);

        if epoch != self.store.epoch() {
            debug!(%epoch, number, "Discarding hydration result from superseded epoch");
            return out;
        }

        match result {
            Ok(content) => {
                if self.store.attach_content(epoch, number, content) {
                    out.push(SessionOutput::PageListChanged(self.page_list()));
                }
                if let Some(outcome) = self.navigator.on_hydrated(&self.store, number) {
                    self.apply_show(outcome, &mut out);
                }
            }
            Err(e) if purpose == Some(HydrationPurpose::Prefetch) => {
                warn!(number, error = %e, "Prefetch failed");
            }
            Err(e) => {
                let reason = e.to_string();
                if self.navigator.on_hydration_failed(number, &reason) {
                    out.push(SessionOutput::Notification {
                        level: NoticeLevel::Error,
                        message: format!("Could not load page {}: {}", number, reason),
                    });
                    out.push(SessionOutput::CurrentPageChanged(self.current_view()));
                } else {
                    warn!(number, error = %e, "Hydration failed");
                }
            }
        }

        out
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn store(&self) -> &PageStore {
        &self.store
    }

    pub fn epoch(&self) -> EpochId {
        self.store.epoch()
    }

    pub fn working_snapshot(&self) -> &InputSnapshot {
        &self.working
    }

    pub fn committed_snapshot(&self) -> &Arc<InputSnapshot> {
        &self.committed
    }

    pub fn is_stale(&self) -> bool {
        self.scheduler.is_stale()
    }

    pub fn is_regenerating(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn current_view(&self) -> PageView {
        self.navigator.current_view(&self.store)
    }

    pub fn reorder_board(&self) -> ReorderBoard {
        ReorderBoard::from_store(&self.store)
    }

    pub fn page_list(&self) -> Vec<PageSummary> {
        self.store
            .pages_in_display_order()
            .map(|p| PageSummary {
                number: p.number,
                origin: p.origin.clone(),
                lifecycle: p.lifecycle,
                has_content: p.has_content(),
                order: p.order,
            })
            .collect()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn changed(&mut self, now: Instant) -> Vec<SessionOutput> {
        let events = self.scheduler.notify_change(now);
        self.absorb(events, now)
    }

    fn absorb(&mut self, events: Vec<SchedulerEvent>, now: Instant) -> Vec<SessionOutput> {
        let mut out = Vec::new();
        let mut queue: VecDeque<SchedulerEvent> = events.into();

        while let Some(event) = queue.pop_front() {
            match event {
                SchedulerEvent::Fire { forced } => {
                    queue.extend(self.dispatch(forced, now, &mut out));
                }
                SchedulerEvent::Tick { remaining_secs } => {
                    out.push(SessionOutput::Countdown { remaining_secs })
                }
                SchedulerEvent::StalenessChanged(stale) => {
                    out.push(SessionOutput::StalenessChanged(stale))
                }
            }
        }

        out
    }

    /// Capture a snapshot and open a new epoch for it. Returns scheduler
    /// events produced when the regeneration turned out to be unnecessary.
    fn dispatch(
        &mut self,
        forced: bool,
        now: Instant,
        out: &mut Vec<SessionOutput>,
    ) -> Vec<SchedulerEvent> {
        let snapshot = Arc::new(self.working.clone());
        let changes = diff(&self.committed, &snapshot);

        if !forced && !changes.has_changes() && self.pending_reorder.is_none() {
            debug!("No input changes since last regeneration, skipping");
            return self.scheduler.mark_skipped(now);
        }

        let epoch = self.last_epoch.next();
        self.last_epoch = epoch;
        self.epoch_closed = false;
        self.store.open_epoch(epoch);
        self.hydration.retain_epoch(epoch);
        self.navigator.reset();
        self.in_flight = Some((epoch, Arc::clone(&snapshot)));

        info!(
            %epoch,
            forced,
            fields_changed = changes.fields_changed,
            items_changed = changes.items_changed,
            extras_changed = changes.extras_changed,
            "Dispatching regeneration"
        );

        out.push(SessionOutput::PageListChanged(Vec::new()));
        out.push(SessionOutput::CurrentPageChanged(self.current_view()));
        out.push(SessionOutput::Regenerate(RegenerationRequest {
            epoch,
            snapshot,
            changes,
            page_order: self.pending_reorder.take(),
            forced,
        }));

        Vec::new()
    }

    fn reshow(&mut self, out: &mut Vec<SessionOutput>) {
        let cursor = self.navigator.cursor();
        if let Some(outcome) = self.navigator.show_page(&self.store, cursor) {
            self.apply_show(outcome, out);
        }
    }

    fn apply_show(&mut self, outcome: ShowOutcome, out: &mut Vec<SessionOutput>) {
        out.push(SessionOutput::CurrentPageChanged(outcome.view));

        let wanted = outcome
            .hydrate
            .map(|n| (n, HydrationPurpose::Display))
            .into_iter()
            .chain(outcome.prefetch.into_iter().map(|n| (n, HydrationPurpose::Prefetch)));

        let epoch = self.store.epoch();
        let snapshot = self.epoch_snapshot();
        for (number, purpose) in wanted {
            let Some(page) = self.store.page_by_number(number) else {
                continue;
            };
            if let Some(request) = self.hydration.request(epoch, page, purpose, &snapshot) {
                out.push(SessionOutput::Hydrate(request));
            }
        }
    }

    /// Snapshot the active epoch was generated from
    fn epoch_snapshot(&self) -> Arc<InputSnapshot> {
        match &self.in_flight {
            Some((epoch, snapshot)) if *epoch == self.store.epoch() => Arc::clone(snapshot),
            _ => Arc::clone(&self.committed),
        }
    }
}

impl Default for PreviewSession {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}
