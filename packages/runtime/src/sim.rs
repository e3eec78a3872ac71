//! Simulated generator
//!
//! In-process stand-in for the remote document generator. It acknowledges a
//! regeneration with page stubs, then pushes JSON frames for each page onto
//! the completion stream in a configurable arrival order. Used by the demo
//! binary and the integration tests.

use crate::collaborators::{PageHydrator, Regenerator, StreamMessage};
use crate::errors::CollaboratorError;
use async_trait::async_trait;
use folio_engine::{
    encode_frame, EpochId, HydrationRequest, Lifecycle, PageContent, PageOrigin, PageReady,
    PageStub, Progress, RegenerationRequest, StreamEnvelope, StreamEvent,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

/// Order in which the simulated generator finishes pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    InOrder,
    Reversed,
    /// Even page numbers first, then odd ones
    Interleaved,
}

/// Completion stream pair for a simulated generator
pub fn channel(buffer: usize) -> (mpsc::Sender<StreamMessage>, ReceiverStream<StreamMessage>) {
    let (tx, rx) = mpsc::channel(buffer);
    (tx, ReceiverStream::new(rx))
}

#[derive(Debug, Clone)]
pub struct SimulatedGenerator {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    frames: mpsc::Sender<StreamMessage>,
    template_pages: u32,
    pages_per_item: u32,
    ack_delay: Duration,
    page_delay: Duration,
    hydrate_delay: Duration,
    arrival: Arrival,
    /// Deliver pages on the stream without content, leaving them to hydration
    lazy_content: bool,
    fail_next: AtomicBool,
    regenerations: AtomicUsize,
    hydrations: AtomicUsize,
}

impl SimulatedGenerator {
    pub fn new(frames: mpsc::Sender<StreamMessage>) -> Self {
        Self::builder(frames).build()
    }

    pub fn builder(frames: mpsc::Sender<StreamMessage>) -> SimulatedGeneratorBuilder {
        SimulatedGeneratorBuilder {
            frames,
            template_pages: 2,
            pages_per_item: 1,
            ack_delay: Duration::from_millis(200),
            page_delay: Duration::from_millis(300),
            hydrate_delay: Duration::from_millis(100),
            arrival: Arrival::InOrder,
            lazy_content: false,
        }
    }

    /// Make the next regeneration fail
    pub fn fail_next(&self) {
        self.inner.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn regeneration_count(&self) -> usize {
        self.inner.regenerations.load(Ordering::SeqCst)
    }

    pub fn hydration_count(&self) -> usize {
        self.inner.hydrations.load(Ordering::SeqCst)
    }

    /// Page origins for `request`, numbered from 1
    pub fn layout(&self, request: &RegenerationRequest) -> Vec<PageOrigin> {
        let mut origins: Vec<PageOrigin> = (0..self.inner.template_pages)
            .map(PageOrigin::template)
            .collect();
        for item_id in &request.snapshot.items {
            origins.extend((0..self.inner.pages_per_item).map(|i| PageOrigin::item(item_id.as_str(), i)));
        }

        // A manual order names pages of the previous layout by number
        if let Some(order) = &request.page_order {
            let mut numbered: Vec<(usize, PageOrigin)> = origins.into_iter().enumerate().collect();
            numbered.sort_by_key(|(i, _)| {
                order
                    .iter()
                    .position(|n| *n as usize == i + 1)
                    .unwrap_or(usize::MAX)
            });
            origins = numbered.into_iter().map(|(_, origin)| origin).collect();
        }

        origins
    }

    fn arrival_order(&self, count: u32) -> Vec<u32> {
        let mut numbers: Vec<u32> = (1..=count).collect();
        match self.inner.arrival {
            Arrival::InOrder => {}
            Arrival::Reversed => numbers.reverse(),
            Arrival::Interleaved => numbers.sort_by_key(|n| (n % 2, *n)),
        }
        numbers
    }
}

pub struct SimulatedGeneratorBuilder {
    frames: mpsc::Sender<StreamMessage>,
    template_pages: u32,
    pages_per_item: u32,
    ack_delay: Duration,
    page_delay: Duration,
    hydrate_delay: Duration,
    arrival: Arrival,
    lazy_content: bool,
}

impl SimulatedGeneratorBuilder {
    pub fn template_pages(mut self, pages: u32) -> Self {
        self.template_pages = pages;
        self
    }

    pub fn pages_per_item(mut self, pages: u32) -> Self {
        self.pages_per_item = pages;
        self
    }

    pub fn ack_delay(mut self, delay: Duration) -> Self {
        self.ack_delay = delay;
        self
    }

    pub fn page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    pub fn hydrate_delay(mut self, delay: Duration) -> Self {
        self.hydrate_delay = delay;
        self
    }

    pub fn arrival(mut self, arrival: Arrival) -> Self {
        self.arrival = arrival;
        self
    }

    pub fn lazy_content(mut self, lazy: bool) -> Self {
        self.lazy_content = lazy;
        self
    }

    pub fn build(self) -> SimulatedGenerator {
        SimulatedGenerator {
            inner: Arc::new(Inner {
                frames: self.frames,
                template_pages: self.template_pages,
                pages_per_item: self.pages_per_item,
                ack_delay: self.ack_delay,
                page_delay: self.page_delay,
                hydrate_delay: self.hydrate_delay,
                arrival: self.arrival,
                lazy_content: self.lazy_content,
                fail_next: AtomicBool::new(false),
                regenerations: AtomicUsize::new(0),
                hydrations: AtomicUsize::new(0),
            }),
        }
    }
}

fn page_content(epoch: EpochId, number: u32) -> PageContent {
    PageContent::from(format!("data:image/png;base64,{}-page-{}", epoch, number))
}

#[async_trait]
impl Regenerator for SimulatedGenerator {
    async fn regenerate(
        &self,
        request: RegenerationRequest,
    ) -> Result<Vec<PageStub>, CollaboratorError> {
        self.inner.regenerations.fetch_add(1, Ordering::SeqCst);
        let epoch = request.epoch;

        if self.inner.fail_next.swap(false, Ordering::SeqCst) {
            tokio::time::sleep(self.inner.ack_delay).await;
            return Err(CollaboratorError::Failed("generator rejected the request".to_string()));
        }

        let origins = self.layout(&request);
        let count = origins.len() as u32;
        let stubs: Vec<PageStub> = origins
            .iter()
            .enumerate()
            .map(|(i, origin)| PageStub::new(i as u32 + 1, origin.clone()))
            .collect();

        debug!(%epoch, pages = count, "Simulated generator accepted request");

        // Pages are produced in the background, possibly before the ack lands
        let generator = self.clone();
        tokio::spawn(async move {
            generator.produce(epoch, origins).await;
        });

        tokio::time::sleep(self.inner.ack_delay).await;
        Ok(stubs)
    }
}

impl SimulatedGenerator {
    async fn produce(&self, epoch: EpochId, origins: Vec<PageOrigin>) {
        let count = origins.len() as u32;
        let send = |event: StreamEvent| {
            let frames = self.inner.frames.clone();
            async move {
                frames
                    .send(StreamMessage::Frame(encode_frame(&StreamEnvelope::new(epoch, event))))
                    .await
                    .is_ok()
            }
        };

        for (done, number) in self.arrival_order(count).into_iter().enumerate() {
            tokio::time::sleep(self.inner.page_delay).await;

            let origin = origins[number as usize - 1].clone();
            if let Some(item_id) = origin.item_id() {
                let status = StreamEvent::ItemStatus {
                    item_id: item_id.to_string(),
                    lifecycle: Lifecycle::Generating,
                };
                if !send(status).await {
                    return;
                }
            }

            let ready = PageReady {
                number,
                origin,
                content: (!self.inner.lazy_content).then(|| page_content(epoch, number)),
                typed: true,
            };
            if !send(StreamEvent::PageReady(ready)).await {
                return;
            }

            let percent = ((done as u32 + 1) * 100 / count.max(1)) as u8;
            let progress = Progress {
                message: format!("Converted {} of {} pages", done + 1, count),
                percent: if percent >= 100 { 0 } else { percent },
            };
            if !send(StreamEvent::Progress(progress)).await {
                return;
            }
        }
    }
}

#[async_trait]
impl PageHydrator for SimulatedGenerator {
    async fn hydrate(&self, request: HydrationRequest) -> Result<PageContent, CollaboratorError> {
        self.inner.hydrations.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.inner.hydrate_delay).await;
        Ok(page_content(request.epoch, request.number))
    }
}
