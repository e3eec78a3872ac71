//! External collaborators the driver talks to
//!
//! The generator is reached through two calls: a regeneration that
//! acknowledges with page stubs, and a per-page content fetch. Completed
//! pages themselves arrive separately on the completion stream.

use crate::errors::CollaboratorError;
use async_trait::async_trait;
use folio_engine::{HydrationRequest, PageContent, PageStub, RegenerationRequest, StreamEnvelope};

#[async_trait]
pub trait Regenerator: Send + Sync + 'static {
    /// Start generating the document for `request`. Resolves once the
    /// generator has accepted the work, with one stub per page.
    async fn regenerate(
        &self,
        request: RegenerationRequest,
    ) -> Result<Vec<PageStub>, CollaboratorError>;
}

#[async_trait]
pub trait PageHydrator: Send + Sync + 'static {
    /// Fetch the content of a single page
    async fn hydrate(&self, request: HydrationRequest) -> Result<PageContent, CollaboratorError>;
}

/// Item of the completion stream: decoded envelopes, or raw JSON frames as
/// they come off a socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamMessage {
    Envelope(StreamEnvelope),
    Frame(String),
}

impl From<StreamEnvelope> for StreamMessage {
    fn from(envelope: StreamEnvelope) -> Self {
        StreamMessage::Envelope(envelope)
    }
}

impl From<String> for StreamMessage {
    fn from(frame: String) -> Self {
        StreamMessage::Frame(frame)
    }
}
