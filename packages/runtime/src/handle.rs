use crate::errors::{RuntimeError, RuntimeResult};
use folio_engine::{ExtraFields, InputSnapshot, ItemId, Navigate, PageGroup, SessionOutput};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};

/// User-side inputs to a running preview
#[derive(Debug, Clone)]
pub enum UserCommand {
    Start(InputSnapshot),
    Edit { field: String, value: String },
    SelectItems(Vec<ItemId>),
    ExtraFields { item_id: ItemId, fields: ExtraFields },
    Reorder(Vec<u32>),
    DropCard { number: u32, group: PageGroup, to_index: usize },
    ForceRefresh,
    Navigate(Navigate),
    Shutdown,
}

/// A session output as broadcast to observers
#[derive(Debug, Clone)]
pub struct PreviewUpdate {
    pub output: SessionOutput,
    pub timestamp: i64,
}

impl PreviewUpdate {
    pub fn new(output: SessionOutput) -> Self {
        Self {
            output,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Compact JSON form of an update, for logs and clients that don't link the
/// engine
#[derive(Debug, Serialize)]
struct UpdateRecord<'a> {
    kind: &'static str,
    timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

impl PreviewUpdate {
    pub fn kind(&self) -> &'static str {
        match &self.output {
            SessionOutput::CurrentPageChanged(_) => "current_page_changed",
            SessionOutput::StalenessChanged(_) => "staleness_changed",
            SessionOutput::PageListChanged(_) => "page_list_changed",
            SessionOutput::Countdown { .. } => "countdown",
            SessionOutput::Progress(_) => "progress",
            SessionOutput::Notification { .. } => "notification",
            SessionOutput::Regenerate(_) => "regenerate",
            SessionOutput::Hydrate(_) => "hydrate",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        let (detail, message) = match &self.output {
            SessionOutput::CurrentPageChanged(view) => (Some(serde_json::to_value(view)?), None),
            SessionOutput::StalenessChanged(stale) => (Some(serde_json::json!(stale)), None),
            SessionOutput::PageListChanged(pages) => (Some(serde_json::to_value(pages)?), None),
            SessionOutput::Countdown { remaining_secs } => {
                (Some(serde_json::json!(remaining_secs)), None)
            }
            SessionOutput::Progress(progress) => (Some(serde_json::to_value(progress)?), None),
            SessionOutput::Notification { level, message } => {
                (Some(serde_json::to_value(level)?), Some(message.as_str()))
            }
            SessionOutput::Regenerate(request) => (Some(serde_json::to_value(request)?), None),
            SessionOutput::Hydrate(request) => (
                Some(serde_json::json!({
                    "epoch": request.epoch,
                    "number": request.number,
                    "purpose": request.purpose,
                })),
                None,
            ),
        };

        serde_json::to_string(&UpdateRecord {
            kind: self.kind(),
            timestamp: self.timestamp,
            detail,
            message,
        })
    }
}

/// Cloneable command side of a running `PreviewDriver`
#[derive(Debug, Clone)]
pub struct PreviewHandle {
    commands: mpsc::Sender<UserCommand>,
    updates: broadcast::Sender<PreviewUpdate>,
}

impl PreviewHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<UserCommand>,
        updates: broadcast::Sender<PreviewUpdate>,
    ) -> Self {
        Self { commands, updates }
    }

    /// Receive every update emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<PreviewUpdate> {
        self.updates.subscribe()
    }

    pub async fn send(&self, command: UserCommand) -> RuntimeResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| RuntimeError::DriverStopped)
    }

    pub async fn start(&self, initial: InputSnapshot) -> RuntimeResult<()> {
        self.send(UserCommand::Start(initial)).await
    }

    pub async fn edit(&self, field: impl Into<String>, value: impl Into<String>) -> RuntimeResult<()> {
        self.send(UserCommand::Edit {
            field: field.into(),
            value: value.into(),
        })
        .await
    }

    pub async fn select_items(&self, items: Vec<ItemId>) -> RuntimeResult<()> {
        self.send(UserCommand::SelectItems(items)).await
    }

    pub async fn set_extra_fields(
        &self,
        item_id: impl Into<ItemId>,
        fields: ExtraFields,
    ) -> RuntimeResult<()> {
        self.send(UserCommand::ExtraFields {
            item_id: item_id.into(),
            fields,
        })
        .await
    }

    pub async fn reorder(&self, sequence: Vec<u32>) -> RuntimeResult<()> {
        self.send(UserCommand::Reorder(sequence)).await
    }

    pub async fn drop_card(&self, number: u32, group: PageGroup, to_index: usize) -> RuntimeResult<()> {
        self.send(UserCommand::DropCard {
            number,
            group,
            to_index,
        })
        .await
    }

    pub async fn force_refresh(&self) -> RuntimeResult<()> {
        self.send(UserCommand::ForceRefresh).await
    }

    pub async fn navigate(&self, target: Navigate) -> RuntimeResult<()> {
        self.send(UserCommand::Navigate(target)).await
    }

    pub async fn shutdown(&self) -> RuntimeResult<()> {
        self.send(UserCommand::Shutdown).await
    }
}
