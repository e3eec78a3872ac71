//! Completion-stream frames
//!
//! The generator pushes JSON frames of the form
//! `{"epoch": 3, "event": "page_ready", "data": {...}}`. Three events exist:
//! `page_ready`, `product_status` and `conversion_progress`. A frame without
//! an `epoch` belongs to whichever epoch is active when it arrives.

use crate::errors::{EngineError, EngineResult};
use crate::page::{EpochId, Lifecycle, PageContent, PageOrigin, PageReady};
use crate::snapshot::ItemId;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Generator progress report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub message: String,
    /// 0..=100; 0 means the progress display should be hidden
    pub percent: u8,
}

impl Progress {
    pub fn is_hidden(&self) -> bool {
        self.percent == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    PageReady(PageReady),
    ItemStatus { item_id: ItemId, lifecycle: Lifecycle },
    Progress(Progress),
}

/// A stream event tagged with the epoch it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEnvelope {
    pub epoch: EpochId,
    pub event: StreamEvent,
}

impl StreamEnvelope {
    pub fn new(epoch: EpochId, event: StreamEvent) -> Self {
        Self { epoch, event }
    }
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(default)]
    epoch: Option<u64>,
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct RawPageReady {
    number: Option<u32>,
    #[serde(rename = "type")]
    kind: Option<String>,
    product_id: Option<String>,
    page_index: Option<u32>,
    image: Option<String>,
    source_file: Option<String>,
}

#[derive(Deserialize)]
struct RawStatus {
    product_id: Option<String>,
    status: Option<String>,
}

#[derive(Deserialize)]
struct RawProgress {
    #[serde(default)]
    message: String,
    #[serde(default)]
    percent: f64,
}

/// Decode one frame. `arrival_epoch` tags frames that carry no epoch.
pub fn decode_frame(text: &str, arrival_epoch: EpochId) -> EngineResult<StreamEnvelope> {
    let frame: RawFrame = serde_json::from_str(text)?;
    let epoch = frame.epoch.map(EpochId).unwrap_or(arrival_epoch);

    let event = match frame.event.as_str() {
        "page_ready" => StreamEvent::PageReady(page_ready(serde_json::from_value(frame.data)?)?),
        "product_status" | "item_status" => {
            let raw: RawStatus = serde_json::from_value(frame.data)?;
            let item_id = raw
                .product_id
                .ok_or_else(|| malformed("product_status without product_id"))?;
            let lifecycle = parse_lifecycle(raw.status.as_deref())?;
            StreamEvent::ItemStatus { item_id, lifecycle }
        }
        "conversion_progress" => {
            let raw: RawProgress = serde_json::from_value(frame.data)?;
            StreamEvent::Progress(Progress {
                message: raw.message,
                percent: raw.percent.clamp(0.0, 100.0).round() as u8,
            })
        }
        other => return Err(malformed(&format!("unknown event '{}'", other))),
    };

    Ok(StreamEnvelope { epoch, event })
}

/// Encode an envelope in the same frame shape `decode_frame` reads
pub fn encode_frame(envelope: &StreamEnvelope) -> String {
    let (event, data) = match &envelope.event {
        StreamEvent::PageReady(ready) => {
            let mut data = json!({
                "number": ready.number,
                "page_index": ready.origin.index(),
            });
            match &ready.origin {
                PageOrigin::Template { source_file, .. } => {
                    data["type"] = json!("template");
                    if let Some(file) = source_file {
                        data["source_file"] = json!(file);
                    }
                }
                PageOrigin::Item { item_id, .. } => {
                    data["type"] = json!("product");
                    data["product_id"] = json!(item_id);
                }
            }
            if let Some(content) = &ready.content {
                data["image"] = json!(content.as_str());
            }
            ("page_ready", data)
        }
        StreamEvent::ItemStatus { item_id, lifecycle } => (
            "product_status",
            json!({ "product_id": item_id, "status": lifecycle }),
        ),
        StreamEvent::Progress(progress) => (
            "conversion_progress",
            json!({ "message": progress.message, "percent": progress.percent }),
        ),
    };

    json!({ "epoch": envelope.epoch.0, "event": event, "data": data }).to_string()
}

fn page_ready(raw: RawPageReady) -> EngineResult<PageReady> {
    let number = raw
        .number
        .filter(|n| *n > 0)
        .ok_or_else(|| malformed("page_ready without a page number"))?;
    let index = raw.page_index.unwrap_or(0);
    let typed = raw.kind.is_some() || raw.product_id.is_some();

    let is_item = match raw.kind.as_deref() {
        Some("product") | Some("item") => true,
        Some("template") => false,
        Some(other) => return Err(malformed(&format!("unknown page type '{}'", other))),
        None => raw.product_id.is_some(),
    };

    let origin = if is_item {
        let item_id = raw
            .product_id
            .ok_or_else(|| malformed("item page without product_id"))?;
        PageOrigin::Item { item_id, index }
    } else {
        PageOrigin::Template {
            index,
            source_file: raw.source_file,
        }
    };

    Ok(PageReady {
        number,
        origin,
        content: raw.image.map(PageContent::from),
        typed,
    })
}

fn parse_lifecycle(status: Option<&str>) -> EngineResult<Lifecycle> {
    match status {
        Some("pending") => Ok(Lifecycle::Pending),
        Some("generating") => Ok(Lifecycle::Generating),
        Some("ready") => Ok(Lifecycle::Ready),
        Some(other) => Err(malformed(&format!("unknown status '{}'", other))),
        None => Err(malformed("product_status without status")),
    }
}

fn malformed(reason: &str) -> EngineError {
    EngineError::MalformedEvent(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_template_page() {
        let frame = r#"{"event":"page_ready","data":{"type":"template","number":3,"image":"data:x","page_index":1,"status":"ready","has_image":true,"source_file":"02_intro.docx"}}"#;
        let envelope = decode_frame(frame, EpochId(4)).unwrap();

        assert_eq!(envelope.epoch, EpochId(4));
        match envelope.event {
            StreamEvent::PageReady(ready) => {
                assert_eq!(ready.number, 3);
                assert_eq!(
                    ready.origin,
                    PageOrigin::Template {
                        index: 1,
                        source_file: Some("02_intro.docx".to_string())
                    }
                );
                assert_eq!(ready.content.unwrap().as_str(), "data:x");
            }
            other => panic!("Expected page_ready, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_product_page_with_explicit_epoch() {
        let frame = r#"{"epoch":9,"event":"page_ready","data":{"type":"product","number":6,"product_id":"P-12","page_index":0,"image":"img"}}"#;
        let envelope = decode_frame(frame, EpochId(1)).unwrap();

        assert_eq!(envelope.epoch, EpochId(9));
        let StreamEvent::PageReady(ready) = envelope.event else {
            panic!("Expected page_ready");
        };
        assert_eq!(ready.origin, PageOrigin::item("P-12", 0));
    }

    #[test]
    fn test_untyped_page_is_marked() {
        let frame = r#"{"event":"page_ready","data":{"number":2,"image":"img"}}"#;
        let StreamEvent::PageReady(ready) = decode_frame(frame, EpochId(1)).unwrap().event else {
            panic!("Expected page_ready");
        };
        assert!(!ready.typed);

        let frame = r#"{"event":"page_ready","data":{"number":2,"product_id":"P-1"}}"#;
        let StreamEvent::PageReady(ready) = decode_frame(frame, EpochId(1)).unwrap().event else {
            panic!("Expected page_ready");
        };
        assert!(ready.typed);
        assert_eq!(ready.origin, PageOrigin::item("P-1", 0));
    }

    #[test]
    fn test_missing_number_is_malformed() {
        let frame = r#"{"event":"page_ready","data":{"type":"template","image":"img"}}"#;
        assert!(matches!(
            decode_frame(frame, EpochId(1)),
            Err(EngineError::MalformedEvent(_))
        ));
    }

    #[test]
    fn test_status_frame() {
        let frame = r#"{"event":"product_status","data":{"product_id":"P-1","status":"generating"}}"#;
        let envelope = decode_frame(frame, EpochId(2)).unwrap();
        assert_eq!(
            envelope.event,
            StreamEvent::ItemStatus {
                item_id: "P-1".to_string(),
                lifecycle: Lifecycle::Generating
            }
        );

        let bad = r#"{"event":"product_status","data":{"product_id":"P-1","status":"done"}}"#;
        assert!(decode_frame(bad, EpochId(2)).is_err());
    }

    #[test]
    fn test_progress_is_clamped() {
        let frame = r#"{"event":"conversion_progress","data":{"message":"Working","percent":140}}"#;
        let envelope = decode_frame(frame, EpochId(1)).unwrap();
        assert_eq!(
            envelope.event,
            StreamEvent::Progress(Progress {
                message: "Working".to_string(),
                percent: 100
            })
        );
    }

    #[test]
    fn test_garbage_and_unknown_events() {
        assert!(decode_frame("not json", EpochId(1)).is_err());
        assert!(decode_frame(r#"{"event":"disconnect"}"#, EpochId(1)).is_err());
    }

    #[test]
    fn test_encoded_frame_decodes_back() {
        let envelope = StreamEnvelope::new(
            EpochId(5),
            StreamEvent::PageReady(PageReady::new(2, PageOrigin::item("P-3", 1), "img")),
        );
        let decoded = decode_frame(&encode_frame(&envelope), EpochId(0)).unwrap();
        assert_eq!(decoded, envelope);
    }
}
