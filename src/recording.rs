//! Recorded streams: capture the events a message received and replay them.

use crate::dom::{Document, NodeId};
use crate::streaming::StreamRenderer;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Everything one streamed message received, in arrival order
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StreamRecording {
    /// Timestamp of when the recording was started
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub events: Vec<RecordedEvent>,
}

/// Single recorded event with timing info
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RecordedEvent {
    /// Milliseconds since recording start
    pub timestamp_ms: u64,
    #[serde(flatten)]
    pub event: StreamEvent,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Delta {
        text: String,
    },
    ToolStart {
        id: String,
        name: String,
        #[serde(default)]
        args: Value,
    },
    ToolEnd {
        id: String,
        name: String,
        result: String,
        #[serde(default)]
        is_error: bool,
    },
    Finish,
    Cancel,
}

impl StreamRecording {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read recording {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse recording {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write recording {}", path.display()))
    }
}

/// Captures events with their offset from the moment recording started
pub struct StreamRecorder {
    start_time: Instant,
    recording: StreamRecording,
}

impl StreamRecorder {
    pub fn start() -> Self {
        Self {
            start_time: Instant::now(),
            recording: StreamRecording {
                timestamp: chrono::Utc::now(),
                events: Vec::new(),
            },
        }
    }

    pub fn record(&mut self, event: StreamEvent) {
        let elapsed = self.start_time.elapsed();
        let timestamp_ms = elapsed.as_secs() * 1000 + elapsed.subsec_millis() as u64;
        self.recording.events.push(RecordedEvent {
            timestamp_ms,
            event,
        });
    }

    pub fn finish(self) -> StreamRecording {
        self.recording
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlaybackOptions {
    /// Ignore recorded timing
    pub fast: bool,
    /// Re-split deltas into chunks of this many characters
    pub chunk_size: Option<usize>,
}

fn rechunk(text: &str, chunk_size: Option<usize>) -> Vec<String> {
    match chunk_size.filter(|size| *size > 0) {
        Some(size) => {
            let chars: Vec<char> = text.chars().collect();
            chars.chunks(size).map(|chunk| chunk.iter().collect()).collect()
        }
        None => vec![text.to_string()],
    }
}

/// Feed a recording into `renderer` as a new message appended to `container`.
///
/// Returns the message element, or `None` if the recording cancelled the stream.
/// A recording that ends without a finish event is finished implicitly.
pub async fn play(
    recording: &StreamRecording,
    renderer: &mut StreamRenderer,
    doc: &mut Document,
    container: NodeId,
    options: PlaybackOptions,
) -> Result<Option<NodeId>> {
    let message = doc.create_element_with_class("div", "message");
    renderer.start_streaming(doc, container, message)?;
    info!(
        "Replaying {} events recorded at {}",
        recording.events.len(),
        recording.timestamp
    );

    let mut last_ms = 0;
    for recorded in &recording.events {
        if !options.fast && recorded.timestamp_ms > last_ms {
            tokio::time::sleep(Duration::from_millis(recorded.timestamp_ms - last_ms)).await;
        }
        last_ms = last_ms.max(recorded.timestamp_ms);

        match &recorded.event {
            StreamEvent::Delta { text } => {
                for chunk in rechunk(text, options.chunk_size) {
                    renderer.append_stream(doc, &chunk)?;
                }
            }
            StreamEvent::ToolStart { id, name, args } => {
                renderer.start_tool(doc, id, name, args.clone());
            }
            StreamEvent::ToolEnd {
                id,
                name,
                result,
                is_error,
            } => {
                renderer.end_tool(doc, id, name, result, *is_error);
            }
            StreamEvent::Finish => {
                renderer.finish_streaming(doc);
                return Ok(Some(message));
            }
            StreamEvent::Cancel => {
                renderer.cancel_streaming(doc);
                return Ok(None);
            }
        }
    }

    debug!("Recording ended without a finish event");
    renderer.finish_streaming(doc);
    Ok(Some(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::RenderSettings;
    use serde_json::json;
    use std::sync::Arc;

    fn sample() -> StreamRecording {
        serde_json::from_value(json!({
            "timestamp": "2024-01-01T00:00:00Z",
            "events": [
                {"timestamp_ms": 0, "type": "tool_start", "id": "t1", "name": "search", "args": {"q": "x"}},
                {"timestamp_ms": 5, "type": "delta", "text": "Hello <thi"},
                {"timestamp_ms": 10, "type": "delta", "text": "nk>hmm</think>World"},
                {"timestamp_ms": 15, "type": "tool_end", "id": "t1", "name": "search", "result": "ok"},
                {"timestamp_ms": 20, "type": "finish"}
            ]
        }))
        .expect("valid recording")
    }

    fn setup() -> (Document, NodeId, StreamRenderer) {
        let mut doc = Document::new();
        let container = doc.create_element("div");
        let root = doc.root();
        doc.append_child(root, container);
        (doc, container, StreamRenderer::new(Arc::new(RenderSettings::default())))
    }

    #[tokio::test]
    async fn test_playback_renders_message() {
        let (mut doc, container, mut renderer) = setup();
        let options = PlaybackOptions {
            fast: true,
            chunk_size: Some(2),
        };
        let message = play(&sample(), &mut renderer, &mut doc, container, options)
            .await
            .unwrap()
            .unwrap();

        assert!(!renderer.is_streaming());
        assert_eq!(doc.parent(message), Some(container));
        assert_eq!(doc.find_by_class(message, "think-accordion").len(), 1);
        let tools = doc.find_by_class(message, "tool-accordion");
        assert_eq!(tools.len(), 1);
        assert!(!doc.has_class(tools[0], "loading"));
        assert!(doc.text_content(message).contains("World"));
    }

    #[tokio::test]
    async fn test_cancel_event_removes_message() {
        let (mut doc, container, mut renderer) = setup();
        let mut recording = sample();
        recording.events.truncate(2);
        recording.events.push(RecordedEvent {
            timestamp_ms: 6,
            event: StreamEvent::Cancel,
        });

        let message = play(&recording, &mut renderer, &mut doc, container, PlaybackOptions::default())
            .await
            .unwrap();
        assert_eq!(message, None);
        assert!(doc.children(container).is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.json");

        let mut recorder = StreamRecorder::start();
        recorder.record(StreamEvent::Delta {
            text: "hi".to_string(),
        });
        recorder.record(StreamEvent::Finish);
        recorder.finish().save(&path).unwrap();

        let loaded = StreamRecording::load(&path).unwrap();
        assert_eq!(loaded.events.len(), 2);
        assert_eq!(
            loaded.events[0].event,
            StreamEvent::Delta {
                text: "hi".to_string()
            }
        );
        assert!(StreamRecording::load(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_rechunk() {
        assert_eq!(rechunk("abcde", Some(2)), vec!["ab", "cd", "e"]);
        assert_eq!(rechunk("abc", None), vec!["abc"]);
        assert_eq!(rechunk("abc", Some(0)), vec!["abc"]);
    }
}
