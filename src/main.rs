mod cli;

use anyhow::{Context, Result};
use chat_render::history::{ChatMessage, HistoryRenderer};
use chat_render::logging::setup_logging;
use chat_render::recording::{play, PlaybackOptions, StreamRecording};
use chat_render::settings::{get_settings, RenderSettings};
use chat_render::streaming::StreamRenderer;
use chat_render::Document;
use cli::{Args, Mode};
use std::path::Path;
use std::sync::Arc;

async fn run_replay(
    settings: Arc<RenderSettings>,
    recording: &Path,
    options: PlaybackOptions,
) -> Result<String> {
    let recording = StreamRecording::load(recording)?;
    let mut doc = Document::new();
    let container = doc.create_element_with_class("div", "chat-container");
    let root = doc.root();
    doc.append_child(root, container);

    let mut renderer = StreamRenderer::new(settings);
    play(&recording, &mut renderer, &mut doc, container, options).await?;
    Ok(doc.outer_html(container))
}

fn run_history(settings: Arc<RenderSettings>, messages: &Path) -> Result<String> {
    let contents = std::fs::read_to_string(messages)
        .with_context(|| format!("Failed to read messages from {}", messages.display()))?;
    let messages: Vec<ChatMessage> = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse messages from {}", messages.display()))?;

    let mut doc = Document::new();
    let container = doc.create_element_with_class("div", "chat-container");
    let root = doc.root();
    doc.append_child(root, container);

    let renderer = HistoryRenderer::new(settings);
    for message in &messages {
        let element = doc.create_element_with_class("div", "message");
        doc.append_child(container, element);
        renderer.parse_content(&mut doc, element, message, true);
    }
    Ok(doc.outer_html(container))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.verbose);

    let settings = match &args.settings {
        Some(path) => RenderSettings::load_from_path(path)?,
        None => get_settings().clone(),
    };
    let settings = Arc::new(settings);

    let html = match args.mode {
        Mode::Replay {
            recording,
            fast,
            chunk_size,
        } => run_replay(settings, &recording, PlaybackOptions { fast, chunk_size }).await?,
        Mode::History { messages } => run_history(settings, &messages)?,
    };
    println!("{html}");
    Ok(())
}
