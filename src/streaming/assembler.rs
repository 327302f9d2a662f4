//! Incremental classification of streamed text into prose, thinking and code.
//!
//! [`StreamAssembler`] never touches the element tree: it consumes text and
//! emits [`RenderEvent`]s that [`super::DomRenderer`] applies.

use super::lexer::{scan, Scan};
use super::tags::{is_premature_close, ThinkKind, CODE_FENCE, THINK_OPENERS};
use super::RenderEvent;
use tracing::trace;

/// Which kind of span the unprocessed text continues
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Prose,
    Think(ThinkKind),
    Code { language: String },
}

/// Tokens looked for while in prose, in [`Scan`] needle order
const PROSE_TOKENS: [&str; 3] = [CODE_FENCE, THINK_OPENERS[0], THINK_OPENERS[1]];

pub struct StreamAssembler {
    raw_buffer: String,
    processed_index: usize,
    mode: Mode,
    think_buffer: String,
    think_step: u64,
    code_buffer: String,
    /// Kind of the think block that closed last, while no opener or fence followed
    closed_think: Option<ThinkKind>,
}

impl StreamAssembler {
    /// `think_steps_so_far` seeds the step counter so numbering continues across messages
    pub fn new(think_steps_so_far: u64) -> Self {
        Self {
            raw_buffer: String::new(),
            processed_index: 0,
            mode: Mode::Prose,
            think_buffer: String::new(),
            think_step: think_steps_so_far,
            code_buffer: String::new(),
            closed_think: None,
        }
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn in_think_block(&self) -> bool {
        matches!(self.mode, Mode::Think(_))
    }

    pub fn in_code_block(&self) -> bool {
        matches!(self.mode, Mode::Code { .. })
    }

    pub fn think_kind(&self) -> Option<ThinkKind> {
        match self.mode {
            Mode::Think(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn think_step(&self) -> u64 {
        self.think_step
    }

    pub fn think_buffer(&self) -> &str {
        &self.think_buffer
    }

    pub fn code_buffer(&self) -> &str {
        &self.code_buffer
    }

    pub fn raw_buffer(&self) -> &str {
        &self.raw_buffer
    }

    pub fn processed_index(&self) -> usize {
        self.processed_index
    }

    /// Text received but held back because it may be the start of a tag
    pub fn unprocessed(&self) -> &str {
        &self.raw_buffer[self.processed_index..]
    }

    /// Feed the next delta and return the render events it produced
    pub fn push(&mut self, chunk: &str) -> Vec<RenderEvent> {
        self.raw_buffer.push_str(chunk);
        let mut events = Vec::new();
        let consumed = self.advance(false, &mut events);
        self.processed_index += consumed;
        events
    }

    /// Flush everything still held back and close an unterminated code block.
    ///
    /// An unterminated thinking span stays open; the renderer's finalization
    /// takes care of its streaming indicator.
    pub fn finish(&mut self) -> Vec<RenderEvent> {
        let mut events = Vec::new();
        let consumed = self.advance(true, &mut events);
        self.processed_index += consumed;
        if let Mode::Code { language } = &self.mode {
            let language = language.clone();
            self.close_code(&language, &mut events);
        }
        events
    }

    /// Process the unprocessed suffix, returning how many bytes of it were consumed
    fn advance(&mut self, finishing: bool, events: &mut Vec<RenderEvent>) -> usize {
        let pending = self.raw_buffer[self.processed_index..].to_string();
        let mut i = 0;

        while i < pending.len() {
            let rest = &pending[i..];
            let prose_tokens = self.prose_tokens();
            match self.mode.clone() {
                Mode::Code { language } => match scan(rest, &[CODE_FENCE]) {
                    Scan::Found { position, .. } => {
                        self.push_code(&rest[..position], events);
                        self.close_code(&language, events);
                        i += position + CODE_FENCE.len();
                        if pending[i..].starts_with("\r\n") {
                            i += 2;
                        } else if pending[i..].starts_with('\n') {
                            i += 1;
                        }
                    }
                    Scan::Incomplete { position } if !finishing => {
                        self.push_code(&rest[..position], events);
                        i += position;
                        break;
                    }
                    _ => {
                        self.push_code(rest, events);
                        i = pending.len();
                    }
                },

                Mode::Think(kind) => match scan(rest, kind.closers()) {
                    Scan::Found { position, needle } => {
                        let closer = kind.closers()[needle];
                        self.push_think(&rest[..position], events);
                        i += position + closer.len();

                        if is_premature_close(&pending[i..], kind) {
                            trace!("Ignoring premature {closer}");
                            self.push_think("\n", events);
                            continue;
                        }

                        trace!("Closing {kind:?} think block");
                        self.closed_think = Some(kind);
                        events.push(RenderEvent::CloseThink);
                        events.push(RenderEvent::OpenParagraph);
                        self.mode = Mode::Prose;
                        self.think_buffer.clear();
                        let after = &pending[i..];
                        i += after.len() - after.trim_start().len();
                    }
                    Scan::Incomplete { position } if !finishing => {
                        self.push_think(&rest[..position], events);
                        i += position;
                        break;
                    }
                    _ => {
                        self.push_think(rest, events);
                        i = pending.len();
                    }
                },

                Mode::Prose => match scan(rest, &prose_tokens) {
                    Scan::Found { position, needle } => {
                        Self::push_prose(&rest[..position], events);
                        let token = prose_tokens[needle];

                        // A closer split from its premature twin by a chunk
                        // boundary arrives after the block already closed
                        if needle >= PROSE_TOKENS.len() {
                            trace!("Dropping stray {token} after think block");
                            i += position + token.len();
                            continue;
                        }

                        self.closed_think = None;
                        if token == CODE_FENCE {
                            let after_fence = &rest[position + CODE_FENCE.len()..];
                            match after_fence.find('\n') {
                                Some(newline) => {
                                    let language = after_fence[..newline].trim().to_string();
                                    trace!("Opening code block ({language})");
                                    events.push(RenderEvent::OpenCode {
                                        language: language.clone(),
                                    });
                                    self.mode = Mode::Code { language };
                                    self.code_buffer.clear();
                                    i += position + CODE_FENCE.len() + newline + 1;
                                }
                                // The language tag may continue in the next chunk
                                None if !finishing => {
                                    i += position;
                                    break;
                                }
                                None => {
                                    Self::push_prose(&rest[position..], events);
                                    i = pending.len();
                                }
                            }
                        } else {
                            let kind = ThinkKind::from_opener(token);
                            self.think_step += 1;
                            trace!("Opening {kind:?} think block, step {}", self.think_step);
                            events.push(RenderEvent::OpenThink {
                                kind,
                                step: self.think_step,
                            });
                            self.mode = Mode::Think(kind);
                            self.think_buffer.clear();
                            i += position + token.len();
                        }
                    }
                    Scan::Incomplete { position } if !finishing => {
                        Self::push_prose(&rest[..position], events);
                        i += position;
                        break;
                    }
                    _ => {
                        Self::push_prose(rest, events);
                        i = pending.len();
                    }
                },
            }
        }

        i
    }

    /// Prose needles: fence and openers, plus the closers of a just-closed think block
    fn prose_tokens(&self) -> Vec<&'static str> {
        let mut tokens = PROSE_TOKENS.to_vec();
        if let Some(kind) = self.closed_think {
            tokens.extend_from_slice(kind.closers());
        }
        tokens
    }

    fn push_prose(text: &str, events: &mut Vec<RenderEvent>) {
        if !text.is_empty() {
            events.push(RenderEvent::ProseText(text.to_string()));
        }
    }

    fn push_think(&mut self, text: &str, events: &mut Vec<RenderEvent>) {
        let text = if self.think_buffer.is_empty() {
            text.trim_start()
        } else {
            text
        };
        if text.is_empty() {
            return;
        }
        self.think_buffer.push_str(text);
        events.push(RenderEvent::ThinkText(text.to_string()));
    }

    fn push_code(&mut self, text: &str, events: &mut Vec<RenderEvent>) {
        if text.is_empty() {
            return;
        }
        self.code_buffer.push_str(text);
        events.push(RenderEvent::CodeText(text.to_string()));
    }

    fn close_code(&mut self, language: &str, events: &mut Vec<RenderEvent>) {
        let mut code = std::mem::take(&mut self.code_buffer);
        if code.ends_with('\n') {
            code.pop();
            if code.ends_with('\r') {
                code.pop();
            }
        }
        trace!("Closing code block ({language})");
        events.push(RenderEvent::CloseCode {
            language: language.to_string(),
            code,
        });
        events.push(RenderEvent::OpenParagraph);
        self.mode = Mode::Prose;
    }
}
