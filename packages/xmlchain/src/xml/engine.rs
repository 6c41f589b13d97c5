//! Streaming (event-driven) parse engine.
//!
//! A pass reads one byte buffer with `quick_xml` and reports a strict event
//! sequence to a [`ParseListener`]:
//!
//! `on_start`, then `on_element_open` / `on_text` / `on_element_close` in
//! document order, then `on_end`. A failing pass reports exactly one
//! `on_parse_error` or `on_validation_error` and nothing after it.
//!
//! Every pass runs on the process-wide [`ParseQueue`], so no two passes ever
//! overlap and no pass is started on the stack of another. A listener that
//! panics still receives `on_parse_error` with [`ResolveError::PassPanicked`].

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::sync_channel;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::queue::ParseQueue;
use crate::error::{ResolveError, Result};
use crate::types::Attributes;

static NEXT_PASS: AtomicU64 = AtomicU64::new(1);

/// Receiver of parse events.
///
/// Only `on_element_open`, `on_text` and `on_element_close` are required;
/// the lifecycle hooks default to no-ops.
pub trait ParseListener: Send {
    /// The pass started. `pass` is unique for the lifetime of the process.
    fn on_start(&mut self, _pass: u64) {}

    fn on_element_open(&mut self, tag: &str, attributes: Attributes);

    fn on_text(&mut self, chunk: &str);

    fn on_element_close(&mut self, tag: &str);

    /// The input is not well-formed; no further events follow.
    fn on_parse_error(&mut self, _error: &ResolveError) {}

    /// The input is well-formed but not a valid document; no further events follow.
    fn on_validation_error(&mut self, _error: &ResolveError) {}

    /// The pass finished without error.
    fn on_end(&mut self) {}
}

/// Result of one parse pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// Every event up to `on_end` was delivered.
    Completed,
    /// The pass stopped with an error (already reported to the listener).
    Failed(ResolveError),
    /// The pass was cancelled before or while running.
    Aborted,
}

impl ParseOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// The error that ended the pass, if any.
    #[must_use]
    pub fn error(&self) -> Option<ResolveError> {
        match self {
            Self::Completed => None,
            Self::Failed(error) => Some(error.clone()),
            Self::Aborted => Some(ResolveError::Aborted),
        }
    }
}

/// A finished pass: its outcome plus the listener, handed back to the caller.
#[derive(Debug)]
pub struct ParsePass<L> {
    pub outcome: ParseOutcome,
    pub listener: L,
}

/// Cancels a queued or running pass.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    token: CancellationToken,
}

impl AbortHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// One parse pass over one buffer.
///
/// The engine is consumed by [`begin`](Self::begin) or
/// [`begin_async`](Self::begin_async): a buffer is parsed at most once.
pub struct StreamingParseEngine {
    buffer: Vec<u8>,
    abort: AbortHandle,
}

impl StreamingParseEngine {
    /// Create an engine for `buffer`. Its pass runs on the process-wide queue.
    #[must_use]
    pub fn new(buffer: Vec<u8>) -> Self {
        Self {
            buffer,
            abort: AbortHandle::new(),
        }
    }

    /// Share an existing abort handle with this engine.
    #[must_use]
    pub fn with_abort_handle(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    #[must_use]
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Run the pass and block until it finished.
    ///
    /// Called from the queue's own worker (that is, from inside a listener)
    /// this would wait on itself; the pass fails with
    /// [`ResolveError::ReentrantParse`] instead and the listener receives no
    /// events.
    ///
    /// # Errors
    /// `QueueUnavailable` if the queue refused the pass; the listener is lost.
    pub fn begin<L: ParseListener + 'static>(self, listener: L) -> Result<ParsePass<L>> {
        if ParseQueue::is_worker_thread() {
            tracing::error!("refusing to start a parse pass from inside another pass");
            return Ok(ParsePass {
                outcome: ParseOutcome::Failed(ResolveError::ReentrantParse),
                listener,
            });
        }

        let (reply_tx, reply_rx) = sync_channel(1);
        self.enqueue(listener, move |pass| {
            let _ = reply_tx.send(pass);
        })?;
        reply_rx.recv().map_err(|_| ResolveError::QueueUnavailable)
    }

    /// Run the pass and wait for it without blocking the async runtime.
    ///
    /// # Errors
    /// `QueueUnavailable` if the queue refused the pass; the listener is lost.
    pub async fn begin_async<L: ParseListener + 'static>(
        self,
        listener: L,
    ) -> Result<ParsePass<L>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.enqueue(listener, move |pass| {
            let _ = reply_tx.send(pass);
        })?;
        reply_rx.await.map_err(|_| ResolveError::QueueUnavailable)
    }

    fn enqueue<L, R>(self, listener: L, reply: R) -> Result<()>
    where
        L: ParseListener + 'static,
        R: FnOnce(ParsePass<L>) + Send + 'static,
    {
        let Self { buffer, abort } = self;

        ParseQueue::global().submit(move || {
            let mut listener = listener;
            let outcome = if abort.is_aborted() {
                tracing::debug!("skipping parse pass aborted while queued");
                ParseOutcome::Aborted
            } else {
                let pass = NEXT_PASS.fetch_add(1, Ordering::Relaxed);
                catch_unwind(AssertUnwindSafe(|| {
                    run_pass(&buffer, &mut listener, &abort, pass)
                }))
                .unwrap_or_else(|panic| {
                    let message = panic_message(panic.as_ref());
                    tracing::error!(pass, message = %message, "parse listener panicked");
                    let error = ResolveError::PassPanicked(message);
                    let notified =
                        catch_unwind(AssertUnwindSafe(|| listener.on_parse_error(&error)));
                    if notified.is_err() {
                        tracing::error!(pass, "parse listener panicked again on its failure");
                    }
                    ParseOutcome::Failed(error)
                })
            };
            reply(ParsePass { outcome, listener });
        })
    }
}

impl std::fmt::Debug for StreamingParseEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingParseEngine")
            .field("buffer_len", &self.buffer.len())
            .field("aborted", &self.abort.is_aborted())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Execute one pass on the current thread.
fn run_pass<L: ParseListener + ?Sized>(
    buffer: &[u8],
    listener: &mut L,
    abort: &AbortHandle,
    pass: u64,
) -> ParseOutcome {
    if buffer.is_empty() {
        return parse_error(listener, ResolveError::EmptyInput);
    }

    let mut reader = Reader::from_reader(buffer);
    reader.config_mut().trim_text(false);
    reader.config_mut().check_end_names = true;

    tracing::trace!(pass, bytes = buffer.len(), "parse pass started");
    listener.on_start(pass);

    let mut open: Vec<String> = Vec::new();
    let mut saw_root = false;

    loop {
        if abort.is_aborted() {
            tracing::debug!(pass, "parse pass aborted");
            return ParseOutcome::Aborted;
        }

        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => return parse_error(listener, malformed(&reader, e.to_string())),
        };

        match event {
            Event::Start(start) => {
                if let Err(outcome) = check_root(listener, &open, &mut saw_root) {
                    return outcome;
                }
                let (tag, attributes) = match element_parts(&start) {
                    Ok(parts) => parts,
                    Err(message) => return parse_error(listener, malformed(&reader, message)),
                };
                listener.on_element_open(&tag, attributes);
                open.push(tag);
            }
            Event::Empty(start) => {
                if let Err(outcome) = check_root(listener, &open, &mut saw_root) {
                    return outcome;
                }
                let (tag, attributes) = match element_parts(&start) {
                    Ok(parts) => parts,
                    Err(message) => return parse_error(listener, malformed(&reader, message)),
                };
                listener.on_element_open(&tag, attributes);
                listener.on_element_close(&tag);
            }
            Event::End(_) => {
                let Some(tag) = open.pop() else {
                    let error = malformed(&reader, "closing tag without an open element".into());
                    return parse_error(listener, error);
                };
                listener.on_element_close(&tag);
            }
            Event::Text(text) => {
                let chunk = match text.unescape() {
                    Ok(chunk) => chunk,
                    Err(e) => return parse_error(listener, malformed(&reader, e.to_string())),
                };
                if let Err(outcome) = deliver_text(listener, &open, &chunk) {
                    return outcome;
                }
            }
            Event::CData(cdata) => {
                let raw = cdata.into_inner();
                let chunk = match std::str::from_utf8(&raw) {
                    Ok(chunk) => chunk,
                    Err(e) => return parse_error(listener, malformed(&reader, e.to_string())),
                };
                if let Err(outcome) = deliver_text(listener, &open, chunk) {
                    return outcome;
                }
            }
            Event::Eof => {
                if let Some(tag) = open.last() {
                    let error = malformed(&reader, format!("unexpected end of input, <{tag}> is not closed"));
                    return parse_error(listener, error);
                }
                if !saw_root {
                    let error = ResolveError::Validation("document has no root element".into());
                    return validation_error(listener, error);
                }
                break;
            }
            // Declarations, comments, processing instructions, doctypes.
            _ => {}
        }
    }

    listener.on_end();
    tracing::trace!(pass, "parse pass finished");
    ParseOutcome::Completed
}

fn element_parts(start: &BytesStart<'_>) -> std::result::Result<(String, Attributes), String> {
    let tag = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| e.to_string())?
        .to_string();

    let mut attributes = Attributes::new();
    let mut iter = start.attributes();
    // Duplicate keys are accepted; the last value wins.
    iter.with_checks(false);
    for attr in iter {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| e.to_string())?
            .to_string();
        let value = attr.unescape_value().map_err(|e| e.to_string())?;
        attributes.insert(key, value.into_owned());
    }

    Ok((tag, attributes))
}

fn check_root<L: ParseListener + ?Sized>(
    listener: &mut L,
    open: &[String],
    saw_root: &mut bool,
) -> std::result::Result<(), ParseOutcome> {
    if !open.is_empty() {
        return Ok(());
    }
    if *saw_root {
        let error = ResolveError::Validation("document has more than one root element".into());
        return Err(validation_error(listener, error));
    }
    *saw_root = true;
    Ok(())
}

fn deliver_text<L: ParseListener + ?Sized>(
    listener: &mut L,
    open: &[String],
    chunk: &str,
) -> std::result::Result<(), ParseOutcome> {
    if open.is_empty() {
        if chunk.trim().is_empty() {
            return Ok(());
        }
        let error = ResolveError::Validation("text outside the root element".into());
        return Err(validation_error(listener, error));
    }
    if !chunk.is_empty() {
        listener.on_text(chunk);
    }
    Ok(())
}

fn malformed(reader: &Reader<&[u8]>, message: String) -> ResolveError {
    ResolveError::MalformedXml {
        position: u64::try_from(reader.buffer_position()).unwrap_or(u64::MAX),
        message,
    }
}

fn parse_error<L: ParseListener + ?Sized>(listener: &mut L, error: ResolveError) -> ParseOutcome {
    tracing::debug!(error = %error, "parse error");
    listener.on_parse_error(&error);
    ParseOutcome::Failed(error)
}

fn validation_error<L: ParseListener + ?Sized>(
    listener: &mut L,
    error: ResolveError,
) -> ParseOutcome {
    tracing::debug!(error = %error, "validation error");
    listener.on_validation_error(&error);
    ParseOutcome::Failed(error)
}
