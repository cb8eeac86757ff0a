//! Console confirmation prompt.
//!
//! The prompt is written to an output stream. Lines are read from the input
//! stream by a helper thread that lives as long as the provider, so each wait
//! can be bounded by the request timeout and cut short by an
//! [`InterruptHandle`] without losing the next answer. Lines typed while no
//! prompt is showing are discarded.

use std::io::{self, BufRead, BufReader, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crossterm::style::Stylize;
use tracing::{debug, warn};

use super::{ConfirmationProvider, ConfirmationRequest, ConfirmationResponse, ConfirmationResult};

const COMMENT_PREFIX: &str = "comment:";

/// What the prompt loop can hear back while waiting.
#[derive(Debug, Clone)]
enum PromptEvent {
    Line(String),
    Eof,
    Interrupted,
    Failed(String),
}

/// Cancels the prompt currently waiting for input, if any.
///
/// The binary wires this to Ctrl-C. An interrupted prompt resolves to `Denied`.
#[derive(Clone)]
pub struct InterruptHandle {
    events: Sender<PromptEvent>,
    waiting: Arc<AtomicBool>,
}

impl InterruptHandle {
    /// Returns `true` if a pending prompt was interrupted.
    pub fn interrupt(&self) -> bool {
        self.waiting.load(Ordering::SeqCst) && self.events.send(PromptEvent::Interrupted).is_ok()
    }
}

/// Input side of the prompt: one reader thread per provider, started on the
/// first prompt, feeding a channel that outlives any single prompt.
struct PromptInput {
    source: Option<Box<dyn BufRead + Send>>,
    events: Receiver<PromptEvent>,
    /// Set once the input hit end-of-file or failed; later prompts resolve at once.
    ended: Option<PromptEvent>,
}

impl PromptInput {
    fn ensure_reader(&mut self, tx: &Sender<PromptEvent>) {
        let Some(mut source) = self.source.take() else {
            return;
        };
        let tx = tx.clone();
        let spawned = thread::Builder::new()
            .name("confirm-input".to_string())
            .spawn(move || loop {
                let mut line = String::new();
                let (event, last) = match source.read_line(&mut line) {
                    Ok(0) => (PromptEvent::Eof, true),
                    Ok(_) => (PromptEvent::Line(line), false),
                    Err(e) => (PromptEvent::Failed(e.to_string()), true),
                };
                if tx.send(event).is_err() || last {
                    debug!("Confirmation input reader stopped");
                    break;
                }
            });
        if let Err(e) = spawned {
            warn!("Failed to start confirmation input reader: {}", e);
            self.ended = Some(PromptEvent::Failed(e.to_string()));
        }
    }

    /// Discard answers typed while no prompt was showing and stale interrupts.
    fn drop_stale(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                PromptEvent::Line(line) => {
                    debug!("Discarding input typed outside a prompt: {:?}", line.trim())
                }
                PromptEvent::Interrupted => {}
                ended @ (PromptEvent::Eof | PromptEvent::Failed(_)) => self.ended = Some(ended),
            }
        }
    }
}

/// Asks the user on a text console.
///
/// Accepted answers (case-insensitive): `yes`, `y`, `approve`, `approved` to
/// approve; `no`, `n`, `deny`, `denied` to deny; `comment: <text>` to deny with a
/// comment. Anything else is a denial.
pub struct InteractiveProvider {
    input: Mutex<PromptInput>,
    output: Mutex<Box<dyn Write + Send>>,
    events_tx: Sender<PromptEvent>,
    waiting: Arc<AtomicBool>,
}

impl InteractiveProvider {
    pub fn new(input: impl BufRead + Send + 'static, output: impl Write + Send + 'static) -> Self {
        let (events_tx, events) = mpsc::channel();
        Self {
            input: Mutex::new(PromptInput {
                source: Some(Box::new(input)),
                events,
                ended: None,
            }),
            output: Mutex::new(Box::new(output)),
            events_tx,
            waiting: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Prompt on stderr and read answers from stdin.
    pub fn stdio() -> Self {
        Self::new(BufReader::new(io::stdin()), io::stderr())
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            events: self.events_tx.clone(),
            waiting: self.waiting.clone(),
        }
    }

    fn render(&self, request: &ConfirmationRequest) -> io::Result<()> {
        let mut out = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        let permissions = request
            .required_permissions
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ");

        writeln!(out)?;
        writeln!(out, "{}", "Permission required".bold().yellow())?;
        writeln!(out, "  Command:     {}", request.command.as_str().bold())?;
        writeln!(out, "  Permissions: {}", permissions)?;
        writeln!(out, "  Risk:        {}", request.risk_description.as_str().red())?;
        writeln!(out, "  Session:     {}", request.session_id)?;
        write!(
            out,
            "Approve? [yes/no/comment: <text>] ({}s): ",
            request.timeout_seconds
        )?;
        out.flush()
    }

    fn wait_for_answer(&self, request: &ConfirmationRequest) -> (ConfirmationResult, Option<String>) {
        // One prompt at a time per console
        let mut input = self.input.lock().unwrap_or_else(PoisonError::into_inner);
        input.drop_stale();
        input.ensure_reader(&self.events_tx);

        if let Err(e) = self.render(request) {
            warn!("Failed to render confirmation prompt: {}", e);
            return (ConfirmationResult::Error, Some(format!("Prompt failed: {}", e)));
        }
        if let Some(ended) = input.ended.clone() {
            return resolve(ended);
        }

        self.waiting.store(true, Ordering::SeqCst);
        let received = input
            .events
            .recv_timeout(Duration::from_secs(request.timeout_seconds));
        self.waiting.store(false, Ordering::SeqCst);

        match received {
            Ok(event) => {
                if matches!(event, PromptEvent::Eof | PromptEvent::Failed(_)) {
                    input.ended = Some(event.clone());
                }
                resolve(event)
            }
            Err(RecvTimeoutError::Timeout) => (ConfirmationResult::Timeout, None),
            Err(RecvTimeoutError::Disconnected) => (
                ConfirmationResult::Error,
                Some("Input reader stopped unexpectedly".to_string()),
            ),
        }
    }
}

fn resolve(event: PromptEvent) -> (ConfirmationResult, Option<String>) {
    match event {
        PromptEvent::Line(line) => parse_confirmation_input(&line),
        PromptEvent::Eof => (
            ConfirmationResult::Denied,
            Some("No input received".to_string()),
        ),
        PromptEvent::Interrupted => (
            ConfirmationResult::Denied,
            Some("Interrupted by user".to_string()),
        ),
        PromptEvent::Failed(e) => (
            ConfirmationResult::Error,
            Some(format!("Failed to read input: {}", e)),
        ),
    }
}

impl ConfirmationProvider for InteractiveProvider {
    fn request_confirmation(&self, request: &ConfirmationRequest) -> ConfirmationResponse {
        let started = Instant::now();
        let (result, user_comment) = self.wait_for_answer(request);
        ConfirmationResponse::new(
            request.id.clone(),
            result,
            user_comment,
            started.elapsed().as_secs_f64(),
        )
    }
}

/// Map one line of user input to a confirmation result.
///
/// Fails closed: only an explicit approval token approves.
pub fn parse_confirmation_input(input: &str) -> (ConfirmationResult, Option<String>) {
    let trimmed = input.trim();

    if trimmed
        .get(..COMMENT_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(COMMENT_PREFIX))
    {
        let comment = trimmed[COMMENT_PREFIX.len()..].trim();
        let comment = (!comment.is_empty()).then(|| comment.to_string());
        return (ConfirmationResult::Denied, comment);
    }

    match trimmed.to_lowercase().as_str() {
        "yes" | "y" | "approve" | "approved" => (ConfirmationResult::Approved, None),
        "no" | "n" | "deny" | "denied" => (ConfirmationResult::Denied, None),
        _ => (ConfirmationResult::Denied, None),
    }
}
