//! Session state: thread identity, transcript, and the pending-ask handshake.
//!
//! All stream events fold into [`SessionState`] through one transition
//! function, [`SessionState::apply`], which also owns the terminal-event
//! rule: `ask_user` and `final` close the current connection, everything
//! else keeps it open. The state is plain data with read accessors, so a
//! front end (terminal loop, TUI, test harness) only renders it.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::client::GraphEvent;

/// Participant role attribution for assistant turns.
///
/// Closed set defined by the backend graph; payloads may omit it, in which
/// case display falls back to [`Speaker::GENERIC_LABEL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    #[serde(rename = "GP")]
    Gp,
    Specialist,
    Radiologist,
    Pathologist,
    Assistant,
}

impl Speaker {
    /// Label used when a turn carries no speaker attribution.
    pub const GENERIC_LABEL: &'static str = "AI";

    /// Display name matching the wire form.
    pub fn label(self) -> &'static str {
        match self {
            Speaker::Gp => "GP",
            Speaker::Specialist => "Specialist",
            Speaker::Radiologist => "Radiologist",
            Speaker::Pathologist => "Pathologist",
            Speaker::Assistant => "Assistant",
        }
    }
}

/// Who authored a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One message in the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<Speaker>,
}

impl Turn {
    fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            speaker: None,
        }
    }

    fn assistant(content: impl Into<String>, speaker: Option<Speaker>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            speaker,
        }
    }

    /// Label shown next to an assistant turn.
    pub fn speaker_label(&self) -> &'static str {
        self.speaker.map_or(Speaker::GENERIC_LABEL, Speaker::label)
    }
}

/// Append-only ordered sequence of turns. Insertion order is the only order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The most recent assistant turn, searched from the end.
    pub fn last_assistant(&self) -> Option<&Turn> {
        self.turns.iter().rev().find(|t| t.role == Role::Assistant)
    }

    fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::user(content));
    }

    /// Folds an incremental assistant message into the transcript.
    ///
    /// Empty or whitespace-only content is not a user-visible event and is
    /// dropped. A message byte-identical to the last assistant turn is
    /// dropped too: the backend may re-deliver the same message across
    /// retry boundaries. Returns whether a turn was appended.
    fn fold_assistant(&mut self, content: &str, speaker: Option<Speaker>) -> bool {
        if content.trim().is_empty() {
            return false;
        }
        if let Some(last) = self.turns.last()
            && last.role == Role::Assistant
            && last.content == content
        {
            return false;
        }
        self.turns.push(Turn::assistant(content, speaker));
        true
    }

    /// Appends the closing assistant turn of a `final` event.
    ///
    /// Never de-duplicated: the final summary is always retained even when
    /// it repeats the preceding message verbatim.
    fn push_final(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::assistant(content, None));
    }
}

/// Marker that the backend suspended the turn loop awaiting a user reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAsk {
    pub thread_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<Speaker>,
    /// Explicit question text when the backend provides one (resume turns).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
}

/// What [`SessionState::apply`] tells the stream driver to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Keep polling the current connection.
    Continue,
    /// Terminal event: close the current connection.
    Close,
}

/// Classification of a composer submission against the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// No thread yet: open a start stream.
    Start,
    /// A pending ask matches the active thread: open a resume stream.
    Resume { thread_id: String },
    /// Nothing to do (empty input, or a turn is still streaming).
    Ignored,
}

/// Placeholder question shown before any assistant turn exists.
pub const QUESTION_PLACEHOLDER: &str = "(Waiting for your answer...)";

/// Mutable session state owned by the stream lifecycle driver.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    thread_id: Option<String>,
    transcript: Transcript,
    pending_ask: Option<PendingAsk>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The backend-assigned thread id, once a `thread` event has arrived.
    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn pending_ask(&self) -> Option<&PendingAsk> {
        self.pending_ask.as_ref()
    }

    /// Classifies a submission without mutating state.
    ///
    /// A submission while a thread exists but no matching ask is pending is
    /// explicitly `Ignored`: the assistant is still streaming (or the turn
    /// ended on a transport error) and there is no defined reply target.
    pub fn classify_submission(&self, text: &str) -> Submission {
        if text.trim().is_empty() {
            return Submission::Ignored;
        }
        let Some(thread_id) = &self.thread_id else {
            return Submission::Start;
        };
        match &self.pending_ask {
            Some(ask) if ask.thread_id == *thread_id => Submission::Resume {
                thread_id: thread_id.clone(),
            },
            _ => Submission::Ignored,
        }
    }

    /// Records the optimistic user turn for a start submission.
    ///
    /// Called before the start stream is opened, so the user's text is
    /// visible immediately rather than after server acknowledgement.
    pub fn begin_start(&mut self, text: &str) {
        self.transcript.push_user(text);
    }

    /// Records the optimistic user turn for a resume submission and clears
    /// the pending ask. Called before the resume stream is opened.
    pub fn begin_resume(&mut self, reply: &str) {
        self.pending_ask = None;
        self.transcript.push_user(reply);
    }

    /// Folds one decoded stream event into the session.
    ///
    /// This is the single place the terminal rule lives: the returned
    /// disposition tells the driver whether the connection stays open.
    /// Events for a thread id the session is not tracking are folded
    /// anyway (the client has no authority to validate backend
    /// invariants) but logged.
    pub fn apply(&mut self, event: GraphEvent) -> Disposition {
        self.check_thread_id(&event);
        match event {
            GraphEvent::Thread { thread_id } => {
                debug!(target: "triage::session", %thread_id, "thread identity recorded");
                self.thread_id = Some(thread_id);
                Disposition::Continue
            }
            GraphEvent::Message {
                content, speaker, ..
            } => {
                self.transcript.fold_assistant(&content, speaker);
                Disposition::Continue
            }
            GraphEvent::AskUser {
                thread_id,
                speaker,
                question,
            } => {
                self.pending_ask = Some(PendingAsk {
                    thread_id,
                    speaker,
                    question,
                });
                Disposition::Close
            }
            GraphEvent::Final { message, .. } => {
                if let Some(message) = message
                    && !message.is_empty()
                {
                    self.transcript.push_final(message);
                }
                Disposition::Close
            }
        }
    }

    /// The question to surface while an ask is pending.
    ///
    /// Prefers the explicit question from the ask event, then the most
    /// recent assistant turn, then a placeholder. Recomputed on demand.
    pub fn pending_question(&self) -> Option<&str> {
        let ask = self.pending_ask.as_ref()?;
        Some(
            ask.question
                .as_deref()
                .or_else(|| self.transcript.last_assistant().map(|t| t.content.as_str()))
                .unwrap_or(QUESTION_PLACEHOLDER),
        )
    }

    fn check_thread_id(&self, event: &GraphEvent) {
        if matches!(event, GraphEvent::Thread { .. }) {
            return;
        }
        if let Some(tracked) = &self.thread_id
            && tracked != event.thread_id()
        {
            warn!(
                target: "triage::session",
                %tracked, received = %event.thread_id(),
                "event for a thread id this session is not tracking"
            );
        }
    }
}
