//! Chat command: owns the stream lifecycle for an interactive consult.
//!
//! One submission maps to one streaming request which runs until a
//! terminal event or a transport error. Between a suspension (`ask_user`)
//! and the next submission no connection is open, so a session can stay
//! paused indefinitely at no resource cost.

use std::io::{BufRead, IsTerminal, Write};

use anyhow::{Context, Result};
use futures_util::StreamExt;
use tracing::warn;
use triage_core::client::{GraphClient, GraphStream, resolve_base_url};
use triage_core::config::Config;
use triage_core::session::{Disposition, Role, SessionState, Speaker, Submission};

/// How a streaming turn ended.
enum TurnEnd {
    /// `ask_user` arrived: the graph is suspended waiting on the user.
    Suspended,
    /// `final` arrived: the consult is complete.
    Completed,
    /// Transport dropped, or the server closed without a terminal event.
    /// No retry is attempted; the stream simply stops advancing.
    Aborted,
}

pub async fn run(
    config: &Config,
    base_url_override: Option<&str>,
    opening: Option<&str>,
) -> Result<()> {
    let base_url = match base_url_override {
        Some(url) => url.trim_end_matches('/').to_string(),
        None => resolve_base_url(config.effective_base_url())?,
    };
    let client = GraphClient::new(base_url);
    let mut state = SessionState::new();

    let interactive = std::io::stdin().is_terminal();
    let mut opening = opening.map(str::to_string);

    loop {
        let input = match opening.take() {
            Some(text) => text,
            None => match read_line(&state, interactive)? {
                Some(line) => line,
                None => break, // EOF
            },
        };

        let stream = match state.classify_submission(&input) {
            Submission::Start => {
                // Optimistic append: the user turn is recorded before the
                // server acknowledges anything.
                state.begin_start(&input);
                match client.start_stream(&input).await {
                    Ok(stream) => stream,
                    Err(e) => {
                        warn!(target: "triage::chat", error = %e, "failed to open start stream");
                        continue;
                    }
                }
            }
            Submission::Resume { thread_id } => {
                state.begin_resume(&input);
                match client.resume_stream(&thread_id, &input).await {
                    Ok(stream) => stream,
                    Err(e) => {
                        warn!(target: "triage::chat", error = %e, "failed to open resume stream");
                        continue;
                    }
                }
            }
            Submission::Ignored => {
                if interactive && !input.trim().is_empty() {
                    println!("(nothing to answer right now)");
                }
                continue;
            }
        };

        match drive_turn(stream, &mut state).await {
            TurnEnd::Suspended => {}
            TurnEnd::Completed => break,
            TurnEnd::Aborted => {
                // Without a pending ask there is no defined way to continue
                // an existing thread; only a fresh session can be retried.
                if state.thread_id().is_some() {
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Polls one stream to its end, folding every event into the session.
///
/// Decode failures on single events are logged and skipped; transport
/// errors end the turn. The connection is closed by dropping the stream,
/// which happens on every exit path including early returns.
async fn drive_turn(mut stream: GraphStream, state: &mut SessionState) -> TurnEnd {
    let mut printed = state.transcript().len();

    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => {
                let disposition = state.apply(event);
                printed = print_new_turns(state, printed);
                if disposition == Disposition::Close {
                    return if state.pending_ask().is_some() {
                        TurnEnd::Suspended
                    } else {
                        TurnEnd::Completed
                    };
                }
            }
            Err(e) if !e.is_transport() => {
                // one malformed event does not abort an otherwise-healthy turn
                warn!(target: "triage::chat", error = %e, "skipping undecodable event");
            }
            Err(e) => {
                warn!(target: "triage::chat", error = %e, "stream transport error; turn ends");
                return TurnEnd::Aborted;
            }
        }
    }

    // server closed the stream without ask_user or final
    TurnEnd::Aborted
}

/// Prints assistant turns appended since `from`; returns the new high mark.
fn print_new_turns(state: &SessionState, from: usize) -> usize {
    let turns = state.transcript().turns();
    for turn in &turns[from..] {
        if turn.role == Role::Assistant {
            println!("{}: {}", turn.speaker_label(), turn.content);
        }
    }
    turns.len()
}

/// Reads the next submission, surfacing the pending question first.
fn read_line(state: &SessionState, interactive: bool) -> Result<Option<String>> {
    if interactive {
        if let Some(question) = state.pending_question() {
            let label = state
                .pending_ask()
                .and_then(|ask| ask.speaker)
                .map_or("Question", Speaker::label);
            println!("? {label}: {question}");
        }
        let prompt = if state.thread_id().is_none() {
            "Describe your issue> "
        } else {
            "Your answer> "
        };
        print!("{prompt}");
        std::io::stdout().flush().context("flush stdout")?;
    }

    let mut line = String::new();
    let read = std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("read stdin")?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}
