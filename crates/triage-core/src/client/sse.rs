//! SSE decode layer: converts a raw byte stream into `GraphEvent`s.

use std::pin::Pin;

use eventsource_stream::{EventStream, EventStreamError, Eventsource};
use futures_util::Stream;
use serde::Deserialize;

use crate::client::shared::{ClientError, ClientErrorKind, ClientResult, GraphEvent};
use crate::session::Speaker;

/// SSE parser that converts a byte stream into `GraphEvent`s.
///
/// Framing (field continuation, chunk reassembly, CRLF handling) is done by
/// `eventsource-stream`; this type only decodes the named payloads. A
/// malformed payload yields an `Err` item for that event and the stream
/// keeps going, so one bad event never aborts an otherwise-healthy turn.
pub struct SseParser<S> {
    inner: EventStream<S>,
}

impl<S> SseParser<S> {
    pub fn new(stream: S) -> Self
    where
        S: Eventsource,
    {
        Self {
            inner: stream.eventsource(),
        }
    }
}

impl<S, E> Stream for SseParser<S>
where
    S: Stream<Item = std::result::Result<bytes::Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    type Item = ClientResult<GraphEvent>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        use std::task::Poll;

        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(event))) => {
                Poll::Ready(Some(decode_event(&event.event, &event.data)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(classify_stream_error(&e)))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Classifies a framing-layer error.
///
/// A dropped connection mid-stream must end the turn, so it keeps its
/// transport identity; framing problems (invalid UTF-8, bad SSE syntax)
/// are decode failures like any malformed payload.
fn classify_stream_error<E>(e: &EventStreamError<E>) -> ClientError
where
    E: std::error::Error,
{
    match e {
        EventStreamError::Transport(inner) => {
            ClientError::transport(format!("SSE transport error: {inner}"))
        }
        EventStreamError::Utf8(_) | EventStreamError::Parser(_) => ClientError::new(
            ClientErrorKind::Parse,
            format!("SSE stream error: {e}"),
        ),
    }
}

/// Decodes one named SSE event into a `GraphEvent`.
fn decode_event(event_type: &str, data: &str) -> ClientResult<GraphEvent> {
    match event_type {
        "thread" => {
            let parsed: ThreadData = decode_data(event_type, data)?;
            Ok(GraphEvent::Thread {
                thread_id: parsed.thread_id,
            })
        }
        "message" => {
            let parsed: MessageData = decode_data(event_type, data)?;
            Ok(GraphEvent::Message {
                thread_id: parsed.thread_id,
                content: parsed.content,
                speaker: parsed.speaker,
            })
        }
        "ask_user" => {
            let parsed: AskUserData = decode_data(event_type, data)?;
            Ok(GraphEvent::AskUser {
                thread_id: parsed.thread_id,
                speaker: parsed.speaker,
                question: parsed.question,
            })
        }
        "final" => {
            let parsed: FinalData = decode_data(event_type, data)?;
            Ok(GraphEvent::Final {
                thread_id: parsed.thread_id,
                message: parsed.message,
            })
        }
        other => Err(ClientError::new(
            ClientErrorKind::Parse,
            format!("Unknown graph event type: {other}"),
        )),
    }
}

fn decode_data<'a, T: Deserialize<'a>>(event_type: &str, data: &'a str) -> ClientResult<T> {
    if data.trim().is_empty() {
        return Err(ClientError::new(
            ClientErrorKind::Parse,
            format!("Missing data for {event_type}"),
        ));
    }
    serde_json::from_str(data).map_err(|err| {
        ClientError::new(
            ClientErrorKind::Parse,
            format!("Failed to parse {event_type}: {err}"),
        )
    })
}

// === SSE payload structures ===

#[derive(Debug, Deserialize)]
struct ThreadData {
    thread_id: String,
}

#[derive(Debug, Deserialize)]
struct MessageData {
    thread_id: String,
    content: String,
    #[serde(default)]
    speaker: Option<Speaker>,
}

#[derive(Debug, Deserialize)]
struct AskUserData {
    thread_id: String,
    #[serde(default)]
    speaker: Option<Speaker>,
    #[serde(default)]
    question: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FinalData {
    thread_id: String,
    #[serde(default)]
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;

    /// SSE fixture simulating a typical start-stream turn ending in a question.
    const SSE_START_TURN: &str = r#"event: thread
data: {"thread_id":"abc"}

event: message
data: {"thread_id":"abc","content":"Can you describe the pain?","speaker":"GP"}

event: ask_user
data: {"thread_id":"abc","speaker":"GP"}

"#;

    /// SSE fixture simulating a resume turn ending in a final report.
    const SSE_RESUME_TURN: &str = r#"event: message
data: {"thread_id":"abc","content":"Reviewing your answers now.","speaker":"Specialist"}

event: final
data: {"thread_id":"abc","message":"Diagnosis complete."}

"#;

    /// Helper to create a mock byte stream from a string
    fn mock_byte_stream(
        data: &str,
    ) -> impl Stream<Item = std::result::Result<bytes::Bytes, std::io::Error>> {
        let chunks: Vec<_> = data
            .as_bytes()
            .chunks(50) // Simulate chunked delivery
            .map(|c| Ok(bytes::Bytes::copy_from_slice(c)))
            .collect();
        futures_util::stream::iter(chunks)
    }

    async fn collect(data: &str) -> Vec<ClientResult<GraphEvent>> {
        let mut parser = SseParser::new(mock_byte_stream(data));
        let mut events = Vec::new();
        while let Some(result) = parser.next().await {
            events.push(result);
        }
        events
    }

    #[tokio::test]
    async fn parses_start_turn_events() {
        let events: Vec<_> = collect(SSE_START_TURN)
            .await
            .into_iter()
            .map(|r| r.expect("valid event"))
            .collect();

        assert_eq!(
            events,
            vec![
                GraphEvent::Thread {
                    thread_id: "abc".into()
                },
                GraphEvent::Message {
                    thread_id: "abc".into(),
                    content: "Can you describe the pain?".into(),
                    speaker: Some(Speaker::Gp),
                },
                GraphEvent::AskUser {
                    thread_id: "abc".into(),
                    speaker: Some(Speaker::Gp),
                    question: None,
                },
            ]
        );
    }

    #[tokio::test]
    async fn parses_resume_turn_with_final() {
        let events: Vec<_> = collect(SSE_RESUME_TURN)
            .await
            .into_iter()
            .map(|r| r.expect("valid event"))
            .collect();

        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            GraphEvent::Final {
                thread_id: "abc".into(),
                message: Some("Diagnosis complete.".into()),
            }
        );
    }

    #[tokio::test]
    async fn final_with_null_message_decodes_to_none() {
        let data = "event: final\ndata: {\"thread_id\":\"t1\",\"message\":null}\n\n";
        let events = collect(data).await;
        assert_eq!(
            events[0].as_ref().unwrap(),
            &GraphEvent::Final {
                thread_id: "t1".into(),
                message: None,
            }
        );
    }

    #[tokio::test]
    async fn ask_user_without_speaker_decodes_to_none() {
        let data = "event: ask_user\ndata: {\"thread_id\":\"t1\"}\n\n";
        let events = collect(data).await;
        assert_eq!(
            events[0].as_ref().unwrap(),
            &GraphEvent::AskUser {
                thread_id: "t1".into(),
                speaker: None,
                question: None,
            }
        );
    }

    #[tokio::test]
    async fn ask_user_with_question_carries_it() {
        let data = "event: ask_user\ndata: {\"thread_id\":\"t1\",\"question\":\"How long?\"}\n\n";
        let events = collect(data).await;
        assert_eq!(
            events[0].as_ref().unwrap(),
            &GraphEvent::AskUser {
                thread_id: "t1".into(),
                speaker: None,
                question: Some("How long?".into()),
            }
        );
    }

    #[tokio::test]
    async fn unknown_event_yields_parse_error_and_stream_continues() {
        let data = "event: heartbeat\ndata: {}\n\nevent: thread\ndata: {\"thread_id\":\"t1\"}\n\n";
        let events = collect(data).await;

        assert_eq!(events.len(), 2);
        let err = events[0].as_ref().unwrap_err();
        assert_eq!(err.kind, ClientErrorKind::Parse);
        assert_eq!(
            events[1].as_ref().unwrap(),
            &GraphEvent::Thread {
                thread_id: "t1".into()
            }
        );
    }

    #[tokio::test]
    async fn malformed_payload_yields_parse_error_and_stream_continues() {
        let data = "event: message\ndata: {not json}\n\nevent: ask_user\ndata: {\"thread_id\":\"t1\"}\n\n";
        let events = collect(data).await;

        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0].as_ref().unwrap_err().kind,
            ClientErrorKind::Parse
        );
        assert!(events[1].as_ref().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn handles_events_split_across_chunks() {
        let data = "event: message\ndata: {\"thread_id\":\"t1\",\"content\":\"split across chunks\"}\n\n";
        let chunks: Vec<std::result::Result<bytes::Bytes, std::io::Error>> = data
            .as_bytes()
            .chunks(7) // Very small chunks
            .map(|c| Ok(bytes::Bytes::copy_from_slice(c)))
            .collect();
        let mut parser = SseParser::new(futures_util::stream::iter(chunks));

        let event = parser.next().await.unwrap().expect("valid event");
        assert_eq!(
            event,
            GraphEvent::Message {
                thread_id: "t1".into(),
                content: "split across chunks".into(),
                speaker: None,
            }
        );
        assert!(parser.next().await.is_none());
    }

    #[tokio::test]
    async fn handles_crlf_line_endings() {
        let data = "event: thread\r\ndata: {\"thread_id\":\"t1\"}\r\n\r\n";
        let events = collect(data).await;
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].as_ref().unwrap(),
            &GraphEvent::Thread {
                thread_id: "t1".into()
            }
        );
    }

    #[tokio::test]
    async fn data_only_events_default_to_message_type() {
        // Per the SSE spec an event without an `event:` line has type
        // "message", which is a real graph event for this protocol.
        let data = "data: {\"thread_id\":\"t1\",\"content\":\"hi\",\"speaker\":\"Assistant\"}\n\n";
        let events = collect(data).await;
        assert_eq!(
            events[0].as_ref().unwrap(),
            &GraphEvent::Message {
                thread_id: "t1".into(),
                content: "hi".into(),
                speaker: Some(Speaker::Assistant),
            }
        );
    }

    #[tokio::test]
    async fn mid_stream_connection_drop_is_a_transport_error() {
        let chunks: Vec<std::result::Result<bytes::Bytes, std::io::Error>> = vec![
            Ok(bytes::Bytes::from_static(
                b"event: thread\ndata: {\"thread_id\":\"t1\"}\n\n",
            )),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )),
        ];
        let mut parser = SseParser::new(futures_util::stream::iter(chunks));

        let first = parser.next().await.unwrap().expect("valid event");
        assert_eq!(
            first,
            GraphEvent::Thread {
                thread_id: "t1".into()
            }
        );

        let err = parser.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind, ClientErrorKind::Transport);
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn unknown_speaker_is_a_parse_error() {
        let data = "event: message\ndata: {\"thread_id\":\"t1\",\"content\":\"hi\",\"speaker\":\"Janitor\"}\n\n";
        let events = collect(data).await;
        assert_eq!(
            events[0].as_ref().unwrap_err().kind,
            ClientErrorKind::Parse
        );
    }
}
