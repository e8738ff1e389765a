//! Session behaviour against a scripted transport.

mod common;

use async_trait::async_trait;
use chat_stream_client::client::ReconnectState;
use chat_stream_client::{
    ChatPayload, Error, ErrorKind, RecordingSink, Result, RetryPolicy, SendOutcome, SessionEvent,
    SessionSink, StreamSession,
};
use common::{chunk, complete, sse, ScriptedTransport, StreamScript};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;

fn session(transport: Arc<ScriptedTransport>) -> (Arc<StreamSession>, RecordingSink) {
    let sink = RecordingSink::default();
    let session = StreamSession::new(transport, RetryPolicy::default(), Arc::new(sink.clone()));
    (Arc::new(session), sink)
}

fn payload() -> ChatPayload {
    ChatPayload::new("Explain ownership", "tutor-small")
}

fn count(events: &[SessionEvent], pred: impl Fn(&SessionEvent) -> bool) -> usize {
    events.iter().filter(|e| pred(e)).count()
}

#[tokio::test(start_paused = true)]
async fn single_attempt_streams_chunks_in_order() {
    let transport = Arc::new(ScriptedTransport::with_streams([
        StreamScript::frames_with_session(
            "srv-1",
            [
                sse(r#"{"type":"connected","channel":"chat:srv-1"}"#),
                chunk("Hel"),
                ": keepalive\n\nevent: heartbeat\ndata: {}\n\n".to_string(),
                chunk("lo"),
                complete("Hello"),
            ],
        ),
    ]));
    let (session, sink) = session(transport.clone());

    let outcome = session.send(payload()).await.unwrap();
    let SendOutcome::Completed(msg) = outcome else {
        panic!("expected completion, got {:?}", outcome);
    };
    assert_eq!(msg.content, "Hello");
    assert_eq!(msg.session_id, "srv-1");
    assert_eq!(msg.retries, 0);

    let events = sink.events();
    assert_eq!(
        events[..2],
        [
            SessionEvent::Message {
                delta: "Hel".to_string(),
                accumulated: "Hel".to_string()
            },
            SessionEvent::Message {
                delta: "lo".to_string(),
                accumulated: "Hello".to_string()
            },
        ]
    );
    assert!(matches!(events[2], SessionEvent::Complete(_)));
    assert_eq!(events.len(), 3);
    assert!(!session.is_streaming());
    assert_eq!(session.reconnect_state(), ReconnectState::Idle);
}

#[tokio::test(start_paused = true)]
async fn network_drop_then_success_reconnects_once() {
    let transport = Arc::new(ScriptedTransport::with_streams([
        // Body ends without a `complete` frame.
        StreamScript::frames([chunk("stale ")]),
        StreamScript::frames([chunk("Hel"), chunk("lo"), complete("Hello")]),
    ]));
    let (session, sink) = session(transport.clone());

    let started = tokio::time::Instant::now();
    let outcome = session.send(payload()).await.unwrap();
    let SendOutcome::Completed(msg) = outcome else {
        panic!("expected completion, got {:?}", outcome);
    };

    assert!(started.elapsed() >= Duration::from_millis(1000));
    assert_eq!(msg.content, "Hello");
    assert_eq!(msg.accumulated, "Hello");
    assert_eq!(msg.retries, 1);
    assert_eq!(transport.opens(), 2);

    let events = sink.events();
    assert_eq!(
        count(&events, |e| matches!(e, SessionEvent::Reconnecting { .. })),
        1
    );
    assert_eq!(count(&events, |e| matches!(e, SessionEvent::Complete(_))), 1);
    assert_eq!(count(&events, |e| matches!(e, SessionEvent::Error(_))), 0);
    match &events[1] {
        SessionEvent::Reconnecting {
            attempt,
            max_attempts,
            delay,
            error,
        } => {
            assert_eq!((*attempt, *max_attempts), (1, 3));
            assert_eq!(*delay, Duration::from_millis(1000));
            assert_eq!(error.kind, ErrorKind::Network);
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert_eq!(
        events[1].reconnect_notice().as_deref(),
        Some("Connection lost, reconnecting (1/3) in 1s")
    );

    // The resend is identical to the original request, same conversation id.
    let requests = transport.requests();
    assert_eq!(requests[0], requests[1]);
}

#[tokio::test(start_paused = true)]
async fn fourth_consecutive_failure_is_terminal() {
    let transport = Arc::new(ScriptedTransport::with_streams(
        (0..4).map(|_| StreamScript::network_failure()),
    ));
    let (session, sink) = session(transport.clone());

    let started = tokio::time::Instant::now();
    let outcome = session.send(payload()).await.unwrap();
    let SendOutcome::Failed(err) = outcome else {
        panic!("expected failure, got {:?}", outcome);
    };
    assert_eq!(err.kind, ErrorKind::Network);
    assert_eq!(transport.opens(), 4);
    // 1s + 2s + 4s of backoff.
    assert!(started.elapsed() >= Duration::from_millis(7000));

    let events = sink.events();
    let delays: Vec<Duration> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Reconnecting { delay, .. } => Some(*delay),
            _ => None,
        })
        .collect();
    assert_eq!(
        delays,
        vec![
            Duration::from_millis(1000),
            Duration::from_millis(2000),
            Duration::from_millis(4000)
        ]
    );
    assert_eq!(count(&events, |e| matches!(e, SessionEvent::Error(_))), 1);
    assert!(matches!(events.last(), Some(SessionEvent::Error(_))));
    assert_eq!(session.reconnect_state(), ReconnectState::Terminal);
}

#[tokio::test(start_paused = true)]
async fn auth_failure_is_not_retried() {
    let transport = Arc::new(ScriptedTransport::with_streams([StreamScript::OpenError(
        Error::http(401, "Invalid API key"),
    )]));
    let (session, sink) = session(transport.clone());

    let outcome = session.send(payload()).await.unwrap();
    let SendOutcome::Failed(err) = outcome else {
        panic!("expected failure, got {:?}", outcome);
    };
    assert_eq!(err.kind, ErrorKind::Auth);
    assert!(!err.recoverable);
    assert_eq!(transport.opens(), 1);
    assert_eq!(sink.events(), vec![SessionEvent::Error(err)]);
}

#[tokio::test(start_paused = true)]
async fn server_error_frame_goes_through_classifier() {
    let transport = Arc::new(ScriptedTransport::with_streams([StreamScript::frames([
        chunk("partial"),
        sse(r#"{"type":"error","message":"authentication failed for this account"}"#),
    ])]));
    let (session, sink) = session(transport.clone());

    let outcome = session.send(payload()).await.unwrap();
    assert!(matches!(outcome, SendOutcome::Failed(ref e) if e.kind == ErrorKind::Auth));
    assert_eq!(transport.opens(), 1);
    assert_eq!(count(&sink.events(), |e| matches!(e, SessionEvent::Error(_))), 1);
}

#[tokio::test(start_paused = true)]
async fn send_while_streaming_is_ignored() {
    let transport = Arc::new(ScriptedTransport::with_streams([StreamScript::Hang]));
    let (session, _sink) = session(transport.clone());

    let first = {
        let session = session.clone();
        tokio::spawn(async move { session.send(payload()).await })
    };
    transport.opened.notified().await;
    assert!(session.is_streaming());

    let second = session.send(payload()).await.unwrap();
    assert_eq!(second, SendOutcome::Ignored);
    assert_eq!(transport.opens(), 1);

    session.cancel();
    let first = first.await.unwrap().unwrap();
    assert_eq!(first, SendOutcome::Cancelled);
    assert!(!session.is_streaming());
}

#[tokio::test(start_paused = true)]
async fn cancel_during_backoff_stops_retrying() {
    let transport = Arc::new(ScriptedTransport::with_streams([
        StreamScript::network_failure(),
        StreamScript::network_failure(),
    ]));
    let (session, sink) = session(transport.clone());

    let handle = {
        let session = session.clone();
        tokio::spawn(async move { session.send(payload()).await })
    };
    transport.opened.notified().await;
    // Let the session reach its backoff sleep.
    tokio::task::yield_now().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    session.cancel();

    assert_eq!(handle.await.unwrap().unwrap(), SendOutcome::Cancelled);
    assert_eq!(transport.opens(), 1);
    assert_eq!(count(&sink.events(), |e| matches!(e, SessionEvent::Error(_))), 0);
    assert_eq!(session.reconnect_state(), ReconnectState::Idle);
}

#[tokio::test(start_paused = true)]
async fn server_session_id_is_adopted_and_kept() {
    let transport = Arc::new(ScriptedTransport::with_streams([
        StreamScript::frames_with_session("srv-42", [complete("one")]),
        StreamScript::frames_with_session("srv-other", [complete("two")]),
    ]));
    let (session, _sink) = session(transport.clone());

    session.send(payload()).await.unwrap();
    assert_eq!(session.session_id().as_deref(), Some("srv-42"));

    session.send(payload()).await.unwrap();
    assert_eq!(session.session_id().as_deref(), Some("srv-42"));
    assert_eq!(transport.requests()[1].session_id, "srv-42");
}

#[tokio::test(start_paused = true)]
async fn clear_history_starts_a_new_conversation() {
    let transport = Arc::new(ScriptedTransport::with_streams([
        StreamScript::frames([complete("one")]),
        StreamScript::frames([complete("two")]),
    ]));
    let (session, _sink) = session(transport.clone());

    session.send(payload()).await.unwrap();
    let first_id = session.session_id().unwrap();
    session.clear_history();
    assert_eq!(session.session_id(), None);

    session.send(payload()).await.unwrap();
    let requests = transport.requests();
    assert_eq!(requests[0].session_id, first_id);
    assert_ne!(requests[1].session_id, first_id);
}

#[tokio::test(start_paused = true)]
async fn retry_last_resends_the_previous_payload() {
    let transport = Arc::new(ScriptedTransport::with_streams([
        StreamScript::OpenError(Error::http(401, "Invalid API key")),
        StreamScript::frames([complete("second time lucky")]),
    ]));
    let (session, _sink) = session(transport.clone());

    assert_eq!(session.retry_last().await.unwrap(), SendOutcome::Ignored);
    assert!(matches!(
        session.send(payload()).await.unwrap(),
        SendOutcome::Failed(_)
    ));
    let outcome = session.retry_last().await.unwrap();
    assert!(matches!(outcome, SendOutcome::Completed(ref m) if m.content == "second time lucky"));
    let requests = transport.requests();
    assert_eq!(requests[0].message, requests[1].message);
}

#[tokio::test(start_paused = true)]
async fn idle_stream_times_out_and_reconnects() {
    let transport = Arc::new(ScriptedTransport::with_streams([
        StreamScript::Hang,
        StreamScript::frames([complete("after idle")]),
    ]));
    let sink = RecordingSink::default();
    let session = StreamSession::new(
        transport.clone(),
        RetryPolicy::default(),
        Arc::new(sink.clone()),
    )
    .with_idle_timeout(Some(Duration::from_secs(5)));

    let outcome = session.send(payload()).await.unwrap();
    assert!(matches!(outcome, SendOutcome::Completed(ref m) if m.content == "after idle"));
    match &sink.events()[0] {
        SessionEvent::Reconnecting { error, .. } => assert_eq!(error.kind, ErrorKind::Timeout),
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn empty_message_is_rejected_before_sending() {
    let transport = Arc::new(ScriptedTransport::new());
    let (session, sink) = session(transport.clone());

    let err = session
        .send(ChatPayload::new("   ", "tutor-small"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Runtime { .. }));
    assert_eq!(transport.opens(), 0);
    assert!(sink.is_empty());
    assert!(!session.is_streaming());
}

/// Records the streaming flag seen on each completion and chains one follow-up send.
#[derive(Default)]
struct ChainingSink {
    session: OnceLock<Weak<StreamSession>>,
    seen: Mutex<Vec<bool>>,
    chained: Mutex<Option<SendOutcome>>,
}

#[async_trait]
impl SessionSink for ChainingSink {
    async fn on_event(&self, event: SessionEvent) -> Result<()> {
        if !matches!(event, SessionEvent::Complete(_)) {
            return Ok(());
        }
        let Some(session) = self.session.get().and_then(Weak::upgrade) else {
            return Ok(());
        };
        let first = {
            let mut seen = self.seen.lock().unwrap();
            seen.push(session.is_streaming());
            seen.len() == 1
        };
        if first {
            let outcome = session
                .send(ChatPayload::new("and then?", "tutor-small"))
                .await?;
            *self.chained.lock().unwrap() = Some(outcome);
        }
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn completion_handler_can_send_the_next_message() {
    let transport = Arc::new(ScriptedTransport::with_streams([
        StreamScript::frames([chunk("first"), complete("first")]),
        StreamScript::frames([complete("second")]),
    ]));
    let sink = Arc::new(ChainingSink::default());
    let session = Arc::new(StreamSession::new(
        transport.clone(),
        RetryPolicy::default(),
        sink.clone(),
    ));
    sink.session.set(Arc::downgrade(&session)).unwrap();

    let outcome = session.send(payload()).await.unwrap();
    assert!(matches!(outcome, SendOutcome::Completed(ref m) if m.content == "first"));

    assert_eq!(*sink.seen.lock().unwrap(), vec![false, false]);
    let chained = sink.chained.lock().unwrap().clone();
    assert!(matches!(chained, Some(SendOutcome::Completed(ref m)) if m.content == "second"));
    assert_eq!(transport.opens(), 2);
    // The outer send finishing must not disturb the chained one's state.
    assert!(!session.is_streaming());
    assert_eq!(session.reconnect_state(), ReconnectState::Idle);
}

#[tokio::test(start_paused = true)]
async fn streaming_flag_is_clear_when_terminal_error_is_reported() {
    let transport = Arc::new(ScriptedTransport::with_streams([StreamScript::OpenError(
        Error::http(401, "Invalid API key"),
    )]));
    let flags = Arc::new(Mutex::new(Vec::new()));

    struct FlagSink {
        session: OnceLock<Weak<StreamSession>>,
        flags: Arc<Mutex<Vec<bool>>>,
    }

    #[async_trait]
    impl SessionSink for FlagSink {
        async fn on_event(&self, event: SessionEvent) -> Result<()> {
            if let (SessionEvent::Error(_), Some(session)) =
                (&event, self.session.get().and_then(Weak::upgrade))
            {
                self.flags.lock().unwrap().push(session.is_streaming());
            }
            Ok(())
        }
    }

    let sink = Arc::new(FlagSink {
        session: OnceLock::new(),
        flags: flags.clone(),
    });
    let session = Arc::new(StreamSession::new(
        transport,
        RetryPolicy::default(),
        sink.clone(),
    ));
    sink.session.set(Arc::downgrade(&session)).unwrap();

    session.send(payload()).await.unwrap();
    assert_eq!(*flags.lock().unwrap(), vec![false]);
}
