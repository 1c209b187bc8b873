use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pulselink::credential::mock::MockCredentialProvider;
use pulselink::transport::mock::{MockTransportFactory, ScriptedAttempt};
use pulselink::{
    BackoffPolicy, Credential, CredentialProvider, ErrorKind, SessionConfig, SessionContext,
    SessionController, SessionError, SessionState, TransportEvent,
};

const CREDENTIAL_TTL: Duration = Duration::from_secs(60);

fn fast_config(session_id: &str) -> SessionConfig {
    let mut config = SessionConfig::new(session_id);
    config.connect_timeout = Duration::from_millis(200);
    config.backoff = BackoffPolicy {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(60),
        factor: 1.5,
        max_attempts: 2,
    };
    config
}

fn controller_with(
    config: SessionConfig,
) -> (
    Arc<SessionController>,
    Arc<MockCredentialProvider>,
    Arc<MockTransportFactory>,
) {
    let _ = env_logger::builder().is_test(true).try_init();
    let credentials = Arc::new(MockCredentialProvider::new(CREDENTIAL_TTL));
    let factory = MockTransportFactory::new();
    let session = SessionController::new(config, credentials.clone(), factory.clone());
    (session, credentials, factory)
}

async fn wait_for_state(session: &Arc<SessionController>, want: SessionState, timeout: Duration) {
    let mut rx = session.watch_state();
    let result = tokio::time::timeout(timeout, async {
        loop {
            if *rx.borrow_and_update() == want {
                return;
            }
            if rx.changed().await.is_err() {
                panic!("state channel closed while waiting for {want}");
            }
        }
    })
    .await;
    if result.is_err() {
        panic!("timed out waiting for {want}, current state {}", session.state());
    }
}

#[tokio::test]
async fn exhausting_attempts_reaches_failed_and_stops_retrying() {
    let (session, _credentials, factory) = controller_with(fast_config("chat-exhaust"));
    for _ in 0..8 {
        factory.script_attempt(ScriptedAttempt::FailConnect("connection refused".into()));
    }
    let mut errors = session.event_bus.subscribe_error();

    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, SessionError::RetriesExhausted));
    assert_eq!(session.state(), SessionState::Failed);

    // Initial attempt plus max_attempts retries.
    assert_eq!(factory.connect_count(), 3);

    // No further reconnection timers fire after the terminal failure.
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(factory.connect_count(), 3);
    assert_eq!(session.state(), SessionState::Failed);

    // Three transport errors, then the exhaustion error.
    let mut kinds = Vec::new();
    for _ in 0..4 {
        kinds.push(errors.recv().await.unwrap().kind);
    }
    assert_eq!(kinds, vec![ErrorKind::Transport; 4]);
    assert!(session.retry_state().await.is_none());
}

#[tokio::test]
async fn credential_failure_fails_immediately_without_transport_calls() {
    let (session, credentials, factory) = controller_with(fast_config("chat-cred"));
    credentials.set_fail(true);
    let mut errors = session.event_bus.subscribe_error();

    let err = session.connect().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Credential);
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(factory.connect_count(), 0);
    assert_eq!(errors.recv().await.unwrap().kind, ErrorKind::Credential);
}

#[tokio::test]
async fn connect_timeout_without_auto_reconnect_is_terminal() {
    let mut config = fast_config("chat-timeout");
    config.auto_reconnect = false;
    config.connect_timeout = Duration::from_millis(50);
    let (session, _credentials, factory) = controller_with(config);
    factory.script_attempt(ScriptedAttempt::Hang);

    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, SessionError::Timeout(_)));
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(factory.connect_count(), 1);
}

#[tokio::test]
async fn successful_connection_resets_the_attempt_counter() {
    let (session, _credentials, factory) = controller_with(fast_config("chat-reset"));
    factory.script_attempt(ScriptedAttempt::FailConnect("first attempt refused".into()));

    session.connect().await.unwrap();
    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(factory.connect_count(), 2);
    assert!(session.retry_state().await.is_none());
    assert!(session.last_connected_at().await.is_some());

    // Drop the connection; the controller reconnects on its own, starting
    // backoff from attempt 1 again.
    factory
        .latest_event_sender()
        .unwrap()
        .send(TransportEvent::Disconnected(
            pulselink::DisconnectReason::NetworkLost,
        ))
        .await
        .unwrap();

    let reconnected = tokio::time::timeout(Duration::from_secs(2), async {
        while factory.connect_count() < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(reconnected.is_ok(), "session never reconnected");
    wait_for_state(&session, SessionState::Connected, Duration::from_secs(2)).await;
    assert!(session.retry_state().await.is_none());

    session.dispose().await;
}

#[tokio::test]
async fn explicit_disconnect_cancels_pending_reconnection() {
    let mut config = fast_config("chat-cancel");
    config.backoff.initial_delay = Duration::from_millis(300);
    config.backoff.max_delay = Duration::from_millis(600);
    config.backoff.max_attempts = 5;
    let (session, _credentials, factory) = controller_with(config);
    for _ in 0..8 {
        factory.script_attempt(ScriptedAttempt::FailConnect("connection refused".into()));
    }

    let connecting = {
        let session = session.clone();
        tokio::spawn(async move { session.connect().await })
    };

    wait_for_state(&session, SessionState::Reconnecting, Duration::from_secs(2)).await;
    let attempts_before = factory.connect_count();

    session.disconnect().await;
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(connecting.await.unwrap().is_err());

    // The pending backoff timer never fires another attempt.
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(factory.connect_count(), attempts_before);
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn disposing_while_reconnecting_prevents_any_further_connects() {
    let mut config = fast_config("chat-dispose");
    config.backoff.initial_delay = Duration::from_millis(300);
    config.backoff.max_delay = Duration::from_millis(600);
    config.backoff.max_attempts = 5;
    let (session, _credentials, factory) = controller_with(config);
    for _ in 0..8 {
        factory.script_attempt(ScriptedAttempt::FailConnect("connection refused".into()));
    }

    let connecting = {
        let session = session.clone();
        tokio::spawn(async move { session.connect().await })
    };

    wait_for_state(&session, SessionState::Reconnecting, Duration::from_secs(2)).await;
    let attempts_before = factory.connect_count();

    session.dispose().await;
    assert_eq!(session.state(), SessionState::Idle);
    assert!(connecting.await.unwrap().is_err());

    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(factory.connect_count(), attempts_before);
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.current_credential().await.is_none());
}

#[tokio::test]
async fn second_connect_while_connecting_is_rejected() {
    let mut config = fast_config("chat-double");
    config.connect_timeout = Duration::from_secs(5);
    let (session, _credentials, factory) = controller_with(config);
    factory.script_attempt(ScriptedAttempt::Hang);

    let first = {
        let session = session.clone();
        tokio::spawn(async move { session.connect().await })
    };
    wait_for_state(&session, SessionState::Connecting, Duration::from_secs(1)).await;

    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, SessionError::AlreadyConnecting));

    session.dispose().await;
    assert!(first.await.unwrap().is_err());
}

#[tokio::test]
async fn send_requires_a_live_connection() {
    let (session, _credentials, _factory) = controller_with(fast_config("chat-send"));
    let err = session.send(b"hello").await.unwrap_err();
    assert!(matches!(err, SessionError::NotConnected));
}

#[tokio::test]
async fn connected_session_relays_messages_and_sends() {
    let (session, _credentials, factory) = controller_with(fast_config("chat-relay"));
    let mut messages = session.event_bus.subscribe_message();

    session.connect().await.unwrap();
    assert_eq!(
        factory.last_credential().unwrap().channel,
        "channel-chat-relay"
    );

    factory
        .latest_event_sender()
        .unwrap()
        .send(TransportEvent::Message(bytes::Bytes::from_static(
            b"{\"text\":\"hi\"}",
        )))
        .await
        .unwrap();
    let inbound = messages.recv().await.unwrap();
    assert_eq!(&inbound.payload[..], b"{\"text\":\"hi\"}");

    session.send(b"{\"text\":\"hello back\"}").await.unwrap();
    factory.with_calls(|calls| {
        assert_eq!(calls.sent, vec![b"{\"text\":\"hello back\"}".to_vec()]);
    });

    session.disconnect().await;
    assert_eq!(session.state(), SessionState::Disconnected);
}

struct HangingCredentials;

#[async_trait]
impl CredentialProvider for HangingCredentials {
    async fn get_credential(&self, _ctx: &SessionContext) -> Result<Credential, anyhow::Error> {
        std::future::pending::<()>().await;
        unreachable!()
    }
}

#[tokio::test]
async fn hung_credential_provider_is_bounded_by_the_connect_timeout() {
    let mut config = fast_config("chat-hung-auth");
    config.auto_reconnect = false;
    config.connect_timeout = Duration::from_millis(50);
    let factory = MockTransportFactory::new();
    let session = SessionController::new(config, Arc::new(HangingCredentials), factory.clone());

    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, SessionError::Timeout(_)));
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(factory.connect_count(), 0);
}

#[tokio::test]
async fn only_the_latest_keepalive_loop_survives_reconnect_cycles() {
    let mut config = fast_config("chat-keepalive-single");
    config.backoff.max_attempts = 5;
    config.keepalive_interval_min = Duration::from_millis(40);
    config.keepalive_interval_max = Duration::from_millis(40);
    let (session, _credentials, factory) = controller_with(config);

    session.connect().await.unwrap();

    // Three unexpected drops, each recovered by an automatic reconnect.
    // Each recovery spawns a fresh keepalive loop for the new transport.
    for expected in 2..=4u32 {
        factory
            .latest_event_sender()
            .unwrap()
            .send(TransportEvent::Disconnected(
                pulselink::DisconnectReason::NetworkLost,
            ))
            .await
            .unwrap();
        let reconnected = tokio::time::timeout(Duration::from_secs(2), async {
            while factory.connect_count() < expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(reconnected.is_ok(), "no reconnect after drop {expected}");
        wait_for_state(&session, SessionState::Connected, Duration::from_secs(2)).await;
    }

    // A single 40ms loop fits roughly ten pings into the window; loops
    // leaked from the three earlier connections would multiply that.
    let before = factory.with_calls(|calls| calls.pings);
    tokio::time::sleep(Duration::from_millis(400)).await;
    let delta = factory.with_calls(|calls| calls.pings) - before;
    assert!(delta <= 15, "stale keepalive loops still pinging: {delta}");
    assert!(delta >= 4, "keepalive stopped pinging: {delta}");

    session.dispose().await;
}

#[tokio::test]
async fn keepalive_failure_past_the_window_forces_a_reconnect() {
    let mut config = fast_config("chat-keepalive");
    config.keepalive_interval_min = Duration::from_millis(20);
    config.keepalive_interval_max = Duration::from_millis(30);
    config.keepalive_max_fail_time = Duration::from_millis(70);
    let (session, _credentials, factory) = controller_with(config);
    factory.set_fail_ping(true);

    session.connect().await.unwrap();

    // Pings fail continuously; once the window elapses the transport is
    // torn down and the reconnect path produces a fresh connection.
    let reconnected = tokio::time::timeout(Duration::from_secs(2), async {
        while factory.connect_count() < 2 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(reconnected.is_ok(), "keepalive never forced a reconnect");
    factory.with_calls(|calls| assert!(calls.pings >= 2));

    session.dispose().await;
}
