//! Sync client tests against scripted connections
//!
//! The connection factory hands out scripted readers and a recording writer,
//! so the event loop can be exercised without a network.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use preamp_remote::io::{ConnectionFactory, ConnectionPair, FrameReader, FrameWriter};
use preamp_remote::{
    AdjustSeparator, Config, ConnectionState, FixedCommand, MemoryPanel, PanelConfig,
    RemoteError, SyncClient, SyncEvent,
};
use tokio::sync::broadcast;

// ============================================================================
// Scripted connections
// ============================================================================

struct ScriptedReader {
    frames: VecDeque<String>,
    hold_open: bool,
}

#[async_trait]
impl FrameReader for ScriptedReader {
    async fn next_frame(&mut self) -> preamp_remote::Result<Option<String>> {
        match self.frames.pop_front() {
            Some(frame) => Ok(Some(frame)),
            None if self.hold_open => std::future::pending().await,
            None => Ok(None),
        }
    }
}

struct RecordingWriter {
    sent: Arc<StdMutex<Vec<String>>>,
}

#[async_trait]
impl FrameWriter for RecordingWriter {
    async fn send_frame(&mut self, frame: &str) -> preamp_remote::Result<()> {
        self.sent.lock().unwrap().push(frame.to_string());
        Ok(())
    }

    async fn close(&mut self) -> preamp_remote::Result<()> {
        Ok(())
    }
}

struct Script {
    frames: Vec<String>,
    hold_open: bool,
}

struct ScriptedFactory {
    scripts: StdMutex<VecDeque<Script>>,
    attempts: StdMutex<Vec<Instant>>,
    sent: Arc<StdMutex<Vec<String>>>,
}

impl ScriptedFactory {
    fn new() -> Self {
        Self {
            scripts: StdMutex::new(VecDeque::new()),
            attempts: StdMutex::new(Vec::new()),
            sent: Arc::new(StdMutex::new(Vec::new())),
        }
    }

    /// A connection that delivers `frames` and then stays open
    fn add_open(&self, frames: &[&str]) {
        self.add(frames, true);
    }

    /// A connection that delivers `frames` and then closes
    fn add_closing(&self, frames: &[&str]) {
        self.add(frames, false);
    }

    fn add(&self, frames: &[&str], hold_open: bool) {
        self.scripts.lock().unwrap().push_back(Script {
            frames: frames.iter().map(|f| f.to_string()).collect(),
            hold_open,
        });
    }

    fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }

    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConnectionFactory for ScriptedFactory {
    async fn connect(
        &self,
        _url: &str,
        _timeout: Duration,
    ) -> preamp_remote::Result<ConnectionPair> {
        self.attempts.lock().unwrap().push(Instant::now());

        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(script) => Ok(ConnectionPair {
                reader: Box::new(ScriptedReader {
                    frames: script.frames.into(),
                    hold_open: script.hold_open,
                }),
                writer: Box::new(RecordingWriter {
                    sent: Arc::clone(&self.sent),
                }),
            }),
            None => Err(RemoteError::ConnectionFailed(
                "No scripted connections left".to_string(),
            )),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn test_config(interval_ms: u64) -> Config {
    let mut config = Config::default();
    config.reconnect.interval_ms = interval_ms;
    config
}

fn default_panel() -> MemoryPanel {
    MemoryPanel::new(PanelConfig::default().elements)
}

fn start(
    config: &Config,
    factory: &Arc<ScriptedFactory>,
) -> (
    preamp_remote::ClientHandle,
    broadcast::Receiver<SyncEvent>,
    tokio::task::JoinHandle<MemoryPanel>,
) {
    let client =
        SyncClient::with_connection_factory(config, default_panel(), factory.clone()).unwrap();
    let handle = client.handle();
    let events = handle.subscribe();
    let task = tokio::spawn(client.run());
    (handle, events, task)
}

/// Wait for the next event matching `predicate`
async fn wait_for<F>(events: &mut broadcast::Receiver<SyncEvent>, mut predicate: F) -> SyncEvent
where
    F: FnMut(&SyncEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn is_state_applied(event: &SyncEvent) -> bool {
    matches!(event, SyncEvent::StateApplied { .. })
}

fn is_connected(event: &SyncEvent) -> bool {
    matches!(event, SyncEvent::Connected)
}

// ============================================================================
// Open / getValues
// ============================================================================

#[tokio::test]
async fn test_open_requests_values_first() {
    let factory = Arc::new(ScriptedFactory::new());
    factory.add_open(&[r#"{"Volume": 20, "Input": 1, "Power": "On"}"#]);

    let (handle, mut events, task) = start(&test_config(50), &factory);
    wait_for(&mut events, is_state_applied).await;
    assert_eq!(handle.connection_state().await, ConnectionState::Open);

    handle.shutdown();
    let panel = task.await.unwrap();

    assert_eq!(factory.sent(), vec!["getValues".to_string()]);
    assert_eq!(panel.value("Volume"), Some("20"));
    assert_eq!(panel.text("VolumeValue"), Some("20"));
    assert_eq!(panel.value("Input"), Some("1"));
    assert_eq!(panel.text("Power"), Some("On"));
}

#[tokio::test]
async fn test_volume_steps_sets_range() {
    let factory = Arc::new(ScriptedFactory::new());
    factory.add_open(&[r#"{"Volume": 7, "VolumeSteps": 10}"#]);

    let (handle, mut events, task) = start(&test_config(50), &factory);
    let event = wait_for(&mut events, is_state_applied).await;
    handle.shutdown();
    let panel = task.await.unwrap();

    match event {
        SyncEvent::StateApplied { report, .. } => assert!(report.is_complete()),
        _ => unreachable!(),
    }
    assert_eq!(panel.max("Volume"), Some("10"));
    assert_eq!(panel.value("Volume"), Some("7"));
    assert_eq!(panel.text("Volume"), Some("7"));
    assert_eq!(panel.text("VolumeValue"), Some("7"));
}

#[tokio::test]
async fn test_connected_event_precedes_get_values() {
    let factory = Arc::new(ScriptedFactory::new());
    factory.add_open(&[]);

    let (handle, mut events, task) = start(&test_config(50), &factory);
    wait_for(&mut events, is_connected).await;
    let sent = wait_for(&mut events, |e| matches!(e, SyncEvent::CommandSent { .. })).await;
    handle.shutdown();
    task.await.unwrap();

    match sent {
        SyncEvent::CommandSent { frame } => assert_eq!(frame, "getValues"),
        _ => unreachable!(),
    }
}

// ============================================================================
// Reconnection
// ============================================================================

#[tokio::test]
async fn test_reconnects_after_close_with_fixed_delay() {
    let factory = Arc::new(ScriptedFactory::new());
    factory.add_closing(&[]);
    factory.add_open(&[r#"{"Power": "On"}"#]);

    let (handle, mut events, task) = start(&test_config(100), &factory);
    wait_for(&mut events, |e| matches!(e, SyncEvent::Disconnected { .. })).await;

    // only the first attempt before the delay elapses
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(factory.attempts().len(), 1);

    wait_for(&mut events, is_state_applied).await;
    handle.shutdown();
    let panel = task.await.unwrap();

    let attempts = factory.attempts();
    assert_eq!(attempts.len(), 2);
    assert!(attempts[1] - attempts[0] >= Duration::from_millis(100));
    assert_eq!(
        factory.sent(),
        vec!["getValues".to_string(), "getValues".to_string()]
    );
    assert_eq!(panel.value("Power"), Some("On"));
}

#[tokio::test]
async fn test_failed_connects_retry_without_limit() {
    let factory = Arc::new(ScriptedFactory::new());

    let (handle, mut events, task) = start(&test_config(20), &factory);
    for attempt in 1..=5 {
        let event = wait_for(&mut events, |e| matches!(e, SyncEvent::Connecting { .. })).await;
        match event {
            SyncEvent::Connecting { attempt: n } => assert_eq!(n, attempt),
            _ => unreachable!(),
        }
    }
    handle.shutdown();
    task.await.unwrap();

    let attempts = factory.attempts();
    assert!(attempts.len() >= 5);
    for pair in attempts.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(20));
    }
    assert!(factory.sent().is_empty());
}

#[tokio::test]
async fn test_each_close_schedules_one_attempt() {
    let factory = Arc::new(ScriptedFactory::new());
    factory.add_closing(&[]);
    factory.add_closing(&[]);
    factory.add_open(&[]);

    let (handle, mut events, task) = start(&test_config(30), &factory);
    for _ in 0..3 {
        wait_for(&mut events, is_connected).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.shutdown();
    task.await.unwrap();

    assert_eq!(factory.attempts().len(), 3);
    assert_eq!(factory.sent().len(), 3);
    assert!(factory.sent().iter().all(|f| f == "getValues"));
}

// ============================================================================
// Inbound messages
// ============================================================================

#[tokio::test]
async fn test_malformed_message_is_dropped() {
    let factory = Arc::new(ScriptedFactory::new());
    factory.add_open(&["not json", r#"{"Input": 4}"#]);

    let (handle, mut events, task) = start(&test_config(50), &factory);
    wait_for(&mut events, |e| matches!(e, SyncEvent::PayloadRejected { .. })).await;
    wait_for(&mut events, is_state_applied).await;
    handle.shutdown();
    let panel = task.await.unwrap();

    assert_eq!(factory.attempts().len(), 1);
    assert_eq!(panel.value("Input"), Some("4"));
}

#[tokio::test]
async fn test_unknown_field_reported_missing() {
    let factory = Arc::new(ScriptedFactory::new());
    factory.add_open(&[r#"{"Balance": 3, "Power": "Off"}"#]);

    let (handle, mut events, task) = start(&test_config(50), &factory);
    let event = wait_for(&mut events, is_state_applied).await;
    handle.shutdown();
    let panel = task.await.unwrap();

    match event {
        SyncEvent::StateApplied { report, .. } => {
            assert_eq!(report.missing, vec!["Balance".to_string()]);
        }
        _ => unreachable!(),
    }
    assert_eq!(panel.value("Power"), Some("Off"));
}

#[tokio::test]
async fn test_repeated_snapshot_is_idempotent() {
    let snapshot = r#"{"Volume": 12, "VolumeSteps": 64, "Input": 2, "Temp1": 35}"#;

    let once_factory = Arc::new(ScriptedFactory::new());
    once_factory.add_open(&[snapshot]);
    let (handle, mut events, task) = start(&test_config(50), &once_factory);
    wait_for(&mut events, is_state_applied).await;
    handle.shutdown();
    let once = task.await.unwrap();

    let twice_factory = Arc::new(ScriptedFactory::new());
    twice_factory.add_open(&[snapshot, snapshot]);
    let (handle, mut events, task) = start(&test_config(50), &twice_factory);
    wait_for(&mut events, is_state_applied).await;
    wait_for(&mut events, is_state_applied).await;
    handle.shutdown();
    let twice = task.await.unwrap();

    assert_eq!(once, twice);
}

// ============================================================================
// Outbound commands
// ============================================================================

#[tokio::test]
async fn test_adjust_echoes_and_sends_colon_encoding() {
    let factory = Arc::new(ScriptedFactory::new());
    factory.add_open(&[]);

    let (handle, mut events, task) = start(&test_config(50), &factory);
    wait_for(&mut events, |e| matches!(e, SyncEvent::CommandSent { .. })).await;

    handle.adjust("Input", "3").unwrap();
    let event = wait_for(&mut events, |e| matches!(e, SyncEvent::CommandSent { .. })).await;
    handle.shutdown();
    let panel = task.await.unwrap();

    match event {
        SyncEvent::CommandSent { frame } => assert_eq!(frame, "Input:3"),
        _ => unreachable!(),
    }
    assert_eq!(panel.text("Input"), Some("3"));
    assert_eq!(panel.value("Input"), Some("3"));
    assert_eq!(
        factory.sent(),
        vec!["getValues".to_string(), "Input:3".to_string()]
    );
}

#[tokio::test]
async fn test_adjust_with_letter_s_encoding() {
    let factory = Arc::new(ScriptedFactory::new());
    factory.add_open(&[]);
    let mut config = test_config(50);
    config.commands.separator = AdjustSeparator::LetterS;

    let (handle, mut events, task) = start(&config, &factory);
    wait_for(&mut events, |e| matches!(e, SyncEvent::CommandSent { .. })).await;

    handle.adjust("Input", "3").unwrap();
    wait_for(&mut events, |e| matches!(e, SyncEvent::CommandSent { .. })).await;
    handle.shutdown();
    task.await.unwrap();

    assert_eq!(factory.sent()[1], "Inputs3");
}

#[tokio::test]
async fn test_fixed_commands_sent_verbatim() {
    let factory = Arc::new(ScriptedFactory::new());
    factory.add_open(&[]);

    let (handle, mut events, task) = start(&test_config(50), &factory);
    wait_for(&mut events, |e| matches!(e, SyncEvent::CommandSent { .. })).await;

    let commands = [
        FixedCommand::PowerToggle,
        FixedCommand::VolumeUp,
        FixedCommand::VolumeDown,
        FixedCommand::InputUp,
        FixedCommand::InputDown,
    ];
    for command in commands {
        handle.send_fixed(command).unwrap();
        wait_for(&mut events, |e| matches!(e, SyncEvent::CommandSent { .. })).await;
    }
    handle.shutdown();
    let panel = task.await.unwrap();

    assert_eq!(
        factory.sent(),
        vec![
            "getValues",
            "Power:Toggle",
            "Volume:Up",
            "Volume:Down",
            "Input:Up",
            "Input:Down"
        ]
    );
    // fixed commands never touch the panel
    assert_eq!(panel, default_panel());
}

#[tokio::test]
async fn test_commands_before_open_are_dropped() {
    let factory = Arc::new(ScriptedFactory::new());

    let (handle, mut events, task) = start(&test_config(1000), &factory);
    wait_for(&mut events, |e| matches!(e, SyncEvent::Disconnected { .. })).await;

    handle.send_fixed(FixedCommand::PowerToggle).unwrap();
    handle.adjust("Volume", "30").unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    handle.shutdown();
    let panel = task.await.unwrap();

    assert!(factory.sent().is_empty());
    // the local echo still happens
    assert_eq!(panel.text("Volume"), Some("30"));
    assert_eq!(panel.value("Volume"), Some("30"));
}

#[tokio::test]
async fn test_shutdown_closes_connection() {
    let factory = Arc::new(ScriptedFactory::new());
    factory.add_open(&[]);

    let (handle, mut events, task) = start(&test_config(50), &factory);
    wait_for(&mut events, is_connected).await;

    handle.shutdown();
    task.await.unwrap();

    assert_eq!(handle.connection_state().await, ConnectionState::Closed);
    assert!(handle.send_fixed(FixedCommand::VolumeUp).is_err());
}
