// Session bus subscription and run loop
// Reads NowPlaying signals and hands decoded events to the bridge

use crate::bridge::Bridge;
use crate::config::BusConfig;
use crate::error::BridgeError;
use crate::event::PlaybackEvent;
use anyhow::{Context, Result};
use futures_util::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use zbus::{message, Connection, MatchRule, Message, MessageStream};

/// Session bus connection plus the signal subscription held for the process lifetime
pub struct BusContext {
    connection: Connection,
    stream: MessageStream,
}

impl BusContext {
    /// Connect to the session bus and subscribe to the configured signal
    pub async fn connect(config: &BusConfig) -> Result<Self> {
        let connection = Connection::session()
            .await
            .context("Failed to connect to the session bus")?;

        let rule = match_rule(config)?;
        log::debug!("Adding match rule: {}", rule);

        let stream = MessageStream::for_match_rule(rule, &connection, None)
            .await
            .with_context(|| format!("Failed to subscribe to {} signals", config.signal_name))?;

        log::info!(
            "Subscribed to {} on the session bus as {}",
            config.signal_name,
            connection
                .unique_name()
                .map(|n| n.to_string())
                .unwrap_or_default()
        );

        Ok(Self { connection, stream })
    }

    /// Process signals until `cancel` fires or the bus goes away
    ///
    /// Submissions run one at a time on a worker so a slow service never blocks
    /// reading the bus; delivery order is preserved.
    pub async fn run(self, bridge: Arc<Bridge>, cancel: CancellationToken) -> Result<()> {
        let Self { connection, stream } = self;

        let outcome = dispatch(stream, bridge, cancel).await;
        drop(connection);

        outcome
    }
}

/// Decode every message from `stream` and queue it for the submission worker
///
/// Queued events are still submitted after `cancel` fires.
async fn dispatch<S>(mut stream: S, bridge: Arc<Bridge>, cancel: CancellationToken) -> Result<()>
where
    S: Stream<Item = zbus::Result<Message>> + Unpin,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let worker = tokio::spawn(submit_worker(bridge, rx));

    let outcome = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                log::info!("Shutting down");
                break Ok(());
            }
            message = stream.next() => match message {
                None => break Err(anyhow::anyhow!("Session bus connection closed")),
                Some(Err(e)) => log::warn!("Error reading from the session bus: {}", e),
                Some(Ok(message)) => match PlaybackEvent::from_message(&message) {
                    Ok(event) => {
                        log::debug!(
                            "Received {:?} for {} - {} (track {}, at {}s)",
                            event.code,
                            event.artist,
                            event.track,
                            event.track_number,
                            event.position
                        );
                        if tx.send(event).is_err() {
                            break Err(anyhow::anyhow!("Submission worker stopped"));
                        }
                    }
                    Err(e) => log::warn!("Ignoring signal from {}: {}", sender_of(&message), e),
                },
            },
        }
    };

    drop(tx);
    worker.await.context("Submission worker panicked")?;

    outcome
}

fn match_rule(config: &BusConfig) -> Result<MatchRule<'_>> {
    let mut builder = MatchRule::builder()
        .msg_type(message::Type::Signal)
        .member(config.signal_name.as_str())?;

    if let Some(interface) = &config.interface {
        builder = builder.interface(interface.as_str())?;
    }
    if let Some(path) = &config.path {
        builder = builder.path(path.as_str())?;
    }
    if let Some(sender) = &config.sender {
        builder = builder.sender(sender.as_str())?;
    }

    Ok(builder.build())
}

fn sender_of(message: &Message) -> String {
    message
        .header()
        .sender()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown sender".to_string())
}

async fn submit_worker(bridge: Arc<Bridge>, mut rx: mpsc::UnboundedReceiver<PlaybackEvent>) {
    while let Some(event) = rx.recv().await {
        let bridge = bridge.clone();
        let result = tokio::task::spawn_blocking(move || bridge.on_playback_event(&event)).await;

        match result {
            Ok(Ok(_)) => {}
            Ok(Err(BridgeError::Submission(e))) => {
                log::error!("Scrobble submission failed: {:#}", e)
            }
            Ok(Err(e)) => log::error!("{}", e),
            Err(e) => log::error!("Submission task failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ScrobbleRecord;
    use crate::scrobbler::Submitter;
    use futures_util::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc as std_mpsc, Mutex};
    use std::task::Poll;
    use tokio::sync::oneshot;

    struct Recording {
        titles: Mutex<Vec<String>>,
        attempts: AtomicUsize,
        fail_first: bool,
        gate: Option<Mutex<std_mpsc::Receiver<()>>>,
    }

    impl Recording {
        fn new(fail_first: bool, gate: Option<std_mpsc::Receiver<()>>) -> Arc<Self> {
            Arc::new(Self {
                titles: Mutex::new(Vec::new()),
                attempts: AtomicUsize::new(0),
                fail_first,
                gate: gate.map(Mutex::new),
            })
        }

        fn titles(&self) -> Vec<String> {
            self.titles.lock().unwrap().clone()
        }
    }

    impl Submitter for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        fn submit(&self, record: &ScrobbleRecord) -> anyhow::Result<()> {
            if let Some(gate) = &self.gate {
                gate.lock().unwrap().recv()?;
            }

            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && attempt == 0 {
                anyhow::bail!("service unavailable");
            }

            self.titles.lock().unwrap().push(record.song_title.clone());
            Ok(())
        }
    }

    fn now_playing<B>(body: &B) -> Message
    where
        B: serde::Serialize + zbus::zvariant::DynamicType,
    {
        Message::signal("/media/player/cmus", "media.player.cmus", "NowPlaying")
            .unwrap()
            .build(body)
            .unwrap()
    }

    fn track(code: i32, title: &str) -> zbus::Result<Message> {
        Ok(now_playing(&(code, "Artist A", title, "Album C", 3i32, 245i32, 10i32)))
    }

    #[test]
    fn default_rule_only_matches_member() {
        let config = BusConfig::default();
        let rule = match_rule(&config).unwrap();

        assert_eq!(rule.msg_type(), Some(message::Type::Signal));
        assert_eq!(rule.member().map(|m| m.as_str()), Some("NowPlaying"));
        assert!(rule.interface().is_none());
        assert!(rule.path_spec().is_none());
        assert!(rule.sender().is_none());
    }

    #[test]
    fn configured_filters_are_applied() {
        let config = BusConfig {
            signal_name: "NowPlaying".to_string(),
            interface: Some("media.player.cmus".to_string()),
            path: Some("/media/player/cmus".to_string()),
            sender: Some("media.player.cmus".to_string()),
        };
        let rule = match_rule(&config).unwrap();

        assert_eq!(rule.interface().map(|i| i.as_str()), Some("media.player.cmus"));
        assert_eq!(
            rule.sender().map(|s| s.to_string()),
            Some("media.player.cmus".to_string())
        );
        assert!(rule.path_spec().is_some());
    }

    #[test]
    fn invalid_member_is_rejected() {
        let config = BusConfig {
            signal_name: "Now Playing".to_string(),
            ..BusConfig::default()
        };
        assert!(match_rule(&config).is_err());
    }

    #[tokio::test]
    async fn skips_bad_signals_and_keeps_order() {
        let recording = Recording::new(false, None);
        let bridge = Arc::new(Bridge::new(recording.clone()));

        let messages = vec![
            track(7, "First"),
            Ok(now_playing(&(7i32, "Artist A"))),
            Err(zbus::Error::Failure("read error".to_string())),
            track(3, "Stopped"),
            Ok(now_playing(&())),
            track(7, "Second"),
        ];

        let outcome = dispatch(stream::iter(messages), bridge, CancellationToken::new()).await;

        let err = outcome.unwrap_err();
        assert_eq!(err.to_string(), "Session bus connection closed");
        assert_eq!(recording.titles(), vec!["First", "Second"]);
    }

    #[tokio::test]
    async fn failed_submission_does_not_stop_the_loop() {
        let recording = Recording::new(true, None);
        let bridge = Arc::new(Bridge::new(recording.clone()));

        let messages = vec![track(7, "First"), track(7, "Second")];
        let _ = dispatch(stream::iter(messages), bridge, CancellationToken::new()).await;

        assert_eq!(recording.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(recording.titles(), vec!["Second"]);
    }

    #[tokio::test]
    async fn cancel_drains_queued_events() {
        let (gate_tx, gate_rx) = std_mpsc::channel();
        let recording = Recording::new(false, Some(gate_rx));
        let bridge = Arc::new(Bridge::new(recording.clone()));

        // Reports once both tracks have been read, then stays quiet
        let (read_tx, read_rx) = oneshot::channel();
        let mut read_tx = Some(read_tx);
        let idle = stream::poll_fn(move |_| {
            if let Some(tx) = read_tx.take() {
                let _ = tx.send(());
            }
            Poll::<Option<zbus::Result<Message>>>::Pending
        });
        let messages = stream::iter(vec![track(7, "First"), track(7, "Second")]).chain(idle);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(dispatch(messages, bridge, cancel.clone()));

        read_rx.await.unwrap();
        cancel.cancel();
        assert!(recording.titles().is_empty());

        gate_tx.send(()).unwrap();
        gate_tx.send(()).unwrap();

        handle.await.unwrap().unwrap();
        assert_eq!(recording.titles(), vec!["First", "Second"]);
    }
}
