//! Provider backed by an external bridge process.
//!
//! The bridge is spawned with piped stdio and spoken to in JSON Lines (see
//! `chatbridge_protocol`). A reader task turns stdout lines into
//! [`ProviderEvent`]s or, for replies, completes the waiting request.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatbridge_protocol::{BridgeCommand, BridgeEvent, Conversation, SESSION_DIR_ENV};
use dashmap::DashMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, info, warn};

use super::{ProviderError, ProviderEvent, SessionProvider};
use crate::address::Address;

/// How long `shutdown` waits for the bridge to exit on its own.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

type PendingReplies = Arc<DashMap<String, oneshot::Sender<BridgeEvent>>>;

/// Settings for spawning the bridge.
#[derive(Debug, Clone)]
pub struct SubprocessConfig {
    pub command: String,
    pub args: Vec<String>,
    /// Passed to the bridge so it can persist credentials across restarts.
    pub session_dir: PathBuf,
    pub request_timeout: Duration,
}

/// A running bridge process.
struct BridgeChild {
    child: Child,
    stdin: ChildStdin,
}

/// [`SessionProvider`] that drives a bridge subprocess.
pub struct SubprocessProvider {
    config: SubprocessConfig,
    events: mpsc::Sender<ProviderEvent>,
    child: Mutex<Option<BridgeChild>>,
    pending: PendingReplies,
}

impl SubprocessProvider {
    /// Create the provider and the receiving end of its event channel.
    ///
    /// Nothing is spawned until [`SessionProvider::initialize`] is called.
    pub fn new(config: SubprocessConfig) -> (Self, mpsc::Receiver<ProviderEvent>) {
        let (events, rx) = mpsc::channel(super::EVENT_CHANNEL_CAPACITY);
        let provider = Self {
            config,
            events,
            child: Mutex::new(None),
            pending: Arc::new(DashMap::new()),
        };
        (provider, rx)
    }

    fn spawn_bridge(&self) -> Result<BridgeChild, ProviderError> {
        let mut child = Command::new(&self.config.command)
            .args(&self.config.args)
            .env(SESSION_DIR_ENV, &self.config.session_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ProviderError::Unavailable(format!(
                    "failed to spawn bridge '{}': {e}",
                    self.config.command
                ))
            })?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(ProviderError::Unavailable(
                "bridge stdio not captured".to_string(),
            ));
        };

        info!(command = %self.config.command, pid = ?child.id(), "Spawned bridge process");

        spawn_stdout_reader(stdout, self.events.clone(), self.pending.clone());
        spawn_stderr_logger(stderr);

        Ok(BridgeChild { child, stdin })
    }

    async fn write_command(&self, command: &BridgeCommand) -> Result<(), ProviderError> {
        let mut line = serde_json::to_string(command)
            .map_err(|e| ProviderError::Protocol(e.to_string()))?;
        line.push('\n');

        let mut guard = self.child.lock().await;
        let Some(bridge) = guard.as_mut() else {
            return Err(ProviderError::Unavailable(
                "bridge is not running".to_string(),
            ));
        };
        bridge.stdin.write_all(line.as_bytes()).await?;
        bridge.stdin.flush().await?;
        Ok(())
    }

    /// Send a command and wait for the reply carrying `request_id`.
    async fn request(
        &self,
        request_id: String,
        command: BridgeCommand,
    ) -> Result<BridgeEvent, ProviderError> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id.clone(), tx);

        if let Err(e) = self.write_command(&command).await {
            self.pending.remove(&request_id);
            return Err(e);
        }

        match tokio::time::timeout(self.config.request_timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(ProviderError::Unavailable(
                "bridge exited before replying".to_string(),
            )),
            Err(_) => {
                self.pending.remove(&request_id);
                Err(ProviderError::Timeout)
            }
        }
    }
}

#[async_trait]
impl SessionProvider for SubprocessProvider {
    async fn initialize(&self) -> Result<(), ProviderError> {
        {
            let mut guard = self.child.lock().await;
            let alive = match guard.as_mut() {
                Some(bridge) => bridge.child.try_wait()?.is_none(),
                None => false,
            };
            if !alive {
                *guard = Some(self.spawn_bridge()?);
            }
        }
        self.write_command(&BridgeCommand::Initialize).await
    }

    async fn send_message(&self, to: &Address, body: &str) -> Result<(), ProviderError> {
        let request_id = ulid::Ulid::new().to_string();
        let command = BridgeCommand::SendMessage {
            request_id: request_id.clone(),
            to: to.to_string(),
            body: body.to_string(),
        };

        match self.request(request_id, command).await? {
            BridgeEvent::SendResult { error: None, .. } => Ok(()),
            BridgeEvent::SendResult {
                error: Some(reason),
                ..
            } => Err(ProviderError::Rejected(reason)),
            other => Err(ProviderError::Protocol(format!(
                "unexpected reply to send_message: {other:?}"
            ))),
        }
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, ProviderError> {
        let request_id = ulid::Ulid::new().to_string();
        let command = BridgeCommand::ListConversations {
            request_id: request_id.clone(),
        };

        match self.request(request_id, command).await? {
            BridgeEvent::Conversations {
                error: Some(reason),
                ..
            } => Err(ProviderError::Rejected(reason)),
            BridgeEvent::Conversations { conversations, .. } => Ok(conversations),
            other => Err(ProviderError::Protocol(format!(
                "unexpected reply to list_conversations: {other:?}"
            ))),
        }
    }

    async fn shutdown(&self) {
        if let Err(e) = self.write_command(&BridgeCommand::Shutdown).await {
            debug!(error = %e, "Could not ask bridge to shut down");
        }

        let mut guard = self.child.lock().await;
        let Some(mut bridge) = guard.take() else {
            return;
        };
        match tokio::time::timeout(SHUTDOWN_GRACE, bridge.child.wait()).await {
            Ok(Ok(status)) => info!(%status, "Bridge process exited"),
            Ok(Err(e)) => warn!(error = %e, "Failed to wait for bridge process"),
            Err(_) => {
                warn!("Bridge did not exit in time, killing it");
                if let Err(e) = bridge.child.kill().await {
                    warn!(error = %e, "Failed to kill bridge process");
                }
            }
        }
    }
}

// ============================================================================
// Reader tasks
// ============================================================================

fn spawn_stdout_reader(
    stdout: ChildStdout,
    events: mpsc::Sender<ProviderEvent>,
    pending: PendingReplies,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        let reason = loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(event) = route_line(&line, &pending) {
                        if events.send(event).await.is_err() {
                            debug!("Event receiver dropped, stopping bridge reader");
                            return;
                        }
                    }
                }
                Ok(None) => break "bridge process exited".to_string(),
                Err(e) => break format!("failed to read from bridge: {e}"),
            }
        };

        // Dropping the senders wakes every waiting request with an error.
        pending.clear();
        let _ = events.send(ProviderEvent::Disconnected { reason }).await;
    });
}

fn spawn_stderr_logger(stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(target: "chatbridge::bridge", "{line}");
        }
    });
}

/// Parse one stdout line. Replies complete their pending request and yield
/// nothing; everything else becomes a [`ProviderEvent`].
fn route_line(line: &str, pending: &PendingReplies) -> Option<ProviderEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let event: BridgeEvent = match serde_json::from_str(line) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, line, "Skipping unparseable bridge line");
            return None;
        }
    };

    if let Some(request_id) = event.request_id() {
        match pending.remove(request_id) {
            Some((_, tx)) => {
                let _ = tx.send(event);
            }
            None => debug!(request_id, "Reply for unknown or expired request"),
        }
        return None;
    }

    Some(match event {
        BridgeEvent::Qr { data } => ProviderEvent::Qr { data },
        BridgeEvent::Authenticated => ProviderEvent::Authenticated,
        BridgeEvent::AuthFailure { reason } => ProviderEvent::AuthFailure { reason },
        BridgeEvent::Ready => ProviderEvent::Ready,
        BridgeEvent::Disconnected { reason } => ProviderEvent::Disconnected { reason },
        BridgeEvent::Message(message) => ProviderEvent::Message(message),
        BridgeEvent::SendResult { .. } | BridgeEvent::Conversations { .. } => return None,
    })
}
