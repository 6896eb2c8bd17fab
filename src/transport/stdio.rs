//! STDIO transport: a child process speaking newline-delimited JSON.
//!
//! The child's stdin is the outbound channel and its stdout the inbound
//! channel, one JSON object per `\n`-terminated line. stderr is consumed
//! concurrently and surfaced through the host logger; it never fails the
//! transport. Commands are resolved through `/usr/bin/env` with a PATH
//! enriched by the common tool directories, so JS-ecosystem servers
//! installed via npm are reachable without shell configuration.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::core::error::{McpError, McpResult};
use crate::core::retry::with_timeout;
use crate::transport::traits::{check_frame_size, Transport, TransportConfig, TransportState};

/// Directories prepended to the child's PATH so typical tool installs
/// (npm globals, homebrew, project-local bins) resolve. Documented behavior.
const PATH_PREPEND: &[&str] = &["/usr/local/bin", "/opt/homebrew/bin"];

/// How long `stop` waits for the child to exit before killing it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

struct StdioShared {
    message_tx: std::sync::Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    state_tx: watch::Sender<TransportState>,
    child: tokio::sync::Mutex<Option<Child>>,
}

impl StdioShared {
    fn set_state(&self, state: TransportState) {
        self.state_tx.send_replace(state);
    }

    fn state(&self) -> TransportState {
        self.state_tx.borrow().clone()
    }

    fn close_stream(&self) {
        let mut guard = self.message_tx.lock().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }

    /// Reap the child if it is still around: graceful wait first, kill after
    /// the grace period. Always drains the exit status to avoid zombies.
    async fn reap_child(&self) {
        let child = { self.child.lock().await.take() };
        if let Some(mut child) = child {
            match timeout(SHUTDOWN_GRACE, child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::debug!("server process exited with status: {status}");
                }
                Ok(Err(e)) => {
                    tracing::warn!("error waiting for server process: {e}");
                }
                Err(_) => {
                    tracing::warn!("server process did not exit in time, killing it");
                    let _ = child.kill().await;
                }
            }
        }
    }
}

/// Client transport that spawns an MCP server as a child process.
pub struct StdioTransport {
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    config: TransportConfig,
    shared: Arc<StdioShared>,
    stdin_writer: Option<BufWriter<ChildStdin>>,
    reader_tasks: Vec<JoinHandle<()>>,
    message_rx: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl StdioTransport {
    /// Create a transport for `command args...` with the default config.
    pub fn new<S: Into<String>>(command: S, args: Vec<S>) -> Self {
        Self::with_config(command, args, HashMap::new(), TransportConfig::default())
    }

    /// Create a transport with extra environment variables and a custom
    /// configuration. The child inherits the current environment with
    /// `env` overlaid on top.
    pub fn with_config<S: Into<String>>(
        command: S,
        args: Vec<S>,
        env: HashMap<String, String>,
        config: TransportConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(TransportState::Disconnected);
        Self {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            env,
            config,
            shared: Arc::new(StdioShared {
                message_tx: std::sync::Mutex::new(None),
                state_tx,
                child: tokio::sync::Mutex::new(None),
            }),
            stdin_writer: None,
            reader_tasks: Vec::new(),
            message_rx: None,
        }
    }

    /// PATH for the child: common tool directories, user-level bins, the
    /// project-local node_modules, then the inherited PATH.
    fn enriched_path() -> String {
        let mut entries: Vec<String> = PATH_PREPEND.iter().map(|s| s.to_string()).collect();
        if let Ok(home) = std::env::var("HOME") {
            entries.push(format!("{home}/.npm-global/bin"));
            entries.push(format!("{home}/.local/bin"));
        }
        entries.push("./node_modules/.bin".to_string());
        if let Ok(path) = std::env::var("PATH") {
            entries.push(path);
        }
        let separator = if cfg!(windows) { ";" } else { ":" };
        entries.join(separator)
    }

    fn build_command(&self) -> Command {
        let mut command = if cfg!(unix) {
            let mut c = Command::new("/usr/bin/env");
            c.arg(&self.command);
            c
        } else {
            Command::new(&self.command)
        };
        command
            .args(&self.args)
            .env("PATH", Self::enriched_path())
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    fn ensure_channel(&mut self) {
        let mut guard = self
            .shared
            .message_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            let (tx, rx) = mpsc::unbounded_channel();
            *guard = Some(tx);
            self.message_rx = Some(rx);
        }
    }

    /// One task per pipe: stdout yields frames, stderr goes to the logger.
    fn spawn_readers(
        &mut self,
        stdout: tokio::process::ChildStdout,
        stderr: tokio::process::ChildStderr,
    ) {
        let shared = Arc::clone(&self.shared);
        let command = self.command.clone();
        self.reader_tasks.push(tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            let mut io_error = false;

            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => {
                        tracing::debug!("stdout EOF from '{command}'");
                        break;
                    }
                    Ok(_) => {
                        let line = match std::str::from_utf8(&buf) {
                            Ok(s) => s.trim(),
                            Err(_) => {
                                tracing::warn!("skipping non-UTF-8 line from '{command}'");
                                continue;
                            }
                        };
                        if line.is_empty() {
                            continue;
                        }
                        tracing::trace!("stdio received: {line}");

                        let sent = {
                            let guard =
                                shared.message_tx.lock().unwrap_or_else(|e| e.into_inner());
                            match guard.as_ref() {
                                Some(tx) => tx.send(line.as_bytes().to_vec()).is_ok(),
                                None => false,
                            }
                        };
                        if !sent {
                            tracing::debug!("message consumer dropped, stopping stdio reader");
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("error reading stdout from '{command}': {e}");
                        io_error = true;
                        break;
                    }
                }
            }

            shared.close_stream();
            if io_error {
                shared.set_state(TransportState::Failed(format!(
                    "stdout read error from '{command}'"
                )));
            } else if shared.state() == TransportState::Connected {
                shared.set_state(TransportState::Disconnected);
            }
            shared.reap_child().await;
        }));

        let command = self.command.clone();
        self.reader_tasks.push(tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if !line.is_empty() {
                    tracing::info!(target: "harbor_mcp::server_stderr", "[{command}] {line}");
                }
            }
        }));
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn start(&mut self) -> McpResult<()> {
        if self.shared.state() == TransportState::Connected {
            return Ok(());
        }

        self.shared.set_state(TransportState::Connecting);
        self.ensure_channel();

        tracing::debug!("starting MCP server: {} {:?}", self.command, self.args);

        let mut child = self.build_command().spawn().map_err(|e| {
            let error = McpError::ConnectionFailed(format!(
                "failed to start server process '{}': {e}",
                self.command
            ));
            self.shared.set_state(TransportState::Failed(error.to_string()));
            error
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::connection("failed to get stdin handle"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::connection("failed to get stdout handle"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| McpError::connection("failed to get stderr handle"))?;

        *self.shared.child.lock().await = Some(child);
        self.stdin_writer = Some(BufWriter::new(stdin));
        self.spawn_readers(stdout, stderr);
        self.shared.set_state(TransportState::Connected);
        Ok(())
    }

    async fn stop(&mut self) -> McpResult<()> {
        tracing::debug!("stopping stdio transport for '{}'", self.command);

        for task in self.reader_tasks.drain(..) {
            task.abort();
        }

        // Closing stdin signals the server to shut down
        if let Some(mut writer) = self.stdin_writer.take() {
            let _ = writer.shutdown().await;
        }

        self.shared.reap_child().await;
        self.shared.close_stream();
        self.shared.set_state(TransportState::Disconnected);
        Ok(())
    }

    async fn send(&mut self, data: &[u8], timeout: Option<Duration>) -> McpResult<()> {
        if self.shared.state() != TransportState::Connected {
            return Err(McpError::invalid_state("not connected"));
        }
        check_frame_size(data, &self.config)?;

        let writer = self
            .stdin_writer
            .as_mut()
            .ok_or_else(|| McpError::invalid_state("not connected"))?;

        // Frame and newline go out as one buffered write
        let mut frame = Vec::with_capacity(data.len() + 1);
        frame.extend_from_slice(data);
        frame.push(b'\n');

        let deadline = timeout.unwrap_or(self.config.send_timeout);
        with_timeout("stdio send", deadline, async {
            writer.write_all(&frame).await?;
            writer.flush().await?;
            Ok(())
        })
        .await
    }

    fn messages(&mut self) -> mpsc::UnboundedReceiver<Vec<u8>> {
        if let Some(rx) = self.message_rx.take() {
            return rx;
        }
        // A fresh subscription replaces the live sender
        let (tx, rx) = mpsc::unbounded_channel();
        let mut guard = self
            .shared
            .message_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *guard = Some(tx);
        rx
    }

    fn state(&self) -> TransportState {
        self.shared.state()
    }

    fn state_changes(&self) -> watch::Receiver<TransportState> {
        self.shared.state_tx.subscribe()
    }

    fn connection_info(&self) -> String {
        format!("stdio transport '{}' ({:?})", self.command, self.state())
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        for task in self.reader_tasks.drain(..) {
            task.abort();
        }
        // kill_on_drop on the Command handles the child itself
    }
}
