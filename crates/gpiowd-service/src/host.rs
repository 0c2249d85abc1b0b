//! Endpoint host serving registered groups over a Unix domain socket
//!
//! Each accepted connection is served by its own task. Endpoint handlers may
//! block (the clock check samples for most of a second), so every request
//! runs on the blocking pool. Request lines longer than [`MAX_REQUEST_LEN`]
//! are answered with `-EINVAL` and the connection is closed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use gpiowd_supervisor::{EndpointHandler, EndpointHost, SupervisorError, SupervisorResult};
use parking_lot::RwLock;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::protocol::{Request, Response, escape};

/// Longest request line accepted, in bytes, excluding the newline.
pub const MAX_REQUEST_LEN: u64 = 4096;

type Groups = Arc<RwLock<HashMap<&'static str, Arc<dyn EndpointHandler>>>>;

fn rejected(err: &SupervisorError) -> Response {
    if err.is_malformed_input() {
        debug!(error = %err, "Rejected endpoint payload");
    } else {
        warn!(error = %err, "Endpoint request failed");
    }
    Response::Err {
        errno: -err.errno(),
        message: err.to_string(),
    }
}

fn invalid_request(message: impl Into<String>) -> Response {
    Response::Err {
        errno: -libc::EINVAL,
        message: message.into(),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Incoming {
    Line(String),
    Oversize,
    NotUtf8,
    Closed,
}

/// Read one request line, reading at most one byte past [`MAX_REQUEST_LEN`].
async fn next_request<R: AsyncBufRead + Unpin>(reader: &mut R) -> std::io::Result<Incoming> {
    let mut buf = Vec::new();
    let read = (&mut *reader)
        .take(MAX_REQUEST_LEN.saturating_add(1))
        .read_until(b'\n', &mut buf)
        .await?;
    if read == 0 {
        return Ok(Incoming::Closed);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    if !u64::try_from(buf.len()).is_ok_and(|len| len <= MAX_REQUEST_LEN) {
        return Ok(Incoming::Oversize);
    }
    Ok(String::from_utf8(buf).map_or(Incoming::NotUtf8, Incoming::Line))
}

/// Resolves once shutdown has been signalled, including before the call, or
/// once the host is gone.
async fn shutdown_signalled(shutdown_rx: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow_and_update() {
            return;
        }
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}

/// Run one request against `handler`. Blocks for as long as the handler does.
pub fn execute(handler: &dyn EndpointHandler, request: &Request) -> Response {
    let result = match request {
        Request::Read(path) => handler
            .show_by_name(&path.endpoint)
            .map(|text| escape(text.as_bytes())),
        Request::Write { path, payload } => handler
            .store_by_name(&path.endpoint, payload)
            .map(|consumed| consumed.to_string()),
        Request::Status { .. } => {
            return match serde_json::to_string(&handler.status()) {
                Ok(json) => Response::Ok(json),
                Err(e) => Response::Err {
                    errno: -libc::EIO,
                    message: format!("Failed to encode status: {e}"),
                },
            };
        }
    };

    match result {
        Ok(body) => Response::Ok(body),
        Err(e) => rejected(&e),
    }
}

async fn dispatch(groups: &Groups, line: &str) -> Response {
    let request = match Request::parse(line) {
        Ok(request) => request,
        Err(e) => return invalid_request(e.to_string()),
    };

    let group = match &request {
        Request::Read(path) | Request::Write { path, .. } => path.group.as_str(),
        Request::Status { group } => group.as_str(),
    };
    let Some(handler) = groups.read().get(group).cloned() else {
        return rejected(&SupervisorError::NotFound(group.to_owned()));
    };

    debug!(request = %line, "Dispatching request");
    match tokio::task::spawn_blocking(move || execute(handler.as_ref(), &request)).await {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "Endpoint handler task failed");
            Response::Err {
                errno: -libc::EIO,
                message: "handler failed".into(),
            }
        }
    }
}

async fn handle_connection(
    stream: UnixStream,
    groups: Groups,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    loop {
        let next = tokio::select! {
            biased;
            () = shutdown_signalled(&mut shutdown_rx) => break,
            next = next_request(&mut reader) => next,
        };
        let (response, keep_open) = match next {
            Ok(Incoming::Line(line)) => (dispatch(&groups, &line).await, true),
            Ok(Incoming::NotUtf8) => (invalid_request("request is not UTF-8"), true),
            Ok(Incoming::Oversize) => {
                warn!(limit = MAX_REQUEST_LEN, "Request line too long, closing connection");
                (
                    invalid_request(format!("request exceeds {MAX_REQUEST_LEN} bytes")),
                    false,
                )
            }
            Ok(Incoming::Closed) => break,
            Err(e) => {
                debug!(error = %e, "Connection read failed");
                break;
            }
        };

        let mut encoded = response.encode();
        encoded.push('\n');
        if let Err(e) = writer.write_all(encoded.as_bytes()).await {
            debug!(error = %e, "Connection write failed");
            break;
        }
        if !keep_open {
            break;
        }
    }
}

async fn accept_loop(
    listener: UnixListener,
    groups: Groups,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            () = shutdown_signalled(&mut shutdown_rx) => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    debug!("New connection");
                    connections.spawn(handle_connection(
                        stream,
                        Arc::clone(&groups),
                        shutdown_rx.clone(),
                    ));
                }
                Err(e) => error!(error = %e, "Failed to accept connection"),
            },
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = joined {
                    warn!(error = %e, "Connection task failed");
                }
            }
        }
    }

    drop(listener);
    while let Some(joined) = connections.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "Connection task failed during shutdown");
        }
    }
}

/// Endpoint host listening on a Unix domain socket.
pub struct SocketHost {
    socket_path: PathBuf,
    groups: Groups,
    shutdown_tx: watch::Sender<bool>,
    server: JoinHandle<()>,
}

impl SocketHost {
    /// Bind `socket_path` and start accepting connections. A stale socket
    /// file at that path is replaced.
    ///
    /// # Errors
    ///
    /// Fails if the socket cannot be bound or its permissions set.
    pub async fn bind(socket_path: impl Into<PathBuf>) -> Result<Self> {
        use std::os::unix::fs::PermissionsExt;

        let socket_path = socket_path.into();
        if tokio::fs::try_exists(&socket_path).await.unwrap_or(false) {
            tokio::fs::remove_file(&socket_path)
                .await
                .context("Failed to remove existing socket file")?;
        }

        let listener = UnixListener::bind(&socket_path)
            .with_context(|| format!("Failed to bind Unix socket {}", socket_path.display()))?;
        tokio::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o660))
            .await
            .context("Failed to set socket permissions")?;

        let groups: Groups = Arc::default();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = tokio::spawn(accept_loop(listener, Arc::clone(&groups), shutdown_rx));

        info!(socket = %socket_path.display(), "Endpoint socket listening");
        Ok(Self {
            socket_path,
            groups,
            shutdown_tx,
            server,
        })
    }

    /// Socket path served.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Whether `group` is currently published.
    #[must_use]
    pub fn is_registered(&self, group: &str) -> bool {
        self.groups.read().contains_key(group)
    }

    /// Stop accepting, wait for in-flight requests to finish, then remove
    /// the socket file.
    ///
    /// # Errors
    ///
    /// Fails if the server task panicked or the socket file cannot be removed.
    pub async fn close(self) -> Result<()> {
        self.shutdown_tx.send_replace(true);
        self.server.await.context("Endpoint server task failed")?;

        match tokio::fs::remove_file(&self.socket_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to remove socket {}", self.socket_path.display())
                });
            }
        }

        info!(socket = %self.socket_path.display(), "Endpoint socket closed");
        Ok(())
    }
}

impl std::fmt::Debug for SocketHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketHost")
            .field("socket_path", &self.socket_path)
            .field("groups", &self.groups.read().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl EndpointHost for SocketHost {
    type Registration = SocketRegistration;

    fn register(
        &mut self,
        group: &'static str,
        handler: Arc<dyn EndpointHandler>,
    ) -> SupervisorResult<SocketRegistration> {
        if self.server.is_finished() {
            return Err(SupervisorError::registration(format!(
                "endpoint server on {} is not running",
                self.socket_path.display()
            )));
        }

        let mut groups = self.groups.write();
        if groups.contains_key(group) {
            return Err(SupervisorError::registration(format!(
                "group {group} already registered"
            )));
        }
        groups.insert(group, handler);

        info!(group, socket = %self.socket_path.display(), "Endpoint group published");
        Ok(SocketRegistration {
            group,
            groups: Arc::clone(&self.groups),
        })
    }
}

/// Keeps a group published on a [`SocketHost`]. Dropping it unpublishes the
/// group; requests already running finish normally.
pub struct SocketRegistration {
    group: &'static str,
    groups: Groups,
}

impl std::fmt::Debug for SocketRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketRegistration")
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}

impl Drop for SocketRegistration {
    fn drop(&mut self) {
        self.groups.write().remove(self.group);
        debug!(group = self.group, "Endpoint group unpublished");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use gpiowd_supervisor::prelude::*;

    use super::*;
    use crate::protocol::EndpointPath;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn supervisor() -> Result<(Arc<ManualClock>, WatchdogSupervisor<gpiowd_supervisor::sim::SimLine>), SupervisorError> {
        let clock = Arc::new(ManualClock::new());
        let supervisor = WatchdogSupervisor::activate(
            &SimLineProvider::new(),
            &SupervisorConfig::new(1, 2, 3, 60),
            Timebase::manual(&clock),
        )?;
        Ok((clock, supervisor))
    }

    #[test]
    fn test_execute_read_escapes_newline() -> TestResult {
        let (clock, supervisor) = supervisor()?;
        clock.set_secs(5);

        let response = execute(
            &supervisor,
            &Request::Read(EndpointPath::new(GROUP_NAME, "remaining_time")),
        );
        assert_eq!(response, Response::Ok("55\\n".into()));
        Ok(())
    }

    #[test]
    fn test_execute_write_reports_consumed_bytes() -> TestResult {
        let (_clock, supervisor) = supervisor()?;

        let response = execute(
            &supervisor,
            &Request::Write {
                path: EndpointPath::new(GROUP_NAME, "trig"),
                payload: b"7\n".to_vec(),
            },
        );
        assert_eq!(response, Response::Ok("2".into()));
        Ok(())
    }

    #[test]
    fn test_execute_maps_errors_to_negative_errno() -> TestResult {
        let (_clock, supervisor) = supervisor()?;

        let response = execute(
            &supervisor,
            &Request::Write {
                path: EndpointPath::new(GROUP_NAME, "trig"),
                payload: b"1.5".to_vec(),
            },
        );
        assert!(matches!(response, Response::Err { errno, .. } if errno == -libc::EINVAL));

        let response = execute(
            &supervisor,
            &Request::Read(EndpointPath::new(GROUP_NAME, "trig")),
        );
        assert!(matches!(response, Response::Err { errno, .. } if errno == -libc::EACCES));
        Ok(())
    }

    fn long_request(len: u64) -> Result<String, std::num::TryFromIntError> {
        Ok(format!("read {}", "a".repeat(usize::try_from(len)?)))
    }

    #[tokio::test]
    async fn test_next_request_splits_lines() -> TestResult {
        let mut input: &[u8] = b"read watchdog/inhib\r\nstatus watchdog\nread watchdog/clock";
        assert_eq!(
            next_request(&mut input).await?,
            Incoming::Line("read watchdog/inhib".into())
        );
        assert_eq!(
            next_request(&mut input).await?,
            Incoming::Line("status watchdog".into())
        );
        assert_eq!(
            next_request(&mut input).await?,
            Incoming::Line("read watchdog/clock".into())
        );
        assert_eq!(next_request(&mut input).await?, Incoming::Closed);
        Ok(())
    }

    #[tokio::test]
    async fn test_next_request_caps_line_length() -> TestResult {
        let fits = "x".repeat(usize::try_from(MAX_REQUEST_LEN)?) + "\n";
        let mut input = fits.as_bytes();
        assert!(matches!(next_request(&mut input).await?, Incoming::Line(_)));

        let too_long = long_request(MAX_REQUEST_LEN)? + "\n";
        let mut input = too_long.as_bytes();
        assert_eq!(next_request(&mut input).await?, Incoming::Oversize);

        let mut input: &[u8] = b"read \xff\xfe\n";
        assert_eq!(next_request(&mut input).await?, Incoming::NotUtf8);
        Ok(())
    }

    #[tokio::test]
    async fn test_oversize_request_is_rejected_and_connection_closed() -> TestResult {
        let (server, client) = UnixStream::pair()?;
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let connection = tokio::spawn(handle_connection(server, Groups::default(), shutdown_rx));

        let (reader, mut writer) = client.into_split();
        let mut request = long_request(MAX_REQUEST_LEN.saturating_mul(4))?;
        request.push('\n');
        writer.write_all(request.as_bytes()).await?;

        let mut lines = BufReader::new(reader).lines();
        let reply = lines.next_line().await?.ok_or("no response")?;
        assert!(matches!(
            Response::parse(&reply)?,
            Response::Err { errno, .. } if errno == -libc::EINVAL
        ));
        // Closed without reading the rest: EOF, or a reset from the unread bytes.
        assert!(!matches!(lines.next_line().await, Ok(Some(_))));

        tokio::time::timeout(Duration::from_secs(5), connection).await??;
        Ok(())
    }

    #[tokio::test]
    async fn test_connection_started_after_shutdown_ends_immediately() -> TestResult {
        let (server, _idle_client) = UnixStream::pair()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        shutdown_tx.send_replace(true);

        tokio::time::timeout(
            Duration::from_secs(5),
            handle_connection(server, Groups::default(), shutdown_rx),
        )
        .await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_close_does_not_wait_for_idle_clients() -> TestResult {
        let dir = tempfile::tempdir()?;
        let socket = dir.path().join("idle.sock");
        let host = SocketHost::bind(&socket).await?;

        let _idle = UnixStream::connect(&socket).await?;
        tokio::time::timeout(Duration::from_secs(5), host.close()).await??;
        assert!(!socket.exists());
        Ok(())
    }
}
