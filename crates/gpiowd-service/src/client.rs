//! Client side of the endpoint socket.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::error::ServiceError;
use crate::protocol::{EndpointPath, Request, Response, unescape};

/// Connects to a running daemon, one connection per request.
#[derive(Debug, Clone)]
pub struct Client {
    socket_path: PathBuf,
}

impl Client {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send one request and wait for its response.
    ///
    /// # Errors
    ///
    /// Fails with [`ServiceError::ServiceUnavailable`] if the daemon cannot be
    /// reached, or [`ServiceError::Protocol`] on a malformed reply.
    pub async fn request(&self, request: &Request) -> Result<Response> {
        let stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            ServiceError::ServiceUnavailable(format!("{}: {e}", self.socket_path.display()))
        })?;
        let (reader, mut writer) = stream.into_split();

        let mut line = request.encode();
        line.push('\n');
        writer
            .write_all(line.as_bytes())
            .await
            .context("Failed to send request")?;

        let reply = BufReader::new(reader)
            .lines()
            .next_line()
            .await
            .context("Failed to read response")?
            .ok_or_else(|| ServiceError::Protocol("connection closed before response".into()))?;
        Ok(Response::parse(&reply)?)
    }

    /// Read an endpoint. The text keeps its trailing newline.
    ///
    /// # Errors
    ///
    /// Fails if the request fails or the daemon rejects it.
    pub async fn read(&self, group: &str, endpoint: &str) -> Result<String> {
        let body = self
            .request(&Request::Read(EndpointPath::new(group, endpoint)))
            .await?
            .into_result()?;
        Ok(String::from_utf8_lossy(&unescape(&body)?).into_owned())
    }

    /// Write `payload` to an endpoint, returning the byte count consumed.
    ///
    /// # Errors
    ///
    /// Fails if the request fails or the daemon rejects it.
    pub async fn write(&self, group: &str, endpoint: &str, payload: &[u8]) -> Result<usize> {
        let body = self
            .request(&Request::Write {
                path: EndpointPath::new(group, endpoint),
                payload: payload.to_vec(),
            })
            .await?
            .into_result()?;
        body.parse()
            .map_err(|e| ServiceError::Protocol(format!("bad byte count {body:?}: {e}")).into())
    }

    /// Fetch the status snapshot of `group` as JSON.
    ///
    /// # Errors
    ///
    /// Fails if the request fails or the reply is not JSON.
    pub async fn status(&self, group: &str) -> Result<serde_json::Value> {
        let body = self
            .request(&Request::Status {
                group: group.to_owned(),
            })
            .await?
            .into_result()?;
        serde_json::from_str(&body).context("Failed to parse status")
    }
}
