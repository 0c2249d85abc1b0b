//! Line-oriented socket protocol.
//!
//! One request per line:
//!
//! ```text
//! read <group>/<endpoint>
//! write <group>/<endpoint> <payload>
//! status <group>
//! ```
//!
//! One response per line: `ok <body>` or `err <errno> <message>`, where
//! `errno` is negative as an attribute read or write would report it.
//! Endpoint text and write payloads are escaped so that a trailing newline
//! survives the trip (`\n` and `\\`).

use crate::error::ServiceError;

/// Escape a value for a single protocol line.
#[must_use]
pub fn escape(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

/// Reverse [`escape`].
///
/// # Errors
///
/// Fails on a dangling or unknown escape.
pub fn unescape(text: &str) -> Result<Vec<u8>, ServiceError> {
    let mut out = Vec::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('\\') => out.push(b'\\'),
                Some('n') => out.push(b'\n'),
                other => {
                    return Err(ServiceError::Protocol(format!(
                        "bad escape sequence \\{}",
                        other.map(String::from).unwrap_or_default()
                    )));
                }
            },
            other => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    Ok(out)
}

/// Address of one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointPath {
    pub group: String,
    pub endpoint: String,
}

impl EndpointPath {
    pub fn new(group: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            endpoint: endpoint.into(),
        }
    }

    fn parse(text: &str) -> Result<Self, ServiceError> {
        match text.split_once('/') {
            Some((group, endpoint)) if !group.is_empty() && !endpoint.is_empty() => {
                Ok(Self::new(group, endpoint))
            }
            _ => Err(ServiceError::Protocol(format!(
                "expected <group>/<endpoint>, got {text:?}"
            ))),
        }
    }
}

impl std::fmt::Display for EndpointPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.group, self.endpoint)
    }
}

/// Client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Read(EndpointPath),
    Write { path: EndpointPath, payload: Vec<u8> },
    Status { group: String },
}

impl Request {
    /// Parse one request line (without its terminating newline).
    ///
    /// # Errors
    ///
    /// Fails with [`ServiceError::Protocol`] on an unknown verb or missing argument.
    pub fn parse(line: &str) -> Result<Self, ServiceError> {
        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
        match verb {
            "read" => Ok(Self::Read(EndpointPath::parse(rest)?)),
            "write" => {
                let (path, payload) = rest.split_once(' ').ok_or_else(|| {
                    ServiceError::Protocol("write needs <group>/<endpoint> <payload>".into())
                })?;
                Ok(Self::Write {
                    path: EndpointPath::parse(path)?,
                    payload: unescape(payload)?,
                })
            }
            "status" if !rest.is_empty() => Ok(Self::Status {
                group: rest.to_owned(),
            }),
            "status" => Err(ServiceError::Protocol("status needs <group>".into())),
            other => Err(ServiceError::Protocol(format!("unknown request {other:?}"))),
        }
    }

    /// Encode as a request line, without the terminating newline.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Read(path) => format!("read {path}"),
            Self::Write { path, payload } => format!("write {path} {}", escape(payload)),
            Self::Status { group } => format!("status {group}"),
        }
    }
}

/// Daemon response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok(String),
    Err { errno: i32, message: String },
}

impl Response {
    /// Encode as a response line, without the terminating newline.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Ok(body) => format!("ok {body}"),
            Self::Err { errno, message } => format!("err {errno} {}", escape(message.as_bytes())),
        }
    }

    /// Parse one response line.
    ///
    /// # Errors
    ///
    /// Fails with [`ServiceError::Protocol`] on a malformed line.
    pub fn parse(line: &str) -> Result<Self, ServiceError> {
        if let Some(body) = line.strip_prefix("ok ") {
            return Ok(Self::Ok(body.to_owned()));
        }
        if line == "ok" {
            return Ok(Self::Ok(String::new()));
        }
        let rest = line
            .strip_prefix("err ")
            .ok_or_else(|| ServiceError::Protocol(format!("unexpected response {line:?}")))?;
        let (errno, message) = rest.split_once(' ').unwrap_or((rest, ""));
        let errno = errno
            .parse()
            .map_err(|e| ServiceError::Protocol(format!("bad errno in {line:?}: {e}")))?;
        let message = String::from_utf8_lossy(&unescape(message)?).into_owned();
        Ok(Self::Err { errno, message })
    }

    /// Convert into the body, or a [`ServiceError::Endpoint`].
    ///
    /// # Errors
    ///
    /// Returns the daemon's rejection.
    pub fn into_result(self) -> Result<String, ServiceError> {
        match self {
            Self::Ok(body) => Ok(body),
            Self::Err { errno, message } => Err(ServiceError::Endpoint { errno, message }),
        }
    }
}
