//! Wire types for the loopback generation server.
//!
//! Requests are single JSON bodies; the `/session` response is a stream of
//! newline-terminated JSON objects, each decoded into a [`Frame`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    System,
    User,
    Assistant,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.as_str() {
            "system" => Self::System,
            "user" => Self::User,
            "assistant" => Self::Assistant,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        match value {
            Role::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Message {
    #[cfg(test)]
    pub fn new(role: impl Into<Role>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            model: None,
        }
    }

    #[cfg(test)]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Two messages occupy the same transcript slot when role and content
    /// match; `model` does not take part.
    pub fn same_turn(&self, other: &Message) -> bool {
        self.role == other.role && self.content == other.content
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Start,
    Finish,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Status {
        status: SessionStatus,
        session_id: Option<String>,
    },
    MessageBatch {
        session_id: String,
        messages: Vec<Message>,
    },
    NoReference {
        session_id: String,
        junit_version: String,
    },
}

impl Frame {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status {
                status: SessionStatus::Start,
                ..
            } => "status:start",
            Self::Status {
                status: SessionStatus::Finish,
                ..
            } => "status:finish",
            Self::MessageBatch { .. } => "msg",
            Self::NoReference { .. } => "noreference",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
enum RawFrame {
    Status(RawStatus),
    Msg(RawBatch),
    Noreference(RawNoReference),
}

#[derive(Debug, Deserialize)]
struct RawStatus {
    status: SessionStatus,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawBatch {
    session_id: String,
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct RawNoReference {
    session_id: String,
    junit_version: VersionValue,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VersionValue {
    Text(String),
    Number(serde_json::Number),
}

impl VersionValue {
    fn into_string(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Number(number) => number.to_string(),
        }
    }
}

pub fn parse_frame_line(line: &[u8]) -> Result<Frame, ClientError> {
    let raw: RawFrame = serde_json::from_slice(line)
        .map_err(|err| ClientError::protocol(format!("malformed frame: {err}")))?;
    match raw {
        RawFrame::Status(status) => Ok(Frame::Status {
            status: status.status,
            session_id: status.session_id.filter(|id| !id.is_empty()),
        }),
        RawFrame::Msg(batch) => {
            require_session_id(&batch.session_id, "msg")?;
            Ok(Frame::MessageBatch {
                session_id: batch.session_id,
                messages: batch.messages,
            })
        }
        RawFrame::Noreference(notice) => {
            require_session_id(&notice.session_id, "noreference")?;
            Ok(Frame::NoReference {
                session_id: notice.session_id,
                junit_version: notice.junit_version.into_string(),
            })
        }
    }
}

fn require_session_id(session_id: &str, frame: &str) -> Result<(), ClientError> {
    if session_id.trim().is_empty() {
        return Err(ClientError::protocol(format!(
            "{frame} frame without a session_id"
        )));
    }
    Ok(())
}

/// Parameters of one test generation query, forwarded verbatim as `data`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParams {
    pub target_focal_method: String,
    pub target_focal_file: String,
    pub test_desc: String,
    pub project_path: String,
    pub focal_file_path: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Request<'a> {
    ChangeJunitVersion(&'a str),
    Query(&'a QueryParams),
}

#[derive(Debug, Serialize)]
pub struct StopRequest<'a> {
    pub session_id: &'a str,
}

#[cfg(test)]
#[path = "../tests/unit/wire_tests.rs"]
mod tests;
