//! Text vocabulary spoken between the relay, the media endpoint and its clients.
//!
//! Every frame is a single newline-free text message. Anything the media endpoint sends
//! that is not a `SESSION ` report is a JSON envelope forwarded to the client named by its
//! `client_uid` field; anything a client sends after its hello goes to the media endpoint
//! untouched.

use crate::models::ClientId;
use serde_json::Value;
use std::fmt;

pub const REGISTER_CLIENT: &str = "REGISTER CLIENT";
pub const REGISTER_MEDIA: &str = "REGISTER MEDIA";
pub const SESSION_PREFIX: &str = "SESSION ";
pub const FORWARD_TARGET_FIELD: &str = "client_uid";

/// First message of every connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hello {
    Client,
    Media,
}

impl Hello {
    /// Hellos must match exactly; surrounding whitespace is not forgiven.
    pub fn parse(msg: &str) -> Option<Self> {
        match msg {
            REGISTER_CLIENT => Some(Hello::Client),
            REGISTER_MEDIA => Some(Hello::Media),
            _ => None,
        }
    }
}

/// Messages originated by the relay itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMessage {
    AssignedUid(ClientId),
    Registered,
    BindSessionClient(ClientId),
    UnbindSessionClient(ClientId),
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::AssignedUid(id) => write!(f, "ASSIGNED UID {id}"),
            ServerMessage::Registered => f.write_str("REGISTERED"),
            ServerMessage::BindSessionClient(id) => write!(f, "BIND-SESSION-CLIENT {id}"),
            ServerMessage::UnbindSessionClient(id) => write!(f, "UNBIND-SESSION-CLIENT {id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Bound,
    Unbound,
}

impl SessionStatus {
    pub fn in_session(self) -> bool {
        matches!(self, SessionStatus::Bound)
    }
}

/// `SESSION <client_uid> <status>` as reported by the media endpoint.
///
/// Both fields are kept raw: the relay resolves the client before it looks at the
/// status, so an unknown client wins over an unknown status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport<'a> {
    pub client_uid: &'a str,
    pub status: &'a str,
}

impl<'a> SessionReport<'a> {
    pub fn client_id(&self) -> Option<ClientId> {
        self.client_uid.parse().ok()
    }

    pub fn status(&self) -> Option<SessionStatus> {
        match self.status {
            "BOUND" => Some(SessionStatus::Bound),
            "UNBOUND" => Some(SessionStatus::Unbound),
            _ => None,
        }
    }
}

/// Classification of a message received from the media endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaMessage<'a> {
    /// Starts with `SESSION ` and carries three tokens.
    Session(SessionReport<'a>),
    /// Starts with `SESSION ` but has fewer than three tokens.
    MalformedSession,
    Forward(&'a str),
}

impl<'a> MediaMessage<'a> {
    pub fn parse(msg: &'a str) -> Self {
        if !msg.starts_with(SESSION_PREFIX) {
            return MediaMessage::Forward(msg);
        }
        // Split into at most three whitespace separated tokens, the last one keeping
        // whatever follows the client uid.
        let rest = msg[SESSION_PREFIX.len()..].trim_start();
        let Some((client_uid, status)) = split_token(rest) else {
            return MediaMessage::MalformedSession;
        };
        let status = status.trim_start();
        if status.is_empty() {
            return MediaMessage::MalformedSession;
        }
        MediaMessage::Session(SessionReport { client_uid, status })
    }
}

fn split_token(s: &str) -> Option<(&str, &str)> {
    let end = s.find(char::is_whitespace)?;
    Some((&s[..end], &s[end..]))
}

/// Extracts the forwarding target of a media envelope.
///
/// `Ok(None)` means the JSON parsed but carries no usable `client_uid`: the field is
/// missing, the payload is not an object, or the value is not a non-negative integer
/// that fits a [`ClientId`].
pub fn forward_target(msg: &str) -> Result<Option<ClientId>, serde_json::Error> {
    let value: Value = serde_json::from_str(msg)?;
    Ok(value
        .get(FORWARD_TARGET_FIELD)
        .and_then(Value::as_u64)
        .and_then(|uid| ClientId::try_from(uid).ok()))
}
