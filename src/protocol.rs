//! Wire definitions for plugin-host communication.
//!
//! The host speaks Socket.IO (protocol v5) over an Engine.IO v4 websocket.
//! Outbound events are positional: once a session exists, the session token
//! is always the first argument.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Namespace this plugin registers under with the host.
pub const TOPIC: &str = "api";

/// Title shown on notifications raised by this plugin.
pub const PLUGIN_NAME: &str = "ES API";

/// Identity proving ownership of outbound events for one connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
    /// Command namespace of the plugin.
    pub topic: String,
    /// Random secret issued for the current registration.
    pub secret: String,
}

/// Kind of visual element created on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ElementKind {
    /// Inert markup or text content.
    Basic,
    /// Navigable content backed by a URL.
    View,
}

impl ElementKind {
    /// Prefix used when generating element keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Basic => "basic",
            ElementKind::View => "view",
        }
    }
}

impl From<ElementKind> for u8 {
    fn from(kind: ElementKind) -> Self {
        match kind {
            ElementKind::Basic => 0,
            ElementKind::View => 1,
        }
    }
}

impl TryFrom<u8> for ElementKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ElementKind::Basic),
            1 => Ok(ElementKind::View),
            other => Err(format!("unknown element type: {}", other)),
        }
    }
}

/// Placement rectangle of an element. `-1` leaves the choice to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bound {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Bound {
    /// Every coordinate unset.
    pub const UNSET: Bound = Bound {
        x: -1,
        y: -1,
        w: -1,
        h: -1,
    };
}

impl Default for Bound {
    fn default() -> Self {
        Self::UNSET
    }
}

/// A visual element created by this plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRecord {
    /// Session-unique key, `<kind>-<ordinal>`.
    pub key: String,
    /// Element kind, encoded as `0` (basic) or `1` (view).
    #[serde(rename = "type")]
    pub kind: ElementKind,
    /// Requested placement.
    pub bound: Bound,
    /// Literal markup, text or link.
    pub content: String,
}

/// Payload of an `insertCSS` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stylesheet {
    /// Element the stylesheet targets; `None` scopes it to the whole session.
    pub key: Option<String>,
    /// Raw CSS text.
    pub css: String,
}

/// Payload of a `notify` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub text: String,
    pub title: String,
}

impl Notification {
    /// Create a notification titled with the plugin name.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            title: PLUGIN_NAME.to_string(),
        }
    }
}

/// Event sent from the plugin to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    /// Claim the topic with a freshly issued secret.
    RegisterTopic(SessionToken),
    /// Ask the host to forward input lines starting with `hook`.
    AddInputHook { token: SessionToken, hook: String },
    /// Stop forwarding input for `hook`.
    DelInputHook { token: SessionToken, hook: String },
    /// Create an element.
    AddElem {
        token: SessionToken,
        record: ElementRecord,
    },
    /// Remove an element.
    DelElem { token: SessionToken, key: String },
    /// Show a view element.
    ShowElem {
        token: SessionToken,
        record: ElementRecord,
    },
    /// Hide a view element.
    HideElem {
        token: SessionToken,
        record: ElementRecord,
    },
    /// Inject a stylesheet.
    InsertCss {
        token: SessionToken,
        stylesheet: Stylesheet,
    },
    /// Remove a previously injected stylesheet.
    RemoveCss {
        token: SessionToken,
        target: String,
        css_key: String,
    },
    /// Run a script inside an element.
    ExecJsInElem {
        token: SessionToken,
        record: ElementRecord,
        script: String,
    },
    /// Show a desktop notification.
    Notify {
        token: SessionToken,
        notification: Notification,
    },
}

impl OutboundEvent {
    /// Event name on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::RegisterTopic(_) => "registerTopic",
            OutboundEvent::AddInputHook { .. } => "addInputHook",
            OutboundEvent::DelInputHook { .. } => "delInputHook",
            OutboundEvent::AddElem { .. } => "addElem",
            OutboundEvent::DelElem { .. } => "delElem",
            OutboundEvent::ShowElem { .. } => "showElem",
            OutboundEvent::HideElem { .. } => "hideElem",
            OutboundEvent::InsertCss { .. } => "insertCSS",
            OutboundEvent::RemoveCss { .. } => "removeCSS",
            OutboundEvent::ExecJsInElem { .. } => "execJSInElem",
            OutboundEvent::Notify { .. } => "notify",
        }
    }

    /// Token the event is scoped to.
    pub fn token(&self) -> &SessionToken {
        match self {
            OutboundEvent::RegisterTopic(token)
            | OutboundEvent::AddInputHook { token, .. }
            | OutboundEvent::DelInputHook { token, .. }
            | OutboundEvent::AddElem { token, .. }
            | OutboundEvent::DelElem { token, .. }
            | OutboundEvent::ShowElem { token, .. }
            | OutboundEvent::HideElem { token, .. }
            | OutboundEvent::InsertCss { token, .. }
            | OutboundEvent::RemoveCss { token, .. }
            | OutboundEvent::ExecJsInElem { token, .. }
            | OutboundEvent::Notify { token, .. } => token,
        }
    }

    /// Positional arguments, token first.
    pub fn args(&self) -> Vec<Value> {
        let token = json!(self.token());
        match self {
            OutboundEvent::RegisterTopic(_) => vec![token],
            OutboundEvent::AddInputHook { hook, .. } | OutboundEvent::DelInputHook { hook, .. } => {
                vec![token, json!(hook)]
            }
            OutboundEvent::AddElem { record, .. } => {
                vec![token, json!(record.key), json!(record)]
            }
            OutboundEvent::DelElem { key, .. } => vec![token, json!(key)],
            OutboundEvent::ShowElem { record, .. } | OutboundEvent::HideElem { record, .. } => {
                vec![token, json!(record)]
            }
            OutboundEvent::InsertCss { stylesheet, .. } => vec![token, json!(stylesheet)],
            OutboundEvent::RemoveCss {
                target, css_key, ..
            } => vec![token, json!(target), json!(css_key)],
            OutboundEvent::ExecJsInElem { record, script, .. } => {
                vec![token, json!(record), json!(script)]
            }
            OutboundEvent::Notify { notification, .. } => vec![token, json!(notification)],
        }
    }

    /// The event as a Socket.IO event array: `[name, args...]`.
    pub fn to_json(&self) -> Value {
        let mut array = vec![json!(self.name())];
        array.extend(self.args());
        Value::Array(array)
    }
}

/// Engine.IO / Socket.IO packet codec.
///
/// Only the text encoding of the default namespace is supported; binary
/// attachments are rejected.
pub mod framing {
    use serde::Deserialize;
    use serde_json::Value;
    use thiserror::Error;

    /// Errors raised while decoding a packet.
    #[derive(Debug, Error)]
    pub enum FramingError {
        #[error("empty packet")]
        Empty,
        #[error("unknown engine packet type: {0:?}")]
        UnknownEnginePacket(char),
        #[error("unknown socket packet type: {0:?}")]
        UnknownSocketPacket(char),
        #[error("binary attachments are not supported")]
        BinaryAttachment,
        #[error("event packet has no name")]
        MissingEventName,
        #[error("ack packet has no id")]
        MissingAckId,
        #[error("invalid packet payload: {0}")]
        InvalidJson(#[from] serde_json::Error),
    }

    /// Session parameters sent by the server in the Engine.IO open packet.
    #[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Handshake {
        pub sid: String,
        /// Interval between server pings, in milliseconds.
        pub ping_interval: u64,
        /// Grace period after a missed ping, in milliseconds.
        pub ping_timeout: u64,
        #[serde(default)]
        pub max_payload: Option<u64>,
    }

    /// Engine.IO transport packet.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum EnginePacket {
        Open(Handshake),
        Close,
        Ping(String),
        Pong(String),
        Message(String),
        Upgrade,
        Noop,
    }

    impl EnginePacket {
        /// Decode a websocket text frame.
        pub fn decode(text: &str) -> Result<Self, FramingError> {
            let mut chars = text.chars();
            let kind = chars.next().ok_or(FramingError::Empty)?;
            let rest = chars.as_str();
            match kind {
                '0' => Ok(EnginePacket::Open(serde_json::from_str(rest)?)),
                '1' => Ok(EnginePacket::Close),
                '2' => Ok(EnginePacket::Ping(rest.to_string())),
                '3' => Ok(EnginePacket::Pong(rest.to_string())),
                '4' => Ok(EnginePacket::Message(rest.to_string())),
                '5' => Ok(EnginePacket::Upgrade),
                '6' => Ok(EnginePacket::Noop),
                other => Err(FramingError::UnknownEnginePacket(other)),
            }
        }

        /// Encode as a websocket text frame. Clients never send `Open`.
        pub fn encode(&self) -> String {
            match self {
                EnginePacket::Open(_) => "0".to_string(),
                EnginePacket::Close => "1".to_string(),
                EnginePacket::Ping(data) => format!("2{}", data),
                EnginePacket::Pong(data) => format!("3{}", data),
                EnginePacket::Message(data) => format!("4{}", data),
                EnginePacket::Upgrade => "5".to_string(),
                EnginePacket::Noop => "6".to_string(),
            }
        }
    }

    /// Socket.IO packet carried inside an Engine.IO message.
    #[derive(Debug, Clone, PartialEq)]
    pub enum SocketPacket {
        Connect(Option<Value>),
        Disconnect,
        Event {
            id: Option<u64>,
            name: String,
            args: Vec<Value>,
        },
        Ack {
            id: u64,
            args: Vec<Value>,
        },
        ConnectError(Value),
    }

    impl SocketPacket {
        /// Decode the payload of an Engine.IO message.
        pub fn decode(text: &str) -> Result<Self, FramingError> {
            let mut chars = text.chars();
            let kind = chars.next().ok_or(FramingError::Empty)?;
            let mut rest = chars.as_str();

            if matches!(kind, '5' | '6') {
                return Err(FramingError::BinaryAttachment);
            }

            // Non-default namespaces are prefixed as `/nsp,`.
            if rest.starts_with('/') {
                rest = rest.split_once(',').map(|(_, tail)| tail).unwrap_or("");
            }

            let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
            let id = rest[..digits].parse::<u64>().ok();
            let body = &rest[digits..];
            let data: Option<Value> = if body.is_empty() {
                None
            } else {
                Some(serde_json::from_str(body)?)
            };

            match kind {
                '0' => Ok(SocketPacket::Connect(data)),
                '1' => Ok(SocketPacket::Disconnect),
                '2' => {
                    let mut items = match data {
                        Some(Value::Array(items)) => items,
                        _ => return Err(FramingError::MissingEventName),
                    };
                    if items.is_empty() {
                        return Err(FramingError::MissingEventName);
                    }
                    let name = match items.remove(0) {
                        Value::String(name) => name,
                        _ => return Err(FramingError::MissingEventName),
                    };
                    Ok(SocketPacket::Event {
                        id,
                        name,
                        args: items,
                    })
                }
                '3' => {
                    let id = id.ok_or(FramingError::MissingAckId)?;
                    let args = match data {
                        Some(Value::Array(items)) => items,
                        Some(other) => vec![other],
                        None => Vec::new(),
                    };
                    Ok(SocketPacket::Ack { id, args })
                }
                '4' => Ok(SocketPacket::ConnectError(data.unwrap_or(Value::Null))),
                other => Err(FramingError::UnknownSocketPacket(other)),
            }
        }

        /// Encode for the default namespace.
        pub fn encode(&self) -> String {
            match self {
                SocketPacket::Connect(None) => "0".to_string(),
                SocketPacket::Connect(Some(auth)) => format!("0{}", auth),
                SocketPacket::Disconnect => "1".to_string(),
                SocketPacket::Event { id, name, args } => {
                    let mut array = Vec::with_capacity(args.len() + 1);
                    array.push(Value::String(name.clone()));
                    array.extend(args.iter().cloned());
                    let id = id.map(|id| id.to_string()).unwrap_or_default();
                    format!("2{}{}", id, Value::Array(array))
                }
                SocketPacket::Ack { id, args } => {
                    format!("3{}{}", id, Value::Array(args.clone()))
                }
                SocketPacket::ConnectError(data) => format!("4{}", data),
            }
        }
    }
}
