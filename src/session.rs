//! Session identity for one host connection.
//!
//! A session starts `Unregistered`, becomes `Registered` once the host
//! acknowledges the `registerTopic` event, and is `Invalidated` when the
//! connection drops. Only the registration event may carry a token that the
//! host has not acknowledged yet.

use crate::protocol::{OutboundEvent, SessionToken};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unregistered,
    Registered,
    Invalidated,
}

/// Errors raised when an operation needs a session it cannot have.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session is not registered")]
    NotRegistered,
    #[error("session was invalidated")]
    Invalidated,
    #[error("registration already in progress or complete")]
    AlreadyIssued,
    #[error("no registration is in progress")]
    NotIssued,
    #[error("host rejected the registration")]
    Rejected,
}

/// Identity of the plugin for a single connection.
#[derive(Debug)]
pub struct Session {
    topic: String,
    state: SessionState,
    token: Option<SessionToken>,
}

impl Session {
    /// Create an unregistered session for `topic`.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            state: SessionState::Unregistered,
            token: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Issue a fresh secret and build the registration event.
    pub fn begin_registration(&mut self) -> Result<OutboundEvent, SessionError> {
        match self.state {
            SessionState::Invalidated => return Err(SessionError::Invalidated),
            SessionState::Registered => return Err(SessionError::AlreadyIssued),
            SessionState::Unregistered if self.token.is_some() => {
                return Err(SessionError::AlreadyIssued)
            }
            SessionState::Unregistered => {}
        }

        let token = SessionToken {
            topic: self.topic.clone(),
            secret: Uuid::new_v4().simple().to_string(),
        };
        self.token = Some(token.clone());
        Ok(OutboundEvent::RegisterTopic(token))
    }

    /// Complete registration from the host's acknowledgement.
    ///
    /// An ack of `false` is a rejection. An ack carrying an object with a
    /// `secret` string replaces the issued secret.
    pub fn confirm(&mut self, ack: &[Value]) -> Result<&SessionToken, SessionError> {
        if self.state != SessionState::Unregistered {
            return Err(match self.state {
                SessionState::Invalidated => SessionError::Invalidated,
                _ => SessionError::AlreadyIssued,
            });
        }
        let token = self.token.as_mut().ok_or(SessionError::NotIssued)?;

        match ack.first() {
            Some(Value::Bool(false)) => return Err(SessionError::Rejected),
            Some(Value::Object(echoed)) => {
                if let Some(secret) = echoed.get("secret").and_then(Value::as_str) {
                    token.secret = secret.to_string();
                }
            }
            _ => {}
        }

        self.state = SessionState::Registered;
        Ok(token)
    }

    /// Token for events sent after registration.
    pub fn token(&self) -> Result<&SessionToken, SessionError> {
        match (self.state, &self.token) {
            (SessionState::Registered, Some(token)) => Ok(token),
            (SessionState::Invalidated, _) => Err(SessionError::Invalidated),
            _ => Err(SessionError::NotRegistered),
        }
    }

    /// Drop the token; the session can never be used again.
    pub fn invalidate(&mut self) {
        self.state = SessionState::Invalidated;
        self.token = None;
    }
}
