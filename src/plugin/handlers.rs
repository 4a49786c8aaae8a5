//! Command handlers.
//!
//! Each handler emits at most one event. Missing keys and malformed
//! arguments are reported as [`Outcome::NoOp`], never as errors; errors are
//! reserved for a missing session or a failed delivery.

use super::classifier::{classify, ContentKind};
use super::router::Command;
use super::sink::{EventSink, SinkError};
use super::store::ElementStore;
use crate::protocol::{ElementKind, Notification, OutboundEvent, SessionToken, Stylesheet};
use crate::session::{Session, SessionError};
use std::fmt;
use thiserror::Error;

/// Result of a handler that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The named event was delivered.
    Emitted(&'static str),
    /// Nothing was sent.
    NoOp(NoOp),
}

/// Why a handler chose not to emit anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoOp {
    UnknownElement(String),
    NotAView(String),
    MissingDelimiter(&'static str),
}

impl fmt::Display for NoOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoOp::UnknownElement(key) => write!(f, "unknown element {:?}", key),
            NoOp::NotAView(key) => write!(f, "element {:?} is not a view", key),
            NoOp::MissingDelimiter(delimiter) => write!(f, "argument has no {} delimiter", delimiter),
        }
    }
}

/// Errors that stop a handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("failed to deliver {event}: {source}")]
    Delivery {
        event: &'static str,
        #[source]
        source: SinkError,
    },
}

/// Wrap plain text in the card template.
pub fn card(text: &str) -> String {
    format!(r#"<div class="card">{}</div>"#, text)
}

/// Everything a handler may touch while running one command.
pub struct Handlers<'a> {
    pub session: &'a Session,
    pub store: &'a mut ElementStore,
    pub sink: &'a mut dyn EventSink,
}

impl Handlers<'_> {
    /// Run `command` with its argument.
    pub async fn run(&mut self, command: Command, argument: &str) -> Result<Outcome, HandlerError> {
        match command {
            Command::RenderContent => self.render_content(argument).await,
            Command::Notify => self.notify(argument).await,
            Command::InsertStylesheet => self.insert_stylesheet(argument).await,
            Command::RemoveStylesheet => self.remove_stylesheet(argument).await,
            Command::RemoveElement => self.remove_element(argument).await,
            Command::ShowElement => self.toggle_view(argument, true).await,
            Command::HideElement => self.toggle_view(argument, false).await,
            Command::ExecScript => self.exec_script(argument).await,
        }
    }

    /// Classify `text` and create the matching element, or inject it as a
    /// stylesheet.
    pub async fn render_content(&mut self, text: &str) -> Result<Outcome, HandlerError> {
        let token = self.token()?;
        let (kind, content) = match classify(text) {
            ContentKind::MarkupFragment => (ElementKind::Basic, text.to_string()),
            ContentKind::PlainText => (ElementKind::Basic, card(text)),
            ContentKind::Hyperlink => (ElementKind::View, text.to_string()),
            ContentKind::StylesheetRule => {
                let stylesheet = Stylesheet {
                    key: None,
                    css: text.to_string(),
                };
                return self.send(OutboundEvent::InsertCss { token, stylesheet }).await;
            }
        };

        let record = self.store.create(kind, content).clone();
        self.send(OutboundEvent::AddElem { token, record }).await
    }

    async fn notify(&mut self, text: &str) -> Result<Outcome, HandlerError> {
        let token = self.token()?;
        let notification = Notification::new(text);
        self.send(OutboundEvent::Notify {
            token,
            notification,
        })
        .await
    }

    /// `css` or `target|css`.
    async fn insert_stylesheet(&mut self, argument: &str) -> Result<Outcome, HandlerError> {
        let token = self.token()?;
        let target = argument
            .split_once('|')
            .map(|(key, css)| (key.trim(), css))
            .filter(|(key, _)| is_target_key(key));
        let stylesheet = match target {
            Some((key, css)) => Stylesheet {
                key: Some(key.to_string()),
                css: css.to_string(),
            },
            None => Stylesheet {
                key: None,
                css: argument.to_string(),
            },
        };
        self.send(OutboundEvent::InsertCss { token, stylesheet }).await
    }

    /// `target|cssKey`.
    async fn remove_stylesheet(&mut self, argument: &str) -> Result<Outcome, HandlerError> {
        let token = self.token()?;
        let Some((target, css_key)) = argument.split_once('|') else {
            return Ok(Outcome::NoOp(NoOp::MissingDelimiter("'|'")));
        };
        self.send(OutboundEvent::RemoveCss {
            token,
            target: target.trim().to_string(),
            css_key: css_key.trim().to_string(),
        })
        .await
    }

    async fn remove_element(&mut self, argument: &str) -> Result<Outcome, HandlerError> {
        let token = self.token()?;
        let key = argument.trim();
        if !self.store.contains(key) {
            return Ok(Outcome::NoOp(NoOp::UnknownElement(key.to_string())));
        }
        let outcome = self
            .send(OutboundEvent::DelElem {
                token,
                key: key.to_string(),
            })
            .await?;
        self.store.remove(key);
        Ok(outcome)
    }

    async fn toggle_view(&mut self, argument: &str, show: bool) -> Result<Outcome, HandlerError> {
        let token = self.token()?;
        let key = argument.trim();
        let record = match self.store.get(key) {
            None => return Ok(Outcome::NoOp(NoOp::UnknownElement(key.to_string()))),
            Some(record) if record.kind != ElementKind::View => {
                return Ok(Outcome::NoOp(NoOp::NotAView(key.to_string())))
            }
            Some(record) => record.clone(),
        };
        let event = if show {
            OutboundEvent::ShowElem { token, record }
        } else {
            OutboundEvent::HideElem { token, record }
        };
        self.send(event).await
    }

    /// `key script`, split at the first whitespace.
    async fn exec_script(&mut self, argument: &str) -> Result<Outcome, HandlerError> {
        let token = self.token()?;
        let Some((key, script)) = argument.trim_start().split_once(char::is_whitespace) else {
            return Ok(Outcome::NoOp(NoOp::MissingDelimiter("whitespace")));
        };
        let Some(record) = self.store.get(key).cloned() else {
            return Ok(Outcome::NoOp(NoOp::UnknownElement(key.to_string())));
        };
        self.send(OutboundEvent::ExecJsInElem {
            token,
            record,
            script: script.to_string(),
        })
        .await
    }

    fn token(&self) -> Result<SessionToken, SessionError> {
        self.session.token().cloned()
    }

    async fn send(&mut self, event: OutboundEvent) -> Result<Outcome, HandlerError> {
        let name = event.name();
        self.sink
            .emit(event)
            .await
            .map_err(|source| HandlerError::Delivery { event: name, source })?;
        Ok(Outcome::Emitted(name))
    }
}

/// An element key ahead of `|`, as opposed to the start of a selector like
/// `p[lang|="en"]`.
fn is_target_key(key: &str) -> bool {
    !key.is_empty() && !key.contains(|c: char| c.is_whitespace() || c == '[' || c == '{')
}
