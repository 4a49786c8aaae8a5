//! The plugin core.
//!
//! A [`Plugin`] owns the session identity, the element store and the
//! command table for the current connection:
//! - Issues the registration event and completes it from the host's ack
//! - Announces and releases the configured input hooks
//! - Routes every input line to a command handler
//! - Discards all session state when the connection drops

pub mod classifier;
pub mod handlers;
pub mod router;
pub mod sink;
pub mod store;

pub use handlers::{HandlerError, Outcome};
pub use sink::{EventSink, SinkError};
pub use store::ElementStore;

use crate::protocol::{OutboundEvent, TOPIC};
use crate::session::{Session, SessionError, SessionState};
use handlers::Handlers;
use router::{route, CommandTable, Route};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct Plugin {
    session: Session,
    store: ElementStore,
    table: CommandTable,
    hooks: Vec<String>,
}

impl Plugin {
    /// Create a plugin that will register `hooks` with the host.
    pub fn new(hooks: Vec<String>) -> Self {
        Self::with_table(hooks, CommandTable::builtin())
    }

    pub fn with_table(hooks: Vec<String>, table: CommandTable) -> Self {
        for (shadowing, shadowed) in table.ambiguities() {
            warn!(
                "Command {:?} is unreachable by name: {:?} also ends with it",
                shadowed, shadowing
            );
        }
        Self {
            session: Session::new(TOPIC),
            store: ElementStore::new(),
            table,
            hooks,
        }
    }

    pub fn store(&self) -> &ElementStore {
        &self.store
    }

    pub fn hooks(&self) -> &[String] {
        &self.hooks
    }

    /// Start a fresh session for a new connection.
    pub fn reset(&mut self) {
        self.session = Session::new(TOPIC);
        self.store = ElementStore::new();
    }

    /// Build the `registerTopic` event for the current connection.
    pub fn begin_registration(&mut self) -> Result<OutboundEvent, SessionError> {
        self.session.begin_registration()
    }

    /// Complete registration from the host's acknowledgement.
    pub fn complete_registration(&mut self, ack: &[Value]) -> Result<(), SessionError> {
        let token = self.session.confirm(ack)?;
        info!("Registered topic {:?}", token.topic);
        Ok(())
    }

    /// Register without a host, for offline use.
    pub fn register_offline(&mut self) -> Result<(), SessionError> {
        self.begin_registration()?;
        self.complete_registration(&[])
    }

    /// One `addInputHook` event per configured hook.
    pub fn hook_events(&self) -> Result<Vec<OutboundEvent>, SessionError> {
        let token = self.session.token()?;
        Ok(self
            .hooks
            .iter()
            .map(|hook| OutboundEvent::AddInputHook {
                token: token.clone(),
                hook: hook.clone(),
            })
            .collect())
    }

    /// One `delInputHook` event per configured hook.
    pub fn release_events(&self) -> Result<Vec<OutboundEvent>, SessionError> {
        let token = self.session.token()?;
        Ok(self
            .hooks
            .iter()
            .map(|hook| OutboundEvent::DelInputHook {
                token: token.clone(),
                hook: hook.clone(),
            })
            .collect())
    }

    /// Watch the number of elements created in the current session.
    pub fn subscribe_created(&self) -> watch::Receiver<u64> {
        self.store.subscribe()
    }

    /// Invalidate the session and drop every element.
    pub fn disconnect(&mut self) {
        if self.session.state() != SessionState::Invalidated {
            debug!(
                "Discarding {} elements ({} created this session)",
                self.store.len(),
                self.store.created()
            );
        }
        self.session.invalidate();
        self.store = ElementStore::new();
    }

    /// Route one input line. Never fails: every problem is logged and the
    /// plugin stays ready for the next line.
    pub async fn dispatch(&mut self, line: &str, sink: &mut dyn EventSink) {
        match self.execute(line, sink).await {
            Ok(Outcome::Emitted(event)) => debug!("{:?} -> {}", line, event),
            Ok(Outcome::NoOp(reason)) => debug!("{:?} ignored: {}", line, reason),
            Err(HandlerError::Session(e)) => debug!("{:?} dropped: {}", line, e),
            Err(e) => warn!("Failed to dispatch {:?}: {}", line, e),
        }
    }

    async fn execute(
        &mut self,
        line: &str,
        sink: &mut dyn EventSink,
    ) -> Result<Outcome, HandlerError> {
        let mut handlers = Handlers {
            session: &self.session,
            store: &mut self.store,
            sink,
        };
        match route(&self.table, line) {
            Route::Content(text) => handlers.render_content(text).await,
            Route::Command { command, argument } => handlers.run(command, argument).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ElementKind;
    use router::{Command, CommandEntry};

    fn registered() -> Plugin {
        let mut plugin = Plugin::new(vec!["api".to_string()]);
        plugin.register_offline().unwrap();
        plugin
    }

    async fn dispatch(plugin: &mut Plugin, line: &str) -> Vec<OutboundEvent> {
        let mut events = Vec::new();
        plugin.dispatch(line, &mut events).await;
        events
    }

    #[tokio::test]
    async fn test_bare_phrase_renders() {
        let mut plugin = registered();
        let events = dispatch(&mut plugin, "hello").await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name(), "addElem");
    }

    #[tokio::test]
    async fn test_notify_routes_once() {
        let mut plugin = registered();
        let events = dispatch(&mut plugin, "notify hello there").await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name(), "notify");
        assert!(plugin.store().is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_names_invoke_one_handler() {
        let table = CommandTable::new(vec![
            CommandEntry::new("notify", Command::Notify),
            CommandEntry::new("api_notify", Command::Notify),
            CommandEntry::new("api_content", Command::RenderContent),
        ]);
        let mut plugin = Plugin::with_table(vec![], table);
        plugin.register_offline().unwrap();
        let events = dispatch(&mut plugin, "notify ping").await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name(), "notify");
    }

    #[tokio::test]
    async fn test_unknown_token_matches_render_content() {
        let mut routed = registered();
        let mut direct = registered();

        let via_dispatch = dispatch(&mut routed, "xyz hello there").await;

        let mut via_render = Vec::new();
        Handlers {
            session: &direct.session,
            store: &mut direct.store,
            sink: &mut via_render,
        }
        .render_content("xyz hello there")
        .await
        .unwrap();

        assert_eq!(via_dispatch.len(), 1);
        assert_eq!(via_dispatch[0].args()[1..], via_render[0].args()[1..]);
        assert_eq!(
            routed.store().get("basic-0").unwrap().content,
            r#"<div class="card">xyz hello there</div>"#
        );
    }

    #[tokio::test]
    async fn test_remove_unknown_is_silent() {
        let mut plugin = registered();
        dispatch(&mut plugin, "hello").await;
        let events = dispatch(&mut plugin, "remove basic-42").await;
        assert!(events.is_empty());
        assert_eq!(plugin.store().len(), 1);
        assert_eq!(plugin.store().created(), 1);
    }

    #[tokio::test]
    async fn test_keys_unique_across_removal() {
        let mut plugin = registered();
        dispatch(&mut plugin, "one").await;
        dispatch(&mut plugin, "https://example.com").await;
        dispatch(&mut plugin, "remove basic-0").await;
        dispatch(&mut plugin, "<i>three</i>").await;
        let keys: Vec<&str> = plugin.store().iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["view-1", "basic-2"]);
    }

    #[tokio::test]
    async fn test_nothing_emitted_before_registration() {
        let mut plugin = Plugin::new(vec!["api".to_string()]);
        for line in ["hello", "notify hi", "css a { b: c; }", "https://example.com"] {
            assert!(dispatch(&mut plugin, line).await.is_empty());
        }
        assert!(plugin.hook_events().is_err());
        assert_eq!(plugin.store().created(), 0);
        assert_eq!(plugin.begin_registration().unwrap().name(), "registerTopic");
    }

    #[tokio::test]
    async fn test_disconnect_discards_state() {
        let mut plugin = registered();
        dispatch(&mut plugin, "https://example.com").await;
        plugin.disconnect();
        assert!(plugin.store().is_empty());
        assert!(dispatch(&mut plugin, "hello").await.is_empty());

        plugin.reset();
        plugin.register_offline().unwrap();
        dispatch(&mut plugin, "hello").await;
        assert_eq!(plugin.store().get("basic-0").unwrap().kind, ElementKind::Basic);
    }

    #[tokio::test]
    async fn test_hook_events() {
        let mut plugin = Plugin::new(vec!["api".to_string(), "g".to_string()]);
        plugin.register_offline().unwrap();
        let names: Vec<String> = plugin
            .hook_events()
            .unwrap()
            .iter()
            .map(|e| e.args()[1].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["api", "g"]);
        assert_eq!(plugin.release_events().unwrap()[0].name(), "delInputHook");
    }
}
