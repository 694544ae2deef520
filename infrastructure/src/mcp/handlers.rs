//! Inbound request handlers (server → client capabilities).
//!
//! A tool server may send requests back to the client: elicitation asks the
//! user for input, sampling asks the client's model for a completion. The
//! client only receives them if it advertised the capability during the
//! handshake, so the set of handlers and the advertised capabilities must
//! stay in lock-step for the whole lifetime of a connection.

use super::error::{McpError, Result};
use super::protocol::{ClientCapabilities, methods};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Handles one kind of server-initiated request.
///
/// Returning `Err(message)` makes the client answer with a JSON-RPC
/// internal error carrying `message`.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn handle(&self, params: Value) -> std::result::Result<Value, String>;
}

pub type SharedHandler = Arc<dyn InboundHandler>;

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> InboundHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<Value, String>> + Send,
{
    async fn handle(&self, params: Value) -> std::result::Result<Value, String> {
        (self.0)(params).await
    }
}

/// Wrap an async closure as a [`SharedHandler`].
pub fn handler_fn<F, Fut>(f: F) -> SharedHandler
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<Value, String>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Optional inbound capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Elicitation,
    Sampling,
}

impl Capability {
    /// Request method the server uses for this capability.
    pub fn method(&self) -> &'static str {
        match self {
            Capability::Elicitation => methods::ELICITATION_CREATE,
            Capability::Sampling => methods::SAMPLING_CREATE_MESSAGE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Elicitation => "elicitation",
            Capability::Sampling => "sampling",
        }
    }

    fn from_method(method: &str) -> Option<Self> {
        match method {
            methods::ELICITATION_CREATE => Some(Capability::Elicitation),
            methods::SAMPLING_CREATE_MESSAGE => Some(Capability::Sampling),
            _ => None,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handlers supplied when a client is constructed.
#[derive(Clone, Default)]
pub struct InboundHandlers {
    pub elicitation: Option<SharedHandler>,
    pub sampling: Option<SharedHandler>,
}

impl InboundHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_elicitation(mut self, handler: SharedHandler) -> Self {
        self.elicitation = Some(handler);
        self
    }

    pub fn with_sampling(mut self, handler: SharedHandler) -> Self {
        self.sampling = Some(handler);
        self
    }
}

impl fmt::Debug for InboundHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundHandlers")
            .field("elicitation", &self.elicitation.is_some())
            .field("sampling", &self.sampling.is_some())
            .finish()
    }
}

#[derive(Clone, Default)]
enum CapabilityState {
    /// Not advertised at handshake; can never become active.
    #[default]
    Unset,
    Set(SharedHandler),
    /// Advertised, handler removed afterwards.
    Cleared,
}

impl CapabilityState {
    fn from_handler(handler: Option<SharedHandler>) -> Self {
        match handler {
            Some(handler) => CapabilityState::Set(handler),
            None => CapabilityState::Unset,
        }
    }

    fn is_advertised(&self) -> bool {
        !matches!(self, CapabilityState::Unset)
    }
}

/// What [`HandlerRegistry::update`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerChange {
    Unchanged,
    Replaced,
    Registered,
    Deregistered,
}

/// Per-capability handler state for one connection.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    elicitation: CapabilityState,
    sampling: CapabilityState,
}

impl HandlerRegistry {
    pub fn new(handlers: InboundHandlers) -> Self {
        Self {
            elicitation: CapabilityState::from_handler(handlers.elicitation),
            sampling: CapabilityState::from_handler(handlers.sampling),
        }
    }

    fn state(&self, capability: Capability) -> &CapabilityState {
        match capability {
            Capability::Elicitation => &self.elicitation,
            Capability::Sampling => &self.sampling,
        }
    }

    fn state_mut(&mut self, capability: Capability) -> &mut CapabilityState {
        match capability {
            Capability::Elicitation => &mut self.elicitation,
            Capability::Sampling => &mut self.sampling,
        }
    }

    /// Capabilities to advertise in `initialize`: exactly those with a handler.
    pub fn client_capabilities(&self) -> ClientCapabilities {
        let advertise = |state: &CapabilityState| state.is_advertised().then(|| json!({}));
        ClientCapabilities {
            elicitation: advertise(&self.elicitation),
            sampling: advertise(&self.sampling),
        }
    }

    /// Replace, clear or re-register the handler for `capability`.
    ///
    /// Enabling a capability that was never advertised fails with
    /// [`McpError::CapabilityNotNegotiated`].
    pub fn update(
        &mut self,
        capability: Capability,
        handler: Option<SharedHandler>,
    ) -> Result<HandlerChange> {
        let state = self.state_mut(capability);
        let (next, change) = match (&*state, handler) {
            (CapabilityState::Unset, Some(_)) => {
                return Err(McpError::CapabilityNotNegotiated(capability));
            }
            (CapabilityState::Unset, None) | (CapabilityState::Cleared, None) => {
                return Ok(HandlerChange::Unchanged);
            }
            (CapabilityState::Set(current), Some(new)) if Arc::ptr_eq(current, &new) => {
                return Ok(HandlerChange::Unchanged);
            }
            (CapabilityState::Set(_), Some(new)) => {
                (CapabilityState::Set(new), HandlerChange::Replaced)
            }
            (CapabilityState::Set(_), None) => (CapabilityState::Cleared, HandlerChange::Deregistered),
            (CapabilityState::Cleared, Some(new)) => {
                (CapabilityState::Set(new), HandlerChange::Registered)
            }
        };
        *state = next;
        Ok(change)
    }

    /// Active handler for an incoming request method, if any.
    pub fn handler_for_method(&self, method: &str) -> Option<SharedHandler> {
        let capability = Capability::from_method(method)?;
        match self.state(capability) {
            CapabilityState::Set(handler) => Some(Arc::clone(handler)),
            _ => None,
        }
    }

    pub fn is_active(&self, capability: Capability) -> bool {
        matches!(self.state(capability), CapabilityState::Set(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(value: Value) -> SharedHandler {
        handler_fn(move |_| {
            let value = value.clone();
            async move { Ok(value) }
        })
    }

    #[test]
    fn test_only_supplied_handlers_are_advertised() {
        let registry = HandlerRegistry::new(InboundHandlers::new().with_sampling(constant(json!(1))));
        let caps = registry.client_capabilities();
        assert!(caps.sampling.is_some());
        assert!(caps.elicitation.is_none());

        let none = HandlerRegistry::new(InboundHandlers::new()).client_capabilities();
        assert_eq!(none, ClientCapabilities::default());
    }

    #[test]
    fn test_unset_to_set_is_rejected() {
        let mut registry = HandlerRegistry::new(InboundHandlers::new());
        let err = registry
            .update(Capability::Elicitation, Some(constant(json!({}))))
            .unwrap_err();
        assert!(matches!(
            err,
            McpError::CapabilityNotNegotiated(Capability::Elicitation)
        ));
        assert!(!registry.is_active(Capability::Elicitation));
    }

    #[test]
    fn test_unset_clear_is_noop() {
        let mut registry = HandlerRegistry::new(InboundHandlers::new());
        assert_eq!(
            registry.update(Capability::Sampling, None).unwrap(),
            HandlerChange::Unchanged
        );
    }

    #[test]
    fn test_same_handler_is_noop() {
        let handler = constant(json!({}));
        let mut registry =
            HandlerRegistry::new(InboundHandlers::new().with_elicitation(Arc::clone(&handler)));
        assert_eq!(
            registry
                .update(Capability::Elicitation, Some(handler))
                .unwrap(),
            HandlerChange::Unchanged
        );
    }

    #[test]
    fn test_set_replace_clear_reregister() {
        let mut registry =
            HandlerRegistry::new(InboundHandlers::new().with_sampling(constant(json!("a"))));

        assert_eq!(
            registry
                .update(Capability::Sampling, Some(constant(json!("b"))))
                .unwrap(),
            HandlerChange::Replaced
        );
        assert_eq!(
            registry.update(Capability::Sampling, None).unwrap(),
            HandlerChange::Deregistered
        );
        assert!(registry.handler_for_method(methods::SAMPLING_CREATE_MESSAGE).is_none());
        // still advertised: the server cached it at handshake
        assert!(registry.client_capabilities().sampling.is_some());

        assert_eq!(
            registry
                .update(Capability::Sampling, Some(constant(json!("c"))))
                .unwrap(),
            HandlerChange::Registered
        );
        assert!(registry.is_active(Capability::Sampling));
    }

    #[tokio::test]
    async fn test_handler_for_method_dispatches() {
        let registry =
            HandlerRegistry::new(InboundHandlers::new().with_elicitation(constant(json!({"action": "accept"}))));
        let handler = registry
            .handler_for_method(methods::ELICITATION_CREATE)
            .unwrap();
        assert_eq!(handler.handle(json!({})).await.unwrap()["action"], "accept");
        assert!(registry.handler_for_method("tools/call").is_none());
    }

    #[test]
    fn test_capability_display() {
        assert_eq!(Capability::Elicitation.to_string(), "elicitation");
        assert_eq!(Capability::Sampling.method(), "sampling/createMessage");
    }
}
