// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Application callback surface and plugin chain.
//!
//! The core consults user code at fixed points: `authorize`, `route` and one
//! handler per method. Every callback is optional — the default bodies
//! return [`CallbackReply::NotExported`] and the core substitutes a built-in
//! value. A callback may answer synchronously, or return
//! [`CallbackReply::Async`] and deliver its value later through the
//! [`ReplyToken`] it was handed; late deliveries that no longer match the
//! issuing state are discarded.
//!
//! An ordered [`Plugin`] chain runs in front of the application. Each plugin
//! either terminates the callback with a value or passes (possibly
//! rewritten) arguments to the next; the application is the final sink. The
//! fold is synchronous and deterministic, so plugins never observe partial
//! transaction state.

use std::sync::Arc;

use async_trait::async_trait;
use sip_core::{Method, Request};
use smol_str::SmolStr;
use tokio::sync::mpsc;
use tracing::debug;

use crate::call::CallEvent;
use crate::reply::SipReply;
use crate::route::RouteAnswer;
use crate::tx::{TxId, TxState};

/// The named callbacks the core can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    Authorize,
    Route,
    Invite,
    Reinvite,
    Bye,
    Options,
    Register,
    Info,
    Message,
    Subscribe,
    Resubscribe,
    Notify,
    Refer,
    Publish,
    Update,
    Prack,
    Ack,
}

impl CallbackKind {
    /// Returns the callback name as referenced in logs and timer labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackKind::Authorize => "authorize",
            CallbackKind::Route => "route",
            CallbackKind::Invite => "invite",
            CallbackKind::Reinvite => "reinvite",
            CallbackKind::Bye => "bye",
            CallbackKind::Options => "options",
            CallbackKind::Register => "register",
            CallbackKind::Info => "info",
            CallbackKind::Message => "message",
            CallbackKind::Subscribe => "subscribe",
            CallbackKind::Resubscribe => "resubscribe",
            CallbackKind::Notify => "notify",
            CallbackKind::Refer => "refer",
            CallbackKind::Publish => "publish",
            CallbackKind::Update => "update",
            CallbackKind::Prack => "prack",
            CallbackKind::Ack => "ack",
        }
    }

    /// Maps a request method to its handler callback. `in_dialog` selects
    /// the re-INVITE / re-SUBSCRIBE variants.
    pub fn for_method(method: &Method, in_dialog: bool) -> Option<CallbackKind> {
        Some(match method {
            Method::Invite if in_dialog => CallbackKind::Reinvite,
            Method::Invite => CallbackKind::Invite,
            Method::Ack => CallbackKind::Ack,
            Method::Bye => CallbackKind::Bye,
            Method::Options => CallbackKind::Options,
            Method::Register => CallbackKind::Register,
            Method::Info => CallbackKind::Info,
            Method::Message => CallbackKind::Message,
            Method::Subscribe if in_dialog => CallbackKind::Resubscribe,
            Method::Subscribe => CallbackKind::Subscribe,
            Method::Notify => CallbackKind::Notify,
            Method::Refer => CallbackKind::Refer,
            Method::Publish => CallbackKind::Publish,
            Method::Update => CallbackKind::Update,
            Method::Prack => CallbackKind::Prack,
            Method::Cancel | Method::Unknown(_) => return None,
        })
    }
}

/// Credentials material offered to `authorize`.
///
/// Digest verification itself is an external concern; the core surfaces the
/// raw credential headers and dialog membership.
#[derive(Debug, Clone, Default)]
pub struct AuthTokens {
    pub in_dialog: bool,
    pub authorization: Option<SmolStr>,
    pub proxy_authorization: Option<SmolStr>,
}

/// Outcome of the `authorize` callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    /// Proceed to routing.
    Ok,
    /// Reject with 403 Forbidden.
    Forbidden,
    /// Challenge with 401; `None` uses the request's domain as realm.
    Authenticate { realm: Option<SmolStr> },
    /// Challenge with 407.
    ProxyAuthenticate { realm: Option<SmolStr> },
    /// Answer with an explicit reply.
    Reply(SipReply),
}

/// Outcome of a per-method handler callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodAnswer {
    /// Send this reply. Provisional (1xx) replies keep the transaction open.
    Reply(SipReply),
    /// The application will answer later through its token.
    NoReply,
}

/// Uniform callback value carried through the bridge and async tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackValue {
    Authorize(AuthDecision),
    Route(RouteAnswer),
    Method(MethodAnswer),
    Ack,
}

/// What a callback invocation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackReply {
    /// Synchronous value, consumed by the state machine in the same step.
    Value(CallbackValue),
    /// The application will call back through its [`ReplyToken`]; the core
    /// arms the per-callback timeout.
    Async,
    /// No application function for this callback; the built-in default
    /// value applies.
    NotExported,
    /// The application failed; the core answers 500.
    Error(SmolStr),
}

/// Request-URI components handed to `route`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    pub scheme: SmolStr,
    pub user: SmolStr,
    pub domain: SmolStr,
}

/// Argument tuple threaded through the plugin chain.
#[derive(Debug, Clone)]
pub struct CallbackArgs {
    pub kind: CallbackKind,
    pub request: Arc<Request>,
    /// Present for `authorize`.
    pub auth: Option<AuthTokens>,
    /// Present for `route`.
    pub target: Option<RouteTarget>,
}

/// A plugin's verdict on a callback invocation.
#[derive(Debug, Clone)]
pub enum ChainOutcome {
    /// Stop the chain and use this reply.
    Terminal(CallbackReply),
    /// Run the next plugin with the unchanged arguments.
    Continue,
    /// Run the next plugin with rewritten arguments.
    ContinueWith(CallbackArgs),
}

/// Interception hook run before the application callback.
///
/// Handlers must be pure with respect to transaction state: they see only
/// the argument tuple and produce a verdict.
pub trait Plugin: Send + Sync + 'static {
    fn name(&self) -> &str;
    fn handle(&self, args: &CallbackArgs) -> ChainOutcome;
}

/// Opaque handle an application uses to deliver an asynchronous callback
/// value without referencing core internals.
#[derive(Debug, Clone)]
pub struct ReplyToken {
    pub(crate) kind: CallbackKind,
    pub(crate) tx_id: TxId,
    pub(crate) issued_in: TxState,
    pub(crate) events: mpsc::Sender<CallEvent>,
}

impl ReplyToken {
    /// Delivers an asynchronous callback value to the owning call actor.
    ///
    /// The value is applied only if the transaction still exists and has not
    /// progressed past the state that issued the callback.
    pub async fn reply(self, value: CallbackValue) {
        let event = CallEvent::AppReply {
            tx_id: self.tx_id,
            kind: self.kind,
            issued_in: self.issued_in,
            value,
        };
        if self.events.send(event).await.is_err() {
            debug!(tx_id = %self.tx_id, kind = self.kind.as_str(), "late app reply: call is gone");
        }
    }
}

/// Application interface. Every callback is optional; the default bodies
/// report [`CallbackReply::NotExported`] so the core applies its built-in
/// behaviour.
#[async_trait]
pub trait SipApp: Send + Sync + 'static {
    async fn authorize(
        &self,
        tokens: &AuthTokens,
        request: &Request,
        token: ReplyToken,
    ) -> CallbackReply {
        let _ = (tokens, request, token);
        CallbackReply::NotExported
    }

    async fn route(
        &self,
        target: &RouteTarget,
        request: &Request,
        token: ReplyToken,
    ) -> CallbackReply {
        let _ = (target, request, token);
        CallbackReply::NotExported
    }

    async fn invite(&self, request: &Request, token: ReplyToken) -> CallbackReply {
        let _ = (request, token);
        CallbackReply::NotExported
    }

    async fn reinvite(&self, request: &Request, token: ReplyToken) -> CallbackReply {
        let _ = (request, token);
        CallbackReply::NotExported
    }

    async fn bye(&self, request: &Request, token: ReplyToken) -> CallbackReply {
        let _ = (request, token);
        CallbackReply::NotExported
    }

    async fn options(&self, request: &Request, token: ReplyToken) -> CallbackReply {
        let _ = (request, token);
        CallbackReply::NotExported
    }

    async fn register(&self, request: &Request, token: ReplyToken) -> CallbackReply {
        let _ = (request, token);
        CallbackReply::NotExported
    }

    async fn info(&self, request: &Request, token: ReplyToken) -> CallbackReply {
        let _ = (request, token);
        CallbackReply::NotExported
    }

    async fn message(&self, request: &Request, token: ReplyToken) -> CallbackReply {
        let _ = (request, token);
        CallbackReply::NotExported
    }

    async fn subscribe(&self, request: &Request, token: ReplyToken) -> CallbackReply {
        let _ = (request, token);
        CallbackReply::NotExported
    }

    async fn resubscribe(&self, request: &Request, token: ReplyToken) -> CallbackReply {
        let _ = (request, token);
        CallbackReply::NotExported
    }

    async fn notify(&self, request: &Request, token: ReplyToken) -> CallbackReply {
        let _ = (request, token);
        CallbackReply::NotExported
    }

    async fn refer(&self, request: &Request, token: ReplyToken) -> CallbackReply {
        let _ = (request, token);
        CallbackReply::NotExported
    }

    async fn publish(&self, request: &Request, token: ReplyToken) -> CallbackReply {
        let _ = (request, token);
        CallbackReply::NotExported
    }

    async fn update(&self, request: &Request, token: ReplyToken) -> CallbackReply {
        let _ = (request, token);
        CallbackReply::NotExported
    }

    async fn prack(&self, request: &Request, token: ReplyToken) -> CallbackReply {
        let _ = (request, token);
        CallbackReply::NotExported
    }

    /// ACK notification; the result is ignored and no response is sent.
    async fn ack(&self, request: &Request) {
        let _ = request;
    }

    /// Password lookup used by digest-verifying deployments.
    async fn get_user_pass(&self, user: &str, realm: &str, request: &Request) -> Option<SmolStr> {
        let _ = (user, realm, request);
        None
    }
}

/// Application with no exported callbacks: every request gets the built-in
/// default behaviour.
#[derive(Debug, Default)]
pub struct DefaultSipApp;

impl SipApp for DefaultSipApp {}

/// Capability handle bundling an application's identity, its callback
/// implementation and the plugin chain in front of it.
#[derive(Clone)]
pub struct AppHandle {
    pub id: SmolStr,
    app: Arc<dyn SipApp>,
    plugins: Vec<Arc<dyn Plugin>>,
}

impl AppHandle {
    /// Creates a handle for the given application with an empty chain.
    pub fn new(id: impl Into<SmolStr>, app: Arc<dyn SipApp>) -> Self {
        Self {
            id: id.into(),
            app,
            plugins: Vec::new(),
        }
    }

    /// Creates a handle around [`DefaultSipApp`].
    pub fn stateless_default(id: impl Into<SmolStr>) -> Self {
        Self::new(id, Arc::new(DefaultSipApp))
    }

    /// Appends a plugin to the end of the chain.
    pub fn with_plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Runs the plugin chain and, unless a plugin terminated it, the
    /// application callback itself.
    pub async fn invoke(&self, mut args: CallbackArgs, token: ReplyToken) -> CallbackReply {
        for plugin in &self.plugins {
            match plugin.handle(&args) {
                ChainOutcome::Terminal(reply) => {
                    debug!(
                        plugin = plugin.name(),
                        kind = args.kind.as_str(),
                        "plugin terminated callback chain"
                    );
                    return reply;
                }
                ChainOutcome::Continue => {}
                ChainOutcome::ContinueWith(rewritten) => args = rewritten,
            }
        }
        self.dispatch(args, token).await
    }

    async fn dispatch(&self, args: CallbackArgs, token: ReplyToken) -> CallbackReply {
        let request = args.request.as_ref();
        match args.kind {
            CallbackKind::Authorize => {
                let tokens = args.auth.clone().unwrap_or_default();
                self.app.authorize(&tokens, request, token).await
            }
            CallbackKind::Route => {
                let target = args.target.clone().unwrap_or_else(|| RouteTarget {
                    scheme: SmolStr::new_static("sip"),
                    user: SmolStr::default(),
                    domain: SmolStr::default(),
                });
                self.app.route(&target, request, token).await
            }
            CallbackKind::Invite => self.app.invite(request, token).await,
            CallbackKind::Reinvite => self.app.reinvite(request, token).await,
            CallbackKind::Bye => self.app.bye(request, token).await,
            CallbackKind::Options => self.app.options(request, token).await,
            CallbackKind::Register => self.app.register(request, token).await,
            CallbackKind::Info => self.app.info(request, token).await,
            CallbackKind::Message => self.app.message(request, token).await,
            CallbackKind::Subscribe => self.app.subscribe(request, token).await,
            CallbackKind::Resubscribe => self.app.resubscribe(request, token).await,
            CallbackKind::Notify => self.app.notify(request, token).await,
            CallbackKind::Refer => self.app.refer(request, token).await,
            CallbackKind::Publish => self.app.publish(request, token).await,
            CallbackKind::Update => self.app.update(request, token).await,
            CallbackKind::Prack => self.app.prack(request, token).await,
            CallbackKind::Ack => {
                self.app.ack(request).await;
                CallbackReply::Value(CallbackValue::Ack)
            }
        }
    }
}

/// Built-in value substituted when a callback is not exported.
pub fn default_value(kind: CallbackKind) -> CallbackValue {
    match kind {
        CallbackKind::Authorize => CallbackValue::Authorize(AuthDecision::Ok),
        CallbackKind::Route => CallbackValue::Route(RouteAnswer::Process),
        CallbackKind::Options => CallbackValue::Method(MethodAnswer::Reply(SipReply::Ok)),
        CallbackKind::Invite | CallbackKind::Reinvite => {
            CallbackValue::Method(MethodAnswer::Reply(SipReply::Decline))
        }
        CallbackKind::Register => {
            CallbackValue::Method(MethodAnswer::Reply(SipReply::MethodNotAllowed))
        }
        CallbackKind::Ack => CallbackValue::Ack,
        _ => CallbackValue::Method(MethodAnswer::Reply(SipReply::Ok)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use sip_core::{Headers, RequestLine, SipUri};

    fn args(kind: CallbackKind) -> CallbackArgs {
        let request = Arc::new(Request::new(
            RequestLine::new(
                Method::Message,
                SipUri::parse("sip:svc@example.com").unwrap(),
            ),
            Headers::new(),
            Bytes::new(),
        ));
        CallbackArgs {
            kind,
            request,
            auth: None,
            target: None,
        }
    }

    fn token(events: mpsc::Sender<CallEvent>) -> ReplyToken {
        ReplyToken {
            kind: CallbackKind::Message,
            tx_id: TxId(1),
            issued_in: TxState::Trying,
            events,
        }
    }

    struct Tagger {
        tag: &'static str,
    }

    impl Plugin for Tagger {
        fn name(&self) -> &str {
            "tagger"
        }

        fn handle(&self, args: &CallbackArgs) -> ChainOutcome {
            let mut rewritten = args.clone();
            let mut request = (*args.request).clone();
            request.headers.push("X-Chain", self.tag);
            rewritten.request = Arc::new(request);
            ChainOutcome::ContinueWith(rewritten)
        }
    }

    struct Stopper;

    impl Plugin for Stopper {
        fn name(&self) -> &str {
            "stopper"
        }

        fn handle(&self, _args: &CallbackArgs) -> ChainOutcome {
            ChainOutcome::Terminal(CallbackReply::Value(CallbackValue::Method(
                MethodAnswer::Reply(SipReply::Forbidden),
            )))
        }
    }

    struct SeenChain;

    #[async_trait]
    impl SipApp for SeenChain {
        async fn message(&self, request: &Request, _token: ReplyToken) -> CallbackReply {
            let tags: Vec<&str> = request
                .headers
                .values("X-Chain")
                .map(|v| v.as_str())
                .collect();
            assert_eq!(tags, vec!["first", "second"]);
            CallbackReply::Value(CallbackValue::Method(MethodAnswer::Reply(SipReply::Ok)))
        }
    }

    #[tokio::test]
    async fn chain_rewrites_args_in_order() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = AppHandle::new("test", Arc::new(SeenChain))
            .with_plugin(Arc::new(Tagger { tag: "first" }))
            .with_plugin(Arc::new(Tagger { tag: "second" }));
        let reply = handle.invoke(args(CallbackKind::Message), token(tx)).await;
        assert!(matches!(reply, CallbackReply::Value(_)));
    }

    #[tokio::test]
    async fn terminal_plugin_short_circuits() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = AppHandle::new("test", Arc::new(SeenChain))
            .with_plugin(Arc::new(Stopper))
            .with_plugin(Arc::new(Tagger { tag: "never" }));
        let reply = handle.invoke(args(CallbackKind::Message), token(tx)).await;
        match reply {
            CallbackReply::Value(CallbackValue::Method(MethodAnswer::Reply(r))) => {
                assert_eq!(r.code(), 403)
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn default_app_reports_not_exported() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = AppHandle::stateless_default("test");
        let reply = handle.invoke(args(CallbackKind::Message), token(tx)).await;
        assert!(matches!(reply, CallbackReply::NotExported));
    }

    #[test]
    fn defaults_cover_every_kind() {
        assert!(matches!(
            default_value(CallbackKind::Authorize),
            CallbackValue::Authorize(AuthDecision::Ok)
        ));
        assert!(matches!(
            default_value(CallbackKind::Route),
            CallbackValue::Route(RouteAnswer::Process)
        ));
        match default_value(CallbackKind::Invite) {
            CallbackValue::Method(MethodAnswer::Reply(r)) => assert_eq!(r.code(), 603),
            other => panic!("unexpected default: {other:?}"),
        }
        match default_value(CallbackKind::Register) {
            CallbackValue::Method(MethodAnswer::Reply(r)) => assert_eq!(r.code(), 405),
            other => panic!("unexpected default: {other:?}"),
        }
    }

    #[test]
    fn method_mapping_honours_dialog_membership() {
        assert_eq!(
            CallbackKind::for_method(&Method::Invite, false),
            Some(CallbackKind::Invite)
        );
        assert_eq!(
            CallbackKind::for_method(&Method::Invite, true),
            Some(CallbackKind::Reinvite)
        );
        assert_eq!(
            CallbackKind::for_method(&Method::Subscribe, true),
            Some(CallbackKind::Resubscribe)
        );
        assert_eq!(CallbackKind::for_method(&Method::Cancel, false), None);
    }
}
