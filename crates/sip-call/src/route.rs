// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Route decision normalization and dispatch.
//!
//! The `route` callback may answer in a number of shapes; they normalize to
//! four canonical decisions: answer locally, process locally, proxy, or
//! strict-proxy along the topmost Route header. Dispatch enforces the
//! protocol rules tied to each decision: CANCEL is never processed locally,
//! unsupported `Require` extensions yield 420, and stateless operation is
//! only legal for non-INVITE requests.

use std::sync::Arc;

use async_trait::async_trait;
use sip_core::{Method, Request, SipUri};
use smol_str::SmolStr;
use tokio::sync::mpsc;
use tracing::debug;

use crate::call::CallEvent;
use crate::config::CallConfig;
use crate::fsm::{self, TermReason, UasAction};
use crate::reply::SipReply;
use crate::tx::{TxId, UasTx};

/// Options attached to a route decision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteOpts {
    /// Run the transaction statelessly: no timers, record dropped right
    /// after the response. Only legal for non-INVITE requests.
    pub stateless: bool,
    /// Extra headers the dispatcher forwards to the proxy engine.
    pub headers: Vec<(SmolStr, SmolStr)>,
}

impl RouteOpts {
    /// Options with the stateless flag set.
    pub fn stateless() -> Self {
        Self {
            stateless: true,
            headers: Vec::new(),
        }
    }
}

/// Shapes the `route` callback may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAnswer {
    Process,
    ProcessWith(RouteOpts),
    Proxy(Vec<SipUri>),
    ProxyWith(Vec<SipUri>, RouteOpts),
    StrictProxy,
    StrictProxyWith(RouteOpts),
    Respond(SipReply, RouteOpts),
    /// A bare reply implies stateless operation.
    Bare(SipReply),
}

/// Canonical route decision driving the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Response { reply: SipReply, opts: RouteOpts },
    Process { opts: RouteOpts },
    Proxy { targets: Vec<SipUri>, opts: RouteOpts },
    StrictProxy { opts: RouteOpts },
}

/// Normalizes a callback answer to its canonical decision.
pub fn normalize(answer: RouteAnswer) -> RouteDecision {
    match answer {
        RouteAnswer::Process => RouteDecision::Process {
            opts: RouteOpts::default(),
        },
        RouteAnswer::ProcessWith(opts) => RouteDecision::Process { opts },
        RouteAnswer::Proxy(targets) => RouteDecision::Proxy {
            targets,
            opts: RouteOpts::default(),
        },
        RouteAnswer::ProxyWith(targets, opts) => RouteDecision::Proxy { targets, opts },
        RouteAnswer::StrictProxy => RouteDecision::StrictProxy {
            opts: RouteOpts::default(),
        },
        RouteAnswer::StrictProxyWith(opts) => RouteDecision::StrictProxy { opts },
        RouteAnswer::Respond(reply, opts) => RouteDecision::Response { reply, opts },
        RouteAnswer::Bare(reply) => RouteDecision::Response {
            reply,
            opts: RouteOpts::stateless(),
        },
    }
}

/// Applies a route decision to the transaction, yielding follow-up actions.
pub fn dispatch(tx: &mut UasTx, decision: RouteDecision, cfg: &CallConfig) -> Vec<UasAction> {
    match decision {
        RouteDecision::Response { reply, opts } => {
            if opts.stateless && tx.method != Method::Invite {
                tx.stateless = true;
            }
            fsm::final_reply(tx, reply, TermReason::Responded)
        }
        RouteDecision::Process { opts } => dispatch_process(tx, opts, cfg),
        RouteDecision::Proxy { targets, opts } => vec![UasAction::CallProxy { targets, opts }],
        RouteDecision::StrictProxy { opts } => dispatch_strict(tx, opts, cfg),
    }
}

fn dispatch_process(tx: &mut UasTx, opts: RouteOpts, cfg: &CallConfig) -> Vec<UasAction> {
    // A CANCEL that reached routing has no local INVITE to terminate.
    if tx.method == Method::Cancel {
        return fsm::final_reply(tx, SipReply::NoTransaction, TermReason::Responded);
    }

    let unsupported: Vec<SmolStr> = tx
        .request
        .require_tokens()
        .into_iter()
        .filter(|token| !cfg.is_supported(token))
        .collect();
    if !unsupported.is_empty() {
        debug!(tx_id = %tx.id, tokens = ?unsupported, "unsupported Require extensions");
        return fsm::final_reply(
            tx,
            SipReply::BadExtension(unsupported),
            TermReason::Responded,
        );
    }

    if opts.stateless {
        if tx.method == Method::Invite {
            return fsm::final_reply(
                tx,
                SipReply::InternalError(SmolStr::new_static("Invalid SipApp reply")),
                TermReason::Error,
            );
        }
        tx.stateless = true;
    }

    // Dialog association is skipped for stateless transactions and for
    // out-of-dialog ACKs.
    if tx.stateless || (tx.method == Method::Ack && tx.request.to_tag().is_none()) {
        fsm::proceed(tx)
    } else {
        vec![UasAction::AskDialog]
    }
}

fn dispatch_strict(tx: &mut UasTx, mut opts: RouteOpts, cfg: &CallConfig) -> Vec<UasAction> {
    let routes: Vec<SipUri> = tx
        .request
        .headers
        .values("Route")
        .filter_map(|value| route_uri(value))
        .collect();
    if routes.is_empty() {
        return fsm::final_reply(
            tx,
            SipReply::InternalError(SmolStr::new_static("No Route header")),
            TermReason::Error,
        );
    }
    let targets = if cfg.strict_proxy_single_hop {
        opts.stateless = true;
        routes.into_iter().take(1).collect()
    } else {
        routes
    };
    vec![UasAction::CallProxy { targets, opts }]
}

/// Extracts the URI from a Route header value, stripping any display name
/// and angle brackets.
fn route_uri(value: &str) -> Option<SipUri> {
    let trimmed = value.trim();
    let inner = match (trimmed.find('<'), trimmed.rfind('>')) {
        (Some(start), Some(end)) if start < end => &trimmed[start + 1..end],
        _ => trimmed,
    };
    SipUri::parse(inner)
}

/// What the proxy collaborator did with a forwarded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyOutcome {
    /// Forwarded statelessly; the transaction terminates immediately.
    Stateless,
    /// The fork engine took over the listed branches and will deliver the
    /// selected response through its [`ProxyToken`].
    Fork { branches: Vec<SipUri> },
    /// Routing was impossible; answer locally with this reply.
    Reply(SipReply),
}

/// Handle the fork engine uses to deliver the best downstream response
/// upstream without referencing core internals.
#[derive(Debug, Clone)]
pub struct ProxyToken {
    pub(crate) tx_id: TxId,
    pub(crate) events: mpsc::Sender<CallEvent>,
}

impl ProxyToken {
    /// Forwards the selected final response upstream. Duplicate deliveries
    /// are discarded by the transaction.
    pub async fn forward_best(self, reply: SipReply) {
        let event = CallEvent::ProxyReply {
            tx_id: self.tx_id,
            reply,
        };
        if self.events.send(event).await.is_err() {
            debug!(tx_id = %self.tx_id, "fork result dropped: call is gone");
        }
    }
}

/// Interface to the downstream forwarding engine.
#[async_trait]
pub trait ProxyEngine: Send + Sync + 'static {
    async fn proxy(
        &self,
        request: Arc<Request>,
        targets: Vec<SipUri>,
        opts: RouteOpts,
        token: ProxyToken,
    ) -> ProxyOutcome;
}

/// Proxy engine for deployments that never forward: every proxy decision is
/// answered with a local error.
#[derive(Debug, Default)]
pub struct DenyProxyEngine;

#[async_trait]
impl ProxyEngine for DenyProxyEngine {
    async fn proxy(
        &self,
        _request: Arc<Request>,
        _targets: Vec<SipUri>,
        _opts: RouteOpts,
        _token: ProxyToken,
    ) -> ProxyOutcome {
        ProxyOutcome::Reply(SipReply::InternalError(SmolStr::new_static(
            "No proxy engine",
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_reply_implies_stateless_response() {
        let decision = normalize(RouteAnswer::Bare(SipReply::Ok));
        match decision {
            RouteDecision::Response { reply, opts } => {
                assert_eq!(reply.code(), 200);
                assert!(opts.stateless);
            }
            other => panic!("unexpected decision: {other:?}"),
        }
    }

    #[test]
    fn process_normalizes_with_default_opts() {
        match normalize(RouteAnswer::Process) {
            RouteDecision::Process { opts } => assert!(!opts.stateless),
            other => panic!("unexpected decision: {other:?}"),
        }
    }

    #[test]
    fn route_uri_strips_name_addr() {
        let uri = route_uri("\"next hop\" <sip:proxy.example.com;lr>").unwrap();
        assert_eq!(uri.host.as_str(), "proxy.example.com");
        assert!(route_uri("not a uri").is_none());
    }
}
