// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Server-side SIP transaction core (RFC 3261 §17.2).
//!
//! A [`Call`](call::Call) aggregates every transaction sharing a Call-ID and
//! runs them on one single-writer actor task. Incoming requests are driven
//! through the UAS state machine (`authorize → route → process`), consulting
//! the application through the [`SipApp`](app::SipApp) callback surface and a
//! deterministic [`Plugin`](app::Plugin) chain, and answering through the
//! reply engine. Loop detection, CANCEL/INVITE matching, named transaction
//! timers and dialog coupling are handled here; wire parsing, transports,
//! the registrar and the client side live with external collaborators.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use sip_call::{AppHandle, CallConfig, CallRouter};
//! # use sip_call::reply::TransportSink;
//! # fn sink() -> Arc<dyn TransportSink> { unimplemented!() }
//! let app = AppHandle::stateless_default("demo");
//! let router = CallRouter::new(app, Arc::new(CallConfig::default()), sink());
//! ```

pub mod app;
pub mod call;
pub mod cancel;
pub mod config;
pub mod dialog;
pub mod fsm;
pub mod loop_check;
pub mod metrics;
pub mod reply;
pub mod route;
pub mod router;
pub mod timers;
pub mod tx;

pub use app::{
    AppHandle, AuthDecision, AuthTokens, CallbackKind, CallbackReply, CallbackValue, MethodAnswer,
    Plugin, ReplyToken, SipApp,
};
pub use call::{Call, CallDeps, CallEvent, CallHandle};
pub use config::CallConfig;
pub use dialog::{DialogEngine, DialogError, DialogId, NullDialogEngine};
pub use fsm::{TermReason, UasAction, UasEvent};
pub use metrics::{CoreMetrics, MetricsSnapshot};
pub use reply::{SipReply, TransportSink};
pub use route::{ProxyEngine, ProxyOutcome, ProxyToken, RouteAnswer, RouteDecision, RouteOpts};
pub use router::CallRouter;
pub use timers::{TimerName, TimerTable};
pub use tx::{TransKey, TxId, TxState, UasTx};
