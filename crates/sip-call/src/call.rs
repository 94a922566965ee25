// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The per-Call-ID actor.
//!
//! A [`Call`] owns every transaction sharing one Call-ID and processes all
//! of their events on a single task, in arrival order. Nothing else mutates
//! transaction state: application callbacks, timers and the proxy engine
//! all communicate by posting [`CallEvent`]s back to the actor, so a CANCEL
//! that arrives after an INVITE's final response can never race ahead of
//! it, and late asynchronous callback replies are checked against the state
//! that issued them before they are applied.
//!
//! The actor lingers for one retransmission window after its last
//! transaction finishes, replaying final responses for repeated requests,
//! then stops and removes itself from the router.

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use dashmap::DashMap;
use sip_core::{Request, Response, TransportContext};
use smol_str::SmolStr;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, info, trace, warn};

use crate::app::{
    self, AppHandle, AuthTokens, CallbackArgs, CallbackKind, CallbackReply, CallbackValue,
    MethodAnswer, ReplyToken, RouteTarget,
};
use crate::cancel::{self, CancelOutcome};
use crate::config::CallConfig;
use crate::dialog::{DialogEngine, NullDialogEngine};
use crate::fsm::{self, TermReason, UasAction, UasEvent};
use crate::loop_check;
use crate::metrics::CoreMetrics;
use crate::reply::{self, SipReply, TransportSink};
use crate::route::{self, DenyProxyEngine, ProxyEngine, ProxyToken, RouteOpts};
use crate::timers::TimerName;
use crate::tx::{ForkLink, PendingCallback, TransKey, TxId, TxState, UasTx};

/// Events processed by the call actor, serialized in arrival order.
#[derive(Debug)]
pub enum CallEvent {
    /// A parsed request delivered by the router.
    Request {
        request: Arc<Request>,
        ctx: TransportContext,
    },
    /// An asynchronous application callback value.
    AppReply {
        tx_id: TxId,
        kind: CallbackKind,
        issued_in: TxState,
        value: CallbackValue,
    },
    /// A named timer fired.
    Timer { tx_id: TxId, name: TimerName },
    /// The fork engine selected the downstream response to forward.
    ProxyReply { tx_id: TxId, reply: SipReply },
}

/// Collaborators shared by every call of one application.
#[derive(Clone)]
pub struct CallDeps {
    pub app: AppHandle,
    pub cfg: Arc<CallConfig>,
    pub dialog: Arc<dyn DialogEngine>,
    pub proxy: Arc<dyn ProxyEngine>,
    pub sink: Arc<dyn TransportSink>,
    pub metrics: CoreMetrics,
}

impl CallDeps {
    /// Creates dependencies with no-op dialog and proxy collaborators.
    pub fn new(app: AppHandle, cfg: Arc<CallConfig>, sink: Arc<dyn TransportSink>) -> Self {
        Self {
            app,
            cfg,
            dialog: Arc::new(NullDialogEngine),
            proxy: Arc::new(DenyProxyEngine),
            sink,
            metrics: CoreMetrics::new(),
        }
    }

    /// Replaces the dialog engine.
    pub fn with_dialog(mut self, dialog: Arc<dyn DialogEngine>) -> Self {
        self.dialog = dialog;
        self
    }

    /// Replaces the proxy engine.
    pub fn with_proxy(mut self, proxy: Arc<dyn ProxyEngine>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Replaces the metrics handle.
    pub fn with_metrics(mut self, metrics: CoreMetrics) -> Self {
        self.metrics = metrics;
        self
    }
}

/// Cheap handle used to post events to a call actor.
#[derive(Debug, Clone)]
pub struct CallHandle {
    pub call_id: SmolStr,
    events: mpsc::Sender<CallEvent>,
}

impl CallHandle {
    /// Delivers a parsed request to the call actor.
    pub async fn deliver(&self, request: Arc<Request>, ctx: TransportContext) -> Result<()> {
        self.events
            .send(CallEvent::Request { request, ctx })
            .await
            .map_err(|_| anyhow!("call actor for {} is gone", self.call_id))
    }

    /// Returns the raw event sender.
    pub fn sender(&self) -> mpsc::Sender<CallEvent> {
        self.events.clone()
    }

    /// Returns `true` once the call actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }

    pub(crate) fn same_actor(&self, events: &mpsc::Sender<CallEvent>) -> bool {
        self.events.same_channel(events)
    }
}

/// Aggregate of all transactions sharing a Call-ID.
pub struct Call {
    id: SmolStr,
    deps: CallDeps,
    txs: Vec<UasTx>,
    /// Recently sent final responses, replayed for request retransmissions.
    sent: VecDeque<(TransKey, Response)>,
    next_tx: u64,
    events_tx: mpsc::Sender<CallEvent>,
    registry: Option<Arc<DashMap<SmolStr, CallHandle>>>,
}

impl Call {
    /// Spawns the call actor and returns its handle.
    pub fn spawn(call_id: impl Into<SmolStr>, deps: CallDeps) -> CallHandle {
        Self::spawn_registered(call_id.into(), deps, None)
    }

    pub(crate) fn spawn_registered(
        call_id: SmolStr,
        deps: CallDeps,
        registry: Option<Arc<DashMap<SmolStr, CallHandle>>>,
    ) -> CallHandle {
        let (events_tx, events_rx) = mpsc::channel(64);
        let handle = CallHandle {
            call_id: call_id.clone(),
            events: events_tx.clone(),
        };
        deps.metrics.record_call_started();
        info!(call_id = %call_id, app = %deps.app.id, "call started");
        let call = Call {
            id: call_id,
            deps,
            txs: Vec::new(),
            sent: VecDeque::new(),
            next_tx: 1,
            events_tx,
            registry,
        };
        tokio::spawn(call.run(events_rx));
        handle
    }

    async fn run(mut self, mut events_rx: mpsc::Receiver<CallEvent>) {
        loop {
            let event = if self.txs.iter().all(|tx| tx.is_finished()) {
                // Idle: stay alive one retransmission window, then stop.
                tokio::select! {
                    event = events_rx.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                    _ = time::sleep(self.deps.cfg.non_invite_timeout) => break,
                }
            } else {
                match events_rx.recv().await {
                    Some(event) => event,
                    None => break,
                }
            };
            self.handle(event).await;
            self.reap();
        }
        if let Some(registry) = &self.registry {
            registry.remove_if(&self.id, |_, handle| handle.same_actor(&self.events_tx));
        }
        self.deps.metrics.record_call_finished();
        info!(call_id = %self.id, "call finished");
    }

    async fn handle(&mut self, event: CallEvent) {
        match event {
            CallEvent::Request { request, ctx } => self.on_request(request, ctx).await,
            CallEvent::AppReply {
                tx_id,
                kind,
                issued_in,
                value,
            } => self.on_app_reply(tx_id, kind, issued_in, value).await,
            CallEvent::Timer { tx_id, name } => self.on_timer(tx_id, name).await,
            CallEvent::ProxyReply { tx_id, reply } => {
                self.drive(tx_id, UasEvent::ForkReplied(reply)).await
            }
        }
    }

    async fn on_request(&mut self, request: Arc<Request>, ctx: TransportContext) {
        self.deps.metrics.record_request();
        let key = TransKey::from_request(&request);

        // Retransmission of a live transaction: replay, never advance state.
        if let Some(tx) = self
            .txs
            .iter()
            .find(|tx| !tx.is_finished() && tx.trans_key == key)
        {
            let last = tx.last_sent.clone();
            debug!(call_id = %self.id, tx_id = %tx.id, "request retransmission absorbed");
            self.deps.metrics.record_retransmission();
            if let Some(response) = last {
                let _ = self.deps.sink.send(&response, &ctx).await;
            }
            return;
        }

        // Retransmission of an answered transaction: replay the final.
        if !request.start.method.is_ack() {
            let replay = self
                .sent
                .iter()
                .rev()
                .find(|(sent_key, _)| *sent_key == key)
                .map(|(_, response)| response.clone());
            if let Some(response) = replay {
                debug!(call_id = %self.id, "replaying final response for retransmission");
                self.deps.metrics.record_retransmission();
                let _ = self.deps.sink.send(&response, &ctx).await;
                return;
            }
        }

        if request.start.method.is_cancel() {
            self.on_cancel(request, ctx, key).await;
            return;
        }

        self.start_transaction(request, ctx, key).await;
    }

    /// CANCEL is intercepted before the application FSM: a matching INVITE
    /// is answered 200 + terminated; without one the CANCEL proceeds like
    /// any other request so the application may still proxy it.
    async fn on_cancel(&mut self, request: Arc<Request>, ctx: TransportContext, key: TransKey) {
        match cancel::match_cancel(&self.txs, &key, ctx.peer) {
            CancelOutcome::Matched(invite_id) => {
                self.deps.metrics.record_cancel(true);
                info!(call_id = %self.id, invite = %invite_id, "CANCEL matched INVITE");
                // 200 for the CANCEL first, then the 487 injection; both
                // happen inside this one event step, so the pair cannot be
                // observed partially.
                self.answer_direct(&request, &ctx, SipReply::Ok, Some(key)).await;
                self.drive(invite_id, UasEvent::Cancelled).await;
            }
            CancelOutcome::SourceMismatch => {
                self.deps.metrics.record_cancel(false);
                warn!(call_id = %self.id, peer = %ctx.peer, "CANCEL source does not match INVITE");
                self.answer_direct(&request, &ctx, SipReply::NoTransaction, Some(key))
                    .await;
            }
            CancelOutcome::TooLate => {
                self.deps.metrics.record_cancel(false);
                debug!(call_id = %self.id, "CANCEL after final response");
                self.answer_direct(&request, &ctx, SipReply::NoTransaction, Some(key))
                    .await;
            }
            CancelOutcome::NotFound => {
                self.deps.metrics.record_cancel(false);
                self.start_transaction(request, ctx, key).await;
            }
        }
    }

    async fn start_transaction(
        &mut self,
        request: Arc<Request>,
        ctx: TransportContext,
        key: TransKey,
    ) {
        if !self.deps.cfg.is_allowed(request.method()) {
            debug!(call_id = %self.id, method = %request.method(), "method not allowed");
            self.answer_direct(&request, &ctx, SipReply::MethodNotAllowed, Some(key))
                .await;
            return;
        }

        let live = self.txs.iter().filter(|tx| !tx.is_finished()).count();
        if live >= self.deps.cfg.max_transactions {
            warn!(call_id = %self.id, live, "transaction limit reached");
            self.answer_direct(&request, &ctx, SipReply::ServiceUnavailable, Some(key))
                .await;
            return;
        }

        let loop_id = loop_check::loop_id(&self.deps.app.id, &request);
        if let Some(fingerprint) = loop_id {
            if loop_check::is_duplicate(&self.txs, fingerprint) {
                self.deps.metrics.record_loop_detected();
                warn!(call_id = %self.id, method = %request.method(), "loop detected");
                self.answer_direct(&request, &ctx, SipReply::LoopDetected, Some(key))
                    .await;
                return;
            }
        }

        let tx_id = TxId(self.next_tx);
        self.next_tx += 1;
        let is_invite = request.start.method.is_invite();
        let tx = UasTx::new(tx_id, key, request, ctx, loop_id, reply::generate_tag());
        info!(
            call_id = %self.id,
            tx_id = %tx_id,
            method = %tx.method,
            state = ?tx.state,
            "UAS transaction created"
        );
        self.deps.metrics.record_tx_created();
        self.txs.push(tx);

        if is_invite {
            if let Some(event) = self.send_reply(tx_id, SipReply::Trying).await {
                self.drive(tx_id, event).await;
                if self.tx(tx_id).map_or(true, |tx| tx.is_finished()) {
                    return;
                }
            }
        }
        self.drive(tx_id, UasEvent::Start).await;
    }

    async fn on_app_reply(
        &mut self,
        tx_id: TxId,
        kind: CallbackKind,
        issued_in: TxState,
        value: CallbackValue,
    ) {
        let Some(tx) = self.tx_mut(tx_id) else {
            debug!(tx_id = %tx_id, kind = kind.as_str(), "app reply for unknown transaction discarded");
            return;
        };
        let matches = tx
            .pending
            .map_or(false, |pending| pending.kind == kind && tx.state == issued_in);
        if !matches {
            debug!(
                tx_id = %tx_id,
                kind = kind.as_str(),
                state = ?tx.state,
                "late app reply discarded"
            );
            return;
        }
        // A provisional leaves the callback open: the final is still owed
        // through the same token.
        if !keeps_callback_open(&value) {
            tx.pending = None;
            tx.timers.cancel(TimerName::App(kind));
        }
        if let Some(event) = value_event(kind, value) {
            self.drive(tx_id, event).await;
        }
    }

    async fn on_timer(&mut self, tx_id: TxId, name: TimerName) {
        let Some(tx) = self.tx_mut(tx_id) else {
            trace!(tx_id = %tx_id, timer = name.label(), "timer for reaped transaction dropped");
            return;
        };
        if tx.is_finished() {
            debug!(tx_id = %tx_id, timer = name.label(), "timer after finish dropped");
            return;
        }
        tx.timers.cancel(name);
        if let TimerName::App(kind) = name {
            if tx.pending.map_or(false, |pending| pending.kind == kind) {
                warn!(tx_id = %tx_id, kind = kind.as_str(), "app callback timed out");
                self.deps.metrics.record_app_timeout();
            }
        }
        self.drive(tx_id, UasEvent::TimerFired(name)).await;
    }

    /// Runs FSM steps until the event queue drains. Synchronous callback
    /// replies are fed back in the same step, so a request can travel
    /// `authorize → route → process → response` in one pass.
    async fn drive(&mut self, tx_id: TxId, first: UasEvent) {
        let cfg = self.deps.cfg.clone();
        let mut events = VecDeque::new();
        events.push_back(first);
        while let Some(event) = events.pop_front() {
            let Some(tx) = self.tx_mut(tx_id) else { return };
            if tx.is_finished() {
                debug!(tx_id = %tx_id, "event for finished transaction absorbed");
                return;
            }
            let actions = fsm::step(tx, event, &cfg);
            for action in actions {
                match action {
                    UasAction::InvokeApp(kind) => {
                        if let Some(event) = self.invoke_app(tx_id, kind).await {
                            events.push_back(event);
                        }
                    }
                    UasAction::AskDialog => {
                        if let Some(event) = self.ask_dialog(tx_id).await {
                            events.push_back(event);
                        }
                    }
                    UasAction::CallProxy { targets, opts } => {
                        if let Some(event) = self.call_proxy(tx_id, targets, opts).await {
                            events.push_back(event);
                        }
                    }
                    UasAction::RegisterFork { branches } => self.register_fork(tx_id, branches),
                    UasAction::SendProvisional(reply) | UasAction::SendFinal(reply) => {
                        if let Some(event) = self.send_reply(tx_id, reply).await {
                            events.push_back(event);
                        }
                    }
                    UasAction::Arm(name, after) => {
                        let events_tx = self.events_tx.clone();
                        if let Some(tx) = self.tx_mut(tx_id) {
                            tx.timers.arm(name, after, tx_id, events_tx);
                        }
                    }
                    UasAction::CancelTimer(name) => {
                        if let Some(tx) = self.tx_mut(tx_id) {
                            tx.timers.cancel(name);
                        }
                    }
                    UasAction::CancelAllTimers => {
                        if let Some(tx) = self.tx_mut(tx_id) {
                            tx.timers.cancel_all();
                        }
                    }
                    UasAction::NotifyDialogAck => {
                        if let Some(request) = self.tx(tx_id).map(|tx| tx.request.clone()) {
                            self.deps.dialog.on_ack(&request).await;
                        }
                    }
                    UasAction::Terminate(reason) => self.finish_tx(tx_id, reason),
                }
            }
        }
    }

    async fn invoke_app(&mut self, tx_id: TxId, kind: CallbackKind) -> Option<UasEvent> {
        let (request, issued_in, auth, target) = {
            let tx = self.tx_mut(tx_id)?;
            let auth = (kind == CallbackKind::Authorize).then(|| auth_tokens(&tx.request));
            let target = (kind == CallbackKind::Route).then(|| RouteTarget {
                scheme: SmolStr::new_static(if tx.ruri.sips { "sips" } else { "sip" }),
                user: tx.ruri.user.clone().unwrap_or_default(),
                domain: tx.ruri.host.clone(),
            });
            tx.pending = Some(PendingCallback {
                kind,
                issued_in: tx.state,
            });
            (tx.request.clone(), tx.state, auth, target)
        };
        let token = ReplyToken {
            kind,
            tx_id,
            issued_in,
            events: self.events_tx.clone(),
        };
        let args = CallbackArgs {
            kind,
            request,
            auth,
            target,
        };
        match self.deps.app.invoke(args, token).await {
            CallbackReply::Value(value) => {
                if !keeps_callback_open(&value) {
                    self.clear_pending(tx_id);
                }
                value_event(kind, value)
            }
            CallbackReply::Async => {
                trace!(tx_id = %tx_id, kind = kind.as_str(), "app callback went async");
                let app_timeout = self.deps.cfg.app_timeout;
                let events_tx = self.events_tx.clone();
                if let Some(tx) = self.tx_mut(tx_id) {
                    tx.timers
                        .arm(TimerName::App(kind), app_timeout, tx_id, events_tx);
                }
                None
            }
            CallbackReply::NotExported => {
                self.clear_pending(tx_id);
                value_event(kind, app::default_value(kind))
            }
            CallbackReply::Error(reason) => {
                self.clear_pending(tx_id);
                self.deps.metrics.record_app_error();
                tracing::error!(tx_id = %tx_id, kind = kind.as_str(), %reason, "app callback failed");
                Some(UasEvent::AppErrored(kind, reason))
            }
        }
    }

    fn clear_pending(&mut self, tx_id: TxId) {
        if let Some(tx) = self.tx_mut(tx_id) {
            tx.pending = None;
        }
    }

    async fn ask_dialog(&mut self, tx_id: TxId) -> Option<UasEvent> {
        let (request, local_tag, is_ack) = {
            let tx = self.tx(tx_id)?;
            (tx.request.clone(), tx.local_tag.clone(), tx.method.is_ack())
        };
        match self.deps.dialog.dialog_request(&request, &local_tag).await {
            Ok(dialog_id) => {
                trace!(tx_id = %tx_id, dialog = ?dialog_id, "dialog associated");
                Some(UasEvent::DialogReady)
            }
            Err(error) => {
                if is_ack {
                    info!(tx_id = %tx_id, %error, "ACK without dialog dropped");
                } else {
                    debug!(tx_id = %tx_id, %error, "dialog refused request");
                }
                Some(UasEvent::DialogRejected(error))
            }
        }
    }

    async fn call_proxy(
        &mut self,
        tx_id: TxId,
        targets: Vec<sip_core::SipUri>,
        opts: RouteOpts,
    ) -> Option<UasEvent> {
        let request = self.tx(tx_id)?.request.clone();
        let token = ProxyToken {
            tx_id,
            events: self.events_tx.clone(),
        };
        let outcome = self.deps.proxy.proxy(request, targets, opts, token).await;
        Some(UasEvent::ProxyResolved(outcome))
    }

    /// Records the fork engine's takeover as a child transaction so the
    /// call stays alive until the selected response comes back upstream.
    fn register_fork(&mut self, tx_id: TxId, branches: Vec<sip_core::SipUri>) {
        let Some((parent_key, request, transport, local_tag)) = self.tx(tx_id).map(|parent| {
            (
                parent.trans_key.clone(),
                parent.request.clone(),
                parent.transport,
                parent.local_tag.clone(),
            )
        }) else {
            return;
        };
        let child_id = TxId(self.next_tx);
        self.next_tx += 1;
        let key = TransKey {
            branch: SmolStr::new(format!("{}.fork{}", parent_key.branch, child_id.0)),
            sent_by: parent_key.sent_by.clone(),
            method: parent_key.method.clone(),
        };
        let mut child = UasTx::new(child_id, key, request, transport, None, local_tag);
        child.state = TxState::Trying;
        child.fork = Some(ForkLink { parent: tx_id });
        info!(
            call_id = %self.id,
            tx_id = %tx_id,
            fork = %child_id,
            branches = branches.len(),
            "fork engine took over"
        );
        self.deps.metrics.record_tx_created();
        self.txs.push(child);
    }

    /// Builds and sends a response for the transaction. Returns a
    /// `TransportFailed` event when dispatch fails.
    async fn send_reply(&mut self, tx_id: TxId, sip_reply: SipReply) -> Option<UasEvent> {
        let cfg = self.deps.cfg.clone();
        let (response, ctx, stateless) = {
            let tx = self.tx_mut(tx_id)?;
            if sip_reply.is_final() && tx.status >= 200 {
                debug!(tx_id = %tx_id, "final response already sent");
                return None;
            }
            let response = reply::build(&tx.request, &sip_reply, &tx.local_tag, &cfg);
            (response, tx.transport, tx.stateless)
        };
        match self.deps.sink.send(&response, &ctx).await {
            Ok(()) => {
                self.deps.metrics.record_response(response.start.code);
                let code = response.start.code;
                let mut log_entry = None;
                if let Some(tx) = self.tx_mut(tx_id) {
                    if code >= 200 {
                        tx.status = code;
                        tx.response = Some(response.clone());
                        if !stateless {
                            log_entry = Some((tx.trans_key.clone(), response.clone()));
                        }
                    }
                    tx.last_sent = Some(response);
                }
                if let Some((key, response)) = log_entry {
                    self.push_sent(key, response);
                }
                None
            }
            Err(error) => {
                warn!(tx_id = %tx_id, %error, "response dispatch failed");
                Some(UasEvent::TransportFailed)
            }
        }
    }

    /// Answers a request that never becomes (or already lost) a transaction.
    async fn answer_direct(
        &mut self,
        request: &Request,
        ctx: &TransportContext,
        sip_reply: SipReply,
        key: Option<TransKey>,
    ) {
        let response = reply::build(request, &sip_reply, &reply::generate_tag(), &self.deps.cfg);
        match self.deps.sink.send(&response, ctx).await {
            Ok(()) => {
                self.deps.metrics.record_response(response.start.code);
                if let Some(key) = key {
                    self.push_sent(key, response);
                }
            }
            Err(error) => {
                warn!(call_id = %self.id, %error, "direct response dispatch failed");
            }
        }
    }

    fn push_sent(&mut self, key: TransKey, response: Response) {
        self.sent.push_back((key, response));
        while self.sent.len() > self.deps.cfg.sent_log_capacity {
            self.sent.pop_front();
        }
    }

    fn finish_tx(&mut self, tx_id: TxId, reason: TermReason) {
        if let Some(tx) = self.tx_mut(tx_id) {
            if tx.is_finished() {
                return;
            }
            tx.timers.cancel_all();
            tx.finish();
            info!(
                call_id = %self.id,
                tx_id = %tx_id,
                reason = reason.as_str(),
                "UAS transaction finished"
            );
            self.deps.metrics.record_tx_finished();
        }
        let children: Vec<TxId> = self
            .txs
            .iter()
            .filter(|tx| {
                !tx.is_finished() && tx.fork.map_or(false, |link| link.parent == tx_id)
            })
            .map(|tx| tx.id)
            .collect();
        for child in children {
            self.finish_tx(child, reason);
        }
    }

    fn reap(&mut self) {
        self.txs.retain(|tx| !tx.reapable());
    }

    fn tx(&self, tx_id: TxId) -> Option<&UasTx> {
        self.txs.iter().find(|tx| tx.id == tx_id)
    }

    fn tx_mut(&mut self, tx_id: TxId) -> Option<&mut UasTx> {
        self.txs.iter_mut().find(|tx| tx.id == tx_id)
    }
}

/// Translates a callback value into the FSM event it answers. Values whose
/// shape does not fit the callback are a protocol violation and become 500.
fn value_event(kind: CallbackKind, value: CallbackValue) -> Option<UasEvent> {
    match (kind, value) {
        (CallbackKind::Authorize, CallbackValue::Authorize(decision)) => {
            Some(UasEvent::Authorized(decision))
        }
        (CallbackKind::Route, CallbackValue::Route(answer)) => {
            Some(UasEvent::Routed(route::normalize(answer)))
        }
        (CallbackKind::Ack, _) => None,
        (CallbackKind::Authorize | CallbackKind::Route, _) => Some(UasEvent::AppErrored(
            kind,
            SmolStr::new_static("Invalid SipApp reply"),
        )),
        (_, CallbackValue::Method(answer)) => Some(UasEvent::MethodReplied(answer)),
        (_, _) => Some(UasEvent::AppErrored(
            kind,
            SmolStr::new_static("Invalid SipApp reply"),
        )),
    }
}

/// A provisional method reply keeps the issuing callback outstanding; only
/// a final (or a terminal error) consumes it.
fn keeps_callback_open(value: &CallbackValue) -> bool {
    matches!(
        value,
        CallbackValue::Method(MethodAnswer::Reply(reply)) if !reply.is_final()
    )
}

fn auth_tokens(request: &Request) -> AuthTokens {
    AuthTokens {
        in_dialog: request.to_tag().is_some(),
        authorization: request.headers.value("Authorization").cloned(),
        proxy_authorization: request.headers.value("Proxy-Authorization").cloned(),
    }
}
