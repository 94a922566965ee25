// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! UAS transaction state machine.
//!
//! [`step`] is a pure transition function: it mutates only the given
//! transaction record and returns the actions the call actor must carry
//! out. Events that do not apply to the current state are absorbed and
//! return no actions, which implements the "already answered" rule: late
//! replies, duplicate finals and stale timer firings all fall through
//! harmlessly.

use std::time::Duration;

use sip_core::{Method, SipUri};
use smol_str::SmolStr;

use crate::app::{AuthDecision, CallbackKind, MethodAnswer};
use crate::config::CallConfig;
use crate::dialog::DialogError;
use crate::reply::SipReply;
use crate::route::{self, ProxyOutcome, RouteDecision, RouteOpts};
use crate::timers::TimerName;
use crate::tx::{TxState, UasTx};

/// Events that drive a UAS transaction.
#[derive(Debug, Clone)]
pub enum UasEvent {
    /// The transaction was registered; start timers and authorization.
    Start,
    /// The `authorize` callback (or its default) produced a decision.
    Authorized(AuthDecision),
    /// The `route` callback (or its default) produced a decision.
    Routed(RouteDecision),
    /// The dialog collaborator associated the request.
    DialogReady,
    /// The dialog collaborator refused the request.
    DialogRejected(DialogError),
    /// A method handler callback produced an answer.
    MethodReplied(MethodAnswer),
    /// An application callback failed.
    AppErrored(CallbackKind, SmolStr),
    /// The proxy collaborator resolved a forwarding decision.
    ProxyResolved(ProxyOutcome),
    /// The fork engine delivered the selected downstream response.
    ForkReplied(SipReply),
    /// A matching CANCEL terminates this INVITE.
    Cancelled,
    /// A named timer fired.
    TimerFired(TimerName),
    /// Sending a response failed.
    TransportFailed,
}

/// Actions the call actor executes after a step.
#[derive(Debug, Clone)]
pub enum UasAction {
    InvokeApp(CallbackKind),
    AskDialog,
    CallProxy { targets: Vec<SipUri>, opts: RouteOpts },
    RegisterFork { branches: Vec<SipUri> },
    SendProvisional(SipReply),
    SendFinal(SipReply),
    Arm(TimerName, Duration),
    CancelTimer(TimerName),
    CancelAllTimers,
    NotifyDialogAck,
    Terminate(TermReason),
}

/// Why a transaction reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermReason {
    Responded,
    Cancelled,
    TimedOut,
    Expired,
    Proxied,
    AckDone,
    Error,
}

impl TermReason {
    /// Returns a stable label for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            TermReason::Responded => "responded",
            TermReason::Cancelled => "cancelled",
            TermReason::TimedOut => "timed out",
            TermReason::Expired => "expired",
            TermReason::Proxied => "proxied",
            TermReason::AckDone => "ack done",
            TermReason::Error => "error",
        }
    }
}

/// Advances the transaction by one event.
pub fn step(tx: &mut UasTx, event: UasEvent, cfg: &CallConfig) -> Vec<UasAction> {
    if tx.state == TxState::Finished {
        return Vec::new();
    }
    match (tx.state, event) {
        (TxState::Authorize, UasEvent::Start) => on_start(tx, cfg),
        (TxState::Authorize, UasEvent::Authorized(decision)) => on_authorized(tx, decision),
        (TxState::Route, UasEvent::Routed(decision)) => route::dispatch(tx, decision, cfg),
        (TxState::Route, UasEvent::DialogReady) => proceed(tx),
        (TxState::Route, UasEvent::DialogRejected(err)) => {
            final_reply(tx, err.to_reply(), TermReason::Responded)
        }
        (TxState::Route, UasEvent::ProxyResolved(outcome)) => on_proxy_resolved(tx, outcome),
        (TxState::InviteProceeding | TxState::Trying, UasEvent::MethodReplied(answer)) => {
            on_method_reply(tx, answer)
        }
        (TxState::InviteProceeding | TxState::Trying, UasEvent::ForkReplied(reply)) => {
            final_reply(tx, reply, TermReason::Responded)
        }
        (_, UasEvent::Cancelled) if tx.state.accepts_cancel() => {
            final_reply(tx, SipReply::RequestTerminated, TermReason::Cancelled)
        }
        (_, UasEvent::AppErrored(..)) if !tx.state.is_past_final() => final_reply(
            tx,
            SipReply::InternalError(SmolStr::new_static("SipApp Error")),
            TermReason::Error,
        ),
        (_, UasEvent::TimerFired(name)) => on_timer(tx, name),
        (_, UasEvent::TransportFailed) => on_transport_failed(tx),
        _ => Vec::new(),
    }
}

fn on_start(tx: &mut UasTx, cfg: &CallConfig) -> Vec<UasAction> {
    let mut actions = Vec::new();
    match tx.method {
        Method::Invite => {
            actions.push(UasAction::Arm(TimerName::TimerC, cfg.timer_c));
            if tx.transport.kind.is_unreliable() {
                actions.push(UasAction::Arm(TimerName::Prov100, cfg.t1));
            }
            if let Some(secs) = tx.request.expires() {
                actions.push(UasAction::Arm(
                    TimerName::Expire,
                    Duration::from_secs(secs),
                ));
            }
        }
        Method::Ack => {}
        _ => actions.push(UasAction::Arm(TimerName::NonInvite, cfg.non_invite_timeout)),
    }
    actions.push(UasAction::InvokeApp(CallbackKind::Authorize));
    actions
}

fn on_authorized(tx: &mut UasTx, decision: AuthDecision) -> Vec<UasAction> {
    match decision {
        AuthDecision::Ok => {
            tx.state = TxState::Route;
            vec![UasAction::InvokeApp(CallbackKind::Route)]
        }
        AuthDecision::Forbidden => final_reply(tx, SipReply::Forbidden, TermReason::Responded),
        AuthDecision::Authenticate { realm } => {
            let realm = realm.unwrap_or_else(|| tx.ruri.host.clone());
            final_reply(tx, SipReply::Authenticate { realm }, TermReason::Responded)
        }
        AuthDecision::ProxyAuthenticate { realm } => {
            let realm = realm.unwrap_or_else(|| tx.ruri.host.clone());
            final_reply(
                tx,
                SipReply::ProxyAuthenticate { realm },
                TermReason::Responded,
            )
        }
        AuthDecision::Reply(reply) => final_reply(tx, reply, TermReason::Responded),
    }
}

/// Enters the processing phase: invokes the method handler, or for ACK
/// notifies the dialog and terminates without a response.
pub(crate) fn proceed(tx: &mut UasTx) -> Vec<UasAction> {
    if tx.method == Method::Ack {
        tx.state = TxState::Ack;
        return vec![
            UasAction::InvokeApp(CallbackKind::Ack),
            UasAction::NotifyDialogAck,
            UasAction::Terminate(TermReason::AckDone),
        ];
    }

    let in_dialog = tx.request.to_tag().is_some();
    match CallbackKind::for_method(&tx.method, in_dialog) {
        Some(kind) => {
            tx.state = if tx.method == Method::Invite {
                TxState::InviteProceeding
            } else {
                TxState::Trying
            };
            vec![UasAction::InvokeApp(kind)]
        }
        // No handler exists for this method.
        None => final_reply(tx, SipReply::MethodNotAllowed, TermReason::Responded),
    }
}

fn on_method_reply(tx: &mut UasTx, answer: MethodAnswer) -> Vec<UasAction> {
    match answer {
        MethodAnswer::Reply(reply) if !reply.is_final() => {
            let mut actions = vec![UasAction::CancelTimer(TimerName::Prov100)];
            if reply.code() > 100 {
                tx.provisional_sent = true;
            }
            actions.push(UasAction::SendProvisional(reply));
            actions
        }
        MethodAnswer::Reply(reply) => final_reply(tx, reply, TermReason::Responded),
        MethodAnswer::NoReply => Vec::new(),
    }
}

fn on_proxy_resolved(tx: &mut UasTx, outcome: ProxyOutcome) -> Vec<UasAction> {
    match outcome {
        ProxyOutcome::Stateless => {
            tx.stateless = true;
            tx.state = TxState::Completed;
            vec![
                UasAction::CancelAllTimers,
                UasAction::Terminate(TermReason::Proxied),
            ]
        }
        ProxyOutcome::Fork { branches } => {
            tx.state = if tx.method == Method::Invite {
                TxState::InviteProceeding
            } else {
                TxState::Trying
            };
            vec![UasAction::RegisterFork { branches }]
        }
        ProxyOutcome::Reply(reply) => final_reply(tx, reply, TermReason::Responded),
    }
}

fn on_timer(tx: &mut UasTx, name: TimerName) -> Vec<UasAction> {
    match name {
        TimerName::Prov100
            if tx.state.accepts_cancel() && !tx.provisional_sent && tx.status == 0 =>
        {
            vec![UasAction::SendProvisional(SipReply::Trying)]
        }
        TimerName::TimerC | TimerName::NonInvite if !tx.state.is_past_final() => {
            final_reply(tx, SipReply::Timeout, TermReason::TimedOut)
        }
        TimerName::Expire if tx.state.accepts_cancel() => {
            final_reply(tx, SipReply::RequestTerminated, TermReason::Expired)
        }
        TimerName::App(kind)
            if tx.pending.map_or(false, |p| p.kind == kind) && !tx.state.is_past_final() =>
        {
            final_reply(
                tx,
                SipReply::InternalError(SmolStr::new_static("timeout")),
                TermReason::TimedOut,
            )
        }
        _ => Vec::new(),
    }
}

fn on_transport_failed(tx: &mut UasTx) -> Vec<UasAction> {
    if tx.transport_failed || tx.state.is_past_final() {
        tx.state = TxState::Completed;
        return vec![
            UasAction::CancelAllTimers,
            UasAction::Terminate(TermReason::Error),
        ];
    }
    tx.transport_failed = true;
    final_reply(tx, SipReply::ServiceUnavailable, TermReason::Error)
}

/// Emits the transaction's one final response and tears it down.
///
/// ACK transactions never produce a response: the reply is discarded and
/// the record terminates silently. A reply below 200 where a final is
/// required is a protocol violation by the application and becomes 500.
pub(crate) fn final_reply(tx: &mut UasTx, reply: SipReply, reason: TermReason) -> Vec<UasAction> {
    if tx.state.is_past_final() {
        return Vec::new();
    }
    if tx.method == Method::Ack {
        tx.state = TxState::Completed;
        return vec![
            UasAction::CancelAllTimers,
            UasAction::Terminate(TermReason::AckDone),
        ];
    }
    let reply = if reply.is_final() {
        reply
    } else {
        SipReply::InternalError(SmolStr::new_static("Invalid SipApp reply"))
    };
    tx.state = TxState::Completed;
    vec![
        UasAction::CancelAllTimers,
        UasAction::SendFinal(reply),
        UasAction::Terminate(reason),
    ]
}
