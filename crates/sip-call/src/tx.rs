// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-request server transaction record.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;

use sip_core::{Method, Request, Response, SipUri, TransportContext};
use smol_str::SmolStr;

use crate::app::CallbackKind;
use crate::timers::TimerTable;

/// In-call transaction identifier, dense and monotonically assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxId(pub u64);

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// UAS transaction states. `Finished` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxState {
    Authorize,
    Route,
    InviteProceeding,
    Trying,
    Ack,
    Completed,
    Finished,
}

impl TxState {
    /// Returns `true` while a CANCEL may still terminate the transaction.
    pub fn accepts_cancel(self) -> bool {
        matches!(
            self,
            TxState::Authorize | TxState::Route | TxState::InviteProceeding
        )
    }

    /// Returns `true` once a final response has been produced.
    pub fn is_past_final(self) -> bool {
        matches!(self, TxState::Completed | TxState::Finished)
    }
}

/// RFC 3261 §17.2.3 server transaction key: top Via branch, sent-by and
/// method. CANCEL matches its INVITE by rewriting only the method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransKey {
    pub branch: SmolStr,
    pub sent_by: SmolStr,
    pub method: Method,
}

impl TransKey {
    /// Derives the transaction key from a request's topmost Via header.
    ///
    /// Requests without a branch parameter get a synthetic branch derived
    /// from their identifiers, so pre-RFC 3261 clients still form a key.
    pub fn from_request(req: &Request) -> Self {
        let via = top_via(req);
        let branch = via
            .and_then(|v| branch_from_via(v))
            .map(|b| SmolStr::new(b.to_owned()))
            .unwrap_or_else(|| synthetic_branch(req));
        let sent_by = via
            .and_then(|v| sent_by_from_via(v))
            .map(|s| SmolStr::new(s.to_owned()))
            .unwrap_or_default();
        Self {
            branch,
            sent_by,
            method: req.start.method.clone(),
        }
    }

    /// Returns the same key with the method replaced.
    pub fn with_method(&self, method: Method) -> Self {
        Self {
            branch: self.branch.clone(),
            sent_by: self.sent_by.clone(),
            method,
        }
    }
}

/// Returns the top-most Via header value, if present.
pub fn top_via(req: &Request) -> Option<&SmolStr> {
    req.headers.values("Via").next()
}

/// Extracts the `branch=` parameter from a Via header string.
pub fn branch_from_via(via: &str) -> Option<&str> {
    via.split(';').skip(1).find_map(|part| {
        let mut split = part.splitn(2, '=');
        let name = split.next()?.trim();
        let value = split.next()?.trim();
        if name.eq_ignore_ascii_case("branch") {
            Some(value)
        } else {
            None
        }
    })
}

/// Extracts the sent-by (host[:port]) component from a Via header string.
pub fn sent_by_from_via(via: &str) -> Option<&str> {
    let head = via.split(';').next()?;
    let sent_by = head.split_whitespace().nth(1)?;
    if sent_by.is_empty() {
        None
    } else {
        Some(sent_by)
    }
}

fn synthetic_branch(req: &Request) -> SmolStr {
    let mut hasher = DefaultHasher::new();
    if let Some(call_id) = req.call_id() {
        call_id.hash(&mut hasher);
    }
    if let Some(cseq) = req.headers.value("CSeq") {
        cseq.hash(&mut hasher);
    }
    req.start.method.as_str().hash(&mut hasher);
    SmolStr::new(format!("z9hG4bK.rfc2543.{:016x}", hasher.finish()))
}

/// Marker recording the one application callback that may be outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingCallback {
    pub kind: CallbackKind,
    pub issued_in: TxState,
}

/// Link recorded on a transaction created by a forking proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForkLink {
    pub parent: TxId,
}

/// One server transaction: a received request and everything needed to drive
/// it to its final response.
///
/// Identity fields (`id`, `trans_key`, `method`, `ruri`, `transport`,
/// `request`, `loop_id`, `local_tag`, `started`) are fixed at construction.
/// The remaining fields are mutated only by the state-machine step function
/// running on the owning call actor.
#[derive(Debug)]
pub struct UasTx {
    pub id: TxId,
    pub trans_key: TransKey,
    pub method: Method,
    pub ruri: SipUri,
    pub transport: TransportContext,
    pub request: Arc<Request>,
    /// Loop fingerprint; `None` when the request carried a To tag.
    pub loop_id: Option<u64>,
    /// Tag inserted into the To header of every non-100 response.
    pub local_tag: SmolStr,
    pub started: Instant,

    pub state: TxState,
    /// Final status code sent, 0 until set.
    pub status: u16,
    /// Final response, kept for retransmission while the record lives.
    pub response: Option<Response>,
    /// Most recent response of any class sent for this transaction.
    pub last_sent: Option<Response>,
    pub stateless: bool,
    /// Set once an application-originated provisional (>100) went out.
    pub provisional_sent: bool,
    pub transport_failed: bool,
    pub timers: TimerTable,
    pub pending: Option<PendingCallback>,
    pub fork: Option<ForkLink>,
}

impl UasTx {
    /// Creates a transaction record in the `Authorize` state.
    pub fn new(
        id: TxId,
        trans_key: TransKey,
        request: Arc<Request>,
        transport: TransportContext,
        loop_id: Option<u64>,
        local_tag: SmolStr,
    ) -> Self {
        Self {
            id,
            method: request.start.method.clone(),
            ruri: request.start.uri.clone(),
            trans_key,
            transport,
            request,
            loop_id,
            local_tag,
            started: Instant::now(),
            state: TxState::Authorize,
            status: 0,
            response: None,
            last_sent: None,
            stateless: false,
            provisional_sent: false,
            transport_failed: false,
            timers: TimerTable::new(),
            pending: None,
            fork: None,
        }
    }

    /// Returns `true` once the transaction reached its terminal state.
    pub fn is_finished(&self) -> bool {
        self.state == TxState::Finished
    }

    /// Moves the record to its terminal state, dropping any pending callback.
    pub fn finish(&mut self) {
        self.state = TxState::Finished;
        self.pending = None;
    }

    /// Returns `true` when the record can be dropped from the call:
    /// terminal state, no armed timers.
    pub fn reapable(&self) -> bool {
        self.is_finished() && self.timers.active() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use sip_core::{Headers, RequestLine};

    fn request(method: Method, vias: &[&str]) -> Request {
        let mut headers = Headers::new();
        for via in vias {
            headers.push("Via", *via);
        }
        headers.push("Call-ID", "k1@example.com");
        headers.push("CSeq", format!("7 {}", method.as_str()));
        Request::new(
            RequestLine::new(method, SipUri::parse("sip:svc@example.com").unwrap()),
            headers,
            Bytes::new(),
        )
    }

    #[test]
    fn key_uses_top_via_branch_and_sent_by() {
        let req = request(
            Method::Invite,
            &[
                "SIP/2.0/UDP client.example.com:5060;branch=z9hG4bKabc;rport",
                "SIP/2.0/UDP upstream.example.com;branch=z9hG4bKother",
            ],
        );
        let key = TransKey::from_request(&req);
        assert_eq!(key.branch.as_str(), "z9hG4bKabc");
        assert_eq!(key.sent_by.as_str(), "client.example.com:5060");
        assert_eq!(key.method, Method::Invite);
    }

    #[test]
    fn cancel_rewrites_to_invite_key() {
        let cancel = request(
            Method::Cancel,
            &["SIP/2.0/UDP client.example.com:5060;branch=z9hG4bKabc"],
        );
        let invite = request(
            Method::Invite,
            &["SIP/2.0/UDP client.example.com:5060;branch=z9hG4bKabc"],
        );
        let cancel_key = TransKey::from_request(&cancel);
        let invite_key = TransKey::from_request(&invite);
        assert_eq!(cancel_key.with_method(Method::Invite), invite_key);
    }

    #[test]
    fn missing_branch_gets_stable_synthetic_key() {
        let a = request(Method::Message, &["SIP/2.0/UDP host.example.com"]);
        let b = request(Method::Message, &["SIP/2.0/UDP host.example.com"]);
        let ka = TransKey::from_request(&a);
        let kb = TransKey::from_request(&b);
        assert!(ka.branch.starts_with("z9hG4bK"));
        assert_eq!(ka, kb);
    }

    #[test]
    fn new_record_starts_in_authorize() {
        let req = Arc::new(request(
            Method::Invite,
            &["SIP/2.0/UDP c.example.com;branch=z9hG4bKxyz"],
        ));
        let key = TransKey::from_request(&req);
        let tx = UasTx::new(
            TxId(1),
            key,
            req,
            TransportContext::new(sip_core::TransportKind::Udp, "1.2.3.4:5060".parse().unwrap()),
            Some(42),
            SmolStr::new("tag1"),
        );
        assert_eq!(tx.state, TxState::Authorize);
        assert_eq!(tx.status, 0);
        assert!(!tx.is_finished());
        assert!(tx.state.accepts_cancel());
    }
}
