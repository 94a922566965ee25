// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! CANCEL-to-INVITE matching (RFC 3261 §9.2).
//!
//! A CANCEL shares its transaction key with the INVITE it targets, apart
//! from the method. The matcher rewrites the key, looks the INVITE up in the
//! call's transaction list and verifies the CANCEL came from the same
//! source address before allowing termination.

use std::net::SocketAddr;

use sip_core::Method;

use crate::tx::{TransKey, TxId, UasTx};

/// Result of matching an incoming CANCEL against the call's transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// INVITE found, same source, still cancellable: answer the CANCEL with
    /// 200 and inject termination into this transaction.
    Matched(TxId),
    /// INVITE found but the CANCEL came from a different address.
    SourceMismatch,
    /// INVITE found but already past the cancellable states.
    TooLate,
    /// No matching INVITE in this call; the CANCEL proceeds to the
    /// application like any other request.
    NotFound,
}

/// Locates the INVITE a CANCEL targets and validates the match.
pub fn match_cancel(txs: &[UasTx], cancel_key: &TransKey, source: SocketAddr) -> CancelOutcome {
    let invite_key = cancel_key.with_method(Method::Invite);
    let Some(invite) = txs
        .iter()
        .find(|tx| !tx.is_finished() && tx.trans_key == invite_key)
    else {
        return CancelOutcome::NotFound;
    };

    if invite.transport.peer != source {
        return CancelOutcome::SourceMismatch;
    }
    if !invite.state.accepts_cancel() {
        return CancelOutcome::TooLate;
    }
    CancelOutcome::Matched(invite.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use bytes::Bytes;
    use sip_core::{
        Headers, Request, RequestLine, SipUri, TransportContext, TransportKind,
    };
    use smol_str::SmolStr;

    use crate::tx::TxState;

    fn request(method: Method, branch: &str) -> Request {
        let mut headers = Headers::new();
        headers.push(
            "Via",
            format!("SIP/2.0/UDP client.example.com:5060;branch={branch}"),
        );
        headers.push("Call-ID", "cid@example.com");
        headers.push("CSeq", format!("1 {}", method.as_str()));
        Request::new(
            RequestLine::new(method, SipUri::parse("sip:svc@example.com").unwrap()),
            headers,
            Bytes::new(),
        )
    }

    fn invite_tx(id: u64, branch: &str, peer: &str, state: TxState) -> UasTx {
        let req = Arc::new(request(Method::Invite, branch));
        let key = TransKey::from_request(&req);
        let mut tx = UasTx::new(
            TxId(id),
            key,
            req,
            TransportContext::new(TransportKind::Udp, peer.parse().unwrap()),
            None,
            SmolStr::new("tag"),
        );
        tx.state = state;
        tx
    }

    fn cancel_key(branch: &str) -> TransKey {
        TransKey::from_request(&request(Method::Cancel, branch))
    }

    #[test]
    fn matches_same_branch_and_source() {
        let txs = vec![invite_tx(4, "z9hG4bKa", "10.0.0.1:5060", TxState::Authorize)];
        let outcome = match_cancel(&txs, &cancel_key("z9hG4bKa"), "10.0.0.1:5060".parse().unwrap());
        assert_eq!(outcome, CancelOutcome::Matched(TxId(4)));
    }

    #[test]
    fn rejects_different_source() {
        let txs = vec![invite_tx(4, "z9hG4bKa", "10.0.0.1:5060", TxState::Route)];
        let outcome = match_cancel(&txs, &cancel_key("z9hG4bKa"), "10.0.0.9:5060".parse().unwrap());
        assert_eq!(outcome, CancelOutcome::SourceMismatch);
    }

    #[test]
    fn too_late_after_final_response() {
        let txs = vec![invite_tx(4, "z9hG4bKa", "10.0.0.1:5060", TxState::Completed)];
        let outcome = match_cancel(&txs, &cancel_key("z9hG4bKa"), "10.0.0.1:5060".parse().unwrap());
        assert_eq!(outcome, CancelOutcome::TooLate);
    }

    #[test]
    fn unknown_branch_is_not_found() {
        let txs = vec![invite_tx(4, "z9hG4bKa", "10.0.0.1:5060", TxState::Authorize)];
        let outcome = match_cancel(&txs, &cancel_key("z9hG4bKb"), "10.0.0.1:5060".parse().unwrap());
        assert_eq!(outcome, CancelOutcome::NotFound);
    }
}
