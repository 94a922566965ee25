// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Loop detection (RFC 3261 §16.3).
//!
//! An initial request (no To tag) is fingerprinted over the application
//! identity, Call-ID, From tag and CSeq. A second arrival with the same
//! fingerprint while the first is still in progress is rejected with
//! `482 Loop Detected`. SipHash via [`DefaultHasher`] is stable within a
//! process, which is all the fingerprint needs.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use sip_core::Request;

use crate::tx::UasTx;

/// Computes the loop fingerprint for an initial request.
///
/// Returns `None` when the request carries a To tag: in-dialog requests are
/// exempt from loop detection.
pub fn loop_id(app_id: &str, request: &Request) -> Option<u64> {
    if request.to_tag().is_some() {
        return None;
    }
    let mut hasher = DefaultHasher::new();
    app_id.hash(&mut hasher);
    request.call_id().map(|v| v.as_str()).hash(&mut hasher);
    request.from_tag().hash(&mut hasher);
    if let Some(cseq) = request.cseq() {
        cseq.number.hash(&mut hasher);
        cseq.method.as_str().hash(&mut hasher);
    }
    Some(hasher.finish())
}

/// Returns `true` when a live transaction already carries this fingerprint.
pub fn is_duplicate(txs: &[UasTx], fingerprint: u64) -> bool {
    txs.iter()
        .any(|tx| !tx.is_finished() && tx.loop_id == Some(fingerprint))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use sip_core::{Headers, Method, RequestLine, SipUri};

    fn request(to: &str, cseq: &str) -> Request {
        let mut headers = Headers::new();
        headers.push("Via", "SIP/2.0/UDP c.example.com;branch=z9hG4bK1");
        headers.push("From", "<sip:a@example.com>;tag=f1");
        headers.push("To", to);
        headers.push("Call-ID", "cid-1@example.com");
        headers.push("CSeq", cseq);
        Request::new(
            RequestLine::new(Method::Invite, SipUri::parse("sip:svc@example.com").unwrap()),
            headers,
            Bytes::new(),
        )
    }

    #[test]
    fn same_identifiers_same_fingerprint() {
        let a = loop_id("app", &request("<sip:b@example.com>", "1 INVITE"));
        let b = loop_id("app", &request("<sip:b@example.com>", "1 INVITE"));
        assert_eq!(a, b);
        assert!(a.is_some());
    }

    #[test]
    fn cseq_and_app_change_fingerprint() {
        let base = loop_id("app", &request("<sip:b@example.com>", "1 INVITE"));
        let bumped = loop_id("app", &request("<sip:b@example.com>", "2 INVITE"));
        let other_app = loop_id("other", &request("<sip:b@example.com>", "1 INVITE"));
        assert_ne!(base, bumped);
        assert_ne!(base, other_app);
    }

    #[test]
    fn in_dialog_requests_are_exempt() {
        let id = loop_id("app", &request("<sip:b@example.com>;tag=remote", "1 INVITE"));
        assert!(id.is_none());
    }
}
