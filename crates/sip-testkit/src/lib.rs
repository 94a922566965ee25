// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Test harness for the transaction core.
//!
//! Provides builders for the request shapes the UAS test suites need, with
//! Via/From/To/Call-ID/CSeq prefilled, and transport sinks that capture or
//! fail sends so tests can observe exactly what went on the wire.
//!
//! # Example
//! ```
//! use sip_testkit::RequestBuilder;
//! let req = RequestBuilder::options("sip:svc@example.com").build();
//! assert_eq!(req.start.method.as_str(), "OPTIONS");
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use sip_call::reply::TransportSink;
use sip_core::{
    Headers, Method, Request, RequestLine, Response, SipUri, TransportContext, TransportKind,
};
use smol_str::SmolStr;
use tokio::sync::Notify;

/// Default source address used by [`udp_ctx`].
pub const CLIENT_ADDR: &str = "192.0.2.10:5060";

/// Transport context for a UDP request from the default test client.
pub fn udp_ctx() -> TransportContext {
    TransportContext::new(TransportKind::Udp, CLIENT_ADDR.parse().unwrap())
}

/// Transport context for a UDP request from a specific peer.
pub fn udp_ctx_from(peer: &str) -> TransportContext {
    TransportContext::new(TransportKind::Udp, peer.parse().unwrap())
}

/// Transport context for a TCP request from the default test client.
pub fn tcp_ctx() -> TransportContext {
    TransportContext::new(TransportKind::Tcp, CLIENT_ADDR.parse().unwrap())
}

/// Builder assembling well-formed test requests.
pub struct RequestBuilder {
    method: Method,
    uri: SmolStr,
    branch: SmolStr,
    call_id: SmolStr,
    from_tag: SmolStr,
    to_tag: Option<SmolStr>,
    cseq: u32,
    cseq_method: Option<Method>,
    extra: Vec<(SmolStr, SmolStr)>,
    body: Bytes,
}

impl RequestBuilder {
    /// Starts a request of the given method towards `uri`.
    pub fn new(method: Method, uri: &str) -> Self {
        Self {
            method,
            uri: SmolStr::new(uri.to_owned()),
            branch: SmolStr::new_static("z9hG4bKtest1"),
            call_id: SmolStr::new_static("call-1@test.example.com"),
            from_tag: SmolStr::new_static("from-1"),
            to_tag: None,
            cseq: 1,
            cseq_method: None,
            extra: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Starts an OPTIONS request.
    pub fn options(uri: &str) -> Self {
        Self::new(Method::Options, uri)
    }

    /// Starts an INVITE request.
    pub fn invite(uri: &str) -> Self {
        Self::new(Method::Invite, uri)
    }

    /// Starts a MESSAGE request.
    pub fn message(uri: &str) -> Self {
        Self::new(Method::Message, uri)
    }

    /// Starts a CANCEL matching a previously built INVITE: same branch,
    /// Call-ID, From tag and CSeq number.
    pub fn cancel_for(invite: &Request) -> Self {
        let mut builder = Self::new(Method::Cancel, invite.start.uri.as_str());
        if let Some(via) = invite.headers.value("Via") {
            if let Some(branch) = sip_call::tx::branch_from_via(via) {
                builder.branch = SmolStr::new(branch.to_owned());
            }
        }
        if let Some(call_id) = invite.call_id() {
            builder.call_id = call_id.clone();
        }
        if let Some(tag) = invite.from_tag() {
            builder.from_tag = SmolStr::new(tag.to_owned());
        }
        if let Some(cseq) = invite.cseq() {
            builder.cseq = cseq.number;
        }
        builder
    }

    /// Starts an ACK for the INVITE's final response.
    pub fn ack_for(invite: &Request, to_tag: &str) -> Self {
        let mut builder = Self::cancel_for(invite);
        builder.method = Method::Ack;
        builder.to_tag = Some(SmolStr::new(to_tag.to_owned()));
        builder
    }

    pub fn branch(mut self, branch: &str) -> Self {
        self.branch = SmolStr::new(branch.to_owned());
        self
    }

    pub fn call_id(mut self, call_id: &str) -> Self {
        self.call_id = SmolStr::new(call_id.to_owned());
        self
    }

    pub fn from_tag(mut self, tag: &str) -> Self {
        self.from_tag = SmolStr::new(tag.to_owned());
        self
    }

    pub fn to_tag(mut self, tag: &str) -> Self {
        self.to_tag = Some(SmolStr::new(tag.to_owned()));
        self
    }

    pub fn cseq(mut self, cseq: u32) -> Self {
        self.cseq = cseq;
        self
    }

    /// Overrides the method token in the CSeq header.
    pub fn cseq_method(mut self, method: Method) -> Self {
        self.cseq_method = Some(method);
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.extra
            .push((SmolStr::new(name.to_owned()), SmolStr::new(value.to_owned())));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Assembles the request.
    pub fn build(self) -> Request {
        let mut headers = Headers::new();
        headers.push(
            "Via",
            SmolStr::new(format!(
                "SIP/2.0/UDP client.test.example.com:5060;branch={}",
                self.branch
            )),
        );
        headers.push(
            "From",
            SmolStr::new(format!("<sip:alice@test.example.com>;tag={}", self.from_tag)),
        );
        match &self.to_tag {
            Some(tag) => headers.push(
                "To",
                SmolStr::new(format!("<sip:bob@test.example.com>;tag={tag}")),
            ),
            None => headers.push("To", "<sip:bob@test.example.com>"),
        }
        headers.push("Call-ID", self.call_id.clone());
        let cseq_method = self.cseq_method.unwrap_or_else(|| self.method.clone());
        headers.push(
            "CSeq",
            SmolStr::new(format!("{} {}", self.cseq, cseq_method.as_str())),
        );
        headers.push("Max-Forwards", "70");
        for (name, value) in self.extra {
            headers.push(name, value);
        }
        headers.push("Content-Length", SmolStr::new(self.body.len().to_string()));

        Request::new(
            RequestLine::new(
                self.method,
                SipUri::parse(self.uri.as_str()).expect("test URI must parse"),
            ),
            headers,
            self.body,
        )
    }

    /// Assembles the request behind an `Arc`, ready for delivery.
    pub fn build_shared(self) -> Arc<Request> {
        Arc::new(self.build())
    }
}

/// A transport sink that records every response it is asked to send.
#[derive(Default)]
pub struct CaptureSink {
    sent: Mutex<Vec<(Response, SocketAddr)>>,
    notify: Notify,
}

impl CaptureSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Status codes of all captured responses, in send order.
    pub fn codes(&self) -> Vec<u16> {
        self.sent.lock().iter().map(|(r, _)| r.start.code).collect()
    }

    /// All captured responses, in send order.
    pub fn responses(&self) -> Vec<Response> {
        self.sent.lock().iter().map(|(r, _)| r.clone()).collect()
    }

    /// Number of captured responses.
    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.lock().is_empty()
    }

    /// Waits until at least `count` responses were captured.
    pub async fn wait_for(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.sent.lock().len() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl TransportSink for CaptureSink {
    async fn send(&self, response: &Response, ctx: &TransportContext) -> Result<()> {
        self.sent.lock().push((response.clone(), ctx.peer));
        self.notify.notify_waiters();
        Ok(())
    }
}

/// A transport sink that fails every send, for transport-error paths.
#[derive(Default)]
pub struct FailingSink;

#[async_trait]
impl TransportSink for FailingSink {
    async fn send(&self, _response: &Response, _ctx: &TransportContext) -> Result<()> {
        Err(anyhow!("transport unavailable"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_builder_fills_mandatory_headers() {
        let req = RequestBuilder::options("sip:svc@example.com").build();
        assert_eq!(req.start.method, Method::Options);
        assert!(req.headers.value("Via").is_some());
        assert!(req.call_id().is_some());
        assert_eq!(req.cseq().unwrap().method, Method::Options);
        assert!(req.to_tag().is_none());
    }

    #[test]
    fn cancel_for_copies_transaction_identity() {
        let invite = RequestBuilder::invite("sip:svc@example.com")
            .branch("z9hG4bKxyz")
            .call_id("c9@test")
            .cseq(8)
            .build();
        let cancel = RequestBuilder::cancel_for(&invite).build();
        assert_eq!(cancel.start.method, Method::Cancel);
        assert_eq!(cancel.call_id().unwrap().as_str(), "c9@test");
        assert_eq!(cancel.cseq().unwrap().number, 8);
        assert!(cancel
            .headers
            .value("Via")
            .unwrap()
            .contains("branch=z9hG4bKxyz"));
    }

    #[tokio::test]
    async fn capture_sink_records_in_order() {
        let sink = CaptureSink::new();
        let response = Response::new(
            sip_core::StatusLine::new(100, "Trying"),
            Headers::new(),
            Bytes::new(),
        );
        sink.send(&response, &udp_ctx()).await.unwrap();
        assert_eq!(sink.codes(), vec![100]);
    }
}
