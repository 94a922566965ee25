// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reply vocabulary and response construction.
//!
//! [`SipReply`] is the value applications and the core use to describe a
//! response; [`build`] turns it into a syntactically complete [`Response`]
//! for the original request: Via/From/To/Call-ID/CSeq copied down, a To tag
//! inserted on non-100 responses, and reply-specific headers (`Allow`,
//! `Unsupported`, challenges, `Retry-After`) filled in from configuration.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use rand::{distributions::Alphanumeric, Rng};
use sip_core::{
    Headers, Method, Request, Response, StatusLine, TransportContext,
};
use smol_str::SmolStr;

use crate::config::CallConfig;

/// Response descriptor handed to the reply engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SipReply {
    /// 100 Trying.
    Trying,
    /// 180 Ringing.
    Ringing,
    /// 200 OK.
    Ok,
    /// 403 Forbidden.
    Forbidden,
    /// 408 Request Timeout.
    Timeout,
    /// 420 Bad Extension listing the offending option tags in order.
    BadExtension(Vec<SmolStr>),
    /// 481 Call/Transaction Does Not Exist.
    NoTransaction,
    /// 482 Loop Detected.
    LoopDetected,
    /// 487 Request Terminated.
    RequestTerminated,
    /// 491 Request Pending.
    RequestPending,
    /// 405 Method Not Allowed, with the configured `Allow` set.
    MethodNotAllowed,
    /// 503 Service Unavailable.
    ServiceUnavailable,
    /// 603 Decline.
    Decline,
    /// 401 Unauthorized with a digest challenge for the realm.
    Authenticate { realm: SmolStr },
    /// 407 Proxy Authentication Required with a digest challenge.
    ProxyAuthenticate { realm: SmolStr },
    /// 500 with a specific reason phrase.
    InternalError(SmolStr),
    /// 500 carrying `Retry-After`, used for dialog-collision backoff.
    RetryLater {
        reason: SmolStr,
        retry_after: u32,
    },
    /// Status code with its default reason phrase.
    Status(u16),
    /// Status code with an explicit reason phrase.
    Reason(u16, SmolStr),
    /// A fully built response supplied by the application.
    Raw(Response),
}

impl SipReply {
    /// Returns the status code this reply produces.
    pub fn code(&self) -> u16 {
        match self {
            SipReply::Trying => 100,
            SipReply::Ringing => 180,
            SipReply::Ok => 200,
            SipReply::Forbidden => 403,
            SipReply::MethodNotAllowed => 405,
            SipReply::Timeout => 408,
            SipReply::BadExtension(_) => 420,
            SipReply::NoTransaction => 481,
            SipReply::LoopDetected => 482,
            SipReply::RequestTerminated => 487,
            SipReply::RequestPending => 491,
            SipReply::ServiceUnavailable => 503,
            SipReply::Decline => 603,
            SipReply::Authenticate { .. } => 401,
            SipReply::ProxyAuthenticate { .. } => 407,
            SipReply::InternalError(_) | SipReply::RetryLater { .. } => 500,
            SipReply::Status(code) | SipReply::Reason(code, _) => *code,
            SipReply::Raw(response) => response.code(),
        }
    }

    /// Returns `true` when the reply is a final (>= 200) response.
    pub fn is_final(&self) -> bool {
        self.code() >= 200
    }

    /// Returns the reason phrase for this reply.
    pub fn reason(&self) -> SmolStr {
        match self {
            SipReply::Reason(_, reason)
            | SipReply::InternalError(reason)
            | SipReply::RetryLater { reason, .. } => reason.clone(),
            SipReply::Raw(response) => response.start.reason.clone(),
            other => SmolStr::new_static(default_reason(other.code())),
        }
    }
}

/// Default reason phrases for the status codes the core emits.
fn default_reason(code: u16) -> &'static str {
    match code {
        100 => "Trying",
        180 => "Ringing",
        200 => "OK",
        401 => "Unauthorized",
        403 => "Forbidden",
        405 => "Method Not Allowed",
        407 => "Proxy Authentication Required",
        408 => "Request Timeout",
        420 => "Bad Extension",
        481 => "Call/Transaction Does Not Exist",
        482 => "Loop Detected",
        486 => "Busy Here",
        487 => "Request Terminated",
        491 => "Request Pending",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        503 => "Service Unavailable",
        603 => "Decline",
        _ => "",
    }
}

/// Builds a complete response to `request` from the given reply.
///
/// `local_tag` is the transaction's To tag, inserted on every non-100
/// response whose To header does not already carry one.
pub fn build(
    request: &Request,
    reply: &SipReply,
    local_tag: &str,
    cfg: &CallConfig,
) -> Response {
    if let SipReply::Raw(response) = reply {
        return response.clone();
    }

    let code = reply.code();
    let mut headers = Headers::new();
    for via in request.headers.values("Via") {
        headers.push("Via", via.clone());
    }
    if let Some(from) = request.headers.value("From") {
        headers.push("From", from.clone());
    }
    if let Some(to) = request.headers.value("To") {
        if code > 100 && sip_core::extract_tag(to).is_none() {
            headers.push("To", SmolStr::new(format!("{to};tag={local_tag}")));
        } else {
            headers.push("To", to.clone());
        }
    }
    if let Some(call_id) = request.headers.value("Call-ID") {
        headers.push("Call-ID", call_id.clone());
    }
    if let Some(cseq) = request.headers.value("CSeq") {
        headers.push("CSeq", cseq.clone());
    }

    let mut body = Bytes::new();
    match reply {
        SipReply::Ok if request.start.method == Method::Options => {
            headers.push("Allow", cfg.allow_header());
            if let Some(supported) = cfg.supported_header() {
                headers.push("Supported", supported);
            }
        }
        SipReply::MethodNotAllowed => {
            headers.push("Allow", cfg.allow_header());
        }
        SipReply::BadExtension(tokens) => {
            let list: Vec<&str> = tokens.iter().map(|t| t.as_str()).collect();
            let list = list.join(",");
            headers.push("Unsupported", SmolStr::new(list.clone()));
            headers.push("Content-Type", "text/plain");
            body = Bytes::from(list.into_bytes());
        }
        SipReply::Authenticate { realm } => {
            headers.push("WWW-Authenticate", challenge(realm));
        }
        SipReply::ProxyAuthenticate { realm } => {
            headers.push("Proxy-Authenticate", challenge(realm));
        }
        SipReply::RetryLater { retry_after, .. } => {
            headers.push("Retry-After", SmolStr::new(retry_after.to_string()));
        }
        _ => {}
    }

    headers.push("Content-Length", SmolStr::new(body.len().to_string()));
    Response::new(StatusLine::new(code, reply.reason()), headers, body)
}

fn challenge(realm: &str) -> SmolStr {
    SmolStr::new(format!(
        "Digest realm=\"{realm}\", nonce=\"{}\", algorithm=MD5, qop=\"auth\"",
        random_token(16)
    ))
}

/// Generates a random tag for the To header of locally produced responses.
pub fn generate_tag() -> SmolStr {
    random_token(9)
}

fn random_token(len: usize) -> SmolStr {
    let mut rng = rand::thread_rng();
    let token: String = (&mut rng)
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect();
    SmolStr::new(token)
}

/// Dispatches built responses towards the transport collaborator.
///
/// Sends must not block the call actor; implementations enqueue to the
/// transport task and report failure synchronously as an error.
#[async_trait]
pub trait TransportSink: Send + Sync + 'static {
    async fn send(&self, response: &Response, ctx: &TransportContext) -> Result<()>;
}
