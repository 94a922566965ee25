// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use bytes::Bytes;
use smol_str::SmolStr;

use crate::{headers::Headers, method::Method, uri::SipUri, version::SipVersion};

/// First line of a SIP request: `Method SP Request-URI SP SIP-Version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: Method,
    pub uri: SipUri,
    pub version: SipVersion,
}

impl RequestLine {
    /// Creates a request line for the given method and target URI.
    pub fn new(method: Method, uri: SipUri) -> Self {
        Self {
            method,
            uri,
            version: SipVersion::V2,
        }
    }
}

/// First line of a SIP response: `SIP-Version SP Status-Code SP Reason-Phrase`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub version: SipVersion,
    pub code: u16,
    pub reason: SmolStr,
}

impl StatusLine {
    /// Creates a status line with the provided code and reason phrase.
    ///
    /// SIP status codes are 100-699; out-of-range codes are a programming
    /// error on the producing side.
    pub fn new(code: u16, reason: impl Into<SmolStr>) -> Self {
        debug_assert!((100..=699).contains(&code), "invalid SIP status code");
        Self {
            version: SipVersion::V2,
            code,
            reason: reason.into(),
        }
    }
}

/// Parsed `CSeq` header value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CSeq {
    pub number: u32,
    pub method: Method,
}

/// Immutable in-memory representation of a SIP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub start: RequestLine,
    pub headers: Headers,
    pub body: Bytes,
}

impl Request {
    /// Creates a request from its components.
    pub fn new(start: RequestLine, headers: Headers, body: Bytes) -> Self {
        Self {
            start,
            headers,
            body,
        }
    }

    /// Returns the request method.
    pub fn method(&self) -> &Method {
        &self.start.method
    }

    /// Returns the request URI.
    pub fn uri(&self) -> &SipUri {
        &self.start.uri
    }

    /// Returns the `Call-ID` header value, if present.
    pub fn call_id(&self) -> Option<&SmolStr> {
        self.headers.value("Call-ID")
    }

    /// Returns the tag parameter of the `From` header, if present.
    pub fn from_tag(&self) -> Option<&str> {
        extract_tag(self.headers.value("From")?)
    }

    /// Returns the tag parameter of the `To` header, if present.
    ///
    /// Absence marks an initial (out-of-dialog) request.
    pub fn to_tag(&self) -> Option<&str> {
        extract_tag(self.headers.value("To")?)
    }

    /// Parses the `CSeq` header (`"123 INVITE"`).
    pub fn cseq(&self) -> Option<CSeq> {
        let value = self.headers.value("CSeq")?;
        let mut parts = value.split_whitespace();
        let number = parts.next()?.parse().ok()?;
        let method = Method::from_token(parts.next()?);
        Some(CSeq { number, method })
    }

    /// Parses the `Expires` header as whole seconds.
    pub fn expires(&self) -> Option<u64> {
        self.headers.value("Expires")?.trim().parse().ok()
    }

    /// Returns all `Require` option tags across all `Require` headers,
    /// preserving original order.
    pub fn require_tokens(&self) -> Vec<SmolStr> {
        self.headers
            .values("Require")
            .flat_map(|value| value.split(','))
            .map(|token| SmolStr::new(token.trim().to_owned()))
            .filter(|token| !token.is_empty())
            .collect()
    }
}

/// Immutable in-memory representation of a SIP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub start: StatusLine,
    pub headers: Headers,
    pub body: Bytes,
}

impl Response {
    /// Creates a response from its components.
    pub fn new(start: StatusLine, headers: Headers, body: Bytes) -> Self {
        Self {
            start,
            headers,
            body,
        }
    }

    /// Returns the status code.
    pub fn code(&self) -> u16 {
        self.start.code
    }

    /// Returns `true` for a provisional (1xx) response.
    pub fn is_provisional(&self) -> bool {
        self.start.code < 200
    }

    /// Returns `true` for a final (>= 200) response.
    pub fn is_final(&self) -> bool {
        self.start.code >= 200
    }
}

/// Extracts the `tag` parameter from a `From`/`To` header value.
pub fn extract_tag(value: &str) -> Option<&str> {
    value.split(';').skip(1).find_map(|part| {
        let (name, tag) = part.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("tag") {
            Some(tag.trim())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with(headers: Vec<(&str, &str)>) -> Request {
        let mut hdrs = Headers::new();
        for (name, value) in headers {
            hdrs.push(name, value);
        }
        Request::new(
            RequestLine::new(Method::Invite, SipUri::parse("sip:bob@example.com").unwrap()),
            hdrs,
            Bytes::new(),
        )
    }

    #[test]
    fn extracts_identifiers() {
        let req = request_with(vec![
            ("Call-ID", "abc123@host"),
            ("From", "<sip:alice@example.com>;tag=1928301774"),
            ("To", "<sip:bob@example.com>"),
            ("CSeq", "314159 INVITE"),
        ]);

        assert_eq!(req.call_id().map(|v| v.as_str()), Some("abc123@host"));
        assert_eq!(req.from_tag(), Some("1928301774"));
        assert_eq!(req.to_tag(), None);
        let cseq = req.cseq().unwrap();
        assert_eq!(cseq.number, 314159);
        assert_eq!(cseq.method, Method::Invite);
    }

    #[test]
    fn tag_parsing_skips_other_params() {
        assert_eq!(
            extract_tag("\"Bob\" <sip:bob@example.com>;x=1;tag=abc;y=2"),
            Some("abc")
        );
        assert_eq!(extract_tag("<sip:bob@example.com>"), None);
    }

    #[test]
    fn require_tokens_preserve_order_across_headers() {
        let req = request_with(vec![("Require", "100rel, foo"), ("Require", "timer")]);
        let owned_tokens = req.require_tokens();
        let tokens: Vec<&str> = owned_tokens.iter().map(|t| t.as_str()).collect();
        assert_eq!(tokens, vec!["100rel", "foo", "timer"]);
    }

    #[test]
    fn expires_parses_seconds() {
        let req = request_with(vec![("Expires", "120")]);
        assert_eq!(req.expires(), Some(120));
    }

    #[test]
    fn response_classification() {
        let trying = Response::new(StatusLine::new(100, "Trying"), Headers::new(), Bytes::new());
        assert!(trying.is_provisional());
        let ok = Response::new(StatusLine::new(200, "OK"), Headers::new(), Bytes::new());
        assert!(ok.is_final());
    }
}
