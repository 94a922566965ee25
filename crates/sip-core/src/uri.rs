// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::fmt;

use smol_str::SmolStr;

/// Parsed representation of a SIP URI (RFC 3261 §19).
///
/// Only the components the transaction layer routes on are modelled: scheme,
/// user, host, port and URI parameters. URI headers are preserved verbatim in
/// `raw` but not interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SipUri {
    pub raw: SmolStr,
    pub sips: bool,
    pub user: Option<SmolStr>,
    pub host: SmolStr,
    pub port: Option<u16>,
    pub params: Vec<(SmolStr, Option<SmolStr>)>,
}

impl SipUri {
    /// Constructs a `sip:` URI with the given host and default settings.
    pub fn new(host: impl Into<SmolStr>) -> Self {
        let host = host.into();
        Self {
            raw: SmolStr::new(format!("sip:{host}")),
            sips: false,
            user: None,
            host,
            port: None,
            params: Vec::new(),
        }
    }

    /// Attempts to parse a SIP or SIPS URI from the provided string.
    pub fn parse(input: &str) -> Option<Self> {
        let raw = SmolStr::new(input.to_owned());
        let (scheme, rest) = input.split_once(':')?;
        let sips = scheme.eq_ignore_ascii_case("sips");
        if !sips && !scheme.eq_ignore_ascii_case("sip") {
            return None;
        }

        // URI headers (`?h=v`) are carried in `raw` only.
        let addr_part = rest.split('?').next()?;

        let mut params = Vec::new();
        let mut addr_iter = addr_part.split(';');
        let base = addr_iter.next()?.trim();
        for param in addr_iter {
            let param = param.trim();
            if param.is_empty() {
                continue;
            }
            match param.split_once('=') {
                Some((k, v)) => params.push((
                    SmolStr::new(k.trim().to_owned()),
                    Some(SmolStr::new(v.trim().to_owned())),
                )),
                None => params.push((SmolStr::new(param.to_owned()), None)),
            }
        }

        let (user, host_port) = match base.split_once('@') {
            Some((user, host)) => (Some(SmolStr::new(user.trim().to_owned())), host.trim()),
            None => (None, base.trim()),
        };

        if host_port.is_empty() {
            return None;
        }

        let (host, port) = split_host_port(host_port)?;
        Some(Self {
            raw,
            sips,
            user,
            host: SmolStr::new(host.to_ascii_lowercase()),
            port,
            params,
        })
    }

    /// Returns the URI scheme token.
    pub fn scheme(&self) -> &'static str {
        if self.sips {
            "sips"
        } else {
            "sip"
        }
    }

    /// Returns the value of the named URI parameter, if present.
    pub fn param(&self, name: &str) -> Option<&SmolStr> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.as_ref())
    }

    /// Returns the original textual representation of the URI.
    pub fn as_str(&self) -> &str {
        self.raw.as_str()
    }
}

impl fmt::Display for SipUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Splits a host[:port] or IPv6 literal "[host]:port" string.
fn split_host_port(input: &str) -> Option<(&str, Option<u16>)> {
    if let Some(stripped) = input.strip_prefix('[') {
        let end = stripped.find(']')?;
        let host = &stripped[..end];
        let remainder = &stripped[end + 1..];
        match remainder.strip_prefix(':') {
            Some(port) => Some((host, Some(port.parse().ok()?))),
            None => Some((host, None)),
        }
    } else if let Some((host, port)) = input.rsplit_once(':') {
        if host.contains(':') {
            // Unbracketed IPv6 literals are ambiguous and rejected.
            return None;
        }
        Some((host, Some(port.parse().ok()?)))
    } else {
        Some((input, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_user_host_port() {
        let uri = SipUri::parse("sip:alice@example.com:5070").unwrap();
        assert_eq!(uri.user.as_deref(), Some("alice"));
        assert_eq!(uri.host.as_str(), "example.com");
        assert_eq!(uri.port, Some(5070));
        assert!(!uri.sips);
        assert_eq!(uri.scheme(), "sip");
    }

    #[test]
    fn parses_params() {
        let uri = SipUri::parse("sip:example.com;transport=tcp;lr").unwrap();
        assert_eq!(uri.param("transport").map(|v| v.as_str()), Some("tcp"));
        assert!(uri.param("lr").is_none());
        assert_eq!(uri.params.len(), 2);
    }

    #[test]
    fn parses_sips_and_ipv6() {
        let uri = SipUri::parse("sips:[2001:db8::1]:5061").unwrap();
        assert!(uri.sips);
        assert_eq!(uri.host.as_str(), "2001:db8::1");
        assert_eq!(uri.port, Some(5061));
    }

    #[test]
    fn rejects_other_schemes_and_bad_hosts() {
        assert!(SipUri::parse("tel:+15551234567").is_none());
        assert!(SipUri::parse("sip:2001:db8::1").is_none());
        assert!(SipUri::parse("sip:").is_none());
    }

    #[test]
    fn keeps_raw_text() {
        let text = "sip:bob@example.com;user=phone";
        let uri = SipUri::parse(text).unwrap();
        assert_eq!(uri.as_str(), text);
    }
}
