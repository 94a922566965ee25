// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::time::Duration;

use sip_core::Method;
use smol_str::SmolStr;

/// Default SIP timer values per RFC 3261 §17.
const T1_DEFAULT: Duration = Duration::from_millis(500);

/// Per-call configuration: timer values, callback deadlines and the
/// capability sets advertised to peers.
#[derive(Debug, Clone)]
pub struct CallConfig {
    /// RTT estimate (RFC 3261 T1). Drives the provisional re-send timer.
    pub t1: Duration,
    /// INVITE guard timer (timer C). Must be at least 3 minutes.
    pub timer_c: Duration,
    /// Non-INVITE transaction timeout (timer F, 64*T1).
    pub non_invite_timeout: Duration,
    /// Deadline for asynchronous application callbacks.
    pub app_timeout: Duration,
    /// Maximum live transactions per call; excess requests get 503.
    pub max_transactions: usize,
    /// How many recently sent final responses are kept for retransmission.
    pub sent_log_capacity: usize,
    /// Extension option tags accepted in `Require` headers.
    pub supported: Vec<SmolStr>,
    /// Methods accepted by this server; others are answered 405.
    pub allowed_methods: Vec<Method>,
    /// Mirror the legacy strict-routing behaviour: forward only to the
    /// topmost Route header, statelessly. When disabled, strict-proxy
    /// decisions are dispatched like `proxy` to the full Route set.
    pub strict_proxy_single_hop: bool,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            t1: T1_DEFAULT,
            timer_c: Duration::from_secs(180),
            non_invite_timeout: T1_DEFAULT.saturating_mul(64),
            app_timeout: Duration::from_secs(30),
            max_transactions: 64,
            sent_log_capacity: 32,
            supported: Vec::new(),
            allowed_methods: Method::standard_set(),
            strict_proxy_single_hop: true,
        }
    }
}

impl CallConfig {
    /// Returns `true` when the extension option tag is supported.
    pub fn is_supported(&self, token: &str) -> bool {
        self.supported.iter().any(|t| t.eq_ignore_ascii_case(token))
    }

    /// Returns `true` when the method is accepted by this server.
    pub fn is_allowed(&self, method: &Method) -> bool {
        self.allowed_methods.contains(method)
    }

    /// Builds the `Allow` header value from the configured method set.
    pub fn allow_header(&self) -> SmolStr {
        let tokens: Vec<&str> = self.allowed_methods.iter().map(|m| m.as_str()).collect();
        SmolStr::new(tokens.join(", "))
    }

    /// Builds the `Supported` header value, empty when nothing is advertised.
    pub fn supported_header(&self) -> Option<SmolStr> {
        if self.supported.is_empty() {
            return None;
        }
        let tokens: Vec<&str> = self.supported.iter().map(|t| t.as_str()).collect();
        Some(SmolStr::new(tokens.join(", ")))
    }
}
