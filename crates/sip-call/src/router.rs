// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Process-wide call registry.
//!
//! Incoming requests are routed to the call actor owning their Call-ID,
//! spawning one on first contact. Call actors remove themselves from the
//! registry when they stop; a request racing such a shutdown simply spawns
//! a replacement.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use anyhow::Result;
use dashmap::DashMap;
use sip_core::{Request, TransportContext};
use smol_str::SmolStr;
use tracing::{debug, warn};

use crate::app::AppHandle;
use crate::call::{Call, CallDeps, CallHandle};
use crate::config::CallConfig;
use crate::dialog::DialogEngine;
use crate::metrics::{CoreMetrics, MetricsSnapshot};
use crate::reply::{self, SipReply, TransportSink};
use crate::route::ProxyEngine;

/// Routes parsed requests to per-Call-ID actors.
#[derive(Clone)]
pub struct CallRouter {
    deps: CallDeps,
    calls: Arc<DashMap<SmolStr, CallHandle>>,
}

impl CallRouter {
    /// Creates a router with no-op dialog and proxy collaborators.
    pub fn new(app: AppHandle, cfg: Arc<CallConfig>, sink: Arc<dyn TransportSink>) -> Self {
        Self {
            deps: CallDeps::new(app, cfg, sink),
            calls: Arc::new(DashMap::new()),
        }
    }

    /// Creates a router from fully assembled dependencies.
    pub fn with_deps(deps: CallDeps) -> Self {
        Self {
            deps,
            calls: Arc::new(DashMap::new()),
        }
    }

    /// Replaces the dialog engine.
    pub fn with_dialog(mut self, dialog: Arc<dyn DialogEngine>) -> Self {
        self.deps = self.deps.with_dialog(dialog);
        self
    }

    /// Replaces the proxy engine.
    pub fn with_proxy(mut self, proxy: Arc<dyn ProxyEngine>) -> Self {
        self.deps = self.deps.with_proxy(proxy);
        self
    }

    /// Delivers a request to the owning call, creating it on first contact.
    ///
    /// Requests without a Call-ID cannot form a transaction and are answered
    /// 400 directly.
    pub async fn route(&self, request: Arc<Request>, ctx: TransportContext) -> Result<()> {
        let Some(call_id) = request.call_id().cloned() else {
            warn!(peer = %ctx.peer, "request without Call-ID");
            let reply = SipReply::Reason(400, SmolStr::new_static("Missing Call-ID"));
            let response = reply::build(&request, &reply, &reply::generate_tag(), &self.deps.cfg);
            return self.deps.sink.send(&response, &ctx).await;
        };

        loop {
            let handle = self
                .calls
                .entry(call_id.clone())
                .or_insert_with(|| {
                    debug!(call_id = %call_id, "spawning call actor");
                    Call::spawn_registered(
                        call_id.clone(),
                        self.deps.clone(),
                        Some(self.calls.clone()),
                    )
                })
                .clone();
            if handle.deliver(request.clone(), ctx).await.is_ok() {
                return Ok(());
            }
            // The actor stopped between lookup and delivery; drop the stale
            // entry and retry with a fresh one.
            self.calls
                .remove_if(&call_id, |_, stale| stale.is_closed());
        }
    }

    /// Returns the handle for a live call, if any.
    pub fn call(&self, call_id: &str) -> Option<CallHandle> {
        self.calls.get(call_id).map(|entry| entry.clone())
    }

    /// Number of live calls.
    pub fn active_calls(&self) -> usize {
        self.calls.len()
    }

    /// Returns the shared metrics handle.
    pub fn metrics(&self) -> &CoreMetrics {
        &self.deps.metrics
    }

    /// Snapshot of the core counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.deps.metrics.snapshot()
    }
}

/// Stable shard key for a Call-ID, for spreading calls across executors.
pub fn shard_by_call_id(call_id: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    call_id.hash(&mut hasher);
    hasher.finish()
}
