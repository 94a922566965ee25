// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dialog coupling.
//!
//! Before a request reaches its method handler, the transaction asks the
//! dialog collaborator to associate it with a dialog. Collisions map to SIP
//! responses per RFC 3261 §14; for ACK any error terminates the transaction
//! silently.

use async_trait::async_trait;
use rand::Rng;
use sip_core::Request;
use smol_str::SmolStr;

use crate::reply::SipReply;

/// Unique dialog identifier (RFC 3261 §12): Call-ID plus local/remote tags.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DialogId {
    pub call_id: SmolStr,
    pub local_tag: SmolStr,
    pub remote_tag: SmolStr,
}

impl DialogId {
    pub fn new(
        call_id: impl Into<SmolStr>,
        local_tag: impl Into<SmolStr>,
        remote_tag: impl Into<SmolStr>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            local_tag: local_tag.into(),
            remote_tag: remote_tag.into(),
        }
    }
}

/// Why the dialog collaborator refused to associate a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogError {
    /// A UAC-initiated re-INVITE is still in progress.
    ProceedingUac,
    /// A UAS-side INVITE is still being processed.
    ProceedingUas,
    /// The request's CSeq is older than the dialog's remote sequence.
    OldCseq,
    /// No dialog matches the request's tags.
    NotFound,
    /// Any other engine-specific refusal.
    Other(SmolStr),
}

impl DialogError {
    /// Maps the conflict to the SIP response the UAS must produce.
    pub fn to_reply(&self) -> SipReply {
        match self {
            DialogError::ProceedingUac => SipReply::RequestPending,
            DialogError::ProceedingUas => SipReply::RetryLater {
                reason: SmolStr::new_static("Processing Previous INVITE"),
                retry_after: rand::thread_rng().gen_range(0..=10),
            },
            DialogError::OldCseq => {
                SipReply::InternalError(SmolStr::new_static("Old CSeq in Dialog"))
            }
            DialogError::NotFound | DialogError::Other(_) => SipReply::NoTransaction,
        }
    }
}

impl std::fmt::Display for DialogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DialogError::ProceedingUac => write!(f, "UAC INVITE still proceeding"),
            DialogError::ProceedingUas => write!(f, "UAS INVITE still proceeding"),
            DialogError::OldCseq => write!(f, "old CSeq in dialog"),
            DialogError::NotFound => write!(f, "no matching dialog"),
            DialogError::Other(reason) => write!(f, "{reason}"),
        }
    }
}

impl std::error::Error for DialogError {}

/// Interface to the dialog state engine.
#[async_trait]
pub trait DialogEngine: Send + Sync + 'static {
    /// Associates a request with its dialog, creating one when the request
    /// legitimately establishes it. `local_tag` is the tag the UAS will put
    /// in its responses.
    async fn dialog_request(
        &self,
        request: &Request,
        local_tag: &SmolStr,
    ) -> Result<DialogId, DialogError>;

    /// Notifies the engine of a received ACK.
    async fn on_ack(&self, request: &Request);
}

/// Dialog engine for deployments without dialog state (and for tests):
/// every association succeeds.
#[derive(Debug, Default)]
pub struct NullDialogEngine;

#[async_trait]
impl DialogEngine for NullDialogEngine {
    async fn dialog_request(
        &self,
        request: &Request,
        local_tag: &SmolStr,
    ) -> Result<DialogId, DialogError> {
        let call_id = request
            .call_id()
            .cloned()
            .unwrap_or_else(|| SmolStr::new_static(""));
        let remote_tag = request
            .from_tag()
            .map(|t| SmolStr::new(t.to_owned()))
            .unwrap_or_default();
        Ok(DialogId::new(call_id, local_tag.clone(), remote_tag))
    }

    async fn on_ack(&self, _request: &Request) {}
}
