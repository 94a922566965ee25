// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core SIP types consumed by the transaction layer.
//!
//! This crate provides the in-memory model of already-parsed SIP messages:
//! - **Messages**: [`Request`], [`Response`] with [`RequestLine`]/[`StatusLine`]
//! - **Headers**: the ordered [`Headers`] container
//! - **Methods**: the [`Method`] enum
//! - **URIs**: a minimal [`SipUri`]
//! - **Transport**: [`TransportKind`] and the per-message [`TransportContext`]
//!
//! Wire parsing and serialization live with the transport collaborators; every
//! message handled here arrives pre-parsed. Types use
//! [`SmolStr`](smol_str::SmolStr) and [`Bytes`](bytes::Bytes) so messages can
//! be shared across tasks without copying header text or bodies.

pub mod headers;
pub mod method;
pub mod msg;
pub mod transport;
pub mod uri;
pub mod version;

pub use headers::{Header, Headers};
pub use method::Method;
pub use msg::{extract_tag, CSeq, Request, RequestLine, Response, StatusLine};
pub use transport::{TransportContext, TransportKind};
pub use uri::SipUri;
pub use version::SipVersion;
