// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use smol_str::SmolStr;

/// Declares the method vocabulary together with its wire tokens, so the
/// token table exists in exactly one place.
macro_rules! methods {
    ($($variant:ident => $token:literal,)+) => {
        /// SIP request methods the transaction layer dispatches on.
        ///
        /// Extension methods survive parsing as [`Method::Unknown`] with
        /// their token preserved; whether they are answered or rejected 405
        /// is a per-call configuration decision.
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum Method {
            $($variant,)+
            Unknown(SmolStr),
        }

        impl Method {
            /// Returns the canonical uppercase token.
            pub fn as_str(&self) -> &str {
                match self {
                    $(Method::$variant => $token,)+
                    Method::Unknown(token) => token.as_str(),
                }
            }

            /// Parses a method token, case-insensitively.
            pub fn from_token(token: &str) -> Self {
                $(
                    if token.eq_ignore_ascii_case($token) {
                        return Method::$variant;
                    }
                )+
                Method::Unknown(SmolStr::new(token.to_owned()))
            }

            /// Every standard method, in the order advertised in `Allow`.
            pub fn standard_set() -> Vec<Method> {
                vec![$(Method::$variant,)+]
            }
        }
    };
}

methods! {
    Invite => "INVITE",
    Ack => "ACK",
    Bye => "BYE",
    Cancel => "CANCEL",
    Register => "REGISTER",
    Options => "OPTIONS",
    Info => "INFO",
    Update => "UPDATE",
    Message => "MESSAGE",
    Prack => "PRACK",
    Refer => "REFER",
    Subscribe => "SUBSCRIBE",
    Notify => "NOTIFY",
    Publish => "PUBLISH",
}

impl Method {
    /// INVITE transactions get the 100-Trying and guard-timer treatment.
    pub fn is_invite(&self) -> bool {
        matches!(self, Method::Invite)
    }

    /// ACK never produces a response.
    pub fn is_ack(&self) -> bool {
        matches!(self, Method::Ack)
    }

    /// CANCEL is matched against its INVITE before it reaches any handler.
    pub fn is_cancel(&self) -> bool {
        matches!(self, Method::Cancel)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
