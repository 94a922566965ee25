// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Property tests over the pure transaction state machine.

use std::sync::Arc;

use proptest::prelude::*;
use sip_call::fsm::{self, UasAction, UasEvent};
use sip_call::route::{RouteAnswer, RouteOpts};
use sip_call::tx::{TransKey, TxId, UasTx};
use sip_call::{AuthDecision, CallConfig, MethodAnswer, SipReply, TimerName};
use sip_core::Method;
use sip_testkit::{udp_ctx, RequestBuilder};
use smol_str::SmolStr;

fn make_tx(method: Method, headers: &[(String, String)]) -> UasTx {
    let mut builder = RequestBuilder::new(method, "sip:svc@example.com");
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    let request = Arc::new(builder.build());
    let key = TransKey::from_request(&request);
    UasTx::new(
        TxId(1),
        key,
        request,
        udp_ctx(),
        None,
        SmolStr::new_static("lt"),
    )
}

fn count_finals(actions: &[UasAction]) -> usize {
    actions
        .iter()
        .filter(|a| matches!(a, UasAction::SendFinal(_)))
        .count()
}

fn non_ack_method() -> impl Strategy<Value = Method> {
    prop_oneof![
        Just(Method::Invite),
        Just(Method::Message),
        Just(Method::Options),
        Just(Method::Bye),
        Just(Method::Info),
        Just(Method::Register),
    ]
}

fn final_code() -> impl Strategy<Value = u16> {
    200u16..700
}

proptest! {
    // P1: exactly one final response over the whole life of a non-ACK
    // transaction, no matter how the final is produced or how often the
    // triggering event repeats.
    #[test]
    fn exactly_one_final_response(
        method in non_ack_method(),
        code in final_code(),
        path in 0usize..4,
        repeats in 1usize..4,
    ) {
        let cfg = CallConfig::default();
        let mut tx = make_tx(method, &[]);
        let mut finals = 0usize;

        finals += count_finals(&fsm::step(&mut tx, UasEvent::Start, &cfg));

        let trigger = match path {
            0 => UasEvent::Authorized(AuthDecision::Reply(SipReply::Status(code))),
            1 => {
                finals += count_finals(&fsm::step(
                    &mut tx,
                    UasEvent::Authorized(AuthDecision::Ok),
                    &cfg,
                ));
                UasEvent::Routed(sip_call::route::normalize(RouteAnswer::Respond(
                    SipReply::Status(code),
                    RouteOpts::default(),
                )))
            }
            2 => {
                finals += count_finals(&fsm::step(
                    &mut tx,
                    UasEvent::Authorized(AuthDecision::Ok),
                    &cfg,
                ));
                finals += count_finals(&fsm::step(&mut tx, UasEvent::DialogReady, &cfg));
                UasEvent::MethodReplied(MethodAnswer::Reply(SipReply::Status(code)))
            }
            _ => UasEvent::TimerFired(TimerName::TimerC),
        };

        for _ in 0..repeats {
            finals += count_finals(&fsm::step(&mut tx, trigger.clone(), &cfg));
        }
        // Whatever arrives afterwards is absorbed.
        finals += count_finals(&fsm::step(&mut tx, UasEvent::Cancelled, &cfg));
        finals += count_finals(&fsm::step(
            &mut tx,
            UasEvent::TimerFired(TimerName::NonInvite),
            &cfg,
        ));

        prop_assert_eq!(finals, 1);
    }

    // P3: the loop fingerprint is a pure function of
    // (app, Call-ID, From tag, CSeq) and ignores the Via branch.
    #[test]
    fn loop_fingerprint_tracks_identifiers(
        call_id in "[a-z0-9]{1,12}",
        from_tag in "[a-z0-9]{1,8}",
        cseq in 1u32..10_000,
        branch_a in "[a-z0-9]{4,10}",
        branch_b in "[a-z0-9]{4,10}",
    ) {
        let build = |branch: &str, cseq: u32| {
            RequestBuilder::invite("sip:svc@example.com")
                .branch(&format!("z9hG4bK{branch}"))
                .call_id(&call_id)
                .from_tag(&from_tag)
                .cseq(cseq)
                .build()
        };
        let first = sip_call::loop_check::loop_id("app", &build(&branch_a, cseq));
        let second = sip_call::loop_check::loop_id("app", &build(&branch_b, cseq));
        let bumped = sip_call::loop_check::loop_id("app", &build(&branch_a, cseq + 1));

        prop_assert_eq!(first, second);
        prop_assert_ne!(first, bumped);
    }

    // P4: a stateless response tears every timer down before it goes out.
    #[test]
    fn stateless_response_cancels_all_timers(
        method in prop_oneof![
            Just(Method::Message),
            Just(Method::Options),
            Just(Method::Bye),
        ],
        code in final_code(),
    ) {
        let cfg = CallConfig::default();
        let mut tx = make_tx(method, &[]);
        fsm::step(&mut tx, UasEvent::Start, &cfg);
        fsm::step(&mut tx, UasEvent::Authorized(AuthDecision::Ok), &cfg);

        let actions = fsm::step(
            &mut tx,
            UasEvent::Routed(sip_call::route::normalize(RouteAnswer::Bare(
                SipReply::Status(code),
            ))),
            &cfg,
        );

        prop_assert!(tx.stateless);
        let cancel_pos = actions
            .iter()
            .position(|a| matches!(a, UasAction::CancelAllTimers));
        let send_pos = actions
            .iter()
            .position(|a| matches!(a, UasAction::SendFinal(_)));
        prop_assert!(cancel_pos.is_some());
        prop_assert!(send_pos.is_some());
        prop_assert!(cancel_pos < send_pos);
    }

    // P7: unsupported Require tokens always produce a 420 listing exactly
    // those tokens in their original order.
    #[test]
    fn unsupported_require_lists_tokens_in_order(
        tokens in proptest::collection::vec("[a-z][a-z0-9]{0,7}", 1..4),
    ) {
        let cfg = CallConfig::default();
        let require = tokens.join(",");
        let mut tx = make_tx(Method::Message, &[("Require".to_string(), require)]);
        fsm::step(&mut tx, UasEvent::Start, &cfg);
        fsm::step(&mut tx, UasEvent::Authorized(AuthDecision::Ok), &cfg);

        let actions = fsm::step(
            &mut tx,
            UasEvent::Routed(sip_call::route::normalize(RouteAnswer::Process)),
            &cfg,
        );

        let listed = actions.iter().find_map(|a| match a {
            UasAction::SendFinal(SipReply::BadExtension(listed)) => Some(listed.clone()),
            _ => None,
        });
        let listed = listed.expect("expected a 420 Bad Extension");
        let listed: Vec<String> = listed.iter().map(|t| t.to_string()).collect();
        prop_assert_eq!(listed, tokens);
    }

    // The CANCEL key rewrite is the identity on everything but the method.
    #[test]
    fn cancel_key_rewrite_preserves_branch(branch in "[a-z0-9]{4,12}") {
        let invite = RequestBuilder::invite("sip:svc@example.com")
            .branch(&format!("z9hG4bK{branch}"))
            .build();
        let cancel = RequestBuilder::cancel_for(&invite).build();

        let invite_key = TransKey::from_request(&invite);
        let cancel_key = TransKey::from_request(&cancel);
        prop_assert_eq!(cancel_key.with_method(Method::Invite), invite_key);
    }
}

// Duplicate CSeq methods in the fingerprint: CANCEL and INVITE of the same
// dialog never collide.
#[test]
fn cancel_and_invite_fingerprints_differ() {
    let invite = RequestBuilder::invite("sip:svc@example.com").build();
    let cancel = RequestBuilder::cancel_for(&invite).build();
    let invite_fp = sip_call::loop_check::loop_id("app", &invite);
    let cancel_fp = sip_call::loop_check::loop_id("app", &cancel);
    assert_ne!(invite_fp, cancel_fp);
}
