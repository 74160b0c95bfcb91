//! Tests for the telephony webhooks.
//!
//! These tests verify:
//! - A transcript is answered with hold music and a poll redirect, never speech
//! - The hold music is interrupted exactly once, and not before the minimum
//!   hold duration
//! - Narration, tool hand-off, operator transfer and failure paths
//! - The silent reprompt ladder and its ceiling
//! - A superseded turn never redirects the call
//! - Call history is keyed by the caller's number and shared with WhatsApp

mod common;

use axum::http::StatusCode;
use common::{delayed_text, harness, post_form, text, tools, Script, OPERATOR, PUBLIC_URL};
use serde_json::json;
use skipper_agent::Phrases;
use skipper_types::{ToolInvocation, Turn};
use std::time::Duration;
use tokio::time::{sleep, Instant};

const CALLER: &str = "From=%2B972500000000";
const CALLER_PHONE: &str = "+972500000000";

fn speech(call_sid: &str, transcript: &str) -> String {
    format!(
        "CallSid={}&SpeechResult={}&{}",
        call_sid,
        transcript.replace(' ', "+"),
        CALLER
    )
}

#[tokio::test]
async fn greeting_then_listen() {
    let h = harness(vec![]);
    let (status, body) = post_form(&h.app, "/voice", "CallSid=CA0").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(&Phrases::default().greeting));
    assert!(body.contains(r#"<Gather input="speech" action="/respond""#));
    assert!(body.contains(r#"language="he-IL""#));
    assert!(body.ends_with(r#"<Redirect method="POST">/reprompt</Redirect></Response>"#));
}

#[tokio::test]
async fn transcript_is_answered_with_hold_music_first() {
    let h = harness(vec![text(&["all set"])]);
    let (status, body) = post_form(&h.app, "/respond", &speech("CA1", "status check")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#"<Play loop="10">"#));
    assert!(body.contains(r#"<Redirect method="POST">/check_ai?CallSid=CA1</Redirect>"#));
    assert!(!body.contains("<Say"));
    assert_eq!(
        h.state.sessions.caller_phone(CALLER_PHONE).as_deref(),
        Some(CALLER_PHONE)
    );
    assert!(!h.state.sessions.contains("CA1"));
}

#[tokio::test]
async fn empty_transcript_goes_to_reprompt() {
    let h = harness(vec![]);
    let (_, body) = post_form(&h.app, "/respond", "CallSid=CA1&SpeechResult=++").await;

    assert!(body.contains(r#"<Redirect method="POST">/reprompt</Redirect>"#));
    assert!(!body.contains("<Play"));
    assert!(h.state.turns.is_empty());
    assert_eq!(h.model.request_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn interruption_fires_once_after_minimum_hold() {
    let h = harness(vec![delayed_text(
        Duration::from_millis(100),
        &["One, ", "two, ", "three."],
    )]);
    let started = Instant::now();
    post_form(&h.app, "/respond", &speech("CA2", "hello")).await;

    sleep(Duration::from_millis(1899)).await;
    assert!(h.calls.redirects().is_empty(), "redirect issued before the hold floor");

    sleep(Duration::from_millis(200)).await;
    let redirects = h.calls.redirects();
    assert_eq!(redirects.len(), 1);
    assert_eq!(redirects[0].call_sid, "CA2");
    assert!(redirects[0].at.duration_since(started) >= Duration::from_millis(2000));
    assert!(redirects[0]
        .twiml
        .contains(&format!("{}/check_ai?CallSid=CA2", PUBLIC_URL)));

    sleep(Duration::from_secs(5)).await;
    assert_eq!(h.calls.redirects().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn late_first_fragment_interrupts_without_extra_delay() {
    let h = harness(vec![delayed_text(Duration::from_secs(3), &["Done."])]);
    let started = Instant::now();
    post_form(&h.app, "/respond", &speech("CA3", "hello")).await;

    sleep(Duration::from_millis(3010)).await;
    let redirects = h.calls.redirects();
    assert_eq!(redirects.len(), 1);
    let waited = redirects[0].at.duration_since(started);
    assert!(waited >= Duration::from_secs(3) && waited < Duration::from_millis(3010));
}

#[tokio::test(start_paused = true)]
async fn status_check_end_to_end() {
    let h = harness(vec![text(&["all set"])]);

    let (_, hold) = post_form(&h.app, "/respond", &speech("CA4", "status check")).await;
    assert!(hold.contains("<Play"));

    sleep(Duration::from_millis(2100)).await;
    assert_eq!(h.calls.redirects().len(), 1);

    let (_, narration) = post_form(&h.app, "/check_ai?CallSid=CA4", "CallSid=CA4").await;
    assert!(narration.contains(r#"<Say voice="Polly.Joanna">all set</Say>"#));
    assert!(narration.contains(r#"<Redirect method="POST">/check_ai?CallSid=CA4</Redirect>"#));

    let (_, listen) = post_form(&h.app, "/check_ai?CallSid=CA4", "CallSid=CA4").await;
    assert!(!listen.contains("<Say"));
    assert!(listen.contains("<Gather"));
    assert!(listen.contains(r#"<Redirect method="POST">/reprompt</Redirect>"#));

    assert!(h.state.turns.is_empty());
    assert_eq!(
        h.state.sessions.history(CALLER_PHONE),
        vec![Turn::user("status check"), Turn::model("all set")]
    );
}

#[tokio::test(start_paused = true)]
async fn poll_pauses_while_generation_is_running() {
    let h = harness(vec![delayed_text(Duration::from_secs(5), &["late."])]);
    post_form(&h.app, "/respond", &speech("CA5", "hello")).await;

    let (_, body) = post_form(&h.app, "/check_ai?CallSid=CA5", "").await;
    assert!(body.contains(r#"<Pause length="1"/>"#));
    assert!(body.contains(r#"<Redirect method="POST">/check_ai?CallSid=CA5</Redirect>"#));
}

#[tokio::test(start_paused = true)]
async fn superseded_turn_does_not_redirect() {
    let h = harness(vec![
        delayed_text(Duration::from_secs(1), &["Old answer."]),
        delayed_text(Duration::from_secs(3), &["New answer."]),
    ]);
    post_form(&h.app, "/respond", &speech("CA12", "first question")).await;
    sleep(Duration::from_millis(500)).await;
    post_form(&h.app, "/respond", &speech("CA12", "second question")).await;

    sleep(Duration::from_millis(2500)).await;
    assert!(
        h.calls.redirects().is_empty(),
        "the replaced turn interrupted the new hold"
    );

    sleep(Duration::from_millis(600)).await;
    assert_eq!(h.calls.redirects().len(), 1);
    let (_, narration) = post_form(&h.app, "/check_ai?CallSid=CA12", "").await;
    assert!(narration.contains("New answer."));
    assert!(!narration.contains("Old answer."));
}

#[tokio::test(start_paused = true)]
async fn call_without_caller_number_is_keyed_by_call_id() {
    let h = harness(vec![text(&["all set"])]);
    post_form(&h.app, "/respond", "CallSid=CA14&SpeechResult=status+check").await;
    sleep(Duration::from_millis(2100)).await;

    assert_eq!(h.state.sessions.history("CA14").len(), 2);
    assert!(h.state.sessions.caller_phone("CA14").is_none());
}

#[tokio::test(start_paused = true)]
async fn whatsapp_follow_up_continues_the_call_history() {
    let h = harness(vec![text(&["all set"]), text(&["You are welcome."])]);
    post_form(&h.app, "/respond", &speech("CA13", "status check")).await;
    sleep(Duration::from_millis(2100)).await;

    let (_, body) = post_form(
        &h.app,
        "/whatsapp",
        "Body=thanks&MessageSid=SM13&From=whatsapp%3A%2B972500000000",
    )
    .await;
    assert!(body.contains("<Message>You are welcome.</Message>"));
    assert_eq!(
        h.state.sessions.history(CALLER_PHONE),
        vec![
            Turn::user("status check"),
            Turn::model("all set"),
            Turn::user("thanks"),
            Turn::model("You are welcome."),
        ]
    );
}

#[tokio::test]
async fn poll_without_turn_resumes_listening() {
    let h = harness(vec![]);
    let (status, body) = post_form(&h.app, "/check_ai?CallSid=CAunknown", "").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<Gather"));
    assert!(!body.contains("<Say"));
}

#[tokio::test(start_paused = true)]
async fn generation_failure_apologises_and_reprompts() {
    let h = harness(vec![Script::Fail]);
    post_form(&h.app, "/respond", &speech("CA6", "hello")).await;

    sleep(Duration::from_millis(2100)).await;
    assert_eq!(h.calls.redirects().len(), 1);

    let (_, body) = post_form(&h.app, "/check_ai?CallSid=CA6", "").await;
    assert!(body.contains(&Phrases::default().apology));
    assert!(body.contains(r#"<Redirect method="POST">/reprompt</Redirect>"#));
    assert!(h.state.turns.is_empty());
}

#[tokio::test(start_paused = true)]
async fn requested_tools_run_on_process_tool() {
    let h = harness(vec![
        tools(vec![ToolInvocation::new(
            "check_yacht_availability",
            json!({"date": "14.07.2026", "duration": 3, "yachtName": "Bagira"}),
        )]),
        text(&["Tomorrow is free."]),
    ]);
    post_form(&h.app, "/respond", &speech("CA7", "is the yacht free")).await;
    sleep(Duration::from_millis(2100)).await;

    let (_, handoff) = post_form(&h.app, "/check_ai?CallSid=CA7", "").await;
    assert!(handoff.contains(r#"<Redirect method="POST">/process_tool?CallSid=CA7</Redirect>"#));
    assert!(h.state.turns.is_empty());

    let (_, answer) = post_form(&h.app, "/process_tool?CallSid=CA7", CALLER).await;
    assert!(answer.contains(r#"<Say voice="Polly.Joanna">Tomorrow is free.</Say>"#));
    assert!(answer.contains("<Gather"));
    assert_eq!(h.executor.executed(), vec!["check_yacht_availability"]);
    assert!(h.state.sessions.take_pending(CALLER_PHONE).is_none());
}

#[tokio::test(start_paused = true)]
async fn transfer_dials_the_operator() {
    let h = harness(vec![tools(vec![ToolInvocation::new(
        "transfer_to_support",
        json!({}),
    )])]);
    post_form(&h.app, "/respond", &speech("CA8", "human please")).await;
    sleep(Duration::from_millis(2100)).await;
    post_form(&h.app, "/check_ai?CallSid=CA8", "").await;

    let (_, body) = post_form(&h.app, "/process_tool", &format!("CallSid=CA8&{}", CALLER)).await;
    assert!(body.contains(&Phrases::default().transferring));
    assert!(body.contains(&format!(
        r#"<Dial timeout="20" action="/handle-dial-status" method="POST">{}</Dial>"#,
        OPERATOR
    )));
    assert!(!body.contains("<Gather"));
}

#[tokio::test]
async fn process_tool_without_pending_batch_apologises() {
    let h = harness(vec![]);
    let (status, body) = post_form(&h.app, "/process_tool?CallSid=CA9", "").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(&Phrases::default().apology));
    assert!(body.contains(r#"<Redirect method="POST">/reprompt</Redirect>"#));
    assert!(h.executor.executed().is_empty());
}

#[tokio::test]
async fn answered_operator_leg_hangs_up() {
    let h = harness(vec![]);
    let (_, body) = post_form(
        &h.app,
        "/handle-dial-status",
        "CallSid=CA10&DialCallStatus=completed",
    )
    .await;
    assert!(body.contains("<Hangup/>"));
    assert!(!body.contains("<Gather"));
}

#[tokio::test]
async fn unanswered_operator_leg_resumes_conversation() {
    let h = harness(vec![]);
    for status in ["busy", "no-answer", "failed"] {
        let (_, body) = post_form(
            &h.app,
            "/handle-dial-status",
            &format!("CallSid=CA11&DialCallStatus={}", status),
        )
        .await;
        assert!(body.contains(&Phrases::default().operator_unavailable));
        assert!(body.contains("<Gather"));
        assert!(!body.contains("<Hangup/>"));
    }
}

#[tokio::test]
async fn first_reprompt_plays_music_without_nudge() {
    let h = harness(vec![]);
    let (_, body) = post_form(&h.app, "/reprompt", "").await;

    assert!(!body.contains("<Say"));
    assert!(body.contains(r#"<Play loop="1">"#));
    assert!(body.contains("<Gather"));
    assert!(body.contains(r#"<Redirect method="POST">/reprompt?retry=1</Redirect>"#));
}

#[tokio::test]
async fn later_reprompts_nudge_the_caller() {
    let h = harness(vec![]);
    let still_here = Phrases::default().still_here;
    for retry in 1..3 {
        let (_, body) = post_form(&h.app, &format!("/reprompt?retry={}", retry), "").await;
        assert!(body.contains(&still_here));
        assert!(body.contains(&format!("/reprompt?retry={}", retry + 1)));
    }
}

#[tokio::test]
async fn third_silent_retry_closes_the_call() {
    let h = harness(vec![]);
    let (_, body) = post_form(&h.app, "/reprompt?retry=3", "").await;

    assert!(body.contains(&Phrases::default().closing));
    assert!(body.ends_with("<Hangup/></Response>"));
    assert!(!body.contains("<Gather"));
    assert!(!body.contains("<Play"));
}
