//! Telephony webhooks: the call turn controller.
//!
//! A call moves through these endpoints as Twilio follows the markup each one
//! returns:
//!
//! 1. `/voice` greets the caller and listens.
//! 2. `/respond` receives a transcript, answers at once with hold music, and
//!    starts generation in the background. The first fragment (or the end of
//!    generation) interrupts the music with a live-call redirect to
//!    `/check_ai`, but never before `min_hold_ms` has passed.
//! 3. `/check_ai` narrates queued fragments and polls itself until the turn
//!    ends, then either listens again or hands off to `/process_tool`.
//! 4. `/process_tool` runs the pending tool batch and speaks the answer, or
//!    dials the operator, whose outcome comes back on `/handle-dial-status`.
//! 5. `/reprompt?retry=N` handles silence and closes the call after
//!    `max_silent_retries` attempts.
//!
//! Every handler answers with a valid markup document; failures degrade to
//! an apology followed by listening.
//!
//! Turns are tracked per call id, but the conversation is keyed by the
//! caller's number when Twilio sends one, so a caller who later writes on
//! WhatsApp continues the same history. Two simultaneous calls from one
//! number share that history. Calls without a caller number fall back to the
//! call id.

use crate::{call_query, AppState, Twiml};
use axum::extract::{rejection::FormRejection, Extension, Form, Query};
use serde::Deserialize;
use skipper_agent::{
    speakable, AgentError, CallTurnTask, PendingTools, PollStep, ToolBatchOutcome, TurnOutcome,
    TurnSink, TurnStore,
};
use skipper_types::Channel;
use skipper_voice::{strip_whatsapp_prefix, CallControl, Gather, TwimlBuilder};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const RESPOND_PATH: &str = "/respond";
const REPROMPT_PATH: &str = "/reprompt";
const DIAL_STATUS_PATH: &str = "/handle-dial-status";

/// Form fields Twilio posts to the voice webhooks. Unknown fields are
/// ignored.
#[derive(Debug, Default, Deserialize)]
pub struct VoiceWebhook {
    #[serde(rename = "CallSid")]
    pub call_sid: Option<String>,
    #[serde(rename = "SpeechResult")]
    pub speech_result: Option<String>,
    #[serde(rename = "From")]
    pub from: Option<String>,
    #[serde(rename = "DialCallStatus")]
    pub dial_call_status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallQuery {
    #[serde(rename = "CallSid")]
    pub call_sid: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RepromptQuery {
    pub retry: Option<String>,
}

fn webhook_fields(form: Result<Form<VoiceWebhook>, FormRejection>) -> VoiceWebhook {
    match form {
        Ok(Form(fields)) => fields,
        Err(e) => {
            warn!(error = %e, "unreadable webhook body");
            VoiceWebhook::default()
        }
    }
}

/// Call id from the query string, falling back to the form body.
fn resolve_call_sid(query: CallQuery, fields: &VoiceWebhook) -> Option<String> {
    query
        .call_sid
        .or_else(|| fields.call_sid.clone())
        .filter(|sid| !sid.is_empty())
}

/// Conversation key for a call: the caller's number, else the call id.
fn voice_session_id(call_sid: &str, from: Option<&str>) -> String {
    from.map(|phone| strip_whatsapp_prefix(phone.trim()))
        .filter(|phone| !phone.is_empty())
        .unwrap_or(call_sid)
        .to_string()
}

fn poll_path(call_sid: &str) -> String {
    format!("/check_ai?{}", call_query(call_sid))
}

fn tool_path(call_sid: &str) -> String {
    format!("/process_tool?{}", call_query(call_sid))
}

/// Appends a speech gather followed by the silence fallback.
fn listen(builder: TwimlBuilder, state: &AppState) -> TwimlBuilder {
    let gather = Gather::speech(RESPOND_PATH, &state.voice.voices.primary().stt_language);
    builder.gather(&gather).redirect(REPROMPT_PATH)
}

fn say_fixed(builder: TwimlBuilder, state: &AppState, text: &str) -> TwimlBuilder {
    builder.say(&state.voice.voices.primary().tts_voice, text)
}

/// Speaks generated text with the voice of its detected language. Text that
/// is empty once cleaned is skipped.
fn say_generated(builder: TwimlBuilder, state: &AppState, text: &str) -> TwimlBuilder {
    let cleaned = speakable(text);
    if cleaned.is_empty() {
        return builder;
    }
    let voice = state.voice.voices.voice_for_text(&cleaned);
    debug!(voice = %voice.tts_voice, "selected synthesis voice");
    builder.say(&voice.tts_voice, &cleaned)
}

/// Apology, then back to the silence handler.
fn apology(state: &AppState) -> Twiml {
    let builder = say_fixed(TwimlBuilder::new(), state, &state.phrases.apology);
    Twiml(builder.redirect(REPROMPT_PATH).build())
}

/// Handler for `POST /voice`.
pub async fn start_call_handler(
    Extension(state): Extension<Arc<AppState>>,
    form: Result<Form<VoiceWebhook>, FormRejection>,
) -> Twiml {
    let fields = webhook_fields(form);
    info!(call_sid = fields.call_sid.as_deref().unwrap_or("<none>"), "incoming call");
    let builder = say_fixed(TwimlBuilder::new(), &state, &state.phrases.greeting);
    Twiml(listen(builder, &state).build())
}

/// Feeds generation progress into the call's turn task and interrupts the
/// hold music once.
struct CallTurnSink {
    call_sid: String,
    task: Arc<CallTurnTask>,
    turns: Arc<TurnStore>,
    call_control: Arc<dyn CallControl>,
    min_hold: Duration,
    poll_url: String,
}

impl CallTurnSink {
    fn interrupt(&self) {
        if !self.turns.is_current(&self.call_sid, &self.task) {
            debug!(call_sid = %self.call_sid, "turn superseded, not interrupting");
            return;
        }
        let Some(delay) = self.task.claim_interruption(self.min_hold) else {
            return;
        };
        info!(
            call_sid = %self.call_sid,
            delay_ms = delay.as_millis() as u64,
            "response ready, scheduling hold music interruption"
        );

        let twiml = TwimlBuilder::new().redirect(&self.poll_url).build();
        let call_control = self.call_control.clone();
        let call_sid = self.call_sid.clone();
        let turns = self.turns.clone();
        let task = self.task.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // A newer transcript may have replaced this turn during the hold.
            if !turns.is_current(&call_sid, &task) {
                debug!(call_sid = %call_sid, "turn superseded during hold, redirect dropped");
                return;
            }
            if let Err(e) = call_control.redirect_call(&call_sid, &twiml).await {
                warn!(call_sid = %call_sid, error = %e, "live call redirect failed");
            }
        });
    }
}

impl TurnSink for CallTurnSink {
    fn on_fragment(&self, fragment: String) {
        self.task.push_fragment(fragment);
        self.interrupt();
    }

    fn on_complete(&self, outcome: TurnOutcome) {
        self.task.complete(outcome);
        self.interrupt();
    }

    fn on_error(&self, error: AgentError) {
        debug!(call_sid = %self.call_sid, error = %error, "turn failed");
        self.task.fail();
        self.interrupt();
    }
}

/// Handler for `POST /respond`.
///
/// Returns hold music immediately; generation runs on its own task.
pub async fn submit_speech_handler(
    Extension(state): Extension<Arc<AppState>>,
    form: Result<Form<VoiceWebhook>, FormRejection>,
) -> Twiml {
    let fields = webhook_fields(form);
    let transcript = fields
        .speech_result
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    let call_sid = fields.call_sid.clone().unwrap_or_default();

    if transcript.is_empty() || call_sid.is_empty() {
        debug!(call_sid = %call_sid, "no speech, reprompting");
        return Twiml(TwimlBuilder::new().redirect(REPROMPT_PATH).build());
    }

    info!(call_sid = %call_sid, transcript = %transcript, "speech received");
    let phone = fields
        .from
        .as_deref()
        .map(|p| strip_whatsapp_prefix(p.trim()).to_string())
        .filter(|p| !p.is_empty());
    let session_id = voice_session_id(&call_sid, phone.as_deref());
    state.sessions.init(&session_id, Channel::Voice);
    if let Some(phone) = phone.as_deref() {
        state.sessions.set_caller_phone(&session_id, phone);
    }

    let task = state.turns.start(&call_sid, &session_id);
    let poll = poll_path(&call_sid);
    let sink = CallTurnSink {
        call_sid: call_sid.clone(),
        task,
        turns: state.turns.clone(),
        call_control: state.call_control.clone(),
        min_hold: Duration::from_millis(state.voice.min_hold_ms),
        poll_url: state.absolute_url(&poll),
    };
    let assistant = state.assistant.clone();
    tokio::spawn(async move {
        assistant
            .stream_turn(&session_id, phone.as_deref(), &transcript, &sink)
            .await;
    });

    Twiml(
        TwimlBuilder::new()
            .play(&state.voice.hold_music_url, state.voice.hold_music_loops)
            .redirect(&poll)
            .build(),
    )
}

/// Handler for `POST /check_ai?CallSid=...`.
pub async fn poll_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<CallQuery>,
    form: Result<Form<VoiceWebhook>, FormRejection>,
) -> Twiml {
    let fields = webhook_fields(form);
    let task = resolve_call_sid(query, &fields)
        .and_then(|sid| state.turns.get(&sid).map(|task| (sid, task)));
    let Some((call_sid, task)) = task else {
        debug!("no turn in progress, listening");
        return Twiml(listen(TwimlBuilder::new(), &state).build());
    };

    match task.poll() {
        PollStep::Failed => {
            state.turns.remove(&call_sid);
            warn!(call_sid = %call_sid, "turn failed, apologising");
            apology(&state)
        }
        PollStep::Narrate(text) => {
            debug!(call_sid = %call_sid, chars = text.len(), "narrating fragments");
            let builder = say_generated(TwimlBuilder::new(), &state, &text);
            Twiml(builder.redirect(&poll_path(&call_sid)).build())
        }
        PollStep::Pending => Twiml(
            TwimlBuilder::new()
                .pause(state.voice.poll_pause_secs)
                .redirect(&poll_path(&call_sid))
                .build(),
        ),
        PollStep::Finished(outcome) => {
            state.turns.remove(&call_sid);
            if outcome.requires_tools() {
                info!(call_sid = %call_sid, tools = outcome.tool_calls.len(), "tool calls pending");
                state.sessions.set_pending(
                    task.session_id(),
                    PendingTools {
                        invocations: outcome.tool_calls,
                        context: outcome.context,
                    },
                );
                Twiml(TwimlBuilder::new().redirect(&tool_path(&call_sid)).build())
            } else {
                Twiml(listen(TwimlBuilder::new(), &state).build())
            }
        }
    }
}

/// Handler for `POST /process_tool?CallSid=...`.
pub async fn execute_tool_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<CallQuery>,
    form: Result<Form<VoiceWebhook>, FormRejection>,
) -> Twiml {
    let fields = webhook_fields(form);
    let pending = resolve_call_sid(query, &fields).and_then(|sid| {
        let session_id = voice_session_id(&sid, fields.from.as_deref());
        state
            .sessions
            .take_pending(&session_id)
            .map(|p| (sid, session_id, p))
    });
    let Some((call_sid, session_id, pending)) = pending else {
        warn!("tool execution requested with nothing pending");
        return apology(&state);
    };

    let outcome = state
        .assistant
        .run_tools(&session_id, Channel::Voice, pending.invocations, &pending.context)
        .await;

    match outcome {
        Ok(ToolBatchOutcome::Transfer) if !state.voice.operator_number.is_empty() => {
            info!(call_sid = %call_sid, operator = %state.voice.operator_number, "dialling operator");
            let builder = say_fixed(TwimlBuilder::new(), &state, &state.phrases.transferring);
            Twiml(
                builder
                    .dial(
                        &state.voice.operator_number,
                        state.voice.operator_ring_timeout_secs,
                        DIAL_STATUS_PATH,
                    )
                    .build(),
            )
        }
        Ok(ToolBatchOutcome::Transfer) => {
            warn!(call_sid = %call_sid, "transfer requested but no operator number configured");
            let builder =
                say_fixed(TwimlBuilder::new(), &state, &state.phrases.operator_unavailable);
            Twiml(listen(builder, &state).build())
        }
        Ok(ToolBatchOutcome::Reply(text)) => {
            let builder = match text {
                Some(text) => say_generated(TwimlBuilder::new(), &state, &text),
                None => TwimlBuilder::new(),
            };
            Twiml(listen(builder, &state).build())
        }
        Err(e) => {
            warn!(call_sid = %call_sid, error = %e, "tool batch failed");
            apology(&state)
        }
    }
}

/// Handler for `POST /handle-dial-status`.
///
/// The session key does not change during a call, so the conversation carries
/// on after a failed transfer.
pub async fn operator_return_handler(
    Extension(state): Extension<Arc<AppState>>,
    form: Result<Form<VoiceWebhook>, FormRejection>,
) -> Twiml {
    let fields = webhook_fields(form);
    let status = fields.dial_call_status.as_deref().unwrap_or_default();
    info!(
        call_sid = fields.call_sid.as_deref().unwrap_or("<none>"),
        status,
        "operator leg finished"
    );

    if matches!(status, "completed" | "answered") {
        return Twiml(TwimlBuilder::new().hangup().build());
    }
    let builder = say_fixed(TwimlBuilder::new(), &state, &state.phrases.operator_unavailable);
    Twiml(listen(builder, &state).build())
}

/// Handler for `POST /reprompt?retry=N`.
pub async fn reprompt_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<RepromptQuery>,
) -> Twiml {
    let retry: u32 = query
        .retry
        .as_deref()
        .and_then(|r| r.trim().parse().ok())
        .unwrap_or(0);
    info!(retry, "caller silent");

    if retry >= state.voice.max_silent_retries {
        info!(retry, "silence limit reached, closing call");
        let builder = say_fixed(TwimlBuilder::new(), &state, &state.phrases.closing);
        return Twiml(builder.hangup().build());
    }

    let mut builder = TwimlBuilder::new();
    if retry > 0 {
        builder = say_fixed(builder, &state, &state.phrases.still_here);
    }
    let gather = Gather::speech(RESPOND_PATH, &state.voice.voices.primary().stt_language);
    Twiml(
        builder
            .play(&state.voice.hold_music_url, 1)
            .gather(&gather)
            .redirect(&format!("{}?retry={}", REPROMPT_PATH, retry + 1))
            .build(),
    )
}
