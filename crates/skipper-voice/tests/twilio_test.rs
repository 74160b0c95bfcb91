use axum::{extract::Path, http::HeaderMap, routing::post, Form, Json, Router};
use serde_json::json;
use skipper_voice::{CallControl, MessageSender, TelephonyConfig, TwilioClient, VoiceError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type Captured = Arc<Mutex<Vec<(String, HashMap<String, String>, Option<String>)>>>;

/// Starts a local stand-in for the Twilio REST API that records every form
/// post and answers with a message resource.
async fn start_fake_twilio() -> (String, Captured) {
    let captured: Captured = Arc::new(Mutex::new(Vec::new()));

    let calls = captured.clone();
    let messages = captured.clone();
    let app = Router::new()
        .route(
            "/2010-04-01/Accounts/{account}/Calls/{call}",
            post(
                move |Path((_account, call)): Path<(String, String)>,
                      headers: HeaderMap,
                      Form(form): Form<HashMap<String, String>>| {
                    let calls = calls.clone();
                    async move {
                        let auth = headers
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        calls.lock().unwrap().push((call, form, auth));
                        Json(json!({"sid": "CA123", "status": "in-progress"}))
                    }
                },
            ),
        )
        .route(
            "/2010-04-01/Accounts/{account}/Messages.json",
            post(move |Form(form): Form<HashMap<String, String>>| {
                let messages = messages.clone();
                async move {
                    messages
                        .lock()
                        .unwrap()
                        .push(("Messages.json".to_string(), form, None));
                    Json(json!({"sid": "SM42"}))
                }
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), captured)
}

fn client_for(base_url: &str) -> TwilioClient {
    let mut config = TelephonyConfig::new("AC1", "secret", "+972500000000");
    config.api_base_url = base_url.to_string();
    TwilioClient::new(config)
}

#[tokio::test]
async fn redirect_call_posts_twiml_with_basic_auth() {
    let (base_url, captured) = start_fake_twilio().await;
    let client = client_for(&base_url);

    client
        .redirect_call("CA123", "<Response><Redirect>/check_ai</Redirect></Response>")
        .await
        .expect("redirect should succeed");

    let captured = captured.lock().unwrap();
    assert_eq!(captured.len(), 1);
    let (call, form, auth) = &captured[0];
    assert_eq!(call, "CA123.json");
    assert!(form["Twiml"].contains("/check_ai"));
    assert!(auth.as_deref().unwrap_or_default().starts_with("Basic "));
}

#[tokio::test]
async fn whatsapp_addresses_are_prefixed_once() {
    let (base_url, captured) = start_fake_twilio().await;
    let client = client_for(&base_url);

    let sid = client
        .send_whatsapp("whatsapp:+972511111111", "hello")
        .await
        .expect("send should succeed");
    assert_eq!(sid, "SM42");

    let captured = captured.lock().unwrap();
    let (_, form, _) = &captured[0];
    assert_eq!(form["To"], "whatsapp:+972511111111");
    assert_eq!(form["From"], "whatsapp:+972500000000");
    assert_eq!(form["Body"], "hello");
}

#[tokio::test]
async fn sms_uses_plain_numbers() {
    let (base_url, captured) = start_fake_twilio().await;
    let client = client_for(&base_url);

    client.send_sms("+972522222222", "ping").await.unwrap();

    let captured = captured.lock().unwrap();
    let (_, form, _) = &captured[0];
    assert_eq!(form["To"], "+972522222222");
    assert_eq!(form["From"], "+972500000000");
}

#[tokio::test]
async fn unconfigured_client_fails_without_network() {
    let client = TwilioClient::new(TelephonyConfig::default());
    assert!(!client.is_enabled());

    let result = client.send_sms("+1", "x").await;
    match result {
        Err(VoiceError::Config(msg)) => assert!(msg.contains("credentials missing")),
        other => panic!("expected Config error, got {:?}", other),
    }
}

#[tokio::test]
async fn api_errors_carry_status_and_body() {
    let app = Router::new().route(
        "/2010-04-01/Accounts/{account}/Messages.json",
        post(|| async { (axum::http::StatusCode::BAD_REQUEST, "invalid To number") }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = client_for(&format!("http://{}", addr));
    match client.send_sms("bogus", "x").await {
        Err(VoiceError::Api { status, body }) => {
            assert_eq!(status, 400);
            assert_eq!(body, "invalid To number");
        }
        other => panic!("expected Api error, got {:?}", other),
    }
}
