use skipper_types::Language;
use skipper_voice::{TelephonyConfig, VoiceSettings};

#[test]
fn partial_voice_table_keeps_defaults() {
    let settings: VoiceSettings = toml::from_str(
        r#"
        [english]
        tts_voice = "Polly.Matthew"
        stt_language = "en-GB"
        "#,
    )
    .expect("voice table should parse");

    assert_eq!(settings.english.tts_voice, "Polly.Matthew");
    assert_eq!(settings.hebrew, VoiceSettings::default().hebrew);
    assert_eq!(settings.primary().stt_language, "he-IL");
}

#[test]
fn voice_follows_detected_language() {
    let settings = VoiceSettings::default();
    assert_eq!(
        settings.voice_for_text("הכל מוכן"),
        settings.for_language(Language::Hebrew)
    );
    assert_eq!(
        settings.voice_for_text("all set"),
        settings.for_language(Language::English)
    );
}

#[test]
fn debug_output_redacts_auth_token() {
    let config = TelephonyConfig::new("AC1", "super-secret", "+972500000000");
    let debug = format!("{:?}", config);
    assert!(debug.contains("[REDACTED]"));
    assert!(!debug.contains("super-secret"));
}

#[test]
fn telephony_api_base_defaults_when_omitted() {
    let config: TelephonyConfig = toml::from_str(
        r#"
        account_sid = "AC1"
        auth_token = "t"
        phone_number = "+1"
        "#,
    )
    .unwrap();
    assert_eq!(config.api_base_url, "https://api.twilio.com");
    assert!(config.is_configured());
}
