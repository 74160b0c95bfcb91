use serde::{Deserialize, Serialize};
use skipper_types::Language;
use std::fmt;

fn default_api_base_url() -> String {
    "https://api.twilio.com".to_string()
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelephonyConfig {
    pub account_sid: String,
    #[serde(skip_serializing)]
    pub auth_token: String,
    /// The business number calls and messages are sent from (E.164).
    pub phone_number: String,
    /// REST API root. Overridable so tests can point at a local server.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            phone_number: String::new(),
            api_base_url: default_api_base_url(),
        }
    }
}

impl fmt::Debug for TelephonyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelephonyConfig")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"[REDACTED]")
            .field("phone_number", &self.phone_number)
            .field("api_base_url", &self.api_base_url)
            .finish()
    }
}

impl TelephonyConfig {
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        phone_number: impl Into<String>,
    ) -> Self {
        Self {
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            phone_number: phone_number.into(),
            api_base_url: default_api_base_url(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.account_sid.is_empty() && !self.auth_token.is_empty() && !self.phone_number.is_empty()
    }
}

/// Synthesis voice and recognition language for one spoken language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceProfile {
    /// Provider voice name used in `<Say voice=...>`.
    pub tts_voice: String,
    /// Recognition language tag used in `<Gather language=...>`.
    pub stt_language: String,
}

impl VoiceProfile {
    pub fn new(tts_voice: impl Into<String>, stt_language: impl Into<String>) -> Self {
        Self {
            tts_voice: tts_voice.into(),
            stt_language: stt_language.into(),
        }
    }
}

fn default_hebrew() -> VoiceProfile {
    VoiceProfile::new("Google.he-IL-Standard-A", "he-IL")
}

fn default_russian() -> VoiceProfile {
    VoiceProfile::new("Polly.Tatyana", "ru-RU")
}

fn default_english() -> VoiceProfile {
    VoiceProfile::new("Polly.Joanna", "en-US")
}

/// Per-language voice table. Hebrew is the primary language of the line:
/// greetings, prompts and speech recognition always use it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceSettings {
    #[serde(default = "default_hebrew")]
    pub hebrew: VoiceProfile,
    #[serde(default = "default_russian")]
    pub russian: VoiceProfile,
    #[serde(default = "default_english")]
    pub english: VoiceProfile,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            hebrew: default_hebrew(),
            russian: default_russian(),
            english: default_english(),
        }
    }
}

impl VoiceSettings {
    pub fn for_language(&self, language: Language) -> &VoiceProfile {
        match language {
            Language::Hebrew => &self.hebrew,
            Language::Russian => &self.russian,
            Language::English => &self.english,
        }
    }

    /// The voice profile of the line's primary language.
    pub fn primary(&self) -> &VoiceProfile {
        &self.hebrew
    }

    /// Picks the voice matching the language detected in `text`.
    pub fn voice_for_text(&self, text: &str) -> &VoiceProfile {
        self.for_language(Language::detect(text))
    }
}
