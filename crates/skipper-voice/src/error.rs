use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Twilio API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}
