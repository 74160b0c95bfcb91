//! Telephony surface for the Skipper booking assistant.
//!
//! Renders call-control markup (TwiML) for the voice and messaging webhooks,
//! selects a synthesis voice from the language of the text being spoken, and
//! talks to the Twilio REST API for the two out-of-band actions the
//! assistant needs: redirecting a live call (to interrupt hold music) and
//! sending WhatsApp/SMS messages.
//!
//! The REST operations sit behind the [`CallControl`] and [`MessageSender`]
//! traits so the call controller and the tool layer can be exercised without
//! a telephony account.

pub mod config;
pub mod error;
pub mod twilio;
pub mod twiml;

pub use config::{TelephonyConfig, VoiceProfile, VoiceSettings};
pub use error::VoiceError;
pub use twilio::{strip_whatsapp_prefix, CallControl, MessageSender, TwilioClient};
pub use twiml::{escape_xml, Gather, TwimlBuilder};
