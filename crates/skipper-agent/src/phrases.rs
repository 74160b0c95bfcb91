//! Fixed lines spoken on calls or sent as messages.

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Phrases {
    pub greeting: String,
    /// Said when generation or a tool batch fails.
    pub apology: String,
    pub transferring: String,
    pub operator_unavailable: String,
    /// Nudge on the second and third silent reprompt.
    pub still_here: String,
    /// Said before hanging up on a silent caller.
    pub closing: String,
    /// Acknowledges a WhatsApp attachment.
    pub media_received: String,
}

impl Default for Phrases {
    fn default() -> Self {
        Self {
            greeting: "שלום, הגעתם ללידר הפלגות. במה אוכל לעזור?".to_string(),
            apology: "סליחה, הייתה תקלה קטנה. אפשר לחזור על זה?".to_string(),
            transferring: "אני מעבירה אותך לנציג, רגע אחד.".to_string(),
            operator_unavailable: "מצטערת, הנציג אינו זמין כרגע. איך אוכל לעזור לך בנושא אחר?"
                .to_string(),
            still_here: "אני עדיין כאן. קיבלת את ההודעה? יש עוד משהו שאוכל לעזור בו?"
                .to_string(),
            closing: "תודה, נתראה!".to_string(),
            media_received: "קיבלתי את הקובץ, תודה! אני מעבירה לאישור.".to_string(),
        }
    }
}
