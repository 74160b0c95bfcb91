//! System prompt assembly and subject-domain detection.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use skipper_types::{Gender, SubjectDomain};

const TERMINAL_KEYWORDS: &[&str] = &[
    "מסוף", "אשראי", "terminal", "קופה", "חנות", "עסק", "לגבות", "תשלום", "סליקה", "מכשיר",
    "pos",
];

// "ים" only counts as a separate word.
const YACHT_KEYWORDS: &[&str] = &[
    "יאכטה", "שיט", "הפלגה", "yacht", "סירה", "שייט", "ים ", " ים",
];

/// Detects the business line a message is about. Terminals win when both
/// match.
pub fn detect_domain(text: &str) -> Option<SubjectDomain> {
    let lower = text.to_lowercase();
    if TERMINAL_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Some(SubjectDomain::Terminals)
    } else if YACHT_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Some(SubjectDomain::Yachts)
    } else {
        None
    }
}

pub fn retrieval_query(text: &str, domain: Option<SubjectDomain>) -> String {
    match domain {
        Some(d) => format!("{} (Domain: {})", text, d.label()),
        None => text.to_string(),
    }
}

/// Current wall-clock time in `zone`, `DD.MM.YYYY HH:MM`.
pub fn local_time(zone: Tz) -> String {
    format_local_time(Utc::now(), zone)
}

/// Formats `now` in `zone`, daylight saving included.
pub fn format_local_time(now: DateTime<Utc>, zone: Tz) -> String {
    now.with_timezone(&zone).format("%d.%m.%Y %H:%M").to_string()
}

#[derive(Debug, Clone, Default)]
pub struct PromptInputs<'a> {
    pub context: &'a str,
    pub gender: Option<Gender>,
    pub local_time: &'a str,
    pub caller_phone: Option<&'a str>,
}

pub fn build_system_prompt(inputs: &PromptInputs<'_>) -> String {
    let mut prompt = String::from(
        "You are the booking assistant of a yacht charter and payment terminal business. \
         Answer in the language the customer uses (Hebrew by default). \
         Keep sentences short and natural: replies may be read aloud on a phone call. \
         Use the available tools to check availability, send details and finalise bookings; \
         never invent free hours or prices. \
         If the customer's gender is unknown and you can tell it from how they speak, \
         append [GENDER: male] or [GENDER: female] once at the end of your reply.",
    );

    prompt.push_str(&format!("\n\nCurrent local time: {}.", inputs.local_time));
    if let Some(phone) = inputs.caller_phone.filter(|p| !p.is_empty()) {
        prompt.push_str(&format!("\nCustomer phone number: {}.", phone));
    }
    if let Some(gender) = inputs.gender {
        prompt.push_str(&format!(
            "\nThe customer is {}; use matching grammatical forms.",
            gender.as_str()
        ));
    }
    if !inputs.context.trim().is_empty() {
        prompt.push_str("\n\nReference information:\n");
        prompt.push_str(inputs.context);
    }
    prompt
}
