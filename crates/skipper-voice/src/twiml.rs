//! Call-control markup (TwiML) rendering.
//!
//! Every telephony webhook answers with one of these documents. The builder
//! only knows the handful of verbs the assistant uses; attribute values and
//! text bodies are XML-escaped on the way in.

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Speech-input parameters for a `<Gather>` verb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gather {
    /// Webhook the transcript is posted to.
    pub action: String,
    /// Recognition language tag, e.g. `he-IL`.
    pub language: String,
}

impl Gather {
    pub fn speech(action: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            language: language.into(),
        }
    }
}

/// Builder for a `<Response>` document.
#[derive(Debug, Clone, Default)]
pub struct TwimlBuilder {
    verbs: Vec<String>,
}

impl TwimlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Speaks `text` with the given synthesis voice.
    pub fn say(mut self, voice: &str, text: &str) -> Self {
        self.verbs.push(format!(
            r#"<Say voice="{}">{}</Say>"#,
            escape_xml(voice),
            escape_xml(text)
        ));
        self
    }

    /// Plays the audio at `url`, repeating it `loops` times.
    pub fn play(mut self, url: &str, loops: u32) -> Self {
        self.verbs.push(format!(
            r#"<Play loop="{}">{}</Play>"#,
            loops,
            escape_xml(url)
        ));
        self
    }

    pub fn pause(mut self, seconds: u32) -> Self {
        self.verbs.push(format!(r#"<Pause length="{}"/>"#, seconds));
        self
    }

    /// Listens for speech and posts the transcript to the gather action.
    pub fn gather(mut self, gather: &Gather) -> Self {
        self.verbs.push(format!(
            r#"<Gather input="speech" action="{}" method="POST" speechTimeout="auto" language="{}"/>"#,
            escape_xml(&gather.action),
            escape_xml(&gather.language)
        ));
        self
    }

    pub fn redirect(mut self, url: &str) -> Self {
        self.verbs.push(format!(
            r#"<Redirect method="POST">{}</Redirect>"#,
            escape_xml(url)
        ));
        self
    }

    /// Dials `number`, ringing for at most `timeout_secs`, and reports the
    /// leg outcome to `action`.
    pub fn dial(mut self, number: &str, timeout_secs: u32, action: &str) -> Self {
        self.verbs.push(format!(
            r#"<Dial timeout="{}" action="{}" method="POST">{}</Dial>"#,
            timeout_secs,
            escape_xml(action),
            escape_xml(number)
        ));
        self
    }

    pub fn hangup(mut self) -> Self {
        self.verbs.push("<Hangup/>".to_string());
        self
    }

    /// Adds a reply text message (messaging webhooks only).
    pub fn message(mut self, text: &str) -> Self {
        self.verbs
            .push(format!("<Message>{}</Message>", escape_xml(text)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.verbs.is_empty()
    }

    pub fn build(&self) -> String {
        let mut out = String::with_capacity(
            XML_HEADER.len() + 21 + self.verbs.iter().map(String::len).sum::<usize>(),
        );
        out.push_str(XML_HEADER);
        out.push_str("<Response>");
        for verb in &self.verbs {
            out.push_str(verb);
        }
        out.push_str("</Response>");
        out
    }
}

/// Escapes the five XML special characters.
pub fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
