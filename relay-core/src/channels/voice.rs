//! Telephony voice webhooks and the spoken-markup (TwiML) they answer with.

use std::collections::HashMap;

use super::{escape_xml, required_field};
use crate::error::RelayError;
use crate::models::VoiceEvent;

pub fn parse_voice_form(form: &HashMap<String, String>) -> Result<VoiceEvent, RelayError> {
    let (Some(from), Some(to)) = (required_field(form, "From"), required_field(form, "To")) else {
        return Err(RelayError::Parse("Missing fields".to_string()));
    };
    Ok(VoiceEvent {
        from: from.to_string(),
        to: to.to_string(),
        speech_result: form.get("SpeechResult").cloned(),
    })
}

/// Listen instruction parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatherSpec {
    pub action: String,
    pub language: String,
    pub pause_seconds: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Verb {
    Say { voice: Option<String>, text: String },
    Gather(GatherSpec),
    Hangup,
}

/// Builder for a `<Response>` document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceMarkup {
    verbs: Vec<Verb>,
}

impl VoiceMarkup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn say(mut self, voice: Option<&str>, text: &str) -> Self {
        self.verbs.push(Verb::Say {
            voice: voice.map(str::to_string),
            text: text.to_string(),
        });
        self
    }

    pub fn gather(mut self, spec: GatherSpec) -> Self {
        self.verbs.push(Verb::Gather(spec));
        self
    }

    pub fn hangup(mut self) -> Self {
        self.verbs.push(Verb::Hangup);
        self
    }

    /// One utterance, then end the call.
    pub fn terminal(voice: Option<&str>, text: &str) -> Self {
        Self::new().say(voice, text).hangup()
    }

    pub fn render(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>");
        for verb in &self.verbs {
            match verb {
                Verb::Say { voice: Some(voice), text } => xml.push_str(&format!(
                    "<Say voice=\"{}\">{}</Say>",
                    escape_xml(voice),
                    escape_xml(text)
                )),
                Verb::Say { voice: None, text } => {
                    xml.push_str(&format!("<Say>{}</Say>", escape_xml(text)))
                }
                Verb::Gather(spec) => xml.push_str(&format!(
                    "<Gather input=\"speech\" action=\"{}\" method=\"POST\" speechTimeout=\"auto\" language=\"{}\"><Pause length=\"{}\"/></Gather>",
                    escape_xml(&spec.action),
                    escape_xml(&spec.language),
                    spec.pause_seconds
                )),
                Verb::Hangup => xml.push_str("<Hangup/>"),
            }
        }
        xml.push_str("</Response>");
        xml
    }
}
