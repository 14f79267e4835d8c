//! User-facing messages in the supported languages.

use serde::{Deserialize, Serialize};

/// Sentinel short answer used whenever no grounded answer exists.
pub const UNKNOWN_ANSWER: &str = "Unknown";

/// Language used for abstention and error messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Hi,
    Hinglish,
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Language::En),
            "hi" | "hindi" => Ok(Language::Hi),
            "hinglish" => Ok(Language::Hinglish),
            other => Err(format!("unsupported language '{other}' (expected en, hi or hinglish)")),
        }
    }
}

/// Fixed messages shown to end users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// No evidence was retrieved for the question.
    Abstention,
    /// Evidence was retrieved but did not contain the answer.
    NotClearlyMentioned,
    /// The generation backend failed.
    TryAgain,
    /// The service is misconfigured.
    NotConfigured,
    /// Any other failure.
    GeneralError,
}

impl Message {
    pub fn text(self, language: Language) -> &'static str {
        use Language::*;
        use Message::*;
        match (self, language) {
            (Abstention, En) => {
                "I don't have that information in the stories I know. \
                 Try asking about something from the chess tales!"
            }
            (Abstention, Hi) => "यह जानकारी मेरी कहानियों में नहीं है। शतरंज की कहानियों के बारे में पूछो!",
            (Abstention, Hinglish) => {
                "Iska jawab abhi story mein nahi aaya hai. Chess stories ke baare mein pucho!"
            }
            (NotClearlyMentioned, En) => "The stories don't clearly mention this.",
            (NotClearlyMentioned, Hi) => "कहानी में इसका साफ़ ज़िक्र नहीं है।",
            (NotClearlyMentioned, Hinglish) => "Iska clear mention story mein nahi mila.",
            (TryAgain, En) => "Oops! Chess Buddy is thinking too hard right now. Please try again.",
            (TryAgain, Hi) => "कुछ गड़बड़ हो गई। फिर से कोशिश करें।",
            (TryAgain, Hinglish) => "Chess Buddy thoda confuse ho gaya, phir se try karo!",
            (NotConfigured, En) => "The AI service is not configured. Please check the API key.",
            (NotConfigured, Hi) => "AI सेवा कॉन्फ़िगर नहीं है। कृपया API key जांचें।",
            (NotConfigured, Hinglish) => "AI service configure nahi hai. API key check karo.",
            (GeneralError, En) => "Something went wrong. Please try again.",
            (GeneralError, Hi) => "कुछ गड़बड़ हो गई। फिर से कोशिश करें।",
            (GeneralError, Hinglish) => "Kuch gadbad ho gayi. Phir se try karo.",
        }
    }
}

/// Explanation built from a quoted evidence sentence.
pub fn proof_explanation(language: Language, proof: &str, answer: &str) -> String {
    match language {
        Language::En => format!("Remember when the story said:\n\"{proof}\"\n\nSo the answer is {answer}."),
        Language::Hi => format!("याद है, कहानी में कहा गया था:\n\"{proof}\"\n\nइसलिए जवाब है {answer}।"),
        Language::Hinglish => {
            format!("Yaad hai jab story mein kaha gaya:\n\"{proof}\"\n\nIsliye is sawal ka jawab {answer} hai.")
        }
    }
}
