use serde::{Deserialize, Serialize};

/// One step of a speech transcription stream.
///
/// Interim text accumulates while the user is still talking; only a
/// final, non-empty utterance is worth dispatching to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Transcription {
    pub final_text: String,
    pub interim_text: String,
    pub is_final: bool,
}

impl Transcription {
    pub fn final_utterance(text: impl Into<String>) -> Self {
        Self {
            final_text: text.into(),
            interim_text: String::new(),
            is_final: true,
        }
    }

    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            final_text: String::new(),
            interim_text: text.into(),
            is_final: false,
        }
    }

    pub fn should_dispatch(&self) -> bool {
        self.is_final && !self.final_text.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::Transcription;

    #[test]
    fn only_final_nonempty_utterances_dispatch() {
        assert!(Transcription::final_utterance("draw a circle").should_dispatch());
        assert!(!Transcription::final_utterance("   ").should_dispatch());
        assert!(!Transcription::interim("draw a ci").should_dispatch());
    }

    #[test]
    fn serde_uses_camel_case_field_names() -> anyhow::Result<()> {
        let json = serde_json::to_string(&Transcription::final_utterance("hi"))?;
        assert!(json.contains("\"finalText\""));
        assert!(json.contains("\"isFinal\""));
        Ok(())
    }
}
