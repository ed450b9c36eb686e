use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Pipeline configuration, loaded from a JSON file with every field
/// optional; omitted fields take the built-in defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub canvas: CanvasConfig,
    pub generator: GeneratorConfig,
    pub feedback: FeedbackMessages,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub width: u32,
    pub height: u32,
    pub container_id: String,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            container_id: "sketch-container".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// External code-generation endpoint; only consulted when
    /// `remote_enabled` is set.
    pub endpoint: String,
    pub timeout_ms: u64,
    pub remote_enabled: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:3001/api/generate-sketch".to_string(),
            timeout_ms: 15_000,
            remote_enabled: false,
        }
    }
}

/// Message pools for spoken feedback. Pools rotate round-robin so repeat
/// commands do not repeat the same phrase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackMessages {
    pub confirmation: Vec<String>,
    pub error: Vec<String>,
    pub processing: Vec<String>,
}

impl Default for FeedbackMessages {
    fn default() -> Self {
        Self {
            confirmation: vec![
                "Your sketch has been created".to_string(),
                "Sketch generated successfully".to_string(),
                "Drawing completed".to_string(),
                "Perfect! Your artwork is ready".to_string(),
                "Great! I've created your sketch".to_string(),
            ],
            error: vec![
                "I couldn't understand that command".to_string(),
                "Please try a different description".to_string(),
                "Command not recognized".to_string(),
                "Sorry, could you try again?".to_string(),
                "I didn't catch that. Please repeat your command".to_string(),
            ],
            processing: vec![
                "Creating your sketch".to_string(),
                "Processing your request".to_string(),
                "Generating your drawing".to_string(),
                "Working on your drawing".to_string(),
                "Let me create that for you".to_string(),
            ],
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed reading config {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing config {}", path.display()))
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
