//! Disc identification and advisory calls built on a [`CompletionClient`].
//!
//! Every method returns `Option`: transport errors, empty replies and replies
//! that are not the expected JSON object are logged and become `None`.

use std::sync::Arc;

use serde::{Deserialize, Deserializer};
use tracing::{debug, info, warn};

use super::client::{ChatMessage, CompletionClient};
use super::prompt::{parse_json_reply, sanitize_for_prompt};
use crate::job::{DiscType, Identification};

/// AI proposals below this confidence are discarded. Inclusive.
pub const CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Candidates beyond this are not offered to the model.
const MAX_CANDIDATES: usize = 10;

pub fn is_confident(confidence: f64) -> bool {
    confidence >= CONFIDENCE_THRESHOLD
}

/// A title proposed by the model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TitleGuess {
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub year: Option<String>,
    #[serde(default, rename = "type")]
    pub video_type: Option<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: Option<String>,
}

impl TitleGuess {
    /// Converts an accepted guess. Returns `None` below the threshold or
    /// without a title.
    pub fn accept(self, source: &str) -> Option<Identification> {
        let title = self.title.trim();
        if title.is_empty() || !is_confident(self.confidence) {
            return None;
        }
        Some(Identification {
            title: title.to_string(),
            year: self.year.filter(|y| !y.trim().is_empty()),
            video_type: self
                .video_type
                .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case("unknown")),
            imdb_id: None,
            poster_url: None,
            source: source.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct CandidatePick {
    index: Option<usize>,
    #[serde(default)]
    confidence: f64,
}

/// Suggested transcoder settings. Recorded on the job, never applied.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TranscodeRecommendation {
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub args: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Diagnosis {
    #[serde(default)]
    pub cause: String,
    #[serde(default)]
    pub suggestion: Option<String>,
}

/// Context for a failed phase.
#[derive(Debug, Clone, Default)]
pub struct FailureContext<'a> {
    pub phase: &'a str,
    pub tool: Option<&'a str>,
    pub disctype: DiscType,
    pub title: Option<&'a str>,
}

/// Input for the contextual fallback when nothing else named the disc.
#[derive(Debug, Clone, Default)]
pub struct DiscContext<'a> {
    pub label: Option<&'a str>,
    pub crc_id: Option<&'a str>,
    pub disctype: DiscType,
    pub mountpoint: Option<&'a str>,
}

/// Accepts `"1979"`, `1979` or `null`.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

const JSON_ONLY: &str = "Respond ONLY with a single valid JSON object, no prose and no markdown formatting.";

#[derive(Clone)]
pub struct AiAgent {
    client: Arc<dyn CompletionClient>,
}

impl AiAgent {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    async fn ask(&self, purpose: &str, messages: Vec<ChatMessage>) -> Option<String> {
        match self.client.complete(&messages).await {
            Ok(reply) => {
                debug!(purpose, reply = %reply, "AI reply");
                Some(reply)
            }
            Err(e) => {
                warn!(purpose, error = %e, "AI completion failed");
                None
            }
        }
    }

    async fn ask_json<T: serde::de::DeserializeOwned>(
        &self,
        purpose: &str,
        messages: Vec<ChatMessage>,
    ) -> Option<T> {
        let reply = self.ask(purpose, messages).await?;
        let parsed = parse_json_reply(&reply);
        if parsed.is_none() {
            warn!(purpose, "AI reply was not the expected JSON object");
        }
        parsed
    }

    /// Maps a raw volume label (`STAR_WARS_EP_IV_DISC1`) to a clean title.
    pub async fn parse_disc_label(&self, label: &str, disctype: DiscType) -> Option<TitleGuess> {
        if label.trim().is_empty() {
            return None;
        }
        let messages = vec![
            ChatMessage::system(format!(
                "You are a media identification assistant. You parse disc labels from {} discs \
                 into clean movie or TV show titles. {}",
                disctype, JSON_ONLY
            )),
            ChatMessage::user(format!(
                "Parse this disc label into a proper title.\n\n\
                 Disc label: \"{}\"\nDisc type: {}\n\n\
                 Reply with a JSON object with these fields:\n\
                 - \"title\": the clean human-readable title\n\
                 - \"year\": the release year if known, otherwise an empty string\n\
                 - \"type\": \"movie\" or \"series\"\n\
                 - \"confidence\": a number from 0 to 1",
                sanitize_for_prompt(label),
                disctype
            )),
        ];
        let guess: TitleGuess = self.ask_json("parse_disc_label", messages).await?;
        info!(label, title = %guess.title, confidence = guess.confidence, "AI parsed disc label");
        Some(guess)
    }

    /// Best guess from whatever context is available. `None` without any context.
    pub async fn identify_unknown_disc(&self, context: &DiscContext<'_>) -> Option<TitleGuess> {
        let mut lines = Vec::new();
        if let Some(label) = context.label.filter(|l| !l.is_empty()) {
            lines.push(format!("Disc label: \"{}\"", sanitize_for_prompt(label)));
        }
        if let Some(crc) = context.crc_id.filter(|c| !c.is_empty()) {
            lines.push(format!("Fingerprint: {}", crc));
        }
        if context.disctype != DiscType::Unknown {
            lines.push(format!("Disc type: {}", context.disctype));
        }
        if let Some(mountpoint) = context.mountpoint.filter(|m| !m.is_empty()) {
            lines.push(format!("Mountpoint: {}", sanitize_for_prompt(mountpoint)));
        }
        if lines.is_empty() {
            return None;
        }

        let messages = vec![
            ChatMessage::system(format!(
                "You are a media identification assistant for optical discs (DVD, Blu-ray, CD). \
                 Use any available context to identify the disc content. {}",
                JSON_ONLY
            )),
            ChatMessage::user(format!(
                "I have a disc with the following information:\n\n{}\n\n\
                 Reply with a JSON object with:\n\
                 - \"title\": your best guess at the title\n\
                 - \"year\": release year if known, empty string otherwise\n\
                 - \"type\": \"movie\", \"series\" or \"unknown\"\n\
                 - \"confidence\": a number from 0 to 1\n\
                 - \"reasoning\": a brief explanation",
                lines.join("\n")
            )),
        ];
        self.ask_json("identify_unknown_disc", messages).await
    }

    /// Picks one of several provider candidates. Returns the chosen index
    /// only when the pick is confident.
    pub async fn resolve_ambiguous(
        &self,
        label: &str,
        candidates: &[Identification],
    ) -> Option<usize> {
        if candidates.len() < 2 {
            return None;
        }
        let offered = &candidates[..candidates.len().min(MAX_CANDIDATES)];
        let list: Vec<String> = offered
            .iter()
            .enumerate()
            .map(|(i, c)| {
                format!(
                    "{}. \"{}\" ({}) - {}",
                    i + 1,
                    sanitize_for_prompt(&c.title),
                    c.year.as_deref().unwrap_or("unknown year"),
                    c.video_type.as_deref().unwrap_or("unknown type")
                )
            })
            .collect();

        let messages = vec![
            ChatMessage::system(format!(
                "You are a media identification assistant. You match disc labels to the \
                 correct metadata result. {}",
                JSON_ONLY
            )),
            ChatMessage::user(format!(
                "A disc labeled \"{}\" returned these potential matches:\n\n{}\n\n\
                 Which number is the best match? Reply with a JSON object with:\n\
                 - \"index\": the 1-based index of the best match\n\
                 - \"confidence\": a number from 0 to 1",
                sanitize_for_prompt(label),
                list.join("\n")
            )),
        ];

        let pick: CandidatePick = self.ask_json("resolve_ambiguous", messages).await?;
        let index = pick.index?.checked_sub(1)?;
        if index >= offered.len() || !is_confident(pick.confidence) {
            return None;
        }
        Some(index)
    }

    /// Advisory transcoder settings for the main title.
    pub async fn recommend_transcode(
        &self,
        disctype: DiscType,
        resolution: Option<&str>,
        fps: Option<f64>,
        current_preset: &str,
    ) -> Option<TranscodeRecommendation> {
        let messages = vec![
            ChatMessage::system(format!(
                "You are a video transcoding assistant. You recommend HandBrake presets and \
                 arguments for ripped discs. {}",
                JSON_ONLY
            )),
            ChatMessage::user(format!(
                "Source: {} disc\nResolution: {}\nFrame rate: {}\nConfigured preset: {}\n\n\
                 Reply with a JSON object with:\n\
                 - \"preset\": the recommended HandBrake preset name\n\
                 - \"args\": extra command line arguments, or an empty string\n\
                 - \"reasoning\": a brief explanation",
                disctype,
                resolution.unwrap_or("unknown"),
                fps.filter(|f| *f > 0.0)
                    .map(|f| format!("{:.3}", f))
                    .unwrap_or_else(|| "unknown".to_string()),
                if current_preset.is_empty() {
                    "none"
                } else {
                    current_preset
                }
            )),
        ];
        self.ask_json("recommend_transcode", messages).await
    }

    /// Explains a phase failure for the operator.
    pub async fn diagnose_error(
        &self,
        error_log: &str,
        context: &FailureContext<'_>,
    ) -> Option<Diagnosis> {
        let error_log: String = sanitize_for_prompt(error_log).chars().take(2000).collect();
        let messages = vec![
            ChatMessage::system(format!(
                "You are a troubleshooting assistant for an automatic disc ripping machine \
                 using MakeMKV, HandBrake, FFmpeg and abcde. {}",
                JSON_ONLY
            )),
            ChatMessage::user(format!(
                "Phase: {}\nTool: {}\nDisc type: {}\nTitle: {}\n\nError:\n{}\n\n\
                 Reply with a JSON object with:\n\
                 - \"cause\": the most likely cause in one sentence\n\
                 - \"suggestion\": what the operator should try next",
                context.phase,
                context.tool.unwrap_or("unknown"),
                context.disctype,
                context
                    .title
                    .map(sanitize_for_prompt)
                    .unwrap_or_else(|| "unknown".to_string()),
                error_log
            )),
        ];
        let diagnosis: Diagnosis = self.ask_json("diagnose_error", messages).await?;
        if diagnosis.cause.trim().is_empty() {
            return None;
        }
        Some(diagnosis)
    }
}
