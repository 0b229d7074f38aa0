//! AI completion service: disc label parsing, contextual identification and
//! advisory calls (transcode recommendation, error diagnosis).

pub mod agent;
pub mod client;
pub mod prompt;

pub use agent::{
    is_confident, AiAgent, DiscContext, Diagnosis, FailureContext, TitleGuess,
    TranscodeRecommendation, CONFIDENCE_THRESHOLD,
};
pub use client::{ChatMessage, CompletionClient, HttpCompletionClient};
