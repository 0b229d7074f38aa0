//! The ordered identification sources tried after the disc has been inspected.

use async_trait::async_trait;
use tracing::{info, warn};

use super::disc::label_to_title;
use super::metadata::MetadataProvider;
use crate::ai::{AiAgent, DiscContext};
use crate::job::{Identification, Job};

/// One identification source. `None` means "no confident result", whatever
/// the reason.
#[async_trait]
pub trait IdentificationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn resolve(&self, job: &Job) -> Option<Identification>;
}

/// What to search providers for: the current title, else the cleaned label.
fn search_title(job: &Job) -> Option<String> {
    job.title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .or_else(|| job.label.as_deref().map(label_to_title))
        .filter(|t| !t.is_empty())
}

/// Title search against a metadata provider. Video discs only.
pub struct ProviderLookup {
    provider: Box<dyn MetadataProvider>,
    agent: Option<AiAgent>,
}

impl ProviderLookup {
    /// With an agent, multiple candidates are offered to it before falling
    /// back to the first one.
    pub fn new(provider: Box<dyn MetadataProvider>, agent: Option<AiAgent>) -> Self {
        Self { provider, agent }
    }
}

#[async_trait]
impl IdentificationStrategy for ProviderLookup {
    fn name(&self) -> &'static str {
        self.provider.name()
    }

    async fn resolve(&self, job: &Job) -> Option<Identification> {
        if !job.disctype.is_video() {
            return None;
        }
        let title = search_title(job)?;

        let mut candidates = match self.provider.search(&title, job.year.as_deref()).await {
            Ok(c) => c,
            Err(e) => {
                warn!(provider = self.provider.name(), error = %e, "Metadata lookup failed");
                return None;
            }
        };
        if candidates.is_empty() {
            info!(provider = self.provider.name(), title = %title, "No metadata match");
            return None;
        }

        let mut index = 0;
        if candidates.len() > 1 {
            if let Some(agent) = &self.agent {
                let label = job.label.as_deref().unwrap_or(&title);
                if let Some(pick) = agent.resolve_ambiguous(label, &candidates).await {
                    info!(pick = pick + 1, "AI picked metadata candidate");
                    index = pick;
                }
            }
        }
        Some(candidates.swap_remove(index))
    }
}

/// Maps the raw volume label to a clean title.
pub struct AiLabelParse {
    agent: AiAgent,
}

impl AiLabelParse {
    pub fn new(agent: AiAgent) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl IdentificationStrategy for AiLabelParse {
    fn name(&self) -> &'static str {
        "ai_label"
    }

    async fn resolve(&self, job: &Job) -> Option<Identification> {
        let label = job.label.as_deref().filter(|l| !l.trim().is_empty())?;
        let guess = self.agent.parse_disc_label(label, job.disctype).await?;
        let accepted = guess.accept(self.name());
        if accepted.is_none() {
            info!(label, "AI label parse below confidence threshold");
        }
        accepted
    }
}

/// Last resort when nothing produced a title at all.
pub struct AiContextGuess {
    agent: AiAgent,
}

impl AiContextGuess {
    pub fn new(agent: AiAgent) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl IdentificationStrategy for AiContextGuess {
    fn name(&self) -> &'static str {
        "ai_context"
    }

    async fn resolve(&self, job: &Job) -> Option<Identification> {
        if job.title.as_deref().is_some_and(|t| !t.trim().is_empty()) {
            return None;
        }
        let context = DiscContext {
            label: job.label.as_deref(),
            crc_id: job.crc_id.as_deref(),
            disctype: job.disctype,
            mountpoint: job.mountpoint.as_deref(),
        };
        let guess = self.agent.identify_unknown_disc(&context).await?;
        guess.accept(self.name())
    }
}

/// Providers in order, then the two AI sources when an agent is available.
pub fn default_strategies(
    providers: Vec<Box<dyn MetadataProvider>>,
    agent: Option<AiAgent>,
) -> Vec<Box<dyn IdentificationStrategy>> {
    let mut strategies: Vec<Box<dyn IdentificationStrategy>> = providers
        .into_iter()
        .map(|p| {
            Box::new(ProviderLookup::new(p, agent.clone())) as Box<dyn IdentificationStrategy>
        })
        .collect();
    if let Some(agent) = agent {
        strategies.push(Box::new(AiLabelParse::new(agent.clone())));
        strategies.push(Box::new(AiContextGuess::new(agent)));
    }
    strategies
}
