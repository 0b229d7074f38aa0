//! Disc identification: mount, classify, then resolve a title through an
//! ordered list of sources.
//!
//! Only mounting can fail the job. Every later step degrades to "no result"
//! and the next source is tried while the job has no confident title.

pub mod disc;
pub mod metadata;
pub mod mount;
pub mod music;
pub mod strategy;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, info_span, warn, Instrument};

use crate::error::MountError;
use crate::job::{DiscType, Job, Track};
use crate::tools::music::{discid_command, DiscToc};
use crate::tools::ToolInvoker;

pub use metadata::{configured_providers, MetadataProvider, Omdb, Tmdb};
pub use mount::Mounter;
pub use music::{Album, AlbumLookup, MusicBrainz};
pub use strategy::{default_strategies, IdentificationStrategy};

pub struct IdentificationResolver {
    mounter: Mounter,
    invoker: ToolInvoker,
    strategies: Vec<Box<dyn IdentificationStrategy>>,
    albums: Option<Arc<dyn AlbumLookup>>,
}

impl IdentificationResolver {
    pub fn new(mounter: Mounter, invoker: ToolInvoker) -> Self {
        Self {
            mounter,
            invoker,
            strategies: Vec::new(),
            albums: None,
        }
    }

    pub fn with_strategies(mut self, strategies: Vec<Box<dyn IdentificationStrategy>>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn with_album_lookup(mut self, albums: Arc<dyn AlbumLookup>) -> Self {
        self.albums = Some(albums);
        self
    }

    /// Mounts the disc and fills in disc type, label, fingerprint and, for
    /// non-music discs, the best title the strategies can find.
    pub async fn identify(&self, job: &mut Job) -> Result<PathBuf, MountError> {
        let mountpoint = self.mounter.ensure_mounted(&job.devpath).await?;
        job.mountpoint = Some(mountpoint.to_string_lossy().into_owned());
        job.disctype = disc::detect_disc_type(&mountpoint);
        info!(disctype = %job.disctype, "Detected disc type");

        match job.disctype {
            DiscType::Bluray => {
                job.protection = disc::has_aacs(&mountpoint);
                match disc::bluray_title(&mountpoint) {
                    Ok(Some(name)) => {
                        job.label = Some(name.clone());
                        job.set_structural_title(&name);
                    }
                    Ok(None) => debug!("Blu-ray has no disc library metadata"),
                    Err(e) => warn!(error = %e, "Could not read Blu-ray title"),
                }
            }
            DiscType::Dvd | DiscType::Data => {
                if let Some(label) = disc::volume_label(&self.invoker, &job.devpath).await {
                    if job.disctype == DiscType::Dvd {
                        job.set_structural_title(&disc::label_to_title(&label));
                    }
                    job.label = Some(label);
                }
            }
            DiscType::Music | DiscType::Unknown => {}
        }

        if matches!(
            job.disctype,
            DiscType::Bluray | DiscType::Dvd | DiscType::Data
        ) {
            match disc::tree_fingerprint(&mountpoint) {
                Ok(crc) => job.crc_id = Some(crc),
                Err(e) => warn!(error = %e, "Could not fingerprint disc"),
            }
        }

        if !matches!(job.disctype, DiscType::Music | DiscType::Unknown) {
            self.resolve_title(job).await;
        }

        Ok(mountpoint)
    }

    /// Runs the strategies in order until one produces a confident title.
    pub async fn resolve_title(&self, job: &mut Job) {
        for strategy in &self.strategies {
            if job.has_nice_title() {
                break;
            }
            let span = info_span!("identify", source = strategy.name());
            if let Some(ident) = strategy.resolve(job).instrument(span).await {
                info!(
                    source = strategy.name(),
                    title = %ident.title,
                    year = ident.year.as_deref().unwrap_or(""),
                    "Identified disc"
                );
                job.apply_identification(&ident);
            }
        }
        if !job.has_nice_title() {
            info!(title = job.title.as_deref().unwrap_or(""), "No confident identification");
        }
    }

    /// Reads the TOC, sets the fingerprint and looks the album up. Returns
    /// one track per disc track on a match, nothing otherwise.
    pub async fn resolve_music(&self, job: &mut Job) -> Vec<Track> {
        let Some(output) = self.invoker.run_lenient(&discid_command(&job.devpath)).await else {
            return Vec::new();
        };
        let Some(toc) = DiscToc::parse(&output.stdout) else {
            warn!(output = %output.stdout.trim(), "Unrecognised disc TOC");
            return Vec::new();
        };
        job.crc_id = Some(toc.fingerprint());

        let Some(albums) = &self.albums else {
            return Vec::new();
        };
        match albums.lookup(&toc).await {
            Ok(Some(album)) => {
                job.apply_identification(&album.identification());
                album.to_tracks(job.job_id, &toc)
            }
            Ok(None) => {
                info!(tracks = toc.track_count(), "No MusicBrainz release for disc");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "MusicBrainz lookup failed");
                Vec::new()
            }
        }
    }
}
