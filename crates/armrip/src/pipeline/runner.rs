use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::ai::{AiAgent, FailureContext};
use crate::config::Config;
use crate::db::{job_repo, track_repo, Database};
use crate::error::ArmError;
use crate::identify::{
    configured_providers, default_strategies, IdentificationResolver, Mounter, MusicBrainz,
};
use crate::job::{DiscType, Job, JobEvent, JobStatus};
use crate::notify::{completion_message, EmbyRefresh, NotificationDispatcher};
use crate::sanitize::redact_path;
use crate::storage::relocate::ensure_directory;
use crate::storage::{
    copy_tree, data_dir, job_dir_name, library_dir, relocate_dir, remove_dir_if_exists,
    resolve_conflict, set_permissions, work_dir, DestinationLock, MainFeatureRename,
};
use crate::tools::makemkv::{
    backup_command, info_command, mkv_all_command, mkv_title_command, parse_disc_info,
};
use crate::tools::music::abcde_command;
use crate::tools::transcode::select_transcoder;
use crate::tools::ToolInvoker;

use super::context::PipelineContext;
use super::error::{PipelineError, PipelineWarning};
use super::plan::{extraction_mode, plan_transcodes, rip_with_mkv, ExtractionMode, PlanInput};

pub struct Pipeline {
    config: Arc<Config>,
    db: Database,
    invoker: ToolInvoker,
    resolver: IdentificationResolver,
    notifier: NotificationDispatcher,
    ai: Option<AiAgent>,
    emby: Option<EmbyRefresh>,
}

impl Pipeline {
    /// Production constructor: system tools, configured providers and channels.
    pub fn from_config(
        config: Arc<Config>,
        db: Database,
        ai: Option<AiAgent>,
    ) -> Result<Self, ArmError> {
        let invoker = ToolInvoker::system();
        let strategies = default_strategies(configured_providers(&config)?, ai.clone());
        let resolver = IdentificationResolver::new(Mounter::new(invoker.clone()), invoker.clone())
            .with_strategies(strategies)
            .with_album_lookup(Arc::new(MusicBrainz::new()?));
        let notifier = NotificationDispatcher::from_config(db.clone(), &config)?;
        let emby = EmbyRefresh::from_config(&config).transpose()?;

        info!(
            channels = ?notifier.channel_names(),
            ai = ai.is_some(),
            emby = emby.is_some(),
            "Pipeline ready"
        );

        let mut pipeline = Self::new(config, db, invoker, resolver, notifier);
        pipeline.ai = ai;
        pipeline.emby = emby;
        Ok(pipeline)
    }

    /// Inject specific sub-components.
    pub fn new(
        config: Arc<Config>,
        db: Database,
        invoker: ToolInvoker,
        resolver: IdentificationResolver,
        notifier: NotificationDispatcher,
    ) -> Self {
        Self {
            config,
            db,
            invoker,
            resolver,
            notifier,
            ai: None,
            emby: None,
        }
    }

    pub fn with_ai(mut self, agent: AiAgent) -> Self {
        self.ai = Some(agent);
        self
    }

    pub fn with_emby(mut self, emby: EmbyRefresh) -> Self {
        self.emby = Some(emby);
        self
    }

    /// Drives one persisted, `active` job to a terminal status. The
    /// notification step runs whatever the outcome.
    pub async fn run(&self, job: Job) -> PipelineContext {
        let mut ctx = PipelineContext::new(job);
        let span = info_span!("pipeline",
            job_id = ctx.job.job_id,
            devpath = %ctx.job.devpath,
        );

        async {
            if let Err(e) = self.execute(&mut ctx).await {
                self.handle_failure(&mut ctx, &e).await;
            }
            self.finish(&mut ctx).await;
        }
        .instrument(span)
        .await;

        ctx
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        // Step 1: Mount and identify
        let mountpoint = self
            .step_identify(ctx)
            .instrument(info_span!("identify_disc"))
            .await?;

        // Step 2: Dedupe lookup, informational only
        self.step_check_duplicate(ctx);

        // Step 3: Per disc type
        match ctx.job.disctype {
            DiscType::Bluray | DiscType::Dvd => {
                self.run_video(ctx).instrument(info_span!("video")).await
            }
            DiscType::Music => self.run_music(ctx).instrument(info_span!("music")).await,
            DiscType::Data => {
                self.run_data(ctx, &mountpoint)
                    .instrument(info_span!("data"))
                    .await
            }
            DiscType::Unknown => Err(PipelineError::UnknownDiscType),
        }
    }

    async fn step_identify(&self, ctx: &mut PipelineContext) -> Result<PathBuf, PipelineError> {
        let mountpoint = self.resolver.identify(&mut ctx.job).await?;
        job_repo::update(&self.db, &ctx.job)?;
        info!(
            disctype = %ctx.job.disctype,
            title = ctx.job.title.as_deref().unwrap_or(""),
            hasnicetitle = ctx.job.has_nice_title(),
            "Identification finished"
        );
        Ok(mountpoint)
    }

    fn step_check_duplicate(&self, ctx: &PipelineContext) {
        let Some(crc) = ctx.job.crc_id.as_deref() else {
            return;
        };
        match job_repo::find_successful_duplicate(&self.db, crc, ctx.job.job_id) {
            Ok(Some(previous)) => info!(
                previous_job = previous.job_id,
                title = previous.title.as_deref().unwrap_or(""),
                "Disc was ripped successfully before"
            ),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Dedupe lookup failed"),
        }
    }

    async fn run_video(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let raw_dir = work_dir(&self.config.raw_path, &ctx.job);
        let transcode_dir = work_dir(&self.config.transcode_path, &ctx.job);
        let library = library_dir(&self.config.completed_path, &ctx.job);
        ctx.raw_dir = Some(raw_dir.clone());
        ctx.transcode_dir = Some(transcode_dir.clone());
        ctx.library_dir = Some(library.clone());

        let mode = extraction_mode(&ctx.job, &self.config);
        info!(
            ripmethod = self.config.ripmethod.as_str(),
            protection = ctx.job.protection,
            rip_with_mkv = rip_with_mkv(&ctx.job, &self.config),
            mode = ?mode,
            "Selected extraction"
        );

        self.set_status(ctx, JobEvent::BeginRip)?;

        self.step_discover_tracks(ctx)
            .instrument(info_span!("discover_tracks"))
            .await?;

        if let Some(mode) = mode {
            self.step_extract(ctx, mode, &raw_dir)
                .instrument(info_span!("extract"))
                .await?;
        }

        let (source_dir, main_stem) = if self.config.skip_transcode {
            info!("Transcoding skipped by configuration");
            let stem = ctx
                .main_feature()
                .and_then(|t| t.filename.as_deref())
                .and_then(|f| Path::new(f).file_stem())
                .map(|s| s.to_string_lossy().into_owned());
            (raw_dir.clone(), stem)
        } else {
            self.set_status(ctx, JobEvent::BeginTranscode)?;
            let main_stem = self
                .step_transcode(ctx, mode, &raw_dir, &transcode_dir)
                .instrument(info_span!("transcode"))
                .await?;
            (transcode_dir, main_stem)
        };

        self.step_relocate(ctx, &source_dir, &library, main_stem)
            .instrument(info_span!("relocate"))
            .await;
        self.step_refresh_library(ctx).await;
        self.step_permissions(ctx, &library);

        if !self.config.skip_transcode && mode.is_some() {
            if let Err(e) = remove_dir_if_exists(&raw_dir) {
                warn!(error = %e, "Could not delete raw extraction directory");
                ctx.warnings.push(PipelineWarning::Cleanup {
                    error: e.to_string(),
                });
            }
        }

        self.set_status(ctx, JobEvent::Complete)
    }

    /// Scans titles with `makemkvcon info`. A failed scan leaves the job
    /// without tracks; transcoding then falls back to the main feature.
    async fn step_discover_tracks(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let Some(output) = self.invoker.run_lenient(&info_command(&ctx.job.devpath)).await else {
            return Ok(());
        };

        let info = parse_disc_info(&output.stdout);
        ctx.job.no_of_titles = info.title_count.or(Some(info.titles.len() as u32));
        ctx.tracks = info.to_tracks(ctx.job.job_id, self.config.minlength, self.config.maxlength);
        ctx.main_resolution = ctx
            .main_feature()
            .and_then(|t| info.titles.get(&t.track_number))
            .and_then(|t| match (t.width, t.height) {
                (Some(w), Some(h)) => Some(format!("{}x{}", w, h)),
                _ => None,
            });

        for track in ctx.tracks.iter_mut() {
            track.track_id = track_repo::insert(&self.db, track)?;
        }
        job_repo::update(&self.db, &ctx.job)?;

        info!(
            titles = ctx.tracks.len(),
            processable = ctx.tracks.iter().filter(|t| t.process).count(),
            main_resolution = ctx.main_resolution.as_deref().unwrap_or(""),
            "Scanned disc titles"
        );
        Ok(())
    }

    async fn step_extract(
        &self,
        ctx: &mut PipelineContext,
        mode: ExtractionMode,
        raw_dir: &Path,
    ) -> Result<(), PipelineError> {
        ensure_directory(raw_dir).map_err(|e| PipelineError::WorkDir {
            path: raw_dir.to_path_buf(),
            source: e,
        })?;

        let devpath = ctx.job.devpath.as_str();
        let command = match mode {
            ExtractionMode::Backup => backup_command(devpath, raw_dir),
            ExtractionMode::Mkv => match ctx.main_feature() {
                Some(main) if self.config.mainfeature => {
                    mkv_title_command(devpath, main.track_number, raw_dir)
                }
                _ => mkv_all_command(devpath, raw_dir, self.config.minlength),
            },
        };

        info!(command = %command, "Starting extraction");
        self.invoker
            .run_strict(&command)
            .await
            .map_err(PipelineError::Extraction)?;

        if mode == ExtractionMode::Mkv {
            for track in ctx.tracks.iter_mut() {
                let on_disk = track
                    .filename
                    .as_deref()
                    .is_some_and(|f| raw_dir.join(f).is_file());
                if on_disk {
                    track.ripped = true;
                    if let Err(e) = track_repo::update(&self.db, track) {
                        warn!(error = %e, track = track.track_number, "Failed to mark track ripped");
                    }
                }
            }
        }
        info!(dir = %redact_path(raw_dir), "Extraction finished");
        Ok(())
    }

    /// Transcodes everything the plan lists, up to the configured number at
    /// once. Returns the output stem of the main feature.
    async fn step_transcode(
        &self,
        ctx: &mut PipelineContext,
        mode: Option<ExtractionMode>,
        raw_dir: &Path,
        transcode_dir: &Path,
    ) -> Result<Option<String>, PipelineError> {
        let settings = self.config.transcode_settings(ctx.job.disctype);

        if let Some(agent) = &self.ai {
            let fps = ctx.main_feature().map(|t| t.fps);
            if let Some(advice) = agent
                .recommend_transcode(
                    ctx.job.disctype,
                    ctx.main_resolution.as_deref(),
                    fps,
                    &settings.preset,
                )
                .await
            {
                info!(
                    preset = advice.preset.as_deref().unwrap_or(""),
                    args = advice.args.as_deref().unwrap_or(""),
                    reasoning = advice.reasoning.as_deref().unwrap_or(""),
                    "AI transcode suggestion"
                );
                ctx.advisory.transcode = Some(advice);
            }
        }

        ensure_directory(transcode_dir).map_err(|e| PipelineError::WorkDir {
            path: transcode_dir.to_path_buf(),
            source: e,
        })?;

        let name = job_dir_name(&ctx.job);
        let plan = plan_transcodes(&PlanInput {
            mode,
            raw_dir,
            devpath: &ctx.job.devpath,
            out_dir: transcode_dir,
            name: &name,
            ext: &settings.ext,
            tracks: &ctx.tracks,
            mainfeature: self.config.mainfeature,
        })?;

        let transcoder = select_transcoder(self.config.use_ffmpeg, &settings);
        let limit = self.config.max_concurrent_transcodes.clamp(1, num_cpus::get());
        let total = plan.requests.len();
        info!(
            transcoder = transcoder.name(),
            files = total,
            concurrency = limit,
            "Starting transcode"
        );

        let transcoder = transcoder.as_ref();
        let invoker = &self.invoker;
        let results: Vec<_> = stream::iter(plan.requests.iter().cloned())
            .map(|request| async move {
                let command = transcoder.build_command(&request);
                debug!(command = %command, "Transcoding");
                let result = invoker.run_strict(&command).await;
                (request, result)
            })
            .buffer_unordered(limit)
            .collect()
            .await;

        let failures: Vec<String> = results
            .into_iter()
            .filter_map(|(request, result)| match result {
                Ok(_) => {
                    info!(output = %redact_path(&request.output), "Transcoded");
                    None
                }
                Err(e) => {
                    warn!(output = %redact_path(&request.output), error = %e, "Transcode failed");
                    let file = request
                        .output
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    Some(format!("{}: {}", file, e))
                }
            })
            .collect();

        if !failures.is_empty() {
            return Err(PipelineError::Transcode {
                failed: failures.len(),
                total,
                details: failures.join("; "),
            });
        }
        Ok(plan.main_stem)
    }

    /// Moves the finished files into the library. Nothing here fails the job.
    async fn step_relocate(
        &self,
        ctx: &mut PipelineContext,
        source_dir: &Path,
        library: &Path,
        main_stem: Option<String>,
    ) {
        let timeout = Duration::from_secs(self.config.lock_timeout);
        let _lock = match DestinationLock::acquire(library, timeout).await {
            Ok(lock) => lock,
            Err(e) => {
                warn!(error = %e, "Could not lock library directory, leaving files in place");
                ctx.warnings.push(PipelineWarning::Relocation {
                    error: e.to_string(),
                });
                return;
            }
        };

        let rename = main_stem.map(|source_stem| MainFeatureRename {
            source_stem,
            target_stem: job_dir_name(&ctx.job),
        });

        let report = match relocate_dir(source_dir, library, rename.as_ref()) {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Relocation failed");
                ctx.warnings.push(PipelineWarning::Relocation {
                    error: e.to_string(),
                });
                return;
            }
        };

        for (path, error) in report.skipped {
            ctx.warnings
                .push(PipelineWarning::RelocationSkipped { path, error });
        }

        if let Some((original, renamed)) = report.renamed {
            if let Some(track) = ctx.tracks.iter_mut().find(|t| t.main_feature) {
                track.record_rename(&original, &renamed);
                if let Err(e) = track_repo::update(&self.db, track) {
                    warn!(error = %e, "Failed to record main feature rename");
                    ctx.warnings.push(PipelineWarning::Persistence {
                        error: e.to_string(),
                    });
                }
            }
        }

        ctx.job.path = Some(library.to_string_lossy().into_owned());
        info!(
            moved = report.moved.len(),
            dir = %redact_path(library),
            "Relocated into library"
        );
    }

    async fn step_refresh_library(&self, ctx: &mut PipelineContext) {
        let Some(emby) = &self.emby else {
            return;
        };
        if let Err(e) = emby.refresh().await {
            warn!(error = %e, "Library refresh failed");
            ctx.warnings.push(PipelineWarning::LibraryRefresh {
                error: e.to_string(),
            });
        }
    }

    fn step_permissions(&self, ctx: &mut PipelineContext, root: &Path) {
        match set_permissions(root) {
            Ok(count) => debug!(entries = count, "Normalised permissions"),
            Err(e) => {
                warn!(error = %e, "Could not normalise permissions");
                ctx.warnings.push(PipelineWarning::Permissions {
                    error: e.to_string(),
                });
            }
        }
    }

    async fn run_music(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        self.set_status(ctx, JobEvent::BeginRip)?;

        ctx.tracks = self.resolver.resolve_music(&mut ctx.job).await;
        job_repo::update(&self.db, &ctx.job)?;
        for track in ctx.tracks.iter_mut() {
            track.track_id = track_repo::insert(&self.db, track)?;
        }

        let command = abcde_command(&ctx.job.devpath);
        info!(command = %command, tracks = ctx.tracks.len(), "Ripping audio CD");
        self.invoker
            .run_strict(&command)
            .await
            .map_err(PipelineError::MusicRip)?;

        self.set_status(ctx, JobEvent::Complete)
    }

    async fn run_data(
        &self,
        ctx: &mut PipelineContext,
        mountpoint: &Path,
    ) -> Result<(), PipelineError> {
        self.set_status(ctx, JobEvent::BeginRip)?;

        let wanted = data_dir(&self.config.completed_path, &ctx.job);
        let target = match wanted.file_name() {
            Some(name) => {
                resolve_conflict(&self.config.completed_path, &name.to_string_lossy())
                    .map_err(PipelineError::DataCopy)?
            }
            None => wanted,
        };

        let copied = copy_tree(mountpoint, &target).map_err(PipelineError::DataCopy)?;
        info!(files = copied, dir = %redact_path(&target), "Copied data disc");

        ctx.job.path = Some(target.to_string_lossy().into_owned());
        ctx.library_dir = Some(target.clone());
        self.step_permissions(ctx, &target);

        self.set_status(ctx, JobEvent::Complete)
    }

    fn set_status(&self, ctx: &mut PipelineContext, event: JobEvent) -> Result<(), PipelineError> {
        let status = ctx.job.apply(event)?;
        job_repo::update_status(&self.db, ctx.job.job_id, status)?;
        info!(status = %status, "Job status changed");
        Ok(())
    }

    /// Records the error and moves the job to `fail`, through the phase's
    /// `*_fail` marker when one applies.
    async fn handle_failure(&self, ctx: &mut PipelineContext, err: &PipelineError) {
        error!(error = %err, phase = err.phase(), "Job failed");

        if let Some(agent) = &self.ai {
            let context = FailureContext {
                phase: err.phase(),
                tool: err.tool(),
                disctype: ctx.job.disctype,
                title: ctx.job.title.as_deref(),
            };
            if let Some(diagnosis) = agent.diagnose_error(&err.to_string(), &context).await {
                info!(
                    cause = %diagnosis.cause,
                    suggestion = diagnosis.suggestion.as_deref().unwrap_or(""),
                    "AI error diagnosis"
                );
                ctx.advisory.diagnosis = Some(diagnosis);
            }
        }

        let message = err.to_string();
        ctx.job.append_error(&message);
        if let Err(e) = job_repo::append_error(&self.db, ctx.job.job_id, &message) {
            warn!(error = %e, "Failed to record job error");
            ctx.warnings.push(PipelineWarning::Persistence {
                error: e.to_string(),
            });
        }

        if matches!(
            ctx.job.status(),
            JobStatus::Ripping | JobStatus::Transcoding
        ) {
            if let Err(e) = self.set_status(ctx, JobEvent::PhaseFailed) {
                warn!(error = %e, "Could not mark phase failure");
            }
        }
        if let Err(e) = self.set_status(ctx, JobEvent::Abort) {
            warn!(error = %e, "Could not move job to fail");
        }
    }

    async fn finish(&self, ctx: &mut PipelineContext) {
        ctx.job.mark_stopped(Utc::now());
        if let Err(e) = job_repo::update(&self.db, &ctx.job) {
            warn!(error = %e, "Failed to persist final job state");
            ctx.warnings.push(PipelineWarning::Persistence {
                error: e.to_string(),
            });
        }

        let (title, body) = completion_message(&ctx.job);
        self.notifier.notify(&ctx.job, &title, &body).await;

        info!(
            status = %ctx.job.status(),
            length = ctx.job.job_length.as_deref().unwrap_or(""),
            warnings = ctx.warnings.len(),
            "Job finished"
        );
    }
}
