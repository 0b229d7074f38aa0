//! Isolated environment for running the pipeline against a fake drive.
//!
//! The "disc" is a directory listed in a private mount table, so the
//! pipeline finds it already mounted. Work directories and the library live
//! in the same temp dir; the database is in memory.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tempfile::TempDir;

use armrip::ai::{AiAgent, CompletionClient};
use armrip::config::Config;
use armrip::db::{job_repo, Database};
use armrip::identify::strategy::ProviderLookup;
use armrip::identify::{
    AlbumLookup, IdentificationResolver, IdentificationStrategy, MetadataProvider, Mounter,
};
use armrip::job::{Job, JobEvent};
use armrip::notify::NotificationDispatcher;
use armrip::pipeline::{Pipeline, PipelineContext};
use armrip::tools::ToolInvoker;

use super::fakes::{FakeRunner, RecordingChannel};

pub const DEVICE: &str = "/dev/sr0";

pub struct TestHarness {
    temp_dir: TempDir,
    pub disc_dir: PathBuf,
    pub raw_dir: PathBuf,
    pub transcode_dir: PathBuf,
    pub completed_dir: PathBuf,
    pub mount_table: PathBuf,
    pub config: Config,
    pub db: Database,
    pub runner: FakeRunner,
    pub channel: RecordingChannel,
    strategies: Vec<Box<dyn IdentificationStrategy>>,
    albums: Option<Arc<dyn AlbumLookup>>,
    ai: Option<AiAgent>,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();

        let disc_dir = base.join("disc");
        let raw_dir = base.join("raw");
        let transcode_dir = base.join("transcode");
        let completed_dir = base.join("completed");
        let mount_table = base.join("mounts");
        std::fs::create_dir_all(&disc_dir).unwrap();

        let config = Config {
            raw_path: raw_dir.clone(),
            transcode_path: transcode_dir.clone(),
            completed_path: completed_dir.clone(),
            logpath: base.join("logs"),
            lock_timeout: 5,
            ..Config::default()
        };

        let db = Database::open_in_memory().expect("Failed to open database");
        record_status_history(&db);

        let harness = Self {
            disc_dir,
            raw_dir,
            transcode_dir,
            completed_dir,
            mount_table,
            config,
            db,
            runner: FakeRunner::new(),
            channel: RecordingChannel::default(),
            strategies: Vec::new(),
            albums: None,
            ai: None,
            temp_dir,
        };
        let disc_dir = harness.disc_dir.clone();
        harness.mount_at(&disc_dir);
        harness
    }

    pub fn base(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Lists the device as mounted at `mountpoint`.
    pub fn mount_at(&self, mountpoint: &Path) {
        std::fs::write(
            &self.mount_table,
            format!("{} {} udf ro,relatime 0 0\n", DEVICE, mountpoint.display()),
        )
        .unwrap();
    }

    pub fn with_runner(mut self, runner: FakeRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_provider(mut self, provider: impl MetadataProvider + 'static) -> Self {
        self.strategies
            .push(Box::new(ProviderLookup::new(Box::new(provider), None)));
        self
    }

    pub fn with_album(mut self, albums: impl AlbumLookup + 'static) -> Self {
        self.albums = Some(Arc::new(albums));
        self
    }

    pub fn with_ai(mut self, client: impl CompletionClient + 'static) -> Self {
        self.ai = Some(AiAgent::new(Arc::new(client)));
        self
    }

    /// Writes a file under the disc root.
    pub fn disc_file(&self, relative: &str, content: &str) {
        let path = self.disc_dir.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    pub fn bluray(&self, name: &str, protected: bool) {
        self.disc_file("BDMV/index.bdmv", "INDX0200");
        self.disc_file(
            "BDMV/META/DL/bdmt_eng.xml",
            &format!(
                r#"<?xml version="1.0" encoding="utf-8"?>
<disclib xmlns="urn:BDA:bdmv;disclib" xmlns:di="urn:BDA:bdmv;discinfo">
  <di:discinfo><di:title><di:name>{} - Blu-ray</di:name></di:title></di:discinfo>
</disclib>"#,
                name
            ),
        );
        if protected {
            self.disc_file("AACS/Unit_Key_RO.inf", "key");
        }
    }

    pub fn dvd(&self) {
        self.disc_file("VIDEO_TS/VIDEO_TS.IFO", "DVDVIDEO-VMG");
        self.disc_file("VIDEO_TS/VTS_01_1.VOB", "vob");
    }

    pub fn audio_cd(&self) {
        self.disc_file("AUDIO_TS/.keep", "");
    }

    /// Creates the persisted `active` job the binary would hand over.
    pub fn start_job(&self) -> Job {
        let mut job = Job::new(DEVICE);
        job.apply(JobEvent::Start).unwrap();
        job.pid = Some(std::process::id());
        job.start_time = Some(Utc::now());
        job.job_id = job_repo::insert(&self.db, &job).unwrap();
        job
    }

    pub fn pipeline(&mut self) -> Pipeline {
        let invoker = ToolInvoker::new(Arc::new(self.runner.clone()));
        let mounter = Mounter::new(invoker.clone())
            .with_mount_table(&self.mount_table)
            .with_mount_root(self.base().join("mnt"));

        let mut resolver = IdentificationResolver::new(mounter, invoker.clone())
            .with_strategies(std::mem::take(&mut self.strategies));
        if let Some(albums) = self.albums.take() {
            resolver = resolver.with_album_lookup(albums);
        }

        let notifier = NotificationDispatcher::new(self.db.clone())
            .with_channel(Box::new(self.channel.clone()));

        let pipeline = Pipeline::new(
            Arc::new(self.config.clone()),
            self.db.clone(),
            invoker,
            resolver,
            notifier,
        );
        match self.ai.take() {
            Some(agent) => pipeline.with_ai(agent),
            None => pipeline,
        }
    }

    /// Starts a job and runs it to the end.
    pub async fn run(&mut self) -> PipelineContext {
        let job = self.start_job();
        self.pipeline().run(job).await
    }

    pub fn stored_job(&self, job_id: i64) -> Job {
        job_repo::find_by_id(&self.db, job_id).unwrap().unwrap()
    }

    /// Every status the job's row has held, in order.
    pub fn status_history(&self, job_id: i64) -> Vec<String> {
        self.db
            .with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT status FROM status_history WHERE job_id = ?1 ORDER BY seq",
                )?;
                let rows = stmt
                    .query_map([job_id], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .unwrap()
    }

    pub fn notifications(&self) -> Vec<(String, String)> {
        self.channel.sent.lock().unwrap().clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.runner
            .commands()
            .into_iter()
            .map(|c| c.program)
            .collect()
    }
}

/// Logs each change of `job.status` into a side table the tests read back.
fn record_status_history(db: &Database) {
    db.with_conn(|conn| {
        conn.execute_batch(
            "CREATE TABLE status_history (
                 seq INTEGER PRIMARY KEY AUTOINCREMENT,
                 job_id INTEGER NOT NULL,
                 status TEXT NOT NULL
             );
             CREATE TRIGGER job_status_inserted AFTER INSERT ON job
             BEGIN
                 INSERT INTO status_history (job_id, status) VALUES (NEW.job_id, NEW.status);
             END;
             CREATE TRIGGER job_status_changed AFTER UPDATE OF status ON job
             WHEN OLD.status IS NOT NEW.status
             BEGIN
                 INSERT INTO status_history (job_id, status) VALUES (NEW.job_id, NEW.status);
             END;",
        )?;
        Ok(())
    })
    .expect("Failed to install status history trigger");
}
