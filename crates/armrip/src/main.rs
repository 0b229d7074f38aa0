use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use tracing::{error, info};

use armrip::ai::{AiAgent, HttpCompletionClient};
use armrip::config::{load_config, ConfigSnapshot, DEFAULT_CONFIG_PATH};
use armrip::db::{config_repo, default_database_path, job_repo, Database};
use armrip::error::{ArmError, ConfigError};
use armrip::guard::ProcessGuard;
use armrip::job::{Job, JobEvent, JobStatus};
use armrip::logging::{init_logging, JobLogFile};
use armrip::pipeline::Pipeline;
use armrip::sanitize::redact_path;
use armrip::secrets::{resolve_secret, AI_KEY_ENV_VAR};

/// Identify, rip, transcode and file the disc in one drive.
#[derive(Parser, Debug)]
#[command(name = "armrip", version)]
struct Cli {
    /// Device path of the drive, e.g. /dev/sr0
    device: String,

    /// Path to arm.yaml
    #[arg(long, env = "ARM_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// SQLite database file (default: ~/db/arm.db)
    #[arg(long, env = "ARM_DB")]
    db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let job_log = JobLogFile::new();
    if let Err(e) = init_logging(job_log.clone()) {
        eprintln!("armrip: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli, job_log).await {
        Ok(status) => {
            info!(status = %status, "armrip finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "armrip could not start the job");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, job_log: JobLogFile) -> Result<JobStatus, ArmError> {
    let config = Arc::new(load_config(&cli.config)?);
    info!(config = %redact_path(&cli.config), "Loaded configuration");

    let api_key = resolve_secret(
        config.ai_api_key.as_deref(),
        config.ai_api_key_file.as_deref(),
        Some(AI_KEY_ENV_VAR),
    )?;
    let agent = AiAgent::new(Arc::new(HttpCompletionClient::from_config(&config, api_key)?));

    ProcessGuard::new().check(&cli.device)?;

    let db_path = cli.db.or_else(default_database_path).ok_or_else(|| {
        ConfigError::Validation {
            message: "no database path given and no home directory to default to".to_string(),
        }
    })?;
    let db = Database::open(&db_path)?;

    let snapshot = ConfigSnapshot::capture(&config)?;
    let config_id = config_repo::insert(&db, &snapshot)?;

    let now = Utc::now();
    let mut job = Job::new(cli.device.as_str());
    job.apply(JobEvent::Start)?;
    job.pid = Some(std::process::id());
    job.start_time = Some(now);
    job.config_id = Some(config_id);
    job.job_id = job_repo::insert(&db, &job)?;

    let logfile = job_log.attach(&config.logpath, &job.devpath, now)?;
    job.logfile = logfile
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());
    job_repo::update(&db, &job)?;
    info!(
        job_id = job.job_id,
        devpath = %job.devpath,
        logfile = job.logfile.as_deref().unwrap_or(""),
        "Job started"
    );

    let pipeline = Pipeline::from_config(config, db, Some(agent))?;
    let ctx = pipeline.run(job).await;
    Ok(ctx.job.status())
}
