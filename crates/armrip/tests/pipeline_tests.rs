//! End-to-end runs of the pipeline against a fake drive and fake tools.

mod common;

use armrip::config::RipMethod;
use armrip::db::{notification_repo, track_repo};
use armrip::identify::Album;
use armrip::identify::music::AlbumTrack;
use armrip::job::{DiscType, JobStatus};
use armrip::pipeline::PipelineWarning;

use common::{FakeRunner, FixedAlbum, FixedProvider, ScriptedAi, TestHarness};

#[tokio::test]
async fn protected_bluray_with_direct_method_still_runs_makemkv() {
    let mut harness = TestHarness::new();
    harness.config.ripmethod = RipMethod::Direct;
    harness.bluray("Alien", true);

    let ctx = harness.run().await;

    assert_eq!(ctx.job.disctype, DiscType::Bluray);
    assert!(ctx.job.protection);
    assert_eq!(ctx.job.status(), JobStatus::Success, "errors: {:?}", ctx.job.errors);

    let makemkv = harness.runner.calls_to("makemkvcon");
    assert_eq!(makemkv[0].args[0], "info");
    assert!(
        makemkv.iter().any(|c| c.args[0] == "mkv"),
        "extraction never ran: {:?}",
        makemkv
    );
    assert_eq!(harness.runner.calls_to("HandBrakeCLI").len(), 2);

    // Main feature renamed to the title, the extra keeps its name
    let library = harness.completed_dir.join("Alien");
    assert!(library.join("Alien.mkv").is_file());
    assert!(library.join("title_t01.mkv").is_file());
    assert!(!library.join(".armrip.lock").exists());
    assert!(!harness.raw_dir.join("Alien").exists());
    assert_eq!(ctx.job.path.as_deref(), Some(library.to_str().unwrap()));

    let tracks = track_repo::find_by_job(&harness.db, ctx.job.job_id).unwrap();
    assert_eq!(tracks.len(), 2);
    let main = tracks.iter().find(|t| t.main_feature).unwrap();
    assert_eq!(main.orig_filename.as_deref(), Some("title_t00.mkv"));
    assert_eq!(main.new_filename.as_deref(), Some("Alien.mkv"));
    assert!(main.ripped);

    let stored = harness.stored_job(ctx.job.job_id);
    assert_eq!(stored.status(), JobStatus::Success);
    assert!(stored.stop_time.is_some());
    assert_eq!(
        harness.status_history(ctx.job.job_id),
        ["active", "ripping", "transcoding", "success"]
    );

    let sent = harness.notifications();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "ARM: Alien completed successfully");
}

#[tokio::test]
async fn unknown_disc_fails_with_fixed_message_and_one_notification() {
    let mut harness = TestHarness::new();
    let missing = harness.base().join("not-a-disc");
    harness.mount_at(&missing);

    let ctx = harness.run().await;

    assert_eq!(ctx.job.disctype, DiscType::Unknown);
    assert_eq!(ctx.job.status(), JobStatus::Fail);
    assert_eq!(ctx.job.errors.as_deref(), Some("Unknown disc type"));
    assert!(harness.runner.calls_to("makemkvcon").is_empty());

    let stored = harness.stored_job(ctx.job.job_id);
    assert_eq!(stored.status(), JobStatus::Fail);
    assert_eq!(stored.errors.as_deref(), Some("Unknown disc type"));
    assert_eq!(harness.status_history(ctx.job.job_id), ["active", "fail"]);

    let sent = harness.notifications();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].0.contains("completed with errors"));
    assert_eq!(notification_repo::find_unseen(&harness.db).unwrap().len(), 1);
}

#[tokio::test]
async fn transcode_failure_fails_job_and_still_notifies() {
    let ai = ScriptedAi::new()
        .reply(
            "transcoding assistant",
            r#"{"preset": "H.265 MKV 480p30", "args": "", "reasoning": "SD source"}"#,
        )
        .reply(
            "troubleshooting",
            r#"{"cause": "HandBrake could not read the source", "suggestion": "Check the raw files"}"#,
        );
    let mut harness = TestHarness::new()
        .with_runner(FakeRunner::new().with_label("ALIEN_1979").fail_program("HandBrakeCLI"))
        .with_ai(ai);
    harness.dvd();

    let ctx = harness.run().await;

    assert_eq!(ctx.job.disctype, DiscType::Dvd);
    assert_eq!(ctx.job.title.as_deref(), Some("ALIEN 1979"));
    assert_eq!(ctx.job.status(), JobStatus::Fail);
    let errors = ctx.job.errors.as_deref().unwrap();
    assert!(
        errors.contains("Transcoding failed for 2 of 2 files"),
        "errors: {}",
        errors
    );

    // Raw files stay for a manual retry
    assert!(harness.raw_dir.join("ALIEN 1979").join("title_t00.mkv").is_file());
    assert!(!harness.completed_dir.join("ALIEN 1979").exists());

    // Advisory results are kept beside the job, never required
    assert!(ctx.advisory.transcode.is_some());
    assert_eq!(
        ctx.advisory.diagnosis.as_ref().map(|d| d.cause.as_str()),
        Some("HandBrake could not read the source")
    );

    let stored = harness.stored_job(ctx.job.job_id);
    assert_eq!(stored.status(), JobStatus::Fail);
    assert!(stored.errors.unwrap().contains("Transcoding failed"));
    assert_eq!(
        harness.status_history(ctx.job.job_id),
        ["active", "ripping", "transcoding", "transcoding_fail", "fail"]
    );

    let sent = harness.notifications();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "ARM: ALIEN 1979 completed with errors");
}

#[tokio::test]
async fn extraction_failure_fails_job() {
    let mut harness =
        TestHarness::new().with_runner(FakeRunner::new().fail_program("makemkvcon"));
    harness.bluray("Alien", false);

    let ctx = harness.run().await;

    assert_eq!(ctx.job.status(), JobStatus::Fail);
    assert!(ctx.job.errors.as_deref().unwrap().starts_with("Extraction failed"));
    assert_eq!(
        harness.status_history(ctx.job.job_id),
        ["active", "ripping", "ripping_fail", "fail"]
    );
    assert!(harness.runner.calls_to("HandBrakeCLI").is_empty());
    assert_eq!(harness.notifications().len(), 1);
}

#[tokio::test]
async fn mount_failure_fails_job_and_notifies() {
    let mut harness = TestHarness::new();
    std::fs::remove_file(&harness.mount_table).unwrap();

    let ctx = harness.run().await;

    assert_eq!(ctx.job.status(), JobStatus::Fail);
    assert!(ctx.job.errors.as_deref().unwrap().starts_with("Mount failed"));
    assert_eq!(harness.notifications().len(), 1);
}

#[tokio::test]
async fn identified_dvd_backup_lands_under_movies() {
    let mut harness = TestHarness::new()
        .with_runner(FakeRunner::new().with_label("ALIEN_1979"))
        .with_provider(FixedProvider::movie("Alien", "1979"));
    harness.config.ripmethod = RipMethod::Backup;
    harness.config.mainfeature = true;
    harness.dvd();

    let ctx = harness.run().await;

    assert_eq!(ctx.job.status(), JobStatus::Success, "errors: {:?}", ctx.job.errors);
    assert!(ctx.job.has_nice_title());
    assert_eq!(ctx.job.display_title(), "Alien (1979)");
    assert_eq!(ctx.job.imdb_id.as_deref(), Some("tt0078748"));

    let makemkv = harness.runner.calls_to("makemkvcon");
    assert!(makemkv.iter().any(|c| c.args[0] == "backup"));

    let handbrake = harness.runner.calls_to("HandBrakeCLI");
    assert_eq!(handbrake.len(), 1);
    assert!(handbrake[0].args.contains(&"--main-feature".to_string()));

    let library = harness.completed_dir.join("movies").join("Alien (1979)");
    assert!(library.join("Alien (1979).mkv").is_file());
    assert!(!harness.raw_dir.join("Alien (1979)").exists());
    assert!(ctx.warnings.is_empty(), "warnings: {:?}", ctx.warnings);
}

#[tokio::test]
async fn direct_method_transcodes_from_the_device() {
    let mut harness = TestHarness::new().with_runner(FakeRunner::new().with_label("ALIEN"));
    harness.config.ripmethod = RipMethod::Direct;
    harness.dvd();

    let ctx = harness.run().await;

    assert_eq!(ctx.job.status(), JobStatus::Success, "errors: {:?}", ctx.job.errors);
    let makemkv = harness.runner.calls_to("makemkvcon");
    assert_eq!(makemkv.len(), 1);
    assert_eq!(makemkv[0].args[0], "info");

    let handbrake = harness.runner.calls_to("HandBrakeCLI");
    assert_eq!(handbrake.len(), 2);
    assert!(handbrake.iter().all(|c| c.args[1] == "/dev/sr0"));
    assert_eq!(&handbrake[0].args[4..], ["-t", "1"]);
    assert_eq!(
        harness.status_history(ctx.job.job_id),
        ["active", "ripping", "transcoding", "success"]
    );

    let library = harness.completed_dir.join("ALIEN");
    assert!(library.join("ALIEN.mkv").is_file());
    assert!(library.join("ALIEN_t01.mkv").is_file());
}

#[tokio::test]
async fn dvd_mkv_rip_walks_every_phase() {
    let mut harness = TestHarness::new().with_runner(FakeRunner::new().with_label("ALIEN"));
    harness.dvd();

    let ctx = harness.run().await;

    assert_eq!(ctx.job.disctype, DiscType::Dvd);
    assert_eq!(ctx.job.status(), JobStatus::Success, "errors: {:?}", ctx.job.errors);
    assert!(harness
        .runner
        .calls_to("makemkvcon")
        .iter()
        .any(|c| c.args[0] == "mkv"));
    assert_eq!(
        harness.status_history(ctx.job.job_id),
        ["active", "ripping", "transcoding", "success"]
    );
    assert_eq!(harness.stored_job(ctx.job.job_id).status(), JobStatus::Success);
    assert!(harness.completed_dir.join("ALIEN").join("ALIEN.mkv").is_file());
}

#[tokio::test]
async fn skip_transcode_relocates_raw_files() {
    let mut harness = TestHarness::new();
    harness.config.skip_transcode = true;
    harness.bluray("Alien", false);

    let ctx = harness.run().await;

    assert_eq!(ctx.job.status(), JobStatus::Success);
    assert!(harness.runner.calls_to("HandBrakeCLI").is_empty());
    assert!(harness.completed_dir.join("Alien").join("Alien.mkv").is_file());
    assert_eq!(
        harness.status_history(ctx.job.job_id),
        ["active", "ripping", "success"]
    );
}

#[tokio::test]
async fn data_disc_is_copied_verbatim() {
    let mut harness =
        TestHarness::new().with_runner(FakeRunner::new().with_label("BACKUP_2020"));
    harness.disc_file("docs/readme.txt", "hello");
    harness.disc_file("photo.jpg", "jpeg");

    let ctx = harness.run().await;

    assert_eq!(ctx.job.disctype, DiscType::Data);
    assert_eq!(ctx.job.status(), JobStatus::Success);
    assert!(ctx.job.crc_id.is_some());
    assert!(harness.runner.calls_to("makemkvcon").is_empty());

    let target = harness.completed_dir.join("BACKUP_2020");
    assert_eq!(
        std::fs::read_to_string(target.join("docs/readme.txt")).unwrap(),
        "hello"
    );
    assert!(target.join("photo.jpg").is_file());
    assert_eq!(ctx.job.path.as_deref(), Some(target.to_str().unwrap()));
}

#[tokio::test]
async fn second_data_copy_gets_a_suffix() {
    let mut harness =
        TestHarness::new().with_runner(FakeRunner::new().with_label("BACKUP_2020"));
    harness.disc_file("photo.jpg", "jpeg");
    std::fs::create_dir_all(harness.completed_dir.join("BACKUP_2020")).unwrap();

    let ctx = harness.run().await;

    assert_eq!(ctx.job.status(), JobStatus::Success);
    assert!(harness
        .completed_dir
        .join("BACKUP_2020_2")
        .join("photo.jpg")
        .is_file());
}

#[tokio::test]
async fn audio_cd_is_identified_and_ripped() {
    let album = Album {
        release_id: "f5093c06-23e3-404f-aeaa-40f72885ee3a".to_string(),
        title: "The Dark Side of the Moon".to_string(),
        artist: "Pink Floyd".to_string(),
        year: Some("1973".to_string()),
        cover_url: None,
        tracks: vec![
            AlbumTrack {
                number: 1,
                title: "Speak to Me".to_string(),
                length: 68,
            },
            AlbumTrack {
                number: 2,
                title: "Breathe".to_string(),
                length: 169,
            },
        ],
    };
    let mut harness = TestHarness::new().with_album(FixedAlbum(album));
    harness.audio_cd();

    let ctx = harness.run().await;

    assert_eq!(ctx.job.disctype, DiscType::Music);
    assert_eq!(ctx.job.status(), JobStatus::Success);
    assert_eq!(
        ctx.job.title.as_deref(),
        Some("Pink Floyd - The Dark Side of the Moon")
    );
    assert_eq!(harness.runner.calls_to("abcde").len(), 1);

    let tracks = track_repo::find_by_job(&harness.db, ctx.job.job_id).unwrap();
    assert_eq!(tracks.len(), 3);
    assert!(tracks.iter().all(|t| t.source == "music_brainz"));
}

#[tokio::test]
async fn audio_rip_failure_fails_job() {
    let mut harness = TestHarness::new().with_runner(FakeRunner::new().fail_program("abcde"));
    harness.audio_cd();

    let ctx = harness.run().await;

    assert_eq!(ctx.job.status(), JobStatus::Fail);
    assert!(ctx.job.errors.as_deref().unwrap().starts_with("Audio rip failed"));
    assert_eq!(harness.notifications().len(), 1);
}

#[tokio::test]
async fn relocation_problems_do_not_fail_the_job() {
    let mut harness = TestHarness::new();
    harness.config.lock_timeout = 0;
    harness.bluray("Alien", false);

    // Another job holds the destination
    let library = harness.completed_dir.join("Alien");
    std::fs::create_dir_all(&library).unwrap();
    std::fs::write(library.join(".armrip.lock"), "1").unwrap();

    let ctx = harness.run().await;

    assert_eq!(ctx.job.status(), JobStatus::Success);
    assert!(ctx
        .warnings
        .iter()
        .any(|w| matches!(w, PipelineWarning::Relocation { .. })));
    assert!(harness.transcode_dir.join("Alien").join("title_t00.mkv").is_file());
}
