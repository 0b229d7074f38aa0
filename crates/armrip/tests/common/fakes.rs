//! Stand-ins for everything armrip talks to outside the process.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use armrip::ai::{ChatMessage, CompletionClient};
use armrip::error::{AiError, IdentifyError, NotifyError, ToolError};
use armrip::identify::{Album, AlbumLookup, MetadataProvider};
use armrip::job::Identification;
use armrip::notify::NotificationChannel;
use armrip::tools::music::DiscToc;
use armrip::tools::{ToolCommand, ToolOutput, ToolRunner};

/// `makemkvcon info` for a two-title disc: a 1:56:45 feature and a 25 minute extra.
pub const MAKEMKV_INFO: &str = r#"MSG:1005,0,1,"MakeMKV v1.17.5 linux(x64-release) started","%1 started","MakeMKV v1.17.5 linux(x64-release)"
TCOUNT:2
TINFO:0,9,0,"1:56:45"
TINFO:0,27,0,"title_t00.mkv"
SINFO:0,0,19,0,"1920x1080"
SINFO:0,0,21,0,"23.976 (24000/1001)"
TINFO:1,9,0,"0:25:00"
TINFO:1,27,0,"title_t01.mkv"
SINFO:1,0,19,0,"1920x1080"
"#;

pub const DISCID: &str = "3 150 18552 40015 62352\n";

/// Records every command and fakes the tools' side effects on disk.
#[derive(Clone, Default)]
pub struct FakeRunner {
    commands: Arc<Mutex<Vec<ToolCommand>>>,
    failing: Vec<String>,
    label: Option<String>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call to `program` exits 1.
    pub fn fail_program(mut self, program: &str) -> Self {
        self.failing.push(program.to_string());
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn commands(&self) -> Vec<ToolCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn calls_to(&self, program: &str) -> Vec<ToolCommand> {
        self.commands()
            .into_iter()
            .filter(|c| c.program == program)
            .collect()
    }
}

fn ok(stdout: &str) -> ToolOutput {
    ToolOutput {
        stdout: stdout.to_string(),
        stderr: String::new(),
        code: Some(0),
    }
}

fn exit(code: i32, stderr: &str) -> ToolOutput {
    ToolOutput {
        stdout: String::new(),
        stderr: stderr.to_string(),
        code: Some(code),
    }
}

fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, b"video").unwrap();
}

#[async_trait]
impl ToolRunner for FakeRunner {
    async fn run(&self, command: &ToolCommand) -> Result<ToolOutput, ToolError> {
        self.commands.lock().unwrap().push(command.clone());

        if self.failing.contains(&command.program) {
            return Ok(exit(1, "simulated failure"));
        }

        let args = &command.args;
        let output = match command.program.as_str() {
            "blkid" => match &self.label {
                Some(label) => ok(&format!("{}\n", label)),
                None => exit(2, ""),
            },
            "makemkvcon" => match args[0].as_str() {
                "info" => ok(MAKEMKV_INFO),
                "mkv" => {
                    let out = Path::new(&args[3]);
                    match args[2].as_str() {
                        "all" => {
                            touch(&out.join("title_t00.mkv"));
                            touch(&out.join("title_t01.mkv"));
                        }
                        title => touch(&out.join(format!("title_t{:0>2}.mkv", title))),
                    }
                    ok("")
                }
                "backup" => {
                    touch(&Path::new(&args[3]).join("BDMV").join("index.bdmv"));
                    ok("")
                }
                _ => exit(1, "unknown makemkv mode"),
            },
            "HandBrakeCLI" => {
                let out = args
                    .iter()
                    .position(|a| a == "-o")
                    .map(|i| args[i + 1].clone())
                    .unwrap();
                touch(Path::new(&out));
                ok("")
            }
            "ffmpeg" => {
                touch(Path::new(args.last().unwrap()));
                ok("")
            }
            "cd-discid" => ok(DISCID),
            "abcde" | "mount" => ok(""),
            _ => exit(127, "command not found"),
        };
        Ok(output)
    }
}

/// Returns the same candidates for every search.
pub struct FixedProvider {
    pub results: Vec<Identification>,
}

impl FixedProvider {
    pub fn movie(title: &str, year: &str) -> Self {
        Self {
            results: vec![Identification {
                title: title.to_string(),
                year: Some(year.to_string()),
                video_type: Some("movie".to_string()),
                imdb_id: Some("tt0078748".to_string()),
                poster_url: None,
                source: "fixed".to_string(),
            }],
        }
    }
}

#[async_trait]
impl MetadataProvider for FixedProvider {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn search(
        &self,
        _title: &str,
        _year: Option<&str>,
    ) -> Result<Vec<Identification>, IdentifyError> {
        Ok(self.results.clone())
    }
}

pub struct FixedAlbum(pub Album);

#[async_trait]
impl AlbumLookup for FixedAlbum {
    async fn lookup(&self, _toc: &DiscToc) -> Result<Option<Album>, IdentifyError> {
        Ok(Some(self.0.clone()))
    }
}

/// Answers by matching a needle against the system prompt. No match is an error.
#[derive(Default)]
pub struct ScriptedAi {
    replies: Vec<(&'static str, String)>,
}

impl ScriptedAi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, needle: &'static str, reply: &str) -> Self {
        self.replies.push((needle, reply.to_string()));
        self
    }
}

#[async_trait]
impl CompletionClient for ScriptedAi {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AiError> {
        let system = messages
            .first()
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        self.replies
            .iter()
            .find(|(needle, _)| system.contains(needle))
            .map(|(_, reply)| reply.clone())
            .ok_or(AiError::EmptyResponse)
    }
}

/// Keeps every (title, body) it is asked to send.
#[derive(Clone, Default)]
pub struct RecordingChannel {
    pub sent: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
        Ok(())
    }
}
