//! Transcoder backends.
//!
//! HandBrake is preset-driven and can pick titles from a disc or backup
//! folder. FFmpeg is argument-driven and always transcodes its whole input.
//! The pipeline picks one per job with [`select_transcoder`] and only ever
//! talks to the [`Transcoder`] trait.

use std::path::PathBuf;

use crate::config::TranscodeSettings;
use crate::tools::ToolCommand;

pub const HANDBRAKE: &str = "HandBrakeCLI";
pub const FFMPEG: &str = "ffmpeg";

/// What part of the source to transcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleSelection {
    /// The source is a single file.
    Whole,
    /// One title of a disc or backup folder (1-based, HandBrake numbering).
    Title(u32),
    MainFeature,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeRequest {
    pub source: PathBuf,
    pub output: PathBuf,
    pub selection: TitleSelection,
}

pub trait Transcoder: Send + Sync {
    fn name(&self) -> &'static str;

    fn build_command(&self, request: &TranscodeRequest) -> ToolCommand;
}

pub struct HandBrake {
    preset: String,
    args: Vec<String>,
}

impl HandBrake {
    pub fn new(settings: &TranscodeSettings) -> Self {
        Self {
            preset: settings.preset.clone(),
            args: split_args(&settings.args),
        }
    }
}

impl Transcoder for HandBrake {
    fn name(&self) -> &'static str {
        "handbrake"
    }

    /// `HandBrakeCLI -i <src> -o <dst> [--preset <name>] <args> [-t N] [--main-feature]`
    fn build_command(&self, request: &TranscodeRequest) -> ToolCommand {
        let mut cmd = ToolCommand::new(HANDBRAKE)
            .arg("-i")
            .arg(request.source.to_string_lossy())
            .arg("-o")
            .arg(request.output.to_string_lossy());
        if !self.preset.is_empty() {
            cmd = cmd.arg("--preset").arg(self.preset.as_str());
        }
        cmd = cmd.args(self.args.iter().cloned());
        match request.selection {
            TitleSelection::Whole => cmd,
            TitleSelection::Title(n) => cmd.arg("-t").arg(n.to_string()),
            TitleSelection::MainFeature => cmd.arg("--main-feature"),
        }
    }
}

pub struct Ffmpeg {
    pre_args: Vec<String>,
    post_args: Vec<String>,
}

impl Ffmpeg {
    pub fn new(settings: &TranscodeSettings) -> Self {
        Self {
            pre_args: split_args(&settings.pre_args),
            post_args: split_args(&settings.args),
        }
    }
}

impl Transcoder for Ffmpeg {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    /// `ffmpeg <pre-args> -i <src> <post-args> <dst>`
    ///
    /// Pre-args are input options (`-hwaccel`, `-ss`), so they go before `-i`.
    fn build_command(&self, request: &TranscodeRequest) -> ToolCommand {
        ToolCommand::new(FFMPEG)
            .args(self.pre_args.iter().cloned())
            .arg("-i")
            .arg(request.source.to_string_lossy())
            .args(self.post_args.iter().cloned())
            .arg(request.output.to_string_lossy())
    }
}

pub fn select_transcoder(use_ffmpeg: bool, settings: &TranscodeSettings) -> Box<dyn Transcoder> {
    if use_ffmpeg {
        Box::new(Ffmpeg::new(settings))
    } else {
        Box::new(HandBrake::new(settings))
    }
}

/// Splits an argument string on whitespace, keeping quoted runs together.
///
/// `--audio-lang-list "eng, und" -q 20` → `["--audio-lang-list", "eng, und", "-q", "20"]`
pub fn split_args(args: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_token = false;

    for c in args.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    out.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        out.push(current);
    }
    out
}
