//! MakeMKV (`makemkvcon`) commands and `--robot` output parsing.
//!
//! Robot output is one record per line, `PREFIX:field,field,"quoted value"`.
//! Records used here:
//!
//! - `TCOUNT:<n>` number of titles
//! - `TINFO:<title>,<attr>,<code>,"<value>"` (attr 9 = duration, 27 = output filename)
//! - `SINFO:<title>,<stream>,<attr>,<code>,"<value>"` (attr 19 = `WxH`, 21 = frame rate)

use std::collections::BTreeMap;
use std::path::Path;

use crate::job::track::SOURCE_MAKEMKV;
use crate::job::{classify_tracks, Track};
use crate::tools::ToolCommand;

pub const MAKEMKV: &str = "makemkvcon";

const TINFO_DURATION: u32 = 9;
const TINFO_FILENAME: u32 = 27;
const SINFO_RESOLUTION: u32 = 19;
const SINFO_FRAME_RATE: u32 = 21;

/// Splits a robot line at the first colon into `(prefix, content)`.
pub fn parse_line(line: &str) -> Option<(&str, &str)> {
    line.split_once(':')
}

/// Splits record content on commas and strips wrapping quotes.
pub fn parse_content(content: &str) -> Vec<String> {
    if content.is_empty() {
        return Vec::new();
    }
    content
        .split(',')
        .map(|field| unquote(field.trim()).to_string())
        .collect()
}

/// Splits into `count` fields where the last one is the quoted value, kept
/// verbatim apart from its wrapping quotes. Values may contain commas.
pub fn parse_record(content: &str, count: usize) -> Option<Vec<String>> {
    let parts: Vec<&str> = content.splitn(count, ',').collect();
    if parts.len() < count {
        return None;
    }
    let (value, head) = parts.split_last()?;
    let mut fields: Vec<String> = head.iter().map(|f| f.trim().to_string()).collect();
    fields.push(unquote(value).to_string());
    Some(fields)
}

fn unquote(field: &str) -> &str {
    field
        .strip_prefix('"')
        .and_then(|f| f.strip_suffix('"'))
        .unwrap_or(field)
}

/// `H:MM:SS`, `M:SS` or plain seconds. Anything unparsable counts as 0.
pub fn convert_to_seconds(value: Option<&str>) -> u64 {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return 0;
    };
    let parts: Option<Vec<u64>> = value.split(':').map(|p| p.trim().parse().ok()).collect();
    let total = match parts.as_deref() {
        Some([h, m, s]) => h
            .checked_mul(3600)
            .and_then(|h| m.checked_mul(60).and_then(|m| h.checked_add(m)))
            .and_then(|hm| hm.checked_add(*s)),
        Some([m, s]) => m.checked_mul(60).and_then(|m| m.checked_add(*s)),
        Some([s]) => Some(*s),
        _ => None,
    };
    total.unwrap_or(0)
}

/// Reduces a resolution to its aspect ratio, `""` when either side is unknown.
pub fn compute_aspect(width: Option<u32>, height: Option<u32>) -> String {
    match (width, height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => {
            let d = gcd(w, h);
            format!("{}:{}", w / d, h / d)
        }
        _ => String::new(),
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// `23.976 (24000/1001)`, `24000/1001` or `25`.
pub fn parse_fps(value: &str) -> f64 {
    let value = value.split_whitespace().next().unwrap_or("");
    if let Some((num, den)) = value.split_once('/') {
        let num: f64 = num.parse().unwrap_or(0.0);
        let den: f64 = den.parse().unwrap_or(0.0);
        return if den > 0.0 { num / den } else { 0.0 };
    }
    value.parse().unwrap_or(0.0)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TitleInfo {
    pub length: u64,
    pub filename: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscInfo {
    pub title_count: Option<u32>,
    pub titles: BTreeMap<u32, TitleInfo>,
}

impl DiscInfo {
    /// Builds track rows, flagging the main feature and the length window.
    pub fn to_tracks(&self, job_id: i64, min_length: u64, max_length: u64) -> Vec<Track> {
        let mut tracks: Vec<Track> = self
            .titles
            .iter()
            .map(|(number, info)| {
                let mut track = Track::new(job_id, *number, SOURCE_MAKEMKV);
                track.length = info.length;
                track.aspect_ratio = compute_aspect(info.width, info.height);
                track.fps = info.fps;
                track.filename = info.filename.clone();
                track.basename = info.filename.clone();
                track
            })
            .collect();
        classify_tracks(&mut tracks, min_length, max_length);
        tracks
    }
}

/// Parses `makemkvcon info --robot` output. Unknown records are ignored.
pub fn parse_disc_info(output: &str) -> DiscInfo {
    let mut info = DiscInfo::default();

    for line in output.lines() {
        let Some((prefix, content)) = parse_line(line.trim()) else {
            continue;
        };
        match prefix {
            "TCOUNT" => {
                info.title_count = parse_content(content).first().and_then(|f| f.parse().ok());
            }
            "TINFO" => {
                let Some(fields) = parse_record(content, 4) else {
                    continue;
                };
                let (Ok(title), Ok(attr)) = (fields[0].parse::<u32>(), fields[1].parse::<u32>())
                else {
                    continue;
                };
                let value = fields[3].as_str();
                let entry = info.titles.entry(title).or_default();
                match attr {
                    TINFO_DURATION => entry.length = convert_to_seconds(Some(value)),
                    TINFO_FILENAME => entry.filename = Some(value.to_string()),
                    _ => {}
                }
            }
            "SINFO" => {
                let Some(fields) = parse_record(content, 5) else {
                    continue;
                };
                let (Ok(title), Ok(attr)) = (fields[0].parse::<u32>(), fields[2].parse::<u32>())
                else {
                    continue;
                };
                let value = fields[4].as_str();
                let entry = info.titles.entry(title).or_default();
                match attr {
                    SINFO_RESOLUTION if entry.width.is_none() => {
                        if let Some((w, h)) = value.split_once('x') {
                            entry.width = w.trim().parse().ok();
                            entry.height = h.trim().parse().ok();
                        }
                    }
                    SINFO_FRAME_RATE if entry.fps == 0.0 => entry.fps = parse_fps(value),
                    _ => {}
                }
            }
            _ => {}
        }
    }

    info
}

fn device_arg(devpath: &str) -> String {
    format!("dev:{}", devpath)
}

/// `makemkvcon info dev:<devpath> --robot`
pub fn info_command(devpath: &str) -> ToolCommand {
    ToolCommand::new(MAKEMKV)
        .arg("info")
        .arg(device_arg(devpath))
        .arg("--robot")
}

/// `makemkvcon backup --decrypt dev:<devpath> <out> --robot`
pub fn backup_command(devpath: &str, out: &Path) -> ToolCommand {
    ToolCommand::new(MAKEMKV)
        .args(["backup", "--decrypt"])
        .arg(device_arg(devpath))
        .arg(out.to_string_lossy())
        .arg("--robot")
}

/// `makemkvcon mkv dev:<devpath> all <out> --robot --minlength=<n>`
pub fn mkv_all_command(devpath: &str, out: &Path, min_length: u64) -> ToolCommand {
    ToolCommand::new(MAKEMKV)
        .arg("mkv")
        .arg(device_arg(devpath))
        .arg("all")
        .arg(out.to_string_lossy())
        .arg("--robot")
        .arg(format!("--minlength={}", min_length))
}

/// `makemkvcon mkv dev:<devpath> <title> <out> --robot`
pub fn mkv_title_command(devpath: &str, title: u32, out: &Path) -> ToolCommand {
    ToolCommand::new(MAKEMKV)
        .arg("mkv")
        .arg(device_arg(devpath))
        .arg(title.to_string())
        .arg(out.to_string_lossy())
        .arg("--robot")
}
