//! Reading what the mounted filesystem says about the disc.

use std::path::{Path, PathBuf};

use quick_xml::events::Event;
use quick_xml::Reader;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::IdentifyError;
use crate::job::DiscType;
use crate::tools::{ToolCommand, ToolInvoker};

/// English disc library metadata on Blu-ray discs.
const BLURAY_META: &str = "BDMV/META/DL/bdmt_eng.xml";

/// Classifies the disc from its top-level directories. An unreadable root is
/// `Unknown`.
pub fn detect_disc_type(root: &Path) -> DiscType {
    let Ok(entries) = std::fs::read_dir(root) else {
        return DiscType::Unknown;
    };
    let names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().to_ascii_uppercase())
        .collect();

    let has = |name: &str| names.iter().any(|n| n == name);
    if has("BDMV") {
        DiscType::Bluray
    } else if has("VIDEO_TS") {
        DiscType::Dvd
    } else if has("AUDIO_TS") {
        DiscType::Music
    } else {
        DiscType::Data
    }
}

/// AACS directory present: the disc needs the extraction tool to decrypt.
pub fn has_aacs(root: &Path) -> bool {
    root.join("AACS").is_dir()
}

/// Title from the Blu-ray `<di:name>` element. `Ok(None)` when the disc has
/// no metadata file.
pub fn bluray_title(root: &Path) -> Result<Option<String>, IdentifyError> {
    let path = root.join(BLURAY_META);
    if !path.is_file() {
        return Ok(None);
    }
    let xml = std::fs::read_to_string(&path).map_err(|e| IdentifyError::DiscMetadata {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    parse_bluray_meta(&xml).map_err(|reason| IdentifyError::DiscMetadata { path, reason })
}

fn parse_bluray_meta(xml: &str) -> Result<Option<String>, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut in_name = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                in_name = e.local_name().as_ref() == b"name";
            }
            Ok(Event::End(_)) => in_name = false,
            Ok(Event::Text(e)) if in_name => {
                let text = String::from_utf8_lossy(&e).trim().to_string();
                if !text.is_empty() {
                    return Ok(Some(clean_bluray_name(&text)));
                }
            }
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(format!("XML parsing error: {}", e)),
            _ => {}
        }
    }
}

/// Drops the ` - Blu-ray` style suffix studios append to the name.
fn clean_bluray_name(name: &str) -> String {
    let name = name.replace(['\u{2122}', '\u{00ae}'], "");
    let trimmed = match name.find(" - ") {
        Some(pos) if name[pos..].to_ascii_lowercase().contains("blu-ray") => &name[..pos],
        _ => name.as_str(),
    };
    trimmed.trim().to_string()
}

pub fn blkid_label_command(devpath: &str) -> ToolCommand {
    ToolCommand::new("blkid").args(["-o", "value", "-s", "LABEL", devpath])
}

/// Raw filesystem volume label, e.g. `STAR_WARS_EP_IV`.
pub async fn volume_label(invoker: &ToolInvoker, devpath: &str) -> Option<String> {
    let output = invoker.run_lenient(&blkid_label_command(devpath)).await?;
    let label = output.stdout.trim();
    if label.is_empty() {
        None
    } else {
        Some(label.to_string())
    }
}

/// `STAR_WARS_EP_IV` → `STAR WARS EP IV`.
pub fn label_to_title(label: &str) -> String {
    label
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// SHA-256 over the sorted relative paths and sizes of every file on the disc.
pub fn tree_fingerprint(root: &Path) -> Result<String, IdentifyError> {
    let mut entries: Vec<(PathBuf, u64)> = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| IdentifyError::DiscMetadata {
            path: root.to_path_buf(),
            reason: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_path_buf();
        entries.push((relative, size));
    }
    entries.sort();

    let mut hasher = Sha256::new();
    for (path, size) in &entries {
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update(b"\0");
        hasher.update(size.to_le_bytes());
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use assert_fs::TempDir;

    #[test]
    fn test_detect_disc_type() {
        let bd = TempDir::new().unwrap();
        bd.child("BDMV/STREAM").create_dir_all().unwrap();
        assert_eq!(detect_disc_type(bd.path()), DiscType::Bluray);

        let dvd = TempDir::new().unwrap();
        dvd.child("VIDEO_TS").create_dir_all().unwrap();
        dvd.child("AUDIO_TS").create_dir_all().unwrap();
        assert_eq!(detect_disc_type(dvd.path()), DiscType::Dvd);

        let music = TempDir::new().unwrap();
        music.child("AUDIO_TS").create_dir_all().unwrap();
        assert_eq!(detect_disc_type(music.path()), DiscType::Music);

        let data = TempDir::new().unwrap();
        data.child("photos/a.jpg").write_str("x").unwrap();
        assert_eq!(detect_disc_type(data.path()), DiscType::Data);
    }

    #[test]
    fn test_detect_lower_case_directories() {
        let dvd = TempDir::new().unwrap();
        dvd.child("video_ts").create_dir_all().unwrap();
        assert_eq!(detect_disc_type(dvd.path()), DiscType::Dvd);
    }

    #[test]
    fn test_unreadable_root_is_unknown() {
        assert_eq!(
            detect_disc_type(Path::new("/nonexistent/armrip/disc")),
            DiscType::Unknown
        );
    }

    #[test]
    fn test_file_named_bdmv_is_not_bluray() {
        let disc = TempDir::new().unwrap();
        disc.child("BDMV").write_str("not a directory").unwrap();
        assert_eq!(detect_disc_type(disc.path()), DiscType::Data);
    }

    #[test]
    fn test_bluray_title() {
        let disc = TempDir::new().unwrap();
        disc.child(BLURAY_META)
            .write_str(
                r#"<?xml version="1.0" encoding="utf-8"?>
<disclib xmlns="urn:BDA:bdmv;disclib" xmlns:di="urn:BDA:bdmv;discinfo">
  <di:discinfo>
    <di:date>2009-10-27</di:date>
    <di:title>
      <di:name>Alien - Blu-ray</di:name>
    </di:title>
  </di:discinfo>
</disclib>"#,
            )
            .unwrap();
        assert_eq!(bluray_title(disc.path()).unwrap().as_deref(), Some("Alien"));
    }

    #[test]
    fn test_bluray_title_missing_file() {
        let disc = TempDir::new().unwrap();
        disc.child("BDMV").create_dir_all().unwrap();
        assert_eq!(bluray_title(disc.path()).unwrap(), None);
    }

    #[test]
    fn test_bluray_title_malformed_xml() {
        let disc = TempDir::new().unwrap();
        disc.child(BLURAY_META)
            .write_str("<disclib><di:title></di:name><di:name>Alien</di:name></disclib>")
            .unwrap();
        assert!(matches!(
            bluray_title(disc.path()),
            Err(IdentifyError::DiscMetadata { .. })
        ));
    }

    #[test]
    fn test_clean_bluray_name_keeps_plain_dashes() {
        assert_eq!(clean_bluray_name("Mission - Impossible"), "Mission - Impossible");
        assert_eq!(clean_bluray_name("Up\u{2122} - Blu-ray\u{2122}"), "Up");
    }

    #[test]
    fn test_has_aacs() {
        let disc = TempDir::new().unwrap();
        assert!(!has_aacs(disc.path()));
        disc.child("AACS").create_dir_all().unwrap();
        assert!(has_aacs(disc.path()));
    }

    #[test]
    fn test_label_to_title() {
        assert_eq!(label_to_title("STAR_WARS__EP_IV"), "STAR WARS EP IV");
        assert_eq!(label_to_title("Plain Label"), "Plain Label");
    }

    #[test]
    fn test_tree_fingerprint_depends_on_layout() {
        let a = TempDir::new().unwrap();
        a.child("VIDEO_TS/VTS_01_1.VOB").write_str("abc").unwrap();
        a.child("VIDEO_TS/VIDEO_TS.IFO").write_str("i").unwrap();

        let b = TempDir::new().unwrap();
        b.child("VIDEO_TS/VIDEO_TS.IFO").write_str("i").unwrap();
        b.child("VIDEO_TS/VTS_01_1.VOB").write_str("abc").unwrap();

        let fa = tree_fingerprint(a.path()).unwrap();
        assert_eq!(fa, tree_fingerprint(b.path()).unwrap());
        assert_eq!(fa.len(), 64);

        b.child("VIDEO_TS/VTS_01_1.VOB").write_str("abcd").unwrap();
        assert_ne!(fa, tree_fingerprint(b.path()).unwrap());
    }

    #[tokio::test]
    async fn test_volume_label_from_blkid() {
        use crate::tools::{ToolOutput, ToolRunner};
        use std::sync::Arc;

        struct Blkid;

        #[async_trait::async_trait]
        impl ToolRunner for Blkid {
            async fn run(
                &self,
                command: &ToolCommand,
            ) -> Result<ToolOutput, crate::error::ToolError> {
                assert_eq!(command.program, "blkid");
                Ok(ToolOutput {
                    stdout: "STAR_WARS\n".to_string(),
                    stderr: String::new(),
                    code: Some(0),
                })
            }
        }

        let invoker = ToolInvoker::new(Arc::new(Blkid));
        assert_eq!(
            volume_label(&invoker, "/dev/sr0").await.as_deref(),
            Some("STAR_WARS")
        );
    }
}
