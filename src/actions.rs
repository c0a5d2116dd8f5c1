//! Copy and export side actions, plus the platform seams they go through.
//!
//! Rerun lives on the session since it is only a `schedule` call plus a report.

use std::cell::RefCell;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::rc::Rc;

use chrono::{DateTime, Utc};

use crate::error::SandboxError;
use crate::host::HandleProvider;
use crate::raster::ImageRequest;

/// Platform clipboard.
pub trait Clipboard {
    fn write_text(&self, text: &str) -> Result<(), String>;
}

/// Platform download target for exported images.
pub trait Downloader {
    /// Store `bytes` under `filename`, returning where they ended up.
    fn save(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, String>;
}

/// Export filename for an image taken at `at`: `echarts-<epoch ms>.jpg`.
pub fn export_filename(at: DateTime<Utc>) -> String {
    format!("echarts-{}.jpg", at.timestamp_millis())
}

pub fn copy_script(clipboard: &dyn Clipboard, text: &str) -> Result<(), SandboxError> {
    clipboard.write_text(text).map_err(SandboxError::ClipboardFailure)?;
    log::debug!("copied {} bytes to clipboard", text.len());
    Ok(())
}

/// Snapshot the live chart as a 2x JPEG on white and hand it to `downloader`.
/// Reads chart state only. Returns the filename used.
pub fn export_chart<P: HandleProvider + ?Sized>(
    provider: &P,
    downloader: &dyn Downloader,
    at: DateTime<Utc>,
) -> Result<String, SandboxError> {
    let chart = provider.current().ok_or(SandboxError::HandleNotReady)?;
    let image = chart
        .snapshot(&ImageRequest::export())
        .map_err(SandboxError::ExportFailure)?;

    let filename = export_filename(at);
    let path = downloader
        .save(&filename, &image.bytes)
        .map_err(SandboxError::ExportFailure)?;
    log::info!(
        "exported {}x{} image to {:?} ({} bytes)",
        image.width,
        image.height,
        path,
        image.bytes.len()
    );
    Ok(filename)
}

/// Clipboard backed by an external program that reads the text on stdin,
/// such as `wl-copy` or `xclip -selection clipboard`.
#[derive(Debug, Clone)]
pub struct CommandClipboard {
    argv: Vec<String>,
}

impl CommandClipboard {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

impl Clipboard for CommandClipboard {
    fn write_text(&self, text: &str) -> Result<(), String> {
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| "clipboard command is empty".to_string())?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("failed to run {}: {}", program, e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .map_err(|e| format!("failed to write to {}: {}", program, e))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| format!("failed to wait for {}: {}", program, e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("{} exited with {}: {}", program, output.status, stderr.trim()));
        }
        Ok(())
    }
}

/// Used when no clipboard command is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableClipboard;

impl Clipboard for UnavailableClipboard {
    fn write_text(&self, _text: &str) -> Result<(), String> {
        Err("no clipboard available (set clipboardCommand in the config)".to_string())
    }
}

/// In-process clipboard. Clones share contents.
#[derive(Debug, Default, Clone)]
pub struct MemoryClipboard {
    contents: Rc<RefCell<Option<String>>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Option<String> {
        self.contents.borrow().clone()
    }
}

impl Clipboard for MemoryClipboard {
    fn write_text(&self, text: &str) -> Result<(), String> {
        *self.contents.borrow_mut() = Some(text.to_string());
        Ok(())
    }
}

/// Writes downloads into a directory, creating it on first use.
#[derive(Debug, Clone)]
pub struct DirectoryDownloader {
    dir: PathBuf,
}

impl DirectoryDownloader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Downloader for DirectoryDownloader {
    fn save(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, String> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| format!("failed to create {:?}: {}", self.dir, e))?;
        let path = self.dir.join(filename);
        std::fs::write(&path, bytes).map_err(|e| format!("failed to write {:?}: {}", path, e))?;
        Ok(path)
    }
}
