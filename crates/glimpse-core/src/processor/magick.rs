//! Backend that shells out to an ImageMagick-compatible tool.
//!
//! Covers raw camera files, HEIC/AVIF, PSD and other formats the pure-Rust
//! decoders cannot read. All renditions of one source are produced by a
//! single process: each size is written with `-write` and processing
//! continues from that intermediate.

use async_trait::async_trait;
use std::borrow::Cow;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{Capabilities, ImageProcessor, ToolStatus};
use crate::config::ExternalToolConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::thumbnail::all_exist;
use crate::types::{CropRect, ImageProcessResult, ThumbTarget};

const EXTENSIONS: &[&str] = &[
    ".heic", ".heif", ".avif", ".jxl", ".cr2", ".cr3", ".nef", ".arw", ".dng", ".orf", ".rw2",
    ".raf", ".psd", ".svg", ".tif", ".tiff",
];

/// External-process backend. Never computes a content hash.
pub struct MagickProcessor {
    program: String,
    status: ToolStatus,
    quality: u8,
    timeout: Duration,
}

impl MagickProcessor {
    pub fn new(config: &ExternalToolConfig, status: ToolStatus, quality: u8, timeout_ms: u64) -> Self {
        Self {
            program: config.program.clone(),
            status,
            quality,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    pub fn status(&self) -> &ToolStatus {
        &self.status
    }

    /// Arguments for one invocation producing every target, largest first.
    ///
    /// Plain sizes shrink the running image in place (`>` never enlarges).
    /// Cropped sizes fill then trim a clone, so the running image stays uncropped.
    pub fn thumbnail_args(source: &Path, targets: &[ThumbTarget], quality: u8) -> Vec<OsString> {
        let mut ordered: Vec<&ThumbTarget> = targets.iter().collect();
        ordered.sort_by(|a, b| b.config.width.cmp(&a.config.width));

        let mut args: Vec<OsString> = vec![
            source.as_os_str().to_owned(),
            "-auto-orient".into(),
            "-strip".into(),
            "-quality".into(),
            quality.to_string().into(),
        ];

        for target in ordered {
            let (w, h) = (target.config.width, target.config.height);
            if target.config.crop_to_ratio {
                args.extend(
                    [
                        "(".to_string(),
                        "+clone".to_string(),
                        "-thumbnail".to_string(),
                        format!("{w}x{h}^"),
                        "-gravity".to_string(),
                        "center".to_string(),
                        "-extent".to_string(),
                        format!("{w}x{h}"),
                        "-write".to_string(),
                    ]
                    .map(OsString::from),
                );
                args.push(target.destination.as_os_str().to_owned());
                args.extend(["+delete", ")"].map(OsString::from));
            } else {
                args.extend(
                    ["-thumbnail".to_string(), format!("{w}x{h}>"), "-write".to_string()]
                        .map(OsString::from),
                );
                args.push(target.destination.as_os_str().to_owned());
            }
        }

        args.push("null:".into());
        args
    }

    /// Arguments for an oriented crop written as JPEG.
    pub fn crop_args(source: &Path, rect: CropRect, destination: &Path, quality: u8) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            source.as_os_str().to_owned(),
            "-auto-orient".into(),
            "-crop".into(),
            format!("{}x{}+{}+{}", rect.width, rect.height, rect.x, rect.y).into(),
            "+repage".into(),
            "-quality".into(),
            quality.to_string().into(),
        ];
        let mut out = OsString::from("jpg:");
        out.push(destination.as_os_str());
        args.push(out);
        args
    }

    fn command_line(&self, args: &[OsString]) -> String {
        std::iter::once(Cow::Borrowed(self.program.as_str()))
            .chain(args.iter().map(|a| a.to_string_lossy()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run the tool, bounded by the configured timeout. The child is killed
    /// if the wait is abandoned.
    async fn run(&self, source: &Path, args: Vec<OsString>) -> PipelineResult<()> {
        if !self.status.available {
            return Err(PipelineError::ToolUnavailable(self.program.clone()));
        }

        let command_line = self.command_line(&args);
        tracing::debug!("Running {command_line}");

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(PipelineError::ToolUnavailable(format!("{}: {e}", self.program)))
            }
            Err(_) => {
                tracing::error!("Timed out after {:?}: {command_line}", self.timeout);
                return Err(PipelineError::Timeout {
                    path: source.to_path_buf(),
                    stage: "external tool".to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::error!("External tool failed ({}): {command_line}\n{stderr}", output.status);
            return Err(PipelineError::ExternalTool {
                command: command_line,
                status: output.status.code().unwrap_or(-1),
                stderr,
            });
        }
        Ok(())
    }
}

fn create_parent_dirs(paths: &[&Path]) -> PipelineResult<()> {
    for parent in paths.iter().filter_map(|p| p.parent()) {
        std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }
    Ok(())
}

#[async_trait]
impl ImageProcessor for MagickProcessor {
    fn name(&self) -> &'static str {
        "magick"
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        EXTENSIONS
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            thumbnails: true,
            content_hash: false,
            crop: true,
            transform: false,
        }
    }

    fn is_available(&self) -> bool {
        self.status.available
    }

    async fn create_thumbs(
        &self,
        source: &Path,
        targets: &[ThumbTarget],
    ) -> PipelineResult<ImageProcessResult> {
        if all_exist(targets) {
            tracing::debug!("All thumbnails exist for {:?}, skipping", source);
            return Ok(ImageProcessResult::default());
        }

        let destinations: Vec<&Path> = targets.iter().map(|t| t.destination.as_path()).collect();
        create_parent_dirs(&destinations)?;
        let fresh: Vec<PathBuf> = destinations
            .iter()
            .filter(|p| !p.exists())
            .map(|p| p.to_path_buf())
            .collect();

        let args = Self::thumbnail_args(source, targets, self.quality);
        if let Err(e) = self.run(source, args).await {
            // a failed batch leaves nothing behind that looks finished
            for path in &fresh {
                let _ = std::fs::remove_file(path);
            }
            return Err(e);
        }

        Ok(ImageProcessResult {
            thumbs_generated: true,
            content_hash: String::new(),
        })
    }

    async fn crop_image(
        &self,
        source: &Path,
        rect: CropRect,
        destination: &Path,
    ) -> PipelineResult<()> {
        create_parent_dirs(&[destination])?;
        let args = Self::crop_args(source, rect, destination, self.quality);
        self.run(source, args).await
    }
}
