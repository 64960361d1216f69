use super::json3::parse_json3_file;
use super::{extract_video_id, TranscriptSource, VideoMetadata};
use crate::config::DownloaderConfig;
use crate::error::{CoachError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tracing::{debug, info};

/// Subset of `yt-dlp --dump-json` output we care about
#[derive(Debug, Deserialize)]
struct DumpJson {
    #[serde(default)]
    id: String,
    title: Option<String>,
    uploader: Option<String>,
    duration: Option<f64>,
    upload_date: Option<String>,
    description: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// Which subtitle track to ask yt-dlp for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubtitleKind {
    Auto,
    Manual,
}

impl SubtitleKind {
    fn flag(self) -> &'static str {
        match self {
            SubtitleKind::Auto => "--write-auto-subs",
            SubtitleKind::Manual => "--write-subs",
        }
    }
}

/// Transcript source backed by the `yt-dlp` command line tool
pub struct YtDlpSource {
    config: DownloaderConfig,
}

impl YtDlpSource {
    pub fn new(config: DownloaderConfig) -> Self {
        Self { config }
    }

    async fn run(&self, args: &[&str], timeout_secs: u64) -> Result<Output> {
        let child = tokio::process::Command::new(&self.config.binary)
            .args(args)
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(Duration::from_secs(timeout_secs), child).await {
            Ok(output) => Ok(output?),
            Err(_) => Err(CoachError::Downloader(format!(
                "{} timed out after {}s",
                self.config.binary, timeout_secs
            ))),
        }
    }

    async fn fetch_metadata(&self, url: &str) -> Result<VideoMetadata> {
        let output = self
            .run(&["--skip-download", "--dump-json", url], self.config.metadata_timeout_seconds)
            .await?;

        if !output.status.success() {
            return Err(CoachError::Downloader(format!(
                "metadata query failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let first_line = stdout.lines().next().unwrap_or_default();
        let dump: DumpJson = serde_json::from_str(first_line)?;

        Ok(VideoMetadata {
            title: dump.title.unwrap_or_else(|| "Unknown".to_string()),
            author: dump.uploader.unwrap_or_else(|| "Unknown".to_string()),
            duration: dump.duration.map(|d| d.max(0.0) as u64).unwrap_or(0),
            upload_date: dump.upload_date,
            description: dump.description.unwrap_or_default(),
            tags: dump.tags.unwrap_or_default(),
            url: url.to_string(),
            video_id: dump.id,
        })
    }

    /// Download one subtitle track into a scratch directory and parse it
    async fn try_download(&self, url: &str, lang: &str, kind: SubtitleKind) -> Result<Option<String>> {
        let scratch = tempfile::tempdir()?;
        let template = scratch.path().join("%(id)s.%(ext)s");
        let template = template.to_string_lossy().into_owned();

        let output = self
            .run(
                &[
                    "--skip-download",
                    kind.flag(),
                    "--sub-langs",
                    lang,
                    "--sub-format",
                    "json3",
                    "-o",
                    template.as_str(),
                    url,
                ],
                self.config.subtitle_timeout_seconds,
            )
            .await?;

        if !output.status.success() {
            return Ok(None);
        }

        let Some(path) = find_subtitle_file(scratch.path())? else {
            return Ok(None);
        };

        let transcript = parse_json3_file(&path).await.unwrap_or_else(|e| {
            debug!("Failed to parse subtitles {}: {}", path.display(), e);
            String::new()
        });

        Ok(Some(transcript).filter(|t| !t.is_empty()))
    }

    /// Title and description stand in for a transcript when no captions exist
    async fn video_info_fallback(&self, url: &str) -> Option<String> {
        let output = self
            .run(
                &["--skip-download", "--print", "%(title)s\n%(description)s", url],
                self.config.metadata_timeout_seconds,
            )
            .await
            .ok()?;

        if output.status.success() {
            Some(format!(
                "# No transcript available\n\n{}",
                String::from_utf8_lossy(&output.stdout)
            ))
        } else {
            None
        }
    }
}

fn find_subtitle_file(dir: &Path) -> Result<Option<PathBuf>> {
    let mut found: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json3"))
        .collect();
    found.sort();
    Ok(found.into_iter().next())
}

#[async_trait]
impl TranscriptSource for YtDlpSource {
    async fn metadata(&self, url: &str) -> VideoMetadata {
        match self.fetch_metadata(url).await {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!("Failed to get metadata: {}", e);
                VideoMetadata::unknown(url)
            }
        }
    }

    async fn transcript(&self, url: &str) -> Result<Option<String>> {
        let video_id = extract_video_id(url)?;
        debug!("Fetching transcript for video {}", video_id);

        for lang in &self.config.languages {
            for kind in [SubtitleKind::Auto, SubtitleKind::Manual] {
                match self.try_download(url, lang, kind).await {
                    Ok(Some(transcript)) => {
                        info!("📝 Found {:?} subtitles ({})", kind, lang);
                        return Ok(Some(transcript));
                    }
                    Ok(None) => {}
                    Err(e) => debug!("Failed to download {} {:?} subs: {}", lang, kind, e),
                }
            }
        }

        Ok(self.video_info_fallback(url).await)
    }
}
