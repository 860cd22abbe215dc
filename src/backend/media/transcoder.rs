/**
 * Transcoding Collaborator
 *
 * Derived metadata comes from three external tools:
 *
 * - **ffmpeg** - voice to mono 44.1 kHz WAV, and a single JPEG frame at 0.5 s
 *   for video thumbnails
 * - **audiowaveform** - 10 samples per second at 8 bits from that WAV
 * - **ffprobe** - container duration of a video
 *
 * Every invocation runs under a timeout and the child is killed if it
 * expires. Failures surface as `MediaError` and are logged by the caller;
 * none of them is fatal to the message they belong to.
 */

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use super::MediaError;

/// Longest stderr excerpt kept in a `ToolFailed` error
const STDERR_EXCERPT: usize = 512;

/// Outcome of best-effort video processing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoMetadata {
    /// Whole seconds
    pub duration: Option<u32>,
    /// Whether a thumbnail was written to the requested path
    pub thumbnail_written: bool,
}

/// Derives metadata from stored media files
#[async_trait]
pub trait Transcoder: Send + Sync + 'static {
    /// Amplitude samples for a voice clip
    async fn voice_waveform(&self, voice: &Path) -> Result<Vec<f32>, MediaError>;

    /// Duration of a video in whole seconds
    async fn video_duration(&self, video: &Path) -> Result<u32, MediaError>;

    /// Write a single-frame JPEG thumbnail of `video` to `output`
    async fn video_thumbnail(&self, video: &Path, output: &Path) -> Result<(), MediaError>;

    /// Run both video steps, logging and absorbing failures of either
    async fn video_metadata(&self, video: &Path, thumbnail: &Path) -> VideoMetadata {
        let duration = match self.video_duration(video).await {
            Ok(secs) => Some(secs),
            Err(e) => {
                warn!("[Media] Video duration failed for {}: {}", video.display(), e);
                None
            }
        };
        let thumbnail_written = match self.video_thumbnail(video, thumbnail).await {
            Ok(()) => true,
            Err(e) => {
                warn!("[Media] Video thumbnail failed for {}: {}", video.display(), e);
                false
            }
        };
        VideoMetadata {
            duration,
            thumbnail_written,
        }
    }
}

/// `Transcoder` shelling out to ffmpeg, ffprobe and audiowaveform
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    audiowaveform: PathBuf,
    timeout: Duration,
    max_samples: usize,
}

impl FfmpegTranscoder {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
    pub const DEFAULT_MAX_SAMPLES: usize = 256;

    pub fn new(
        ffmpeg: impl Into<PathBuf>,
        ffprobe: impl Into<PathBuf>,
        audiowaveform: impl Into<PathBuf>,
    ) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            audiowaveform: audiowaveform.into(),
            timeout: Self::DEFAULT_TIMEOUT,
            max_samples: Self::DEFAULT_MAX_SAMPLES,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = max_samples.max(1);
        self
    }

    /// Run `program` to completion and return its stdout
    async fn run<I, S>(&self, program: &Path, args: I) -> Result<Vec<u8>, MediaError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let tool = tool_name(program);
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("[Media] Running {}", tool);
        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => return Err(MediaError::Spawn { tool, source }),
            Err(_) => {
                return Err(MediaError::Timeout {
                    tool,
                    secs: self.timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let excerpt: String = stderr.chars().take(STDERR_EXCERPT).collect();
            return Err(MediaError::ToolFailed {
                tool,
                status: output.status.to_string(),
                stderr: excerpt,
            });
        }
        Ok(output.stdout)
    }
}

fn tool_name(program: &Path) -> String {
    program
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("transcoder")
        .to_string()
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn voice_waveform(&self, voice: &Path) -> Result<Vec<f32>, MediaError> {
        let wav = voice.with_extension("wav");
        let json = voice.with_extension("json");

        let result = async {
            self.run(
                &self.ffmpeg,
                [
                    OsStr::new("-y"),
                    OsStr::new("-i"),
                    voice.as_os_str(),
                    OsStr::new("-ac"),
                    OsStr::new("1"),
                    OsStr::new("-ar"),
                    OsStr::new("44100"),
                    wav.as_os_str(),
                ],
            )
            .await?;
            self.run(
                &self.audiowaveform,
                [
                    OsStr::new("-i"),
                    wav.as_os_str(),
                    OsStr::new("-o"),
                    json.as_os_str(),
                    OsStr::new("--pixels-per-second"),
                    OsStr::new("10"),
                    OsStr::new("--bits"),
                    OsStr::new("8"),
                ],
            )
            .await?;
            let raw = tokio::fs::read(&json).await?;
            parse_waveform(&raw)
        }
        .await;

        // Intermediate files are scratch space either way
        for scratch in [&wav, &json] {
            let _ = tokio::fs::remove_file(scratch).await;
        }

        Ok(downsample(&result?, self.max_samples))
    }

    async fn video_duration(&self, video: &Path) -> Result<u32, MediaError> {
        let stdout = self
            .run(
                &self.ffprobe,
                [
                    OsStr::new("-v"),
                    OsStr::new("error"),
                    OsStr::new("-show_entries"),
                    OsStr::new("format=duration"),
                    OsStr::new("-of"),
                    OsStr::new("default=noprint_wrappers=1:nokey=1"),
                    video.as_os_str(),
                ],
            )
            .await?;
        parse_duration_secs(&String::from_utf8_lossy(&stdout))
    }

    async fn video_thumbnail(&self, video: &Path, output: &Path) -> Result<(), MediaError> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.run(
            &self.ffmpeg,
            [
                OsStr::new("-y"),
                OsStr::new("-ss"),
                OsStr::new("00:00:00.500"),
                OsStr::new("-i"),
                video.as_os_str(),
                OsStr::new("-frames:v"),
                OsStr::new("1"),
                OsStr::new("-q:v"),
                OsStr::new("3"),
                output.as_os_str(),
            ],
        )
        .await?;

        if tokio::fs::try_exists(output).await? {
            Ok(())
        } else {
            Err(MediaError::parse("ffmpeg", "no thumbnail frame was written"))
        }
    }
}

#[derive(Deserialize)]
struct WaveformFile {
    data: Vec<i64>,
}

/// Normalize audiowaveform JSON output: each value over 255, two decimals
pub fn parse_waveform(raw: &[u8]) -> Result<Vec<f32>, MediaError> {
    let file: WaveformFile = serde_json::from_slice(raw)
        .map_err(|e| MediaError::parse("audiowaveform", e.to_string()))?;
    Ok(file
        .data
        .into_iter()
        .map(|x| ((x as f64 / 255.0) * 100.0).round() as f32 / 100.0)
        .collect())
}

/// Bound `samples` to `max` entries, keeping the strongest value of each bucket
pub fn downsample(samples: &[f32], max: usize) -> Vec<f32> {
    if max == 0 || samples.len() <= max {
        return samples.to_vec();
    }
    let len = samples.len();
    (0..max)
        .map(|i| {
            let start = i * len / max;
            let end = ((i + 1) * len / max).max(start + 1);
            samples[start..end]
                .iter()
                .copied()
                .fold(0.0_f32, |acc, x| if x.abs() > acc.abs() { x } else { acc })
        })
        .collect()
}

/// ffprobe prints fractional seconds; round through milliseconds to whole seconds
pub fn parse_duration_secs(stdout: &str) -> Result<u32, MediaError> {
    let trimmed = stdout.trim();
    let secs: f64 = trimmed
        .parse()
        .map_err(|_| MediaError::parse("ffprobe", format!("duration `{}`", trimmed)))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(MediaError::parse("ffprobe", format!("duration `{}`", trimmed)));
    }
    let millis = (secs * 1000.0) as u64;
    u32::try_from((millis + 500) / 1000)
        .map_err(|_| MediaError::parse("ffprobe", "duration out of range"))
}
