//! Transcoder doubles

use std::path::Path;

use async_trait::async_trait;
use chatline::backend::media::{MediaError, Transcoder};

/// Succeeds instantly with fixed metadata
pub struct FixedTranscoder;

pub const FIXED_WAVEFORM: [f32; 3] = [0.1, 0.5, 0.9];
pub const FIXED_DURATION: u32 = 4;

#[async_trait]
impl Transcoder for FixedTranscoder {
    async fn voice_waveform(&self, _voice: &Path) -> Result<Vec<f32>, MediaError> {
        Ok(FIXED_WAVEFORM.to_vec())
    }

    async fn video_duration(&self, _video: &Path) -> Result<u32, MediaError> {
        Ok(FIXED_DURATION)
    }

    async fn video_thumbnail(&self, _video: &Path, output: &Path) -> Result<(), MediaError> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output, b"jpeg").await?;
        Ok(())
    }
}

/// Every step fails, as when the tools are missing
pub struct BrokenTranscoder;

#[async_trait]
impl Transcoder for BrokenTranscoder {
    async fn voice_waveform(&self, _voice: &Path) -> Result<Vec<f32>, MediaError> {
        Err(MediaError::parse("audiowaveform", "no output"))
    }

    async fn video_duration(&self, _video: &Path) -> Result<u32, MediaError> {
        Err(MediaError::parse("ffprobe", "no duration"))
    }

    async fn video_thumbnail(&self, _video: &Path, _output: &Path) -> Result<(), MediaError> {
        Err(MediaError::parse("ffmpeg", "no frame"))
    }
}
