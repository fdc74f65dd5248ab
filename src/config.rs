use crate::encoder::{Container, EncoderSettings};
use crate::error::ConfigError;
use crate::resolution::Resolution;
use crate::retry::RetryPolicy;
use crate::subtitle::SubtitleStyle;
use crate::tts::Voice;
use std::path::PathBuf;

/// Everything one project run needs, resolved once from the command line.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub pdf_path: PathBuf,
    pub script_path: PathBuf,
    pub output_dir: PathBuf,
    pub pronounce_dict: Option<PathBuf>,
    pub resolution: Resolution,
    pub container: Container,
    pub encoder: EncoderSettings,
    /// Display time of slides without narration.
    pub silence_duration: f64,
    pub render_scale: f64,
    /// `None` disables burned-in subtitles.
    pub subtitles: Option<SubtitleStyle>,
    pub voice: Voice,
    /// 1.0 is the engine's natural speed.
    pub speech_rate: f64,
    pub retry: RetryPolicy,
    pub max_concurrent_tts: usize,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.silence_duration.is_finite() && self.silence_duration > 0.0) {
            return Err(ConfigError::SilenceDuration(self.silence_duration));
        }
        if !(self.render_scale.is_finite() && self.render_scale > 0.0) {
            return Err(ConfigError::RenderScale(self.render_scale));
        }
        if !(self.speech_rate.is_finite() && self.speech_rate > 0.0) {
            return Err(ConfigError::SpeechRate(self.speech_rate));
        }
        if self.encoder.frame_rate == 0 {
            return Err(ConfigError::FrameRate);
        }
        if self.max_concurrent_tts == 0 {
            return Err(ConfigError::Concurrency);
        }
        Ok(())
    }

    /// Project key: the PDF file stem.
    pub fn project_key(&self) -> String {
        self.pdf_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string())
    }

    pub fn workspace_root(&self) -> PathBuf {
        self.output_dir.join("temp")
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", self.project_key(), self.container.extension()))
    }
}
