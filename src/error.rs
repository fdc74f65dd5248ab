use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single speech synthesis attempt.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("failed to spawn TTS engine '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("TTS engine exited with {0}")]
    EngineExit(String),

    #[error("TTS request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TTS service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("TTS produced no audio")]
    EmptyAudio,

    #[error("TTS audio is not a readable WAV: {0}")]
    Decode(#[from] hound::Error),

    #[error("I/O error while writing audio: {0}")]
    Io(#[from] std::io::Error),
}

impl SynthesisError {
    /// Whether another attempt has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            SynthesisError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            SynthesisError::Status { status, .. } => *status == 429 || *status >= 500,
            SynthesisError::EngineExit(_) => true,
            SynthesisError::Io(_) => true,
            SynthesisError::Spawn { .. } | SynthesisError::EmptyAudio | SynthesisError::Decode(_) => {
                false
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("script file not found: {0}")]
    NotFound(PathBuf),

    #[error("{0} is neither UTF-8 nor Shift_JIS text")]
    Encoding(PathBuf),

    #[error("script CSV must have columns: {0}")]
    MissingColumns(&'static str),

    #[error("failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to read script: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to run '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("'{program}' failed ({status}): {stderr}")]
    Tool {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("could not determine page count of {0}")]
    PageCount(PathBuf),

    #[error("renderer did not produce {0}")]
    MissingOutput(PathBuf),
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to spawn encoder '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("encoder failed ({status}): {stderr}")]
    Failed { status: String, stderr: String },

    #[error("failed to write encoder input: {0}")]
    Io(#[from] std::io::Error),
}

/// Settings rejected before any work starts.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("silence duration must be positive, got {0}")]
    SilenceDuration(f64),

    #[error("render scale must be positive, got {0}")]
    RenderScale(f64),

    #[error("speech rate must be positive, got {0}")]
    SpeechRate(f64),

    #[error("frame rate must be at least 1")]
    FrameRate,

    #[error("at least one concurrent TTS request is required")]
    Concurrency,
}

/// Errors that abort a run. Each variant names the stage and, where relevant, the slide.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("input not found: {0}")]
    MissingInput(PathBuf),

    #[error("script source {path}: {source}")]
    Script { path: PathBuf, source: ScriptError },

    #[error("failed to inspect {pdf}: {source}")]
    Inspect { pdf: PathBuf, source: RenderError },

    #[error("failed to render page {page}: {source}")]
    Render { page: usize, source: RenderError },

    #[error("document has no pages: {0}")]
    NoSlides(PathBuf),

    #[error("speech synthesis failed for slide {slide} after {attempts} attempt(s): {source}")]
    Synthesis {
        slide: usize,
        attempts: u32,
        source: SynthesisError,
    },

    #[error("slide {slide} has no usable duration ({duration})")]
    InvalidDuration { slide: usize, duration: f64 },

    #[error("failed to write silence audio for slide {slide}: {source}")]
    Silence { slide: usize, source: hound::Error },

    #[error("encoding failed: {0}")]
    Encode(#[from] EncodeError),

    #[error("workspace error: {0}")]
    Io(#[from] std::io::Error),
}
