use crate::config::PipelineConfig;
use crate::encoder::{CodecPreference, Container, EncoderSettings};
use crate::resolution::{DEFAULT_TOKEN, resolve};
use crate::retry::RetryPolicy;
use crate::subtitle::SubtitleStyle;
use crate::tts::{DEFAULT_SPEECH_RATE, Voice};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsBackend {
    /// Local piper process
    Piper,
    /// Remote service answering POST requests with WAV
    Http,
}

/// Turn a PDF deck and a narration CSV into a narrated video.
#[derive(Parser, Debug)]
#[clap(version)]
pub struct Args {
    /// A PDF file, or a directory whose PDFs are each turned into a video
    pub input: PathBuf,

    /// Narration CSV (`index,script`); defaults to `<pdf stem>.csv` next to each PDF
    #[clap(long)]
    pub script: Option<PathBuf>,

    #[clap(long, default_value = "./out")]
    pub output: PathBuf,

    /// 720, 1080 or 1440, with or without a trailing `p`
    #[clap(long, default_value = DEFAULT_TOKEN)]
    pub resolution: String,

    #[clap(long, value_enum, default_value = "webm")]
    pub format: Container,

    /// VP8/H.264 when true, VP9/H.265 when false; accepts 1/0, yes/no, on/off
    #[clap(
        long,
        env = "USE_FAST_CODEC",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        default_value = "true"
    )]
    pub fast: bool,

    #[clap(long, env = "OUTPUT_FPS", default_value_t = 30)]
    pub fps: u32,

    #[clap(long, env = "VP_CPU_USED", default_value_t = 8)]
    pub cpu_used: u8,

    #[clap(long, env = "VIDEO_CRF")]
    pub crf: Option<u8>,

    #[clap(long, env = "X26X_PRESET", default_value = "veryfast")]
    pub preset: String,

    /// Encoder threads; defaults to the available parallelism
    #[clap(long)]
    pub threads: Option<usize>,

    /// Seconds a slide without narration stays on screen
    #[clap(long, env = "SILENCE_SLIDE_DURATION", default_value_t = 5.0)]
    pub silence_duration: f64,

    /// Rasterization scale relative to 72 dpi
    #[clap(long, env = "SLIDE_RENDER_SCALE", default_value_t = 1.5)]
    pub render_scale: f64,

    #[clap(long)]
    pub no_subtitles: bool,

    #[clap(long, env = "SUBTITLE_MARGIN_V", default_value_t = 10)]
    pub subtitle_margin_v: u32,

    /// Numpad-style position, 1..=9
    #[clap(long, env = "SUBTITLE_ALIGNMENT", default_value_t = 2)]
    pub subtitle_alignment: u8,

    #[clap(long, value_enum, env = "SVM_VOICE", default_value = "female")]
    pub voice: Voice,

    /// Speaking rate; 1.0 is the engine's natural speed
    #[clap(long, env = "SPEECH_RATE", default_value_t = DEFAULT_SPEECH_RATE)]
    pub speech_rate: f64,

    /// Optional `word,alias` CSV applied before synthesis
    #[clap(long)]
    pub pronounce_dict: Option<PathBuf>,

    #[clap(long, value_enum, default_value = "piper")]
    pub tts: TtsBackend,

    #[clap(long, default_value = "piper")]
    pub piper_bin: String,

    #[clap(long, default_value = "./tts/ja_JP-female-medium.onnx")]
    pub piper_model_female: String,

    #[clap(long, default_value = "./tts/ja_JP-male-medium.onnx")]
    pub piper_model_male: String,

    #[clap(long, env = "TTS_ENDPOINT", default_value = "http://127.0.0.1:5002/tts")]
    pub tts_endpoint: String,

    #[clap(long, default_value = "ja-JP-NanamiNeural")]
    pub tts_voice_female: String,

    #[clap(long, default_value = "ja-JP-KeitaNeural")]
    pub tts_voice_male: String,

    #[clap(long, default_value_t = 60)]
    pub tts_timeout_secs: u64,

    #[clap(long, default_value_t = 3)]
    pub tts_retries: u32,

    #[clap(long, default_value_t = 500)]
    pub tts_retry_delay_ms: u64,

    #[clap(long, default_value_t = 4)]
    pub max_concurrent_tts: usize,

    #[clap(long, default_value = "ffmpeg")]
    pub ffmpeg: String,

    /// Print a JSON summary of each generated video on stdout
    #[clap(long)]
    pub json: bool,
}

impl Args {
    /// Narration CSV for one PDF.
    pub fn script_for(&self, pdf: &Path) -> PathBuf {
        match &self.script {
            Some(path) => path.clone(),
            None => pdf.with_extension("csv"),
        }
    }

    pub fn to_config(&self, pdf: &Path) -> PipelineConfig {
        let mut encoder = EncoderSettings {
            preference: CodecPreference::from_fast(self.fast),
            frame_rate: self.fps,
            cpu_used: self.cpu_used,
            crf: self.crf,
            preset: self.preset.clone(),
            ..EncoderSettings::default()
        };
        if let Some(threads) = self.threads {
            encoder.threads = threads;
        }

        PipelineConfig {
            pdf_path: pdf.to_path_buf(),
            script_path: self.script_for(pdf),
            output_dir: self.output.clone(),
            pronounce_dict: self.pronounce_dict.clone(),
            resolution: resolve(&self.resolution),
            container: self.format,
            encoder,
            silence_duration: self.silence_duration,
            render_scale: self.render_scale,
            subtitles: (!self.no_subtitles)
                .then(|| SubtitleStyle::new(self.subtitle_margin_v, self.subtitle_alignment)),
            voice: self.voice,
            speech_rate: self.speech_rate,
            retry: RetryPolicy {
                max_attempts: self.tts_retries,
                base_delay: Duration::from_millis(self.tts_retry_delay_ms),
            },
            max_concurrent_tts: self.max_concurrent_tts,
        }
    }

    pub fn tts_timeout(&self) -> Duration {
        Duration::from_secs(self.tts_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_produce_a_valid_config() {
        let args = Args::try_parse_from(["slidevoice", "decks/intro.pdf"]).unwrap();
        let cfg = args.to_config(Path::new("decks/intro.pdf"));

        assert_eq!(cfg.script_path, PathBuf::from("decks/intro.csv"));
        assert_eq!(cfg.resolution.width, 1280);
        assert_eq!(cfg.container, Container::Webm);
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.retry.base_delay, Duration::from_millis(500));
        assert_eq!(cfg.max_concurrent_tts, 4);
        assert_eq!(cfg.speech_rate, 1.5);
        assert_eq!(cfg.encoder.preference, CodecPreference::Fast);
        assert!(cfg.subtitles.is_some());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn flags_override_defaults() {
        let args = Args::try_parse_from([
            "slidevoice",
            "deck.pdf",
            "--script",
            "narration.csv",
            "--resolution",
            "1440p",
            "--format",
            "mp4",
            "--fast",
            "false",
            "--crf",
            "30",
            "--threads",
            "3",
            "--voice",
            "male",
            "--speech-rate",
            "1.2",
            "--no-subtitles",
        ])
        .unwrap();
        let cfg = args.to_config(Path::new("deck.pdf"));

        assert_eq!(cfg.script_path, PathBuf::from("narration.csv"));
        assert_eq!((cfg.resolution.width, cfg.resolution.height), (2560, 1440));
        assert_eq!(cfg.container, Container::Mp4);
        assert_eq!(cfg.encoder.preference, CodecPreference::Quality);
        assert_eq!(cfg.encoder.crf, Some(30));
        assert_eq!(cfg.encoder.threads, 3);
        assert_eq!(cfg.voice, Voice::Male);
        assert_eq!(cfg.speech_rate, 1.2);
        assert!(cfg.subtitles.is_none());
    }

    #[test]
    fn fast_switch_accepts_numeric_flags() {
        for (value, expected) in [
            ("1", CodecPreference::Fast),
            ("0", CodecPreference::Quality),
            ("no", CodecPreference::Quality),
            ("on", CodecPreference::Fast),
        ] {
            let args = Args::try_parse_from(["slidevoice", "deck.pdf", "--fast", value]).unwrap();
            let cfg = args.to_config(Path::new("deck.pdf"));
            assert_eq!(cfg.encoder.preference, expected, "--fast {value}");
        }
        assert!(Args::try_parse_from(["slidevoice", "deck.pdf", "--fast", "maybe"]).is_err());
    }

    #[test]
    fn bad_alignment_is_absorbed() {
        let args =
            Args::try_parse_from(["slidevoice", "deck.pdf", "--subtitle-alignment", "0"]).unwrap();
        let cfg = args.to_config(Path::new("deck.pdf"));
        assert_eq!(cfg.subtitles.map(|s| s.alignment), Some(2));
    }
}
