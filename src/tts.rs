use crate::error::SynthesisError;
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, info};

#[derive(clap::ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Voice {
    #[default]
    Female,
    Male,
}

impl std::fmt::Display for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Voice::Female => write!(f, "female"),
            Voice::Male => write!(f, "male"),
        }
    }
}

/// Speaking rate where 1.0 is the engine's natural speed.
pub const DEFAULT_SPEECH_RATE: f64 = 1.5;

/// Text-to-speech backend. Implementations write a WAV clip to `out_path`.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice: Voice,
        rate: f64,
        out_path: &Path,
    ) -> Result<PathBuf, SynthesisError>;
}

fn ensure_nonempty(path: &Path) -> Result<PathBuf, SynthesisError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => Ok(path.to_path_buf()),
        _ => Err(SynthesisError::EmptyAudio),
    }
}

fn stderr_tail(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let lines: Vec<&str> = text.trim().lines().collect();
    lines[lines.len().saturating_sub(5)..].join("\n")
}

/// Local Piper TTS, one ONNX model per voice. Text is fed on stdin.
pub struct PiperSynthesizer {
    program: String,
    female_model: String,
    male_model: String,
}

impl PiperSynthesizer {
    pub fn new(program: String, female_model: String, male_model: String) -> Self {
        Self {
            program,
            female_model,
            male_model,
        }
    }

    fn model(&self, voice: Voice) -> &str {
        match voice {
            Voice::Female => &self.female_model,
            Voice::Male => &self.male_model,
        }
    }

    fn command_args(&self, voice: Voice, rate: f64, out_path: &Path) -> Vec<String> {
        vec![
            "--model".to_string(),
            self.model(voice).to_string(),
            // Piper stretches phoneme length; 1/rate speeds speech up.
            "--length_scale".to_string(),
            format!("{:.3}", 1.0 / rate),
            "--output_file".to_string(),
            out_path.to_string_lossy().into_owned(),
        ]
    }
}

#[async_trait]
impl Synthesizer for PiperSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        voice: Voice,
        rate: f64,
        out_path: &Path,
    ) -> Result<PathBuf, SynthesisError> {
        debug!("Calling Piper TTS for output file {}", out_path.display());

        let mut child = Command::new(&self.program)
            .args(self.command_args(voice, rate, out_path))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SynthesisError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            error!("Piper TTS command failed for {}", out_path.display());
            return Err(SynthesisError::EngineExit(format!(
                "{}: {}",
                output.status,
                stderr_tail(&output.stderr)
            )));
        }

        ensure_nonempty(out_path)
    }
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    voice: &'a str,
    rate: f64,
    format: &'a str,
}

/// Remote TTS service: `POST {text, voice, rate, format: "wav"}` answered with WAV bytes.
pub struct HttpSynthesizer {
    client: reqwest::Client,
    endpoint: String,
    female_voice: String,
    male_voice: String,
}

impl HttpSynthesizer {
    pub fn new(
        endpoint: String,
        female_voice: String,
        male_voice: String,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent("slidevoice/0.1")
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint,
            female_voice,
            male_voice,
        })
    }

    fn voice_name(&self, voice: Voice) -> &str {
        match voice {
            Voice::Female => &self.female_voice,
            Voice::Male => &self.male_voice,
        }
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        voice: Voice,
        rate: f64,
        out_path: &Path,
    ) -> Result<PathBuf, SynthesisError> {
        let request = SpeechRequest {
            text,
            voice: self.voice_name(voice),
            rate,
            format: "wav",
        };
        debug!("Sending TTS request to {} ({})", self.endpoint, request.voice);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Status {
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(SynthesisError::EmptyAudio);
        }
        tokio::fs::write(out_path, &bytes).await?;
        info!("Saved TTS audio to {}", out_path.display());

        Ok(out_path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_displays_lowercase() {
        assert_eq!(Voice::Female.to_string(), "female");
        assert_eq!(Voice::Male.to_string(), "male");
        assert_eq!(Voice::default(), Voice::Female);
    }

    #[test]
    fn piper_picks_model_per_voice() {
        let piper = PiperSynthesizer::new("piper".into(), "f.onnx".into(), "m.onnx".into());
        assert_eq!(piper.model(Voice::Female), "f.onnx");
        assert_eq!(piper.model(Voice::Male), "m.onnx");
    }

    #[test]
    fn piper_length_scale_is_inverse_rate() {
        let piper = PiperSynthesizer::new("piper".into(), "f.onnx".into(), "m.onnx".into());
        let args = piper.command_args(Voice::Male, 1.5, Path::new("/tmp/audio_000.wav"));
        assert_eq!(
            args,
            [
                "--model",
                "m.onnx",
                "--length_scale",
                "0.667",
                "--output_file",
                "/tmp/audio_000.wav"
            ]
        );

        let args = piper.command_args(Voice::Female, 1.0, Path::new("a.wav"));
        assert_eq!(args[3], "1.000");
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let raw = b"1\n2\n3\n4\n5\n6\n7\n";
        assert_eq!(stderr_tail(raw), "3\n4\n5\n6\n7");
    }

    #[tokio::test]
    async fn missing_engine_is_a_permanent_error() {
        let dir = tempfile::tempdir().unwrap();
        let piper = PiperSynthesizer::new(
            "/nonexistent/piper-binary".into(),
            "f.onnx".into(),
            "m.onnx".into(),
        );
        let err = piper
            .synthesize("こんにちは", Voice::Female, 1.0, &dir.path().join("a.wav"))
            .await
            .unwrap_err();

        assert!(matches!(err, SynthesisError::Spawn { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn speech_request_body() {
        let http = HttpSynthesizer::new(
            "http://127.0.0.1:9/tts".into(),
            "ja-JP-NanamiNeural".into(),
            "ja-JP-KeitaNeural".into(),
            Duration::from_secs(1),
        )
        .unwrap();
        let body = SpeechRequest {
            text: "こんにちは",
            voice: http.voice_name(Voice::Male),
            rate: DEFAULT_SPEECH_RATE,
            format: "wav",
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"text":"こんにちは","voice":"ja-JP-KeitaNeural","rate":1.5,"format":"wav"}"#
        );
    }

    #[test]
    fn http_status_classification() {
        let server = SynthesisError::Status {
            status: 503,
            body: String::new(),
        };
        let throttled = SynthesisError::Status {
            status: 429,
            body: String::new(),
        };
        let bad_request = SynthesisError::Status {
            status: 400,
            body: String::new(),
        };
        assert!(server.is_transient());
        assert!(throttled.is_transient());
        assert!(!bad_request.is_transient());
        assert!(!SynthesisError::EmptyAudio.is_transient());
    }
}
