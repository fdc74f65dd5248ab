//! Compositing slides into the final video with ffmpeg.
//!
//! Images and audio go through two concat-demuxer lists; the image list carries
//! per-slide durations so every slide is shown exactly as long as its audio.

use crate::audio::{DEFAULT_SILENCE_SPEC, wav_spec, write_silence_wav};
use crate::error::{EncodeError, PipelineError};
use crate::resolution::Resolution;
use crate::slide::SlideItem;
use crate::workspace::Workspace;
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

#[derive(clap::ValueEnum, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    #[default]
    Webm,
    Mp4,
}

impl Container {
    pub fn extension(self) -> &'static str {
        match self {
            Container::Webm => "webm",
            Container::Mp4 => "mp4",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CodecPreference {
    /// Quick encode, lower quality (VP8 / H.264)
    #[default]
    Fast,
    /// Slower encode, higher quality (VP9 / H.265)
    Quality,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Vp8,
    Vp9,
    H264,
    H265,
}

impl CodecPreference {
    pub fn from_fast(fast: bool) -> Self {
        if fast {
            CodecPreference::Fast
        } else {
            CodecPreference::Quality
        }
    }
}

impl Codec {
    pub fn select(container: Container, preference: CodecPreference) -> Self {
        match (container, preference) {
            (Container::Webm, CodecPreference::Fast) => Codec::Vp8,
            (Container::Webm, CodecPreference::Quality) => Codec::Vp9,
            (Container::Mp4, CodecPreference::Fast) => Codec::H264,
            (Container::Mp4, CodecPreference::Quality) => Codec::H265,
        }
    }

    pub fn ffmpeg_name(self) -> &'static str {
        match self {
            Codec::Vp8 => "libvpx",
            Codec::Vp9 => "libvpx-vp9",
            Codec::H264 => "libx264",
            Codec::H265 => "libx265",
        }
    }

    /// Quality factor used when none is configured. For VP8 this is the `qmax` ceiling.
    pub fn default_crf(self) -> u8 {
        match self {
            Codec::Vp8 => 50,
            Codec::Vp9 => 40,
            Codec::H264 => 23,
            Codec::H265 => 28,
        }
    }
}

/// Speed/quality knobs handed to the encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    pub preference: CodecPreference,
    pub frame_rate: u32,
    /// libvpx `-cpu-used`; higher is faster.
    pub cpu_used: u8,
    /// Overrides [`Codec::default_crf`].
    pub crf: Option<u8>,
    /// x264/x265 `-preset`.
    pub preset: String,
    pub threads: usize,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            preference: CodecPreference::Fast,
            frame_rate: 30,
            cpu_used: 8,
            crf: None,
            preset: "veryfast".to_string(),
            threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct VideoOutput {
    pub file_path: PathBuf,
    pub codec: Codec,
    pub container: Container,
    pub width: u32,
    pub height: u32,
    pub total_duration: f64,
}

/// Runs one encode described by a full ffmpeg argument list.
#[async_trait]
pub trait Encoder: Send + Sync {
    async fn encode(&self, args: &[String]) -> Result<(), EncodeError>;
}

pub struct FfmpegEncoder {
    program: String,
}

impl FfmpegEncoder {
    pub fn new(program: String) -> Self {
        Self { program }
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn encode(&self, args: &[String]) -> Result<(), EncodeError> {
        debug!("{} {}", self.program, args.join(" "));
        let output = Command::new(&self.program)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| EncodeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines: Vec<&str> = stderr.trim().lines().collect();
            let tail = lines[lines.len().saturating_sub(20)..].join("\n");
            error!("ffmpeg failed to produce final video");
            return Err(EncodeError::Failed {
                status: output.status.to_string(),
                stderr: tail,
            });
        }
        Ok(())
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn concat_entry(path: &Path) -> String {
    let p = absolute(path).to_string_lossy().replace('\\', "/");
    format!("file '{}'", p.replace('\'', r"'\''"))
}

/// Write a concat-demuxer list. With durations, the last file is repeated so its
/// `duration` line takes effect.
pub fn write_concat_list(
    out_path: &Path,
    paths: &[&Path],
    durations: Option<&[f64]>,
) -> std::io::Result<()> {
    let mut f = File::create(out_path)?;
    for (i, p) in paths.iter().enumerate() {
        writeln!(f, "{}", concat_entry(p))?;
        if let Some(durations) = durations {
            writeln!(f, "duration {:.6}", durations[i].max(0.01))?;
        }
    }
    if let (Some(last), Some(_)) = (paths.last(), durations) {
        writeln!(f, "{}", concat_entry(last))?;
    }
    Ok(())
}

fn escape_with(value: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape a path for use as a filter option value inside `-vf`.
///
/// ffmpeg unescapes twice: once for the option value, once for the filtergraph.
/// Quoting cannot carry a `'`, so every special character is backslash-escaped.
fn escape_filter_path(path: &Path) -> String {
    let path = absolute(path).to_string_lossy().replace('\\', "/");
    let option_level = escape_with(&path, &['\\', '\'', ':']);
    escape_with(&option_level, &['\\', '\'', '[', ']', ',', ';'])
}

pub fn video_filter(resolution: &Resolution, frame_rate: u32, subtitles: Option<&Path>) -> String {
    let (w, h) = (resolution.width, resolution.height);
    let mut parts = vec![
        // Constant frame rate first, or burned subtitles only change on slide boundaries.
        format!("fps={}", frame_rate),
        format!("scale={w}:{h}:force_original_aspect_ratio=decrease:flags=fast_bilinear"),
        format!("pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=0x303030"),
    ];
    if let Some(path) = subtitles {
        parts.push(format!("subtitles={}", escape_filter_path(path)));
    }
    parts.push("format=yuv420p".to_string());
    parts.join(",")
}

fn codec_args(codec: Codec, settings: &EncoderSettings) -> Vec<String> {
    let crf = settings.crf.unwrap_or(codec.default_crf()).to_string();
    let mut args: Vec<String> = vec!["-c:v".into(), codec.ffmpeg_name().into()];
    let extra: Vec<String> = match codec {
        Codec::Vp8 => vec![
            "-deadline".into(),
            "realtime".into(),
            "-cpu-used".into(),
            settings.cpu_used.min(16).to_string(),
            "-b:v".into(),
            "1M".into(),
            "-qmin".into(),
            "4".into(),
            "-qmax".into(),
            crf,
        ],
        Codec::Vp9 => vec![
            "-deadline".into(),
            "good".into(),
            "-cpu-used".into(),
            settings.cpu_used.min(8).to_string(),
            "-row-mt".into(),
            "1".into(),
            "-b:v".into(),
            "0".into(),
            "-crf".into(),
            crf,
        ],
        Codec::H264 => vec![
            "-preset".into(),
            settings.preset.clone(),
            "-crf".into(),
            crf,
        ],
        Codec::H265 => vec![
            "-preset".into(),
            settings.preset.clone(),
            "-crf".into(),
            crf,
            "-tag:v".into(),
            "hvc1".into(),
        ],
    };
    args.extend(extra);
    args.extend(["-threads".to_string(), settings.threads.max(1).to_string()]);
    args
}

fn audio_args(container: Container) -> Vec<String> {
    let args: &[&str] = match container {
        Container::Webm => &["-c:a", "libopus", "-b:a", "64k", "-vbr", "on"],
        Container::Mp4 => &["-c:a", "aac", "-b:a", "128k", "-movflags", "+faststart"],
    };
    args.iter().map(|s| s.to_string()).collect()
}

/// Full ffmpeg argument list for one encode.
pub fn build_args(
    video_list: &Path,
    audio_list: &Path,
    filter: &str,
    codec: Codec,
    container: Container,
    settings: &EncoderSettings,
    output: &Path,
) -> Vec<String> {
    let mut args: Vec<String> = [
        "-y", "-hide_banner", "-loglevel", "error", "-nostats", "-f", "concat", "-safe", "0", "-i",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(video_list.to_string_lossy().into_owned());
    args.extend(["-f", "concat", "-safe", "0", "-i"].map(String::from));
    args.push(audio_list.to_string_lossy().into_owned());
    args.extend(["-map", "0:v:0", "-map", "1:a:0", "-vf"].map(String::from));
    args.push(filter.to_string());
    args.extend(codec_args(codec, settings));
    args.extend(audio_args(container));
    args.push("-shortest".to_string());
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Sequences slides and audio and drives the encoder.
pub struct Compositor<'a> {
    encoder: &'a dyn Encoder,
    settings: &'a EncoderSettings,
}

impl<'a> Compositor<'a> {
    pub fn new(encoder: &'a dyn Encoder, settings: &'a EncoderSettings) -> Self {
        Self { encoder, settings }
    }

    /// Give every slide without narration a silence clip of its duration, in the
    /// format of the narrated clips so the audio list concatenates cleanly.
    fn fill_silence(
        &self,
        slides: &[SlideItem],
        workspace: &Workspace,
    ) -> Result<Vec<PathBuf>, PipelineError> {
        let spec = slides
            .iter()
            .filter_map(|s| s.audio_path.as_deref())
            .find_map(|p| wav_spec(p).ok())
            .unwrap_or(DEFAULT_SILENCE_SPEC);

        slides
            .iter()
            .map(|slide| match &slide.audio_path {
                Some(path) => Ok(path.clone()),
                None => {
                    let path = workspace.silence_audio(slide.page_index);
                    write_silence_wav(&path, slide.duration, spec).map_err(|source| {
                        PipelineError::Silence {
                            slide: slide.page_index,
                            source,
                        }
                    })?;
                    Ok(path)
                }
            })
            .collect()
    }

    pub async fn render(
        &self,
        slides: &[SlideItem],
        resolution: &Resolution,
        subtitles: Option<&Path>,
        container: Container,
        workspace: &Workspace,
        output_path: &Path,
    ) -> Result<VideoOutput, PipelineError> {
        for slide in slides {
            if !(slide.duration.is_finite() && slide.duration > 0.0) {
                return Err(PipelineError::InvalidDuration {
                    slide: slide.page_index,
                    duration: slide.duration,
                });
            }
        }

        let audio_paths = self.fill_silence(slides, workspace)?;
        let image_paths: Vec<&Path> = slides.iter().map(|s| s.image_path.as_path()).collect();
        let durations: Vec<f64> = slides.iter().map(|s| s.duration).collect();
        let audio_refs: Vec<&Path> = audio_paths.iter().map(PathBuf::as_path).collect();

        let video_list = workspace.video_list();
        let audio_list = workspace.audio_list();
        write_concat_list(&video_list, &image_paths, Some(durations.as_slice())).map_err(EncodeError::Io)?;
        write_concat_list(&audio_list, &audio_refs, None).map_err(EncodeError::Io)?;
        debug!("Created concat lists in {}", workspace.dir().display());

        let codec = Codec::select(container, self.settings.preference);
        let filter = video_filter(resolution, self.settings.frame_rate, subtitles);
        let args = build_args(
            &video_list,
            &audio_list,
            &filter,
            codec,
            container,
            self.settings,
            output_path,
        );

        info!(
            "Encoding {} slides as {:?}/{} at {}x{}",
            slides.len(),
            codec,
            container.extension(),
            resolution.width,
            resolution.height
        );
        if let Err(e) = self.encoder.encode(&args).await {
            if output_path.exists() {
                if let Err(rm) = fs::remove_file(output_path) {
                    warn!(
                        "Could not remove partial output {}: {}",
                        output_path.display(),
                        rm
                    );
                }
            }
            return Err(e.into());
        }

        Ok(VideoOutput {
            file_path: output_path.to_path_buf(),
            codec,
            container,
            width: resolution.width,
            height: resolution.height,
            total_duration: durations.iter().sum(),
        })
    }
}
