use crate::audio::wav_duration_seconds;
use crate::error::{PipelineError, SynthesisError};
use crate::retry::{RetryPolicy, retry};
use crate::script::PronunciationDict;
use crate::tts::{Synthesizer, Voice};
use crate::workspace::Workspace;
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::info;

/// One page of the deck and its narration.
#[derive(Debug, Clone, PartialEq)]
pub struct SlideItem {
    pub page_index: usize,
    pub image_path: PathBuf,
    pub script_text: String,
    /// Synthesized narration; `None` until assembled, and stays `None` for silent slides.
    pub audio_path: Option<PathBuf>,
    /// Display time in seconds; set by the assembler.
    pub duration: f64,
}

impl SlideItem {
    pub fn new(page_index: usize, image_path: PathBuf, script_text: String) -> Self {
        Self {
            page_index,
            image_path,
            script_text,
            audio_path: None,
            duration: 0.0,
        }
    }

    pub fn has_narration(&self) -> bool {
        !self.script_text.trim().is_empty()
    }
}

/// Turns narration into audio and fixes each slide's duration.
pub struct Assembler {
    synthesizer: Arc<dyn Synthesizer>,
    retry: RetryPolicy,
    silence_duration: f64,
    speech_rate: f64,
    dict: PronunciationDict,
}

impl Assembler {
    pub fn new(
        synthesizer: Arc<dyn Synthesizer>,
        retry: RetryPolicy,
        silence_duration: f64,
        speech_rate: f64,
        dict: PronunciationDict,
    ) -> Self {
        Self {
            synthesizer,
            retry,
            silence_duration,
            speech_rate,
            dict,
        }
    }

    pub async fn assemble(
        &self,
        mut slide: SlideItem,
        voice: Voice,
        workspace: &Workspace,
    ) -> Result<SlideItem, PipelineError> {
        if !slide.has_narration() {
            slide.audio_path = None;
            slide.duration = self.silence_duration;
            info!(
                "Slide {}: no narration, showing for {:.2}s",
                slide.page_index, slide.duration
            );
            return Ok(slide);
        }

        let text = self.dict.apply(slide.script_text.trim());
        let out_path = workspace.slide_audio(slide.page_index);
        let label = format!("TTS for slide {}", slide.page_index);

        let synthesizer = &self.synthesizer;
        let rate = self.speech_rate;
        let text = &text;
        let out = &out_path;
        let (audio_path, duration) = retry(
            self.retry,
            &label,
            SynthesisError::is_transient,
            move |_| async move {
                let path = synthesizer.synthesize(text, voice, rate, out).await?;
                let duration = wav_duration_seconds(&path)?;
                if duration <= 0.0 {
                    return Err(SynthesisError::EmptyAudio);
                }
                Ok::<_, SynthesisError>((path, duration))
            },
        )
        .await
        .map_err(|e| PipelineError::Synthesis {
            slide: slide.page_index,
            attempts: e.attempts,
            source: e.error,
        })?;

        info!(
            "Slide {}: narration {:.2}s ({} chars)",
            slide.page_index,
            duration,
            text.chars().count()
        );
        slide.audio_path = Some(audio_path);
        slide.duration = duration;
        Ok(slide)
    }

    /// Assemble every slide with at most `max_concurrent` synthesis calls in flight.
    ///
    /// All slides are joined before returning; the first failure in page order wins.
    pub async fn assemble_all(
        &self,
        slides: Vec<SlideItem>,
        voice: Voice,
        workspace: &Workspace,
        max_concurrent: usize,
    ) -> Result<Vec<SlideItem>, PipelineError> {
        let semaphore = Semaphore::new(max_concurrent.max(1));
        let semaphore = &semaphore;
        let tasks = slides.into_iter().map(move |slide| async move {
            let _permit = semaphore.acquire().await.ok();
            self.assemble(slide, voice, workspace).await
        });
        join_all(tasks).await.into_iter().collect()
    }
}
