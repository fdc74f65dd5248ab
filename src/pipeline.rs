use crate::config::PipelineConfig;
use crate::encoder::{Compositor, Encoder, VideoOutput};
use crate::error::PipelineError;
use crate::render::Renderer;
use crate::resolution::Resolution;
use crate::script::{PronunciationDict, read_script};
use crate::slide::{Assembler, SlideItem};
use crate::subtitle::{build_track, write_ass};
use crate::tts::Synthesizer;
use crate::workspace::{ClearOutcome, Workspace};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The result of one project run. Nothing here outlives the process.
#[derive(Debug)]
pub struct ProjectRun {
    pub slides: Vec<SlideItem>,
    pub resolution: Resolution,
    pub workspace: Workspace,
    pub output: VideoOutput,
}

/// PDF + narration CSV in, video out.
pub struct Pipeline {
    renderer: Arc<dyn Renderer>,
    synthesizer: Arc<dyn Synthesizer>,
    encoder: Arc<dyn Encoder>,
}

impl Pipeline {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        synthesizer: Arc<dyn Synthesizer>,
        encoder: Arc<dyn Encoder>,
    ) -> Self {
        Self {
            renderer,
            synthesizer,
            encoder,
        }
    }

    pub async fn run(&self, config: &PipelineConfig) -> Result<ProjectRun, PipelineError> {
        config.validate()?;

        // Inputs are checked before the workspace is touched.
        for path in [Some(&config.pdf_path), Some(&config.script_path), config.pronounce_dict.as_ref()]
            .into_iter()
            .flatten()
        {
            if !path.exists() {
                return Err(PipelineError::MissingInput(path.clone()));
            }
        }

        let script = read_script(&config.script_path).map_err(|source| PipelineError::Script {
            path: config.script_path.clone(),
            source,
        })?;
        let dict = match &config.pronounce_dict {
            Some(path) => {
                let dict = PronunciationDict::read(path).map_err(|source| PipelineError::Script {
                    path: path.clone(),
                    source,
                })?;
                if dict.is_empty() {
                    warn!("Pronunciation dictionary {} has no entries", path.display());
                }
                dict
            }
            None => PronunciationDict::default(),
        };

        let workspace = Workspace::prepare(&config.workspace_root(), &config.project_key())?;
        if let ClearOutcome::ClearedWithWarning(e) = workspace.outcome() {
            debug!("Continuing with a partially cleared workspace: {}", e);
        }

        let pdf = &config.pdf_path;
        let page_count = self
            .renderer
            .page_count(pdf)
            .map_err(|source| PipelineError::Inspect {
                pdf: pdf.clone(),
                source,
            })?;
        if page_count == 0 {
            return Err(PipelineError::NoSlides(pdf.clone()));
        }
        if let Some((&last, _)) = script.last_key_value() {
            if last >= page_count {
                warn!(
                    "Script has rows up to index {} but the document has {} pages; extra rows are ignored",
                    last, page_count
                );
            }
        }

        let mut slides = Vec::with_capacity(page_count);
        for page in 0..page_count {
            info!("Processing page {}/{}", page + 1, page_count);
            let image_path = self
                .renderer
                .render(pdf, page, config.render_scale, &workspace.slide_image(page))
                .map_err(|source| PipelineError::Render { page, source })?;
            let text = script.get(&page).cloned().unwrap_or_default();
            slides.push(SlideItem::new(page, image_path, text));
        }

        info!("Synthesizing narration with the {} voice", config.voice);
        let assembler = Assembler::new(
            self.synthesizer.clone(),
            config.retry,
            config.silence_duration,
            config.speech_rate,
            dict,
        );
        let slides = assembler
            .assemble_all(slides, config.voice, &workspace, config.max_concurrent_tts)
            .await?;

        let subtitles: Option<PathBuf> = match &config.subtitles {
            Some(style) => {
                let cues = build_track(&slides);
                if cues.is_empty() {
                    debug!("No narration; skipping subtitles");
                    None
                } else {
                    let path = workspace.subtitles();
                    write_ass(
                        &path,
                        &cues,
                        style,
                        config.resolution.width,
                        config.resolution.height,
                    )?;
                    info!("Wrote {} subtitle cues", cues.len());
                    Some(path)
                }
            }
            None => None,
        };

        fs::create_dir_all(&config.output_dir)?;
        let output_path = config.output_path();
        let output = Compositor::new(self.encoder.as_ref(), &config.encoder).render(
            &slides,
            &config.resolution,
            subtitles.as_deref(),
            config.container,
            &workspace,
            &output_path,
        )
        .await?;
        info!(
            "Video generated: {} ({:.2}s)",
            output.file_path.display(),
            output.total_duration
        );

        Ok(ProjectRun {
            slides,
            resolution: config.resolution.clone(),
            workspace,
            output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_config;
    use crate::encoder::Codec;
    use crate::error::SynthesisError;
    use crate::testing::{FakeRenderer, FakeSynthesizer, RecordingEncoder};
    use std::path::Path;

    struct Fixture {
        renderer: Arc<FakeRenderer>,
        synth: Arc<FakeSynthesizer>,
        encoder: Arc<RecordingEncoder>,
    }

    impl Fixture {
        fn new(synth: FakeSynthesizer) -> Self {
            Self {
                renderer: Arc::new(FakeRenderer::new(3)),
                synth: Arc::new(synth),
                encoder: Arc::new(RecordingEncoder::default()),
            }
        }

        fn pipeline(&self) -> Pipeline {
            Pipeline::new(
                self.renderer.clone(),
                self.synth.clone(),
                self.encoder.clone(),
            )
        }
    }

    fn write_inputs(root: &Path) -> PipelineConfig {
        let cfg = sample_config(root);
        fs::write(&cfg.pdf_path, b"%PDF-1.7").unwrap();
        fs::write(
            &cfg.script_path,
            "index,script\n0,最初のスライド。\n1,\n2,最後のスライド。\n",
        )
        .unwrap();
        cfg
    }

    #[tokio::test]
    async fn three_slide_deck_end_to_end() {
        let root = tempfile::tempdir().unwrap();
        let cfg = write_inputs(root.path());
        let fx = Fixture::new(FakeSynthesizer::new(1.25));

        let run = fx.pipeline().run(&cfg).await.unwrap();

        assert_eq!((run.output.width, run.output.height), (1920, 1080));
        assert!((run.output.total_duration - (1.25 + 5.0 + 1.25)).abs() < 1e-6);
        assert_eq!(run.output.codec, Codec::Vp8);
        assert_eq!(run.output.file_path, root.path().join("out/deck.webm"));
        assert!(run.output.file_path.exists());
        assert_eq!(fx.renderer.rendered(), vec![0, 1, 2]);
        assert_eq!(fx.synth.calls(), 2);
        assert_eq!(fx.synth.rates(), vec![1.5, 1.5]);
        assert!(run.slides[1].audio_path.is_none());

        let list = fs::read_to_string(run.workspace.video_list()).unwrap();
        let files: Vec<&str> = list.lines().filter(|l| l.starts_with("file ")).collect();
        // The last image is repeated so its duration applies.
        assert_eq!(files.len(), 4);
        for (line, name) in files.iter().zip(["slide_000.png", "slide_001.png", "slide_002.png"]) {
            assert!(line.ends_with(&format!("{name}'")), "{line}");
        }

        let args = fx.encoder.last_args().unwrap();
        let vf = &args[args.iter().position(|a| a == "-vf").unwrap() + 1];
        assert!(vf.contains("subtitles="));
        assert!(run.workspace.subtitles().exists());
    }

    #[tokio::test]
    async fn rerun_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let cfg = write_inputs(root.path());
        let fx = Fixture::new(FakeSynthesizer::new(2.0));

        let first = fx.pipeline().run(&cfg).await.unwrap();
        let stale = first.workspace.dir().join("stale.txt");
        fs::write(&stale, "leftover").unwrap();

        let second = fx.pipeline().run(&cfg).await.unwrap();
        assert_eq!(first.output, second.output);
        assert!(!stale.exists());
    }

    #[tokio::test]
    async fn missing_script_aborts_before_side_effects() {
        let root = tempfile::tempdir().unwrap();
        let cfg = sample_config(root.path());
        fs::write(&cfg.pdf_path, b"%PDF-1.7").unwrap();
        let fx = Fixture::new(FakeSynthesizer::new(1.0));

        let err = fx.pipeline().run(&cfg).await.unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput(ref p) if *p == cfg.script_path));
        assert!(!cfg.workspace_root().exists());
        assert!(fx.renderer.rendered().is_empty());
    }

    #[tokio::test]
    async fn synthesis_failure_stops_before_encoding() {
        let root = tempfile::tempdir().unwrap();
        let cfg = write_inputs(root.path());
        let fx = Fixture::new(FakeSynthesizer::new(1.0).failing_text("最後"));

        let err = fx.pipeline().run(&cfg).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Synthesis {
                slide: 2,
                source: SynthesisError::EngineExit(_),
                ..
            }
        ));
        assert_eq!(fx.encoder.calls(), 0);
        assert!(!cfg.output_path().exists());
    }

    #[tokio::test]
    async fn silent_deck_has_no_subtitle_track() {
        let root = tempfile::tempdir().unwrap();
        let cfg = sample_config(root.path());
        fs::write(&cfg.pdf_path, b"%PDF-1.7").unwrap();
        fs::write(&cfg.script_path, "index,script\n").unwrap();
        let fx = Fixture::new(FakeSynthesizer::new(1.0));

        let run = fx.pipeline().run(&cfg).await.unwrap();
        assert!((run.output.total_duration - 15.0).abs() < 1e-6);
        assert!(!run.workspace.subtitles().exists());
        let args = fx.encoder.last_args().unwrap();
        assert!(!args.iter().any(|a| a.contains("subtitles=")));
    }
}
