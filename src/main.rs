mod args;
mod audio;
mod caption;
mod config;
mod encoder;
mod error;
mod pipeline;
mod render;
mod resolution;
mod retry;
mod script;
mod slide;
mod subtitle;
#[cfg(test)]
mod testing;
mod tts;
mod workspace;

use args::{Args, TtsBackend};
use clap::Parser;
use encoder::FfmpegEncoder;
use pipeline::Pipeline;
use render::PopplerRenderer;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tts::{HttpSynthesizer, PiperSynthesizer, Synthesizer};

/// The PDFs to convert: the input itself, or every `.pdf` in it, sorted by name.
fn collect_pdfs(input: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        anyhow::bail!("Input not found: {}", input.display());
    }
    let mut pdfs = Vec::new();
    for entry in fs::read_dir(input)? {
        let path = entry?.path();
        let is_pdf = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if path.is_file() && is_pdf {
            pdfs.push(path);
        }
    }
    pdfs.sort();
    Ok(pdfs)
}

fn build_synthesizer(args: &Args) -> anyhow::Result<Arc<dyn Synthesizer>> {
    Ok(match args.tts {
        TtsBackend::Piper => Arc::new(PiperSynthesizer::new(
            args.piper_bin.clone(),
            args.piper_model_female.clone(),
            args.piper_model_male.clone(),
        )),
        TtsBackend::Http => Arc::new(HttpSynthesizer::new(
            args.tts_endpoint.clone(),
            args.tts_voice_female.clone(),
            args.tts_voice_male.clone(),
            args.tts_timeout(),
        )?),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    info!("Starting slide video generation");

    let pdfs = collect_pdfs(&args.input)?;
    if pdfs.is_empty() {
        anyhow::bail!("No PDF files found in {}", args.input.display());
    }
    info!("Found {} document(s)", pdfs.len());

    let pipeline = Pipeline::new(
        Arc::new(PopplerRenderer::default()),
        build_synthesizer(&args)?,
        Arc::new(FfmpegEncoder::new(args.ffmpeg.clone())),
    );

    let mut failed = 0;
    for pdf in &pdfs {
        let config = args.to_config(pdf);
        info!("Output resolution: {}px width", config.resolution.width);
        match pipeline.run(&config).await {
            Ok(run) => {
                if args.json {
                    println!("{}", serde_json::to_string(&run.output)?);
                }
            }
            Err(e) => {
                error!("Failed to generate video for {}: {}", pdf.display(), e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} document(s) failed", failed, pdfs.len());
    }
    info!("Process complete.");
    Ok(())
}
