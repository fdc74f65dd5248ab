//! In-process stand-ins for the external tools, shared by unit tests.

use crate::audio::tests::write_test_wav;
use crate::encoder::Encoder;
use crate::error::{EncodeError, RenderError, SynthesisError};
use crate::render::Renderer;
use crate::tts::{Synthesizer, Voice};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

/// Writes a WAV of fixed length for every request.
pub struct FakeSynthesizer {
    seconds: f64,
    fail_first: u32,
    fail_text: Option<String>,
    calls: AtomicU32,
    log: Mutex<Vec<(String, Voice, f64)>>,
}

impl FakeSynthesizer {
    pub fn new(seconds: f64) -> Self {
        Self {
            seconds,
            fail_first: 0,
            fail_text: None,
            calls: AtomicU32::new(0),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Fail the first `n` calls with a transient error.
    pub fn failing_first(mut self, n: u32) -> Self {
        self.fail_first = n;
        self
    }

    /// Always fail (transiently) for text containing `needle`.
    pub fn failing_text(mut self, needle: &str) -> Self {
        self.fail_text = Some(needle.to_string());
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn voices(&self) -> Vec<Voice> {
        self.log.lock().unwrap().iter().map(|(_, v, _)| *v).collect()
    }

    pub fn rates(&self) -> Vec<f64> {
        self.log.lock().unwrap().iter().map(|(_, _, r)| *r).collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.log.lock().unwrap().iter().map(|(t, _, _)| t.clone()).collect()
    }
}

#[async_trait]
impl Synthesizer for FakeSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        voice: Voice,
        rate: f64,
        out_path: &Path,
    ) -> Result<PathBuf, SynthesisError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.lock().unwrap().push((text.to_string(), voice, rate));

        if call <= self.fail_first {
            return Err(SynthesisError::EngineExit(format!("fake failure #{call}")));
        }
        if let Some(needle) = &self.fail_text {
            if text.contains(needle.as_str()) {
                return Err(SynthesisError::EngineExit("fake failure".to_string()));
            }
        }
        write_test_wav(out_path, self.seconds, 16_000);
        Ok(out_path.to_path_buf())
    }
}

/// A document with a fixed number of pages; each render writes a placeholder file.
pub struct FakeRenderer {
    pub pages: usize,
    rendered: Mutex<Vec<usize>>,
}

impl FakeRenderer {
    pub fn new(pages: usize) -> Self {
        Self {
            pages,
            rendered: Mutex::new(Vec::new()),
        }
    }

    pub fn rendered(&self) -> Vec<usize> {
        self.rendered.lock().unwrap().clone()
    }
}

impl Renderer for FakeRenderer {
    fn page_count(&self, _pdf: &Path) -> Result<usize, RenderError> {
        Ok(self.pages)
    }

    fn render(
        &self,
        _pdf: &Path,
        page_index: usize,
        _scale: f64,
        out_path: &Path,
    ) -> Result<PathBuf, RenderError> {
        if page_index >= self.pages {
            return Err(RenderError::MissingOutput(out_path.to_path_buf()));
        }
        std::fs::write(out_path, b"png").map_err(|_| RenderError::MissingOutput(out_path.to_path_buf()))?;
        self.rendered.lock().unwrap().push(page_index);
        Ok(out_path.to_path_buf())
    }
}

/// Records argument lists instead of running ffmpeg. The last argument is the
/// output path, which gets a placeholder file.
#[derive(Default)]
pub struct RecordingEncoder {
    fail: bool,
    calls: Mutex<Vec<Vec<String>>>,
}

impl RecordingEncoder {
    /// Leaves a partial output behind and then reports failure.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_args(&self) -> Option<Vec<String>> {
        self.calls.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Encoder for RecordingEncoder {
    async fn encode(&self, args: &[String]) -> Result<(), EncodeError> {
        self.calls.lock().unwrap().push(args.to_vec());
        if let Some(out) = args.last() {
            std::fs::write(out, b"video")?;
        }
        if self.fail {
            return Err(EncodeError::Failed {
                status: "exit status: 1".to_string(),
                stderr: "fake encoder failure".to_string(),
            });
        }
        Ok(())
    }
}
