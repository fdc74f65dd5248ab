use crate::error::RenderError;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;
use tracing::debug;

static PAGES_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^Pages:\s+(\d+)").expect("valid pdfinfo regex"));

/// PDF rasterizer: one image per page.
pub trait Renderer: Send + Sync {
    fn page_count(&self, pdf: &Path) -> Result<usize, RenderError>;

    /// Render page `page_index` (0-based) at `scale` x 72 dpi into `out_path`.
    fn render(
        &self,
        pdf: &Path,
        page_index: usize,
        scale: f64,
        out_path: &Path,
    ) -> Result<PathBuf, RenderError>;
}

/// Poppler's `pdfinfo` / `pdftoppm`.
pub struct PopplerRenderer {
    pdfinfo: String,
    pdftoppm: String,
}

impl Default for PopplerRenderer {
    fn default() -> Self {
        Self {
            pdfinfo: "pdfinfo".to_string(),
            pdftoppm: "pdftoppm".to_string(),
        }
    }
}

fn run(program: &str, cmd: &mut Command) -> Result<String, RenderError> {
    let output = cmd.output().map_err(|source| RenderError::Spawn {
        program: program.to_string(),
        source,
    })?;
    if !output.status.success() {
        return Err(RenderError::Tool {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

pub fn parse_page_count(info: &str) -> Option<usize> {
    PAGES_LINE.captures(info)?.get(1)?.as_str().parse().ok()
}

pub fn dpi_for_scale(scale: f64) -> u32 {
    (72.0 * scale).round().max(1.0) as u32
}

impl Renderer for PopplerRenderer {
    fn page_count(&self, pdf: &Path) -> Result<usize, RenderError> {
        let info = run(&self.pdfinfo, Command::new(&self.pdfinfo).arg(pdf))?;
        parse_page_count(&info).ok_or_else(|| RenderError::PageCount(pdf.to_path_buf()))
    }

    fn render(
        &self,
        pdf: &Path,
        page_index: usize,
        scale: f64,
        out_path: &Path,
    ) -> Result<PathBuf, RenderError> {
        let page = (page_index + 1).to_string();
        // pdftoppm appends the extension itself.
        let prefix = out_path.with_extension("");
        let dpi = dpi_for_scale(scale).to_string();
        debug!("Rendering page {} at {} dpi", page, dpi);

        run(
            &self.pdftoppm,
            Command::new(&self.pdftoppm)
                .args(["-png", "-singlefile", "-r", &dpi, "-f", &page, "-l", &page])
                .arg(pdf)
                .arg(&prefix),
        )?;

        let produced = prefix.with_extension("png");
        if !produced.exists() {
            return Err(RenderError::MissingOutput(produced));
        }
        if produced != out_path {
            std::fs::rename(&produced, out_path)
                .map_err(|_| RenderError::MissingOutput(out_path.to_path_buf()))?;
        }
        Ok(out_path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_page_count_from_pdfinfo() {
        let info = "Title:          deck\nProducer:       x\nPages:          12\nEncrypted:      no\n";
        assert_eq!(parse_page_count(info), Some(12));
        assert_eq!(parse_page_count("Title: none\n"), None);
    }

    #[test]
    fn scale_maps_to_dpi() {
        assert_eq!(dpi_for_scale(1.5), 108);
        assert_eq!(dpi_for_scale(1.0), 72);
        assert_eq!(dpi_for_scale(0.0), 1);
    }

    #[test]
    fn missing_tool_reports_spawn_error() {
        let renderer = PopplerRenderer {
            pdfinfo: "/nonexistent/pdfinfo".into(),
            pdftoppm: "/nonexistent/pdftoppm".into(),
        };
        let err = renderer.page_count(Path::new("deck.pdf")).unwrap_err();
        assert!(matches!(err, RenderError::Spawn { .. }));
    }
}
