use crate::caption::segment;
use crate::slide::SlideItem;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::warn;

/// A caption placed on the project timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleCue {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Lay every slide's caption chunks end to end on one timeline.
pub fn build_track(slides: &[SlideItem]) -> Vec<SubtitleCue> {
    let mut cues = Vec::new();
    let mut cursor = 0.0_f64;
    for slide in slides {
        for chunk in segment(&slide.script_text, slide.duration) {
            cues.push(SubtitleCue {
                start: cursor + chunk.start_offset,
                end: cursor + chunk.end_offset,
                text: chunk.text,
            });
        }
        cursor += slide.duration;
    }
    cues
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleStyle {
    pub font_name: String,
    /// Font size at 720 lines; scaled with the output height.
    pub font_size: u32,
    pub margin_v: u32,
    /// Numpad layout: 1-3 bottom, 4-6 middle, 7-9 top.
    pub alignment: u8,
}

impl Default for SubtitleStyle {
    fn default() -> Self {
        Self {
            font_name: "Noto Sans JP".to_string(),
            font_size: 36,
            margin_v: 10,
            alignment: 2,
        }
    }
}

impl SubtitleStyle {
    pub fn new(margin_v: u32, alignment: u8) -> Self {
        let alignment = if (1..=9).contains(&alignment) {
            alignment
        } else {
            warn!(
                "Subtitle alignment {} is not in 1..=9; using bottom-center",
                alignment
            );
            2
        };
        Self {
            margin_v,
            alignment,
            ..Self::default()
        }
    }
}

fn format_ass_time(seconds: f64) -> String {
    let total_cs = (seconds.max(0.0) * 100.0).round() as u64;
    let cs = total_cs % 100;
    let total_sec = total_cs / 100;
    let s = total_sec % 60;
    let m = (total_sec / 60) % 60;
    let h = total_sec / 3600;
    format!("{}:{:02}:{:02}.{:02}", h, m, s, cs)
}

fn escape_ass_text(text: &str) -> String {
    text.replace('\n', "\\N").replace('{', "\\{").replace('}', "\\}")
}

pub fn render_ass(cues: &[SubtitleCue], style: &SubtitleStyle, width: u32, height: u32) -> String {
    let font_size = (style.font_size as f64 * height as f64 / 720.0).round() as u32;
    let mut out = String::new();
    let _ = write!(
        out,
        "[Script Info]\n\
         Title: Slide narration\n\
         ScriptType: v4.00+\n\
         WrapStyle: 0\n\
         PlayResX: {width}\n\
         PlayResY: {height}\n\
         ScaledBorderAndShadow: yes\n\
         \n\
         [V4+ Styles]\n\
         Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding\n\
         Style: Default,{font},{font_size},&H00FFFFFF,&H00FFFFFF,&H00000000,&H80303030,-1,0,0,0,100,100,0,0,3,2,0,{align},30,30,{margin},1\n\
         \n\
         [Events]\n\
         Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n",
        font = style.font_name,
        align = style.alignment,
        margin = style.margin_v,
    );
    for cue in cues {
        let _ = writeln!(
            out,
            "Dialogue: 0,{},{},Default,,0,0,{},,{}",
            format_ass_time(cue.start),
            format_ass_time(cue.end),
            style.margin_v,
            escape_ass_text(&cue.text)
        );
    }
    out
}

/// Written with a UTF-8 BOM; libass on Windows misreads Japanese text without it.
pub fn write_ass(
    path: &Path,
    cues: &[SubtitleCue],
    style: &SubtitleStyle,
    width: u32,
    height: u32,
) -> std::io::Result<()> {
    let mut doc = String::from('\u{feff}');
    doc.push_str(&render_ass(cues, style, width, height));
    fs::write(path, doc)
}
