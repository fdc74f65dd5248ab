//! Splitting narration into timed caption chunks.
//!
//! Timing is proportional to character count, not speech-aware: each fragment
//! gets `duration * chars / total_chars`, subject to a minimum on-screen span.

use regex::Regex;
use std::sync::LazyLock;

/// Shortest span a caption may be shown for, in seconds.
pub const MIN_CHUNK_SECONDS: f64 = 0.15;

const EPSILON: f64 = 1e-9;

// ASCII '.' and ',' only end a fragment before whitespace or end of text, so "3.5" stays whole.
static BOUNDARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[。、，．！？!?\n]+|[.,]+(?:\s|$)").expect("valid boundary regex")
});

/// One subtitle cue, relative to the start of its slide.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionChunk {
    pub start_offset: f64,
    pub end_offset: f64,
    pub text: String,
}

impl CaptionChunk {
    pub fn span(&self) -> f64 {
        self.end_offset - self.start_offset
    }
}

#[derive(Debug, Clone, Copy)]
struct Fragment {
    start: usize,
    end: usize,
    chars: usize,
}

fn is_delimiter(c: char) -> bool {
    matches!(
        c,
        '。' | '、' | '，' | '．' | '！' | '？' | '!' | '?' | '.' | ','
    ) || c.is_whitespace()
}

fn push_fragment(fragments: &mut Vec<Fragment>, text: &str, start: usize, end: usize) {
    let piece = &text[start..end];
    let trimmed = piece.trim();
    if trimmed.is_empty() {
        return;
    }
    let lead = piece.len() - piece.trim_start().len();
    let start = start + lead;
    let end = start + trimmed.len();

    if trimmed.chars().all(is_delimiter) {
        // Stray punctuation belongs to the fragment it follows.
        if let Some(prev) = fragments.last_mut() {
            prev.end = end;
            prev.chars += trimmed.chars().count();
        }
        return;
    }
    fragments.push(Fragment {
        start,
        end,
        chars: trimmed.chars().count(),
    });
}

fn split_fragments(text: &str) -> Vec<Fragment> {
    let mut fragments = Vec::new();
    let mut last = 0;
    for m in BOUNDARY.find_iter(text) {
        push_fragment(&mut fragments, text, last, m.end());
        last = m.end();
    }
    push_fragment(&mut fragments, text, last, text.len());
    fragments
}

/// Merge adjacent fragments until every one can receive the minimum span.
///
/// The pair with the smallest combined character count is merged first; on a
/// tie the earliest pair wins.
fn merge_until_feasible(mut fragments: Vec<Fragment>, duration: f64) -> Vec<Fragment> {
    while fragments.len() > 1 && fragments.len() as f64 * MIN_CHUNK_SECONDS > duration + EPSILON
    {
        let mut best = 0;
        let mut best_chars = usize::MAX;
        for (i, pair) in fragments.windows(2).enumerate() {
            let combined = pair[0].chars + pair[1].chars;
            if combined < best_chars {
                best = i;
                best_chars = combined;
            }
        }
        let next = fragments.remove(best + 1);
        let merged = &mut fragments[best];
        merged.end = next.end;
        merged.chars += next.chars;
    }
    fragments
}

/// Proportional spans with a floor; fragments below the floor are pinned to it
/// and the remainder is redistributed among the rest until stable.
fn allocate_spans(counts: &[usize], duration: f64) -> Vec<f64> {
    let n = counts.len();
    if n == 1 {
        return vec![duration];
    }

    let mut pinned = vec![false; n];
    loop {
        let pinned_count = pinned.iter().filter(|p| **p).count();
        let free_chars: usize = counts
            .iter()
            .zip(&pinned)
            .filter(|(_, p)| !**p)
            .map(|(c, _)| *c)
            .sum();
        if free_chars == 0 {
            return vec![duration / n as f64; n];
        }
        let budget = duration - pinned_count as f64 * MIN_CHUNK_SECONDS;

        let spans: Vec<f64> = counts
            .iter()
            .zip(&pinned)
            .map(|(&c, &p)| {
                if p {
                    MIN_CHUNK_SECONDS
                } else {
                    budget * c as f64 / free_chars as f64
                }
            })
            .collect();

        let mut changed = false;
        for (span, p) in spans.iter().zip(pinned.iter_mut()) {
            if !*p && *span < MIN_CHUNK_SECONDS - EPSILON {
                *p = true;
                changed = true;
            }
        }
        if !changed {
            return spans;
        }
    }
}

/// Split `text` into caption chunks laid out over `[0, slide_duration]`.
pub fn segment(text: &str, slide_duration: f64) -> Vec<CaptionChunk> {
    if !slide_duration.is_finite() || slide_duration <= 0.0 {
        return Vec::new();
    }
    let fragments = split_fragments(text);
    if fragments.is_empty() {
        return Vec::new();
    }
    let fragments = merge_until_feasible(fragments, slide_duration);
    let counts: Vec<usize> = fragments.iter().map(|f| f.chars).collect();
    let spans = allocate_spans(&counts, slide_duration);

    let last = fragments.len() - 1;
    let mut cursor = 0.0_f64;
    fragments
        .iter()
        .zip(spans)
        .enumerate()
        .map(|(i, (fragment, span))| {
            let start = cursor;
            let end = if i == last {
                slide_duration
            } else {
                (cursor + span).min(slide_duration)
            };
            cursor = end;
            CaptionChunk {
                start_offset: start,
                end_offset: end,
                text: text[fragment.start..fragment.end].to_string(),
            }
        })
        .collect()
}
