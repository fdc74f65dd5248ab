use crate::error::ScriptError;
use encoding_rs::{SHIFT_JIS, UTF_8};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Narration per page index. Missing indices mean "no narration".
pub type ScriptMap = BTreeMap<usize, String>;

/// UTF-8 (with or without BOM), then Shift_JIS. Spreadsheet exports on
/// Japanese Windows are cp932, which the Shift_JIS decoder covers.
fn decode_text(bytes: &[u8]) -> Option<String> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    if let Some(text) = UTF_8.decode_without_bom_handling_and_without_replacement(bytes) {
        return Some(text.into_owned());
    }
    let text = SHIFT_JIS.decode_without_bom_handling_and_without_replacement(bytes)?;
    debug!("Decoded input as Shift_JIS");
    Some(text.into_owned())
}

fn read_text(path: &Path) -> Result<String, ScriptError> {
    if !path.exists() {
        return Err(ScriptError::NotFound(path.to_path_buf()));
    }
    let bytes = fs::read(path)?;
    decode_text(&bytes).ok_or_else(|| ScriptError::Encoding(path.to_path_buf()))
}

fn reader(data: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(data.as_bytes())
}

fn column(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h == name)
}

/// Parse a narration CSV with `index,script` columns.
///
/// Rows whose index is not a non-negative integer are skipped.
pub fn parse_script(data: &str) -> Result<ScriptMap, ScriptError> {
    let mut rdr = reader(data);
    let headers = rdr.headers()?.clone();
    let (Some(index_col), Some(script_col)) = (column(&headers, "index"), column(&headers, "script"))
    else {
        return Err(ScriptError::MissingColumns("index, script"));
    };

    let mut out = ScriptMap::new();
    for (row, record) in rdr.records().enumerate() {
        let record = record?;
        let raw_index = record.get(index_col).unwrap_or("").trim();
        let Ok(index) = raw_index.parse::<usize>() else {
            warn!("Skipping script row {} with index '{}'", row + 1, raw_index);
            continue;
        };
        let script = record.get(script_col).unwrap_or("").to_string();
        out.insert(index, script);
    }
    debug!("Loaded {} script rows", out.len());
    Ok(out)
}

pub fn read_script(path: &Path) -> Result<ScriptMap, ScriptError> {
    parse_script(&read_text(path)?)
}

/// Word to reading substitutions applied before synthesis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PronunciationDict {
    entries: Vec<(String, String)>,
}

impl PronunciationDict {
    pub fn new(entries: Vec<(String, String)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .filter(|(w, a)| !w.is_empty() && !a.is_empty())
                .collect(),
        }
    }

    /// Parse a CSV with `word,alias` columns.
    pub fn parse(data: &str) -> Result<Self, ScriptError> {
        let mut rdr = reader(data);
        let headers = rdr.headers()?.clone();
        let (Some(word_col), Some(alias_col)) = (column(&headers, "word"), column(&headers, "alias"))
        else {
            return Err(ScriptError::MissingColumns("word, alias"));
        };

        let mut entries = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let word = record.get(word_col).unwrap_or("").trim().to_string();
            let alias = record.get(alias_col).unwrap_or("").trim().to_string();
            entries.push((word, alias));
        }
        Ok(Self::new(entries))
    }

    pub fn read(path: &Path) -> Result<Self, ScriptError> {
        Self::parse(&read_text(path)?)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace every occurrence of each word, in dictionary order.
    pub fn apply(&self, text: &str) -> String {
        self.entries
            .iter()
            .fold(text.to_string(), |acc, (word, alias)| acc.replace(word, alias))
    }
}
