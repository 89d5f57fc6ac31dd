use std::num::NonZeroUsize;

use crate::ConfigError;

pub const DEFAULT_CHUNK_SIZE: usize = 20;

/// Target weight of one chunk, in display-width units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSize(NonZeroUsize);

impl ChunkSize {
    pub fn new(size: usize) -> Result<Self, ConfigError> {
        NonZeroUsize::new(size)
            .map(Self)
            .ok_or(ConfigError::InvalidChunkSize(size))
    }

    /// Parses user input, falling back to [`DEFAULT_CHUNK_SIZE`] for anything
    /// that is not a positive integer.
    pub fn parse_or_default(input: &str) -> Self {
        input
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|size| Self::new(size).ok())
            .unwrap_or_default()
    }

    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl Default for ChunkSize {
    fn default() -> Self {
        Self(NonZeroUsize::MIN.saturating_add(DEFAULT_CHUNK_SIZE - 1))
    }
}

/// Strips every whitespace character, producing the dense text that chunks slice.
pub fn normalize(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Splits `raw` into message-sized chunks.
///
/// Without `half_weight` every character counts as one unit and chunks hold
/// exactly `size` characters (the last may be shorter). With `half_weight`
/// ASCII letters and digits count half a unit, so a chunk of Latin text holds
/// twice as many characters as one of ideographs.
///
/// The chunks always concatenate back to [`normalize`]`(raw)`.
pub fn chunk_text(raw: &str, size: ChunkSize, half_weight: bool) -> Vec<String> {
    let dense = normalize(raw);
    if dense.is_empty() {
        return Vec::new();
    }
    if half_weight {
        chunk_weighted(&dense, size)
    } else {
        chunk_fixed(&dense, size)
    }
}

fn chunk_fixed(dense: &str, size: ChunkSize) -> Vec<String> {
    let chars: Vec<char> = dense.chars().collect();
    chars
        .chunks(size.get())
        .map(|group| group.iter().collect())
        .collect()
}

// Weights are counted in half units so the comparison stays exact.
fn chunk_weighted(dense: &str, size: ChunkSize) -> Vec<String> {
    let limit = size.get().saturating_mul(2);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut acc = 0usize;

    for ch in dense.chars() {
        let weight = half_units(ch);
        if acc + weight > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            acc = 0;
        }
        current.push(ch);
        acc += weight;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn half_units(ch: char) -> usize {
    if ch.is_ascii_alphanumeric() {
        1
    } else {
        2
    }
}

/// One message per non-blank line, trimmed.
pub fn parse_message_lines(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}
