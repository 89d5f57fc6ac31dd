use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use danmaku_core::{chunk_text, parse_message_lines, ChunkSize};
use engine_logging::engine_info;

use crate::config::AppConfig;

/// Reads a UTF-8 text file and splits it into message chunks.
pub fn load_messages(path: &Path, size: ChunkSize, half_weight: bool) -> anyhow::Result<Vec<String>> {
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(chunk_text(&raw, size, half_weight))
}

/// Resolves the messages for a run: the chunked file in file mode, else the
/// configured list.
pub fn resolve(config: &AppConfig) -> anyhow::Result<Vec<String>> {
    if config.use_file {
        let size = ChunkSize::new(config.chunk_size).unwrap_or_default();
        let messages = load_messages(&config.file, size, config.half_weight)?;
        if messages.is_empty() {
            bail!("{} is empty after removing whitespace", config.file.display());
        }
        engine_info!(
            "Loaded {} message(s) from {:?} (chunk size {}, half weight {})",
            messages.len(),
            config.file,
            size.get(),
            config.half_weight
        );
        return Ok(messages);
    }

    let messages = parse_message_lines(&config.messages.join("\n"));
    if messages.is_empty() {
        bail!("message list is empty; add messages or enable file mode");
    }
    Ok(messages)
}
