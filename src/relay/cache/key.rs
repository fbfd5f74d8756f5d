//! Cache key construction. Keys are a blake3 content hash joined with every
//! parameter that affects the output, so byte-identical input plus identical
//! parameters always map to the same key, across process restarts. The audio
//! and text key spaces carry disjoint prefixes and can never collide.

use crate::relay::types::TaskParams;

/// Key for audio-derived results: content hash plus all task-affecting
/// parameters, including `return_segments` since it changes the cached
/// payload.
pub fn audio_key(audio: &[u8], params: &TaskParams) -> String {
    format!(
        "audio:{}:{}:{}:{}:{}",
        blake3::hash(audio).to_hex(),
        params.source_language.as_deref().unwrap_or("auto"),
        params.target_language,
        params.task.as_str(),
        params.return_segments,
    )
}

/// Key for text-translation results, independent of the audio key space.
pub fn text_key(text: &str, source: &str, target: &str) -> String {
    format!(
        "text:{}:{}:{}",
        blake3::hash(text.as_bytes()).to_hex(),
        source,
        target,
    )
}
