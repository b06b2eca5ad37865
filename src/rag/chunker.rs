use crate::core::config::IndexSettings;
use crate::core::errors::ApiError;

/// Window and overlap are counted in characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    window: usize,
    overlap: usize,
    max_block_chars: usize,
}

impl ChunkerConfig {
    pub fn new(window: usize, overlap: usize, max_block_chars: usize) -> Result<Self, ApiError> {
        if overlap == 0 || overlap >= window {
            return Err(ApiError::Configuration(format!(
                "Chunk overlap must be greater than 0 and smaller than the chunk size (size {}, overlap {})",
                window, overlap
            )));
        }
        if max_block_chars == 0 {
            return Err(ApiError::Configuration(
                "index.max_block_chars must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            window,
            overlap,
            max_block_chars,
        })
    }

    pub fn from_settings(settings: &IndexSettings) -> Result<Self, ApiError> {
        Self::new(
            settings.chunk_size,
            settings.chunk_overlap,
            settings.max_block_chars,
        )
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Unifies line endings, collapses runs of three or more newlines to a
    /// single blank line and truncates to the block limit.
    pub fn normalize(&self, block: &str) -> String {
        let unified = block.replace("\r\n", "\n");
        let mut out = String::with_capacity(unified.len());
        let mut newlines = 0usize;
        for c in unified.chars() {
            if c == '\n' {
                newlines += 1;
                if newlines <= 2 {
                    out.push(c);
                }
            } else {
                newlines = 0;
                out.push(c);
            }
        }
        match out.char_indices().nth(self.max_block_chars) {
            Some((cut, _)) => out[..cut].to_string(),
            None => out,
        }
    }

    /// Overlapping windows that cover `text` end to end.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let total = bounds.len() - 1;
        let step = self.window - self.overlap;

        let mut chunks = Vec::new();
        let mut cursor = 0;
        while cursor < total {
            let end = (cursor + self.window).min(total);
            chunks.push(text[bounds[cursor]..bounds[end]].to_string());
            if end == total {
                break;
            }
            cursor += step;
        }
        chunks
    }
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            window: crate::core::config::settings::DEFAULT_CHUNK_SIZE,
            overlap: crate::core::config::settings::DEFAULT_CHUNK_OVERLAP,
            max_block_chars: crate::core::config::settings::DEFAULT_MAX_BLOCK_CHARS,
        }
    }
}
