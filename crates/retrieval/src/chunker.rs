//! Recursive character text splitting.
//!
//! Documents are split on progressively finer separators (paragraph,
//! line, word, character) so chunks break at natural boundaries where
//! possible. Adjacent chunks overlap so that context spanning a chunk
//! boundary is not lost at retrieval time.

/// Splits text into overlapping chunks for embedding.
#[derive(Debug, Clone)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

/// Separators tried in order, coarsest first. The empty string means
/// "split between every character" and always matches.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

impl TextChunker {
    /// Create a chunker. `chunk_size` and `chunk_overlap` are measured
    /// in characters; overlap must be smaller than the chunk size.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    /// Split `text` into chunks of at most `chunk_size` characters.
    ///
    /// Empty and whitespace-only chunks are dropped.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        self.split_with(text, &SEPARATORS)
            .into_iter()
            .filter(|c| !c.is_empty())
            .collect()
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // Pick the coarsest separator that actually occurs in the text.
        let mut separator = *separators.last().unwrap_or(&"");
        let mut remaining: &[&str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() || text.contains(sep) {
                separator = sep;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let splits: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator).map(String::from).collect()
        };

        let mut final_chunks = Vec::new();
        let mut good_splits: Vec<String> = Vec::new();

        for split in splits {
            if split.chars().count() < self.chunk_size {
                good_splits.push(split);
            } else {
                // Flush what fit so far, then recurse on the oversized
                // piece with the finer separators.
                if !good_splits.is_empty() {
                    final_chunks.extend(self.merge_splits(&good_splits, separator));
                    good_splits.clear();
                }
                if remaining.is_empty() {
                    final_chunks.push(split);
                } else {
                    final_chunks.extend(self.split_with(&split, remaining));
                }
            }
        }

        if !good_splits.is_empty() {
            final_chunks.extend(self.merge_splits(&good_splits, separator));
        }

        final_chunks
    }

    /// Pack splits into chunks up to `chunk_size`, carrying the last
    /// `chunk_overlap` characters worth of splits into the next chunk.
    fn merge_splits(&self, splits: &[String], separator: &str) -> Vec<String> {
        let sep_len = separator.chars().count();
        let mut chunks = Vec::new();
        let mut current: std::collections::VecDeque<&String> = std::collections::VecDeque::new();
        let mut total = 0usize;

        for split in splits {
            let len = split.chars().count();
            let added = len + if current.is_empty() { 0 } else { sep_len };

            if total + added > self.chunk_size && !current.is_empty() {
                chunks.push(Self::join(&current, separator));

                // Drop leading splits until the carried-over tail fits
                // inside the overlap budget and leaves room for the
                // incoming split.
                while total > self.chunk_overlap
                    || (total + len + if current.is_empty() { 0 } else { sep_len }
                        > self.chunk_size
                        && total > 0)
                {
                    let Some(first) = current.pop_front() else {
                        break;
                    };
                    total -= first.chars().count()
                        + if current.is_empty() { 0 } else { sep_len };
                }
            }

            total += len + if current.is_empty() { 0 } else { sep_len };
            current.push_back(split);
        }

        if !current.is_empty() {
            chunks.push(Self::join(&current, separator));
        }

        chunks
    }

    fn join(parts: &std::collections::VecDeque<&String>, separator: &str) -> String {
        let joined = parts
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(separator);
        joined.trim().to_string()
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(1000, 200)
    }
}
