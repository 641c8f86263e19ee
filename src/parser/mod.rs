use anyhow::Context;
use std::path::Path;

use crate::models::chunk::Chunk;

/// Read a UTF-8 document and split it into ordered, overlapping chunks.
pub async fn load_chunks(
    path: &Path,
    chunk_size: usize,
    chunk_overlap: usize,
) -> anyhow::Result<Vec<Chunk>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read corpus file {}", path.display()))?;
    let source = path.display().to_string();

    Ok(split_text(&text, chunk_size, chunk_overlap)
        .into_iter()
        .map(|text| Chunk {
            text,
            source: source.clone(),
        })
        .collect())
}

/// Text chunking using recursive character splitting.
/// Splits text into chunks of at most `chunk_size` characters
/// with roughly `chunk_overlap` characters of overlap.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let chunk_overlap = chunk_overlap.min(chunk_size - 1);

    let separators = ["\n\n", "\n", ". ", " ", ""];
    recursive_split(text, &separators, chunk_size, chunk_overlap)
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Last `n` characters of `s`.
fn tail(s: &str, n: usize) -> &str {
    let skip = char_len(s).saturating_sub(n);
    s.char_indices().nth(skip).map(|(i, _)| &s[i..]).unwrap_or("")
}

fn recursive_split(
    text: &str,
    separators: &[&str],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<String> {
    if char_len(text) <= chunk_size || separators.is_empty() {
        return vec![text.to_string()];
    }

    let separator = separators[0];
    let remaining_separators = &separators[1..];

    if separator.is_empty() {
        // Character-level split as fallback.
        let chars: Vec<char> = text.chars().collect();
        let step = chunk_size - chunk_overlap;
        let mut chunks = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let end = (start + chunk_size).min(chars.len());
            chunks.push(chars[start..end].iter().collect());
            if end >= chars.len() {
                break;
            }
            start += step;
        }
        return chunks;
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for part in text.split(separator) {
        let candidate = if current.is_empty() {
            part.to_string()
        } else {
            format!("{current}{separator}{part}")
        };

        if char_len(&candidate) <= chunk_size {
            current = candidate;
            continue;
        }

        if current.is_empty() {
            // Single part bigger than chunk_size.
            chunks.extend(recursive_split(part, remaining_separators, chunk_size, chunk_overlap));
            continue;
        }

        if char_len(&current) > chunk_size {
            chunks.extend(recursive_split(&current, remaining_separators, chunk_size, chunk_overlap));
        } else {
            chunks.push(current.clone());
        }

        // Start the next chunk with the overlap, unless that alone overflows.
        let overlap = tail(&current, chunk_overlap);
        let seeded = format!("{overlap}{separator}{part}");
        current = if char_len(&seeded) <= chunk_size {
            seeded
        } else {
            part.to_string()
        };
    }

    if !current.is_empty() {
        if char_len(&current) > chunk_size {
            chunks.extend(recursive_split(&current, remaining_separators, chunk_size, chunk_overlap));
        } else {
            chunks.push(current);
        }
    }

    chunks
}
