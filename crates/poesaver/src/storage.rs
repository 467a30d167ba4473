//! Output-path helpers: safe filenames and collision-avoiding naming.
//!
//! Already-written files are never mutated; a taken name gets a numbered
//! sibling instead.

use crate::error::StorageError;
use crate::metadata::is_plausible_text;
use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Maximum filename length in characters, before the extension
const MAX_FILENAME_CHARS: usize = 100;

/// Upper bound on numbered name candidates
const UNIQUE_NAME_LIMIT: u32 = 9999;

/// Make a string safe for use as a filename.
///
/// Filesystem-reserved characters become underscores, control characters
/// are removed, whitespace collapses, and the result is capped at
/// [`MAX_FILENAME_CHARS`]. Empty or garbled input falls back to
/// `"untitled"`.
pub fn sanitize_filename(name: &str) -> String {
    let mut cleaned = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => cleaned.push('_'),
            c if c.is_control() => {}
            c => cleaned.push(c),
        }
    }

    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let cleaned = cleaned.trim_matches(['.', ' ']).to_string();

    let cleaned = if cleaned.chars().count() > MAX_FILENAME_CHARS {
        let cut: String = cleaned.chars().take(MAX_FILENAME_CHARS - 3).collect();
        format!("{}...", cut.trim_end())
    } else {
        cleaned
    };

    if cleaned.is_empty() || !is_plausible_text(&cleaned) {
        return "untitled".to_string();
    }
    cleaned
}

/// Pick a path in `directory` that does not exist yet, creating the
/// directory if needed.
///
/// Tries `<base>.<ext>`, then `<base>_1.<ext>` and so on up to
/// [`UNIQUE_NAME_LIMIT`].
pub fn unique_path(
    directory: &Path,
    base_name: &str,
    extension: &str,
) -> Result<PathBuf, StorageError> {
    let base = sanitize_filename(base_name);
    let extension = extension.strip_prefix('.').unwrap_or(extension);

    fs::create_dir_all(directory).map_err(|source| StorageError::CreateDir {
        path: directory.to_path_buf(),
        source,
    })?;

    let candidate = directory.join(format!("{base}.{extension}"));
    if !candidate.exists() {
        return Ok(candidate);
    }

    for counter in 1..=UNIQUE_NAME_LIMIT {
        let candidate = directory.join(format!("{base}_{counter}.{extension}"));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(StorageError::NamespaceExhausted {
        base,
        limit: UNIQUE_NAME_LIMIT,
    })
}

/// Human-readable byte size, e.g. `"1.2 MB"`
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.1} {}", UNITS[unit])
}

/// Count whitespace-separated words
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Read URLs from a text file, one per line. Blank lines and `#` comments
/// are skipped; lines that do not look like URLs are reported and skipped.
pub fn read_url_list(path: &Path) -> io::Result<Vec<String>> {
    let file = fs::File::open(path)?;
    let mut urls = Vec::new();

    for (line_number, line) in io::BufReader::new(file).lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with("http") {
            urls.push(line.to_string());
        } else {
            warn!(
                line = line_number + 1,
                path = %path.display(),
                "skipping line that does not look like a URL"
            );
        }
    }

    Ok(urls)
}
