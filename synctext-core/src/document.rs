//! Local document file: each peer owns `<user_id>_doc.txt`.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;

/// Initial contents for a freshly seeded document.
const SEED_LINES: [&str; 3] = ["int x = 10;", "int y = 20;", "int z = 30;"];

/// Errors from document file operations. Carries the path so callers
/// can report which peer document failed.
#[derive(Debug, Error)]
pub enum DocError {
    #[error("cannot stat document '{path}': {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("document io on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DocError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Document path for a participant: `<user_id>_doc.txt` in the working
/// directory.
pub fn doc_path(user_id: &str) -> PathBuf {
    PathBuf::from(format!("{user_id}_doc.txt"))
}

/// Seed the document with its initial three lines when absent.
pub fn seed_if_absent(path: &Path) -> Result<(), DocError> {
    if path.exists() {
        return Ok(());
    }
    let lines: Vec<String> = SEED_LINES.iter().map(|s| s.to_string()).collect();
    write_lines(path, &lines)
}

/// Read the document as a line vector, trimming trailing empty lines to
/// avoid phantom blank-line diffs.
pub fn read_lines(path: &Path) -> Result<Vec<String>, DocError> {
    let content = fs::read_to_string(path).map_err(|e| DocError::io(path, e))?;
    let mut lines: Vec<String> = content.lines().map(|l| l.to_string()).collect();
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    Ok(lines)
}

/// Rewrite the document from a line vector, one trailing newline per
/// line and no trailing empty line.
pub fn write_lines(path: &Path, lines: &[String]) -> Result<(), DocError> {
    let mut trimmed = lines.len();
    while trimmed > 0 && lines[trimmed - 1].is_empty() {
        trimmed -= 1;
    }

    let mut file = fs::File::create(path).map_err(|e| DocError::io(path, e))?;
    for line in &lines[..trimmed] {
        writeln!(file, "{line}").map_err(|e| DocError::io(path, e))?;
    }
    file.flush().map_err(|e| DocError::io(path, e))
}

/// Modification time probe used by the editor loop's change polling.
pub fn modified_at(path: &Path) -> Result<SystemTime, DocError> {
    let meta = fs::metadata(path).map_err(|e| DocError::Stat {
        path: path.to_path_buf(),
        source: e,
    })?;
    meta.modified().map_err(|e| DocError::Stat {
        path: path.to_path_buf(),
        source: e,
    })
}
