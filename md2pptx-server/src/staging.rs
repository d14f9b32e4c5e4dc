//! Upload staging
//!
//! Turns a client-supplied file name into a single path component inside the
//! upload directory and writes the uploaded bytes there. The generated deck
//! lives next to it as `<name>.pptx`.

use std::io;
use std::path::{Path, PathBuf};

/// Extension an upload must carry to be accepted
pub const ACCEPTED_EXTENSION: &str = ".md";

/// Extension appended to the staged name for the converter output
pub const OUTPUT_EXTENSION: &str = ".pptx";

/// Reduce a client-supplied file name to a safe single path component
///
/// Keeps only the last `/`- or `\`-separated segment and trims it. Returns
/// `None` for names that are empty, `.`, `..`, or contain control characters.
pub fn sanitize_file_name(raw: &str) -> Option<String> {
    let basename = raw
        .trim()
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim();

    if basename.is_empty() || basename == "." || basename == ".." {
        return None;
    }
    if basename.chars().any(char::is_control) {
        return None;
    }

    Some(basename.to_string())
}

/// Whether a sanitized name is a Markdown file
pub fn has_accepted_extension(file_name: &str) -> bool {
    file_name.ends_with(ACCEPTED_EXTENSION)
}

/// Input/output locations for one upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedUpload {
    /// Sanitized original file name
    pub file_name: String,
    /// `<uploadDir>/<file_name>`
    pub input_path: PathBuf,
    /// `<uploadDir>/<file_name>.pptx`
    pub output_path: PathBuf,
}

impl StagedUpload {
    /// Compute staging paths for an already-sanitized file name
    pub fn plan(upload_dir: &Path, file_name: &str) -> Self {
        let output_name = format!("{}{}", file_name, OUTPUT_EXTENSION);
        Self {
            file_name: file_name.to_string(),
            input_path: upload_dir.join(file_name),
            output_path: upload_dir.join(output_name),
        }
    }

    /// File name offered to the client in `Content-Disposition`
    pub fn download_name(&self) -> String {
        format!("{}{}", self.file_name, OUTPUT_EXTENSION)
    }

    /// Both staged paths, output first
    pub fn paths(&self) -> [PathBuf; 2] {
        [self.output_path.clone(), self.input_path.clone()]
    }

    /// Write the uploaded bytes, replacing any previous file of the same name
    pub async fn write_input(&self, bytes: &[u8]) -> io::Result<()> {
        tokio::fs::write(&self.input_path, bytes).await
    }

    /// Whether the converter left an output file behind
    pub async fn output_exists(&self) -> bool {
        tokio::fs::metadata(&self.output_path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }
}
