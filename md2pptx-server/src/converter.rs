//! External converter invocation
//!
//! Runs the Markdown-to-presentation command-line tool (Marp by default) as
//! `<program> <input> --pptx -o <output>`. Child stdout/stderr are inherited so
//! converter diagnostics show up in the service log stream. Each run is bounded
//! by a timeout; on expiry the child is killed.
//!
//! # Installation
//! ```bash
//! npm install -g @marp-team/marp-cli
//! ```

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// Flag selecting PowerPoint output
const PPTX_FLAG: &str = "--pptx";
/// Flag introducing the output path
const OUTPUT_FLAG: &str = "-o";

/// Converter settings taken from service configuration
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    /// Executable name (searched on PATH) or path to the executable
    pub program: String,
    /// Upper bound on a single conversion
    pub timeout: Duration,
}

/// Converter failures
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("converter executable not found: {0}")]
    NotFound(String),

    #[error("failed to start converter {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed waiting for converter: {0}")]
    Wait(#[source] io::Error),

    #[error("converter timed out after {}s", .0.as_secs_f64())]
    TimedOut(Duration),
}

/// Result of a converter run that exited on its own
#[derive(Debug, Clone, Copy)]
pub struct ConversionOutcome {
    pub status: ExitStatus,
    pub elapsed: Duration,
}

/// Located converter executable
#[derive(Debug, Clone)]
pub struct Converter {
    program: PathBuf,
    timeout: Duration,
}

impl Converter {
    /// Resolve the configured program to an executable path
    ///
    /// Values containing a path separator are used as given and must exist.
    /// Bare names are searched on `PATH`.
    pub fn locate(config: &ConverterConfig) -> Result<Self, ConvertError> {
        let program = resolve_program(&config.program, std::env::var_os("PATH"))
            .ok_or_else(|| ConvertError::NotFound(config.program.clone()))?;

        debug!(program = %program.display(), "Converter located");

        Ok(Self {
            program,
            timeout: config.timeout,
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Convert `input` into a deck at `output`
    ///
    /// The exit status is reported but not judged; callers check for the
    /// output file instead.
    pub async fn convert(
        &self,
        input: &Path,
        output: &Path,
    ) -> Result<ConversionOutcome, ConvertError> {
        let started = Instant::now();

        let mut child = Command::new(&self.program)
            .arg(input)
            .arg(PPTX_FLAG)
            .arg(OUTPUT_FLAG)
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ConvertError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => Ok(ConversionOutcome {
                status,
                elapsed: started.elapsed(),
            }),
            Ok(Err(e)) => Err(ConvertError::Wait(e)),
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill timed-out converter");
                }
                Err(ConvertError::TimedOut(self.timeout))
            }
        }
    }
}

fn resolve_program(program: &str, path_var: Option<OsString>) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    find_on_path(program, path_var?)
}

/// Search each `PATH` entry for an executable named `name`
///
/// On Windows each `PATHEXT` extension (`.cmd`, `.exe`, ...) is tried too,
/// since npm installs Marp as `marp.cmd` there.
pub fn find_on_path(name: &str, path_var: OsString) -> Option<PathBuf> {
    let extensions = executable_extensions();

    std::env::split_paths(&path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .flat_map(|dir| {
            extensions
                .iter()
                .map(move |ext| dir.join(format!("{}{}", name, ext)))
        })
        .find(|candidate| is_executable(candidate))
}

#[cfg(windows)]
fn executable_extensions() -> Vec<String> {
    let mut extensions = vec![String::new()];
    let pathext = std::env::var("PATHEXT").unwrap_or_else(|_| ".COM;.EXE;.BAT;.CMD".to_string());
    extensions.extend(
        pathext
            .split(';')
            .filter(|ext| !ext.is_empty())
            .map(|ext| ext.to_ascii_lowercase()),
    );
    extensions
}

#[cfg(not(windows))]
fn executable_extensions() -> Vec<String> {
    vec![String::new()]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
