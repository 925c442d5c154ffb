//! Content-addressed compilation cache and the external compiler invocation.
//!
//! Each graph owns a directory named after it under the cache root, holding
//! the emitted MLIR text, the compiled artifact, the exact compile command
//! used, and the compiler's self-reported statistics. The command file lets
//! a later compile detect drift: a hit requires the stored input and command
//! to match the fresh ones byte for byte.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;

use crate::backend::Backend;
use crate::error::{Error, Result};

const INPUT_FILE_NAME: &str = "iree-compile-input.mlir";
const OUTPUT_FILE_NAME: &str = "iree-compile-output.vmfb";
const COMMAND_FILE_NAME: &str = "iree-compile-command.txt";
const STATISTICS_FILE_NAME: &str = "iree-compile-statistics.json";

/// Selects one of the files making up a graph's cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheFileKind {
    /// Emitted MLIR assembly fed to the compiler.
    Input,
    /// Compiled artifact produced by the compiler.
    Output,
    /// Exact textual compile command that produced the artifact.
    Command,
    /// Compiler's self-reported scheduling statistics.
    Statistics,
}

impl CacheFileKind {
    fn file_name(self) -> &'static str {
        match self {
            CacheFileKind::Input => INPUT_FILE_NAME,
            CacheFileKind::Output => OUTPUT_FILE_NAME,
            CacheFileKind::Command => COMMAND_FILE_NAME,
            CacheFileKind::Statistics => STATISTICS_FILE_NAME,
        }
    }
}

/// One file of a cache entry. When `remove_on_drop` is set the file (and
/// its directory, once empty) is deleted when the owning graph goes away.
#[derive(Debug)]
pub(crate) struct CacheFile {
    path: PathBuf,
    remove_on_drop: bool,
}

impl CacheFile {
    pub(crate) fn create(graph_name: &str, kind: CacheFileKind, remove: bool) -> Result<Self> {
        let path = Self::path_for(graph_name, kind)?;
        let parent = path.parent().expect("cache file path has a parent");
        fs::create_dir_all(parent).map_err(|err| {
            Error::compile_failure(format!(
                "failed to create cache directory {}: {err}",
                parent.display()
            ))
        })?;
        Ok(CacheFile {
            path,
            remove_on_drop: remove,
        })
    }

    /// Path a file of this kind would have for the given graph name.
    pub(crate) fn path_for(graph_name: &str, kind: CacheFileKind) -> Result<PathBuf> {
        if graph_name.is_empty() {
            return Err(Error::attribute_not_set(
                "graph name must be set before cache paths can be derived",
            ));
        }
        Ok(cache_root().join(graph_name).join(kind.file_name()))
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn read(&self) -> Result<String> {
        fs::read_to_string(&self.path).map_err(|err| {
            Error::compile_failure(format!(
                "failed to read cache file {}: {err}",
                self.path.display()
            ))
        })
    }

    pub(crate) fn write(&self, contents: &str) -> Result<()> {
        fs::write(&self.path, contents).map_err(|err| {
            Error::compile_failure(format!(
                "failed to write cache file {}: {err}",
                self.path.display()
            ))
        })
    }

    pub(crate) fn disarm(&mut self) {
        self.remove_on_drop = false;
    }
}

impl Drop for CacheFile {
    fn drop(&mut self) {
        if self.remove_on_drop {
            let _ = fs::remove_file(&self.path);
            if let Some(parent) = self.path.parent() {
                // Only succeeds once the last sibling is gone.
                let _ = fs::remove_dir(parent);
            }
        }
    }
}

/// The full cache entry for one graph.
#[derive(Debug)]
pub(crate) struct CachedAssets {
    pub(crate) input: CacheFile,
    pub(crate) output: CacheFile,
    pub(crate) command: CacheFile,
    pub(crate) statistics: CacheFile,
}

impl CachedAssets {
    pub(crate) fn create(graph_name: &str, remove: bool) -> Result<Self> {
        Ok(CachedAssets {
            input: CacheFile::create(graph_name, CacheFileKind::Input, remove)?,
            output: CacheFile::create(graph_name, CacheFileKind::Output, remove)?,
            command: CacheFile::create(graph_name, CacheFileKind::Command, remove)?,
            statistics: CacheFile::create(graph_name, CacheFileKind::Statistics, remove)?,
        })
    }

    pub(crate) fn file(&self, kind: CacheFileKind) -> &CacheFile {
        match kind {
            CacheFileKind::Input => &self.input,
            CacheFileKind::Output => &self.output,
            CacheFileKind::Command => &self.command,
            CacheFileKind::Statistics => &self.statistics,
        }
    }

    pub(crate) fn disarm(&mut self) {
        self.input.disarm();
        self.output.disarm();
        self.command.disarm();
        self.statistics.disarm();
    }
}

/// Deterministic compile command: compiler, input, the backend's fixed flag
/// vector, statistics dump flags, `-o`, output. Space-joined with a
/// trailing newline, exactly as stored in the command cache file.
pub(crate) fn build_compile_command(
    backend: Backend,
    input: &Path,
    output: &Path,
    statistics: &Path,
) -> String {
    let mut args: Vec<String> = vec![compiler_binary(), input.display().to_string()];
    args.extend(backend.compile_flags().iter().map(|flag| flag.to_string()));
    args.push("--iree-scheduling-dump-statistics-format=json".to_string());
    args.push(format!(
        "--iree-scheduling-dump-statistics-file={}",
        statistics.display()
    ));
    args.push("-o".to_string());
    args.push(output.display().to_string());
    let mut command = args.join(" ");
    command.push('\n');
    command
}

/// Runs the compile command as a child process with captured output.
/// Non-zero exit is a `CompileFailure`; the input file is left on disk so
/// the failure can be reproduced by hand.
pub(crate) fn run_compile_command(command: &str) -> Result<()> {
    let args: Vec<&str> = command.split_whitespace().collect();
    let (binary, rest) = args
        .split_first()
        .ok_or_else(|| Error::compile_failure("compile command is empty"))?;

    let output = Command::new(binary).args(rest).output().map_err(|err| {
        Error::compile_failure(format!("failed to run compiler {binary}: {err}"))
    })?;

    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::compile_failure(format!(
            "compiler exited with {}: stdout='{}' stderr='{}'",
            output.status,
            stdout.trim(),
            stderr.trim()
        )));
    }
    Ok(())
}

/// Counts the compiler reports about the artifact it produced.
#[derive(Debug, Clone, Deserialize)]
pub struct CompileStatistics {
    #[serde(rename = "dispatch-count", default)]
    pub dispatch_count: Option<u64>,
}

/// Parses the statistics dump written next to the artifact.
pub fn parse_statistics(json: &str) -> Result<CompileStatistics> {
    serde_json::from_str(json).map_err(|err| {
        Error::compile_failure(format!("failed to parse compiler statistics: {err}"))
    })
}

/// Cache root: `WEFT_CACHE_DIR`, else `$HOME/.cache/weft`, else a relative
/// `.cache/weft` for environments without a home directory.
pub(crate) fn cache_root() -> PathBuf {
    if let Ok(value) = std::env::var("WEFT_CACHE_DIR") {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        let trimmed = home.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed).join(".cache").join("weft");
        }
    }
    PathBuf::from(".cache/weft")
}

/// Compiler binary: `WEFT_IREE_COMPILE` override, else `iree-compile` from
/// the environment's search path.
fn compiler_binary() -> String {
    if let Ok(value) = std::env::var("WEFT_IREE_COMPILE") {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    "iree-compile".to_string()
}
