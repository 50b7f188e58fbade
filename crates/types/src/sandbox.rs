use std::{fmt, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{ResultParseError, StagingError};

pub const DEFAULT_TIME_LIMIT_RESERVE: u64 = 1;
pub const DEFAULT_MEMORY_LIMIT_RESERVE: u64 = 32 * 1024;
pub const DEFAULT_INPUT_FILE_MODE: u32 = 0o644;
pub const PROGRAM_FILE_MODE: u32 = 0o755;

/// One sandboxed run. Limits use the enforcement binary's units: seconds for
/// time, KiB for memory, bytes for output. Zero means unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Host path of the program to run. It is staged under its base name.
    pub program: PathBuf,
    #[serde(default)]
    pub file_stdin: Option<String>,
    #[serde(default)]
    pub file_stdout: Option<String>,
    #[serde(default)]
    pub file_stderr: Option<String>,
    #[serde(default)]
    pub time_limit: u64,
    #[serde(default = "default_time_limit_reserve")]
    pub time_limit_reserve: u64,
    #[serde(default)]
    pub memory_limit: u64,
    #[serde(default = "default_memory_limit_reserve")]
    pub memory_limit_reserve: u64,
    #[serde(default)]
    pub output_limit: u64,
    #[serde(default)]
    pub process_limit: u64,
    #[serde(default)]
    pub input_files: Vec<InputFile>,
    #[serde(default)]
    pub output_files: Vec<String>,
}

impl RunOptions {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            file_stdin: None,
            file_stdout: None,
            file_stderr: None,
            time_limit: 0,
            time_limit_reserve: DEFAULT_TIME_LIMIT_RESERVE,
            memory_limit: 0,
            memory_limit_reserve: DEFAULT_MEMORY_LIMIT_RESERVE,
            output_limit: 0,
            process_limit: 0,
            input_files: Vec::new(),
            output_files: Vec::new(),
        }
    }

    /// Every name that ends up inside the sandbox must reduce to a base name.
    pub fn validate(&self) -> Result<(), StagingError> {
        let program = self.program.to_string_lossy();
        require_basename(&program)?;

        let redirects = [&self.file_stdin, &self.file_stdout, &self.file_stderr];
        for name in redirects.into_iter().flatten() {
            require_basename(name)?;
        }
        for file in &self.input_files {
            require_basename(&file.name)?;
        }
        for name in &self.output_files {
            require_basename(name)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFile {
    pub name: String,
    #[serde(default = "default_input_file_mode")]
    pub mode: u32,
    pub data: Vec<u8>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            mode: DEFAULT_INPUT_FILE_MODE,
            data: data.into(),
        }
    }
}

/// A file as it travels through the archive codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub name: String,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    Started,
    ExecRunning,
    ExecFinished,
    Removed,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::ExecRunning => "exec_running",
            Self::ExecFinished => "exec_finished",
            Self::Removed => "removed",
        };
        f.write_str(label)
    }
}

/// Verdict written by the enforcement binary, four lines:
///
/// ```text
/// <status token>
/// <debug info, may be empty>
/// <time usage>
/// <memory usage>
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: String,
    pub debug_info: String,
    pub time_usage: i64,
    pub memory_usage: i64,
}

impl ExecutionResult {
    pub fn parse(content: &str) -> Result<Self, ResultParseError> {
        let mut lines = content.split('\n').map(|line| line.trim_end_matches('\r'));

        let status = lines
            .next()
            .filter(|line| !line.trim().is_empty())
            .ok_or(ResultParseError::MissingField { field: "status" })?;
        let debug_info = lines
            .next()
            .ok_or(ResultParseError::MissingField {
                field: "debug_info",
            })?;
        let time_usage = parse_integer(lines.next(), "time_usage")?;
        let memory_usage = parse_integer(lines.next(), "memory_usage")?;

        Ok(Self {
            status: status.to_owned(),
            debug_info: debug_info.to_owned(),
            time_usage,
            memory_usage,
        })
    }

    /// Render in the result-file format. `debug_info` must not contain a
    /// newline for the output to parse back.
    pub fn to_result_file(&self) -> String {
        format!(
            "{}\n{}\n{}\n{}\n",
            self.status, self.debug_info, self.time_usage, self.memory_usage
        )
    }

    pub fn verdict(&self) -> ResultStatus {
        ResultStatus::from_token(&self.status)
    }
}

fn parse_integer(line: Option<&str>, field: &'static str) -> Result<i64, ResultParseError> {
    let raw = line.ok_or(ResultParseError::MissingField { field })?;
    let value = raw.trim();
    if value.is_empty() {
        return Err(ResultParseError::MissingField { field });
    }
    value
        .parse()
        .map_err(|_| ResultParseError::InvalidInteger {
            field,
            value: value.to_owned(),
        })
}

/// Status tokens emitted by the stock enforcement binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultStatus {
    ExitedNormally,
    RuntimeError,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    OutputLimitExceeded,
    Other(String),
}

impl ResultStatus {
    pub fn from_token(token: &str) -> Self {
        match token.trim() {
            "Exited Normally" => Self::ExitedNormally,
            "Runtime Error" => Self::RuntimeError,
            "Time Limit Exceeded" => Self::TimeLimitExceeded,
            "Memory Limit Exceeded" => Self::MemoryLimitExceeded,
            "Output Limit Exceeded" => Self::OutputLimitExceeded,
            other => Self::Other(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::ExitedNormally => "Exited Normally",
            Self::RuntimeError => "Runtime Error",
            Self::TimeLimitExceeded => "Time Limit Exceeded",
            Self::MemoryLimitExceeded => "Memory Limit Exceeded",
            Self::OutputLimitExceeded => "Output Limit Exceeded",
            Self::Other(token) => token,
        }
    }

    pub fn is_limit_exceeded(&self) -> bool {
        matches!(
            self,
            Self::TimeLimitExceeded | Self::MemoryLimitExceeded | Self::OutputLimitExceeded
        )
    }
}

/// A requested output file. `data` is `None` when the file never became
/// retrievable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFile {
    pub name: String,
    pub data: Option<Vec<u8>>,
}

impl OutputFile {
    pub fn is_present(&self) -> bool {
        self.data.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub result: ExecutionResult,
    pub output_files: Vec<OutputFile>,
}

/// Final path component of a caller-supplied name, or `None` for names such
/// as `""`, `"."`, `".."` or `"/"`.
pub fn sandbox_basename(name: &str) -> Option<&str> {
    Path::new(name).file_name().and_then(|base| base.to_str())
}

/// `<sandbox_root>/<basename(name)>`.
pub fn sandboxed_path(sandbox_root: &str, name: &str) -> Option<String> {
    let base = sandbox_basename(name)?;
    Some(format!("{}/{base}", sandbox_root.trim_end_matches('/')))
}

fn require_basename(name: &str) -> Result<(), StagingError> {
    match sandbox_basename(name) {
        Some(_) => Ok(()),
        None => Err(StagingError::InvalidFileName {
            name: name.to_owned(),
        }),
    }
}

fn default_time_limit_reserve() -> u64 {
    DEFAULT_TIME_LIMIT_RESERVE
}

fn default_memory_limit_reserve() -> u64 {
    DEFAULT_MEMORY_LIMIT_RESERVE
}

fn default_input_file_mode() -> u32 {
    DEFAULT_INPUT_FILE_MODE
}
