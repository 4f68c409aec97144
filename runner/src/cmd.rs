use async_trait::async_trait;
use deploy_defs::SecretToken;
use log::debug;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Child;

#[cfg(test)]
use mockall::automock;

const DEFAULT_MAX_OUTPUT_LINES: usize = 200;

/// An external command to run, without going through a shell.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Added on top of the server's own environment.
    pub envs: BTreeMap<String, String>,
    /// Written to the child's stdin, used for passwords.
    pub stdin: Option<SecretToken>,
    pub current_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: &str) -> Self {
        CommandSpec {
            program: program.to_string(),
            ..Default::default()
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn envs(mut self, envs: &BTreeMap<String, String>) -> Self {
        self.envs
            .extend(envs.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn stdin(mut self, input: &SecretToken) -> Self {
        self.stdin = Some(input.clone());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }
}

// Program and arguments only; environment values stay out of logs.
impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Interleaved stdout and stderr.
    pub combined_output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Failed to start `{program}`: {message}")]
    Spawn { program: String, message: String },

    #[error("I/O error while running `{program}`: {message}")]
    Io { program: String, message: String },

    #[error("`{program}` did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },
}

/// Seam between the deployment logic and the tools it shells out to.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError>;
}

/// Runs commands as child processes of the server.
pub struct ProcessRunner {
    timeout: Duration,
    max_output_lines: usize,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        ProcessRunner {
            timeout,
            max_output_lines: DEFAULT_MAX_OUTPUT_LINES,
        }
    }

    pub fn with_max_output_lines(mut self, max_output_lines: usize) -> Self {
        self.max_output_lines = max_output_lines;
        self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        let io_error = |e: std::io::Error| CommandError::Io {
            program: spec.program.clone(),
            message: e.to_string(),
        };

        let mut exec = tokio::process::Command::new(&spec.program);
        exec.args(&spec.args)
            .envs(&spec.envs)
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.current_dir {
            exec.current_dir(dir);
        }

        debug!("Running `{}`", spec);
        let mut child = exec.spawn().map_err(|e| CommandError::Spawn {
            program: spec.program.clone(),
            message: e.to_string(),
        })?;

        if let (Some(input), Some(mut stdin)) = (&spec.stdin, child.stdin.take()) {
            stdin
                .write_all(input.expose().as_bytes())
                .await
                .map_err(io_error)?;
            stdin.shutdown().await.map_err(io_error)?;
        }

        let result = tokio::time::timeout(
            self.timeout,
            collect_output(&mut child, self.max_output_lines),
        )
        .await;

        match result {
            Ok(output) => output.map_err(io_error),
            Err(_) => {
                let _ = child.kill().await;
                Err(CommandError::Timeout {
                    program: spec.program.clone(),
                    timeout: self.timeout,
                })
            }
        }
    }
}

async fn collect_output(
    child: &mut Child,
    max_output_lines: usize,
) -> Result<CommandOutput, std::io::Error> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("stderr was not captured"))?;

    let mut stdout_reader = BufReader::new(stdout).lines();
    let mut stderr_reader = BufReader::new(stderr).lines();

    let mut last_lines = VecDeque::new();
    let mut stdout_done = false;
    let mut stderr_done = false;

    while !stdout_done || !stderr_done {
        let line = tokio::select! {
            line = stdout_reader.next_line(), if !stdout_done => {
                stdout_done = !matches!(line, Ok(Some(_)));
                line
            },
            line = stderr_reader.next_line(), if !stderr_done => {
                stderr_done = !matches!(line, Ok(Some(_)));
                line
            },
        };

        if let Some(line) = line? {
            debug!("{}", line);
            last_lines.push_back(line);
            if last_lines.len() > max_output_lines {
                last_lines.pop_front(); // Keep only the last N lines
            }
        }
    }

    let exit_status = child.wait().await?;

    let combined_output = last_lines
        .iter()
        .fold(String::new(), |acc, line| acc + line.as_str() + "\n");

    Ok(CommandOutput {
        exit_code: exit_status.code(),
        combined_output,
    })
}
