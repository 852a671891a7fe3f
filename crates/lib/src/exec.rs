//! Subprocess execution for command handlers: run one fixed program with fixed arguments.
//! No shell is used; arguments are passed as a list. Both output streams are captured and
//! the child is killed when the timeout elapses.

use std::process::Stdio;
use std::time::Duration;

use crate::config::ScheduleConfig;

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("exec {program} failed: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} timed out after {}s", .timeout.as_secs_f32())]
    Timeout { program: String, timeout: Duration },
    #[error("exit {status}: {output}")]
    Failed { status: String, output: String },
}

/// Captured output of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptOutput {
    pub stdout: String,
    pub stderr: String,
}

/// A program plus arguments, run with a timeout.
#[derive(Debug, Clone)]
pub struct ScriptCommand {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ScriptCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(config: &ScheduleConfig) -> Self {
        Self::new(
            config.program.clone(),
            config.args.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run to completion. Returns captured output on exit status 0; otherwise the error carries
    /// stdout followed by stderr.
    pub async fn run(&self) -> Result<ScriptOutput, ExecError> {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ExecError::Timeout {
                program: self.program.clone(),
                timeout: self.timeout,
            })?
            .map_err(|source| ExecError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if output.status.success() {
            Ok(ScriptOutput { stdout, stderr })
        } else {
            let mut msg = stdout;
            if !stderr.is_empty() {
                if !msg.is_empty() {
                    msg.push('\n');
                }
                msg.push_str(&stderr);
            }
            Err(ExecError::Failed {
                status: output.status.to_string(),
                output: msg,
            })
        }
    }
}
