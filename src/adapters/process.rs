use crate::domain::model::{CommandOutput, ExternalCommand};
use crate::domain::ports::CommandRunner;
use crate::utils::error::{DeskError, ErrorHandler, Result};
use std::time::{Duration, Instant};
use tokio::process::Command;

/// Roda comandos externos como processos filhos.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait::async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, command: &ExternalCommand) -> Result<CommandOutput> {
        tracing::info!("🖥️ Running {} {}", command.program, command.args.join(" "));
        let started = Instant::now();

        let mut child = Command::new(&command.program);
        child.args(&command.args).envs(&command.env).kill_on_drop(true);

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.output())
                .await
                .map_err(|_| DeskError::SystemConnectionError {
                    message: format!("command timed out after {}s", limit.as_secs()),
                    system: command.program.clone(),
                })?,
            None => child.output().await,
        }
        .map_err(|e| ErrorHandler::system_error(e, &command.program))?;

        let result = CommandOutput {
            status_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        tracing::debug!(
            "Command {} exited with {:?} after {:?}",
            command.program,
            result.status_code,
            started.elapsed()
        );
        Ok(result)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sh(script: &str) -> ExternalCommand {
        ExternalCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            env: BTreeMap::from([("DIA_FIM".to_string(), "15/07/2025".to_string())]),
        }
    }

    #[tokio::test]
    async fn test_captures_output_and_env() {
        let output = ProcessRunner::new().run(&sh("echo $DIA_FIM")).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "15/07/2025");
    }

    #[tokio::test]
    async fn test_non_zero_exit() {
        let output = ProcessRunner::new().run(&sh("echo boom >&2; exit 3")).await.unwrap();
        assert_eq!(output.status_code, Some(3));
        assert_eq!(output.stderr.trim(), "boom");
    }

    #[tokio::test]
    async fn test_missing_program_is_system_error() {
        let command = ExternalCommand {
            program: "definitely-not-a-real-program-oceanicdesk".to_string(),
            args: Vec::new(),
            env: BTreeMap::new(),
        };
        let err = ProcessRunner::new().run(&command).await.unwrap_err();
        assert!(matches!(err, DeskError::SystemConnectionError { .. }));
    }

    #[tokio::test]
    async fn test_timeout() {
        let runner = ProcessRunner::new().with_timeout(Duration::from_millis(100));
        assert!(runner.run(&sh("sleep 5")).await.is_err());
    }
}
