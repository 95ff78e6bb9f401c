//! Worker that shells out to an external AI tool.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command as TokioCommand;

use super::{AiWorker, WorkerError, WorkerOutcome, WorkerRequest};

/// Runs a command template through `sh -c` inside the repository checkout.
/// The checkout directory is created if it does not exist yet.
///
/// Placeholders, each substituted as a single-quoted shell word:
/// `{repo}` repository path, `{file}` absolute path of the target file,
/// `{owner}` effective owner, `{name}` repository name.
#[derive(Debug, Clone)]
pub struct CommandWorker {
    template: String,
}

impl CommandWorker {
    pub fn new(template: impl Into<String>) -> Result<Self, WorkerError> {
        let template = template.into();
        if template.trim().is_empty() {
            return Err(WorkerError::InvalidTemplate(
                "command template is empty".to_string(),
            ));
        }
        Ok(Self { template })
    }

    pub fn render(&self, request: &WorkerRequest) -> String {
        let file = request.repository_path.join(&request.target_path);
        self.template
            .replace("{repo}", &shell_quote(&request.repository_path.to_string_lossy()))
            .replace("{file}", &shell_quote(&file.to_string_lossy()))
            .replace("{owner}", &shell_quote(&request.owner))
            .replace("{name}", &shell_quote(&request.repository_name))
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[async_trait]
impl AiWorker for CommandWorker {
    async fn run(&self, request: &WorkerRequest) -> Result<WorkerOutcome, WorkerError> {
        let script = self.render(request);
        log::debug!(
            "Running worker command in {}: {}",
            request.repository_path.display(),
            script
        );

        tokio::fs::create_dir_all(&request.repository_path)
            .await
            .map_err(|e| WorkerError::Workspace {
                path: request.repository_path.clone(),
                source: e,
            })?;

        let output = TokioCommand::new("sh")
            .arg("-c")
            .arg(&script)
            .current_dir(&request.repository_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| WorkerError::Spawn {
                program: "sh".to_string(),
                source: e,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if output.status.success() {
            return Ok(WorkerOutcome::succeeded(stdout));
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("exit code {}", output.status.code().unwrap_or(-1))
        } else {
            stderr
        };
        log::warn!(
            "Worker command failed for {}/{}: {}",
            request.owner,
            request.repository_name,
            message
        );
        Ok(WorkerOutcome::failed(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn request(repo: &Path) -> WorkerRequest {
        WorkerRequest {
            repository_path: repo.to_path_buf(),
            target_path: "src/it's.ts".to_string(),
            owner: "acme".to_string(),
            repository_name: "widgets".to_string(),
        }
    }

    #[test]
    fn test_empty_template_rejected() {
        assert!(matches!(
            CommandWorker::new("  "),
            Err(WorkerError::InvalidTemplate(_))
        ));
    }

    #[test]
    fn test_render_quotes_every_placeholder() {
        let worker = CommandWorker::new("improve --file {file} --owner {owner}").unwrap();
        let rendered = worker.render(&request(Path::new("/ws/widgets")));
        assert_eq!(
            rendered,
            r"improve --file '/ws/widgets/src/it'\''s.ts' --owner 'acme'"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_success_returns_trimmed_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let worker =
            CommandWorker::new("echo working; echo https://github.com/{owner}/{name}/pull/1")
                .unwrap();
        let outcome = worker.run(&request(dir.path())).await.unwrap();
        assert!(outcome.success);
        assert_eq!(
            outcome.output,
            "working\nhttps://github.com/acme/widgets/pull/1"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failure_reports_stderr_or_exit_code() {
        let dir = tempfile::tempdir().unwrap();

        let worker = CommandWorker::new("echo quota exceeded >&2; exit 3").unwrap();
        let outcome = worker.run(&request(dir.path())).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.output, "quota exceeded");

        let worker = CommandWorker::new("exit 4").unwrap();
        let outcome = worker.run(&request(dir.path())).await.unwrap();
        assert_eq!(outcome.output, "exit code 4");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_checkout_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let checkout = dir.path().join("workspaces").join("widgets");
        let worker = CommandWorker::new("pwd").unwrap();

        let outcome = worker.run(&request(&checkout)).await.unwrap();
        assert!(outcome.success);
        assert!(checkout.is_dir());
        assert!(outcome.output.ends_with("/workspaces/widgets"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unusable_checkout_is_workspace_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("taken");
        std::fs::write(&blocker, "not a directory").unwrap();

        let worker = CommandWorker::new("true").unwrap();
        let result = worker.run(&request(&blocker.join("widgets"))).await;
        assert!(matches!(result, Err(WorkerError::Workspace { .. })));
    }
}
