//! Notification service
//!
//! Tells job owners when their job was killed for running out of time.
//! That is the only message the runner ever sends.

use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

/// Sendmail invocation used when none is configured
pub const DEFAULT_SENDMAIL: &str = "/usr/lib/sendmail -t";

/// Service trait for notifying job owners
#[async_trait]
pub trait Notifier: Send + Sync {
    /// `user`'s job submitted as `file_name` hit the time limit
    async fn job_out_of_time(&self, user: &str, file_name: &str) -> Result<()>;
}

/// Delivers mail by piping a message into sendmail
pub struct SendmailNotifier {
    program: String,
    args: Vec<String>,
}

impl SendmailNotifier {
    /// Parses a command line such as `/usr/lib/sendmail -t`
    pub fn from_command_line(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().context("Empty sendmail command")?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

#[async_trait]
impl Notifier for SendmailNotifier {
    async fn job_out_of_time(&self, user: &str, file_name: &str) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to start {}", self.program))?;

        let message = timeout_message(user, file_name);
        let mut stdin = child.stdin.take().context("sendmail stdin not captured")?;
        stdin.write_all(message.as_bytes()).await?;
        drop(stdin);

        let status = child.wait().await.context("Failed to wait for sendmail")?;
        if !status.success() {
            anyhow::bail!("{} exited with {}", self.program, status);
        }

        info!("Sent time limit notice to {} for {}", user, file_name);
        debug!("Message:\n{}", message);
        Ok(())
    }
}

/// Mail sent when a job is killed by the time limit
pub fn timeout_message(user: &str, file_name: &str) -> String {
    format!(
        "To: {}\nSubject: QLite job out of time\n\nYour QLite job:\n   {}\nran out of time.\n\n",
        user, file_name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_timeout_message() {
        let message = timeout_message("alice", "/home/alice/analysis.sh");

        assert!(message.starts_with("To: alice\nSubject: QLite job out of time\n\n"));
        assert!(message.contains("   /home/alice/analysis.sh\nran out of time."));
    }

    #[test]
    fn test_from_command_line() {
        let notifier = SendmailNotifier::from_command_line("/usr/lib/sendmail -t").unwrap();
        assert_eq!(notifier.program, "/usr/lib/sendmail");
        assert_eq!(notifier.args, vec!["-t".to_string()]);

        assert!(SendmailNotifier::from_command_line("   ").is_err());
    }

    #[tokio::test]
    async fn test_message_is_piped_to_program() {
        let dir = TempDir::new().unwrap();
        let mailbox = dir.path().join("mailbox");
        let script = dir.path().join("fake-sendmail");
        fs::write(&script, format!("cat > {}\n", mailbox.display())).unwrap();

        let notifier = SendmailNotifier {
            program: "/bin/sh".to_string(),
            args: vec![script.display().to_string()],
        };
        notifier.job_out_of_time("alice", "/home/alice/analysis.sh").await.unwrap();

        assert_eq!(
            fs::read_to_string(mailbox).unwrap(),
            timeout_message("alice", "/home/alice/analysis.sh")
        );
    }

    #[tokio::test]
    async fn test_failing_program_is_an_error() {
        let notifier = SendmailNotifier::from_command_line("/bin/false").unwrap();
        assert!(notifier.job_out_of_time("alice", "job.sh").await.is_err());
    }
}
