//! Exec action: run a command per delivery.
//!
//! The command is invoked as `program args... <event_type> <delivery_id>`
//! with the raw payload on stdin. Its stdout and stderr are inherited.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::domain::Delivery;
use crate::ports::{DeliveryHandler, HandlerError};

/// Runs an external command for every delivery.
#[derive(Debug, Clone)]
pub struct ExecAction {
    program: String,
    args: Vec<String>,
}

impl ExecAction {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Builds from a command line; `None` when it is empty.
    pub fn from_command_line(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }

    fn command_args(&self, delivery: &Delivery) -> Vec<String> {
        let mut args = self.args.clone();
        args.push(delivery.event_type.clone());
        args.push(delivery.delivery_id.clone());
        args
    }
}

#[async_trait]
impl DeliveryHandler for ExecAction {
    async fn handle(&self, delivery: Delivery) -> Result<(), HandlerError> {
        let args = self.command_args(&delivery);
        tracing::debug!(
            size = delivery.size(),
            command = %self.program,
            args = ?args,
            "Received event, executing command"
        );

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            // A command that exits without reading its input closes the pipe.
            match stdin.write_all(&delivery.body).await {
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => return Err(e.into()),
                _ => {}
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(HandlerError::failed(format!(
                "{} exited with {}",
                self.program, status
            )));
        }
        Ok(())
    }
}
