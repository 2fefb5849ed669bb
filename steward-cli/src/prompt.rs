use std::io::IsTerminal;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use steward_core::error::Result;
use steward_core::{ConfirmationSource, Prompter};

/// Reads one line from stdin after writing the prompt to stderr.
pub struct StdinPrompter;

#[async_trait]
impl Prompter for StdinPrompter {
    async fn ask(&self, prompt: &str) -> Result<Option<String>> {
        let mut stderr = tokio::io::stderr();
        stderr.write_all(prompt.as_bytes()).await?;
        stderr.flush().await?;

        let mut line = String::new();
        let read = BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        Ok((read > 0).then_some(line))
    }
}

/// Force wins; otherwise ask only when someone can answer.
pub fn confirmation_source(force: bool) -> ConfirmationSource {
    if force {
        ConfirmationSource::Forced
    } else if std::io::stdin().is_terminal() {
        ConfirmationSource::Interactive(Box::new(StdinPrompter))
    } else {
        ConfirmationSource::Denied
    }
}
