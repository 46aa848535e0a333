use std::{
    io,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tokio::{fs::OpenOptions, io::AsyncWriteExt};

/// Append-only text log written by a single job.
#[derive(Debug, Clone)]
pub struct LogSink {
    path: PathBuf,
}

impl LogSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends each line followed by a newline, creating the file if needed.
    pub async fn append<I, S>(&self, lines: I) -> Result<(), LogSinkError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut buffer = String::new();
        for line in lines {
            buffer.push_str(line.as_ref());
            buffer.push('\n');
        }

        self.write(buffer.as_bytes()).await.map_err(|source| LogSinkError {
            path: self.path.clone(),
            source,
        })
    }

    async fn write(&self, bytes: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(bytes).await?;
        file.flush().await
    }
}

#[derive(Debug, Error)]
#[error("failed to append to {}: {source}", .path.display())]
pub struct LogSinkError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}
