use super::WorkerEvent;
use std::io::{self, PipeReader};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

/// One pipe shared by the worker's stdout and stderr, so lines arrive in the
/// order the worker wrote them.
pub(crate) struct MergedOutput {
    pub reader: PipeReader,
    pub stdout: Stdio,
    pub stderr: Stdio,
}

impl MergedOutput {
    pub fn new() -> io::Result<Self> {
        let (reader, writer) = std::io::pipe()?;
        let stderr = writer.try_clone()?;
        Ok(Self {
            reader,
            stdout: Stdio::from(writer),
            stderr: Stdio::from(stderr),
        })
    }
}

/// Forward the merged output line by line until every writer has closed it.
#[cfg(unix)]
pub(crate) async fn capture_output(
    reader: PipeReader,
    event_tx: mpsc::UnboundedSender<WorkerEvent>,
) -> io::Result<()> {
    let stream = tokio::net::unix::pipe::Receiver::from_owned_fd(reader.into())?;
    forward_lines(stream, &event_tx).await
}

#[cfg(not(unix))]
pub(crate) async fn capture_output(
    reader: PipeReader,
    event_tx: mpsc::UnboundedSender<WorkerEvent>,
) -> io::Result<()> {
    use std::io::BufRead;

    tokio::task::spawn_blocking(move || {
        let mut reader = io::BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                return Ok(());
            }
            emit_line(&buf, &event_tx);
        }
    })
    .await
    .map_err(io::Error::other)?
}

async fn forward_lines<R>(stream: R, event_tx: &mpsc::UnboundedSender<WorkerEvent>) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        emit_line(&buf, event_tx);
    }
}

fn emit_line(buf: &[u8], event_tx: &mpsc::UnboundedSender<WorkerEvent>) {
    // Worker output is not guaranteed to be UTF-8.
    let text = String::from_utf8_lossy(buf);
    let line = text.trim_end_matches(['\n', '\r']);
    tracing::debug!(target: "worker", "{line}");
    let _ = event_tx.send(WorkerEvent::Output(line.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lossy_lines_without_terminators() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let input: &[u8] = b"first\r\nsecond \xff\nlast-without-newline";
        forward_lines(input, &tx).await.unwrap();
        drop(tx);

        let mut lines = Vec::new();
        while let Some(ev) = rx.recv().await {
            if let WorkerEvent::Output(line) = ev {
                lines.push(line);
            }
        }
        assert_eq!(
            lines,
            vec![
                "first".to_string(),
                "second \u{FFFD}".to_string(),
                "last-without-newline".to_string()
            ]
        );
    }
}
