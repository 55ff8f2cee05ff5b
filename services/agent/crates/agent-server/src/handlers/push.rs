//! `push` — stream one local file to the upload service.
//!
//! Wire protocol: the 16 raw bytes of the task identifier, then the file's
//! bytes, then connection close. No framing, no acknowledgements; an
//! interrupted transfer is not resumed.

use std::io;
use std::path::Path;

use serde_json::Value;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use serverspy_common::{AgentError, PushOutcome, TaskId};

use super::TaskContext;
use crate::upload::UploadConnector;

pub(super) async fn run<U: UploadConnector>(ctx: &TaskContext<'_, U>) -> Result<Value, AgentError> {
    let outcome = match ctx.task.data_path() {
        Some(source) => {
            push_file(
                ctx.task_id,
                Path::new(source),
                ctx.config.upload_chunk_size,
                ctx.uploader,
            )
            .await
        }
        None => PushOutcome::failed(-1, "push task data is not a file path"),
    };

    if outcome.status {
        tracing::info!(task_id = %ctx.task_id, "push complete");
    } else {
        tracing::warn!(task_id = %ctx.task_id, errno = outcome.errno, errstr = %outcome.errstr, "push failed");
    }

    serde_json::to_value(outcome)
        .map_err(|e| AgentError::Internal(format!("failed to encode push outcome: {e}")))
}

/// Upload `source` through `uploader`. Never fails: every error is folded
/// into the returned outcome.
pub async fn push_file<U: UploadConnector>(
    task_id: &TaskId,
    source: &Path,
    chunk_size: usize,
    uploader: &U,
) -> PushOutcome {
    let header = match task_id.wire_bytes() {
        Ok(bytes) => bytes,
        Err(e) => return PushOutcome::failed(-1, format!("cannot encode task id: {e}")),
    };

    let mut local = match File::open(source).await {
        Ok(file) => file,
        Err(e) => {
            tracing::debug!(source = %source.display(), error = %e, "cannot open push source");
            return PushOutcome::from_io(&e);
        }
    };

    let mut upload = match uploader.connect().await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::debug!(upload = %uploader.target(), error = %e, "upload connect failed");
            return PushOutcome::from_io(&e);
        }
    };

    match stream_file(&header, &mut local, &mut upload, chunk_size).await {
        Ok(sent) => {
            tracing::debug!(upload = %uploader.target(), bytes = sent, "upload stream closed");
            PushOutcome::ok()
        }
        Err(e) => PushOutcome::from_io(&e),
    }
}

/// Write `header`, then `local` in `chunk_size` pieces, flushing after each
/// write, then shut the stream down. Returns the number of file bytes sent.
async fn stream_file<R, W>(
    header: &[u8],
    local: &mut R,
    upload: &mut W,
    chunk_size: usize,
) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    upload.write_all(header).await?;
    upload.flush().await?;

    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut sent = 0u64;
    loop {
        let n = fill_chunk(local, &mut buf).await?;
        if n == 0 {
            break;
        }
        upload.write_all(&buf[..n]).await?;
        upload.flush().await?;
        sent += n as u64;
    }

    upload.shutdown().await?;
    Ok(sent)
}

/// Read until `buf` is full or the source ends, so only the last chunk of
/// a file can be short.
async fn fill_chunk<R: AsyncRead + Unpin>(local: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = local.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};

    /// Records every write and flush it receives.
    #[derive(Clone, Default)]
    struct Recorder {
        writes: Arc<Mutex<Vec<Vec<u8>>>>,
        flushes: Arc<Mutex<usize>>,
        shut_down: Arc<Mutex<bool>>,
    }

    impl AsyncWrite for Recorder {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            self.writes.lock().unwrap().push(buf.to_vec());
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            *self.flushes.lock().unwrap() += 1;
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            *self.shut_down.lock().unwrap() = true;
            Poll::Ready(Ok(()))
        }
    }

    struct RecordingConnector(Recorder);

    impl UploadConnector for RecordingConnector {
        type Stream = Recorder;

        async fn connect(&self) -> io::Result<Recorder> {
            Ok(self.0.clone())
        }

        fn target(&self) -> String {
            "recorder".into()
        }
    }

    struct RefusingConnector;

    impl UploadConnector for RefusingConnector {
        type Stream = Recorder;

        async fn connect(&self) -> io::Result<Recorder> {
            Err(io::Error::from_raw_os_error(111))
        }

        fn target(&self) -> String {
            "nowhere:443".into()
        }
    }

    fn task_id() -> TaskId {
        TaskId::parse("123e4567-e89b-12d3-a456-426614174000").unwrap()
    }

    #[tokio::test]
    async fn streams_id_then_full_chunks() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = dir.path().join("backup.tar");
        let content: Vec<u8> = (0..600_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&source, &content).unwrap();

        let recorder = Recorder::default();
        let connector = RecordingConnector(recorder.clone());
        let outcome = push_file(&task_id(), &source, 256_000, &connector).await;
        assert_eq!(outcome, PushOutcome::ok());

        let writes = recorder.writes.lock().unwrap();
        assert_eq!(writes[0], task_id().wire_bytes().unwrap().to_vec());
        assert_eq!(writes[0].len(), 16);

        let chunks = &writes[1..];
        assert_eq!(chunks.len(), 600_000_usize.div_ceil(256_000));
        assert!(chunks.iter().all(|c| c.len() <= 256_000));
        assert_eq!(chunks[0].len(), 256_000);
        assert_eq!(chunks[1].len(), 256_000);
        assert_eq!(chunks[2].len(), 88_000);
        assert_eq!(chunks.concat(), content);

        assert_eq!(*recorder.flushes.lock().unwrap(), 4);
        assert!(*recorder.shut_down.lock().unwrap());
    }

    #[tokio::test]
    async fn empty_file_sends_only_the_id() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = dir.path().join("empty");
        std::fs::write(&source, b"").unwrap();

        let recorder = Recorder::default();
        let outcome = push_file(&task_id(), &source, 1024, &RecordingConnector(recorder.clone())).await;

        assert!(outcome.status);
        assert_eq!(recorder.writes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_source_is_reported_not_raised() {
        let recorder = Recorder::default();
        let outcome = push_file(
            &task_id(),
            Path::new("/nonexistent/backup.tar"),
            1024,
            &RecordingConnector(recorder.clone()),
        )
        .await;

        assert!(!outcome.status);
        assert_eq!(outcome.errno, 2);
        assert!(recorder.writes.lock().unwrap().is_empty(), "nothing sent");
    }

    #[tokio::test]
    async fn connect_failure_is_reported_not_raised() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = dir.path().join("f");
        std::fs::write(&source, b"data").unwrap();

        let outcome = push_file(&task_id(), &source, 1024, &RefusingConnector).await;

        assert!(!outcome.status);
        assert_eq!(outcome.errno, 111);
        assert!(!outcome.errstr.is_empty());
    }
}
