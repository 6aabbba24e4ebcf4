//! Concurrent tee of a command's output streams.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinError;

use crate::error::{panic_message, StreamError, StreamKind};
use crate::target::{BoxedWriter, ExecResult};

const CHUNK_SIZE: usize = 8192;

/// Output captured while tee-ing one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    pub stdout: String,
    pub stderr: String,
}

/// Copies both streams of `result` into the given sinks while buffering them.
///
/// Each stream is copied by its own task; both are joined before returning.
/// When both fail, the stdout error is reported.
pub async fn copy_streams(
    result: ExecResult,
    stdout_sink: BoxedWriter,
    stderr_sink: BoxedWriter,
) -> Result<Captured, StreamError> {
    let ExecResult { stdout, stderr } = result;

    let out_task = tokio::spawn(tee(stdout, stdout_sink));
    let err_task = tokio::spawn(tee(stderr, stderr_sink));
    let (out, err) = tokio::join!(out_task, err_task);

    let out = settle(StreamKind::Stdout, out);
    let err = settle(StreamKind::Stderr, err);

    Ok(Captured {
        stdout: out?,
        stderr: err?,
    })
}

async fn tee<R, W>(mut reader: R, mut sink: W) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut captured = Vec::new();
    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        sink.write_all(&chunk[..n]).await?;
        captured.extend_from_slice(&chunk[..n]);
    }
    sink.flush().await?;
    Ok(captured)
}

fn settle(
    stream: StreamKind,
    joined: Result<std::io::Result<Vec<u8>>, JoinError>,
) -> Result<String, StreamError> {
    match joined {
        Ok(Ok(bytes)) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Ok(Err(source)) => Err(StreamError::Io { stream, source }),
        Err(e) if e.is_panic() => Err(StreamError::Panicked {
            stream,
            message: panic_message(e.into_panic()),
        }),
        Err(e) => Err(StreamError::Panicked {
            stream,
            message: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::SharedBuffer;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    struct FailingReader(&'static str);

    impl AsyncRead for FailingReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut tokio::io::ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::other(self.0)))
        }
    }

    #[tokio::test]
    async fn test_tees_into_sinks_and_buffers() {
        let out = SharedBuffer::new();
        let err = SharedBuffer::new();
        let result = ExecResult::from_bytes(b"hello\n".to_vec(), b"warn\n".to_vec());

        let captured = copy_streams(result, Box::new(out.clone()), Box::new(err.clone()))
            .await
            .unwrap();

        assert_eq!(captured.stdout, "hello\n");
        assert_eq!(captured.stderr, "warn\n");
        assert_eq!(out.contents(), "hello\n");
        assert_eq!(err.contents(), "warn\n");
    }

    #[tokio::test]
    async fn test_stdout_error_wins() {
        let result = ExecResult {
            stdout: Box::new(FailingReader("out broke")),
            stderr: Box::new(FailingReader("err broke")),
        };
        let err = copy_streams(result, Box::new(tokio::io::sink()), Box::new(tokio::io::sink()))
            .await
            .unwrap_err();

        match err {
            StreamError::Io { stream, source } => {
                assert_eq!(stream, StreamKind::Stdout);
                assert_eq!(source.to_string(), "out broke");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stderr_error_reported_alone() {
        let result = ExecResult {
            stdout: Box::new(std::io::Cursor::new(b"fine".to_vec())),
            stderr: Box::new(FailingReader("err broke")),
        };
        let err = copy_streams(result, Box::new(tokio::io::sink()), Box::new(tokio::io::sink()))
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::Io { stream: StreamKind::Stderr, .. }));
    }
}
