use crate::trace::{TraceEvent, TraceListener};
use std::io::{self, IoSlice};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Per-connection hook that turns socket activity into request-written and
/// first-response-byte events for whichever request currently owns the
/// connection.
#[derive(Clone, Default)]
pub struct ConnTracer {
    inner: Arc<Mutex<TracerState>>,
}

#[derive(Default)]
struct TracerState {
    listener: Option<Arc<dyn TraceListener>>,
    phase: Phase,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Phase {
    #[default]
    Idle,
    Writing {
        wrote: bool,
    },
    Reading,
}

impl ConnTracer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TracerState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Hands the connection to a new request.
    pub fn attach(&self, listener: Arc<dyn TraceListener>) {
        let mut state = self.lock();
        state.listener = Some(listener);
        state.phase = Phase::Writing { wrote: false };
    }

    pub fn detach(&self) {
        let mut state = self.lock();
        state.listener = None;
        state.phase = Phase::Idle;
    }

    fn on_write(&self) {
        let mut state = self.lock();
        if let Phase::Writing { wrote } = &mut state.phase {
            *wrote = true;
        }
    }

    fn on_flush(&self) {
        let listener = {
            let mut state = self.lock();
            match state.phase {
                Phase::Writing { wrote: true } => {
                    state.phase = Phase::Writing { wrote: false };
                    state.listener.clone()
                }
                _ => None,
            }
        };
        if let Some(listener) = listener {
            listener.record(TraceEvent::RequestWritten);
        }
    }

    fn on_read(&self) {
        let listener = {
            let mut state = self.lock();
            match state.phase {
                Phase::Writing { .. } => {
                    state.phase = Phase::Reading;
                    state.listener.clone()
                }
                _ => None,
            }
        };
        if let Some(listener) = listener {
            listener.record(TraceEvent::FirstResponseByte);
        }
    }
}

/// Stream wrapper reporting writes, flushes and the first read with data to
/// a [`ConnTracer`].
pub struct TracedIo<S> {
    inner: S,
    tracer: ConnTracer,
}

impl<S> TracedIo<S> {
    pub fn new(inner: S, tracer: ConnTracer) -> Self {
        Self { inner, tracer }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for TracedIo<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            if buf.filled().len() > before {
                self.tracer.on_read();
            }
        }
        poll
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for TracedIo<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = poll {
            if n > 0 {
                self.tracer.on_write();
            }
        }
        poll
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write_vectored(cx, bufs);
        if let Poll::Ready(Ok(n)) = poll {
            if n > 0 {
                self.tracer.on_write();
            }
        }
        poll
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let poll = Pin::new(&mut self.inner).poll_flush(cx);
        if let Poll::Ready(Ok(())) = poll {
            self.tracer.on_flush();
        }
        poll
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::TraceRecorder;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn write_flush_then_read_marks_wait() {
        let recorder = Arc::new(TraceRecorder::new());
        recorder.record(TraceEvent::ConnectionRequested {
            address: "test:80".into(),
        });
        recorder.record(TraceEvent::ConnectionEstablished { reused: false });

        let (client, mut server) = tokio::io::duplex(64);
        let tracer = ConnTracer::new();
        tracer.attach(recorder.clone());
        let mut io = TracedIo::new(client, tracer.clone());

        io.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        io.flush().await.unwrap();
        let mut request = [0u8; 18];
        server.read_exact(&mut request).await.unwrap();
        server.write_all(b"HTTP/1.1 200 OK\r\n").await.unwrap();
        let mut response = [0u8; 17];
        io.read_exact(&mut response).await.unwrap();

        let traces = recorder.traces();
        assert!(traces[0].request_written.is_some());
        assert!(traces[0].first_byte.is_some());
        assert!(traces[0].first_byte >= traces[0].request_written);
    }

    #[tokio::test]
    async fn idle_connection_reports_nothing() {
        let recorder = Arc::new(TraceRecorder::new());
        recorder.record(TraceEvent::ConnectionRequested {
            address: "test:80".into(),
        });
        recorder.record(TraceEvent::ConnectionEstablished { reused: false });

        let (client, mut server) = tokio::io::duplex(64);
        let tracer = ConnTracer::new();
        tracer.attach(recorder.clone());
        tracer.detach();
        let mut io = TracedIo::new(client, tracer);

        io.write_all(b"ping").await.unwrap();
        io.flush().await.unwrap();
        server.write_all(b"pong").await.unwrap();
        let mut buf = [0u8; 4];
        io.read_exact(&mut buf).await.unwrap();

        let traces = recorder.traces();
        assert_eq!(traces[0].request_written, None);
        assert_eq!(traces[0].first_byte, None);
    }
}
