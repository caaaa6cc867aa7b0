//! Line-oriented wrapper around one accepted stream.
//!
//! Reads happen inline on the session task. Writes go through a bounded
//! outbound queue drained by a dedicated writer task, so a peer that stops
//! reading only stalls its own writer, never a broadcaster.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()` in production code
//! - Write failures end the writer task and surface as `Closed` to senders

use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use parley_protocol::strip_line_ending;

use crate::config::ServerConfig;

type BoxedReader = Box<dyn AsyncRead + Send + Sync + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Per-connection limits, taken from [`ServerConfig`].
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    /// Longest accepted line in bytes, terminator included
    pub max_line_length: usize,

    /// Per-line socket write timeout
    pub write_timeout: Duration,

    /// Outbound queue depth
    pub outbound_buffer: usize,
}

impl From<&ServerConfig> for ConnectionSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_line_length: config.max_line_length,
            write_timeout: config.write_timeout(),
            outbound_buffer: config.outbound_buffer,
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

/// One participant's transport: a line reader plus a queued line writer.
pub struct Connection {
    /// Buffered reader for incoming lines
    reader: BufReader<BoxedReader>,

    /// Sending side of the outbound queue
    outbox: mpsc::Sender<Arc<str>>,

    /// Tells the writer task to flush what is queued and stop
    closing: CancellationToken,

    /// Writer task; `None` once closed
    writer_task: Option<JoinHandle<()>>,

    settings: ConnectionSettings,

    /// Connection number, for log context
    number: u64,
}

impl Connection {
    /// Wraps a reader/writer pair and spawns the writer task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<R, W>(reader: R, writer: W, settings: ConnectionSettings, number: u64) -> Self
    where
        R: AsyncRead + Send + Sync + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (outbox, queue) = mpsc::channel(settings.outbound_buffer.max(1));
        let closing = CancellationToken::new();

        let writer: BoxedWriter = Box::new(writer);
        let writer_task = tokio::spawn(write_loop(
            BufWriter::new(writer),
            queue,
            closing.clone(),
            settings.write_timeout,
            number,
        ));

        let reader: BoxedReader = Box::new(reader);
        Self {
            reader: BufReader::new(reader),
            outbox,
            closing,
            writer_task: Some(writer_task),
            settings,
            number,
        }
    }

    /// Reads one line, without its terminator.
    ///
    /// Returns `Ok(None)` at end of stream. A final line without a
    /// terminator is still returned.
    pub async fn read_line(&mut self) -> Result<Option<String>, ConnectionError> {
        let max = self.settings.max_line_length;
        let mut line = String::new();

        let bytes_read = (&mut self.reader)
            .take(max as u64)
            .read_line(&mut line)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidData => ConnectionError::InvalidUtf8,
                _ => ConnectionError::Io(e.to_string()),
            })?;

        if bytes_read == 0 {
            return Ok(None);
        }

        // Hitting the cap without a terminator is only an overrun if more
        // bytes follow; a full-length final line before EOF is accepted.
        if bytes_read >= max && !line.ends_with('\n') && !self.at_eof().await? {
            return Err(ConnectionError::LineTooLong {
                size: bytes_read,
                max,
            });
        }

        let len = strip_line_ending(&line).len();
        line.truncate(len);

        debug!(connection = self.number, bytes = bytes_read, "Received line");
        Ok(Some(line))
    }

    async fn at_eof(&mut self) -> Result<bool, ConnectionError> {
        let buffered = self
            .reader
            .fill_buf()
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;
        Ok(buffered.is_empty())
    }

    /// Queues a line for this connection, waiting for queue space.
    pub async fn write_line(&self, line: &str) -> Result<(), ConnectionError> {
        self.outbox
            .send(Arc::from(line))
            .await
            .map_err(|_| ConnectionError::Closed)
    }

    /// Returns a sender feeding this connection's outbound queue.
    pub fn sink_sender(&self) -> mpsc::Sender<Arc<str>> {
        self.outbox.clone()
    }

    /// Flushes already-queued lines, shuts down the write half and waits
    /// for the writer task. Calling it again is a no-op.
    pub async fn close(&mut self) {
        self.closing.cancel();

        let Some(mut task) = self.writer_task.take() else {
            return;
        };

        // Writer may need one write timeout for the in-flight line and
        // another for shutdown.
        let grace = self.settings.write_timeout.saturating_mul(2);
        if timeout(grace, &mut task).await.is_err() {
            warn!(connection = self.number, "Writer did not stop in time, aborting");
            task.abort();
        }

        debug!(connection = self.number, "Connection closed");
    }

    pub fn is_closed(&self) -> bool {
        self.writer_task.is_none()
    }

    pub fn number(&self) -> u64 {
        self.number
    }
}

/// Drains the outbound queue onto the socket.
async fn write_loop(
    mut writer: BufWriter<BoxedWriter>,
    mut queue: mpsc::Receiver<Arc<str>>,
    closing: CancellationToken,
    write_timeout: Duration,
    number: u64,
) {
    loop {
        let line = tokio::select! {
            biased;

            line = queue.recv() => match line {
                Some(line) => line,
                None => break,
            },

            _ = closing.cancelled() => break,
        };

        if let Err(e) = write_one(&mut writer, &line, write_timeout).await {
            warn!(connection = number, error = %e, "Write failed, stopping writer");
            return;
        }
    }

    // Refuse new lines, then flush whatever was already accepted.
    queue.close();
    while let Ok(line) = queue.try_recv() {
        if let Err(e) = write_one(&mut writer, &line, write_timeout).await {
            debug!(connection = number, error = %e, "Write failed while closing");
            return;
        }
    }

    if let Ok(Err(e)) = timeout(write_timeout, writer.shutdown()).await {
        debug!(connection = number, error = %e, "Shutdown failed");
    }
}

async fn write_one(
    writer: &mut BufWriter<BoxedWriter>,
    line: &str,
    write_timeout: Duration,
) -> Result<(), ConnectionError> {
    match timeout(write_timeout, async {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok::<(), std::io::Error>(())
    })
    .await
    {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
        Err(_) => Err(ConnectionError::WriteTimeout),
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Line too long: {size} bytes (max: {max})")]
    LineTooLong { size: usize, max: usize },

    #[error("Line is not valid UTF-8")]
    InvalidUtf8,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Connection writer has stopped")]
    Closed,
}
