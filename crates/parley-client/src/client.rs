//! Connection to the chat server.
//!
//! `ChatClient` runs two halves concurrently:
//! - A printer task that writes every server line to the output and shows
//!   the name prompt when the server sends `SUBMITNAME`
//! - An input loop that sends the name once prompted, then forwards lines
//!   until the user types `quit` (any case) or input ends
//!
//! **Panic-Free Policy:** No `.unwrap()`, `.expect()`, `panic!()` outside tests.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinError;
use tokio::time::timeout;
use tracing::{debug, info};

use parley_protocol::{strip_line_ending, ServerLine, DEFAULT_PORT, QUIT};

use crate::error::{ClientError, Result};

/// Prompt shown when the server asks for a name.
pub const NAME_PROMPT: &str = "Enter your username: ";

/// Printed when the server closes the connection.
pub const DISCONNECTED: &str = "Disconnected from server.";

/// How long to wait for the server to hang up after we quit.
const HANGUP_GRACE: Duration = Duration::from_secs(2);

// ============================================================================
// Configuration
// ============================================================================

/// Where to find the chat server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ClientConfig {
    /// Returns `host:port` for display.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ============================================================================
// Chat Client
// ============================================================================

/// A connected chat client.
pub struct ChatClient {
    stream: TcpStream,
    addr: String,
}

impl ChatClient {
    /// Connects to the server.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let addr = config.addr();

        let stream = TcpStream::connect((config.host.as_str(), config.port))
            .await
            .map_err(|e| ClientError::Connect {
                addr: addr.clone(),
                error: e.to_string(),
            })?;

        info!(addr = %addr, "Connected to chat server");
        Ok(Self { stream, addr })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Runs the session until the user quits or the server disconnects.
    pub async fn run<I, O>(self, mut input: I, output: O) -> Result<()>
    where
        I: AsyncBufRead + Unpin,
        O: AsyncWrite + Send + Unpin + 'static,
    {
        let (reader, mut writer) = self.stream.into_split();
        let (prompt_tx, prompt_rx) = oneshot::channel();
        let mut printer = tokio::spawn(print_server_lines(
            BufReader::new(reader),
            output,
            prompt_tx,
        ));

        let sent = tokio::select! {
            result = send_input(&mut input, &mut writer, prompt_rx) => result,

            joined = &mut printer => {
                debug!("Server closed the connection");
                return flatten(joined);
            }
        };

        if let Err(e) = sent {
            printer.abort();
            return Err(e);
        }

        // Half-close so the server sees end of stream even if we never
        // got as far as sending a name.
        let _ = writer.shutdown().await;

        match timeout(HANGUP_GRACE, &mut printer).await {
            Ok(joined) => flatten(joined),
            Err(_) => {
                debug!("Server did not hang up, stopping printer");
                printer.abort();
                Ok(())
            }
        }
    }
}

fn flatten(joined: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    match joined {
        Ok(result) => result,
        Err(e) => Err(ClientError::Io(io::Error::new(io::ErrorKind::Other, e.to_string()))),
    }
}

/// Copies server lines to `output`, showing the prompt for `SUBMITNAME`.
async fn print_server_lines<R, O>(
    mut reader: R,
    mut output: O,
    prompt: oneshot::Sender<()>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let mut prompt = Some(prompt);
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            output.write_all(DISCONNECTED.as_bytes()).await?;
            output.write_all(b"\n").await?;
            output.flush().await?;
            return Ok(());
        }

        let text = strip_line_ending(&line);
        match ServerLine::parse(text) {
            ServerLine::SubmitName => {
                output.write_all(NAME_PROMPT.as_bytes()).await?;
                if let Some(tx) = prompt.take() {
                    let _ = tx.send(());
                }
            }
            server_line => {
                match &server_line {
                    announcement if announcement.is_announcement() => {
                        debug!(%announcement, "Server announcement")
                    }
                    ServerLine::Chat { name, .. } => debug!(participant = %name, "Chat line"),
                    _ => debug!("Unrecognised server line"),
                }
                output.write_all(text.as_bytes()).await?;
                output.write_all(b"\n").await?;
            }
        }
        output.flush().await?;
    }
}

/// Sends the name once prompted, then user lines until quit or end of input.
async fn send_input<I>(
    input: &mut I,
    writer: &mut OwnedWriteHalf,
    prompted: oneshot::Receiver<()>,
) -> Result<()>
where
    I: AsyncBufRead + Unpin,
{
    if prompted.await.is_err() {
        return Ok(());
    }

    let Some(name) = next_line(input).await? else {
        return Ok(());
    };
    send_line(writer, &name).await?;

    loop {
        let Some(line) = next_line(input).await? else {
            debug!("Input closed, quitting");
            return send_line(writer, QUIT).await;
        };

        if line.eq_ignore_ascii_case(QUIT) {
            return send_line(writer, QUIT).await;
        }

        send_line(writer, &line).await?;
    }
}

async fn next_line<I>(input: &mut I) -> Result<Option<String>>
where
    I: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    if input.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    let len = strip_line_ending(&line).len();
    line.truncate(len);
    Ok(Some(line))
}

async fn send_line(writer: &mut OwnedWriteHalf, line: &str) -> Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
