//! parley - terminal chat client
//!
//! # Usage
//!
//! ```text
//! parley                     # connect to localhost:12345
//! parley --host chat.lan     # another machine
//! parley --port 4000
//! ```
//!
//! Type `quit` to leave.

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{stdin, stdout, BufReader};
use tracing_subscriber::EnvFilter;

use parley_client::{ChatClient, ClientConfig};
use parley_protocol::DEFAULT_PORT;

/// parley - terminal chat client
#[derive(Parser, Debug)]
#[command(name = "parley", version, about)]
struct Args {
    /// Server host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr and stay quiet by default so they don't interleave
    // with chat output.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("parley_client=warn".parse()?),
        )
        .init();

    let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
    let result = runtime.block_on(run(ClientConfig {
        host: args.host,
        port: args.port,
    }));

    // A pending stdin read holds a blocking-pool thread; don't wait for it.
    runtime.shutdown_background();
    result
}

async fn run(config: ClientConfig) -> Result<()> {
    println!("Connecting to chat server at {}...", config.addr());
    let client = ChatClient::connect(&config).await?;
    println!("Connected to the chat server.");
    println!("You can start typing messages. Type 'QUIT' to exit.");

    client
        .run(BufReader::new(stdin()), stdout())
        .await
        .context("Chat session failed")?;

    println!("Client disconnecting.");
    Ok(())
}
