//! `ssap`: join a broker, run one operation, print the answers, leave.
//!
//! ```text
//! ssap --url ws://localhost:8080/sib/api_websocket \
//!      --token 0123abcd --instance SensorKP:sensor-1 \
//!      insert --ontology TestSensor --data '{"x":1}'
//! ```
//!
//! Logging goes to stderr and honours `RUST_LOG`; `--debug` raises the
//! default level to `debug` and shows every frame on the wire.

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::Value;
use ssap::WebSocketTransport;
use ssap::prelude::*;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "ssap", version, about = "Talk to an SSAP broker from the command line")]
struct Cli {
    /// Broker websocket URL.
    #[arg(long, env = "SSAP_URL")]
    url: String,

    /// KP token used to JOIN.
    #[arg(long, env = "SSAP_TOKEN")]
    token: String,

    /// KP instance, formatted `<KP>:<instance>`.
    #[arg(long, env = "SSAP_INSTANCE")]
    instance: String,

    /// Seconds to wait for the connection and for each response.
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Log every frame sent and received.
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// JOIN and LEAVE, printing the session key.
    Join,
    /// Insert one instance.
    Insert {
        #[arg(long)]
        ontology: String,
        /// Document (NATIVE) or statement (other query types).
        #[arg(long)]
        data: String,
        #[arg(long, default_value = "NATIVE")]
        query_type: QueryType,
    },
    /// Run a query and print the result.
    Query {
        #[arg(long)]
        ontology: String,
        #[arg(long)]
        query: String,
        #[arg(long, default_value = "SQLLIKE")]
        query_type: QueryType,
    },
    /// Subscribe, print a number of indications, then unsubscribe.
    Subscribe {
        #[arg(long)]
        ontology: String,
        #[arg(long)]
        query: String,
        #[arg(long, default_value = "SQLLIKE")]
        query_type: QueryType,
        /// Minimum milliseconds between two notifications.
        #[arg(long, default_value_t = 1000)]
        refresh_ms: u64,
        /// How many indications to wait for.
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Ssap(#[from] SsapError),

    #[error("invalid JSON argument: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{kind} rejected by the broker: {reason}")]
    Rejected { kind: MessageType, reason: String },

    #[error("no answer from the broker within {0:?}")]
    Timeout(Duration),

    #[error("connection closed by the broker")]
    Closed,
}

/// Inbound messages, forwarded from the transport task to `main`.
struct Inbox {
    rx: mpsc::UnboundedReceiver<Message>,
    timeout: Duration,
}

impl Inbox {
    async fn next(&mut self) -> Result<Message, CliError> {
        tokio::time::timeout(self.timeout, self.rx.recv())
            .await
            .map_err(|_| CliError::Timeout(self.timeout))?
            .ok_or(CliError::Closed)
    }

    /// Waits for the answer to the request in flight. Indications that
    /// arrive meanwhile are printed.
    async fn response(&mut self) -> Result<Message, CliError> {
        loop {
            let msg = self.next().await?;
            if msg.is_indication() {
                print_message(&msg);
                continue;
            }
            if !msg.is_ok() && msg.has_ok_field() {
                let reason = msg
                    .response()
                    .and_then(|body| body.error.clone())
                    .or_else(|| msg.error_code().map(|code| code.to_string()))
                    .unwrap_or_else(|| "unknown error".into());
                return Err(CliError::Rejected {
                    kind: msg.message_type,
                    reason,
                });
            }
            return Ok(msg);
        }
    }
}

fn print_message(msg: &Message) {
    let data = msg.data().map(Value::to_string).unwrap_or_default();
    match &msg.ontology {
        Some(ontology) => println!("{} [{ontology}] {data}", msg.message_type),
        None => println!("{} {data}", msg.message_type),
    }
}

fn init_tracing(debug: bool) {
    let default = if debug { "ssap=debug,info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn parse_payload(text: &str, query_type: QueryType) -> Result<Value, CliError> {
    if query_type == QueryType::Native {
        Ok(serde_json::from_str(text)?)
    } else {
        Ok(Value::String(text.to_string()))
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let timeout = Duration::from_secs(cli.timeout);
    let (tx, rx) = mpsc::unbounded_channel();
    let mut inbox = Inbox { rx, timeout };

    let endpoint = Endpoint::builder()
        .url(cli.url.as_str())
        .connect_timeout(timeout)
        .build(
            WebSocketTransport::new(),
            SingleHandler::new(move |msg: &Message| {
                let _ = tx.send(msg.clone());
            }),
        );

    endpoint.join_with_token(&cli.token, &cli.instance).await?;
    inbox.response().await?;
    tracing::info!(session_key = ?endpoint.session_key(), "joined");

    match cli.command {
        Command::Join => {
            println!("session key: {}", endpoint.session_key().unwrap_or_default());
        }
        Command::Insert {
            ontology,
            data,
            query_type,
        } => {
            endpoint.insert(&ontology, parse_payload(&data, query_type)?, query_type)?;
            print_message(&inbox.response().await?);
        }
        Command::Query {
            ontology,
            query,
            query_type,
        } => {
            let query = QueryDescriptor::new(query_type, parse_payload(&query, query_type)?);
            endpoint.query(&ontology, query)?;
            print_message(&inbox.response().await?);
        }
        Command::Subscribe {
            ontology,
            query,
            query_type,
            refresh_ms,
            count,
        } => {
            let query = QueryDescriptor::new(query_type, parse_payload(&query, query_type)?);
            endpoint.subscribe(&ontology, query, refresh_ms)?;
            let answer = inbox.response().await?;
            let subscription_id = answer.subscription_id().unwrap_or_default().to_string();
            tracing::info!(%subscription_id, "subscribed");

            let mut seen = 0;
            while seen < count {
                let msg = inbox.next().await?;
                if msg.is_indication() {
                    print_message(&msg);
                    seen += 1;
                }
            }

            endpoint.unsubscribe(&subscription_id)?;
            inbox.response().await?;
        }
    }

    endpoint.leave()?;
    inbox.response().await?;
    endpoint.run_until_stopped().await.or_else(|e| {
        // LEAVE already tore the connection down.
        if e.is_invalid_operation() { Ok(()) } else { Err(e) }
    })?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
