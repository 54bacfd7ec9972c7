use std::io::{self, Write};
use std::sync::Arc;

use channel_mux::bot::handlers;
use channel_mux::config::ConfigStore;
use channel_mux::forwarder::Forwarder;
use channel_mux::utils::parse_chat_id_list;
use dotenvy::dotenv;
use regex::Regex;
use teloxide::prelude::*;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Environment variable holding the config file path.
const CONFIG_PATH_ENV: &str = "MUX_CONFIG_PATH";
/// Config file used when `MUX_CONFIG_PATH` is unset.
const DEFAULT_CONFIG_PATH: &str = "config.yml";
/// Token supplied here takes precedence over the persisted `bot_token`.
const TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";
/// Comma/semicolon/whitespace-separated chat ids that are never forwarded to.
const EXCLUDED_ENV: &str = "MUX_EXCLUDED_CHATS";

/// Regex patterns for redacting bot tokens from log output
struct RedactionPatterns {
    token_url: Regex,
    token_bare: Regex,
    token_prefixed: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            token_url: Regex::new(r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)(/['\s]*)")?,
            token_bare: Regex::new(r"([0-9]{8,10}:[A-Za-z0-9_-]{35})")?,
            token_prefixed: Regex::new(r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+")?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let mut output = input.to_string();
        output = self
            .token_url
            .replace_all(&output, "$1[TELEGRAM_TOKEN]$3")
            .to_string();
        output = self
            .token_bare
            .replace_all(&output, "[TELEGRAM_TOKEN]")
            .to_string();
        output = self
            .token_prefixed
            .replace_all(&output, "$1[TELEGRAM_TOKEN]")
            .to_string();
        output
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // We return the original buffer length to satisfy the contract,
        // even if the redacted string length differs.
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.patterns.clone())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenv().ok();

    // Initialize redaction patterns early (before logging)
    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);

    init_logging(patterns);

    info!("Starting channel multiplexer bot...");

    let store = init_store().await;
    let token = resolve_token(&store).await;
    let forwarder = init_forwarder();

    let bot = Bot::new(token);

    let snapshot = store.snapshot().await;
    info!(
        "Forwarding to {} target chats with delay {:.2}s.",
        snapshot.target_chats.len(),
        snapshot.delay_seconds
    );

    Dispatcher::builder(bot, handlers::schema())
        .dependencies(dptree::deps![store, forwarder])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter::new(io::stderr, patterns);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

async fn init_store() -> Arc<ConfigStore> {
    let path =
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    match ConfigStore::load(path).await {
        Ok(store) => {
            info!("Configuration loaded successfully.");
            Arc::new(store)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

/// The environment-provided token wins over the persisted one. A missing
/// token from both sources is fatal.
async fn resolve_token(store: &ConfigStore) -> String {
    let token = match std::env::var(TOKEN_ENV) {
        Ok(token) if !token.is_empty() => token,
        _ => store.snapshot().await.bot_token,
    };
    if token.is_empty() {
        error!(
            "Bot token missing. Provide it in the config file under 'bot_token' \
             or via the {TOKEN_ENV} environment variable."
        );
        std::process::exit(1);
    }
    token
}

fn init_forwarder() -> Arc<Forwarder> {
    let excluded = std::env::var(EXCLUDED_ENV)
        .map(|raw| parse_chat_id_list(&raw))
        .unwrap_or_default();
    if !excluded.is_empty() {
        info!("Forwarding exclusion list: {:?}", excluded);
    }
    Arc::new(Forwarder::new(excluded))
}
