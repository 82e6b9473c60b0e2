//! valuai CLI: drive the AI request layer from a terminal.
//!
//! Usage:
//!   valuai providers               List registered providers and availability
//!   valuai generate "<prompt>"     One-shot text generation
//!   valuai chat                    Interactive multi-turn chat
//!   valuai vision <image> "<q>"    Ask a question about a property photo
//!   valuai audit                   Show recent audit entries

use anyhow::{Context, Result};
use base64::Engine as _;
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use valuai_core::audit::JsonlAuditSink;
use valuai_core::config::AiConfig;
use valuai_core::facade;
use valuai_core::{ChatMessage, ModelResponse, RequestOptions, ServiceRegistry};

#[derive(Parser)]
#[command(
    name = "valuai",
    version,
    about = "AI provider layer for property valuation",
    long_about = "valuai: send prompts, chats and property photos to the configured AI provider.\n\nEvery call is audited to ~/.valuai/audit.jsonl with credentials redacted."
)]
struct Cli {
    /// Config file (default: ~/.valuai/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Request(RequestCommands),

    /// Show recent audit log entries
    Audit {
        /// Number of entries to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

/// Commands that go through the provider registry.
#[derive(Subcommand)]
enum RequestCommands {
    /// List registered providers and whether they have credentials
    Providers,

    /// Generate text from a single prompt
    Generate {
        /// Prompt text
        prompt: String,

        /// Provider to use (overrides the default)
        #[arg(short, long)]
        provider: Option<String>,

        /// Sampling temperature
        #[arg(short, long)]
        temperature: Option<f32>,

        /// Maximum tokens in the reply
        #[arg(short, long)]
        max_tokens: Option<u32>,

        /// Request timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Start an interactive chat session
    Chat {
        /// Provider to use (overrides the default)
        #[arg(short, long)]
        provider: Option<String>,

        /// System prompt for the conversation
        #[arg(short, long)]
        system: Option<String>,
    },

    /// Describe an image file
    Vision {
        /// Path to a PNG, JPEG, GIF or WebP file
        image: PathBuf,

        /// Question about the image
        prompt: String,

        /// Provider to use (overrides the default)
        #[arg(short, long)]
        provider: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Audit { limit } => cmd_audit(&config, limit).await,
        Commands::Request(command) => {
            let registry = build_registry(config)?;
            let outcome = run(&registry, command).await;
            registry.flush_audit().await;
            outcome
        }
    }
}

async fn run(registry: &ServiceRegistry, command: RequestCommands) -> Result<()> {
    match command {
        RequestCommands::Providers => cmd_providers(registry),
        RequestCommands::Generate {
            prompt,
            provider,
            temperature,
            max_tokens,
            timeout_secs,
        } => {
            let mut options = RequestOptions::new().with_user_id("cli");
            if let Some(p) = provider {
                options = options.with_provider(p);
            }
            if let Some(t) = temperature {
                options = options.with_temperature(t);
            }
            if let Some(m) = max_tokens {
                options = options.with_max_tokens(m);
            }
            if let Some(s) = timeout_secs {
                options = options.with_timeout(Duration::from_secs(s));
            }
            let response = facade::generate_text(registry, &prompt, options).await?;
            print_response(&response);
            Ok(())
        }
        RequestCommands::Chat { provider, system } => {
            cmd_chat(registry, provider.as_deref(), system.as_deref()).await
        }
        RequestCommands::Vision {
            image,
            prompt,
            provider,
        } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("Failed to read image {}", image.display()))?;
            let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
            let mut options = RequestOptions::new().with_user_id("cli");
            if let Some(p) = provider {
                options = options.with_provider(p);
            }
            let response = facade::process_image(registry, &encoded, &prompt, options).await?;
            print_response(&response);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<AiConfig> {
    match path {
        Some(p) => AiConfig::load_from(p),
        None => AiConfig::load(),
    }
}

fn audit_sink(config: &AiConfig) -> JsonlAuditSink {
    let path = config
        .audit
        .path
        .clone()
        .unwrap_or_else(JsonlAuditSink::default_path);
    JsonlAuditSink::new(path)
}

fn build_registry(config: AiConfig) -> Result<ServiceRegistry> {
    let sink = config.audit.enabled.then(|| audit_sink(&config));
    let mut builder = ServiceRegistry::builder(config).with_builtin_providers();
    if let Some(sink) = sink {
        builder = builder.audit_sink(Arc::new(sink));
    }
    builder.build()
}

fn print_response(response: &ModelResponse) {
    println!();
    println!("  \x1b[32m{}\x1b[0m", response.text());
    let meta = response.metadata();
    match response.usage() {
        Some(u) => println!(
            "  \x1b[2m{} / {} · {} tokens ({} in, {} out)\x1b[0m",
            meta.provider, meta.model, u.total_tokens, u.prompt_tokens, u.completion_tokens
        ),
        None => println!("  \x1b[2m{} / {}\x1b[0m", meta.provider, meta.model),
    }
    println!();
}

// ── Providers Command ───────────────────────────────────────────────

fn cmd_providers(registry: &ServiceRegistry) -> Result<()> {
    let default = registry.default_provider_id();
    println!();
    println!("  valuai providers");
    println!("  ─────────────────────────────────────");
    for id in registry.provider_ids() {
        let service = registry.get_service(id);
        let adapter = service.adapter();
        let status = if registry.is_provider_available(id) {
            "✅"
        } else {
            "❌ no API key"
        };
        let marker = if id == default { " (default)" } else { "" };
        println!("  {}{} {}", id, marker, status);
        println!(
            "     Model: {} | Vision: {}",
            adapter.model(),
            adapter.vision_model()
        );
    }
    println!();
    Ok(())
}

// ── Chat Command ────────────────────────────────────────────────────

async fn cmd_chat(
    registry: &ServiceRegistry,
    provider: Option<&str>,
    system: Option<&str>,
) -> Result<()> {
    let provider_id = match provider {
        Some(p) => p.to_string(),
        None => registry.default_provider_id(),
    };
    let session_id = format!("cli-{}", std::process::id());

    let mut history = Vec::new();
    if let Some(s) = system {
        history.push(ChatMessage::system(s));
    }

    println!();
    println!("  valuai v{}", env!("CARGO_PKG_VERSION"));
    println!("  Provider: {} | Session: {}", provider_id, session_id);
    println!();
    println!("  Type your message, /clear to reset, or /quit to exit.");
    println!("  ─────────────────────────────────────");
    println!();

    let stdin = io::stdin();
    loop {
        print!("  \x1b[36m>\x1b[0m ");
        io::stdout().flush()?;

        let mut input = String::new();
        if stdin.read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" | "/q" => {
                println!("  Goodbye!");
                break;
            }
            "/clear" => {
                history.retain(|m: &ChatMessage| m.role == valuai_core::Role::System);
                println!("  Conversation cleared.");
                continue;
            }
            _ => {}
        }

        history.push(ChatMessage::user(input));
        let options = RequestOptions::new()
            .with_provider(provider_id.clone())
            .with_user_id("cli")
            .with_session_id(session_id.clone());

        match facade::generate_chat_completion(registry, &history, options).await {
            Ok(response) => {
                history.push(ChatMessage::assistant(response.text()));
                print_response(&response);
            }
            Err(e) => {
                history.pop();
                eprintln!("  \x1b[31mError: {}\x1b[0m\n", e);
            }
        }
    }

    Ok(())
}

// ── Audit Command ───────────────────────────────────────────────────

async fn cmd_audit(config: &AiConfig, limit: usize) -> Result<()> {
    let sink = audit_sink(config);
    let entries = sink.read_recent(limit).await?;

    if entries.is_empty() {
        println!("  No audit entries in {}", sink.path().display());
        return Ok(());
    }

    println!();
    for entry in entries {
        let status = entry
            .status_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".into());
        let duration = entry
            .duration_ms
            .map(|d| format!("{}ms", d))
            .unwrap_or_else(|| "-".into());
        println!(
            "  {} [{:?}] {} {} ({}, {})",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.level,
            entry.source,
            entry.message,
            status,
            duration
        );
        println!("     request: {}", entry.request_id);
    }
    println!();
    Ok(())
}
