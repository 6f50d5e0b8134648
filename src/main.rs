use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use switchboard_core::config;
use switchboard_core::types::{AccessTier, Message, RequestPayload, RouteResult};
use switchboard_core::Switchboard;

#[derive(Parser)]
#[command(
    name = "switchboard",
    about = "Route AI requests across providers with fallback and daily quotas",
    version = switchboard_core::VERSION,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a chat message
    Chat {
        /// Message to send
        message: Vec<String>,
        /// Preferred model (registry key, e.g. groq-llama)
        #[arg(short, long)]
        model: Option<String>,
        /// User identifier for quota accounting
        #[arg(short, long, default_value = "cli")]
        user: String,
        /// Access tier: user, subscriber, or admin
        #[arg(short, long, default_value = "admin")]
        tier: AccessTier,
    },
    /// Generate an image from a prompt
    Imagine {
        /// Image prompt
        prompt: Vec<String>,
        /// Output file
        #[arg(short, long, default_value = "out.jpg")]
        out: PathBuf,
        /// Preferred model (registry key, e.g. flux)
        #[arg(short, long)]
        model: Option<String>,
        #[arg(short, long, default_value = "cli")]
        user: String,
        #[arg(short, long, default_value = "admin")]
        tier: AccessTier,
    },
    /// Describe an image file
    Describe {
        /// Path to the image
        image: PathBuf,
        /// Question to ask about the image
        #[arg(short, long, default_value = "Describe this image.")]
        prompt: String,
        #[arg(short, long)]
        model: Option<String>,
        #[arg(short, long, default_value = "cli")]
        user: String,
        #[arg(short, long, default_value = "admin")]
        tier: AccessTier,
    },
    /// Show today's quota consumption
    Quota {
        #[arg(short, long, default_value = "cli")]
        user: String,
        #[arg(short, long, default_value = "user")]
        tier: AccessTier,
    },
    /// Show configured providers
    Status,
    /// Write a default config file
    Onboard,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("switchboard=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Chat {
            message,
            model,
            user,
            tier,
        } => {
            let payload = RequestPayload::Chat {
                messages: vec![Message::user(message.join(" "))],
            };
            cmd_route(payload, model, user, tier, None).await?
        }
        Commands::Imagine {
            prompt,
            out,
            model,
            user,
            tier,
        } => {
            let payload = RequestPayload::ImageGenerate {
                prompt: prompt.join(" "),
            };
            cmd_route(payload, model, user, tier, Some(out)).await?
        }
        Commands::Describe {
            image,
            prompt,
            model,
            user,
            tier,
        } => {
            let bytes = std::fs::read(&image)?;
            let payload = RequestPayload::ImageAnalyze {
                prompt,
                image: bytes,
            };
            cmd_route(payload, model, user, tier, None).await?
        }
        Commands::Quota { user, tier } => cmd_quota(user, tier).await?,
        Commands::Status => cmd_status()?,
        Commands::Onboard => cmd_onboard()?,
    }

    Ok(())
}

// ====== Commands ======

async fn cmd_route(
    payload: RequestPayload,
    model: Option<String>,
    user: String,
    tier: AccessTier,
    out: Option<PathBuf>,
) -> Result<()> {
    let cfg = config::load_config_from_env();
    let board = Switchboard::from_config(&cfg);

    // Ctrl+C abandons the request; the quota counter stays untouched.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let result = board
        .route(&user, tier, model.as_deref(), payload, &cancel)
        .await?;

    match result {
        RouteResult::Completed {
            content,
            used_model,
            degraded,
            attempts,
        } => {
            if degraded {
                eprintln!(
                    "note: fell back to {} after {} failed attempt(s)",
                    used_model,
                    attempts.len() - 1
                );
            }
            if let Some(text) = content.as_text() {
                println!("{}", text);
            } else if let Some(image) = content.as_image() {
                let path = out.unwrap_or_else(|| PathBuf::from("out.jpg"));
                std::fs::write(&path, image)?;
                println!("Saved {} bytes to {}", image.len(), path.display());
            }
        }
        RouteResult::QuotaExceeded { used, limit } => {
            eprintln!("Daily limit reached ({}/{}). Try again tomorrow.", used, limit);
            std::process::exit(1);
        }
        RouteResult::AllProvidersFailed { attempts } => {
            eprintln!("All providers failed:");
            for a in &attempts {
                eprintln!("  {} / {}: {:?}", a.provider_id, a.model_id, a.outcome);
            }
            std::process::exit(1);
        }
        RouteResult::Cancelled { attempts } => {
            eprintln!("Cancelled after {} attempt(s).", attempts.len());
            std::process::exit(130);
        }
    }

    Ok(())
}

async fn cmd_quota(user: String, tier: AccessTier) -> Result<()> {
    let cfg = config::load_config_from_env();
    let board = Switchboard::from_config(&cfg);
    let status = board.quota_status(&user, tier).await?;

    match status.limit {
        Some(limit) => println!("{}: {}/{} requests used today", user, status.used, limit),
        None => println!("{}: {} requests today (unlimited)", user, status.used),
    }
    Ok(())
}

fn cmd_status() -> Result<()> {
    let config_path = config::get_config_path();
    let cfg = config::load_config_from_env();

    println!("switchboard status\n");
    println!(
        "Config: {} {}",
        config_path.display(),
        if config_path.exists() { "✓" } else { "✗" }
    );
    println!(
        "Groq API: {}",
        if cfg.providers.groq.api_key.is_empty() {
            "not set"
        } else {
            "✓"
        }
    );
    println!(
        "Cerebras API: {}",
        if cfg.providers.cerebras.api_key.is_empty() {
            "not set"
        } else {
            "✓"
        }
    );
    println!(
        "OpenRouter API: {}",
        if cfg.providers.openrouter.api_keys.is_empty() {
            "not set".to_string()
        } else {
            format!("✓ ({} key(s))", cfg.providers.openrouter.api_keys.len())
        }
    );
    println!(
        "Hugging Face API: {}",
        if cfg.providers.huggingface.api_key.is_empty() {
            "not set (anonymous)"
        } else {
            "✓"
        }
    );
    println!("\nLimits: user {}/day, subscriber {}/day, admin unlimited",
        cfg.quota.user_daily_limit, cfg.quota.subscriber_daily_limit);

    Ok(())
}

fn cmd_onboard() -> Result<()> {
    let config_path = config::get_config_path();

    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
        println!("Delete it first to re-onboard.");
        return Ok(());
    }

    let cfg = config::load_config_from_env();
    config::save_config(&cfg, None)?;
    println!("Created config at {}", config_path.display());
    println!("\nNext steps:");
    println!("  1. Add API keys to {}", config_path.display());
    println!("     (or export GROQ_API_KEY / CEREBRAS_API_KEY / OPENROUTER_API_KEY / HF_API_KEY)");
    println!("  2. Chat: switchboard chat \"Hello!\"");
    Ok(())
}
