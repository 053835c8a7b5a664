// Lifeline - Crisis keyword detection and escalation
// Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use lifeline::audit::{AuditRecorder, FlagId, JsonlAuditRecorder};
use lifeline::config::{lifeline_dir, load_config, Config};
use lifeline::crisis::{fingerprint, Detector, Language};
use lifeline::server::SafetyServer;
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "lifeline")]
#[command(about = "Crisis keyword detection and escalation", version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser, Debug)]
enum Command {
    /// Scan a piece of text for trigger phrases
    Check {
        /// Text to scan
        text: String,
        /// Language tag (en, ja, en-US, ...)
        #[arg(long)]
        lang: Option<String>,
    },
    /// Show the crisis resource for a region
    Resource {
        /// Two-letter region code
        region: String,
    },
    /// Print the active trigger lexicon
    Lexicon {
        #[arg(long)]
        lang: Option<String>,
    },
    /// Run HTTP daemon server
    Serve {
        /// Bind address (overrides config)
        #[arg(long)]
        bind: Option<String>,
        /// Append logs to ~/.lifeline/daemon.log instead of stderr
        #[arg(long)]
        log_file: bool,
    },
    /// Review flagged entries
    Flags {
        #[command(subcommand)]
        flags_command: FlagsCommand,
    },
}

#[derive(Parser, Debug)]
enum FlagsCommand {
    /// List recorded flags
    List {
        /// Only flags for this user id
        #[arg(long)]
        user: Option<String>,
    },
    /// Mark a flag as dismissed
    Dismiss {
        /// Flag id
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Daemon mode may log to a file; everything else logs to stderr
    if let Command::Serve { log_file: true, .. } = &args.command {
        init_file_tracing()?;
    } else {
        init_tracing();
    }

    let config = load_config()?;

    match args.command {
        Command::Check { text, lang } => run_check(&config, &text, lang.as_deref()),
        Command::Resource { region } => run_resource(&config, &region),
        Command::Lexicon { lang } => run_lexicon(&config, lang.as_deref()),
        Command::Serve { bind, .. } => run_serve(config, bind).await,
        Command::Flags { flags_command } => run_flags(&config, flags_command).await,
    }
}

/// Initialize tracing on stderr
///
/// Default: INFO level, can be overridden with RUST_LOG
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Bridge log crate → tracing (for dependencies using log crate)
    tracing_log::LogTracer::init().ok();
}

/// Set up file logging for the daemon (append to ~/.lifeline/daemon.log)
fn init_file_tracing() -> Result<()> {
    let dir = lifeline_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let log_path = dir.join("daemon.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open daemon log: {}", log_path.display()))?;

    let file_writer = Arc::new(log_file);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(move || file_writer.clone())
        .with_ansi(false);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .init();
    tracing_log::LogTracer::init().ok();

    eprintln!("Daemon logs: {}", log_path.display());
    Ok(())
}

fn resolve_language(config: &Config, tag: Option<&str>) -> Language {
    tag.map(|tag| Language::resolve_or(tag, config.default_language))
        .unwrap_or(config.default_language)
}

fn run_check(config: &Config, text: &str, lang: Option<&str>) -> Result<()> {
    let detector = Detector::new(&config.lexicons());
    let language = resolve_language(config, lang);
    let result = detector.detect(text, language);

    tracing::debug!(
        text_fingerprint = %fingerprint(text),
        language = %language,
        matched = result.matched,
        "Checked text"
    );

    if result.fail_safe {
        println!("\x1b[1;31m⚠ Detection failed, treating as a match\x1b[0m");
    } else if result.matched {
        println!("\x1b[1;33m⚠ Trigger phrases found:\x1b[0m");
        for phrase in &result.matched_phrases {
            println!("  • {}", phrase);
        }
    } else {
        println!("\x1b[1;32m✓ No trigger phrases\x1b[0m");
    }

    if result.matched {
        let resource = config.resources().resolve(config.default_region.as_str()).clone();
        println!();
        println!("  {}: {}", resource.display_name, resource.hotline_number);
    }

    Ok(())
}

fn run_resource(config: &Config, region: &str) -> Result<()> {
    let resources = config.resources();
    if !resources.contains(region) {
        eprintln!(
            "No resource for '{}', showing default ({})",
            region,
            resources.default_region()
        );
    }

    let resource = resources.resolve(region);
    println!("\x1b[1;36m{}\x1b[0m ({})", resource.display_name, resource.region_code);
    println!("  Hotline: {}", resource.hotline_number);
    println!("  Text:    {}", resource.text_instruction);
    println!("  Chat:    {}", resource.chat_url);
    println!("  {}", resource.description);
    Ok(())
}

fn run_lexicon(config: &Config, lang: Option<&str>) -> Result<()> {
    let store = config.lexicons();
    let lexicons: Vec<_> = match lang {
        Some(tag) => vec![store.phrases_for_tag(tag)],
        None => store.languages().collect(),
    };

    for lexicon in lexicons {
        println!("\x1b[1;36m[{}]\x1b[0m {} phrases", lexicon.language(), lexicon.len());
        for phrase in lexicon.phrases() {
            if phrase.variants.is_empty() {
                println!("  {}", phrase.phrase);
            } else {
                println!("  {} ({})", phrase.phrase, phrase.variants.join(", "));
            }
        }
    }
    Ok(())
}

async fn run_serve(mut config: Config, bind: Option<String>) -> Result<()> {
    if let Some(bind) = bind {
        config.server.bind_address = bind;
    }

    tracing::info!("Starting Lifeline in daemon mode");

    let recorder: Arc<dyn AuditRecorder> =
        Arc::new(JsonlAuditRecorder::new(config.audit_log_path.clone())?);
    tracing::info!(audit_log = %config.audit_log_path.display(), "Audit log ready");

    let server = SafetyServer::new(config, recorder)?;
    server.serve().await
}

async fn run_flags(config: &Config, command: FlagsCommand) -> Result<()> {
    let recorder = JsonlAuditRecorder::new(config.audit_log_path.clone())?;

    match command {
        FlagsCommand::List { user } => {
            let flags = match user.as_deref() {
                Some(user_id) => recorder.flags_for_user(user_id).await?,
                None => recorder.list_flags().await?,
            };

            if flags.is_empty() {
                println!("No flags recorded");
                return Ok(());
            }

            for flag in flags {
                let status = if flag.dismissed { "dismissed" } else { "open" };
                println!(
                    "{}  {}  user={} entry={} [{}]  {}",
                    flag.id,
                    flag.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    flag.user_id,
                    flag.entry_id,
                    status,
                    flag.matched_keywords.join(", ")
                );
            }
        }
        FlagsCommand::Dismiss { id } => {
            let flag_id: FlagId = id
                .parse()
                .with_context(|| format!("Invalid flag id: {}", id))?;
            recorder.dismiss_flag(flag_id).await?;
            println!("\x1b[1;32m✓ Flag {} dismissed\x1b[0m", flag_id);
        }
    }

    Ok(())
}
