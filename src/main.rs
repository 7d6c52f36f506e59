use anyhow::bail;
use chat_extractor::operator::{self, VerificationGate};
use chat_extractor::tools::fetch::{looks_like_share_link, relocate_pdf};
use chat_extractor::{
    consolidate, extract_saved_page, fetch, ExtractorConfig, FetchError, FetchRequest,
    OutputFormat, RawPagePolicy,
};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

const EXAMPLES: &str = "\
Examples:
  # Basic usage - creates consolidated_chat.md
  chat-extractor https://claude.ai/share/CHAT_ID

  # Custom output file
  chat-extractor CHAT_URL --output my_summary.md

  # Generate PDF instead of markdown
  chat-extractor CHAT_URL --format pdf

  # Keep intermediate files for debugging
  chat-extractor CHAT_URL --keep-artifacts --keep-html

  # Re-extract a kept page without opening a browser
  chat-extractor CHAT_URL --from-html consolidated_chat/chat_complete.html";

/// Extract and consolidate shared chat conversations.
#[derive(Parser, Debug)]
#[command(name = "chat-extractor", version, after_help = EXAMPLES)]
struct Cli {
    /// Share URL (e.g., https://claude.ai/share/...)
    url: String,

    /// Output file path (default: consolidated_chat.md for markdown, chat.pdf for PDF)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Working directory for intermediate files
    #[arg(short, long, default_value = "consolidated_chat")]
    work_dir: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Markdown)]
    format: OutputFormat,

    /// Keep individual artifact files after consolidation
    #[arg(long)]
    keep_artifacts: bool,

    /// Keep intermediate HTML file
    #[arg(long, conflicts_with = "no_html")]
    keep_html: bool,

    /// Never write the intermediate HTML file
    #[arg(long)]
    no_html: bool,

    /// Extract from a saved page instead of launching a browser
    #[arg(long, value_name = "FILE")]
    from_html: Option<PathBuf>,
}

impl Cli {
    fn raw_page_policy(&self) -> RawPagePolicy {
        if self.keep_html {
            RawPagePolicy::Keep
        } else if self.no_html {
            RawPagePolicy::Skip
        } else {
            RawPagePolicy::Transient
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,chromiumoxide=warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    let outcome = tokio::select! {
        res = run(cli) => Some(res),
        _ = tokio::signal::ctrl_c() => None,
    };

    let Some(outcome) = outcome else {
        // The pipeline future (and its browser) is dropped by now. Exit
        // directly: a pending stdin read would otherwise hold the runtime open.
        println!("\n\n❌ Cancelled by user");
        std::process::exit(1);
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            if let Some(fe) = e.downcast_ref::<FetchError>() {
                if fe.is_cancellation() {
                    println!("\n❌ Cancelled");
                    return ExitCode::FAILURE;
                }
            }
            eprintln!("\n❌ Error: {}", e);
            eprintln!("{:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let cfg = chat_extractor::load_config();
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| cli.format.default_output());

    if cli.from_html.is_some() && cli.format == OutputFormat::Pdf {
        bail!("--from-html only supports markdown output");
    }

    if !looks_like_share_link(&cli.url, cfg.share_url_prefix()) {
        println!("⚠️  Warning: URL doesn't look like a Claude share link");
        println!("   Expected: {}...", cfg.share_url_prefix());
        println!("   Got: {}", cli.url);
        if !operator::confirm("   Continue anyway? (y/N): ").await? {
            println!("❌ Cancelled");
            return Ok(ExitCode::FAILURE);
        }
    }

    print_banner(&cli, &output);

    match cli.from_html.as_deref() {
        Some(html) => {
            let outcome = extract_saved_page(html, &cli.url, &cli.work_dir, &cfg).await?;
            finish_markdown(&outcome.work_dir, &output, cli.keep_artifacts).await?;
        }
        None => {
            let gate = operator::default_gate();
            run_browser(&cli, &cfg, gate.as_ref(), &output).await?;
        }
    }

    println!();
    Ok(ExitCode::SUCCESS)
}

async fn run_browser(
    cli: &Cli,
    cfg: &ExtractorConfig,
    gate: &dyn VerificationGate,
    output: &Path,
) -> anyhow::Result<()> {
    let req = FetchRequest {
        url: cli.url.clone(),
        work_dir: cli.work_dir.clone(),
        format: cli.format,
        raw_page: cli.raw_page_policy(),
    };
    let outcome = fetch(&req, cfg, gate).await?;
    info!(
        "fetch finished: {} messages, {} artifacts",
        outcome.metadata.message_count, outcome.artifact_count
    );

    match cli.format {
        OutputFormat::Markdown => {
            finish_markdown(&outcome.work_dir, output, cli.keep_artifacts).await?;
        }
        OutputFormat::Pdf => {
            relocate_pdf(&outcome.work_dir, output).await?;
            println!("\n🎉 Success! PDF created:");
            println!("   {}", absolute(output).display());
        }
    }
    Ok(())
}

async fn finish_markdown(work_dir: &Path, output: &Path, keep_artifacts: bool) -> anyhow::Result<()> {
    consolidate(work_dir, output, keep_artifacts).await?;
    println!("\n🎉 Success! Your consolidated markdown is ready:");
    println!("   {}", absolute(output).display());
    println!("\n💡 This file is optimized for use as context in Claude conversations.");
    println!("   Simply upload it to your next chat to continue the discussion!");
    Ok(())
}

fn print_banner(cli: &Cli, output: &Path) {
    let rule = "=".repeat(70);
    println!("{}", rule);
    println!("Chat Extractor");
    println!("{}", rule);
    println!("URL:        {}", cli.url);
    println!("Format:     {}", cli.format.as_str());
    println!("Output:     {}", output.display());
    println!("Work dir:   {}", cli.work_dir.display());
    println!("{}", rule);
    println!();
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
