use std::io::{self, IsTerminal, Read};

use anyhow::{Result, anyhow};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "mathsnap",
    version,
    about = "Recognize a photographed math expression"
)]
struct Cli {
    /// Image file to recognize (reads stdin when omitted)
    image: Option<String>,

    /// Previously confirmed expression for this capture
    #[arg(short = 'H', long = "hint")]
    hint: Option<String>,

    /// Disambiguation model override (e.g. gpt-4o, claude-3-5-haiku-latest)
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// Skip the LLM disambiguation step
    #[arg(long = "no-disambiguation")]
    no_disambiguation: bool,

    /// Per-provider timeout in milliseconds
    #[arg(short = 't', long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// Show configured providers and exit
    #[arg(long = "show-providers")]
    show_providers: bool,

    /// Append confidence and image class to output
    #[arg(long = "with-confidence")]
    with_confidence: bool,

    /// Append lower-ranked readings to output
    #[arg(long = "with-alternatives")]
    with_alternatives: bool,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    mathsnap::logging::init(cli.verbose)?;

    let input = if cli.show_providers {
        Vec::new()
    } else if let Some(path) = &cli.image {
        std::fs::read(path).map_err(|err| anyhow!("failed to read {}: {}", path, err))?
    } else if io::stdin().is_terminal() {
        return Err(anyhow!("no image given (pass a file path or pipe an image)"));
    } else {
        let mut buffer = Vec::new();
        io::stdin().read_to_end(&mut buffer)?;
        buffer
    };

    let output = mathsnap::run(
        mathsnap::Config {
            hint: cli.hint,
            model: cli.model,
            no_disambiguation: cli.no_disambiguation,
            show_providers: cli.show_providers,
            settings_path: cli.read_settings,
            timeout_ms: cli.timeout_ms,
            with_confidence: cli.with_confidence,
            with_alternatives: cli.with_alternatives,
        },
        input,
    )
    .await?;

    println!("{}", output);
    Ok(())
}
