use anyhow::{bail, Context, Result};
use i18n_build::config::PipelineConfig;
use i18n_build::events::{EventSink, LogObserver};
use i18n_build::i18n::{Language, LanguageRegistry};
use i18n_build::rate_limit::RateLimiter;
use i18n_build::translation::ProviderClient;
use i18n_build::{LanguageOutcome, Pipeline, RunReport};
use std::sync::Arc;
use tracing::{info, warn};

const USAGE: &str = "\
Usage: i18n-build [OPTIONS] [LANG...]

Translate changed source chunks and deploy one document per language.
With no LANG arguments every supported target language is built.

Options:
  -h, --help    Print this help and exit
      --list    Print the supported language codes and exit

Environment:
  TRANSLATION_PROVIDER   openai (default) or anthropic
  OPENAI_API_KEY         credential when the provider is openai
  ANTHROPIC_API_KEY      credential when the provider is anthropic
  TRANSLATION_MODELS     pipe-separated model fallback order
  SOURCE_DIR, OUTPUT_DIR, SCRATCH_DIR, BUILD_META_PATH";

#[derive(Debug, PartialEq)]
enum Command {
    Help,
    List,
    Build(Vec<String>),
}

fn parse_args(args: &[String]) -> Result<Command> {
    let mut codes = Vec::new();
    for arg in args {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "--list" => return Ok(Command::List),
            flag if flag.starts_with('-') => bail!("Unknown option: {}\n\n{}", flag, USAGE),
            code => codes.push(code.to_string()),
        }
    }
    Ok(Command::Build(codes))
}

fn print_languages() {
    for language in LanguageRegistry::get().list_enabled() {
        let marker = if language.is_canonical { " (source)" } else { "" };
        println!(
            "{:<4} {} / {}{}",
            language.code, language.name, language.native_name, marker
        );
    }
}

fn print_summary(report: &RunReport) {
    println!("\n========== TRANSLATION SUMMARY ==========");
    println!(
        "{:<6} {:>10} {:>8} {:>7}  {}",
        "lang", "translated", "skipped", "failed", "result"
    );
    for language in &report.languages {
        let result = match &language.outcome {
            LanguageOutcome::Deployed => "deployed".to_string(),
            LanguageOutcome::UpToDate => "up to date".to_string(),
            LanguageOutcome::Failed(reason) => format!("failed: {}", reason),
        };
        println!(
            "{:<6} {:>10} {:>8} {:>7}  {}",
            language.language, language.translated, language.skipped, language.failed, result
        );
    }
    println!("=========================================\n");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored when absent)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("i18n_build=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let codes = match parse_args(&args)? {
        Command::Help => {
            println!("{}", USAGE);
            return Ok(());
        }
        Command::List => {
            print_languages();
            return Ok(());
        }
        Command::Build(codes) => codes,
    };
    let languages = Language::parse_targets(&codes)?;

    let config = Arc::new(PipelineConfig::from_env().context("Failed to load configuration")?);
    info!(
        "Using {} with models [{}]",
        config.provider.name(),
        config.models.join(" | ")
    );

    let limiter = Arc::new(RateLimiter::new(config.rate_limit_per_minute));
    let client = ProviderClient::new(config.clone(), limiter);

    let (events, rx) = EventSink::channel();
    let observer = tokio::spawn(LogObserver::run(rx));

    let pipeline = Pipeline::new(config, client).with_events(events);
    let result = pipeline.run(&languages).await;

    // Closing the last sender lets the observer drain and exit.
    drop(pipeline);
    let _ = observer.await;

    let report = result.context("Translation build aborted")?;
    print_summary(&report);

    if report.has_failures() {
        warn!(
            "Build completed with issues: {} of {} language(s) failed",
            report.failed_languages(),
            report.languages.len()
        );
    } else {
        info!("Build completed successfully");
    }
    Ok(())
}
