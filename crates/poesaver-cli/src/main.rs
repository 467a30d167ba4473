//! Poesaver CLI - save Poe.com shared conversations as Markdown files

use clap::{Parser, Subcommand, ValueEnum};
use poesaver::{
    convert_with_options, conversation_id, fetch_share_page_with_options, is_share_url,
    Converted, FetchOptions, RenderOptions, SourceInfo,
};
use std::error::Error;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Output format for the save subcommand
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum OutputFormat {
    /// Write a Markdown file and print a report
    #[default]
    Md,
    /// Print the structured conversation as JSON to stdout
    Json,
}

/// Poesaver - save Poe.com shared conversations as Markdown files
#[derive(Parser, Debug)]
#[command(name = "poesaver")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch one or more conversations and save them as Markdown
    Save {
        /// Share URL, a file of URLs (--batch), or a local HTML file (--local-file)
        input: String,

        /// Output file path (single conversation only)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Output directory for saved conversations
        #[arg(long, short = 'd', default_value = "./conversations")]
        directory: PathBuf,

        /// Treat INPUT as a file containing one URL per line
        #[arg(long)]
        batch: bool,

        /// Treat INPUT as an already-saved HTML file instead of a URL
        #[arg(long)]
        local_file: bool,

        /// Exclude the metadata block from the output
        #[arg(long)]
        no_metadata: bool,

        /// Exclude the footer from the output
        #[arg(long)]
        no_footer: bool,

        /// Request timeout in seconds
        #[arg(long, default_value_t = 30)]
        timeout: u64,

        /// Maximum retry attempts per URL
        #[arg(long, default_value_t = 3)]
        retries: u32,

        /// Delay between requests in seconds
        #[arg(long, default_value_t = 1.0)]
        delay: f64,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Md)]
        format: OutputFormat,
    },
    /// Validate share URLs without fetching them
    Validate {
        /// URLs to check
        #[arg(required = true)]
        urls: Vec<String>,
    },
}

struct SaveArgs {
    input: String,
    output: Option<PathBuf>,
    directory: PathBuf,
    batch: bool,
    local_file: bool,
    render: RenderOptions,
    fetch: FetchOptions,
    format: OutputFormat,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let exit_code = match cli.command {
        Commands::Save {
            input,
            output,
            directory,
            batch,
            local_file,
            no_metadata,
            no_footer,
            timeout,
            retries,
            delay,
            format,
        } => {
            let args = SaveArgs {
                input,
                output,
                directory,
                batch,
                local_file,
                render: RenderOptions {
                    include_metadata_header: !no_metadata,
                    include_footer: !no_footer,
                },
                fetch: FetchOptions {
                    timeout: Duration::from_secs(timeout),
                    max_retries: retries,
                    delay: Duration::from_secs_f64(delay),
                    user_agent: None,
                },
                format,
            };
            run_save(args).await
        }
        Commands::Validate { urls } => run_validate(&urls),
    };

    std::process::exit(exit_code);
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run_save(mut args: SaveArgs) -> i32 {
    if args.local_file {
        return save_local_file(&args);
    }

    let urls = if args.batch {
        match poesaver::read_url_list(Path::new(&args.input)) {
            Ok(urls) if !urls.is_empty() => urls,
            Ok(_) => {
                eprintln!("❌ No URLs found in {}", args.input);
                return 1;
            }
            Err(err) => {
                eprintln!("❌ Cannot read {}: {err}", args.input);
                return 1;
            }
        }
    } else {
        vec![args.input.clone()]
    };

    let valid: Vec<String> = urls
        .into_iter()
        .filter(|url| {
            if is_share_url(url) {
                true
            } else {
                eprintln!("⚠️  Skipping invalid URL: {url}");
                false
            }
        })
        .collect();

    if valid.is_empty() {
        eprintln!("❌ No valid Poe share URLs found");
        return 1;
    }

    let total = valid.len();
    if total > 1 && args.output.is_some() {
        eprintln!("⚠️  --output ignored when saving multiple conversations");
        args.output = None;
    }

    writeln_safe(&format!("🚀 Processing {total} conversation(s)..."));

    let mut saved = 0usize;
    for (index, url) in valid.iter().enumerate() {
        if index > 0 {
            // space out requests to the same host
            tokio::time::sleep(args.fetch.delay).await;
        }
        writeln_safe(&format!("\n📥 [{}/{}] Fetching: {url}", index + 1, total));
        match save_one(url, &args).await {
            Ok(()) => saved += 1,
            Err(err) => eprintln!("❌ Error processing {url}: {err}"),
        }
    }

    writeln_safe(&format!(
        "\n🎉 Completed! {saved}/{total} conversations saved."
    ));
    if saved < total {
        1
    } else {
        0
    }
}

async fn save_one(url: &str, args: &SaveArgs) -> Result<(), Box<dyn Error>> {
    let html = fetch_share_page_with_options(url, &args.fetch).await?;
    let id = conversation_id(url).unwrap_or_default();
    let source = SourceInfo::new(url, id, chrono::Utc::now());
    let result = convert_with_options(&html, &source, &args.render)?;
    emit(result, args)
}

fn save_local_file(args: &SaveArgs) -> i32 {
    let path = Path::new(&args.input);
    if !path.exists() {
        eprintln!("❌ Local file not found: {}", args.input);
        return 1;
    }

    writeln_safe(&format!("🚀 Processing local HTML file: {}", args.input));

    let html = match std::fs::read_to_string(path) {
        Ok(html) => html,
        Err(err) => {
            eprintln!("❌ Cannot read {}: {err}", args.input);
            return 1;
        }
    };

    let id = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let url = format!(
        "file://{}",
        std::fs::canonicalize(path)
            .unwrap_or_else(|_| path.to_path_buf())
            .display()
    );
    let source = SourceInfo::new(url, id, chrono::Utc::now());

    let outcome = convert_with_options(&html, &source, &args.render)
        .map_err(Box::<dyn Error>::from)
        .and_then(|result| emit(result, args));

    match outcome {
        Ok(()) => {
            writeln_safe("\n🎉 Completed! 1/1 files processed.");
            0
        }
        Err(err) => {
            eprintln!("❌ Error processing local file: {err}");
            1
        }
    }
}

fn emit(result: Converted, args: &SaveArgs) -> Result<(), Box<dyn Error>> {
    for warning in &result.warnings {
        eprintln!("⚠️  {warning}");
    }

    match args.format {
        OutputFormat::Json => {
            let payload = serde_json::json!({
                "conversation": result.conversation,
                "warnings": result.warnings,
            });
            writeln_safe(&serde_json::to_string_pretty(&payload)?);
            Ok(())
        }
        OutputFormat::Md => {
            let path = resolve_output_path(&result, args)?;
            std::fs::write(&path, &result.markdown)?;

            let size = result.markdown.len() as u64;
            let words: usize = result
                .conversation
                .messages
                .iter()
                .map(|m| poesaver::count_words(&m.plain_text()))
                .sum();

            writeln_safe(&format!("✅ Saved: {}", path.display()));
            writeln_safe(&format!(
                "   📊 {} messages, {} words, {}",
                result.conversation.metadata.message_count,
                words,
                poesaver::format_file_size(size)
            ));
            Ok(())
        }
    }
}

/// Explicit `--output` wins; otherwise a collision-free name derived from
/// the conversation title in the output directory
fn resolve_output_path(result: &Converted, args: &SaveArgs) -> Result<PathBuf, Box<dyn Error>> {
    if let Some(output) = &args.output {
        let mut path = output.clone();
        if path.extension().is_none() {
            path.set_extension("md");
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        return Ok(path);
    }
    Ok(poesaver::unique_path(
        &args.directory,
        &result.conversation.metadata.title,
        "md",
    )?)
}

fn run_validate(urls: &[String]) -> i32 {
    writeln_safe(&format!("🔍 Validating {} URL(s)...", urls.len()));

    let mut valid = 0usize;
    for url in urls {
        if is_share_url(url) {
            writeln_safe(&format!("✅ Valid: {url}"));
            valid += 1;
        } else {
            writeln_safe(&format!("❌ Invalid: {url}"));
        }
    }

    writeln_safe(&format!(
        "\n📊 {valid}/{} URLs are valid Poe share links",
        urls.len()
    ));
    0
}

/// Write to stdout, exit silently on broken pipe
fn writeln_safe(s: &str) {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if let Err(e) = writeln!(handle, "{}", s) {
        if e.kind() == io::ErrorKind::BrokenPipe {
            std::process::exit(0);
        }
        eprintln!("Error writing to stdout: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_args_parse() {
        let cli = Cli::try_parse_from([
            "poesaver",
            "save",
            "https://poe.com/s/abc",
            "--no-footer",
            "--retries",
            "5",
            "-d",
            "./out",
        ])
        .unwrap();

        let Commands::Save {
            input,
            no_footer,
            no_metadata,
            retries,
            directory,
            ..
        } = cli.command
        else {
            panic!("expected save subcommand");
        };
        assert_eq!(input, "https://poe.com/s/abc");
        assert!(no_footer);
        assert!(!no_metadata);
        assert_eq!(retries, 5);
        assert_eq!(directory, PathBuf::from("./out"));
    }

    #[test]
    fn test_validate_parse() {
        let cli = Cli::try_parse_from([
            "poesaver",
            "validate",
            "https://poe.com/s/abc",
            "https://poe.com/s/def",
        ])
        .unwrap();
        let Commands::Validate { urls } = cli.command else {
            panic!("expected validate subcommand");
        };
        assert_eq!(urls.len(), 2);
    }

    #[test]
    fn test_validate_requires_urls() {
        assert!(Cli::try_parse_from(["poesaver", "validate"]).is_err());
    }
}
