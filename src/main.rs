use clap::{Parser, ValueEnum};
use envexpand::{
    EnvResolver, ExpandConfig, Expander, Layered, MalformedPolicy, MapResolver, Resolution,
    Resolver, Result, Scanner, Segment, find_placeholders, read_template, write_output,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

const LONG_HELP: &str = r#"
Placeholders:
  ${NAME}            - Value of NAME, error if unset or empty
  ${NAME:default}    - Value of NAME, or 'default' if unset or empty
  ${NAME:}           - Value of NAME, or nothing

Examples:
  # Expand a template file to stdout
  envexpand config.yaml.tpl
  # Expand from stdin into a file
  cat config.yaml.tpl | envexpand -o config.yaml
  # Override or supply variables
  envexpand config.yaml.tpl -D APP_PORT=9090 -D APP_HOST=localhost
  # Use only the given definitions, ignore the environment
  envexpand config.yaml.tpl --no-env -D APP_PORT=9090
  # Check every placeholder resolves (values are never printed)
  envexpand config.yaml.tpl --dry-run
  # List placeholders
  envexpand config.yaml.tpl --list
  # Output as JSON for scripting
  envexpand config.yaml.tpl --list=json
  # Fail on a stray '$' or an unclosed '${'
  envexpand config.yaml.tpl --strict
"#;

/// Expand environment placeholders in configuration templates.
#[derive(Parser, Debug)]
#[command(
    name = "envexpand",
    version,
    about = "Expand ${NAME} and ${NAME:default} placeholders from the environment.",
    after_long_help = LONG_HELP
)]
struct Cli {
    /// Template file to expand. Use '-' for stdin.
    #[arg(value_name = "TEMPLATE", default_value = "-")]
    template: PathBuf,

    /// Output file (defaults to stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Define a variable (repeatable). Takes precedence over the environment
    #[arg(short = 'D', long = "define", value_name = "KEY=VALUE", action = clap::ArgAction::Append)]
    define: Vec<String>,

    /// Ignore the process environment, resolve only from --define
    #[arg(long)]
    no_env: bool,

    /// Reject a '$' that does not start a placeholder and an unclosed '${'
    #[arg(long, env = "ENVEXPAND_STRICT")]
    strict: bool,

    /// Perform a dry run - check every placeholder resolves without expanding
    #[arg(long, conflicts_with = "list")]
    dry_run: bool,

    /// List placeholders in template (optionally with format: plain, detailed, json)
    #[arg(long, value_name = "FORMAT", num_args = 0..=1, default_missing_value = "plain", conflicts_with = "dry_run")]
    list: Option<ListFormat>,

    /// Increase verbosity (can be used multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq)]
enum ListFormat {
    /// Variable names, one per line
    Plain,
    /// Position, default and where each value comes from
    Detailed,
    /// JSON output for scripting
    Json,
}

/// Where a placeholder's replacement comes from. Never carries the value itself.
#[derive(Clone, Copy, Debug, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
enum Source {
    Environment,
    Default,
    Unresolved,
}

impl Source {
    fn of(resolution: &Resolution<'_>) -> Self {
        match resolution {
            Resolution::Value(_) => Self::Environment,
            Resolution::Default(_) => Self::Default,
            Resolution::Unresolved => Self::Unresolved,
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Environment => "environment",
            Self::Default => "default",
            Self::Unresolved => "unresolved",
        }
    }
}

#[derive(Serialize)]
struct PlaceholderInfo {
    name: String,
    start: usize,
    end: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    default: Option<String>,
    source: Source,
}

fn main() {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => LogLevel::Error,
        (false, 0) => LogLevel::Warn,
        (false, 1) => LogLevel::Info,
        (false, 2) => LogLevel::Debug,
        (false, _) => LogLevel::Trace,
    };

    let mut definitions = MapResolver::new();
    for definition in &cli.define {
        if let Err(e) = definitions.define(definition) {
            eprintln!("[ERROR] {e}");
            std::process::exit(2);
        }
    }
    log(
        log_level,
        LogLevel::Debug,
        &format!("{} variable(s) defined on the command line", definitions.len()),
    );

    let expander = build_expander(&cli, definitions);

    let result = read_content(&cli.template, log_level).and_then(|content| {
        if cli.dry_run {
            dry_run(&content, &expander, log_level)
        } else if let Some(list_format) = cli.list {
            list_placeholders(&content, list_format, &expander, log_level)
        } else {
            expand_content(&content, &expander, cli.output.as_deref(), log_level)
        }
    });

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn build_expander(cli: &Cli, definitions: MapResolver) -> Expander<impl Resolver> {
    let environment = (!cli.no_env).then_some(EnvResolver);
    let resolver = Layered::new(definitions, move |name: &str| {
        environment.and_then(|env| env.lookup(name))
    });

    let on_malformed = if cli.strict {
        MalformedPolicy::Reject
    } else {
        MalformedPolicy::Literal
    };

    Expander::with_resolver(resolver).with_config(ExpandConfig { on_malformed })
}

fn read_content(template: &Path, log_level: LogLevel) -> Result<Vec<u8>> {
    if template == Path::new(envexpand::source::STDIN_PATH) {
        log(log_level, LogLevel::Info, "Reading template from stdin...");
    } else {
        log(
            log_level,
            LogLevel::Info,
            &format!("Reading template from {}", template.display()),
        );
    }
    let content = read_template(template)?;
    log(
        log_level,
        LogLevel::Trace,
        &format!("Read {} bytes", content.len()),
    );
    Ok(content)
}

fn expand_content<R: Resolver>(
    content: &[u8],
    expander: &Expander<R>,
    output: Option<&Path>,
    log_level: LogLevel,
) -> Result<()> {
    log(log_level, LogLevel::Debug, "Expanding placeholders...");
    let expanded = expander.expand(Some(content))?;

    if let Some(output_path) = output {
        log(
            log_level,
            LogLevel::Info,
            &format!("Writing output to {}", output_path.display()),
        );
    }
    write_output(output, &expanded)?;

    log(log_level, LogLevel::Info, "Expansion complete!");
    Ok(())
}

fn dry_run<R: Resolver>(content: &[u8], expander: &Expander<R>, log_level: LogLevel) -> Result<()> {
    log(
        log_level,
        LogLevel::Info,
        "Performing dry run - checking placeholders...",
    );

    let strict = expander.config().on_malformed == MalformedPolicy::Reject;
    let mut placeholder_count = 0;
    let mut valid_count = 0;
    let mut invalid_count = 0;

    for segment in Scanner::new(content) {
        match segment {
            Segment::Placeholder(placeholder) => {
                placeholder_count += 1;
                let name = placeholder.name_lossy();
                match Source::of(&expander.resolution(&placeholder)) {
                    Source::Unresolved => {
                        log(
                            log_level,
                            LogLevel::Error,
                            &format!("✗ {name} at {} (unresolved)", placeholder.start),
                        );
                        invalid_count += 1;
                    }
                    source => {
                        log(
                            log_level,
                            LogLevel::Info,
                            &format!("✓ {name} ({})", source.label()),
                        );
                        valid_count += 1;
                    }
                }
            }
            Segment::Malformed { kind, start, .. } if strict => {
                log(
                    log_level,
                    LogLevel::Error,
                    &format!("✗ malformed placeholder at {start}: {}", kind.message()),
                );
                invalid_count += 1;
            }
            Segment::Malformed { kind, start, .. } => {
                log(
                    log_level,
                    LogLevel::Debug,
                    &format!("Kept literal at {start}: {}", kind.message()),
                );
            }
            Segment::Literal(_) => {}
        }
    }

    println!("\nSummary: {placeholder_count} placeholders found");
    if valid_count > 0 {
        println!("  ✓ {valid_count} resolved");
    }
    if invalid_count > 0 {
        println!("  ✗ {invalid_count} invalid");
        std::process::exit(1);
    }

    Ok(())
}

fn list_placeholders<R: Resolver>(
    content: &[u8],
    format: ListFormat,
    expander: &Expander<R>,
    log_level: LogLevel,
) -> Result<()> {
    log(log_level, LogLevel::Debug, "Listing template placeholders...");

    let placeholders = find_placeholders(content);

    match format {
        ListFormat::Plain => {
            for placeholder in &placeholders {
                println!("{}", placeholder.name_lossy());
            }
        }
        ListFormat::Detailed => {
            for placeholder in &placeholders {
                println!("Placeholder: {}", placeholder.name_lossy());
                println!("  Position: {}..{}", placeholder.start, placeholder.end);
                match placeholder.default {
                    Some(default) => {
                        println!("  Default: \"{}\"", String::from_utf8_lossy(default));
                    }
                    None => println!("  Default: none"),
                }
                let source = Source::of(&expander.resolution(placeholder));
                println!("  Source: {}", source.label());
                println!();
            }
        }
        ListFormat::Json => {
            let infos: Vec<PlaceholderInfo> = placeholders
                .iter()
                .map(|placeholder| PlaceholderInfo {
                    name: placeholder.name_lossy().into_owned(),
                    start: placeholder.start,
                    end: placeholder.end,
                    default: placeholder
                        .default
                        .map(|default| String::from_utf8_lossy(default).into_owned()),
                    source: Source::of(&expander.resolution(placeholder)),
                })
                .collect();

            let json = serde_json::to_string_pretty(&infos)?;
            println!("{json}");
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

fn log(current_level: LogLevel, message_level: LogLevel, message: &str) {
    if message_level >= current_level {
        eprintln!(
            "[{}] {}",
            match message_level {
                LogLevel::Trace => "TRACE",
                LogLevel::Debug => "DEBUG",
                LogLevel::Info => "INFO",
                LogLevel::Warn => "WARN",
                LogLevel::Error => "ERROR",
            },
            message
        );
    }
}
