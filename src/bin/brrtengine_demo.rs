//! Small demo site driven from the command line.
//!
//! ```bash
//! brrtengine-demo routes
//! brrtengine-demo run "GET /hello" "GET /guess" "GET /guess?n=40" "GET /guess?n=42"
//! ```
//!
//! `run` sends each request in order and carries the continuation and session
//! cookies from one response to the next, like a browser would.

use anyhow::{Context as _, Result};
use brrtengine::dispatcher::{element, Context, Element, StageResult};
use brrtengine::logging::{init_logging, LogConfig};
use brrtengine::router::{HandlerFactory, PathInfo, RouterBuilder};
use brrtengine::{EngineConfig, Gate, Outcome, Request};
use clap::{Parser, Subcommand};
use http::{Method, StatusCode};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "brrtengine-demo")]
#[command(about = "brrtengine demo site", long_about = None)]
struct Cli {
    /// Engine config file (YAML or TOML); defaults come from BRRTE_* env vars
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Human readable logs instead of JSON
    #[arg(long, default_value_t = false)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the route table in match order
    Routes,
    /// Send requests like "GET /path?query" through the gate, in order
    Run {
        #[arg(required = true)]
        requests: Vec<String>,
    },
}

/// Number guessing game: one request per guess, state kept across pauses.
struct GuessGame {
    secret: u32,
}

impl Element for GuessGame {
    fn process(&self, ctx: &mut Context) -> StageResult {
        ctx.print("Guess a number between 1 and 100.");
        let mut tries = 0u32;
        loop {
            ctx.pause()?;
            tries += 1;
            let Some(guess) = ctx.param("n").and_then(|n| n.parse::<u32>().ok()) else {
                ctx.print("Send ?n=<number>.");
                continue;
            };
            if guess == self.secret {
                ctx.print(format_args!("Correct! {guess} in {tries} tries."));
                return Ok(());
            }
            let hint = if guess < self.secret { "higher" } else { "lower" };
            ctx.print(format_args!("{guess} is wrong, go {hint}."));
        }
    }
}

fn build_gate(config: EngineConfig) -> Result<Gate> {
    let gate = Gate::setup(config, |root| {
        root.before(element(|ctx| {
            ctx.set_header("x-engine", "brrtengine");
            Ok(())
        }));
        root.exception(element(|ctx| {
            let message = ctx
                .exception()
                .map(|e| format!("{e:#}"))
                .unwrap_or_default();
            ctx.set_status(StatusCode::INTERNAL_SERVER_ERROR);
            ctx.print(format_args!("Something went wrong: {message}"));
            Ok(())
        }));

        root.get("/", element(|ctx| ctx.redirect_to("hello")));
        root.get("/hello", element(|ctx| {
            ctx.print("Hello from brrtengine");
            Ok(())
        }))
        .name("hello");
        root.get("/boom", element(|_| Err(anyhow::anyhow!("kaboom").into())));
        root.on(
            Method::GET,
            "/guess",
            PathInfo::None,
            HandlerFactory::fresh(|| GuessGame {
                secret: fastrand::u32(1..=100),
            }),
        )
        .pausable();

        root.group("/blog", |blog| {
            blog.after(element(|ctx| {
                ctx.print("\n-- end of post --");
                Ok(())
            }));
            blog.on(
                Method::GET,
                "",
                PathInfo::map([r"{year:\d{4}}/{slug}", "{slug}"]),
                element(|ctx| {
                    let slug = ctx.path_param("slug").unwrap_or("").to_string();
                    match ctx.path_param("year") {
                        Some(year) => {
                            let year = year.to_string();
                            ctx.print(format_args!("Post '{slug}' from {year}"));
                        }
                        None => ctx.print(format_args!("Post '{slug}'")),
                    }
                    Ok(())
                }),
            );
        });

        root.group("/files", |files| {
            files.before(element(|ctx| {
                if ctx.path_info().is_some_and(|p| p.starts_with("private")) {
                    ctx.set_status(StatusCode::FORBIDDEN);
                    ctx.print("Forbidden");
                    return ctx.respond();
                }
                ctx.next()
            }));
            files.on(
                Method::GET,
                "",
                PathInfo::Capture,
                element(|ctx| {
                    let path = ctx.path_info().unwrap_or("").to_string();
                    ctx.print(format_args!("File: /{path}"));
                    Ok(())
                }),
            );
        });
    })?;
    Ok(gate)
}

fn parse_request_line(line: &str) -> Result<Request> {
    let (method, target) = line
        .split_once(' ')
        .with_context(|| format!("expected \"METHOD /path\", got \"{line}\""))?;
    let method: Method = method
        .trim()
        .parse()
        .with_context(|| format!("invalid method in \"{line}\""))?;
    Ok(Request::new(method, target.trim()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.pretty {
        LogConfig::default_dev()
    } else {
        LogConfig::from_env()
    };
    init_logging(&log_config)?;

    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::from_env(),
    };
    let gate = build_gate(config)?;

    match cli.command {
        Commands::Routes => {
            for line in gate.site().route_summaries() {
                println!("{line}");
            }
        }
        Commands::Run { requests } => {
            let session = ulid::Ulid::new().to_string();
            let mut continuation: Option<String> = None;
            let cookie_name = gate.config().continuation_cookie.clone();
            let session_name = gate.config().session_cookie.clone();

            for line in &requests {
                let mut request = parse_request_line(line)?.with_cookie(&session_name, &session);
                if let Some(id) = &continuation {
                    request = request.with_cookie(&cookie_name, id);
                }
                let outcome = gate.handle(request);
                if let Outcome::Paused { id, .. } = &outcome {
                    continuation = Some(id.to_string());
                }
                let status = outcome.status();
                let label = match &outcome {
                    Outcome::Handled(_) => "handled",
                    Outcome::Paused { .. } => "paused",
                    Outcome::NotFound => "not found",
                    Outcome::Deferred => "deferred",
                    Outcome::Fault { .. } => "fault",
                    Outcome::Unresolvable(_) => "unresolvable",
                };
                println!("> {line}");
                println!("< {} ({label})", status.as_u16());
                println!("{}\n", outcome.into_response().body_text());
            }
        }
    }

    gate.shutdown();
    Ok(())
}
