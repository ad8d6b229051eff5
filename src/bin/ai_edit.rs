//! ai-edit: 运行一次图像编辑流水线或打印生效配置的命令行工具
//!
//! Usage:
//!   ai-edit run --image <path> [--mask <path>] [--prompt <text>] [--base-url <url>]
//!               [--config <file>] [--out <path>] [--timeout-secs <n>]
//!   ai-edit config [--config <file>]                 Print the effective configuration

use ai_edit_pipeline::client::{EnvCredential, HttpClientBuilder};
use ai_edit_pipeline::pipeline::{Orchestrator, PipelineRequest, PipelineResult};
use ai_edit_pipeline::{CallContext, PipelineConfig};
use anyhow::{bail, Context};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let outcome = match args[1].as_str() {
        "run" => cmd_run(&args[2..]).await,
        "config" => cmd_config(&args[2..]),
        "version" | "--version" | "-V" => {
            println!("ai-edit {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = outcome {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn print_usage() {
    println!(
        r#"ai-edit: 图像编辑流水线命令行工具

USAGE:
    ai-edit <COMMAND> [OPTIONS]

COMMANDS:
    run --image <path>          Analyze the image, then generate an edited version
        [--mask <path>]         Restrict generation to the masked area
        [--prompt <text>]       Use this prompt instead of the analysis text
        [--base-url <url>]      Service base URL (or AI_EDIT_BASE_URL)
        [--config <file>]       YAML/JSON pipeline configuration
        [--out <path>]          Where to write the generated image (default: edited.bin)
        [--timeout-secs <n>]    Overall deadline for the whole pipeline
    config [--config <file>]    Print the effective configuration as YAML
    version                     Show version information
    help                        Show this help message

ENVIRONMENT:
    AI_EDIT_API_KEY             Bearer credential (OS keyring entry 'ai-edit' is tried first)
    AI_EDIT_PROXY_URL           Route service calls through a proxy
    AI_EDIT_*                   Configuration overrides, e.g. AI_EDIT_MAX_RPM
    RUST_LOG                    Log filter (default: info)"#
    );
}

fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn load_config(args: &[String]) -> anyhow::Result<PipelineConfig> {
    let path = flag(args, "--config").map(Path::new);
    PipelineConfig::load(path).context("loading configuration")
}

fn cmd_config(args: &[String]) -> anyhow::Result<()> {
    let config = load_config(args)?;
    print!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}

async fn cmd_run(args: &[String]) -> anyhow::Result<()> {
    let Some(image_path) = flag(args, "--image") else {
        bail!("--image <path> is required");
    };
    let config = load_config(args)?;

    let image = std::fs::read(image_path).with_context(|| format!("reading {image_path}"))?;
    let mut request = PipelineRequest::new(image);
    if let Some(mask_path) = flag(args, "--mask") {
        let mask = std::fs::read(mask_path).with_context(|| format!("reading {mask_path}"))?;
        request = request.with_mask(mask);
    }
    if let Some(prompt) = flag(args, "--prompt") {
        request = request.with_prompt(prompt);
    }
    if let Some(secs) = flag(args, "--timeout-secs") {
        let secs: u64 = secs.parse().context("--timeout-secs must be an integer")?;
        request = request.with_timeout(Duration::from_secs(secs));
    }

    let mut builder = HttpClientBuilder::new()
        .credential(Arc::new(EnvCredential::new("ai-edit")))
        .max_payload_bytes(config.max_payload_bytes);
    if let Some(url) = flag(args, "--base-url") {
        builder = builder.base_url(url);
    }
    let client = builder.build()?;
    let orchestrator = Orchestrator::new(Arc::new(client), config)?;

    let mut run = orchestrator.run(&CallContext::new(), request);
    let cancel = run.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    if let Some(mut events) = run.events() {
        while let Some(event) = events.next().await {
            println!("[{}] {}", run.request_id(), event);
        }
    }

    match run.result().await {
        PipelineResult::Success {
            analysis_text,
            generated_image,
            elapsed,
            attempts,
            ..
        } => {
            let out = PathBuf::from(flag(args, "--out").unwrap_or("edited.bin"));
            std::fs::write(&out, &generated_image)
                .with_context(|| format!("writing {}", out.display()))?;
            println!("analysis: {analysis_text}");
            println!(
                "wrote {} bytes to {} in {:.1}s ({} attempt(s))",
                generated_image.len(),
                out.display(),
                elapsed.as_secs_f64(),
                attempts
            );
            Ok(())
        }
        PipelineResult::Failure { kind, message, .. } => bail!("{kind}: {message}"),
    }
}
