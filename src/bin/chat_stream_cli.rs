//! chat-stream-cli: 事件流会话、后台任务与反馈接口的命令行工具
//!
//! Usage:
//!   chat-stream-cli send <message> [--model <m>] [--session <id>]   Stream a reply
//!   chat-stream-cli task <task_id> [--timeout-ms <n>]                 Wait for a task
//!   chat-stream-cli call <endpoint> <json>                            Call a JSON endpoint

use anyhow::{anyhow, bail, Context};
use chat_stream_client::transport::StaticCsrfToken;
use chat_stream_client::{
    ChannelSink, ChatClient, ChatPayload, ClientConfig, Endpoint, SendOutcome, SessionEvent,
};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let result = match args[1].as_str() {
        "send" => cmd_send(&args[2..]).await,
        "task" => cmd_task(&args[2..]).await,
        "call" => cmd_call(&args[2..]).await,
        "version" | "--version" | "-V" => {
            cmd_version();
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

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn print_usage() {
    println!(
        r#"chat-stream-cli: 流式对话命令行工具

USAGE:
    chat-stream-cli <COMMAND> [OPTIONS]

COMMANDS:
    send <message> [--model <m>] [--session <id>]   Send a message and stream the reply
    task <task_id> [--timeout-ms <n>]                Wait for a background task
    call <endpoint> <json>                           POST to chat-feedback, scenario-feedback,
                                                     scenario-assist, watch-start or watch-next
    version                                          Show version information
    help                                             Show this help message

GLOBAL OPTIONS:
    --config <path>                                  YAML configuration file
    --csrf <token>                                   Value for the X-CSRFToken header

ENVIRONMENT:
    CHAT_STREAM_BASE_URL, CHAT_STREAM_MODEL, CHAT_STREAM_MAX_RETRIES, ...
    RUST_LOG                                         Log filter (default: warn)"#
    );
}

fn cmd_version() {
    println!("chat-stream-cli {}", env!("CARGO_PKG_VERSION"));
}

fn flag_value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

/// Positional arguments, skipping `--flag value` pairs.
fn positionals(args: &[String]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg.starts_with("--") {
            iter.next();
        } else {
            out.push(arg.as_str());
        }
    }
    out
}

fn build_client(args: &[String]) -> anyhow::Result<ChatClient> {
    let config = match flag_value(args, "--config") {
        Some(path) => ClientConfig::from_yaml_file(path)
            .with_context(|| format!("loading {path}"))?
            .with_env_overrides(),
        None => ClientConfig::from_env(),
    };
    let mut builder = ChatClient::builder().config(config);
    if let Some(token) = flag_value(args, "--csrf") {
        builder = builder.csrf_source(Arc::new(StaticCsrfToken(token.to_string())));
    }
    Ok(builder.build()?)
}

async fn cmd_send(args: &[String]) -> anyhow::Result<()> {
    let message = positionals(args).join(" ");
    if message.trim().is_empty() {
        bail!("send: missing <message>");
    }
    let client = build_client(args)?;
    let model = flag_value(args, "--model")
        .map(str::to_string)
        .unwrap_or_else(|| client.config().default_model.clone());

    let (sink, mut rx) = ChannelSink::channel(64);
    let session = match flag_value(args, "--session") {
        Some(id) => client.resume_session(id, sink),
        None => client.session(sink),
    };

    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(event) = rx.recv().await {
            match &event {
                SessionEvent::Message { delta, .. } => {
                    let _ = write!(stdout, "{delta}");
                    let _ = stdout.flush();
                }
                SessionEvent::Reconnecting { .. } => {
                    if let Some(notice) = event.reconnect_notice() {
                        eprintln!("\n[{notice}]");
                    }
                }
                SessionEvent::Complete(_) => println!(),
                SessionEvent::Error(e) => eprintln!("\n{}", e.user_message()),
            }
        }
    });

    let outcome = session.send(ChatPayload::new(message, model)).await?;
    drop(session);
    let _ = printer.await;

    match outcome {
        SendOutcome::Completed(done) => {
            eprintln!(
                "session: {}{}",
                done.session_id,
                done.task_id
                    .map(|t| format!(" task: {t}"))
                    .unwrap_or_default()
            );
            Ok(())
        }
        SendOutcome::Failed(e) => Err(anyhow!("stream failed ({}): {}", e.kind, e.message)),
        SendOutcome::Cancelled => Err(anyhow!("stream cancelled")),
        SendOutcome::Ignored => Err(anyhow!("a stream is already open")),
    }
}

async fn cmd_task(args: &[String]) -> anyhow::Result<()> {
    let task_id = positionals(args)
        .first()
        .copied()
        .ok_or_else(|| anyhow!("task: missing <task_id>"))?
        .to_string();
    let timeout = match flag_value(args, "--timeout-ms") {
        Some(raw) => Some(Duration::from_millis(
            raw.parse().with_context(|| format!("invalid --timeout-ms '{raw}'"))?,
        )),
        None => None,
    };
    let client = build_client(args)?;
    let result = client.wait_for_task(&task_id, timeout).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn parse_endpoint(name: &str) -> anyhow::Result<Endpoint> {
    Ok(match name {
        "chat-feedback" => Endpoint::ChatFeedback,
        "scenario-feedback" => Endpoint::ScenarioFeedback,
        "scenario-assist" => Endpoint::ScenarioAssist,
        "watch-start" => Endpoint::WatchStart,
        "watch-next" => Endpoint::WatchNext,
        other => bail!("unknown endpoint '{other}'"),
    })
}

async fn cmd_call(args: &[String]) -> anyhow::Result<()> {
    let pos = positionals(args);
    let [name, body, ..] = pos.as_slice() else {
        bail!("call: expected <endpoint> <json>");
    };
    let endpoint = parse_endpoint(name)?;
    let body: serde_json::Value =
        serde_json::from_str(body).context("request body is not valid JSON")?;
    let client = build_client(args)?;
    let result = client.call_and_wait(endpoint, &body).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
