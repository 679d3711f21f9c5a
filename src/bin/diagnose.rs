//! postflow-diagnose: look up error snapshots on a running server
//!
//! Usage:
//!   postflow-diagnose [--url URL] <error-id>
//!   postflow-diagnose [--url URL] --recent [N] [--client ID] [--kind KIND]
//!
//! The server URL defaults to `POSTFLOW_URL`, then `http://localhost:8080`.

use postflow::snapshots::{ErrorId, ErrorSnapshot, FailureKind};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::process::ExitCode;

const DEFAULT_URL: &str = "http://localhost:8080";
const DEFAULT_RECENT: usize = 20;

#[derive(Debug, PartialEq)]
enum Command {
    Show(ErrorId),
    Recent {
        limit: usize,
        client: Option<String>,
        kind: Option<FailureKind>,
    },
}

#[derive(Debug, PartialEq)]
struct Args {
    url: String,
    command: Command,
}

#[derive(Deserialize)]
struct ErrorList {
    errors: Vec<ErrorSnapshot>,
}

fn parse_args(args: &[String], default_url: String) -> Result<Args, String> {
    let mut url = default_url;
    let mut recent: Option<usize> = None;
    let mut client = None;
    let mut kind = None;
    let mut id = None;

    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--url" => url = iter.next().ok_or("--url needs a value")?.clone(),
            "--client" => client = Some(iter.next().ok_or("--client needs a value")?.clone()),
            "--kind" => {
                let value = iter.next().ok_or("--kind needs a value")?;
                kind = Some(value.parse::<FailureKind>()?);
            }
            "--recent" => {
                let limit = match iter.peek() {
                    Some(next) if !next.starts_with("--") => {
                        let n = next
                            .parse()
                            .map_err(|_| format!("invalid count for --recent: {next}"))?;
                        iter.next();
                        n
                    }
                    _ => DEFAULT_RECENT,
                };
                recent = Some(limit);
            }
            other if other.starts_with("--") => return Err(format!("unknown option {other}")),
            other => {
                let parsed =
                    ErrorId::parse(other).ok_or_else(|| format!("not an error id: {other}"))?;
                id = Some(parsed);
            }
        }
    }

    let command = match (id, recent) {
        (Some(id), None) => Command::Show(id),
        (None, Some(limit)) => Command::Recent { limit, client, kind },
        (None, None) => return Err("give an error id or --recent".to_string()),
        (Some(_), Some(_)) => return Err("an error id and --recent are exclusive".to_string()),
    };
    Ok(Args {
        url: url.trim_end_matches('/').to_string(),
        command,
    })
}

fn fetch_snapshot(url: &str, id: &ErrorId) -> Result<Option<ErrorSnapshot>, String> {
    match ureq::get(&format!("{url}/api/errors/{id}")).call() {
        Ok(response) => response
            .into_json()
            .map(Some)
            .map_err(|e| format!("failed to parse snapshot: {e}")),
        Err(ureq::Error::Status(404, _)) => Ok(None),
        Err(e) => Err(format!("request failed: {e}")),
    }
}

fn fetch_recent(
    url: &str,
    limit: usize,
    client: Option<&str>,
    kind: Option<FailureKind>,
) -> Result<Vec<ErrorSnapshot>, String> {
    let mut request = ureq::get(&format!("{url}/api/errors")).query("limit", &limit.to_string());
    if let Some(client) = client {
        request = request.query("client", client);
    }
    if let Some(kind) = kind {
        request = request.query("kind", kind.as_str());
    }
    let list: ErrorList = request
        .call()
        .map_err(|e| format!("request failed: {e}"))?
        .into_json()
        .map_err(|e| format!("failed to parse error list: {e}"))?;
    Ok(list.errors)
}

fn render_snapshot(snapshot: &ErrorSnapshot) -> String {
    let context = serde_json::to_string_pretty(&snapshot.context)
        .unwrap_or_else(|e| format!("<unprintable context: {e}>"));
    format!(
        "Error {id}\n  recorded: {at}\n  client:   {client}\n  state:    {state}\n  kind:     {kind}\n  message:  {message}\n  context:\n{context}\n",
        id = snapshot.error_id,
        at = snapshot.recorded_at.to_rfc3339(),
        client = snapshot.client_id,
        state = snapshot.state,
        kind = snapshot.kind,
        message = snapshot.message,
        context = indent(&context, 4),
    )
}

fn render_summary(snapshots: &[ErrorSnapshot]) -> String {
    let mut by_kind: BTreeMap<&str, usize> = BTreeMap::new();
    let mut by_state: BTreeMap<String, usize> = BTreeMap::new();
    for snapshot in snapshots {
        *by_kind.entry(snapshot.kind.as_str()).or_default() += 1;
        *by_state.entry(snapshot.state.to_string()).or_default() += 1;
    }

    let mut out = format!("{} error(s)\n\nBy kind:\n", snapshots.len());
    for (kind, count) in &by_kind {
        out.push_str(&format!("  {kind:<28} {count}\n"));
    }
    out.push_str("\nBy state:\n");
    for (state, count) in &by_state {
        out.push_str(&format!("  {state:<28} {count}\n"));
    }
    out
}

fn indent(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    text.lines()
        .map(|line| format!("{pad}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn run(args: Args) -> Result<(), String> {
    match args.command {
        Command::Show(id) => match fetch_snapshot(&args.url, &id)? {
            Some(snapshot) => {
                print!("{}", render_snapshot(&snapshot));
                Ok(())
            }
            None => Err(format!("no snapshot stored for {id}")),
        },
        Command::Recent {
            limit,
            client,
            kind,
        } => {
            let snapshots = fetch_recent(&args.url, limit, client.as_deref(), kind)?;
            for snapshot in &snapshots {
                println!(
                    "{}  {}  {:<24} {:<22} {}",
                    snapshot.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                    snapshot.error_id,
                    snapshot.state,
                    snapshot.kind,
                    snapshot.client_id
                );
            }
            println!();
            print!("{}", render_summary(&snapshots));
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let default_url = std::env::var("POSTFLOW_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());

    let args = match parse_args(&argv, default_url) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!("usage: postflow-diagnose [--url URL] <error-id>");
            eprintln!("       postflow-diagnose [--url URL] --recent [N] [--client ID] [--kind KIND]");
            return ExitCode::from(2);
        }
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
