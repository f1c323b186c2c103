use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use bytesig::{FileBuffer, Quit, ScanOutcome, SignatureFile, Strike};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: bytesig [--escalate] <signatures.yaml> <file>...";

struct Args {
    escalate: bool,
    signatures: PathBuf,
    files: Vec<PathBuf>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut escalate = false;
    let mut positional = Vec::new();
    for arg in std::env::args_os().skip(1) {
        let text = arg.to_string_lossy().into_owned();
        match text.as_str() {
            "--escalate" => escalate = true,
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            flag if flag.starts_with("--") => bail!("unknown flag {flag}\n{USAGE}"),
            _ => positional.push(PathBuf::from(arg)),
        }
    }
    if positional.len() < 2 {
        bail!("{USAGE}");
    }
    let signatures = positional.remove(0);
    Ok(Args {
        escalate,
        signatures,
        files: positional,
    })
}

#[derive(Serialize)]
struct StrikeLine<'a> {
    file: &'a str,
    #[serde(flatten)]
    strike: &'a Strike,
}

#[derive(Serialize)]
struct SummaryLine<'a> {
    file: &'a str,
    outcome: &'static str,
    strikes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = parse_args()?;
    let file = SignatureFile::from_file(&args.signatures)
        .with_context(|| format!("loading {}", args.signatures.display()))?;
    let matcher = Arc::new(file.into_matcher()?);
    matcher.prepare().await?;

    let quit = Quit::new();
    {
        let quit = quit.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted");
                quit.cancel();
            }
        });
    }

    let mut scans = JoinSet::new();
    for path in args.files {
        let matcher = Arc::clone(&matcher);
        let quit = quit.child();
        let escalate = args.escalate;
        scans.spawn(async move {
            let opened = tokio::task::spawn_blocking({
                let path = path.clone();
                move || FileBuffer::open(path)
            })
            .await?;
            let buf = opened.with_context(|| format!("opening {}", path.display()))?;
            let mut ident = matcher.identify(Arc::new(buf), quit);
            if escalate {
                ident.escalate();
            }
            let (strikes, outcome) = ident.collect().await;
            anyhow::Ok((path, strikes, outcome))
        });
    }

    let mut failed = 0usize;
    while let Some(joined) = scans.join_next().await {
        let (path, strikes, outcome) = match joined? {
            Ok(report) => report,
            Err(err) => {
                failed += 1;
                eprintln!("bytesig: {err:#}");
                continue;
            }
        };
        let name = path.to_string_lossy();
        for strike in &strikes {
            println!("{}", serde_json::to_string(&StrikeLine { file: &name, strike })?);
        }
        let error = match &outcome {
            ScanOutcome::Truncated(err) => Some(err.to_string()),
            ScanOutcome::Failed(err) => {
                failed += 1;
                Some(err.to_string())
            }
            _ => None,
        };
        let summary = SummaryLine {
            file: &name,
            outcome: outcome.label(),
            strikes: strikes.len(),
            error,
        };
        println!("{}", serde_json::to_string(&summary)?);
    }

    if failed > 0 {
        bail!("{failed} file(s) could not be identified");
    }
    Ok(())
}
