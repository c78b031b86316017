//! pr-risk: score a diff and map it to risk / size labels.
//!
//! Usage:
//!   pr-risk < input.json            # one JSON object in, one JSON object out
//!   pr-risk --pretty < input.json   # indented output
//!   pr-risk --labels < input.json   # label names only, one per line
//!
//! Input shape: {"stats": {...}, "paths": [...], "diff_text": "...", "ai_risk": "low"}.

use pr_risk::{run, Input};
use std::io::{self, Read, Write};

fn main() {
  let args: Vec<String> = std::env::args().skip(1).collect();
  let pretty = args.iter().any(|a| a == "--pretty");
  let labels_only = args.iter().any(|a| a == "--labels");

  if let Err(e) = run_binary(pretty, labels_only) {
    let _ = writeln!(io::stderr(), "pr-risk: {}", e);
    std::process::exit(1);
  }
}

fn run_binary(pretty: bool, labels_only: bool) -> Result<(), Box<dyn std::error::Error>> {
  let mut raw = String::new();
  io::stdin().lock().read_to_string(&mut raw)?;
  let input: Input = serde_json::from_str(&raw)?;
  let out = run(&input);

  let stdout = io::stdout();
  let mut handle = stdout.lock();
  if labels_only {
    for label in &out.labels {
      writeln!(handle, "{}", label)?;
    }
  } else if pretty {
    serde_json::to_writer_pretty(&mut handle, &out)?;
    writeln!(handle)?;
  } else {
    serde_json::to_writer(&mut handle, &out)?;
  }
  Ok(())
}
