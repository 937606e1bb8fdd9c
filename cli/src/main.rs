// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Tandem CLI
//!
//! Developer front door to the Tandem stack:
//!
//! - `demo` — run one end-to-end escrow scenario against an in-process chain
//! - `keygen` — mint account key fixtures as JSON for demos and tests
//! - `version` — print binary and protocol version information
//!
//! The interesting logic lives in `tandem-protocol` and
//! `tandem-contracts`; this binary is argument parsing, logging
//! bootstrap, and scenario orchestration.

mod cli;
mod logging;
mod scenario;

use std::fs;

use anyhow::{Context, Result};
use clap::Parser;

use tandem_protocol::config::{PROTOCOL_FINGERPRINT, PROTOCOL_VERSION};
use tandem_protocol::keys::{named_accounts, AccountKey, KeyFixture};

use crate::cli::{Command, KeygenArgs, TandemCli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = TandemCli::parse();
    logging::init_logging(cli.verbose, cli.log_format);

    match cli.command {
        Command::Demo(args) => scenario::run(args).await,
        Command::Keygen(args) => keygen(args),
        Command::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Produce one key fixture per name and write the list as JSON.
///
/// Random keys by default; `--derived` switches to the deterministic
/// development roster, which is fine for demos and nothing else.
fn keygen(args: KeygenArgs) -> Result<()> {
    let names: Vec<&str> = args.names.iter().map(String::as_str).collect();
    let keys: Vec<AccountKey> = if args.derived {
        named_accounts(&names)
    } else {
        names.iter().map(|name| AccountKey::random(*name)).collect()
    };

    for key in &keys {
        tracing::info!(name = key.name(), address = %key.address(), "generated key");
    }

    let fixtures: Vec<KeyFixture> = keys.iter().map(AccountKey::to_fixture).collect();
    let rendered = serde_json::to_string_pretty(&fixtures)?;
    match args.out {
        Some(path) => fs::write(&path, format!("{rendered}\n"))
            .with_context(|| format!("writing {}", path.display()))?,
        None => println!("{rendered}"),
    }
    Ok(())
}

/// Print the binary version and the protocol it speaks.
fn print_version() {
    println!("tandem {}", env!("CARGO_PKG_VERSION"));
    println!("protocol {PROTOCOL_VERSION} ({PROTOCOL_FINGERPRINT})");
}
