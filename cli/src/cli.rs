//! Command-line definitions for the `tandem` binary.

use std::fmt;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use tandem_protocol::config::{
    chain_name, CHAIN_ID_DEVNET, CHAIN_ID_LIGHTNET, CHAIN_ID_LOCAL, CHAIN_ID_ZEKO,
};

use crate::logging::LogFormat;

/// Top-level argument surface.
#[derive(Parser, Debug)]
#[command(
    name = "tandem",
    about = "Tandem developer client: escrow demos, key fixtures, version info",
    version,
    propagate_version = true
)]
pub struct TandemCli {
    /// More log detail. Once for debug, twice for trace.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log output format.
    #[arg(
        long,
        global = true,
        value_enum,
        env = "TANDEM_LOG_FORMAT",
        default_value_t = LogFormat::Plain
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one end-to-end escrow scenario.
    Demo(DemoArgs),
    /// Generate account key fixtures as JSON.
    Keygen(KeygenArgs),
    /// Print binary and protocol version information.
    Version,
}

/// Arguments for `tandem demo`.
#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Which flow to run.
    #[arg(value_enum)]
    pub scenario: Scenario,

    /// Chain to run against.
    #[arg(
        long,
        short,
        value_enum,
        env = "TANDEM_TARGET",
        default_value_t = ChainTarget::Local
    )]
    pub target: ChainTarget,

    /// Emit a JSON run summary on stdout instead of the plain report.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `tandem keygen`.
#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Account names, one fixture per name.
    #[arg(required = true)]
    pub names: Vec<String>,

    /// Derive deterministic development keys instead of random ones.
    /// Same name, same key, every run.
    #[arg(long)]
    pub derived: bool,

    /// Write the fixture list to this file instead of stdout.
    #[arg(long, short)]
    pub out: Option<PathBuf>,
}

/// The demo flows the `demo` subcommand can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Post an asset offer, then buy it outright at the asked price.
    OfferBuy,
    /// Match an offer against a bid atomically, driven by a third party.
    Settlement,
    /// Two escrows trade asset families without either owner signing.
    Swap,
    /// Write a covered option; the holder pays a premium and exercises.
    Option,
}

impl Scenario {
    /// The kebab-case name, as accepted on the command line.
    pub fn name(self) -> &'static str {
        match self {
            Self::OfferBuy => "offer-buy",
            Self::Settlement => "settlement",
            Self::Swap => "swap",
            Self::Option => "option",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which chain a command talks to.
///
/// Only `local` is served in-process today; the remote targets resolve
/// to their endpoint so the caller at least learns where the command
/// would have gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChainTarget {
    /// In-process chain with instant inclusion.
    Local,
    /// The shared development network.
    Devnet,
    /// A single-operator network for integration runs.
    Lightnet,
    /// The hosted rollup.
    Zeko,
}

impl ChainTarget {
    /// Network identifier for this target.
    pub fn chain_id(self) -> u32 {
        match self {
            Self::Local => CHAIN_ID_LOCAL,
            Self::Devnet => CHAIN_ID_DEVNET,
            Self::Lightnet => CHAIN_ID_LIGHTNET,
            Self::Zeko => CHAIN_ID_ZEKO,
        }
    }

    /// Default RPC endpoint, `None` for the in-process chain.
    pub fn endpoint(self) -> Option<&'static str> {
        match self {
            Self::Local => None,
            Self::Devnet => Some("https://rpc.devnet.tandem.network"),
            Self::Lightnet => Some("http://127.0.0.1:8080"),
            Self::Zeko => Some("https://rpc.zeko.tandem.network"),
        }
    }
}

impl fmt::Display for ChainTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&chain_name(self.chain_id()))
    }
}
