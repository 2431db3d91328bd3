use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use provisioner::FiringCondition;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "zal")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Provision Zabbix from Prometheus alerting rules", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Reconcile templates, items, triggers and hosts with the rule files
    Prov(ProvArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Prov
// ============================================================================

#[derive(Args)]
pub struct ProvArgs {
    /// Host configuration file (yml, toml or json) [default: ~/.config/zal/hosts.yml]
    #[arg(short, long)]
    pub config_path: Option<PathBuf>,

    /// Zabbix API user
    #[arg(long, env = "ZABBIX_USER")]
    pub user: Option<String>,

    /// Zabbix API password
    #[arg(long, env = "ZABBIX_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Zabbix JSON-RPC endpoint
    #[arg(
        long,
        env = "ZABBIX_URL",
        default_value = "http://127.0.0.1/zabbix/api_jsonrpc.php"
    )]
    pub url: String,

    /// Prefix of every item key
    #[arg(long, default_value = "prometheus")]
    pub key_prefix: String,

    /// Prometheus base URL, for trigger links and target discovery
    #[arg(long, default_value = "")]
    pub prometheus_url: String,

    /// When a synthesized trigger fires
    #[arg(long, value_enum, default_value_t = FiringArg::NeZero)]
    pub firing: FiringArg,

    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    pub timeout: u64,

    /// Show what would change without writing to Zabbix
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FiringArg {
    /// Fire while the item value is not zero
    NeZero,
    /// Fire while the item value is above zero
    GtZero,
}

impl From<FiringArg> for FiringCondition {
    fn from(arg: FiringArg) -> Self {
        match arg {
            FiringArg::NeZero => Self::NotEqualZero,
            FiringArg::GtZero => Self::GreaterThanZero,
        }
    }
}
