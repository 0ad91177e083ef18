use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "pmp-relay")]
#[command(about = "Keeps a firewall alias and Transmission's peer port in sync with the NAT-PMP mapped port")]
pub struct CliArgs {
    /// Path to TOML configuration file (environment variables are used when omitted)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Override the delay between polling cycles, in seconds
    #[arg(long)]
    pub refresh_delay: Option<u64>,

    /// Run the startup checks (alias lookup, application ping) and exit
    #[arg(long)]
    pub check: bool,
}
