use clap::Parser;
use pmp_relay::utils::{logger, validation::Validate};
use pmp_relay::{
    CliArgs, NatpmpcMapper, OpnsenseFirewall, PortRelay, RelayConfig, RelayError, RelaySettings,
    TokioSleeper, TransmissionRemote,
};

fn exit_with(e: &RelayError, context: &str) -> ! {
    tracing::error!(
        "❌ {}: {} (Category: {:?})",
        context,
        e.detailed_message(),
        e.category()
    );
    tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}: {}", context, e.detailed_message());
    std::process::exit(1);
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    // 初始化日誌
    if args.json_logs {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🚀 Starting pmp-relay");

    // 載入配置：指定檔案時使用 TOML，否則讀取環境變數
    let mut config = match &args.config {
        Some(path) => {
            tracing::info!("📁 Loading configuration from: {}", path);
            RelayConfig::from_file(path)
        }
        None => {
            tracing::info!("📁 Loading configuration from environment");
            RelayConfig::from_env()
        }
    }
    .unwrap_or_else(|e| exit_with(&e, "Failed to load configuration"));

    if let Some(delay) = args.refresh_delay {
        config.set_refresh_delay_secs(delay);
        tracing::info!("🔧 Refresh delay overridden to: {}s", delay);
    }

    if let Err(e) = config.validate() {
        exit_with(&e, "Configuration validation failed");
    }
    tracing::info!("✅ Configuration loaded");
    if args.verbose {
        tracing::debug!(
            "Gateway: {}, alias: {}, refresh delay: {:?}",
            config.natpmp.gateway,
            config.firewall.alias_name,
            config.refresh_delay()
        );
    }

    let mapper = NatpmpcMapper::from_config(&config.natpmp)
        .unwrap_or_else(|e| exit_with(&e, "Invalid NAT-PMP settings"));
    let firewall = OpnsenseFirewall::from_config(&config.firewall)
        .unwrap_or_else(|e| exit_with(&e, "Could not create firewall client"));
    let application = TransmissionRemote::from_config(&config.application)
        .unwrap_or_else(|e| exit_with(&e, "Invalid application settings"));

    let mut relay = PortRelay::new(
        mapper,
        firewall,
        application,
        TokioSleeper,
        RelaySettings::from_config(&config),
    );

    if args.check {
        tracing::info!("🔍 CHECK MODE - running startup checks only");
        return match relay.startup().await {
            Ok(()) => {
                println!("✅ Firewall alias and application are reachable");
                Ok(())
            }
            Err(e) => {
                eprintln!("❌ Startup check failed: {}", e.detailed_message());
                std::process::exit(1);
            }
        };
    }

    let termination = relay.run().await;
    tracing::error!("🛑 Relay terminated: {:?}", termination);
    std::process::exit(termination.exit_code());
}
