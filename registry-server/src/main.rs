use clap::Parser;
use registry_server::Config;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(short, long, default_value_t = 8080, env = "REGISTRY_PORT")]
    port: u16,
    #[arg(long, env = "REGISTRY_DATABASE_URL")]
    database_url: String,
    #[arg(long, env = "REGISTRY_STRICT_ROUTE_VALIDATION")]
    strict_route_validation: bool,
    #[arg(long, env = "REGISTRY_ANONYMOUS_BYPASS")]
    anonymous_bypass: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config {
        port: cli.port,
        port_tx: None,
        database_url: cli.database_url,
        strict_route_validation: cli.strict_route_validation,
        anonymous_bypass: cli.anonymous_bypass,
    };

    registry_server::start(config, registry_server::shutdown_signal()).await
}
