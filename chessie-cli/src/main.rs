use chessie_cli::cli::Cli;
use chessie_telemetry::LogFormat;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is normal outside development.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let format = if cli.json_logs { LogFormat::Json } else { LogFormat::Pretty };
    chessie_telemetry::init_telemetry(format)?;

    let mut stdout = std::io::stdout();
    let result = chessie_cli::run(cli, std::env::vars(), &mut stdout).await;
    if let Err(ref e) = result {
        tracing::error!(error = format!("{e:?}"), "command failed");
    }
    result
}
