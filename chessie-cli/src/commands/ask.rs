use std::io::Write;

use chessie_rag::{ChessBuddy, RagConfig};

/// Run the `chessie ask` command.
pub async fn run_ask(
    config: RagConfig,
    question: &str,
    explain: bool,
    json: bool,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let buddy = ChessBuddy::init(config).await?;
    let package = buddy.ask(question, explain).await?;

    if json {
        serde_json::to_writer_pretty(&mut *out, &package)?;
        writeln!(out)?;
    } else {
        writeln!(out, "{}", package.answer)?;
        if explain || !package.grounded {
            writeln!(out, "\n{}", package.explanation)?;
        }
        if !package.sources.is_empty() {
            writeln!(out, "\nSources: {}", package.sources.join(", "))?;
        }
    }

    buddy.shutdown();
    Ok(())
}
