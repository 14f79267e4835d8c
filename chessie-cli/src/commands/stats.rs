use std::io::Write;
use std::path::Path;

use chessie_rag::{ChessBuddy, RagConfig};

/// Run the `chessie stats` command.
pub async fn run_stats(
    config: RagConfig,
    corpus: Option<&Path>,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let buddy = ChessBuddy::init(config).await?;
    let stats = buddy.index_stats(corpus).await?;

    writeln!(
        out,
        "Records: {} (dimensions {}, metric {})",
        stats.record_count, stats.dimensions, stats.metric
    )?;
    for (source, count) in &stats.source_counts {
        writeln!(out, "  {source}: {count}")?;
    }
    if corpus.is_some() {
        if stats.missing_sources.is_empty() {
            writeln!(out, "Every corpus file is indexed.")?;
        } else {
            writeln!(out, "Missing from index: {}", stats.missing_sources.join(", "))?;
        }
    }

    buddy.shutdown();
    Ok(())
}
