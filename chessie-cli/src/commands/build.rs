use std::io::Write;
use std::path::Path;

use chessie_rag::{ChessBuddy, RagConfig};

/// Run the `chessie build` command.
pub async fn run_build(
    config: RagConfig,
    corpus_dir: &Path,
    fresh: bool,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let buddy = if fresh {
        ChessBuddy::init_for_rebuild(config).await?
    } else {
        ChessBuddy::init(config).await?
    };

    let report = buddy.build_index(corpus_dir).await?;
    writeln!(
        out,
        "Indexed {} chunks from {} stories.",
        report.record_count, report.document_count
    )?;
    for skipped in &report.skipped {
        writeln!(out, "Skipped {}: {}", skipped.source_id, skipped.reason)?;
    }

    buddy.shutdown();
    Ok(())
}
