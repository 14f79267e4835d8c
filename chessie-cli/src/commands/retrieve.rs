use std::io::Write;

use chessie_rag::{ChessBuddy, RagConfig};

/// Run the `chessie retrieve` command.
pub async fn run_retrieve(
    config: RagConfig,
    question: &str,
    top_k: Option<usize>,
    trace: bool,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let top_k = top_k.unwrap_or(config.top_k);
    if top_k == 0 {
        anyhow::bail!("--top-k must be greater than zero");
    }
    let buddy = ChessBuddy::init(config).await?;

    if trace {
        let trace = buddy.retrieval_trace(question, top_k).await?;
        serde_json::to_writer_pretty(&mut *out, &trace)?;
        writeln!(out)?;
    } else {
        let texts = buddy.debug_retrieve(question, top_k).await?;
        if texts.is_empty() {
            writeln!(out, "No evidence found.")?;
        }
        for (i, text) in texts.iter().enumerate() {
            writeln!(out, "### Chunk {}\n{text}\n", i + 1)?;
        }
    }

    buddy.shutdown();
    Ok(())
}
