//! Reading graphs and arguments from disk, writing JSON results

use std::io::Write;
use std::path::Path;

use color_eyre::eyre::{Result, WrapErr, eyre};
use riskgraph_core::Graph;
use riskgraph_core::interchange::{EXPORT_VERSION, GraphExport};
use riskgraph_core::model::Value;
use serde::Serialize;

/// Parse a graph document, either an export envelope or a bare graph.
///
/// Identifiers are kept as written so that ids named on the command line
/// still match.
pub fn parse_graph(json: &str) -> Result<Graph> {
    let doc: serde_json::Value = serde_json::from_str(json).wrap_err("graph file is not JSON")?;
    if doc.get("graph").is_some() && doc.get("version").is_some() {
        let envelope: GraphExport =
            serde_json::from_value(doc).wrap_err("malformed export envelope")?;
        if envelope.version > EXPORT_VERSION {
            return Err(eyre!(
                "export version {} is newer than supported version {EXPORT_VERSION}",
                envelope.version
            ));
        }
        return Ok(envelope.graph);
    }
    serde_json::from_value(doc).wrap_err("malformed graph")
}

pub fn read_graph(path: &Path) -> Result<Graph> {
    let json = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read {}", path.display()))?;
    let graph = parse_graph(&json).wrap_err_with(|| format!("in {}", path.display()))?;
    tracing::debug!(
        path = %path.display(),
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        "loaded graph"
    );
    Ok(graph)
}

/// A JSON argument given inline or as `@path/to/file.json`
pub fn read_json_arg(arg: &str) -> Result<Value> {
    let text = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read {path}"))?,
        None => arg.to_string(),
    };
    serde_json::from_str(&text).wrap_err("argument is not valid JSON")
}

/// Write text to `path`, or to stdout when no path is given
pub fn write_text(path: Option<&Path>, text: &str) -> Result<()> {
    match path {
        Some(path) => std::fs::write(path, format!("{text}\n"))
            .wrap_err_with(|| format!("failed to write {}", path.display())),
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{text}")?;
            Ok(())
        }
    }
}

/// Pretty-print `value` as JSON to `path` or stdout
pub fn write_json<T: Serialize>(path: Option<&Path>, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    write_text(path, &text)
}
