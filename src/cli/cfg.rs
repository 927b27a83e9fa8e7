use super::utils::{read_units, select_units, write_output};
use crate::cfg::visualization::{generate_dot, DotOptions};
use crate::config::DecompileOptions;
use crate::decompiler::Decompiler;
use anyhow::{Context, Result};
use std::fmt::Write;
use std::path::Path;

/// Print the node graph of every selected unit, optionally writing DOT files
/// named after the unit into `dot_dir`
pub fn cfg(input_path: &Path, filter: Option<&str>, dot_dir: Option<&Path>, details: bool) -> Result<()> {
    let units = select_units(read_units(input_path)?, filter)?;
    let decompiler = Decompiler::new(DecompileOptions {
        parallel: false,
        ..DecompileOptions::default()
    });

    let mut report = String::new();
    for (index, unit) in units.iter().enumerate() {
        let _ = writeln!(report, "{}:", unit.signature());
        let body = match decompiler.build_graph(unit) {
            Ok(body) => body,
            Err(error) => {
                let _ = writeln!(report, "  failed: {}", error);
                continue;
            }
        };
        let graph = &body.graph;
        let _ = writeln!(report, "  Nodes: {}", graph.order().len());
        let _ = writeln!(report, "  Edges: {}", graph.edge_count());
        let _ = writeln!(report, "  Protected regions: {}", body.tries.len());
        let _ = writeln!(report, "  Switches: {}", body.switches.len());
        for &id in graph.order() {
            let _ = writeln!(report, "    {}", graph.describe(id));
        }

        if let Some(dir) = dot_dir {
            let options = DotOptions {
                include_node_details: details,
                ..DotOptions::default()
            };
            let path = dir.join(format!("unit_{}_{}.dot", index, sanitize(&unit.name)));
            std::fs::write(&path, generate_dot(graph, &options))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            let _ = writeln!(report, "  DOT written to {}", path.display());
        }
    }
    write_output(&report, None)?;
    Ok(())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
