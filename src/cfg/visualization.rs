//! CFG visualization module
//!
//! This module contains visualization utilities for node graphs: conversion
//! into a `petgraph` graph and DOT output.

use super::{NodeGraph, NodeId};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// Kind of an edge in the exported graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Target of a condition that holds
    True,
    /// Target of a condition that does not hold
    False,
    /// Edge closing a loop
    Back,
    /// Dominance-only edge from a protected region start to its handler
    Exception,
    Uncond,
}

/// DOT generation options
#[derive(Debug, Clone)]
pub struct DotOptions {
    /// Include edge labels
    pub include_labels: bool,
    /// Include edge colors
    pub include_colors: bool,
    /// Include the operands of each node
    pub include_node_details: bool,
}

impl Default for DotOptions {
    fn default() -> Self {
        Self {
            include_labels: true,
            include_colors: true,
            include_node_details: false,
        }
    }
}

/// Copy the live nodes of `graph` into a `petgraph` graph. Node weights are
/// display labels.
pub fn to_petgraph(graph: &NodeGraph, options: &DotOptions) -> DiGraph<String, EdgeKind> {
    let mut exported = DiGraph::new();
    let mut indices: HashMap<NodeId, NodeIndex> = HashMap::new();
    for &id in graph.order() {
        indices.insert(id, exported.add_node(format_node_label(graph, id, options)));
    }
    for &id in graph.order() {
        let node = graph.node(id);
        let condition = node.top().and_then(|operand| operand.as_condition());
        for &out in &node.outgoing {
            let kind = if graph.node(out).backedges.contains(&id) {
                EdgeKind::Back
            } else {
                match condition {
                    Some(c) if c.then == Some(out) => EdgeKind::True,
                    Some(c) if c.elze == Some(out) => EdgeKind::False,
                    _ => EdgeKind::Uncond,
                }
            };
            if let (Some(&from), Some(&to)) = (indices.get(&id), indices.get(&out)) {
                exported.add_edge(from, to, kind);
            }
        }
        for source in &node.handler_sources {
            if let (Some(&from), Some(&to)) = (indices.get(source), indices.get(&id)) {
                exported.add_edge(from, to, EdgeKind::Exception);
            }
        }
    }
    exported
}

/// Generate DOT representation of a node graph
pub fn generate_dot(graph: &NodeGraph, options: &DotOptions) -> String {
    let exported = to_petgraph(graph, options);
    let mut dot = String::new();
    dot.push_str("digraph CFG {\n");
    dot.push_str("  rankdir=TB;\n");
    dot.push_str("  node [shape=box];\n\n");

    for node in exported.node_indices() {
        if let Some(label) = exported.node_weight(node) {
            dot.push_str(&format!("  {} [label=\"{}\"];\n", node.index(), escape(label)));
        }
    }

    dot.push('\n');

    for edge in exported.edge_indices() {
        let (Some((tail, head)), Some(kind)) = (exported.edge_endpoints(edge), exported.edge_weight(edge)) else {
            continue;
        };
        let mut edge_str = format!("  {} -> {}", tail.index(), head.index());
        let mut attributes = Vec::new();

        if options.include_labels {
            if let Some(label) = get_edge_label(kind) {
                attributes.push(format!("label=\"{}\"", label));
            }
        }

        if options.include_colors {
            attributes.push(format!("color=\"{}\"", get_edge_color(kind)));
        }
        if *kind == EdgeKind::Exception {
            attributes.push("style=dashed".to_string());
        }

        if !attributes.is_empty() {
            edge_str.push_str(&format!(" [{}]", attributes.join(", ")));
        }

        edge_str.push_str(";\n");
        dot.push_str(&edge_str);
    }

    dot.push_str("}\n");
    dot
}

fn format_node_label(graph: &NodeGraph, id: NodeId, options: &DotOptions) -> String {
    let node = graph.node(id);
    if options.include_node_details {
        let mut label = node.name.clone();
        for operand in &node.stack {
            label.push_str("\\n");
            label.push_str(&operand.to_string());
        }
        label
    } else {
        node.name.clone()
    }
}

fn escape(label: &str) -> String {
    label.replace('"', "\\\"")
}

fn get_edge_label(kind: &EdgeKind) -> Option<&'static str> {
    match kind {
        EdgeKind::True => Some("T"),
        EdgeKind::False => Some("F"),
        EdgeKind::Back => Some("Back"),
        EdgeKind::Exception => Some("Exc"),
        EdgeKind::Uncond => None,
    }
}

fn get_edge_color(kind: &EdgeKind) -> &'static str {
    match kind {
        EdgeKind::True => "green",
        EdgeKind::False => "red",
        EdgeKind::Back => "blue",
        EdgeKind::Exception => "purple",
        EdgeKind::Uncond => "black",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_marks_back_edges() {
        let mut graph = NodeGraph::new();
        let a = graph.get_or_create(0);
        let b = graph.get_or_create(1);
        graph.append(a);
        graph.append(b);
        graph.connect_nodes(a, b);
        graph.connect_nodes(b, a);
        graph.compute_backedges();
        let dot = generate_dot(&graph, &DotOptions::default());
        assert!(dot.starts_with("digraph CFG {"));
        assert!(dot.contains("0 -> 1 [color=\"black\"]"));
        assert!(dot.contains("1 -> 0 [label=\"Back\", color=\"blue\"]"));
        assert_eq!(to_petgraph(&graph, &DotOptions::default()).edge_count(), 2);
    }
}
