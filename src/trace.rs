//! Tracing module
//!
//! A context object handed to the executor and the structure recognizer.
//! It replaces a process-wide debug switch: callers decide per unit whether
//! node-level progress is reported.

use crate::cfg::{NodeGraph, NodeId};

/// Receiver for structuring progress
pub trait Tracer: Send + Sync {
    /// Called after a node has been built, disposed or structured
    fn node(&self, unit: &str, phase: &str, graph: &NodeGraph, node: NodeId);

    /// Called once per pass with a free-form message
    fn pass(&self, unit: &str, message: &str);

    /// Whether node-level callbacks should be issued at all
    fn enabled(&self) -> bool {
        true
    }
}

/// Tracer that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracer;

impl Tracer for NoopTracer {
    fn node(&self, _unit: &str, _phase: &str, _graph: &NodeGraph, _node: NodeId) {}

    fn pass(&self, _unit: &str, _message: &str) {}

    fn enabled(&self) -> bool {
        false
    }
}

/// Tracer forwarding to the `log` facade at trace/debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTracer;

impl Tracer for LogTracer {
    fn node(&self, unit: &str, phase: &str, graph: &NodeGraph, node: NodeId) {
        log::trace!("[{}] {} {}", unit, phase, graph.describe(node));
    }

    fn pass(&self, unit: &str, message: &str) {
        log::debug!("[{}] {}", unit, message);
    }
}
