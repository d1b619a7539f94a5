// src/lifecycle/status.rs

use std::fmt::Write as _;

use crate::fleet::Node;
use crate::types::{NodeStatus, Role};

/// One row of the status table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReport {
    pub node_id: String,
    pub host: String,
    pub role: Role,
    pub status: NodeStatus,
    /// Error text when the probe itself failed.
    pub detail: Option<String>,
}

impl NodeReport {
    pub(crate) fn new(node: &Node, status: NodeStatus, detail: Option<String>) -> Self {
        Self {
            node_id: node.id.clone(),
            host: node.host.clone(),
            role: node.role,
            status,
            detail,
        }
    }
}

/// Render reports as a fixed-width table for stdout.
pub fn render_status_table(reports: &[NodeReport]) -> String {
    let id_width = reports
        .iter()
        .map(|r| r.node_id.len())
        .chain(std::iter::once("NODE".len()))
        .max()
        .unwrap_or(4);
    let host_width = reports
        .iter()
        .map(|r| r.host.len())
        .chain(std::iter::once("HOST".len()))
        .max()
        .unwrap_or(4);

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<id_width$}  {:<host_width$}  {:<10}  STATUS",
        "NODE", "HOST", "ROLE"
    );
    for r in reports {
        let _ = write!(
            out,
            "{:<id_width$}  {:<host_width$}  {:<10}  {}",
            r.node_id,
            r.host,
            r.role.to_string(),
            r.status
        );
        if let Some(detail) = &r.detail {
            let _ = write!(out, " ({detail})");
        }
        out.push('\n');
    }
    out
}
