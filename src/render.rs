//! nginx `upstream` block rendering

use crate::config::ItemConfig;
use crate::inspect::ResolvedEndpoint;
use std::fmt;

/// A rendered `upstream` block for one config item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamBlock {
    pub name: String,
    /// Server lines without indentation or trailing newline
    pub servers: Vec<String>,
}

impl UpstreamBlock {
    /// Build the block for `item` with one server line per endpoint
    pub fn render(item: &ItemConfig, endpoints: &[ResolvedEndpoint]) -> Self {
        let extra = item
            .extra
            .as_deref()
            .map(|extra| format!(" {}", extra))
            .unwrap_or_default();

        let servers = endpoints
            .iter()
            .map(|endpoint| {
                format!(
                    "server {}:{}{}; // {}",
                    endpoint.address, item.port, extra, endpoint.network
                )
            })
            .collect();

        Self {
            name: item.upstream_name.clone(),
            servers,
        }
    }
}

impl fmt::Display for UpstreamBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "upstream {} {{", self.name)?;
        for server in &self.servers {
            writeln!(f, "    {}", server)?;
        }
        writeln!(f, "}}")
    }
}

/// Join blocks into the output document, each followed by a blank line
pub fn render_document(blocks: &[UpstreamBlock]) -> String {
    let mut document = String::new();
    for block in blocks {
        document.push_str(&block.to_string());
        document.push('\n');
    }
    document
}
