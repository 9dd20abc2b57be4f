//! Scan command implementation
//!
//! Show the nodes of a module tree in the order they are applied.

use clap::Args;
use owo_colors::OwoColorize;
use settle_engine::{ModuleNode, ModuleTreeScanner};
use std::path::PathBuf;

use crate::command::Command;
use crate::common::RuntimeContext;
use crate::error::Result;

/// List the nodes of a module tree
#[derive(Debug, Args)]
pub struct ScanCommand {
    /// Module directory (overrides general.module)
    #[arg(long, value_name = "DIR")]
    pub module: Option<PathBuf>,
}

/// Hook blocks attached to a node, e.g. `pre+post`
fn hook_label(node: &ModuleNode) -> Option<String> {
    let hook = node.hook()?;
    let blocks: Vec<&str> = [
        hook.pre().map(|_| "pre"),
        hook.post().map(|_| "post"),
    ]
    .into_iter()
    .flatten()
    .collect();
    if blocks.is_empty() {
        Some("hook".to_string())
    } else {
        Some(blocks.join("+"))
    }
}

fn print_node(node: &ModuleNode) {
    let indent = "  ".repeat(node.rel().depth());
    let name = if node.rel().is_root() {
        ".".to_string()
    } else {
        node.rel().file_name().unwrap_or_default().to_string()
    };

    let mut line = if node.is_module() {
        format!("{indent}{}/", name.bright_blue().bold())
    } else {
        format!("{indent}{name}")
    };
    if node.target().file_name() != node.rel().file_name() && !node.rel().is_root() {
        line.push_str(&format!(" {} {}", "→".dimmed(), node.target()));
    }
    if node.is_template() {
        line.push_str(&format!(" {}", "[template]".cyan()));
    }
    if let Some(label) = hook_label(node) {
        line.push_str(&format!(" {}", format!("[{label}]").yellow()));
    }
    println!("{line}");
}

impl Command for ScanCommand {
    type Output = Vec<ModuleNode>;

    fn execute(&self, context: &RuntimeContext) -> Result<Vec<ModuleNode>> {
        let root = context.module_root(self.module.as_deref())?;
        let nodes = ModuleTreeScanner::new(root, context.template_suffix()).scan()?;

        for node in &nodes {
            print_node(node);
        }
        Ok(nodes)
    }
}
