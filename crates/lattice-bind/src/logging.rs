//! Logging and debugging facilities for Lattice Bind.
//!
//! This module provides:
//! - Target and span names for filtering the crate's `tracing` output
//! - Debug visualization for binding inventories
//! - A performance span guard
//!
//! # Tracing Integration
//!
//! Lattice Bind emits `tracing` events but never installs a subscriber.
//! Install one in your application to see them:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("lattice_bind::inventory=debug,lattice_bind::observable=warn")
//!     .init();
//! ```
//!
//! Listener failures log at `warn`, listener panics and runaway bubbling
//! at `error`, rewiring at `debug`, and per-notification detail at `trace`.
//!
//! # Debug Visualization
//!
//! ```
//! use lattice_bind::logging::InventoryDebug;
//! use lattice_bind::BindingInventory;
//!
//! let inventory = BindingInventory::builder().name("form").build();
//! inventory.bind_path("customer.name").unwrap();
//!
//! let tree = InventoryDebug::new().render(&inventory);
//! assert!(tree.contains("customer.name"));
//! ```

use std::fmt::{self, Write as FmtWrite};

use crate::inventory::{BindingInventory, BindingSummary};
use crate::two_way::PropertyState;

/// Span names used throughout Lattice Bind for tracing.
pub mod span_names {
    /// Performance measurement span, see [`PerfSpan`](super::PerfSpan).
    pub const PERF: &str = "lattice_bind::perf";
}

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Crate-wide target.
    pub const CORE: &str = "lattice_bind";
    /// Listener hubs and nested bubbling.
    pub const OBSERVABLE: &str = "lattice_bind::observable";
    /// Path resolution and writes.
    pub const PATH: &str = "lattice_bind::path";
    /// Two-way properties.
    pub const PROPERTY: &str = "lattice_bind::property";
    /// Binding inventories.
    pub const INVENTORY: &str = "lattice_bind::inventory";
    /// Display formats.
    pub const FORMAT: &str = "lattice_bind::format";
}

/// Style options for tree visualization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TreeStyle {
    /// ASCII characters for tree branches.
    Ascii,
    /// Unicode box-drawing characters.
    #[default]
    Unicode,
    /// Compact single-line representation.
    Compact,
}

/// Configuration for inventory debug output.
#[derive(Debug, Clone)]
pub struct TreeFormatOptions {
    /// The style of tree visualization.
    pub style: TreeStyle,
    /// Whether to show binding ids.
    pub show_ids: bool,
    /// Whether to show the bound state and temp value.
    pub show_state: bool,
    /// Whether to show registration counts.
    pub show_registrations: bool,
    /// Whether to show display-format paths.
    pub show_formats: bool,
}

impl Default for TreeFormatOptions {
    fn default() -> Self {
        Self {
            style: TreeStyle::default(),
            show_ids: true,
            show_state: true,
            show_registrations: true,
            show_formats: false,
        }
    }
}

impl TreeFormatOptions {
    /// Create options for detailed debugging output.
    pub fn detailed() -> Self {
        Self {
            show_formats: true,
            ..Default::default()
        }
    }

    /// Create options for minimal output.
    pub fn minimal() -> Self {
        Self {
            show_ids: false,
            show_state: false,
            show_registrations: false,
            show_formats: false,
            ..Default::default()
        }
    }
}

/// Renders a binding inventory as a tree.
#[derive(Debug, Clone, Default)]
pub struct InventoryDebug {
    options: TreeFormatOptions,
}

impl InventoryDebug {
    /// Create a visualizer with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a visualizer with custom options.
    pub fn with_options(options: TreeFormatOptions) -> Self {
        Self { options }
    }

    /// Render the inventory's bindings.
    pub fn render(&self, inventory: &BindingInventory) -> String {
        let mut output = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_tree(inventory, &mut output);
        output
    }

    /// Write the tree into any formatter.
    pub fn write_tree(&self, inventory: &BindingInventory, out: &mut impl FmtWrite) -> fmt::Result {
        let summaries = inventory.describe();
        let status = if inventory.is_attached() { "attached" } else { "detached" };
        writeln!(
            out,
            "Inventory '{}' ({}, {} bindings):",
            inventory.config().name,
            status,
            summaries.len()
        )?;

        if summaries.is_empty() {
            return writeln!(out, "  (empty)");
        }

        let count = summaries.len();
        for (i, summary) in summaries.iter().enumerate() {
            self.write_binding(summary, i + 1 == count, out)?;
        }
        Ok(())
    }

    fn write_binding(&self, summary: &BindingSummary, is_last: bool, out: &mut impl FmtWrite) -> fmt::Result {
        let (corner, last, continuation) = match self.options.style {
            TreeStyle::Ascii => ("+-- ", "`-- ", "|   "),
            TreeStyle::Unicode => ("\u{251c}\u{2500}\u{2500} ", "\u{2514}\u{2500}\u{2500} ", "\u{2502}   "),
            TreeStyle::Compact => ("- ", "- ", "  "),
        };
        out.write_str(if is_last { last } else { corner })?;

        if summary.name == summary.path {
            out.write_str(&summary.path)?;
        } else {
            write!(out, "{} <- {}", summary.name, summary.path)?;
        }
        if self.options.show_ids {
            write!(out, " [{:?}]", summary.id)?;
        }
        if self.options.show_state {
            match &summary.state {
                PropertyState::Unbound => out.write_str(" (unbound)")?,
                PropertyState::Bound(value) => write!(out, " = {value:?}")?,
            }
        }
        if self.options.show_registrations {
            write!(out, " regs={}", summary.registrations)?;
        }
        out.write_char('\n')?;

        if self.options.show_formats {
            if let Some(format) = &summary.format_path {
                let indent = if is_last { "    " } else { continuation };
                writeln!(out, "{indent}  format: {format}")?;
            }
        }
        Ok(())
    }
}

/// A guard that keeps a tracing span entered until dropped.
///
/// Useful for timing an attach or a batch of model updates.
#[derive(Debug)]
pub struct PerfSpan {
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create and enter a new performance span.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!(target: span_names::PERF, "perf", operation = name);
        Self {
            span: span.entered(),
        }
    }
}
