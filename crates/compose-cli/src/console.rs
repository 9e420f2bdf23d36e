//! Terminal rendering for attached container output and tables.

use comfy_table::{Cell, Color, Table};
use compose_api::LogConsumer;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Prints container output to stdout, prefixed with an aligned container name
#[derive(Default)]
pub struct ConsoleConsumer {
    width: AtomicUsize,
}

impl ConsoleConsumer {
    /// Create a consumer with no registered containers
    pub fn new() -> Self {
        Self::default()
    }

    fn format_line(&self, container: &str, line: &str) -> String {
        let width = self.width.load(Ordering::Relaxed);
        format!("{container:<width$} | {line}")
    }
}

impl LogConsumer for ConsoleConsumer {
    fn register(&self, container: &str) {
        self.width.fetch_max(container.len(), Ordering::Relaxed);
        println!("Attaching to {container}");
    }

    fn status(&self, container: &str, message: &str) {
        println!("{container} {message}");
    }

    fn log(&self, container: &str, _service: &str, line: &str) {
        println!("{}", self.format_line(container, line));
    }
}

/// A table with a header row
pub fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_header(header.iter().map(|h| Cell::new(h)).collect::<Vec<_>>());
    table
}

/// Cell for a container state, colored by how healthy it looks
pub fn state_cell(state: &str) -> Cell {
    let color = match state.to_lowercase().as_str() {
        "running" => Color::Green,
        "created" | "paused" | "restarting" | "updating" => Color::Yellow,
        "removing" => Color::Grey,
        _ => Color::Red,
    };
    Cell::new(state).fg(color)
}

/// Size in decimal units, as printed by container engines
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "kB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1000.0 && unit < UNITS.len() - 1 {
        size /= 1000.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes}{}", UNITS[0])
    } else {
        format!("{size:.1}{}", UNITS[unit])
    }
}
