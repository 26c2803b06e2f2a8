//! Narration for the human operator: pass/fail glyph lines

use std::sync::Arc;

use colored::Colorize;
use parking_lot::Mutex;

/// Destination of narration lines
pub trait NarrationSink: Send + Sync {
    fn emit(&self, line: &str);
}

/// Prints narration to stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutNarration;

impl NarrationSink for StdoutNarration {
    fn emit(&self, line: &str) {
        println!("{}", line);
    }
}

/// Keeps narration in memory; clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct MemoryNarration {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemoryNarration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl NarrationSink for MemoryNarration {
    fn emit(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}

pub fn tick(color: bool) -> String {
    if color {
        format!("\t\t{} ", "✓".green())
    } else {
        "\t\t✓ ".to_string()
    }
}

pub fn cross(color: bool) -> String {
    if color {
        format!("\t\t{} ", "⨯".red())
    } else {
        "\t\t⨯ ".to_string()
    }
}

/// Glyph followed by the space-joined tokens
pub fn console_text<S: AsRef<str>>(worked: bool, color: bool, rest: &[S]) -> String {
    let glyph = if worked { tick(color) } else { cross(color) };
    let words: Vec<&str> = rest.iter().map(AsRef::as_ref).collect();
    glyph + &words.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_console_text() {
        assert_eq!(
            console_text(true, false, &["You", "see", "#name"]),
            "\t\t✓ You see #name"
        );
        assert_eq!(console_text(false, false, &["You"]), "\t\t⨯ You");
    }

    #[test]
    fn test_memory_narration_shares_buffer() {
        let sink = MemoryNarration::new();
        let clone = sink.clone();
        clone.emit("one");
        sink.emit("two");
        assert_eq!(sink.lines(), vec!["one", "two"]);
    }
}
