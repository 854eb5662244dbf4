//! Normal output destinations.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use isoctl_types::message::Channel;

/// Where messages go when no redirection captures them.
pub trait Output {
    /// Write `text` (already line-terminated) to `channel`.
    fn emit(&mut self, channel: Channel, text: &str);
}

/// Result and mark lines to stdout, info lines to stderr.
#[derive(Debug, Default)]
pub struct StdStreams;

impl Output for StdStreams {
    fn emit(&mut self, channel: Channel, text: &str) {
        let written = match channel {
            Channel::Result | Channel::Mark => {
                let mut out = std::io::stdout().lock();
                out.write_all(text.as_bytes()).and_then(|()| out.flush())
            },
            Channel::Info => std::io::stderr().lock().write_all(text.as_bytes()),
        };
        if let Err(e) = written {
            log::warn!("Failed to write {channel} output: {e}");
        }
    }
}

/// Keeps emitted lines in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryOutput {
    lines: Rc<RefCell<Vec<(Channel, String)>>>,
}

impl MemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything emitted so far, in order.
    pub fn lines(&self) -> Vec<(Channel, String)> {
        self.lines.borrow().clone()
    }

    /// Texts emitted on one channel, without line terminators.
    pub fn texts(&self, channel: Channel) -> Vec<String> {
        self.lines
            .borrow()
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, t)| t.strip_suffix('\n').unwrap_or(t).to_string())
            .collect()
    }

    pub fn clear(&self) {
        self.lines.borrow_mut().clear();
    }
}

impl Output for MemoryOutput {
    fn emit(&mut self, channel: Channel, text: &str) {
        self.lines.borrow_mut().push((channel, text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_output_shares_buffer() {
        let out = MemoryOutput::new();
        let mut writer = out.clone();
        writer.emit(Channel::Result, "a\n");
        writer.emit(Channel::Info, "b\n");
        assert_eq!(out.texts(Channel::Result), vec!["a"]);
        assert_eq!(out.texts(Channel::Info), vec!["b"]);
        assert_eq!(out.lines().len(), 2);
        out.clear();
        assert!(out.lines().is_empty());
    }
}
