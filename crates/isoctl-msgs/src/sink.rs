//! The message sink.

use isoctl_types::message::Message;

use crate::outlist::OutlistStack;
use crate::output::{Output, StdStreams};

/// Delivers messages to the active redirection or to normal output.
pub struct MessageSink {
    outlists: OutlistStack,
    output: Box<dyn Output>,
}

impl MessageSink {
    pub fn new(output: Box<dyn Output>) -> Self {
        Self {
            outlists: OutlistStack::new(),
            output,
        }
    }

    /// Deliver one message exactly once.
    pub fn deliver(&mut self, msg: Message) {
        if !self.outlists.capture(&msg) {
            self.output.emit(msg.channel(), msg.text());
        }
    }

    pub fn outlists(&self) -> &OutlistStack {
        &self.outlists
    }

    pub fn outlists_mut(&mut self) -> &mut OutlistStack {
        &mut self.outlists
    }

    /// Replace the normal output, returning the previous one.
    pub fn set_output(&mut self, output: Box<dyn Output>) -> Box<dyn Output> {
        std::mem::replace(&mut self.output, output)
    }
}

impl Default for MessageSink {
    fn default() -> Self {
        Self::new(Box::new(StdStreams))
    }
}
