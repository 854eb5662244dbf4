//! Message routing and problem-status tracking.
//!
//! Messages enter through the [`StatusEngine`], which records their severity
//! and hands them to the [`MessageSink`]. The sink either stores them in the
//! newest matching redirection of the [`OutlistStack`] or writes them to the
//! normal [`Output`].

mod list;
mod outlist;
mod output;
mod queue;
mod sink;
mod status;

/// Owned chain of captured messages with cursor-style traversal.
pub use list::{ListEntry, MessageList, dispose_all};
/// Nested capture frames for result and info text.
pub use outlist::{ChannelMask, MAX_OUTLIST_STACK, OutlistHandle, OutlistStack, Outlists};
/// Normal output destinations.
pub use output::{MemoryOutput, Output, StdStreams};
/// Pending diagnostics from collaborator subsystems.
pub use queue::{EmptyQueue, MessageQueue, QueuedMessage, SharedQueue};
/// Routes one message to a redirection or to normal output.
pub use sink::MessageSink;
/// Severity bookkeeping and abort advice.
pub use status::{AbortFlag, Advice, EvalFlags, StatusEngine, StatusPolicy, SubmitFlags};
