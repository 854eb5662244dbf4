//! The redirection stack.
//!
//! Each active frame claims the result channel, the info channel, or both.
//! For every channel the newest still-active frame claiming it captures the
//! traffic. Frames may be pulled in any order; pulling a frame hands its
//! chains to the caller and lets the next older claimant take over.

use isoctl_types::error::{IsoctlError, Result};
use isoctl_types::message::{Channel, Message};

use crate::list::MessageList;

/// Maximum number of simultaneously active redirections.
pub const MAX_OUTLIST_STACK: usize = 32;

/// Identifies an active redirection. Unique among active frames; may be
/// reused after its frame was pulled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutlistHandle(usize);

impl OutlistHandle {
    pub fn value(self) -> usize {
        self.0
    }
}

/// Which channels a redirection captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelMask {
    pub result: bool,
    pub info: bool,
}

impl ChannelMask {
    pub const RESULT: Self = Self {
        result: true,
        info: false,
    };
    pub const INFO: Self = Self {
        result: false,
        info: true,
    };
    pub const BOTH: Self = Self {
        result: true,
        info: true,
    };

    /// A mask selecting neither channel selects both.
    fn normalized(self) -> Self {
        if !self.result && !self.info {
            Self::BOTH
        } else {
            self
        }
    }

    fn claims(self, channel: Channel) -> bool {
        match channel {
            Channel::Result => self.result,
            Channel::Info => self.info,
            Channel::Mark => self.result || self.info,
        }
    }
}

/// The chains handed out by [`OutlistStack::pull`].
///
/// A chain is `None` when its frame captured nothing for it.
#[derive(Debug, Default)]
pub struct Outlists {
    /// Result and mark messages.
    pub result: Option<MessageList>,
    /// Info and mark messages.
    pub info: Option<MessageList>,
}

#[derive(Debug)]
struct Frame {
    handle: OutlistHandle,
    mask: ChannelMask,
    result: MessageList,
    info: MessageList,
}

/// Active redirections in push order, oldest first.
#[derive(Debug, Default)]
pub struct OutlistStack {
    frames: Vec<Frame>,
}

impl OutlistStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active redirections.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Start a new redirection of the channels in `mask`.
    pub fn push(&mut self, mask: ChannelMask) -> Result<OutlistHandle> {
        if self.frames.len() >= MAX_OUTLIST_STACK {
            return Err(IsoctlError::OutlistStackFull {
                max: MAX_OUTLIST_STACK,
            });
        }
        let handle = self.free_handle();
        self.frames.push(Frame {
            handle,
            mask: mask.normalized(),
            result: MessageList::new(),
            info: MessageList::new(),
        });
        log::debug!(
            "Pushed redirection {} (depth {})",
            handle.value(),
            self.frames.len()
        );
        Ok(handle)
    }

    /// End the redirection `handle` and take its captured chains.
    pub fn pull(&mut self, handle: OutlistHandle) -> Result<Outlists> {
        let pos = self
            .frames
            .iter()
            .position(|f| f.handle == handle)
            .ok_or(IsoctlError::UnknownOutlist(handle.value()))?;
        if pos + 1 != self.frames.len() {
            log::debug!("Pulling redirection {} out of stack order", handle.value());
        }
        let frame = self.frames.remove(pos);
        log::debug!(
            "Pulled redirection {} (depth {})",
            handle.value(),
            self.frames.len()
        );
        Ok(Outlists {
            result: (!frame.result.is_empty()).then_some(frame.result),
            info: (!frame.info.is_empty()).then_some(frame.info),
        })
    }

    /// The redirection currently capturing `channel`, if any.
    pub fn interceptor(&self, channel: Channel) -> Option<OutlistHandle> {
        self.frames
            .iter()
            .rev()
            .find(|f| f.mask.claims(channel))
            .map(|f| f.handle)
    }

    /// Drop every active redirection and its captured text.
    pub fn clear(&mut self) -> usize {
        let n = self.frames.len();
        self.frames.clear();
        n
    }

    /// Store `msg` in the responsible redirection(s).
    ///
    /// Returns `false` if no active frame claims the message's channel, in
    /// which case the caller delivers it to normal output.
    pub(crate) fn capture(&mut self, msg: &Message) -> bool {
        match msg.channel() {
            Channel::Result => self.capture_into(Channel::Result, msg),
            Channel::Info => self.capture_into(Channel::Info, msg),
            Channel::Mark => {
                let to_result = self.capture_into(Channel::Result, msg);
                let to_info = self.capture_into(Channel::Info, msg);
                to_result || to_info
            },
        }
    }

    fn capture_into(&mut self, channel: Channel, msg: &Message) -> bool {
        let Some(frame) = self
            .frames
            .iter_mut()
            .rev()
            .find(|f| f.mask.claims(channel))
        else {
            return false;
        };
        match channel {
            Channel::Info => frame.info.push(msg.clone()),
            _ => frame.result.push(msg.clone()),
        }
        true
    }

    fn free_handle(&self) -> OutlistHandle {
        let mut candidate = 0;
        while self.frames.iter().any(|f| f.handle.0 == candidate) {
            candidate += 1;
        }
        OutlistHandle(candidate)
    }
}
