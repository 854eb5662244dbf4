//! Captured message chains.
//!
//! A chain is an owned vector; traversal hands out [`ListEntry`] views that
//! borrow the chain, so an entry can never outlive the messages it points at.

use isoctl_types::error::{IsoctlError, Result};
use isoctl_types::message::Message;

/// An ordered chain of captured messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageList {
    items: Vec<Message>,
}

impl MessageList {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, msg: Message) {
        self.items.push(msg);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.items.iter()
    }

    /// All texts in order, each with its line terminator.
    pub fn texts(&self) -> Vec<&str> {
        self.items.iter().map(Message::text).collect()
    }

    /// The first entry, or `None` for an empty chain.
    pub fn first(&self) -> Option<ListEntry<'_>> {
        self.entry(0)
    }

    /// The last entry, or `None` for an empty chain.
    pub fn last(&self) -> Option<ListEntry<'_>> {
        self.items.len().checked_sub(1).and_then(|i| self.entry(i))
    }

    fn entry(&self, index: usize) -> Option<ListEntry<'_>> {
        (index < self.items.len()).then_some(ListEntry { list: self, index })
    }
}

impl<'a> IntoIterator for &'a MessageList {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// A read-only position inside a [`MessageList`].
#[derive(Debug, Clone, Copy)]
pub struct ListEntry<'a> {
    list: &'a MessageList,
    index: usize,
}

impl<'a> ListEntry<'a> {
    /// Text of this entry, including its line terminator.
    pub fn text(&self) -> &'a str {
        self.list.items[self.index].text()
    }

    pub fn message(&self) -> &'a Message {
        &self.list.items[self.index]
    }

    /// The following entry, or `None` at the end of the chain.
    pub fn next(&self) -> Option<ListEntry<'a>> {
        self.list.entry(self.index + 1)
    }

    /// The preceding entry, or `None` at the start of the chain.
    pub fn prev(&self) -> Option<ListEntry<'a>> {
        self.index.checked_sub(1).and_then(|i| self.list.entry(i))
    }
}

/// Dispose of a pulled chain held in `slot`.
///
/// Returns `Ok(true)` if a chain was released, `Ok(false)` if the slot was
/// already empty, and [`IsoctlError::NullListReference`] if there is no slot
/// at all.
pub fn dispose_all(slot: Option<&mut Option<MessageList>>) -> Result<bool> {
    let slot = slot.ok_or(IsoctlError::NullListReference)?;
    Ok(slot.take().is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_of(texts: &[&str]) -> MessageList {
        let mut l = MessageList::new();
        for t in texts {
            l.push(Message::result(t));
        }
        l
    }

    #[test]
    fn forward_traversal() {
        let l = list_of(&["a", "b", "c"]);
        let mut seen = Vec::new();
        let mut cur = l.first();
        while let Some(e) = cur {
            seen.push(e.text());
            cur = e.next();
        }
        assert_eq!(seen, vec!["a\n", "b\n", "c\n"]);
    }

    #[test]
    fn backward_traversal() {
        let l = list_of(&["a", "b", "c"]);
        let last = l.last().unwrap();
        assert_eq!(last.text(), "c\n");
        let mid = last.prev().unwrap();
        assert_eq!(mid.text(), "b\n");
        assert_eq!(mid.prev().unwrap().text(), "a\n");
        assert!(mid.prev().unwrap().prev().is_none());
    }

    #[test]
    fn empty_list_has_no_entries() {
        let l = MessageList::new();
        assert!(l.first().is_none());
        assert!(l.last().is_none());
        assert!(l.is_empty());
    }

    #[test]
    fn dispose_semantics() {
        let mut slot = Some(list_of(&["x"]));
        assert!(dispose_all(Some(&mut slot)).unwrap());
        assert!(slot.is_none());
        assert!(!dispose_all(Some(&mut slot)).unwrap());
        assert!(matches!(
            dispose_all(None),
            Err(IsoctlError::NullListReference)
        ));
    }
}
