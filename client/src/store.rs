use talkie_protocol::{Message, UserId};

/// Ordered, append-only message log for the active room.
///
/// History replaces the log once per room activation; live events append.
/// Switching rooms clears the log entirely — the server stays the source of
/// truth and history is re-fetched on return.
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: Vec<Message>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// One-shot history load; replaces whatever is present.
    pub fn replace(&mut self, history: Vec<Message>) {
        self.messages = history;
    }

    /// Append a live message. Arrival order is the total order; no dedup key
    /// beyond trusting the server not to redeliver.
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Merge a read receipt: every message currently in the log gains
    /// `reader_id` in its `read_by` set.
    ///
    /// The merge is monotonic and idempotent. Messages appended after the
    /// receipt are untouched until the next receipt; a receipt against an
    /// empty log is a no-op.
    pub fn apply_read_receipt(&mut self, reader_id: UserId) {
        for message in &mut self.messages {
            if !message.read_by.contains(&reader_id) {
                message.read_by.push(reader_id);
            }
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
