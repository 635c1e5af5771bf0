use crate::types::WithTimestamp;
use std::{collections::VecDeque, time::Duration};

/// A bounded FIFO of messages. When full, pushing drops the oldest
/// message.
#[derive(Debug)]
pub struct Buffer<T>
where
    T: WithTimestamp,
{
    buffer: VecDeque<T>,
    capacity: usize,
    last_ts: Option<Duration>,
}

impl<T> Buffer<T>
where
    T: WithTimestamp,
{
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
            last_ts: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn front(&self) -> Option<&T> {
        self.buffer.front()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.buffer.get(index)
    }

    pub fn pop_front(&mut self) -> Option<T> {
        self.buffer.pop_front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buffer.iter()
    }

    pub fn front_ts(&self) -> Option<Duration> {
        self.buffer.front().map(|item| item.timestamp())
    }

    /// Timestamp of the newest message ever accepted, even if it has
    /// been removed since.
    pub fn last_ts(&self) -> Option<Duration> {
        self.last_ts
    }

    /// Append a message regardless of its timestamp. Returns the
    /// message dropped to make room, if any.
    pub fn push(&mut self, item: T) -> Option<T> {
        let dropped = if self.buffer.len() >= self.capacity {
            self.buffer.pop_front()
        } else {
            None
        };

        self.last_ts = Some(item.timestamp());
        self.buffer.push_back(item);
        dropped
    }

    /// Append a message whose timestamp is strictly greater than that
    /// of every message accepted before.
    ///
    /// Returns `Err(item)` for an out-of-order message, otherwise the
    /// message dropped to make room, if any.
    pub fn try_push(&mut self, item: T) -> Result<Option<T>, T> {
        match self.last_ts {
            Some(last_ts) if last_ts >= item.timestamp() => Err(item),
            _ => Ok(self.push(item)),
        }
    }

    /// Removes the first `count` messages and returns them.
    pub fn drain_front(&mut self, count: usize) -> Vec<T> {
        let count = count.min(self.buffer.len());
        self.buffer.drain(..count).collect()
    }

    /// Removes messages before a specific timestamp and returns them.
    pub fn drain_before(&mut self, ts: Duration) -> Vec<T> {
        let count = self
            .buffer
            .iter()
            .take_while(|item| item.timestamp() < ts)
            .count();
        self.drain_front(count)
    }
}
