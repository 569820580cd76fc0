use event_schema::ClientFrame;
use std::collections::VecDeque;

pub const DEFAULT_CAPACITY: usize = 256;

/// What to do with a send when the pending queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Evict the oldest queued frame to make room.
    #[default]
    DropOldest,
    /// Keep the queue as is and refuse the new frame.
    RejectNew,
}

#[derive(Debug, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// The frame that did not survive: the evicted oldest or the refused new one.
    Dropped(ClientFrame),
}

/// Outbound frames waiting for a connection, in send order.
#[derive(Debug)]
pub struct PendingQueue {
    items: VecDeque<ClientFrame>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl PendingQueue {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            items: VecDeque::new(),
            capacity: capacity.max(1),
            policy,
        }
    }

    pub fn push(&mut self, frame: ClientFrame) -> PushOutcome {
        if self.items.len() < self.capacity {
            self.items.push_back(frame);
            return PushOutcome::Queued;
        }

        match self.policy {
            OverflowPolicy::RejectNew => PushOutcome::Dropped(frame),
            OverflowPolicy::DropOldest => {
                let evicted = self.items.pop_front();
                self.items.push_back(frame);
                match evicted {
                    Some(evicted) => PushOutcome::Dropped(evicted),
                    None => PushOutcome::Queued,
                }
            }
        }
    }

    /// Put back a frame whose send failed so it goes out first next time.
    ///
    /// If that overfills the queue the newest frame is dropped and returned.
    pub fn requeue(&mut self, frame: ClientFrame) -> Option<ClientFrame> {
        self.items.push_front(frame);
        if self.items.len() > self.capacity {
            self.items.pop_back()
        } else {
            None
        }
    }

    pub fn pop_front(&mut self) -> Option<ClientFrame> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
