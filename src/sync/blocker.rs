/*!
 * Blocker
 *
 * The predicate-evaluation record behind every blocking operation in the
 * kernel: keyboard event queues, window message queues, generic
 * producer/consumer queues, and plain timer sleeps all park their thread on
 * one of these.
 *
 * A blocker carries an optional predicate, an optional wake channel (the
 * group target for `notify`), and an optional relative timeout. The
 * absolute deadline is stamped from the monotonic clock when the thread
 * parks. A woken thread observes `BlockStatus::Normal`; an expired deadline
 * observes `BlockStatus::Timeout` and no producer wake occurred.
 *
 * Wake is a hint, not a guarantee: multiple waiters may race for the same
 * data, so every consumer re-validates its own predicate after resuming.
 */

use crate::core::limits::DEADLINE_INFINITE;
use crate::core::types::{ChannelId, Timestamp};
use std::fmt;

/// Why a blocked thread resumed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    /// Predicate satisfied or an explicit wake arrived
    Normal,
    /// The deadline elapsed before any wake
    Timeout,
}

/// What a block call did with the running thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Predicate already true; the thread never suspended (status Normal)
    Satisfied,
    /// The thread parked; its status is recorded when it wakes
    Parked,
}

type Predicate = Box<dyn FnMut() -> bool + Send>;

/// Predicate + deadline record attached to exactly one thread at a time;
/// cleared on wake.
pub struct Blocker {
    predicate: Option<Predicate>,
    channel: Option<ChannelId>,
    timeout: Option<Timestamp>,
    deadline: Timestamp,
}

impl Blocker {
    /// Block until `predicate` returns true
    pub fn on<F>(predicate: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        Self {
            predicate: Some(Box::new(predicate)),
            channel: None,
            timeout: None,
            deadline: DEADLINE_INFINITE,
        }
    }

    /// Block until an explicit wake on `channel`
    pub fn on_channel(channel: ChannelId) -> Self {
        Self {
            predicate: None,
            channel: Some(channel),
            timeout: None,
            deadline: DEADLINE_INFINITE,
        }
    }

    /// Pure timer sleep: no predicate, no channel, deadline only
    pub fn sleep(timeout: Timestamp) -> Self {
        Self {
            predicate: None,
            channel: None,
            timeout: Some(timeout),
            deadline: DEADLINE_INFINITE,
        }
    }

    /// Give up after `timeout` nanoseconds with `BlockStatus::Timeout`
    pub fn with_timeout(mut self, timeout: Timestamp) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Also wake on explicit notification of `channel`
    pub fn with_channel(mut self, channel: ChannelId) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Evaluate the predicate. A blocker without one is satisfied only by an
    /// explicit wake or its deadline.
    pub(crate) fn is_satisfied(&mut self) -> bool {
        match self.predicate.as_mut() {
            Some(predicate) => predicate(),
            None => false,
        }
    }

    /// Stamp the absolute deadline; called once when the thread parks
    pub(crate) fn arm(&mut self, now: Timestamp) {
        self.deadline = match self.timeout {
            Some(timeout) => now.saturating_add(timeout),
            None => DEADLINE_INFINITE,
        };
    }

    pub(crate) fn deadline(&self) -> Timestamp {
        self.deadline
    }

    pub(crate) fn channel(&self) -> Option<ChannelId> {
        self.channel
    }
}

impl fmt::Debug for Blocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blocker")
            .field("predicate", &self.predicate.is_some())
            .field("channel", &self.channel)
            .field("deadline", &self.deadline)
            .finish()
    }
}
