//! Hand-off between the supervisor and the task watching a live link.
//!
//! The supervisor tells the link task two things per connection: that
//! pairing was requested, and which handles to forward once discovery is
//! done.  Both go through [`LinkCommands`].  The queue is reset with
//! [`LinkCommands::open`] when a link comes up, *before* the supervisor is
//! told about it, so anything the supervisor queues for the new link
//! survives and anything left from the previous link does not.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;
use heapless::Vec;

/// Report instances a peripheral may expose for notification.
pub const MAX_WATCHED_REPORTS: usize = 8;

/// Handles whose notifications are forwarded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WatchList {
    pub reports: Vec<u16, MAX_WATCHED_REPORTS>,
    pub battery: Option<u16>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkCommand {
    /// Pairing was requested; report when the link is encrypted.
    AwaitSecurity,
    /// Discovery is over; forward notifications for these handles.
    Watch(WatchList),
}

pub struct LinkCommands<M: RawMutex> {
    channel: Channel<M, LinkCommand, 2>,
}

impl<M: RawMutex> LinkCommands<M> {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
        }
    }

    /// A new link is up.  Drops whatever the previous link left behind.
    pub fn open(&self) {
        self.channel.clear();
    }

    pub fn await_security(&self) -> bool {
        self.channel.try_send(LinkCommand::AwaitSecurity).is_ok()
    }

    pub fn watch(&self, list: WatchList) -> bool {
        self.channel.try_send(LinkCommand::Watch(list)).is_ok()
    }

    pub async fn receive(&self) -> LinkCommand {
        self.channel.receive().await
    }

    pub fn try_receive(&self) -> Option<LinkCommand> {
        self.channel.try_receive().ok()
    }
}

impl<M: RawMutex> Default for LinkCommands<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Countdown for the pairing outcome, advanced once per poll.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SecurityWatch {
    polls_left: Option<u32>,
}

impl SecurityWatch {
    pub const fn new() -> Self {
        Self { polls_left: None }
    }

    /// Start waiting for encryption, giving up after `polls` polls.
    pub fn arm(&mut self, polls: u32) {
        self.polls_left = Some(polls.max(1));
    }

    pub fn is_armed(&self) -> bool {
        self.polls_left.is_some()
    }

    /// One poll.  Returns the outcome once it is known: `true` as soon as
    /// the link is encrypted, `false` when the countdown runs out.
    pub fn poll(&mut self, encrypted: bool) -> Option<bool> {
        let left = self.polls_left?;
        if encrypted || left <= 1 {
            self.polls_left = None;
            Some(encrypted)
        } else {
            self.polls_left = Some(left - 1);
            None
        }
    }
}
