//! Transport → supervisor event queues.
//!
//! Input (report and battery notifications) and control events travel on
//! separate channels, so a burst of advertising reports or status events
//! cannot crowd out keystrokes.  Input is drained first: reports that
//! arrived before a disconnect are handled before it.

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Channel, TrySendError};

use super::BridgeEvent;
use crate::config::{EVENT_QUEUE_DEPTH, INPUT_QUEUE_DEPTH};

pub struct EventQueues<M: RawMutex> {
    control: Channel<M, BridgeEvent, EVENT_QUEUE_DEPTH>,
    input: Channel<M, BridgeEvent, INPUT_QUEUE_DEPTH>,
}

fn is_input(event: &BridgeEvent) -> bool {
    matches!(
        event,
        BridgeEvent::Notification { .. } | BridgeEvent::BatteryUpdate { .. }
    )
}

fn unsent(err: TrySendError<BridgeEvent>) -> BridgeEvent {
    let TrySendError::Full(event) = err;
    event
}

impl<M: RawMutex> EventQueues<M> {
    pub const fn new() -> Self {
        Self {
            control: Channel::new(),
            input: Channel::new(),
        }
    }

    /// Queue without waiting.  Hands the event back if its queue is full.
    pub fn try_push(&self, event: BridgeEvent) -> Result<(), BridgeEvent> {
        if is_input(&event) {
            self.input.try_send(event).map_err(unsent)
        } else {
            self.control.try_send(event).map_err(unsent)
        }
    }

    /// Queue, waiting for room.
    pub async fn push(&self, event: BridgeEvent) {
        if is_input(&event) {
            self.input.send(event).await;
        } else {
            self.control.send(event).await;
        }
    }

    /// Next event for the supervisor, input first.
    pub async fn next(&self) -> BridgeEvent {
        match select(self.input.receive(), self.control.receive()).await {
            Either::First(event) | Either::Second(event) => event,
        }
    }

    pub fn try_next(&self) -> Option<BridgeEvent> {
        self.input
            .try_receive()
            .or_else(|_| self.control.try_receive())
            .ok()
    }
}

impl<M: RawMutex> Default for EventQueues<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use heapless::Vec;

    use super::*;
    use crate::ble::Characteristic;

    fn report(byte: u8) -> BridgeEvent {
        BridgeEvent::Notification {
            characteristic: Characteristic::Report,
            data: Vec::from_slice(&[byte, 0x00]).unwrap(),
        }
    }

    #[test]
    fn reports_still_queue_when_control_events_fill_up() {
        let queues = EventQueues::<NoopRawMutex>::new();
        for _ in 0..EVENT_QUEUE_DEPTH {
            queues.try_push(BridgeEvent::ScanEnded).unwrap();
        }
        assert_eq!(
            queues.try_push(BridgeEvent::ScanEnded),
            Err(BridgeEvent::ScanEnded)
        );

        assert!(queues.try_push(report(0xE9)).is_ok());
        assert!(queues.try_push(BridgeEvent::BatteryUpdate { level: 80 }).is_ok());
        assert_eq!(queues.try_next(), Some(report(0xE9)));
    }

    #[test]
    fn input_queue_is_deeper_than_one_burst_of_keys() {
        let queues = EventQueues::<NoopRawMutex>::new();
        for i in 0..INPUT_QUEUE_DEPTH {
            assert!(queues.try_push(report(i as u8)).is_ok());
        }
        assert!(queues.try_push(report(0xFF)).is_err());

        for i in 0..INPUT_QUEUE_DEPTH {
            assert_eq!(queues.try_next(), Some(report(i as u8)));
        }
        assert_eq!(queues.try_next(), None);
    }

    #[test]
    fn reports_before_a_disconnect_are_delivered_first() {
        let queues = EventQueues::<NoopRawMutex>::new();
        block_on(async {
            queues.push(report(1)).await;
            queues.push(BridgeEvent::Disconnected { reason: 0x13 }).await;
            queues.push(report(2)).await;

            assert_eq!(queues.next().await, report(1));
            assert_eq!(queues.next().await, report(2));
            assert_eq!(
                queues.next().await,
                BridgeEvent::Disconnected { reason: 0x13 }
            );
        });
    }
}
