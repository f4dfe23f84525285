//! The inter-core event channel.
//!
//! Discrete note events cross from the control core to the audio core
//! through a bounded single-producer/single-consumer queue of packed 32 bit
//! records, mirroring the mailbox FIFO hardware this was designed around.
//! The queue provides release/acquire ordering at the push/pop boundary and
//! strict FIFO delivery; packets are self-describing, so no sequence numbers
//! are needed.
//!
//! The producer push spins while the queue is full.  In practice it never
//! does: the control side produces at most a few thousand events per second
//! while the consumer drains the entire queue once per audio block.

use crate::EVENT_QUEUE_DEPTH;
use heapless::spsc::{Consumer, Producer, Queue};

/// Packet command byte: note off.
pub const NOTE_OFF: u8 = 0x80;
/// Packet command byte: note on.
pub const NOTE_ON: u8 = 0x90;
/// Packet command byte: control change (used for the all-notes-off
/// convention, CC 123).
pub const CONTROL_CHANGE: u8 = 0xB0;
/// The CC number conventionally meaning "all notes off".
pub const ALL_NOTES_OFF_CC: u8 = 123;

/// A decoded note event as carried across the core boundary.
///
/// Wire layout of the packed record: byte 3 is the command, byte 2 is the
/// first data byte (note or CC number), byte 1 is the second data byte
/// (velocity or CC value), byte 0 is reserved.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct NoteEvent {
    /// Command byte (`NOTE_ON`, `NOTE_OFF`, or `CONTROL_CHANGE`).
    pub command: u8,
    /// Note number or CC number.
    pub data1: u8,
    /// Velocity or CC value.
    pub data2: u8,
}

impl NoteEvent {
    /// A note-on event.
    pub const fn note_on(note: u8, velocity: u8) -> Self {
        Self {
            command: NOTE_ON,
            data1: note,
            data2: velocity,
        }
    }

    /// A note-off event.
    pub const fn note_off(note: u8) -> Self {
        Self {
            command: NOTE_OFF,
            data1: note,
            data2: 0,
        }
    }

    /// The all-notes-off convention (CC 123).
    pub const fn all_notes_off() -> Self {
        Self {
            command: CONTROL_CHANGE,
            data1: ALL_NOTES_OFF_CC,
            data2: 0,
        }
    }

    /// True if this packet is the all-notes-off convention.
    pub const fn is_all_notes_off(&self) -> bool {
        self.command == CONTROL_CHANGE && self.data1 == ALL_NOTES_OFF_CC
    }

    /// Pack into the 32 bit wire record.
    pub const fn pack(&self) -> u32 {
        ((self.command as u32) << 24) | ((self.data1 as u32) << 16) | ((self.data2 as u32) << 8)
    }

    /// Unpack from the 32 bit wire record.
    pub const fn unpack(word: u32) -> Self {
        Self {
            command: (word >> 24) as u8,
            data1: (word >> 16) as u8,
            data2: (word >> 8) as u8,
        }
    }
}

/// The queue backing storage.  Lives wherever both cores can see it (a
/// `static` in firmware); [`split`](Self::split) hands out the two endpoints.
pub struct EventQueue {
    queue: Queue<u32, EVENT_QUEUE_DEPTH>,
}

impl EventQueue {
    /// Create an empty queue.
    pub const fn new() -> Self {
        Self {
            queue: Queue::new(),
        }
    }

    /// Split into the control-side sender and audio-side receiver.
    pub fn split(&mut self) -> (EventSender<'_>, EventReceiver<'_>) {
        let (producer, consumer) = self.queue.split();
        (EventSender { producer }, EventReceiver { consumer })
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Control-core endpoint: pushes events, blocking (spinning) only when the
/// queue is full.
pub struct EventSender<'a> {
    producer: Producer<'a, u32, EVENT_QUEUE_DEPTH>,
}

impl EventSender<'_> {
    /// Push an event, spinning until space is available.  Steady state never
    /// spins; a full queue here indicates a stalled audio core.
    pub fn send(&mut self, event: NoteEvent) {
        let mut word = event.pack();
        while let Err(rejected) = self.producer.enqueue(word) {
            word = rejected;
            core::hint::spin_loop();
        }
    }
}

/// Audio-core endpoint: non-blocking poll.
pub struct EventReceiver<'a> {
    consumer: Consumer<'a, u32, EVENT_QUEUE_DEPTH>,
}

impl EventReceiver<'_> {
    /// Pop the oldest pending event, if any.
    pub fn poll(&mut self) -> Option<NoteEvent> {
        self.consumer.dequeue().map(NoteEvent::unpack)
    }
}
