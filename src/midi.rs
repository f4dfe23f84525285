//! The control-core serial decoder.
//!
//! One serial line carries two interleaved protocols: any byte with the high
//! bit set starts a 3-byte MIDI message, and everything else accumulates
//! into an ASCII command line terminated by `\n` or `\r` (at most 63
//! characters; overflow is dropped).  Assembled MIDI messages are
//! interpreted with [`wmidi`]:
//!
//! * note-on (velocity > 0), note-off (or velocity 0), and CC 123
//!   (all-notes-off) become packets on the inter-core queue;
//! * any other control change is routed to the parameter mapped to that CC
//!   number, and the new normalized value is echoed as a `STATE:` line for
//!   the host UI;
//! * everything else is dropped silently.
//!
//! Text commands: `SYNC_KNOBS` replies with the full control surface - a
//! `CC_DEF:` line per parameter followed by a `STATE:` line per parameter,
//! bracketed by `KNOB_UPDATE_START`/`KNOB_UPDATE_END`.  Unknown lines are
//! echoed back with a `LOG:` prefix.

use crate::fifo::{EventSender, NoteEvent};
use crate::params::ParameterStore;
use core::fmt::Write;
use wmidi::{ControlFunction, MidiMessage};

/// Maximum ASCII command length, excluding the terminator.
pub const MAX_LINE: usize = 63;

#[derive(Clone, Copy)]
enum ParserState {
    Text,
    AwaitData1 { status: u8 },
    AwaitData2 { status: u8, data1: u8 },
}

/// Decodes the serial byte stream and dispatches to the store, the event
/// queue, and the host text stream.
pub struct MidiDispatcher<'a> {
    store: &'a ParameterStore,
    events: EventSender<'a>,
    state: ParserState,
    line: heapless::Vec<u8, MAX_LINE>,
}

impl<'a> MidiDispatcher<'a> {
    /// Create a dispatcher over the store and the control-side queue
    /// endpoint.
    pub fn new(store: &'a ParameterStore, events: EventSender<'a>) -> Self {
        Self {
            store,
            events,
            state: ParserState::Text,
            line: heapless::Vec::new(),
        }
    }

    /// Feed one received byte.  Host-bound replies are written to `out`.
    pub fn push_byte<W: Write>(&mut self, byte: u8, out: &mut W) {
        match self.state {
            ParserState::Text => {
                if byte & 0x80 != 0 {
                    self.state = ParserState::AwaitData1 { status: byte };
                } else if byte == b'\n' || byte == b'\r' {
                    if !self.line.is_empty() {
                        self.handle_line(out);
                        self.line.clear();
                    }
                } else {
                    // Overflow beyond the line limit is dropped.
                    let _ = self.line.push(byte);
                }
            }
            ParserState::AwaitData1 { status } => {
                self.state = ParserState::AwaitData2 {
                    status,
                    data1: byte,
                };
            }
            ParserState::AwaitData2 { status, data1 } => {
                self.state = ParserState::Text;
                self.handle_midi([status, data1, byte], out);
            }
        }
    }

    /// Feed a slice of received bytes.
    pub fn push_bytes<W: Write>(&mut self, bytes: &[u8], out: &mut W) {
        for &b in bytes {
            self.push_byte(b, out);
        }
    }

    fn handle_midi<W: Write>(&mut self, bytes: [u8; 3], out: &mut W) {
        // Unsupported or malformed status bytes are dropped silently.
        let Ok(message) = MidiMessage::try_from(&bytes[..]) else {
            return;
        };
        match message {
            MidiMessage::NoteOn(_, note, velocity) => {
                let velocity = u8::from(velocity);
                if velocity > 0 {
                    self.events.send(NoteEvent::note_on(u8::from(note), velocity));
                } else {
                    self.events.send(NoteEvent::note_off(u8::from(note)));
                }
            }
            MidiMessage::NoteOff(_, note, _) => {
                self.events.send(NoteEvent::note_off(u8::from(note)));
            }
            MidiMessage::ControlChange(_, function, value) => {
                if function == ControlFunction::ALL_NOTES_OFF {
                    self.events.send(NoteEvent::all_notes_off());
                } else {
                    self.handle_cc(u8::from(function.0), u8::from(value), out);
                }
            }
            _ => {}
        }
    }

    fn handle_cc<W: Write>(&mut self, cc: u8, value: u8, out: &mut W) {
        if let Some(param) = self.store.by_cc(cc) {
            param.set_normalized(value as f32 / 127.0);
            let _ = write!(out, "STATE:{}:{:.3}\n", cc, param.normalized());
        }
    }

    fn handle_line<W: Write>(&mut self, out: &mut W) {
        let Ok(line) = core::str::from_utf8(&self.line) else {
            return;
        };
        if line == "SYNC_KNOBS" {
            self.sync_knobs(out);
        } else {
            let _ = write!(out, "LOG:Received ASCII Command: {}\n", line);
        }
    }

    // Emit the full control-surface description and state, in canonical
    // parameter order.
    fn sync_knobs<W: Write>(&self, out: &mut W) {
        let _ = write!(out, "KNOB_UPDATE_START\n");
        for p in self.store.iter() {
            let _ = write!(out, "CC_DEF:{}:{}\n", p.cc(), p.name());
        }
        for p in self.store.iter() {
            let _ = write!(out, "STATE:{}:{:.3}\n", p.cc(), p.normalized());
        }
        let _ = write!(out, "KNOB_UPDATE_END\n");
    }
}
