//! Shared fixtures for unit tests

use midly::num::{u15, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

/// One-track file: note-on and note-off for `note`, each `delta` ticks apart
pub(crate) fn single_note(note: u8, delta: u32) -> Vec<u8> {
    let mut smf = Smf::new(Header::new(Format::SingleTrack, Timing::Metrical(u15::new(480))));
    let midi = |delta: u32, message: MidiMessage| TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Midi {
            channel: u4::new(0),
            message,
        },
    };

    smf.tracks.push(vec![
        midi(
            delta,
            MidiMessage::NoteOn {
                key: u7::new(note),
                vel: u7::new(100),
            },
        ),
        midi(
            delta,
            MidiMessage::NoteOff {
                key: u7::new(note),
                vel: u7::new(0),
            },
        ),
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        },
    ]);

    let mut bytes = Vec::new();
    smf.write_std(&mut bytes).unwrap();
    bytes
}
