//! Synthetic MIDI fixtures built with midly

use midly::num::{u15, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

fn midi_event(delta: u32, message: MidiMessage) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Midi {
            channel: u4::new(0),
            message,
        },
    }
}

/// Single-track file playing `notes` in sequence, `ticks` per note
pub fn melody(notes: &[u8], ticks: u32) -> Vec<u8> {
    let mut smf = Smf::new(Header::new(Format::SingleTrack, Timing::Metrical(u15::new(480))));
    let mut track = vec![TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(midly::num::u24::new(500_000))),
    }];

    for &note in notes {
        track.push(midi_event(
            0,
            MidiMessage::NoteOn {
                key: u7::new(note),
                vel: u7::new(90),
            },
        ));
        track.push(midi_event(
            ticks,
            MidiMessage::NoteOff {
                key: u7::new(note),
                vel: u7::new(0),
            },
        ));
    }
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(track);

    let mut bytes = Vec::new();
    smf.write_std(&mut bytes).unwrap();
    bytes
}

/// Key of the first note-on and delta of the first note-off
pub fn first_note(bytes: &[u8]) -> (u8, u32) {
    let smf = Smf::parse(bytes).unwrap();
    let mut key = None;
    for event in &smf.tracks[0] {
        if let TrackEventKind::Midi { message, .. } = event.kind {
            match message {
                MidiMessage::NoteOn { key: k, .. } if key.is_none() => key = Some(k.as_int()),
                MidiMessage::NoteOff { .. } => {
                    return (key.unwrap(), event.delta.as_int());
                }
                _ => {}
            }
        }
    }
    panic!("no note in fixture");
}
