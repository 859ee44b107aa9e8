use keyvana_domain_practice::{
    advance_wait_ms, all_satisfied, note_name, piano_keys, AdvanceGate, HandMode, HeldNotes,
    InputSource, KeyState, KeyboardInput, KeyboardMap, PressOutcome, SkipTrigger, FIRST_KEY,
    LAST_KEY,
};
use keyvana_domain_score::{DueNote, Hand, Position};
use keyvana_ports::DeviceId;
use pretty_assertions::assert_eq;

fn midi() -> InputSource {
    InputSource::Midi(DeviceId("usb-piano".into()))
}

fn held(pitches: &[u8]) -> HeldNotes {
    let mut held = HeldNotes::new();
    for pitch in pitches {
        held.press(*pitch, InputSource::Keyboard);
    }
    held
}

fn due(notes: &[(u8, Hand)]) -> Vec<DueNote> {
    notes
        .iter()
        .map(|(pitch, hand)| DueNote::new(*pitch, *hand, 1.0))
        .collect()
}

#[test]
fn pitch_stays_held_while_any_source_holds_it() {
    let mut held = HeldNotes::new();
    assert_eq!(held.press(60, midi()), PressOutcome::NewlyHeld);
    assert_eq!(held.press(60, InputSource::Keyboard), PressOutcome::AlsoHeld);
    assert_eq!(held.press(60, midi()), PressOutcome::Repeated);

    assert!(!held.release(60, &InputSource::Keyboard));
    assert!(held.contains(60));
    assert!(held.release(60, &midi()));
    assert!(held.is_empty());

    // releasing something never pressed is harmless
    assert!(!held.release(61, &midi()));
}

#[test]
fn disconnect_releases_only_that_source() {
    let mut held = HeldNotes::new();
    held.press(60, midi());
    held.press(64, midi());
    held.press(64, InputSource::Keyboard);
    held.press(67, InputSource::Keyboard);

    assert_eq!(held.release_source(&midi()), vec![60]);
    assert_eq!(held.pitches(), vec![64, 67]);
    assert_eq!(held.release_all(), vec![64, 67]);
    assert!(held.is_empty());
}

#[test]
fn keyboard_layout_starts_at_middle_c() {
    let map = KeyboardMap::default();
    assert_eq!(map.key_to_pitch('a'), Some(60));
    assert_eq!(map.key_to_pitch('w'), Some(61));
    assert_eq!(map.key_to_pitch('j'), Some(71));
    assert_eq!(map.key_to_pitch('k'), Some(72));
    assert_eq!(map.key_to_pitch(';'), Some(76));
    assert_eq!(map.key_to_pitch('A'), Some(60));
    assert_eq!(map.key_to_pitch('z'), None);

    let low = KeyboardMap::new(-5);
    assert_eq!(low.octave(), -1);
    assert_eq!(low.key_to_pitch('a'), Some(0));
    // G9 is the last MIDI note; anything above it is unmapped
    let high = KeyboardMap::new(9);
    assert_eq!(high.octave(), 8);
    assert_eq!(high.key_to_pitch('g'), Some(115));
}

#[test]
fn key_repeat_is_ignored_and_key_up_matches_key_down() {
    let mut keys = KeyboardInput::default();
    assert_eq!(keys.key_down('a', false), Some(60));
    assert_eq!(keys.key_down('a', true), None);
    assert_eq!(keys.key_down('a', false), None);

    keys.map_mut().octave_up();
    assert_eq!(keys.key_up('a'), Some(60));
    assert_eq!(keys.key_up('a'), None);
    assert_eq!(keys.key_down('a', false), Some(72));

    keys.key_down('s', false);
    assert_eq!(keys.release_all(), vec![72, 74]);
    assert!(!keys.has_active_keys());
}

#[test]
fn shared_pitch_is_released_by_the_last_key_up() {
    let mut keys = KeyboardInput::default();
    assert_eq!(keys.key_down('k', false), Some(72));
    keys.map_mut().octave_up();
    assert_eq!(keys.key_down('a', false), Some(72));

    assert_eq!(keys.key_up('k'), None);
    assert!(keys.has_active_keys());
    assert_eq!(keys.key_up('a'), Some(72));
    assert!(!keys.has_active_keys());
}

#[test]
fn octave_bounds() {
    let mut map = KeyboardMap::new(8);
    assert!(!map.octave_up());
    assert!(map.octave_down());
    assert_eq!(map.octave(), 7);
}

#[test]
fn hand_filter_and_skip_triggers() {
    let notes = due(&[(48, Hand::Left), (64, Hand::Right)]);
    assert_eq!(HandMode::Both.filter(&notes), notes);
    assert_eq!(HandMode::Right.filter(&notes), due(&[(64, Hand::Right)]));
    assert_eq!(HandMode::Left.filter(&notes), due(&[(48, Hand::Left)]));

    let rest = Position::new(1, vec![]);
    let right_only = Position::new(1, due(&[(64, Hand::Right)]));
    assert_eq!(HandMode::Both.skip_trigger(&rest), Some(SkipTrigger::Structural));
    assert_eq!(HandMode::Both.skip_trigger(&right_only), None);
    assert_eq!(
        HandMode::Left.skip_trigger(&right_only),
        Some(SkipTrigger::OtherHand(Hand::Left))
    );
    assert!(HandMode::Right.is_playable(&right_only));
}

#[test]
fn superset_satisfies_and_empty_never_does() {
    let chord = due(&[(60, Hand::Right), (64, Hand::Right)]);
    assert!(all_satisfied(&chord, &held(&[60, 64, 67])));
    assert!(all_satisfied(&chord, &held(&[60, 64])));
    assert!(!all_satisfied(&chord, &held(&[60])));
    assert!(!all_satisfied(&[], &held(&[60])));
}

#[test]
fn gate_fires_once_per_position() {
    let chord = due(&[(60, Hand::Right), (64, Hand::Right)]);
    let mut gate = AdvanceGate::new();
    let mut notes = HeldNotes::new();

    notes.press(60, InputSource::Keyboard);
    assert_eq!(gate.evaluate(&chord, &notes, None), None);
    notes.press(64, InputSource::Keyboard);
    assert_eq!(gate.evaluate(&chord, &notes, None), Some(0));

    notes.release_all();
    assert_eq!(gate.evaluate(&chord, &notes, None), None);
    notes.press(60, InputSource::Keyboard);
    notes.press(64, InputSource::Keyboard);
    assert_eq!(gate.evaluate(&chord, &notes, None), None);
    assert!(gate.has_fired());

    gate.reset();
    assert_eq!(gate.evaluate(&chord, &notes, None), Some(0));
}

#[test]
fn wait_uses_shortest_due_note() {
    let notes = vec![
        DueNote::new(60, Hand::Right, 1.0),
        DueNote::new(48, Hand::Left, 0.5),
    ];
    assert_eq!(advance_wait_ms(&notes, Some(120)), 250);
    assert_eq!(advance_wait_ms(&notes, None), 0);
    assert_eq!(advance_wait_ms(&notes, Some(0)), 0);
    assert_eq!(advance_wait_ms(&[], Some(120)), 0);
}

#[test]
fn piano_view_colors_keys() {
    let notes = due(&[(60, Hand::Right), (48, Hand::Left)]);
    let keys = piano_keys(&notes, &held(&[60, 61]));
    assert_eq!(keys.len(), 88);
    assert_eq!(keys[0].pitch, FIRST_KEY);
    assert_eq!(keys[87].pitch, LAST_KEY);

    let state = |pitch: u8| keys[(pitch - FIRST_KEY) as usize].state;
    assert_eq!(state(60), KeyState::Correct(Hand::Right));
    assert_eq!(state(48), KeyState::Due(Hand::Left));
    assert_eq!(state(61), KeyState::Pressed);
    assert_eq!(state(62), KeyState::Idle);

    let c_sharp = &keys[(61 - FIRST_KEY) as usize];
    assert!(c_sharp.is_black);
    assert_eq!(c_sharp.name, "C#4");
    assert_eq!(note_name(21), "A0");
    assert_eq!(note_name(108), "C8");
}
