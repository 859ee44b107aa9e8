use keyvana_domain_practice::{
    HandMode, HeldNotes, InputSource, LoopRange, LoopSelection, MeasureProgress, PracticeEvent,
    PracticeSession, SkipTrigger,
};
use keyvana_domain_score::{DueNote, Hand, Position, ScorePositions};
use pretty_assertions::assert_eq;

fn r(pitch: u8) -> DueNote {
    DueNote::new(pitch, Hand::Right, 1.0)
}

fn l(pitch: u8) -> DueNote {
    DueNote::new(pitch, Hand::Left, 1.0)
}

/// P0 {60:R}, P1 {}, P2 {48:L, 64:R}
fn three_positions() -> ScorePositions {
    ScorePositions::new(vec![
        Position::new(1, vec![r(60)]),
        Position::new(1, vec![]),
        Position::new(2, vec![l(48), r(64)]),
    ])
    .expect("valid score")
}

fn press(held: &mut HeldNotes, pitch: u8) {
    held.press(pitch, InputSource::Keyboard);
}

fn advance_requests(events: &[PracticeEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|event| match event {
            PracticeEvent::AdvanceRequested { position, .. } => Some(*position),
            _ => None,
        })
        .collect()
}

fn due_positions(events: &[PracticeEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|event| match event {
            PracticeEvent::DueNotesChanged { position, .. } => Some(*position),
            _ => None,
        })
        .collect()
}

#[test]
fn end_to_end_both_hands() {
    let mut held = HeldNotes::new();
    let mut session = PracticeSession::new(three_positions(), HandMode::Both);

    let events = session.start(&held);
    assert_eq!(
        events,
        vec![PracticeEvent::DueNotesChanged {
            position: 0,
            due: vec![r(60)],
            progress: MeasureProgress { current: 1, total: 2 },
            end_reached: false,
        }]
    );

    press(&mut held, 60);
    let events = session.on_input(&held);
    assert_eq!(advance_requests(&events), vec![0]);

    let events = session.complete_advance(0, &held);
    assert_eq!(
        events,
        vec![
            PracticeEvent::AutoSkipped {
                from: 1,
                to: 2,
                trigger: SkipTrigger::Structural
            },
            PracticeEvent::DueNotesChanged {
                position: 2,
                due: vec![l(48), r(64)],
                progress: MeasureProgress { current: 2, total: 2 },
                end_reached: true,
            },
        ]
    );

    held.release_all();
    press(&mut held, 48);
    assert!(advance_requests(&session.on_input(&held)).is_empty());
    press(&mut held, 64);
    assert_eq!(advance_requests(&session.on_input(&held)), vec![2]);

    let events = session.complete_advance(2, &held);
    assert_eq!(events, vec![PracticeEvent::PieceCompleted]);
    assert!(session.is_at_end());
    assert!(session.is_completed());

    // nothing more happens once complete
    assert!(session.complete_advance(2, &held).is_empty());
    assert!(session.next(&held).is_empty());
}

#[test]
fn right_hand_only_needs_right_notes() {
    let mut held = HeldNotes::new();
    let mut session = PracticeSession::new(three_positions(), HandMode::Right);
    session.start(&held);
    session.jump_to_measure(2, &held);
    assert_eq!(session.filtered_due(), &[r(64)]);

    press(&mut held, 64);
    assert_eq!(advance_requests(&session.on_input(&held)), vec![2]);
}

#[test]
fn left_hand_skips_right_only_positions_in_one_step() {
    let score = ScorePositions::new(vec![
        Position::new(1, vec![r(60)]),
        Position::new(1, vec![r(62)]),
        Position::new(2, vec![]),
        Position::new(2, vec![l(48)]),
    ])
    .unwrap();
    let held = HeldNotes::new();
    let mut session = PracticeSession::new(score, HandMode::Left);

    let events = session.start(&held);
    assert_eq!(
        events[0],
        PracticeEvent::AutoSkipped {
            from: 0,
            to: 3,
            trigger: SkipTrigger::OtherHand(Hand::Left)
        }
    );
    assert_eq!(due_positions(&events), vec![3]);
    assert_eq!(session.filtered_due(), &[l(48)]);
}

#[test]
fn filtered_due_never_contains_the_other_hand() {
    let score = ScorePositions::new(vec![
        Position::new(1, vec![l(48), r(60)]),
        Position::new(1, vec![r(62)]),
        Position::new(2, vec![l(50)]),
        Position::new(2, vec![l(52), r(64), r(67)]),
        Position::new(3, vec![r(65)]),
    ])
    .unwrap();
    let held = HeldNotes::new();

    for mode in [HandMode::Left, HandMode::Right] {
        let hand = mode.hand().unwrap();
        let mut session = PracticeSession::new(score.clone(), mode);
        let mut events = session.start(&held);
        for _ in 0..6 {
            events.extend(session.next(&held));
        }
        for event in &events {
            if let PracticeEvent::DueNotesChanged { due, .. } = event {
                assert!(due.iter().all(|note| note.hand == hand), "{mode:?}: {due:?}");
            }
        }
    }
}

#[test]
fn one_advance_even_after_release_and_repress() {
    let score = ScorePositions::new(vec![
        Position::new(1, vec![r(60), r(64)]),
        Position::new(1, vec![r(67)]),
    ])
    .unwrap();
    let mut held = HeldNotes::new();
    let mut session = PracticeSession::new(score, HandMode::Both);
    session.start(&held);

    let mut requests = Vec::new();
    press(&mut held, 60);
    requests.extend(advance_requests(&session.on_input(&held)));
    press(&mut held, 64);
    requests.extend(advance_requests(&session.on_input(&held)));
    held.release_all();
    requests.extend(advance_requests(&session.on_input(&held)));
    press(&mut held, 60);
    press(&mut held, 64);
    requests.extend(advance_requests(&session.on_input(&held)));

    assert_eq!(requests, vec![0]);
}

#[test]
fn stale_advance_is_dropped() {
    let score = ScorePositions::new(vec![
        Position::new(1, vec![r(60)]),
        Position::new(1, vec![r(62)]),
        Position::new(2, vec![r(64)]),
    ])
    .unwrap();
    let mut held = HeldNotes::new();
    let mut session = PracticeSession::new(score, HandMode::Both);
    session.start(&held);
    press(&mut held, 60);
    assert_eq!(advance_requests(&session.on_input(&held)), vec![0]);

    // user navigated away before the advance was carried out
    session.next(&held);
    assert!(session.complete_advance(0, &held).is_empty());
    assert_eq!(session.cursor_state().index, 1);
}

#[test]
fn satisfied_chord_held_into_next_position_advances_again() {
    let score = ScorePositions::new(vec![
        Position::new(1, vec![r(60)]),
        Position::new(1, vec![r(60)]),
    ])
    .unwrap();
    let mut held = HeldNotes::new();
    let mut session = PracticeSession::new(score, HandMode::Both);
    session.start(&held);
    press(&mut held, 60);
    session.on_input(&held);

    let events = session.complete_advance(0, &held);
    assert_eq!(advance_requests(&events), vec![1]);
}

#[test]
fn delayed_advance_reports_wait() {
    let score = ScorePositions::new(vec![
        Position::new(1, vec![DueNote::new(60, Hand::Right, 0.5)]),
        Position::new(1, vec![r(62)]),
    ])
    .unwrap();
    let mut held = HeldNotes::new();
    let mut session = PracticeSession::new(score, HandMode::Both);
    session.set_advance_bpm(Some(60));
    session.start(&held);
    press(&mut held, 60);
    assert_eq!(
        session.on_input(&held),
        vec![PracticeEvent::AdvanceRequested {
            position: 0,
            wait_ms: 500
        }]
    );
}

fn four_measures() -> ScorePositions {
    ScorePositions::new(
        (1..=4)
            .flat_map(|m| [Position::new(m, vec![r(60)]), Position::new(m, vec![])])
            .collect(),
    )
    .unwrap()
}

#[test]
fn activating_a_loop_moves_cursor_to_start() {
    let held = HeldNotes::new();
    let mut session = PracticeSession::new(four_measures(), HandMode::Both);
    session.start(&held);

    let events = session.select_measure(3, &held);
    assert_eq!(
        events,
        vec![PracticeEvent::LoopSelectionChanged {
            selection: LoopSelection::PendingStart(3)
        }]
    );
    assert_eq!(session.cursor_state().index, 0);

    let events = session.select_measure(2, &held);
    let range = LoopRange { start: 2, end: 3 };
    assert_eq!(
        events[0],
        PracticeEvent::LoopSelectionChanged {
            selection: LoopSelection::Active(range)
        }
    );
    assert_eq!(due_positions(&events), vec![2]);
    assert_eq!(session.cursor().measure(), 2);
}

#[test]
fn looping_practice_wraps_and_never_completes() {
    let mut held = HeldNotes::new();
    let mut session = PracticeSession::new(four_measures(), HandMode::Both);
    session.start(&held);
    session.select_measure(3, &held);
    session.select_measure(4, &held);
    press(&mut held, 60);

    let mut visited = Vec::new();
    for _ in 0..6 {
        let position = session.cursor_state().index;
        visited.push(position);
        // the gate may already have fired on settle while the key was held
        session.on_input(&held);
        let events = session.complete_advance(position, &held);
        assert!(!events.contains(&PracticeEvent::PieceCompleted));
    }
    assert_eq!(visited, vec![4, 6, 4, 6, 4, 6]);
}

#[test]
fn clicking_inside_active_loop_clears_it() {
    let held = HeldNotes::new();
    let mut session = PracticeSession::new(four_measures(), HandMode::Both);
    session.start(&held);
    session.select_measure(1, &held);
    session.select_measure(2, &held);

    let events = session.select_measure(2, &held);
    assert_eq!(
        events,
        vec![PracticeEvent::LoopSelectionChanged {
            selection: LoopSelection::Idle
        }]
    );
    assert!(session.cursor().loop_range().is_none());
    assert!(session.clear_loop().is_empty());
}

#[test]
fn reset_returns_to_loop_start_when_looping() {
    let held = HeldNotes::new();
    let mut session = PracticeSession::new(four_measures(), HandMode::Both);
    session.start(&held);
    session.select_measure(2, &held);
    session.select_measure(3, &held);
    session.next(&held);
    session.reset(&held);
    assert_eq!(session.cursor().measure(), 2);

    session.clear_loop();
    let once = session.reset(&held);
    let twice = session.reset(&held);
    assert_eq!(once, twice);
    assert_eq!(session.cursor_state().index, 0);
}

#[test]
fn replacing_the_score_clamps_the_loop() {
    let held = HeldNotes::new();
    let mut session = PracticeSession::new(four_measures(), HandMode::Both);
    session.start(&held);
    session.select_measure(3, &held);
    session.select_measure(4, &held);

    let shorter = ScorePositions::new(vec![
        Position::new(1, vec![r(60)]),
        Position::new(2, vec![r(62)]),
    ])
    .unwrap();
    let events = session.replace_score(shorter, &held);
    let clamped = LoopSelection::Active(LoopRange { start: 2, end: 2 });
    assert_eq!(
        events[0],
        PracticeEvent::LoopSelectionChanged { selection: clamped }
    );
    assert_eq!(session.loop_selection(), clamped);
    assert_eq!(session.cursor_state().index, 1);
}

#[test]
fn hand_mode_change_resettles() {
    let held = HeldNotes::new();
    let mut session = PracticeSession::new(three_positions(), HandMode::Both);
    session.start(&held);

    let events = session.set_hand_mode(HandMode::Left, &held);
    assert_eq!(events[0], PracticeEvent::HandModeChanged { mode: HandMode::Left });
    assert_eq!(session.cursor_state().index, 2);
    assert_eq!(session.filtered_due(), &[l(48)]);
    assert!(session.set_hand_mode(HandMode::Left, &held).is_empty());
}

#[test]
fn previous_skips_back_over_structural_positions() {
    let held = HeldNotes::new();
    let mut session = PracticeSession::new(three_positions(), HandMode::Both);
    session.start(&held);
    session.jump_to_measure(2, &held);

    let events = session.previous(&held);
    assert_eq!(due_positions(&events), vec![0]);
}

#[test]
fn score_ending_on_structural_position_completes_on_settle() {
    let score = ScorePositions::new(vec![
        Position::new(1, vec![r(60)]),
        Position::new(2, vec![]),
    ])
    .unwrap();
    let mut held = HeldNotes::new();
    let mut session = PracticeSession::new(score, HandMode::Both);
    session.start(&held);
    press(&mut held, 60);
    session.on_input(&held);

    let events = session.complete_advance(0, &held);
    assert_eq!(events.last(), Some(&PracticeEvent::PieceCompleted));
}

fn three_measures() -> ScorePositions {
    ScorePositions::new(vec![
        Position::new(1, vec![r(60)]),
        Position::new(2, vec![r(62)]),
        Position::new(3, vec![r(64)]),
    ])
    .unwrap()
}

#[test]
fn one_chord_loop_replays_every_lap() {
    let mut held = HeldNotes::new();
    let mut session = PracticeSession::new(three_measures(), HandMode::Both);
    session.start(&held);
    session.select_measure(2, &held);
    session.select_measure(2, &held);
    assert_eq!(session.cursor_state().index, 1);

    for _ in 0..2 {
        press(&mut held, 62);
        assert_eq!(advance_requests(&session.on_input(&held)), vec![1]);
        held.release(62, &InputSource::Keyboard);

        let events = session.complete_advance(1, &held);
        assert_eq!(due_positions(&events), vec![1]);
        assert!(!events.contains(&PracticeEvent::PieceCompleted));
        assert!(!session.is_completed());
    }
    assert_eq!(
        session.loop_selection(),
        LoopSelection::Active(LoopRange { start: 2, end: 2 })
    );
}

#[test]
fn loop_on_an_empty_measure_never_shows_notes_outside_it() {
    let held = HeldNotes::new();
    let score = ScorePositions::new(vec![
        Position::new(1, vec![r(60)]),
        Position::new(3, vec![r(64)]),
        Position::new(4, vec![r(65)]),
    ])
    .unwrap();
    let mut session = PracticeSession::new(score, HandMode::Both);
    session.start(&held);
    session.select_measure(2, &held);
    let events = session.select_measure(2, &held);

    let range = LoopRange { start: 1, end: 3 };
    assert_eq!(
        events[0],
        PracticeEvent::LoopSelectionChanged {
            selection: LoopSelection::Active(range)
        }
    );
    for event in &events {
        if let PracticeEvent::DueNotesChanged { progress, .. } = event {
            assert!(range.contains(progress.current));
        }
    }
    assert_eq!(session.cursor().measure(), 1);
}
