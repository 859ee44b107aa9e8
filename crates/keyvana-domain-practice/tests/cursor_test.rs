use keyvana_domain_practice::{Cursor, LoopRange, LoopSelection, LoopTransition, Step};
use keyvana_domain_score::{DueNote, Hand, Position, ScorePositions};
use pretty_assertions::assert_eq;

fn note(pitch: u8) -> DueNote {
    DueNote::new(pitch, Hand::Right, 1.0)
}

/// Two positions per measure, measures 1..=measures.
fn score(measures: u32) -> ScorePositions {
    let positions = (1..=measures)
        .flat_map(|m| {
            [
                Position::new(m, vec![note(60)]),
                Position::new(m, vec![note(62)]),
            ]
        })
        .collect();
    ScorePositions::new(positions).expect("valid score")
}

#[test]
fn next_reaches_end_after_len_minus_one_calls() {
    let mut cursor = Cursor::new(score(5));
    let mut calls = 0;
    while !cursor.is_at_end() {
        assert_eq!(cursor.next(), Step::Moved);
        calls += 1;
    }
    assert_eq!(calls, cursor.score().len() - 1);
    assert_eq!(cursor.next(), Step::AtEnd);
    assert_eq!(cursor.index(), 9);
    assert!(cursor.state().end_reached);
}

#[test]
fn single_position_score_starts_at_end() {
    let score = ScorePositions::new(vec![Position::new(1, vec![note(60)])]).unwrap();
    let mut cursor = Cursor::new(score);
    assert!(cursor.is_at_end());
    assert_eq!(cursor.next(), Step::AtEnd);
    assert!(!cursor.previous());
}

#[test]
fn reset_is_idempotent() {
    let mut cursor = Cursor::new(score(3));
    cursor.next();
    cursor.next();
    cursor.reset();
    let once = cursor.state();
    cursor.reset();
    assert_eq!(cursor.state(), once);
    assert_eq!(once.index, 0);
}

#[test]
fn previous_stops_at_start() {
    let mut cursor = Cursor::new(score(2));
    assert!(!cursor.previous());
    cursor.next();
    assert!(cursor.previous());
    assert_eq!(cursor.index(), 0);
}

#[test]
fn jump_clamps_to_valid_measures() {
    let mut cursor = Cursor::new(score(4));
    cursor.jump_to_measure(3);
    assert_eq!(cursor.index(), 4);
    assert_eq!(cursor.measure(), 3);

    cursor.jump_to_measure(0);
    assert_eq!(cursor.measure(), 1);

    cursor.jump_to_measure(40);
    assert_eq!(cursor.measure(), 4);
    assert_eq!(cursor.progress().total, 4);
}

#[test]
fn loop_keeps_measure_inside_range() {
    for (start, end) in [(1, 1), (2, 3), (3, 5), (1, 5), (5, 5)] {
        let mut cursor = Cursor::new(score(5));
        cursor.set_loop(Some(LoopRange::new(start, end)));
        cursor.jump_to_measure(start);
        for _ in 0..50 {
            cursor.next();
            let measure = cursor.measure();
            assert!(
                (start..=end).contains(&measure),
                "measure {measure} outside {start}-{end}"
            );
            assert!(!cursor.is_at_end());
        }
    }
}

#[test]
fn loop_wraps_to_first_position_of_start() {
    let mut cursor = Cursor::new(score(4));
    cursor.set_loop(Some(LoopRange::new(2, 3)));
    cursor.jump_to_measure(3);
    assert_eq!(cursor.next(), Step::Moved);
    assert_eq!(cursor.index(), 5);
    assert_eq!(cursor.next(), Step::Wrapped);
    assert_eq!(cursor.index(), 2);
    assert_eq!(cursor.measure(), 2);
}

#[test]
fn one_position_loop_wraps_onto_itself() {
    let score = ScorePositions::new(vec![
        Position::new(1, vec![note(60)]),
        Position::new(2, vec![note(62)]),
        Position::new(3, vec![note(64)]),
    ])
    .unwrap();
    let mut cursor = Cursor::new(score);
    cursor.set_loop(Some(LoopRange::new(2, 2)));
    cursor.jump_to_measure(2);
    for _ in 0..3 {
        assert_eq!(cursor.next(), Step::Wrapped);
        assert_eq!(cursor.index(), 1);
        assert!(!cursor.is_at_end());
    }
}

fn gapped() -> ScorePositions {
    // measures 2 and 5 have no positions
    ScorePositions::new(vec![
        Position::new(1, vec![note(60)]),
        Position::new(3, vec![note(64)]),
        Position::new(4, vec![note(65)]),
        Position::new(6, vec![note(67)]),
    ])
    .unwrap()
}

#[test]
fn empty_loop_range_grows_to_populated_neighbours() {
    let mut cursor = Cursor::new(gapped());
    cursor.set_loop(Some(LoopRange::new(2, 2)));
    assert_eq!(cursor.loop_range(), Some(LoopRange { start: 1, end: 3 }));

    cursor.set_loop(Some(LoopRange::new(5, 5)));
    assert_eq!(cursor.loop_range(), Some(LoopRange { start: 4, end: 6 }));
}

#[test]
fn loop_range_shrinks_onto_populated_measures() {
    let mut cursor = Cursor::new(gapped());
    cursor.set_loop(Some(LoopRange::new(2, 5)));
    assert_eq!(cursor.loop_range(), Some(LoopRange { start: 3, end: 4 }));

    cursor.jump_to_measure(3);
    for _ in 0..6 {
        cursor.next();
        assert!((3..=4).contains(&cursor.measure()));
    }
}

#[test]
fn loop_bounds_previous_and_jump() {
    let mut cursor = Cursor::new(score(4));
    cursor.set_loop(Some(LoopRange::new(2, 3)));
    cursor.jump_to_measure(1);
    assert_eq!(cursor.measure(), 2);
    assert!(!cursor.previous());
    cursor.jump_to_measure(4);
    assert_eq!(cursor.measure(), 3);
}

#[test]
fn loop_range_normalizes_and_clamps() {
    assert_eq!(LoopRange::new(5, 2), LoopRange { start: 2, end: 5 });
    assert_eq!(LoopRange::new(0, 0), LoopRange { start: 1, end: 1 });

    let mut cursor = Cursor::new(score(3));
    cursor.set_loop(Some(LoopRange::new(2, 9)));
    assert_eq!(cursor.loop_range(), Some(LoopRange { start: 2, end: 3 }));
}

#[test]
fn selection_state_machine() {
    let mut selection = LoopSelection::default();

    assert_eq!(
        selection.select(4),
        LoopTransition::Pending {
            start: 4,
            replaced: None
        }
    );
    assert_eq!(selection.pending_start(), Some(4));

    let range = LoopRange { start: 2, end: 4 };
    assert_eq!(selection.select(2), LoopTransition::Activated(range));
    assert_eq!(selection, LoopSelection::Active(range));

    // outside the range: start over instead of stacking
    assert_eq!(
        selection.select(7),
        LoopTransition::Pending {
            start: 7,
            replaced: Some(range)
        }
    );
    selection.select(8);
    assert_eq!(selection.select(8), LoopTransition::Deactivated(LoopRange { start: 7, end: 8 }));
    assert_eq!(selection, LoopSelection::Idle);

    selection.select(3);
    assert!(selection.clear());
    assert!(!selection.clear());
}

#[test]
fn selection_clamps_to_shorter_score() {
    let mut selection = LoopSelection::Active(LoopRange { start: 6, end: 9 });
    selection.clamp_to(1, 4);
    assert_eq!(selection, LoopSelection::Active(LoopRange { start: 4, end: 4 }));

    let mut pending = LoopSelection::PendingStart(12);
    pending.clamp_to(1, 4);
    assert_eq!(pending, LoopSelection::PendingStart(4));
}
