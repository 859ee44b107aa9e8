use keyvana_core::{clamp_bpm, nudge, Click, MetronomeClock, MAX_BPM, MIN_BPM};
use keyvana_ports::ClockTime;
use pretty_assertions::assert_eq;

fn at(sample_time: u64) -> ClockTime {
    ClockTime {
        sample_time,
        sample_rate_hz: 48_000,
    }
}

#[test]
fn bpm_limits() {
    assert_eq!(clamp_bpm(10), MIN_BPM);
    assert_eq!(clamp_bpm(500), MAX_BPM);
    assert_eq!(nudge(80, 5), 85);
    assert_eq!(nudge(42, -5), 40);
    assert_eq!(nudge(199, 5), 200);
    assert_eq!(MetronomeClock::new(0).bpm(), 40);
}

#[test]
fn first_beat_lands_after_start_delay_and_is_accented() {
    let mut clock = MetronomeClock::new(120);
    clock.start(120, at(1_000));
    assert_eq!(
        clock.poll(at(1_000)),
        vec![Click {
            beat: 0,
            sample_time: 3_400,
            accent: true
        }]
    );
    // nothing new until the next beat enters the lookahead window
    assert!(clock.poll(at(2_000)).is_empty());
    let clicks = clock.poll(at(24_000));
    assert_eq!(clicks.len(), 1);
    assert_eq!(clicks[0].sample_time, 27_400);
    assert!(!clicks[0].accent);
}

#[test]
fn start_while_running_keeps_handle() {
    let mut clock = MetronomeClock::default();
    let handle = clock.start(100, at(0));
    assert_eq!(clock.start(140, at(0)), handle);
    assert_eq!(clock.bpm(), 140);
    assert_eq!(clock.stop(), Some(handle));
    assert_eq!(clock.stop(), None);
    assert_ne!(clock.start(100, at(0)), handle);
}

#[test]
fn beats_do_not_drift_at_fractional_intervals() {
    // 48000 * 60 / 70 is not a whole number of samples
    let mut clock = MetronomeClock::new(70);
    clock.start(70, at(0));
    let mut clicks = Vec::new();
    let mut now = 0;
    while now < 48_000 * 60 {
        clicks.extend(clock.poll(at(now)));
        now += 480;
    }
    let interval = 48_000.0 * 60.0 / 70.0;
    for click in &clicks {
        let exact = 2_400.0 + click.beat as f64 * interval;
        assert!((click.sample_time as f64 - exact).abs() <= 0.5);
    }
    assert!(clicks.len() >= 70);
    assert!(clicks
        .iter()
        .enumerate()
        .all(|(idx, click)| click.beat == idx as u64));
}

#[test]
fn retune_anchors_on_last_scheduled_beat() {
    let mut clock = MetronomeClock::new(120);
    clock.start(120, at(0));
    let first = clock.poll(at(0));
    assert_eq!(first[0].sample_time, 2_400);

    clock.set_bpm(60);
    let next = clock.poll(at(48_000));
    assert_eq!(next[0].beat, 1);
    assert_eq!(next[0].sample_time, 2_400 + 48_000);
}

#[test]
fn stalled_poll_skips_missed_beats() {
    let mut clock = MetronomeClock::new(120);
    clock.start(120, at(0));
    clock.poll(at(0));
    // two seconds without a poll
    let clicks = clock.poll(at(96_000));
    assert_eq!(clicks.len(), 1);
    assert!(clicks[0].sample_time >= 96_000);
    assert_eq!(clicks[0].beat, 4);
    assert!(clicks[0].accent);
}
