use hil_optimizer::cost::ReplayCostSource;
use hil_optimizer::hil::{HilSession, Phase, RecordingAnnouncer, TickOutcome};
use hil_optimizer::human::{Decision, ScriptedDecisions};

use crate::quick_config;

fn varied_costs(n: usize) -> ReplayCostSource {
    let values: Vec<f64> = (0..n).map(|i| 4.0 + 0.1 * (i % 7) as f64).collect();
    ReplayCostSource::from_values(values, 0.0, 1.0)
}

#[test]
fn history_never_shrinks_under_mixed_decisions() {
    use Decision::{Accept, Reject};

    let config = quick_config(3, 5).build().unwrap();
    let decisions = [
        Reject, Accept, Reject, Accept, Accept, // exploration
        Reject, Accept, // gate
        Reject, Accept, Accept, // optimization
    ];
    let mut session = HilSession::new(
        config,
        varied_costs(60),
        ScriptedDecisions::new(decisions),
        RecordingAnnouncer::new(),
    )
    .unwrap();

    let mut last_n = 0;
    for _ in 0..200 {
        if session.phase() == Phase::Done {
            break;
        }
        session.tick().unwrap();
        let n = session.n();
        assert_eq!(session.x_opt().len(), n);
        assert_eq!(session.y_opt().len(), n);
        assert!(n >= last_n, "history shrank from {last_n} to {n}");
        last_n = n;
    }

    assert_eq!(session.phase(), Phase::Done);
    assert_eq!(session.n(), 5);
    assert!(session.summary().rejected_windows >= 3);
}

#[test]
fn optimization_only_after_gate_accepts() {
    let config = quick_config(2, 4).build().unwrap();
    let mut session = HilSession::new(
        config,
        varied_costs(60),
        ScriptedDecisions::new([
            Decision::Accept,
            Decision::Accept,
            Decision::Reject,
            Decision::Reject,
        ]),
        RecordingAnnouncer::new(),
    )
    .unwrap();

    let mut phases = vec![session.phase()];
    for _ in 0..200 {
        if session.phase() == Phase::Done {
            break;
        }
        let outcome = session.tick().unwrap();
        if session.phase() == Phase::Optimization {
            assert!(session.n() >= 2);
        }
        if matches!(outcome, TickOutcome::TransitionRejected) {
            assert_eq!(session.phase(), Phase::ConfirmTransition);
            assert!(session.engine().last_model().is_none());
        }
        if session.phase() != Phase::ConfirmTransition && session.n() < 2 {
            assert!(session.engine().last_model().is_none());
        }
        if phases.last() != Some(&session.phase()) {
            phases.push(session.phase());
        }
    }

    assert_eq!(
        phases,
        vec![
            Phase::Warmup,
            Phase::Exploration,
            Phase::ConfirmTransition,
            Phase::Optimization,
            Phase::Done,
        ]
    );
}

#[test]
fn gate_runs_even_when_budget_is_spent() {
    let config = quick_config(2, 2).build().unwrap();
    let mut session = HilSession::new(
        config,
        varied_costs(4),
        ScriptedDecisions::accept_all(),
        RecordingAnnouncer::new(),
    )
    .unwrap();

    let summary = session.run().unwrap();
    assert_eq!(summary.history.len(), 2);
    assert!(summary.final_proposal.is_some());
    assert_eq!(session.human().prompts(), 3);
}

#[test]
fn stored_cost_is_negated_exactly_once() {
    let config = quick_config(2, 2).window_tail(1).build().unwrap();
    let cost = ReplayCostSource::from_values([2.5, -1.5, 6.0, 6.0], 0.0, 1.0);
    let mut session = HilSession::new(
        config,
        cost,
        ScriptedDecisions::accept_all(),
        RecordingAnnouncer::new(),
    )
    .unwrap();

    session.tick().unwrap();
    session.tick().unwrap();
    assert_eq!(session.window().values(), &[-2.5]);
    assert_eq!(session.window().values(), &[-2.5]);

    let TickOutcome::Accepted { observation, .. } = session.tick().unwrap() else {
        panic!("window should be ready");
    };
    assert_eq!(observation.cost, 1.5);
    assert_eq!(session.y_opt(), vec![1.5]);

    session.tick().unwrap();
    session.tick().unwrap();
    assert_eq!(session.y_opt(), vec![1.5, -6.0]);
}
