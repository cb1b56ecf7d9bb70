use hil_optimizer::cost::{CostSample, ReplayCostSource};
use hil_optimizer::hil::{HilSession, Phase, RecordingAnnouncer, SessionEvent, TickOutcome};
use hil_optimizer::human::{Decision, ScriptedDecisions};
use hil_optimizer::FitFailure;

use crate::quick_config;

const MAX: f64 = f64::MAX;

type Session = HilSession<ReplayCostSource, ScriptedDecisions, RecordingAnnouncer>;

fn session(values: Vec<f64>, answers: Vec<Decision>) -> Session {
    let config = quick_config(2, 4).build().unwrap();
    HilSession::new(
        config,
        ReplayCostSource::from_values(values, 0.0, 1.0),
        ScriptedDecisions::new(answers),
        RecordingAnnouncer::new(),
    )
    .unwrap()
}

fn explore(session: &mut Session) {
    assert_eq!(session.tick().unwrap(), TickOutcome::WarmedUp);
    for _ in 0..2 {
        assert_eq!(
            session.tick().unwrap(),
            TickOutcome::Collecting { window_len: 1 }
        );
        assert!(matches!(
            session.tick().unwrap(),
            TickOutcome::Accepted { proposal: None, .. }
        ));
    }
    assert_eq!(session.phase(), Phase::ConfirmTransition);
}

fn proposals(session: &Session) -> usize {
    session
        .announcer()
        .events()
        .iter()
        .filter(|e| matches!(e, SessionEvent::Proposal { .. }))
        .count()
}

#[test]
fn gate_fit_failure_keeps_the_session_at_the_gate() {
    use Decision::{Accept, Reject};

    // Costs at both ends of the float range: their spread overflows.
    let mut session = session(
        vec![MAX, MAX, -MAX, -MAX],
        vec![Accept, Accept, Accept, Accept, Reject],
    );
    explore(&mut session);
    assert_eq!(session.y_opt(), vec![-MAX, MAX]);
    let parameter = session.current_parameter().map(<[f64]>::to_vec);

    for failures in 1..=2 {
        assert_eq!(
            session.tick().unwrap(),
            TickOutcome::FitFailed(FitFailure::NonFinite { iteration: 0 })
        );
        assert_eq!(session.phase(), Phase::ConfirmTransition);
        assert_eq!(session.n(), 2);
        assert_eq!(session.current_parameter().map(<[f64]>::to_vec), parameter);
        assert_eq!(session.summary().fit_failures, failures);
    }
    assert!(session.engine().last_model().is_none());
    assert_eq!(proposals(&session), 0);
    assert_eq!(session.human().messages().len(), 2);
    assert!(session.human().messages()[0].contains("transition"));

    // Rejecting at the gate only clears the window; the gate stays.
    assert_eq!(session.tick().unwrap(), TickOutcome::TransitionRejected);
    assert_eq!(session.phase(), Phase::ConfirmTransition);
    assert_eq!(session.n(), 2);
    assert!(session.window().is_empty());
}

#[test]
fn optimization_fit_failure_keeps_window_and_candidate() {
    use Decision::{Accept, Reject};

    let mut session = session(
        vec![MAX, MAX, 0.5 * MAX, 0.5 * MAX, -MAX, -MAX],
        vec![Accept, Accept, Accept, Accept, Accept, Reject],
    );
    explore(&mut session);
    let TickOutcome::TransitionAccepted { proposal } = session.tick().unwrap() else {
        panic!("gate fit should succeed");
    };
    assert_eq!(session.phase(), Phase::Optimization);

    assert_eq!(
        session.tick().unwrap(),
        TickOutcome::Collecting { window_len: 1 }
    );
    for failures in 1..=2 {
        assert!(matches!(
            session.tick().unwrap(),
            TickOutcome::FitFailed(FitFailure::NonFinite { .. })
        ));
        assert_eq!(session.phase(), Phase::Optimization);
        assert_eq!(session.n(), 2);
        assert_eq!(session.current_parameter(), Some(proposal.as_slice()));
        assert_eq!(session.window().values(), &[MAX, MAX]);
        assert_eq!(session.summary().fit_failures, failures);
        assert_eq!(
            session.engine().last_proposal().unwrap().candidate,
            proposal
        );
    }
    assert_eq!(proposals(&session), 1);
    assert!(session.human().messages()[0].contains("window"));

    assert_eq!(session.tick().unwrap(), TickOutcome::Rejected);
    assert_eq!(session.n(), 2);
    assert!(session.window().is_empty());

    session
        .cost_source_mut()
        .push(CostSample::new(0.75 * MAX, 10.0));
    session
        .cost_source_mut()
        .push(CostSample::new(0.75 * MAX, 11.0));
    assert_eq!(
        session.tick().unwrap(),
        TickOutcome::Collecting { window_len: 1 }
    );
    let TickOutcome::Accepted {
        observation,
        proposal: next,
    } = session.tick().unwrap()
    else {
        panic!("window should be committed");
    };
    assert_eq!(observation.parameter, proposal);
    assert_eq!(observation.cost, -0.75 * MAX);
    assert!(next.is_some());
    assert_eq!(session.n(), 3);
    assert_eq!(session.summary().fit_failures, 2);
    assert_eq!(proposals(&session), 2);
}
