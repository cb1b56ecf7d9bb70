use hil_optimizer::cost::ReplayCostSource;
use hil_optimizer::hil::{HilSession, Phase, RecordingAnnouncer, TickOutcome};
use hil_optimizer::human::{Decision, ScriptedDecisions};

use crate::quick_config;

type Session = HilSession<ReplayCostSource, ScriptedDecisions, RecordingAnnouncer>;

fn snapshot(session: &Session) -> (usize, Option<Vec<f64>>, Vec<f64>) {
    (
        session.n(),
        session.current_parameter().map(<[f64]>::to_vec),
        session.y_opt(),
    )
}

/// Tick until the next prompt outcome, returning it.
fn until_prompt(session: &mut Session) -> TickOutcome {
    for _ in 0..100 {
        let outcome = session.tick().unwrap();
        if !matches!(outcome, TickOutcome::Collecting { .. }) {
            return outcome;
        }
    }
    panic!("no prompt within 100 ticks");
}

#[test]
fn exploration_rejection_restores_state() {
    let config = quick_config(2, 3).build().unwrap();
    let cost = ReplayCostSource::from_values((0..20_i32).map(f64::from), 0.0, 1.0);
    let mut session = HilSession::new(
        config,
        cost,
        ScriptedDecisions::new([Decision::Accept, Decision::Reject]),
        RecordingAnnouncer::new(),
    )
    .unwrap();

    session.tick().unwrap();
    assert!(matches!(
        until_prompt(&mut session),
        TickOutcome::Accepted { .. }
    ));
    let before = snapshot(&session);
    let events_before = session.announcer().events().len();
    assert!(session.window().is_empty());

    assert_eq!(until_prompt(&mut session), TickOutcome::Rejected);
    assert_eq!(snapshot(&session), before);
    assert!(session.window().is_empty());
    assert_eq!(session.announcer().events().len(), events_before);
}

#[test]
fn optimization_rejection_keeps_proposal() {
    let config = quick_config(2, 4).build().unwrap();
    let cost = ReplayCostSource::from_values((0..40_i32).map(|i| 3.0 + f64::from(i % 3)), 0.0, 1.0);
    let mut session = HilSession::new(
        config,
        cost,
        ScriptedDecisions::accept_all(),
        RecordingAnnouncer::new(),
    )
    .unwrap();

    while session.phase() != Phase::Optimization {
        session.tick().unwrap();
        assert_ne!(session.phase(), Phase::Done);
    }
    let proposal = session.engine().last_proposal().unwrap().candidate.clone();
    assert_eq!(session.current_parameter(), Some(proposal.as_slice()));

    let before = snapshot(&session);
    session.human_mut().push(Decision::Reject);
    assert_eq!(until_prompt(&mut session), TickOutcome::Rejected);
    assert_eq!(snapshot(&session), before);
    assert!(session.window().is_empty());
    assert_eq!(
        session.engine().last_proposal().unwrap().candidate,
        proposal
    );
}
