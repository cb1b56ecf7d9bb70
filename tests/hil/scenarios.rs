use hil_optimizer::cost::{CostSample, ReplayCostSource};
use hil_optimizer::hil::{
    HilSession, Observation, Phase, RecordingAnnouncer, SessionEvent, TickOutcome,
};
use hil_optimizer::human::{Decision, ScriptedDecisions};

use crate::quick_config;

#[test]
fn three_accepted_windows_then_first_proposal() {
    let config = quick_config(3, 3).build().unwrap();
    let cost = ReplayCostSource::from_values([5.0, 5.0, 3.0, 3.0, 7.0, 7.0], 0.0, 1.0);
    let mut session = HilSession::new(
        config,
        cost,
        ScriptedDecisions::accept_all(),
        RecordingAnnouncer::new(),
    )
    .unwrap();

    assert_eq!(session.tick().unwrap(), TickOutcome::WarmedUp);
    assert_eq!(session.phase(), Phase::Exploration);

    let mut accepted = Vec::new();
    while session.phase() == Phase::Exploration {
        if let TickOutcome::Accepted {
            observation,
            proposal,
        } = session.tick().unwrap()
        {
            assert!(proposal.is_none());
            accepted.push(observation);
        }
    }
    assert_eq!(
        accepted,
        vec![
            Observation {
                parameter: vec![10.0],
                cost: -5.0
            },
            Observation {
                parameter: vec![20.0],
                cost: -3.0
            },
            Observation {
                parameter: vec![30.0],
                cost: -7.0
            },
        ]
    );
    assert_eq!(session.phase(), Phase::ConfirmTransition);
    assert!(session.engine().last_model().is_none());

    let TickOutcome::TransitionAccepted { proposal } = session.tick().unwrap() else {
        panic!("gate should accept");
    };
    assert_eq!(proposal.len(), 1);
    assert!((0.0..=100.0).contains(&proposal[0]));
    assert_eq!(session.phase(), Phase::Done);
    assert_eq!(session.x_opt(), vec![vec![10.0], vec![20.0], vec![30.0]]);
    assert_eq!(session.y_opt(), vec![-5.0, -3.0, -7.0]);
    assert_eq!(session.current_parameter(), Some(proposal.as_slice()));

    let events = session.announcer().events();
    assert_eq!(events.first(), Some(&SessionEvent::Started));
    assert_eq!(
        events.last(),
        Some(&SessionEvent::Proposal {
            parameter: proposal.clone()
        })
    );
    assert_eq!(events.len(), 5);

    let summary = session.summary();
    assert_eq!(summary.best.unwrap().parameter, vec![30.0]);
    assert_eq!(summary.final_proposal, Some(proposal));
    assert_eq!(session.tick().unwrap(), TickOutcome::Done);
}

#[test]
fn rejecting_first_window_keeps_history_empty() {
    let config = quick_config(3, 3).window_min_size(2).build().unwrap();
    let cost = ReplayCostSource::from_values([4.0, 4.2, 4.4], 0.0, 1.0);
    let mut session = HilSession::new(
        config,
        cost,
        ScriptedDecisions::new([Decision::Reject]),
        RecordingAnnouncer::new(),
    )
    .unwrap();

    session.tick().unwrap();
    assert_eq!(
        session.tick().unwrap(),
        TickOutcome::Collecting { window_len: 1 }
    );
    assert_eq!(
        session.tick().unwrap(),
        TickOutcome::Collecting { window_len: 2 }
    );
    assert!((session.window().tail_mean(5).unwrap() + 4.1).abs() < 1e-12);
    assert_eq!(session.tick().unwrap(), TickOutcome::Rejected);

    assert_eq!(session.n(), 0);
    assert!(session.window().is_empty());
    assert_eq!(session.current_parameter(), Some([10.0].as_slice()));

    session
        .cost_source_mut()
        .push(CostSample::new(3.9, 3.0));
    assert_eq!(
        session.tick().unwrap(),
        TickOutcome::Collecting { window_len: 1 }
    );
    assert_eq!(session.window().values(), &[-3.9]);
    assert_eq!(session.summary().rejected_windows, 1);
}

#[test]
fn full_session_runs_to_done() {
    let config = quick_config(3, 5).build().unwrap();
    let values: Vec<f64> = (0..40_i32).map(|i| 4.0 + 0.25 * f64::from(i % 5)).collect();
    let cost = ReplayCostSource::from_values(values, 0.0, 1.0);
    let mut session = HilSession::new(
        config,
        cost,
        ScriptedDecisions::accept_all(),
        RecordingAnnouncer::new(),
    )
    .unwrap();

    let summary = session.run().unwrap();
    assert_eq!(session.phase(), Phase::Done);
    assert_eq!(summary.history.len(), 5);
    let proposal = summary.final_proposal.unwrap();
    assert!((0.0..=100.0).contains(&proposal[0]));
    assert_eq!(session.human().go_signals(), 1);
    // Five windows plus the gate.
    assert_eq!(session.human().prompts(), 6 + summary.fit_failures);

    let proposals = session
        .announcer()
        .events()
        .iter()
        .filter(|e| matches!(e, SessionEvent::Proposal { .. }))
        .count();
    assert_eq!(proposals, 3);

    // Optimization observations are measured at the previous proposal.
    let mut last_proposal = None;
    let mut n_seen = 0;
    for event in session.announcer().events() {
        match event {
            SessionEvent::Proposal { parameter } => last_proposal = Some(parameter.clone()),
            SessionEvent::Observation { parameter, .. } => {
                n_seen += 1;
                if n_seen > 3 {
                    assert_eq!(Some(parameter), last_proposal.as_ref());
                }
            }
            SessionEvent::Started => {}
        }
    }
}
