use hil_optimizer::cost::ReplayCostSource;
use hil_optimizer::hil::{HilSession, Phase, RecordingAnnouncer, TickOutcome};
use hil_optimizer::human::ScriptedDecisions;
use hil_optimizer::kernel::KernelFamily;
use hil_optimizer::storage::CheckpointStore;

use crate::{quick_config, temp_dir};

fn explore_and_checkpoint(root: &std::path::Path) {
    let config = quick_config(2, 2).model_save_path(root).build().unwrap();
    let cost = ReplayCostSource::from_values([4.0, 4.0, 6.0, 6.0], 0.0, 1.0);
    let mut session = HilSession::new(
        config,
        cost,
        ScriptedDecisions::accept_all(),
        RecordingAnnouncer::new(),
    )
    .unwrap();
    session.run().unwrap();
    assert!(matches!(session.engine().last_checkpoint(), Some(Ok(_))));
}

#[test]
fn resume_continues_in_optimization() {
    let root = temp_dir("resume");
    explore_and_checkpoint(&root);

    let store = CheckpointStore::new(&root);
    assert_eq!(store.iterations().unwrap(), vec![2]);
    let checkpoint = store.latest().unwrap().unwrap();
    assert_eq!(checkpoint.x, vec![vec![10.0], vec![20.0]]);
    assert_eq!(checkpoint.y, vec![-4.0, -6.0]);

    let saved_model = std::fs::read_to_string(root.join("iter_2").join("model.json")).unwrap();
    let config = quick_config(2, 4).model_save_path(&root).build().unwrap();
    let cost = ReplayCostSource::from_values([5.0, 5.0], 10.0, 1.0);
    let mut session = HilSession::resume(
        config,
        &checkpoint,
        cost,
        ScriptedDecisions::accept_all(),
        RecordingAnnouncer::new(),
    )
    .unwrap();

    assert_eq!(session.phase(), Phase::Optimization);
    assert_eq!(session.n(), 2);
    let parameter = session.current_parameter().unwrap().to_vec();
    assert!((0.0..=100.0).contains(&parameter[0]));

    // The checkpoint resumed from is left untouched.
    assert!(session.engine().last_checkpoint().is_none());
    assert_eq!(store.iterations().unwrap(), vec![2]);
    assert_eq!(
        std::fs::read_to_string(root.join("iter_2").join("model.json")).unwrap(),
        saved_model
    );

    session.tick().unwrap();
    let TickOutcome::Accepted {
        observation,
        proposal,
    } = session.tick().unwrap()
    else {
        panic!("window should be judged");
    };
    assert_eq!(observation.parameter, parameter);
    assert_eq!(observation.cost, -5.0);
    assert!(proposal.is_some());
    assert_eq!(session.n(), 3);
    assert_eq!(session.human().go_signals(), 0);
    assert_eq!(store.iterations().unwrap(), vec![2, 3]);

    std::fs::remove_dir_all(&root).ok();
}

#[test]
fn resume_rejects_mismatched_config() {
    let root = temp_dir("resume_mismatch");
    explore_and_checkpoint(&root);
    let checkpoint = CheckpointStore::new(&root).latest().unwrap().unwrap();

    let too_many = quick_config(3, 5).build().unwrap();
    let err = HilSession::resume(
        too_many,
        &checkpoint,
        ReplayCostSource::default(),
        ScriptedDecisions::accept_all(),
        RecordingAnnouncer::new(),
    )
    .unwrap_err();
    assert!(err.is_configuration());

    let other_kernel = quick_config(2, 5)
        .kernel(KernelFamily::Matern)
        .build()
        .unwrap();
    let err = HilSession::resume(
        other_kernel,
        &checkpoint,
        ReplayCostSource::default(),
        ScriptedDecisions::accept_all(),
        RecordingAnnouncer::new(),
    )
    .unwrap_err();
    assert!(err.is_configuration());

    std::fs::remove_dir_all(&root).ok();
}
