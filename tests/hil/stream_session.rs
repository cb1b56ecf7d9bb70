use hil_optimizer::cost::ChannelCostSource;
use hil_optimizer::hil::{ChannelAnnouncer, HilSession, TickOutcome};
use hil_optimizer::human::ScriptedDecisions;
use hil_optimizer::stream::StreamHub;

use crate::quick_config;

#[test]
fn session_reads_cost_and_announces_on_hub_channels() {
    let hub = StreamHub::new();
    let config = quick_config(2, 2).cost_buffer_len(16).build().unwrap();
    let cost_outlet = hub.advertise(&config.cost_channel_name, 1).unwrap();
    let cost =
        ChannelCostSource::connect(&hub, &config.cost_channel_name, config.cost_buffer_len)
            .unwrap();
    let announcer =
        ChannelAnnouncer::advertise(&hub, &config.announce_channel_name, config.n_parms())
            .unwrap();
    let changes = hub.open_inlet(&config.announce_channel_name, 16).unwrap();

    let mut session =
        HilSession::new(config, cost, ScriptedDecisions::accept_all(), announcer).unwrap();

    // Anything sent before the go-ahead is discarded.
    cost_outlet.push_sample(&[99.0], 0.0).unwrap();
    assert_eq!(session.tick().unwrap(), TickOutcome::WarmedUp);
    assert_eq!(session.dropped_samples(), 1);
    assert_eq!(changes.pull_sample().unwrap().0, vec![0.0, 0.0]);

    assert_eq!(
        session.tick().unwrap(),
        TickOutcome::Collecting { window_len: 0 }
    );
    cost_outlet.push_sample(&[3.0], 1.0).unwrap();
    assert_eq!(
        session.tick().unwrap(),
        TickOutcome::Collecting { window_len: 1 }
    );
    cost_outlet.push_sample(&[5.0], 2.0).unwrap();
    let TickOutcome::Accepted { observation, .. } = session.tick().unwrap() else {
        panic!("window should be judged");
    };
    assert_eq!(observation.parameter, vec![10.0]);
    assert_eq!(observation.cost, -4.0);

    let (sample, _) = changes.pull_sample().unwrap();
    assert_eq!(sample, vec![10.0, -4.0]);
    assert!(changes.pull_sample().is_none());
}

#[test]
fn missing_cost_channel_is_reported() {
    let hub = StreamHub::new();
    let _other = hub.advertise("hr_cost", 1).unwrap();
    let err = ChannelCostSource::connect(&hub, "Met_cost", 2).unwrap_err();
    assert!(err.to_string().contains("hr_cost"));
}
