use odf::{ActorId, DirectorConfig, ReceiverConfig, Time};

#[test]
fn default_director_config() {
    let config = DirectorConfig::default();
    assert_eq!(config.name, "odf");
    assert_eq!(config.default_capacity, Some(1));
    assert_eq!(config.completion_time, None);
    assert_eq!(config.stack_size, None);
    assert_eq!(config.max_artificial_deadlocks, None);
}

#[test]
fn director_builder_sets_every_field() {
    let config = DirectorConfig::builder()
        .name("sim")
        .default_capacity(4)
        .completion_time(Time::new(100.0))
        .stack_size(256 * 1024)
        .max_artificial_deadlocks(10)
        .build();

    assert_eq!(config.name, "sim");
    assert_eq!(config.default_capacity, Some(4));
    assert_eq!(config.completion_time, Some(Time::new(100.0)));
    assert_eq!(config.stack_size, Some(256 * 1024));
    assert_eq!(config.max_artificial_deadlocks, Some(10));
}

#[test]
fn receiver_defaults_follow_the_director() {
    let config = DirectorConfig::builder()
        .unbounded_receivers()
        .completion_time(Time::new(5.0))
        .build();
    let receiver = config.receiver_config();

    assert_eq!(receiver.capacity, None);
    assert_eq!(receiver.completion_time, Some(Time::new(5.0)));
    assert_eq!(receiver.priority, 0);
    assert!(!receiver.producer && !receiver.consumer);
}

#[test]
fn receiver_builder_starts_from_an_existing_config() {
    let base = DirectorConfig::default().receiver_config();
    let config = ReceiverConfig::builder()
        .priority(-2)
        .owner(ActorId(3))
        .build();
    assert_eq!(config.capacity, base.capacity);
    assert_eq!(config.owner, Some(ActorId(3)));

    let boundary = odf::ReceiverConfigBuilder::from_config(config.clone())
        .capacity(3)
        .consumer_boundary()
        .build();
    assert_eq!(boundary.capacity, Some(3));
    assert_eq!(boundary.priority, -2);
    assert!(boundary.consumer);
    assert!(!boundary.producer);
}
