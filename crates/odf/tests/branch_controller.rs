use std::sync::Arc;

use odf::{
    Block, BranchController, Director, DirectorConfig, Error, ReceiverConfig, RendezvousReceiver,
    Time, Token,
};

fn boundary_pair(
    director: &Arc<Director>,
) -> (Arc<RendezvousReceiver<u32>>, Arc<RendezvousReceiver<u32>>) {
    let producer = RendezvousReceiver::new(
        director,
        ReceiverConfig::builder().producer_boundary().build(),
    );
    let consumer = RendezvousReceiver::new(
        director,
        ReceiverConfig::builder().consumer_boundary().build(),
    );
    (producer, consumer)
}

#[test]
fn repeated_block_reports_count_once() {
    let director = Director::new(DirectorConfig::default());
    let controller = BranchController::new(&director);
    let (producer, consumer) = boundary_pair(&director);
    let branch = controller.add_branch(producer.clone(), consumer).unwrap();

    let block = Block::read(producer.id());
    branch.register_rcvr_blocked(block);
    branch.register_rcvr_blocked(block);
    assert!(branch.is_blocked());
    assert_eq!(controller.blocked_branches(), 1);
    assert_eq!(director.read_blocks(), 1);

    branch.register_rcvr_unblocked();
    branch.register_rcvr_unblocked();
    assert!(!branch.is_blocked());
    assert_eq!(controller.blocked_branches(), 0);
    assert_eq!(director.read_blocks(), 0);
}

#[test]
fn controller_is_blocked_when_every_active_branch_is() {
    let director = Director::new(DirectorConfig::default());
    let controller = BranchController::new(&director);
    let (producer, consumer) = boundary_pair(&director);
    let branch = controller.add_branch(producer, consumer.clone()).unwrap();
    assert!(!controller.is_blocked());

    branch.set_active(true);
    assert_eq!(controller.active_branches(), 1);
    branch.register_rcvr_blocked(Block::write(consumer.id(), Time::new(2.0)));
    assert!(controller.is_blocked());
    assert_eq!(director.write_blocks(), 1);

    branch.register_rcvr_unblocked();
    controller.deactivate_branches();
    assert_eq!(controller.active_branches(), 0);
    assert!(!controller.is_blocked());
}

#[test]
fn branch_requires_boundary_receivers() {
    let director = Director::new(DirectorConfig::default());
    let controller = BranchController::new(&director);
    let (producer, consumer) = boundary_pair(&director);
    let plain = RendezvousReceiver::new(&director, ReceiverConfig::default());

    assert!(matches!(
        controller.add_branch(plain.clone(), consumer.clone()),
        Err(Error::InvalidAction(_))
    ));
    assert!(matches!(
        controller.add_branch(producer.clone(), plain),
        Err(Error::InvalidAction(_))
    ));

    let both = RendezvousReceiver::<u32>::new(
        &director,
        ReceiverConfig::builder()
            .producer_boundary()
            .consumer_boundary()
            .build(),
    );
    assert!(matches!(
        controller.add_branch(both.clone(), both),
        Err(Error::InvalidAction(_))
    ));
    assert!(controller.branches().is_empty());
}

#[test]
fn transfer_keeps_time_stamp_and_forwards_finish() {
    let director = Director::new(DirectorConfig::default());
    let controller = BranchController::new(&director);
    let (producer, consumer) = boundary_pair(&director);
    let branch = controller
        .add_branch(producer.clone(), consumer.clone())
        .unwrap();
    branch.set_active(true);

    producer.put(Token::Data(7), Time::new(3.5)).unwrap();
    assert_eq!(branch.transfer_token(), Ok(true));
    let moved = consumer.get().unwrap();
    assert_eq!(moved.token, Token::Data(7));
    assert_eq!(moved.time, Time::new(3.5));

    producer.put_null(Time::new(4.0)).unwrap();
    assert_eq!(branch.transfer_token(), Ok(true));
    assert_eq!(consumer.len(), 1);
    assert_eq!(consumer.rcvr_time(), Time::new(4.0));
    consumer.reset();

    producer.finish_producer();
    assert_eq!(branch.transfer_token(), Ok(false));
    assert!(!branch.is_active());
    assert_eq!(consumer.rcvr_time(), Time::Inactive);
}

#[test]
fn activated_branches_drain_and_join() {
    let director = Director::new(DirectorConfig::builder().name("boundary").build());
    let controller = BranchController::new(&director);
    let (producer, consumer) = boundary_pair(&director);
    controller.add_branch(producer.clone(), consumer.clone()).unwrap();

    controller.activate_branches().unwrap();
    for (value, time) in [(1, 1.0), (2, 2.0)] {
        producer.put(Token::Data(value), Time::new(time)).unwrap();
        assert_eq!(consumer.has_token(), Ok(true));
        let moved = consumer.get().unwrap();
        assert_eq!(moved.token, Token::Data(value));
    }
    producer.finish_producer();

    assert_eq!(controller.join(), 0);
    assert_eq!(controller.active_branches(), 0);
    assert_eq!(director.active_processes(), 0);
    assert!(director.wrapup().is_ok());
}
