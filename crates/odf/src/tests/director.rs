use std::thread;
use std::time::Duration;

use odf_spy::records::block;
use odf_spy::{decode_frame, MemoryBackend, SpyConfig, Tracer};

use super::wait_until;
use crate::director::{DeadlockResolution, Director, DirectorConfig};
use crate::error::Error;
use crate::process::ActorId;
use crate::receiver::{ReceiverConfig, ReceiverId, RendezvousReceiver};
use crate::sync::Arc;
use crate::time::Time;
use crate::time_keeper::TimeKeeper;
use crate::token::Token;

const DEADLOCK_TIMEOUT: Duration = Duration::from_secs(5);

fn owned_by(actor: u16) -> ReceiverConfig {
    ReceiverConfig::builder()
        .capacity(1)
        .owner(ActorId(actor))
        .build()
}

#[test]
fn artificial_deadlock_releases_earliest_writer_only() {
    let director = Director::new(DirectorConfig::default());
    let r1 = RendezvousReceiver::<u32>::new(&director, owned_by(1));
    let r2 = RendezvousReceiver::<u32>::new(&director, owned_by(2));
    r1.put(Token::Data(0), Time::new(1.0)).unwrap();
    r2.put(Token::Data(0), Time::new(1.0)).unwrap();

    let writer = |rcvr: &Arc<RendezvousReceiver<u32>>, time: f64| {
        let rcvr = Arc::clone(rcvr);
        let director = Arc::clone(&director);
        director.add_active_process();
        thread::spawn(move || {
            let result = rcvr.put(Token::Data(1), Time::new(time));
            director.remove_active_process();
            result
        })
    };
    let w1 = writer(&r1, 7.5);
    let w2 = writer(&r2, 9.0);

    assert!(director.wait_for_deadlock(DEADLOCK_TIMEOUT));
    assert_eq!(director.write_blocks(), 2);
    assert_eq!(
        director.resolve_deadlock(),
        DeadlockResolution::Advanced(Time::new(7.5))
    );

    assert_eq!(w1.join().unwrap(), Ok(Time::new(7.5)));
    assert_eq!(r1.capacity(), Some(2));
    assert!(r2.is_write_blocked());
    assert_eq!(director.current_time(), Time::new(7.5));
    assert_eq!(director.artificial_deadlocks(), 1);

    r2.request_finish();
    assert_eq!(w2.join().unwrap(), Err(Error::Terminated));
    assert_eq!(director.write_blocks(), 0);
    assert!(director.wrapup().is_ok());
}

#[test]
fn read_blocked_receiver_yields_to_sibling_head() {
    let director = Director::new(DirectorConfig::default());
    let keeper = Arc::new(TimeKeeper::new(ActorId(0)));
    let empty = RendezvousReceiver::<&str>::new(
        &director,
        ReceiverConfig::builder()
            .priority(10)
            .owner(ActorId(0))
            .build(),
    );
    let full = RendezvousReceiver::<&str>::new(&director, owned_by(0));
    empty.bind(&keeper).unwrap();
    full.bind(&keeper).unwrap();
    full.put(Token::Data("head"), Time::new(4.0)).unwrap();

    director.add_active_process();
    let reader = {
        let empty = Arc::clone(&empty);
        let full = Arc::clone(&full);
        thread::spawn(move || {
            let first = empty.has_token();
            let second = full.has_token();
            (first, second, full.get().map(|timed| timed.token))
        })
    };

    assert!(director.wait_for_deadlock(DEADLOCK_TIMEOUT));
    assert_eq!(
        director.resolve_deadlock(),
        DeadlockResolution::Advanced(Time::new(4.0))
    );
    let (first, second, token) = reader.join().unwrap();
    assert_eq!(first, Ok(false));
    assert_eq!(second, Ok(true));
    assert_eq!(token, Ok(Token::Data("head")));
    assert_eq!(empty.rcvr_time(), Time::new(4.0));
    director.remove_active_process();
}

#[test]
fn token_on_sibling_wakes_reader_that_lost_the_head() {
    let director = Director::new(DirectorConfig::default());
    let keeper = Arc::new(TimeKeeper::new(ActorId(0)));
    let late = RendezvousReceiver::<&str>::new(
        &director,
        ReceiverConfig::builder()
            .capacity(1)
            .priority(10)
            .owner(ActorId(0))
            .build(),
    );
    let early = RendezvousReceiver::<&str>::new(&director, owned_by(0));
    late.bind(&keeper).unwrap();
    early.bind(&keeper).unwrap();
    early.put(Token::Data("early"), Time::new(5.0)).unwrap();

    director.add_active_process();
    let reader = {
        let late = Arc::clone(&late);
        let early = Arc::clone(&early);
        thread::spawn(move || {
            assert_eq!(late.has_token(), Ok(false));
            assert_eq!(early.has_token(), Ok(true));
            assert_eq!(early.get().map(|timed| timed.token), Ok(Token::Data("early")));
            let woken = early.has_token();
            let next = late.has_token().and_then(|_| late.get()).map(|timed| timed.token);
            (woken, next)
        })
    };

    assert!(director.wait_for_deadlock(DEADLOCK_TIMEOUT));
    assert_eq!(
        director.resolve_deadlock(),
        DeadlockResolution::Advanced(Time::new(5.0))
    );
    wait_until(|| early.is_read_blocked());

    late.put(Token::Data("late"), Time::new(5.0)).unwrap();
    let (woken, next) = reader.join().unwrap();
    assert_eq!(woken, Ok(false));
    assert_eq!(next, Ok(Token::Data("late")));
    assert_eq!(director.read_blocks(), 0);
    director.remove_active_process();
}

#[test]
fn real_deadlock_terminates_every_waiter() {
    let director = Director::new(DirectorConfig::default());
    let keeper = Arc::new(TimeKeeper::new(ActorId(0)));
    let rcvr = RendezvousReceiver::<u8>::new(&director, owned_by(0));
    rcvr.bind(&keeper).unwrap();

    director.add_active_process();
    let reader = {
        let rcvr = Arc::clone(&rcvr);
        thread::spawn(move || rcvr.has_token())
    };

    assert!(director.wait_for_deadlock(DEADLOCK_TIMEOUT));
    assert_eq!(director.resolve_deadlock(), DeadlockResolution::Terminated);
    assert_eq!(reader.join().unwrap(), Err(Error::Terminated));
    assert!(director.is_real_deadlock());
    assert_eq!(director.read_blocks(), 0);
    director.remove_active_process();
}

#[test]
fn supervise_returns_once_processes_end() {
    let director = Director::new(DirectorConfig::default());
    director.add_active_process();
    let worker = {
        let director = Arc::clone(&director);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            director.remove_active_process();
        })
    };

    director.supervise();
    assert_eq!(director.active_processes(), 0);
    worker.join().unwrap();
}

#[test]
fn deadlock_needs_an_active_process() {
    let director = Director::new(DirectorConfig::default());
    assert!(!director.is_deadlocked());

    director.add_active_process();
    director.add_read_block(ReceiverId(0));
    assert!(director.is_deadlocked());

    director.remove_read_block(ReceiverId(0));
    assert!(!director.is_deadlocked());
}

#[test]
fn wrapup_reports_unbalanced_blocks() {
    let director = Director::new(DirectorConfig::default());
    director.add_read_block(ReceiverId(3));
    director.add_write_block(ReceiverId(4), Time::new(1.0));
    director.remove_write_block(ReceiverId(4), Time::new(1.0));

    assert_eq!(
        director.wrapup(),
        Err(Error::UnbalancedBlocks { read: 1, write: 0 })
    );
}

#[test]
fn block_transitions_are_traced() {
    let backend = MemoryBackend::new();
    let handle = Tracer::new(SpyConfig::default(), backend.clone()).into_handle();
    let director = Director::with_trace_hook(DirectorConfig::default(), Some(handle.hook()));

    director.add_read_block(ReceiverId(7));
    director.remove_read_block(ReceiverId(7));

    let types: Vec<u8> = backend
        .frames()
        .iter()
        .map(|frame| decode_frame(frame, true).unwrap().record_type)
        .collect();
    assert_eq!(types, vec![block::READ, block::READ_RELEASE]);
}

#[test]
fn stop_request_finishes_registered_receivers() {
    let director = Director::new(DirectorConfig::default());
    let rcvr = RendezvousReceiver::<u8>::new(&director, ReceiverConfig::default());

    director.request_stop();
    assert!(director.is_stop_requested());
    assert!(rcvr.is_terminated());

    director.initialize();
    assert!(!director.is_stop_requested());
    assert_eq!(director.current_time(), Time::ZERO);
}
