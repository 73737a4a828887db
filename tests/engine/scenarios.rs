//! End-to-end scenarios against a mock bus

use crate::common::*;
use lightbus::{
    AdapterId, BusError, ClientId, Error, JobQueue, JobStatus, Message, ProtocolTag, QueueState,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

#[test]
fn mid_chain_write_failure_reports_once_and_frees_every_node() {
    let bus = MockBus::i2c();
    bus.fail_nth_write(1, BusError::Nack { address: 0x27 });
    let dispatcher = dispatcher_with(&bus);
    let client = dispatcher.register(ClientId::i2c(3, 0x27), 4).unwrap();

    let sink = outcomes();
    dispatcher
        .transfer_async(
            &client,
            &[tagged_write(0x10), tagged_write(0x11), tagged_write(0x12)],
            collect_into(&sink),
        )
        .unwrap();
    dispatcher.drain(&client).unwrap();

    let delivered = sink.lock();
    assert_eq!(delivered.len(), 1, "completion must fire exactly once");
    match &delivered[0] {
        Err(Error::Protocol {
            index,
            message,
            source,
        }) => {
            assert_eq!(*index, 1);
            assert_eq!(message.command, 0x11);
            assert_eq!(*source, BusError::Nack { address: 0x27 });
            assert_eq!(delivered[0].as_ref().unwrap_err().code(), -6);
        }
        other => panic!("expected protocol failure, got {:?}", other.as_ref().map(|m| m.len())),
    }

    // The third message never reached the bus
    assert_eq!(bus.commands(), vec![0x10, 0x11]);

    let stats = dispatcher
        .adapter_stats(ProtocolTag::I2c, AdapterId(3))
        .unwrap();
    assert_eq!(stats.pool.allocs, 3);
    assert_eq!(stats.pool.frees, 3);
    assert_eq!(stats.pool.in_use, 0);
    assert_eq!(stats.pool.idle, 4);
    assert_eq!(stats.counters.failed_chains, 1);
    assert_eq!(stats.counters.free_mismatches, 0);
}

#[test]
fn sync_caller_waits_for_in_flight_async_job() {
    let bus = MockBus::i2c();
    let dispatcher = dispatcher_with(&bus);
    let client = dispatcher.register(ClientId::i2c(1, 0x40), 4).unwrap();

    // Park the async job inside the bus
    bus.close_gate();
    let first = dispatcher.submit(&client, &[tagged_write(0xA0)]).unwrap();
    assert!(wait_until(|| bus.waiting_at_gate() == 1));

    let sync_done = AtomicBool::new(false);
    thread::scope(|s| {
        let worker = s.spawn(|| {
            let mut msgs = [tagged_write(0xB0)];
            dispatcher.transfer(&client, &mut msgs).unwrap();
            sync_done.store(true, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(50));
        assert!(
            !sync_done.load(Ordering::SeqCst),
            "sync transfer returned while the async job held the bus"
        );
        let stats = dispatcher
            .adapter_stats(ProtocolTag::I2c, AdapterId(1))
            .unwrap();
        assert_eq!(stats.queue.pause_holders, 1);
        assert_eq!(stats.queue.state, QueueState::Running);

        // Queued behind the pause; must not run before the sync transfer
        let later = dispatcher.submit(&client, &[tagged_write(0xC0)]).unwrap();

        bus.open_gate();
        worker.join().unwrap();
        assert!(first.is_complete());
        assert!(later.wait().is_ok());
    });

    assert_eq!(bus.commands(), vec![0xA0, 0xB0, 0xC0]);
    assert_eq!(bus.max_in_flight(), 1);
}

#[test]
fn queue_pause_blocks_until_running_job_finishes() {
    let queue = JobQueue::new("scenario", 4).unwrap();
    let started = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));
    let log = Arc::new(Mutex::new(Vec::new()));

    let (s, r, l) = (Arc::clone(&started), Arc::clone(&release), Arc::clone(&log));
    queue
        .submit(move |_| {
            s.wait();
            r.wait();
            l.lock().push("job-b");
        })
        .unwrap();
    let l = Arc::clone(&log);
    queue.submit(move |_| l.lock().push("job-c")).unwrap();

    started.wait();
    thread::scope(|scope| {
        let pauser = scope.spawn(|| {
            queue.pause().unwrap();
            log.lock().push("paused");
        });

        thread::sleep(Duration::from_millis(30));
        assert!(log.lock().is_empty(), "pause returned mid-job");
        release.wait();
        pauser.join().unwrap();
    });

    assert_eq!(queue.state(), QueueState::Paused);
    assert_eq!(*log.lock(), vec!["job-b", "paused"]);

    queue.resume().unwrap();
    queue.drain().unwrap();
    assert_eq!(*log.lock(), vec!["job-b", "paused", "job-c"]);
}

#[test]
fn completion_status_for_cancelled_queue_jobs() {
    let queue = JobQueue::new("cancel-status", 4).unwrap();
    queue.pause().unwrap();

    let statuses = Arc::new(Mutex::new(Vec::new()));
    for _ in 0..5 {
        let s = Arc::clone(&statuses);
        queue.submit(move |status| s.lock().push(status)).unwrap();
    }
    queue.destroy();

    assert_eq!(*statuses.lock(), vec![JobStatus::Cancelled; 5]);
    let _ = queue.resume();
}

#[test]
fn reads_come_back_through_completion() {
    let bus = MockBus::i2c();
    let dispatcher = dispatcher_with(&bus);
    let client = dispatcher.register(ClientId::i2c(2, 0x50), 2).unwrap();

    let pending = dispatcher
        .submit(
            &client,
            &[Message::write_byte_data(0x00, 0x01), Message::read_block(0x20, 4)],
        )
        .unwrap();
    let messages = pending.wait().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].data.as_slice(), &[0x20, 0x21, 0x22, 0x23]);
}
