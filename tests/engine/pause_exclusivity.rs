//! Synchronous transfers and queued chains never overlap on one adapter

use crate::common::*;
use lightbus::{AdapterId, ClientId, Error, Message, ProtocolTag, QueueState};
use std::thread;
use std::time::Duration;

#[test]
fn sync_and_async_traffic_never_overlap() {
    let bus = MockBus::i2c();
    bus.set_delay(Duration::from_micros(200));
    let dispatcher = dispatcher_with(&bus);
    let client = dispatcher.register(ClientId::i2c(1, 0x30), 4).unwrap();

    let sink = outcomes();
    thread::scope(|s| {
        for t in 0..4u8 {
            let dispatcher = &dispatcher;
            let client = &client;
            let sink = &sink;
            s.spawn(move || {
                for i in 0..10u8 {
                    if (t + i) % 2 == 0 {
                        let mut msgs = [tagged_write(i), Message::read_byte_data(i)];
                        dispatcher.transfer(client, &mut msgs).unwrap();
                    } else {
                        dispatcher
                            .transfer_async(client, &[tagged_write(i)], collect_into(sink))
                            .unwrap();
                    }
                }
            });
        }
    });
    dispatcher.drain(&client).unwrap();

    assert_eq!(bus.max_in_flight(), 1);
    let delivered = sink.lock();
    assert_eq!(delivered.len(), 20);
    assert!(delivered.iter().all(|o| o.is_ok()));

    let stats = dispatcher
        .adapter_stats(ProtocolTag::I2c, AdapterId(1))
        .unwrap();
    assert_eq!(stats.counters.sync_transfers, 20);
    assert_eq!(stats.counters.completed_chains, 20);
    assert_eq!(stats.queue.pause_holders, 0);
    assert_eq!(stats.queue.state, QueueState::Idle);
    assert_eq!(bus.op_count(), 20 * 2 + 20);
}

#[test]
fn sync_transfer_holds_queue_until_it_returns() {
    let bus = MockBus::i2c();
    let dispatcher = dispatcher_with(&bus);
    let client = dispatcher.register(ClientId::i2c(2, 0x30), 2).unwrap();

    bus.close_gate();
    thread::scope(|s| {
        let sync = s.spawn(|| {
            let mut msgs = [tagged_write(0x01)];
            dispatcher.transfer(&client, &mut msgs)
        });
        assert!(wait_until(|| bus.waiting_at_gate() == 1));

        // The queue is paused on behalf of the sync caller
        let stats = dispatcher
            .adapter_stats(ProtocolTag::I2c, AdapterId(2))
            .unwrap();
        assert_eq!(stats.queue.state, QueueState::Paused);
        assert_eq!(stats.queue.pause_holders, 1);

        let queued = dispatcher.submit(&client, &[tagged_write(0x02)]).unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(!queued.is_complete());

        bus.open_gate();
        sync.join().unwrap().unwrap();
        queued.wait().unwrap();
    });

    assert_eq!(bus.commands(), vec![0x01, 0x02]);
}

#[test]
fn sync_transfer_from_completion_is_refused() {
    let bus = MockBus::i2c();
    let dispatcher = dispatcher_with(&bus);
    let client = dispatcher.register(ClientId::i2c(3, 0x30), 2).unwrap();

    let inner = outcomes();
    let (d, c, sink) = (dispatcher.clone(), client.client(), inner.clone());
    let nested = dispatcher.register(c, 1).unwrap();
    dispatcher
        .transfer_async(&client, &[tagged_write(0x01)], move |_| {
            let mut msgs = [tagged_write(0x02)];
            sink.lock().push(d.transfer(&nested, &mut msgs).map(|_| Vec::new()));
        })
        .unwrap();
    dispatcher.drain(&client).unwrap();

    let delivered = inner.lock();
    assert_eq!(delivered.len(), 1);
    assert!(matches!(delivered[0], Err(Error::Queue(_))));
    assert_eq!(bus.commands(), vec![0x01]);
}

#[test]
fn drain_from_completion_is_refused_and_worker_keeps_going() {
    let bus = MockBus::i2c();
    let dispatcher = dispatcher_with(&bus);
    let client = dispatcher.register(ClientId::i2c(4, 0x30), 2).unwrap();

    let inner = outcomes();
    let (d, sink) = (dispatcher.clone(), inner.clone());
    let nested = dispatcher.register(client.client(), 1).unwrap();
    dispatcher
        .transfer_async(&client, &[tagged_write(0x01)], move |_| {
            sink.lock().push(d.drain(&nested).map(|_| Vec::new()));
        })
        .unwrap();

    // A later chain still runs once the completion returns
    let later = dispatcher.submit(&client, &[tagged_write(0x02)]).unwrap();
    match later.wait_timeout(Duration::from_secs(5)) {
        Ok(outcome) => assert!(outcome.is_ok()),
        Err(_) => panic!("worker stalled after drain from completion"),
    }
    dispatcher.drain(&client).unwrap();

    let delivered = inner.lock();
    assert_eq!(delivered.len(), 1);
    assert!(matches!(delivered[0], Err(Error::Queue(_))));
    assert_eq!(bus.commands(), vec![0x01, 0x02]);
}
