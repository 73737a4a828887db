//! Teardown with work pending
//!
//! Closing an adapter with K chains queued delivers exactly K cancellations,
//! performs no bus operations for them, and returns every node to the pool.

use crate::common::*;
use lightbus::{
    ClientId, Dispatcher, Error, PoolConfig, PoolRegistry, TransactionJob,
};
use std::thread;
use std::time::Duration;

const K: usize = 6;

fn shared_registry_dispatcher(bus: &std::sync::Arc<MockBus>) -> (Dispatcher, PoolRegistry) {
    init_tracing();
    let registry = PoolRegistry::new();
    let protocol: std::sync::Arc<dyn lightbus::BusProtocol> = bus.clone();
    let dispatcher = Dispatcher::builder()
        .protocol(protocol)
        .pool_registry(registry.clone())
        .build()
        .unwrap();
    (dispatcher, registry)
}

#[test]
fn unregister_cancels_every_queued_chain() {
    let bus = MockBus::i2c();
    let (dispatcher, registry) = shared_registry_dispatcher(&bus);
    let client = dispatcher.register(ClientId::i2c(1, 0x10), 2).unwrap();

    // Second handle on the adapter's job pool so it outlives the context
    let pool = registry
        .create::<TransactionJob>("i2c-1-jobs", PoolConfig::new(0))
        .unwrap();

    bus.close_gate();
    let sink = outcomes();
    dispatcher
        .transfer_async(&client, &[tagged_write(0x01)], collect_into(&sink))
        .unwrap();
    assert!(wait_until(|| bus.waiting_at_gate() == 1));

    for i in 0..K {
        let chain: Vec<_> = (0..=i as u8).map(|n| tagged_write(0x80 + n)).collect();
        dispatcher
            .transfer_async(&client, &chain, collect_into(&sink))
            .unwrap();
    }

    thread::scope(|s| {
        let closer = s.spawn(|| client.unregister());
        assert!(wait_until(|| dispatcher.adapter_count() == 0));
        bus.open_gate();
        closer.join().unwrap();
    });

    let delivered = sink.lock();
    assert_eq!(delivered.len(), K + 1);
    assert!(delivered[0].is_ok());
    let cancelled = delivered[1..]
        .iter()
        .filter(|o| matches!(o, Err(Error::Cancelled)))
        .count();
    assert_eq!(cancelled, K);

    // Only the chain that was already running touched the bus
    assert_eq!(bus.commands(), vec![0x01]);
    assert_eq!(bus.detached().len(), 1);

    let stats = pool.stats();
    let nodes = 1 + (1..=K).sum::<usize>();
    assert_eq!(stats.allocs as usize, nodes);
    assert_eq!(stats.frees as usize, nodes);
    assert_eq!(stats.in_use, 0);
}

#[test]
fn promise_resolves_cancelled_on_teardown() {
    let bus = MockBus::i2c();
    let dispatcher = dispatcher_with(&bus);
    let client = dispatcher.register(ClientId::i2c(2, 0x10), 1).unwrap();

    bus.close_gate();
    let running = dispatcher.submit(&client, &[tagged_write(0x01)]).unwrap();
    assert!(wait_until(|| bus.waiting_at_gate() == 1));
    let queued = dispatcher.submit(&client, &[tagged_write(0x02)]).unwrap();

    thread::scope(|s| {
        let closer = s.spawn(|| dispatcher.unregister(client));
        assert!(wait_until(|| dispatcher.adapter_count() == 0));
        bus.open_gate();
        closer.join().unwrap();
    });

    assert!(running.wait().is_ok());
    let err = queued.wait().unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.code(), -125);
}

#[test]
fn adapter_reopens_after_teardown() {
    let bus = MockBus::i2c();
    let dispatcher = dispatcher_with(&bus);

    let first = dispatcher.register(ClientId::i2c(9, 0x10), 1).unwrap();
    first.unregister();
    assert_eq!(dispatcher.adapter_count(), 0);

    let second = dispatcher.register(ClientId::i2c(9, 0x10), 1).unwrap();
    let mut msgs = [tagged_write(0x33)];
    dispatcher.transfer(&second, &mut msgs).unwrap();

    assert_eq!(bus.attached().len(), 2);
    assert_eq!(bus.detached().len(), 1);
    assert_eq!(bus.commands(), vec![0x33]);
}

#[test]
fn reregister_waits_for_running_chain_and_detach() {
    let bus = MockBus::i2c();
    let dispatcher = dispatcher_with(&bus);
    let first = dispatcher.register(ClientId::i2c(4, 0x10), 2).unwrap();

    bus.close_gate();
    let running = dispatcher.submit(&first, &[tagged_write(0x01)]).unwrap();
    assert!(wait_until(|| bus.waiting_at_gate() == 1));

    thread::scope(|s| {
        let closer = s.spawn(|| first.unregister());
        assert!(wait_until(|| dispatcher.adapter_count() == 0));

        let reopener = s.spawn(|| {
            let second = dispatcher.register(ClientId::i2c(4, 0x11), 2).unwrap();
            let mut msgs = [tagged_write(0x02)];
            dispatcher.transfer(&second, &mut msgs).unwrap();
            second
        });

        // The old chain still holds the adapter; nothing new may attach
        thread::sleep(Duration::from_millis(50));
        assert_eq!(bus.attached().len(), 1);
        assert_eq!(bus.op_count(), 0);

        bus.open_gate();
        closer.join().unwrap();
        let second = reopener.join().unwrap();
        assert_eq!(dispatcher.adapter_count(), 1);
        second.unregister();
    });

    assert!(running.wait().is_ok());
    assert_eq!(bus.max_in_flight(), 1);
    assert_eq!(bus.commands(), vec![0x01, 0x02]);
    assert_eq!(
        bus.lifecycle(),
        vec!["attach 4", "detach 4", "attach 4", "detach 4"]
    );
    assert_eq!(dispatcher.adapter_count(), 0);
}
