//! Every chain of M messages takes M nodes and gives back M nodes

use crate::common::*;
use lightbus::{AdapterId, BusError, ClientId, DispatcherConfig, Error, ProtocolTag};
use std::time::Duration;

#[test]
fn node_accounting_balances_across_success_and_failure() {
    let bus = MockBus::i2c();
    // Writes 3 and 9 fail, landing mid-chain in two different chains
    bus.fail_nth_write(3, BusError::Timeout);
    bus.fail_nth_write(9, BusError::ArbitrationLost);
    let dispatcher = dispatcher_with(&bus);
    let client = dispatcher.register(ClientId::i2c(4, 0x22), 3).unwrap();

    let sink = outcomes();
    let lengths = [1usize, 4, 2, 5, 3];
    for (c, &len) in lengths.iter().enumerate() {
        let chain: Vec<_> = (0..len).map(|i| tagged_write((c * 16 + i) as u8)).collect();
        dispatcher
            .transfer_async(&client, &chain, collect_into(&sink))
            .unwrap();
    }
    dispatcher.drain(&client).unwrap();

    let delivered = sink.lock();
    assert_eq!(delivered.len(), lengths.len());
    let failures: Vec<usize> = delivered
        .iter()
        .filter_map(|o| o.as_ref().err().and_then(Error::failed_index))
        .collect();
    // Write 3 is chain 1 index 2. Chain 1 skips its last message, so write 9
    // is chain 3 index 3.
    assert_eq!(failures, vec![2, 3]);

    let stats = dispatcher
        .adapter_stats(ProtocolTag::I2c, AdapterId(4))
        .unwrap();
    let total: usize = lengths.iter().sum();
    assert_eq!(stats.pool.allocs as usize, total);
    assert_eq!(stats.pool.frees as usize, total);
    assert_eq!(stats.pool.in_use, 0);
    assert_eq!(stats.pool.double_frees, 0);
    assert_eq!(stats.pool.corruptions, 0);
    assert_eq!(stats.counters.completed_chains, 3);
    assert_eq!(stats.counters.failed_chains, 2);
    assert_eq!(stats.counters.free_mismatches, 0);
}

#[test]
fn pool_grows_past_reservation_and_reaper_trims_it_back() {
    let bus = MockBus::i2c();
    let config = DispatcherConfig::default()
        .with_reap_ttl(Duration::from_millis(20))
        .with_reap_interval(Duration::from_millis(10));
    let dispatcher = dispatcher_with_config(&bus, config);
    let client = dispatcher.register(ClientId::i2c(5, 0x22), 2).unwrap();

    // Hold the worker so chains pile up beyond the reservation
    bus.close_gate();
    let first = dispatcher.submit(&client, &[tagged_write(0)]).unwrap();
    assert!(wait_until(|| bus.waiting_at_gate() == 1));
    let rest: Vec<_> = (1..6)
        .map(|i| dispatcher.submit(&client, &[tagged_write(i)]).unwrap())
        .collect();

    let grown = dispatcher
        .adapter_stats(ProtocolTag::I2c, AdapterId(5))
        .unwrap();
    assert_eq!(grown.pool.in_use, 6);
    assert_eq!(grown.pool.total, 6);

    bus.open_gate();
    assert!(first.wait().is_ok());
    for pending in rest {
        assert!(pending.wait().is_ok());
    }

    assert!(wait_until(|| {
        dispatcher
            .adapter_stats(ProtocolTag::I2c, AdapterId(5))
            .map_or(false, |s| s.pool.total == 2)
    }));
    let trimmed = dispatcher
        .adapter_stats(ProtocolTag::I2c, AdapterId(5))
        .unwrap();
    assert_eq!(trimmed.pool.idle, 2);
    assert_eq!(trimmed.pool.reaped, 4);
}

#[test]
fn sync_path_uses_no_pool_nodes() {
    let bus = MockBus::i2c();
    let dispatcher = dispatcher_with(&bus);
    let client = dispatcher.register(ClientId::i2c(6, 0x22), 2).unwrap();

    for i in 0..10u8 {
        let mut msgs = [tagged_write(i), lightbus::Message::read_byte_data(i)];
        dispatcher.transfer(&client, &mut msgs).unwrap();
        assert_eq!(msgs[1].byte(), Some(i));
    }

    let stats = dispatcher
        .adapter_stats(ProtocolTag::I2c, AdapterId(6))
        .unwrap();
    assert_eq!(stats.pool.allocs, 0);
    assert_eq!(stats.counters.sync_transfers, 10);
    assert_eq!(bus.op_count(), 20);
}
