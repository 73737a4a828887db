//! Shared test utilities for the workspace integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's
//! main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use lightbus::{
    AdapterId, BusError, BusProtocol, BusResult, ClientHandle, ClientId, Direction, Dispatcher,
    DispatcherConfig, Message, ProtocolTag, Result,
};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

// ============================================================================
// Logging
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Route `tracing` output through the test harness writer
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

// ============================================================================
// MockBus - scripted protocol
// ============================================================================

/// One recorded bus operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusOp {
    pub client: ClientId,
    pub direction: Direction,
    pub command: u8,
    pub data: Vec<u8>,
}

#[derive(Default)]
struct MockState {
    ops: Vec<BusOp>,
    writes: usize,
    in_flight: usize,
    max_in_flight: usize,
    attached: Vec<AdapterId>,
    detached: Vec<AdapterId>,
    lifecycle: Vec<String>,
}

/// Gate that holds bus operations until opened
#[derive(Default)]
struct Gate {
    closed: Mutex<bool>,
    opened: Condvar,
    waiting: AtomicUsize,
}

/// Protocol double: records every operation, can fail the N-th write,
/// can slow down or hold operations, and tracks concurrent entries.
pub struct MockBus {
    tag: ProtocolTag,
    state: Mutex<MockState>,
    fail_writes: Mutex<Vec<(usize, BusError)>>,
    delay: Mutex<Duration>,
    gate: Gate,
}

impl MockBus {
    pub fn new(tag: ProtocolTag) -> Arc<Self> {
        Arc::new(Self {
            tag,
            state: Mutex::new(MockState::default()),
            fail_writes: Mutex::new(Vec::new()),
            delay: Mutex::new(Duration::ZERO),
            gate: Gate::default(),
        })
    }

    pub fn i2c() -> Arc<Self> {
        Self::new(ProtocolTag::I2c)
    }

    /// Fail the write with 0-based index `n` (counted across all clients)
    pub fn fail_nth_write(&self, n: usize, error: BusError) {
        self.fail_writes.lock().push((n, error));
    }

    /// Every operation takes `delay`
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Hold every operation until `open_gate`
    pub fn close_gate(&self) {
        *self.gate.closed.lock() = true;
    }

    pub fn open_gate(&self) {
        *self.gate.closed.lock() = false;
        self.gate.opened.notify_all();
    }

    /// Operations currently parked at the gate
    pub fn waiting_at_gate(&self) -> usize {
        self.gate.waiting.load(Ordering::SeqCst)
    }

    pub fn ops(&self) -> Vec<BusOp> {
        self.state.lock().ops.clone()
    }

    pub fn op_count(&self) -> usize {
        self.state.lock().ops.len()
    }

    pub fn commands(&self) -> Vec<u8> {
        self.state.lock().ops.iter().map(|op| op.command).collect()
    }

    /// Highest number of operations ever inside the bus at once
    pub fn max_in_flight(&self) -> usize {
        self.state.lock().max_in_flight
    }

    pub fn attached(&self) -> Vec<AdapterId> {
        self.state.lock().attached.clone()
    }

    pub fn detached(&self) -> Vec<AdapterId> {
        self.state.lock().detached.clone()
    }

    /// Attach and detach calls in order, e.g. `"attach 1"`
    pub fn lifecycle(&self) -> Vec<String> {
        self.state.lock().lifecycle.clone()
    }

    fn enter(&self) {
        {
            let mut closed = self.gate.closed.lock();
            if *closed {
                self.gate.waiting.fetch_add(1, Ordering::SeqCst);
                while *closed {
                    self.gate.opened.wait(&mut closed);
                }
                self.gate.waiting.fetch_sub(1, Ordering::SeqCst);
            }
        }
        {
            let mut state = self.state.lock();
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
        }
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }

    fn leave(&self, op: BusOp) {
        let mut state = self.state.lock();
        state.in_flight -= 1;
        state.ops.push(op);
    }
}

impl BusProtocol for MockBus {
    fn tag(&self) -> ProtocolTag {
        self.tag
    }

    fn read(&self, client: &ClientId, message: &mut Message) -> BusResult<()> {
        self.enter();
        let command = message.command;
        message
            .data
            .iter_mut()
            .enumerate()
            .for_each(|(i, b)| *b = command.wrapping_add(i as u8));
        self.leave(BusOp {
            client: *client,
            direction: Direction::Read,
            command,
            data: message.data.to_vec(),
        });
        Ok(())
    }

    fn write(&self, client: &ClientId, message: &Message) -> BusResult<()> {
        self.enter();
        let index = {
            let mut state = self.state.lock();
            let index = state.writes;
            state.writes += 1;
            index
        };
        self.leave(BusOp {
            client: *client,
            direction: Direction::Write,
            command: message.command,
            data: message.data.to_vec(),
        });
        let fail = self
            .fail_writes
            .lock()
            .iter()
            .find(|(n, _)| *n == index)
            .map(|(_, e)| e.clone());
        match fail {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn attach(&self, adapter: AdapterId) -> BusResult<()> {
        let mut state = self.state.lock();
        state.attached.push(adapter);
        state.lifecycle.push(format!("attach {}", adapter.0));
        Ok(())
    }

    fn detach(&self, adapter: AdapterId) {
        let mut state = self.state.lock();
        state.detached.push(adapter);
        state.lifecycle.push(format!("detach {}", adapter.0));
    }
}

// ============================================================================
// Dispatcher helpers
// ============================================================================

/// Dispatcher over one mock bus with default configuration
pub fn dispatcher_with(bus: &Arc<MockBus>) -> Dispatcher {
    dispatcher_with_config(bus, DispatcherConfig::default())
}

pub fn dispatcher_with_config(bus: &Arc<MockBus>, config: DispatcherConfig) -> Dispatcher {
    init_tracing();
    let protocol: Arc<dyn BusProtocol> = bus.clone();
    Dispatcher::builder()
        .protocol(protocol)
        .config(config)
        .build()
        .expect("dispatcher builds")
}

/// Completion outcomes collected in delivery order
pub type Outcomes = Arc<Mutex<Vec<Result<Vec<Message>>>>>;

pub fn outcomes() -> Outcomes {
    Arc::new(Mutex::new(Vec::new()))
}

/// Completion that appends its outcome to `sink`
pub fn collect_into(sink: &Outcomes) -> impl FnOnce(Result<Vec<Message>>) + Send + 'static {
    let sink = Arc::clone(sink);
    move |outcome| sink.lock().push(outcome)
}

/// Poll until `cond` holds or two seconds pass
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// A write whose command byte identifies it
pub fn tagged_write(tag: u8) -> Message {
    Message::write_byte_data(tag, tag)
}
