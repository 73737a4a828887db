//! Idle-node reaper
//!
//! One thread per pool, started the first time the pool grows past its
//! minimum. It wakes every `reap_interval`, purges nodes idle for longer than
//! `reap_ttl`, and exits once the pool is back at its minimum, the pool is
//! being destroyed, or every handle to the pool is gone.

use crate::pool::{PoolInner, PoolLifecycle};
use std::io;
use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::debug;

pub(crate) fn spawn<T: Send + Default + 'static>(
    pool: Weak<PoolInner<T>>,
) -> io::Result<JoinHandle<()>> {
    let name = match pool.upgrade() {
        Some(inner) => format!("lightbus-reap-{}", inner.name),
        None => "lightbus-reap".to_string(),
    };
    thread::Builder::new()
        .name(name)
        .spawn(move || reap_loop(pool))
}

fn reap_loop<T: Default>(pool: Weak<PoolInner<T>>) {
    loop {
        let Some(inner) = pool.upgrade() else {
            return;
        };

        let mut state = inner.state.lock();
        if state.lifecycle == PoolLifecycle::Exiting {
            return;
        }
        inner
            .reaper_wake
            .wait_for(&mut state, inner.config.reap_interval);
        if state.lifecycle == PoolLifecycle::Exiting {
            return;
        }

        let removed = state.purge_expired(inner.config.reap_ttl, Instant::now());
        if removed > 0 {
            debug!(target: "lightbus::pool", pool = %inner.name, removed, total = state.total, "Reaped idle nodes");
        }

        if state.total <= state.min_count {
            state.lifecycle = PoolLifecycle::Idle;
            debug!(target: "lightbus::pool", pool = %inner.name, "Pool back at minimum, reaper stopping");
            return;
        }
    }
}
