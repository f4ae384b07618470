// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::DEFAULT_MAX_IDLE_PER_DESTINATION;
use crate::errors::TaskFailure;
use crate::observability::messages::pool::{
    HandleCreated, HandleCreationFailed, HandleDestroyFailed, ResourcePoolShutdown,
};
use crate::observability::messages::StructuredLog;
use crate::traits::{Destination, HandleFactory, Stage};
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// An exclusively owned handle for one destination.
///
/// Not `Clone`: whoever holds it is the only user until it goes back through
/// [`ResourcePool::release`].
pub struct PooledHandle {
    id: u64,
    destination: Destination,
    stage: Arc<dyn Stage>,
}

impl PooledHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn stage(&self) -> &Arc<dyn Stage> {
        &self.stage
    }
}

impl fmt::Debug for PooledHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledHandle")
            .field("id", &self.id)
            .field("destination", &self.destination)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub acquired: u64,
    pub released: u64,
    pub created: u64,
    pub destroyed: u64,
}

impl PoolStats {
    /// Handles currently checked out.
    pub fn outstanding(&self) -> u64 {
        self.acquired.saturating_sub(self.released)
    }
}

#[derive(Default)]
struct Counters {
    acquired: AtomicU64,
    released: AtomicU64,
    created: AtomicU64,
    destroyed: AtomicU64,
}

/// Keyed pool of destination handles shared by every branch of the engine.
///
/// Each destination key has its own idle list inside a `DashMap`, so acquire
/// and release only contend on the shard holding that key.
pub struct ResourcePool {
    factory: Arc<dyn HandleFactory>,
    idle: DashMap<String, Vec<PooledHandle>>,
    max_idle_per_destination: usize,
    next_id: AtomicU64,
    counters: Counters,
    stopped: AtomicBool,
}

impl ResourcePool {
    pub fn new(factory: Arc<dyn HandleFactory>) -> Self {
        Self::with_max_idle(factory, DEFAULT_MAX_IDLE_PER_DESTINATION)
    }

    pub fn with_max_idle(factory: Arc<dyn HandleFactory>, max_idle_per_destination: usize) -> Self {
        Self {
            factory,
            idle: DashMap::new(),
            max_idle_per_destination,
            next_id: AtomicU64::new(1),
            counters: Counters::default(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Take an idle handle for `destination` or create a new one.
    pub fn acquire(&self, destination: &Destination) -> Result<PooledHandle, TaskFailure> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(TaskFailure::shutdown(format!(
                "resource pool stopped, cannot acquire '{}'",
                destination
            )));
        }

        let reused = self
            .idle
            .get_mut(destination.key())
            .and_then(|mut handles| handles.pop());

        let handle = match reused {
            Some(handle) => handle,
            None => self.create(destination)?,
        };
        self.counters.acquired.fetch_add(1, Ordering::Relaxed);
        Ok(handle)
    }

    /// Return a handle. Destroys it instead when the idle list is full or the
    /// pool is stopped.
    pub fn release(&self, handle: PooledHandle) {
        self.counters.released.fetch_add(1, Ordering::Relaxed);

        if self.stopped.load(Ordering::Acquire) {
            self.destroy(handle);
            return;
        }

        let evicted = {
            let mut handles = self
                .idle
                .entry(handle.destination.key().to_string())
                .or_default();
            if handles.len() >= self.max_idle_per_destination {
                vec![handle]
            } else {
                handles.push(handle);
                // A shutdown that ran between the check above and the push
                // has already swept this key; whatever is here now is ours.
                if self.stopped.load(Ordering::SeqCst) {
                    std::mem::take(&mut *handles)
                } else {
                    Vec::new()
                }
            }
        };

        evicted.into_iter().for_each(|handle| self.destroy(handle));
    }

    pub fn idle_count(&self, key: &str) -> usize {
        self.idle.get(key).map_or(0, |handles| handles.len())
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            acquired: self.counters.acquired.load(Ordering::Relaxed),
            released: self.counters.released.load(Ordering::Relaxed),
            created: self.counters.created.load(Ordering::Relaxed),
            destroyed: self.counters.destroyed.load(Ordering::Relaxed),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Refuse further acquisitions and destroy every idle handle. Handles
    /// still checked out are destroyed when released.
    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::SeqCst);

        let keys: Vec<String> = self.idle.iter().map(|entry| entry.key().clone()).collect();
        let mut destroyed = 0;
        for key in keys {
            if let Some((_, handles)) = self.idle.remove(&key) {
                destroyed += handles.len();
                handles.into_iter().for_each(|handle| self.destroy(handle));
            }
        }
        ResourcePoolShutdown { destroyed }.log();
    }

    fn create(&self, destination: &Destination) -> Result<PooledHandle, TaskFailure> {
        let stage = self.factory.create_handle(destination).map_err(|err| {
            HandleCreationFailed {
                destination: destination.key(),
                error: &format!("{:#}", err),
            }
            .log();
            TaskFailure::resource_creation(destination.key(), err)
        })?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.counters.created.fetch_add(1, Ordering::Relaxed);
        HandleCreated {
            destination: destination.key(),
            handle_id: id,
        }
        .log();

        Ok(PooledHandle {
            id,
            destination: destination.clone(),
            stage,
        })
    }

    fn destroy(&self, handle: PooledHandle) {
        if let Err(err) = self.factory.destroy_handle(&handle.destination, &handle.stage) {
            HandleDestroyFailed {
                destination: handle.destination.key(),
                handle_id: handle.id,
                error: &format!("{:#}", err),
            }
            .log();
        }
        self.counters.destroyed.fetch_add(1, Ordering::Relaxed);
    }
}
