//! Location provider backed by configured coordinates.
//!
//! Hosts without a positioning device report a fixed position. Each
//! subscription runs its own interval task; unsubscribing aborts it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use alarm_core::prelude::*;
use alarm_core::LocationFix;

use crate::config::LocationSettings;
use crate::ports::{FixCallback, LocationProvider, SubscriptionHandle};

#[derive(Debug)]
pub struct ConfiguredLocationProvider {
    fix: Option<LocationFix>,
    period: Duration,
    runtime: Handle,
    next_id: AtomicU64,
    tasks: Mutex<HashMap<u64, JoinHandle<()>>>,
}

impl ConfiguredLocationProvider {
    /// Must be called inside a tokio runtime.
    pub fn new(settings: &LocationSettings) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::capability_unavailable(format!("location runtime: {e}")))?;

        let fix = match (settings.enabled, settings.latitude, settings.longitude) {
            (true, Some(latitude), Some(longitude)) => Some(LocationFix::new(latitude, longitude)),
            _ => None,
        };

        Ok(Self {
            fix,
            period: settings.period(),
            runtime,
            next_id: AtomicU64::new(1),
            tasks: Mutex::new(HashMap::new()),
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl LocationProvider for ConfiguredLocationProvider {
    fn is_available(&self) -> bool {
        self.fix.is_some()
    }

    fn subscribe(&self, on_fix: FixCallback) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let handle = SubscriptionHandle(id);

        let Some(fix) = self.fix else {
            warn!("Location subscription {} without a configured position", id);
            return handle;
        };

        let period = self.period;
        let task = self.runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                on_fix(fix);
            }
        });

        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, task);
        handle
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        if let Some(task) = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&handle.0)
        {
            task.abort();
        }
    }
}

impl Drop for ConfiguredLocationProvider {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(|e| e.into_inner());
        for (_, task) in tasks.drain() {
            task.abort();
        }
    }
}
