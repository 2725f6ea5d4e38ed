//! Concurrent wrapper around [`UnitQueue`].
//!
//! The queue is the only mutable structure shared between the event
//! handlers and the placement workers, so its updates are serialized
//! behind one async mutex. Workers block on [`SharedUnitQueue::pop_wait`]
//! when no ready unit exists.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify};

use gangway_framework::group::PodGroup;
use gangway_framework::pod::QueuedPodInfo;
use gangway_framework::unit::SchedulingUnit;

use crate::unit_queue::{TimedOutUnit, UnitQueue};

/// A unit queue shared between workers and event handlers.
#[derive(Default)]
pub struct SharedUnitQueue {
    inner: Mutex<UnitQueue>,
    notify: Notify,
}

impl SharedUnitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_pod(&self, pod: QueuedPodInfo, now: DateTime<Utc>) {
        self.inner.lock().await.add_pod(pod, now);
        self.notify.notify_one();
    }

    pub async fn update_pod(&self, pod: QueuedPodInfo, now: DateTime<Utc>) {
        self.inner.lock().await.update_pod(pod, now);
        self.notify.notify_one();
    }

    pub async fn delete_pod(&self, uid: &str, now: DateTime<Utc>) {
        self.inner.lock().await.delete_pod(uid, now);
    }

    pub async fn add_group(&self, group: Arc<PodGroup>, now: DateTime<Utc>) {
        self.inner.lock().await.add_group(group, now);
        self.notify.notify_one();
    }

    pub async fn update_group(&self, group: Arc<PodGroup>, now: DateTime<Utc>) {
        self.inner.lock().await.update_group(group, now);
        self.notify.notify_one();
    }

    pub async fn delete_group(&self, namespace: &str, name: &str) -> Vec<QueuedPodInfo> {
        self.inner.lock().await.delete_group(namespace, name)
    }

    /// Pop the next ready unit without waiting.
    pub async fn try_pop(&self) -> Option<SchedulingUnit> {
        self.inner.lock().await.pop()
    }

    /// Pop the next ready unit, waiting until one exists.
    pub async fn pop_wait(&self) -> SchedulingUnit {
        loop {
            if let Some(unit) = self.inner.lock().await.pop() {
                return unit;
            }
            self.notify.notified().await;
        }
    }

    pub async fn requeue(
        &self,
        unit: SchedulingUnit,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.inner.lock().await.requeue(unit, reason, now);
        self.notify.notify_one();
    }

    pub async fn flush_timed_out(&self, now: DateTime<Utc>) -> Vec<TimedOutUnit> {
        self.inner.lock().await.flush_timed_out(now)
    }

    /// Release units whose retry backoff expired; wakes a worker when
    /// any became poppable.
    pub async fn flush_backoff(&self, now: DateTime<Utc>) -> usize {
        let released = self.inner.lock().await.flush_backoff(now);
        if released > 0 {
            self.notify.notify_one();
        }
        released
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}
