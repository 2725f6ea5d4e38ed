//! The unit queue proper.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use gangway_framework::group::PodGroup;
use gangway_framework::pod::{QueuedPodInfo, Uid, DEFAULT_POD_PRIORITY};
use gangway_framework::unit::{SchedulingUnit, UnitType};

/// Heap entry; may go stale when its unit is re-stamped or removed,
/// stale entries are skipped lazily on pop.
#[derive(Debug, PartialEq, Eq)]
struct ActiveEntry {
    priority: i32,
    timestamp: DateTime<Utc>,
    key: String,
}

impl Ord for ActiveEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then earlier enqueue time,
        // then lexicographically smaller key.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.timestamp.cmp(&self.timestamp))
            .then_with(|| other.key.cmp(&self.key))
    }
}

impl PartialOrd for ActiveEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A group unit expelled because it missed its gang deadline.
#[derive(Debug)]
pub struct TimedOutUnit {
    pub unit: SchedulingUnit,
    pub parked_since: DateTime<Utc>,
}

struct PendingUnit {
    unit: SchedulingUnit,
    since: DateTime<Utc>,
}

struct BackoffEntry {
    unit: SchedulingUnit,
    until: DateTime<Utc>,
}

/// Exponential retry backoff: 1s, 2s, 4s, 8s, capped at 10s.
fn backoff_duration(attempts: u32) -> Duration {
    let exponent = attempts.saturating_sub(1).min(4);
    Duration::seconds((1i64 << exponent).min(10))
}

/// The scheduling unit queue.
///
/// Ready units sit in `units` and are ordered by the heap; group units
/// still gathering members park in `pending`. Members that arrive
/// before their group spec wait in `orphans`.
#[derive(Default)]
pub struct UnitQueue {
    active: BinaryHeap<ActiveEntry>,
    units: HashMap<String, SchedulingUnit>,
    pending: HashMap<String, PendingUnit>,
    backoff: HashMap<String, BackoffEntry>,
    groups: HashMap<String, Arc<PodGroup>>,
    orphans: HashMap<String, Vec<QueuedPodInfo>>,
    pod_to_unit: HashMap<Uid, String>,
}

fn group_unit_key(namespace: &str, group_name: &str) -> String {
    format!("{}/{}/{}", UnitType::Group.as_str(), namespace, group_name)
}

impl UnitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of units currently poppable.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Number of group units still gathering members.
    pub fn num_pending(&self) -> usize {
        self.pending.len()
    }

    /// Number of units waiting out a retry backoff.
    pub fn num_backing_off(&self) -> usize {
        self.backoff.len()
    }

    /// Register a group spec. Members that arrived early are absorbed.
    pub fn add_group(&mut self, group: Arc<PodGroup>, now: DateTime<Utc>) {
        let key = group_unit_key(&group.namespace, &group.name);
        self.groups.insert(key.clone(), Arc::clone(&group));

        let mut unit = SchedulingUnit::new_group(Arc::clone(&group), DEFAULT_POD_PRIORITY);
        let orphans = self.orphans.remove(&key).unwrap_or_default();
        for pod in orphans {
            self.pod_to_unit.insert(pod.uid().to_string(), key.clone());
            // Infallible for group units; members are keyed by UID.
            let _ = unit.add_pod(pod);
        }
        self.park_or_activate(key, unit, now);
    }

    /// Replace a group spec, keeping gathered members.
    pub fn update_group(&mut self, group: Arc<PodGroup>, now: DateTime<Utc>) {
        let key = group_unit_key(&group.namespace, &group.name);
        let members = match self.remove_unit(&key) {
            Some(mut existing) => existing.take_pods(),
            None => Vec::new(),
        };
        self.groups.insert(key.clone(), Arc::clone(&group));
        let mut unit = SchedulingUnit::new_group(Arc::clone(&group), DEFAULT_POD_PRIORITY);
        for pod in members {
            let _ = unit.add_pod(pod);
        }
        self.park_or_activate(key, unit, now);
    }

    /// Drop a group and release its members.
    pub fn delete_group(&mut self, namespace: &str, name: &str) -> Vec<QueuedPodInfo> {
        let key = group_unit_key(namespace, name);
        self.groups.remove(&key);
        self.orphans.remove(&key);
        match self.remove_unit(&key) {
            Some(mut unit) => {
                let pods = unit.take_pods();
                for pod in &pods {
                    self.pod_to_unit.remove(pod.uid());
                }
                pods
            }
            None => Vec::new(),
        }
    }

    /// Admit a workload. Routed to its group unit when it carries a
    /// group annotation, otherwise wrapped in a fresh single unit.
    pub fn add_pod(&mut self, pod: QueuedPodInfo, now: DateTime<Utc>) {
        match pod.pod.group_name() {
            Some(group_name) => {
                let key = group_unit_key(&pod.pod.namespace, group_name);
                if !self.groups.contains_key(&key)
                    && !self.units.contains_key(&key)
                    && !self.pending.contains_key(&key)
                {
                    debug!(pod = %pod.pod.full_name(), group = %key, "parking member of unseen group");
                    self.orphans.entry(key).or_default().push(pod);
                    return;
                }
                self.pod_to_unit.insert(pod.uid().to_string(), key.clone());
                let mut unit = match self.remove_unit(&key) {
                    Some(unit) => unit,
                    None => {
                        // Spec known but no unit yet (all members popped
                        // or deleted earlier).
                        let group = Arc::clone(&self.groups[&key]);
                        SchedulingUnit::new_group(group, DEFAULT_POD_PRIORITY)
                    }
                };
                let _ = unit.add_pod(pod);
                self.park_or_activate(key, unit, now);
            }
            None => {
                let mut unit = SchedulingUnit::new_single(pod);
                unit.set_enqueued_timestamp(now);
                let key = unit.unit_key().to_string();
                if let Some(queued) = unit.get_pods().first() {
                    self.pod_to_unit
                        .insert(queued.uid().to_string(), key.clone());
                }
                self.activate(key, unit);
            }
        }
    }

    /// Replace a member in place; unknown workloads are admitted fresh.
    pub fn update_pod(&mut self, pod: QueuedPodInfo, now: DateTime<Utc>) {
        match self.pod_to_unit.get(pod.uid()).cloned() {
            Some(key) => {
                if let Some(mut unit) = self.remove_unit(&key) {
                    let _ = unit.update_pod(pod);
                    self.park_or_activate(key, unit, now);
                } else {
                    // Unit is mid-cycle; treat as a fresh admission.
                    self.add_pod(pod, now);
                }
            }
            None => self.add_pod(pod, now),
        }
    }

    /// Remove a member. Group units dropping below quorum are demoted
    /// back to pending; emptied single units disappear.
    pub fn delete_pod(&mut self, uid: &str, now: DateTime<Utc>) {
        let Some(key) = self.pod_to_unit.remove(uid) else {
            return;
        };
        let Some(mut unit) = self.remove_unit(&key) else {
            return;
        };
        unit.delete_pod(uid);
        match unit.unit_type() {
            UnitType::Single => {
                // Nothing left to schedule.
            }
            UnitType::Group => self.park_or_activate(key, unit, now),
        }
    }

    /// Pop the highest-ranked ready unit, transferring ownership to
    /// the placement cycle.
    pub fn pop(&mut self) -> Option<SchedulingUnit> {
        while let Some(entry) = self.active.pop() {
            let Some(unit) = self.units.get(&entry.key) else {
                continue; // stale: unit removed or re-parked
            };
            let fresh = unit.get_priority() == entry.priority
                && unit.get_enqueued_timestamp() == Some(entry.timestamp);
            if !fresh {
                continue; // stale: unit was re-stamped since
            }
            return self.units.remove(&entry.key);
        }
        None
    }

    /// Return a unit after a failed attempt: attempt counts increment
    /// and the unit waits out an exponential backoff before it can be
    /// popped again.
    pub fn requeue(&mut self, mut unit: SchedulingUnit, reason: Option<String>, now: DateTime<Utc>) {
        let mut attempts = 0;
        for pod in unit.pods_mut() {
            pod.attempts += 1;
            pod.unschedulable_reason = reason.clone();
            attempts = attempts.max(pod.attempts);
        }
        let key = unit.unit_key().to_string();
        for pod in unit.get_pods() {
            self.pod_to_unit.insert(pod.uid().to_string(), key.clone());
        }
        if unit.ready_to_be_populated() {
            let until = now + backoff_duration(attempts);
            debug!(unit = %key, %until, "unit backing off");
            self.backoff.insert(key, BackoffEntry { unit, until });
        } else {
            self.park_or_activate(key, unit, now);
        }
    }

    /// Move units whose backoff expired back into the active queue.
    /// Returns how many were released.
    pub fn flush_backoff(&mut self, now: DateTime<Utc>) -> usize {
        let due: Vec<String> = self
            .backoff
            .iter()
            .filter(|(_, entry)| entry.until <= now)
            .map(|(key, _)| key.clone())
            .collect();
        let released = due.len();
        for key in due {
            let entry = self.backoff.remove(&key).expect("key collected above");
            self.park_or_activate(key, entry.unit, now);
        }
        released
    }

    /// Expel pending group units that missed their gang deadline.
    /// Their members are released to the caller for unschedulable
    /// reporting.
    pub fn flush_timed_out(&mut self, now: DateTime<Utc>) -> Vec<TimedOutUnit> {
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, pending)| {
                let timeout = pending.unit.get_timeout_period();
                timeout > 0 && now - pending.since >= Duration::seconds(i64::from(timeout))
            })
            .map(|(key, _)| key.clone())
            .collect();

        let mut timed_out = Vec::with_capacity(expired.len());
        for key in expired {
            let pending = self.pending.remove(&key).expect("key collected above");
            for pod in pending.unit.get_pods() {
                self.pod_to_unit.remove(pod.uid());
            }
            warn!(unit = %key, since = %pending.since, "gang timed out waiting for quorum");
            timed_out.push(TimedOutUnit {
                unit: pending.unit,
                parked_since: pending.since,
            });
        }
        timed_out
    }

    fn remove_unit(&mut self, key: &str) -> Option<SchedulingUnit> {
        if let Some(unit) = self.units.remove(key) {
            return Some(unit);
        }
        if let Some(entry) = self.backoff.remove(key) {
            return Some(entry.unit);
        }
        self.pending.remove(key).map(|p| p.unit)
    }

    /// Route a unit to `units` (ready) or `pending` (still gathering).
    /// Activation re-stamps the enqueue time so the unit joins the
    /// back of its priority band.
    fn park_or_activate(&mut self, key: String, mut unit: SchedulingUnit, now: DateTime<Utc>) {
        if unit.ready_to_be_populated() {
            unit.set_enqueued_timestamp(now);
            self.activate(key, unit);
        } else {
            let since = self
                .pending
                .get(&key)
                .map(|p| p.since)
                .unwrap_or(now);
            self.pending.insert(key, PendingUnit { unit, since });
        }
    }

    fn activate(&mut self, key: String, unit: SchedulingUnit) {
        let entry = ActiveEntry {
            priority: unit.get_priority(),
            timestamp: unit
                .get_enqueued_timestamp()
                .unwrap_or_else(Utc::now),
            key: key.clone(),
        };
        self.active.push(entry);
        self.units.insert(key, unit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use gangway_framework::pod::{PodInfo, POD_GROUP_NAME_ANNOTATION_KEY};

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    fn queued(name: &str, uid: &str, priority: Option<i32>, now: DateTime<Utc>) -> QueuedPodInfo {
        let mut pod = PodInfo::new("default", name, uid);
        pod.priority = priority;
        QueuedPodInfo::new(Arc::new(pod), now)
    }

    fn gang_member(namespace: &str, group: &str, uid: &str, now: DateTime<Utc>) -> QueuedPodInfo {
        let mut pod = PodInfo::new(namespace, uid, uid);
        pod.annotations
            .insert(POD_GROUP_NAME_ANNOTATION_KEY.to_string(), group.to_string());
        QueuedPodInfo::new(Arc::new(pod), now)
    }

    #[test]
    fn pops_by_priority_then_enqueue_time_then_key() {
        let mut queue = UnitQueue::new();
        queue.add_pod(queued("low-late", "u1", Some(10), at(0)), at(5));
        queue.add_pod(queued("high", "u2", Some(50), at(0)), at(9));
        queue.add_pod(queued("low-early", "u3", Some(10), at(0)), at(1));
        // Same priority and timestamp as low-late: key breaks the tie.
        queue.add_pod(queued("aaa-tie", "u4", Some(10), at(0)), at(5));

        let order: Vec<String> = std::iter::from_fn(|| queue.pop())
            .map(|u| u.unit_key().to_string())
            .collect();
        assert_eq!(
            order,
            vec![
                "single/default/high",
                "single/default/low-early",
                "single/default/aaa-tie",
                "single/default/low-late",
            ]
        );
    }

    #[test]
    fn popped_sequence_is_non_increasing() {
        let mut queue = UnitQueue::new();
        for i in 0..20 {
            let priority = Some(i32::from(i % 4) * 10);
            queue.add_pod(
                queued(&format!("p{i}"), &format!("u{i}"), priority, at(0)),
                at(i64::from(i)),
            );
        }

        let mut last: Option<(i32, DateTime<Utc>)> = None;
        while let Some(unit) = queue.pop() {
            let rank = (
                unit.get_priority(),
                unit.get_enqueued_timestamp().unwrap(),
            );
            if let Some((last_priority, last_ts)) = last {
                assert!(
                    rank.0 < last_priority || (rank.0 == last_priority && rank.1 >= last_ts),
                    "queue order violated: {rank:?} after ({last_priority}, {last_ts})"
                );
            }
            last = Some(rank);
        }
    }

    #[test]
    fn fifo_within_a_priority_band() {
        let mut queue = UnitQueue::new();
        for i in 0..5 {
            queue.add_pod(
                queued(&format!("p{i}"), &format!("u{i}"), Some(10), at(0)),
                at(i64::from(i)),
            );
        }
        let order: Vec<String> = std::iter::from_fn(|| queue.pop())
            .map(|u| u.name().to_string())
            .collect();
        assert_eq!(order, vec!["p0", "p1", "p2", "p3", "p4"]);
    }

    #[test]
    fn group_parks_until_quorum() {
        let mut queue = UnitQueue::new();
        let group = Arc::new(PodGroup::new("ml", "trainer", 2));
        queue.add_group(group, at(0));
        assert_eq!(queue.num_pending(), 1);

        queue.add_pod(gang_member("ml", "trainer", "m1", at(1)), at(1));
        assert!(queue.pop().is_none());
        assert_eq!(queue.num_pending(), 1);

        queue.add_pod(gang_member("ml", "trainer", "m2", at(2)), at(2));
        assert_eq!(queue.num_pending(), 0);

        let unit = queue.pop().expect("gang reached quorum");
        assert_eq!(unit.unit_key(), "group/ml/trainer");
        assert_eq!(unit.num_pods(), 2);
        // Activation stamped every member with the same enqueue time.
        for pod in unit.get_pods() {
            assert_eq!(pod.timestamp, at(2));
        }
    }

    #[test]
    fn members_arriving_before_group_spec_are_absorbed() {
        let mut queue = UnitQueue::new();
        queue.add_pod(gang_member("ml", "trainer", "m1", at(0)), at(0));
        queue.add_pod(gang_member("ml", "trainer", "m2", at(1)), at(1));
        assert!(queue.pop().is_none());

        queue.add_group(Arc::new(PodGroup::new("ml", "trainer", 2)), at(2));
        let unit = queue.pop().expect("orphans absorbed on group arrival");
        assert_eq!(unit.num_pods(), 2);
    }

    #[test]
    fn deleting_a_member_demotes_the_gang() {
        let mut queue = UnitQueue::new();
        queue.add_group(Arc::new(PodGroup::new("ml", "trainer", 2)), at(0));
        queue.add_pod(gang_member("ml", "trainer", "m1", at(1)), at(1));
        queue.add_pod(gang_member("ml", "trainer", "m2", at(2)), at(2));
        assert_eq!(queue.len(), 1);

        queue.delete_pod("m2", at(3));
        assert!(queue.pop().is_none());
        assert_eq!(queue.num_pending(), 1);
    }

    #[test]
    fn requeue_increments_attempts_and_backs_off() {
        let mut queue = UnitQueue::new();
        queue.add_pod(queued("first", "u1", Some(10), at(0)), at(0));
        queue.add_pod(queued("second", "u2", Some(10), at(1)), at(1));

        let unit = queue.pop().unwrap();
        assert_eq!(unit.name(), "first");
        queue.requeue(unit, Some("no fit".to_string()), at(5));
        assert_eq!(queue.num_backing_off(), 1);

        let unit = queue.pop().unwrap();
        assert_eq!(unit.name(), "second");
        // Still backing off (first attempt waits 1s).
        assert_eq!(queue.flush_backoff(at(5)), 0);
        assert!(queue.pop().is_none());

        assert_eq!(queue.flush_backoff(at(6)), 1);
        let unit = queue.pop().unwrap();
        assert_eq!(unit.name(), "first");
        let pod = unit.get_pods()[0];
        assert_eq!(pod.attempts, 1);
        assert_eq!(pod.unschedulable_reason.as_deref(), Some("no fit"));
        // First-enqueue time is preserved for latency accounting.
        assert_eq!(pod.initial_attempt_timestamp, at(0));
    }

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        assert_eq!(backoff_duration(1), Duration::seconds(1));
        assert_eq!(backoff_duration(2), Duration::seconds(2));
        assert_eq!(backoff_duration(4), Duration::seconds(8));
        assert_eq!(backoff_duration(5), Duration::seconds(10));
        assert_eq!(backoff_duration(50), Duration::seconds(10));
    }

    #[test]
    fn gang_timeout_expels_pending_units() {
        let mut queue = UnitQueue::new();
        let mut group = PodGroup::new("ml", "trainer", 3);
        group.schedule_timeout_seconds = Some(60);
        queue.add_group(Arc::new(group), at(0));
        queue.add_pod(gang_member("ml", "trainer", "m1", at(1)), at(1));

        assert!(queue.flush_timed_out(at(30)).is_empty());

        let timed_out = queue.flush_timed_out(at(61));
        assert_eq!(timed_out.len(), 1);
        assert_eq!(timed_out[0].unit.unit_key(), "group/ml/trainer");
        assert_eq!(timed_out[0].unit.num_pods(), 1);
        assert_eq!(queue.num_pending(), 0);

        // The member can be admitted again afterwards.
        queue.add_pod(gang_member("ml", "trainer", "m1", at(70)), at(70));
        assert_eq!(queue.num_pending(), 1);
    }

    #[test]
    fn default_gang_timeout_applies() {
        let mut queue = UnitQueue::new();
        queue.add_group(Arc::new(PodGroup::new("ml", "trainer", 2)), at(0));
        assert!(queue.flush_timed_out(at(299)).is_empty());
        assert_eq!(queue.flush_timed_out(at(300)).len(), 1);
    }

    #[test]
    fn update_group_keeps_members() {
        let mut queue = UnitQueue::new();
        queue.add_group(Arc::new(PodGroup::new("ml", "trainer", 3)), at(0));
        queue.add_pod(gang_member("ml", "trainer", "m1", at(1)), at(1));
        queue.add_pod(gang_member("ml", "trainer", "m2", at(2)), at(2));
        assert_eq!(queue.num_pending(), 1);

        // Quorum lowered: the gathered members now satisfy it.
        queue.update_group(Arc::new(PodGroup::new("ml", "trainer", 2)), at(3));
        let unit = queue.pop().expect("lowered quorum makes the gang ready");
        assert_eq!(unit.num_pods(), 2);
    }

    #[test]
    fn delete_group_releases_members() {
        let mut queue = UnitQueue::new();
        queue.add_group(Arc::new(PodGroup::new("ml", "trainer", 2)), at(0));
        queue.add_pod(gang_member("ml", "trainer", "m1", at(1)), at(1));

        let released = queue.delete_group("ml", "trainer");
        assert_eq!(released.len(), 1);
        assert_eq!(queue.num_pending(), 0);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn update_pod_replaces_in_place() {
        let mut queue = UnitQueue::new();
        queue.add_pod(queued("web", "u1", Some(10), at(0)), at(0));

        let replacement = queued("web", "u1", Some(90), at(1));
        queue.update_pod(replacement, at(1));

        let unit = queue.pop().unwrap();
        assert_eq!(unit.get_priority(), 90);
        assert!(queue.pop().is_none(), "stale heap entry must be skipped");
    }

    #[test]
    fn delete_single_removes_the_unit() {
        let mut queue = UnitQueue::new();
        queue.add_pod(queued("web", "u1", Some(10), at(0)), at(0));
        queue.delete_pod("u1", at(1));
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
    }
}
