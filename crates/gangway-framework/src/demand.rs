//! Aggregation of a workload's containers into one demand vector.

use crate::pod::PodInfo;
use crate::resource::Resource;

/// Compute the resource vector the scheduler must reserve on a target
/// node for `pod`.
///
/// Regular containers run concurrently, so their requests sum. Init
/// containers run sequentially and release resources before regular
/// containers start, so only their componentwise peak matters. Pod
/// overhead is charged on top of whichever dominates. The pod-count
/// contribution is 1 unless the workload opts out of the node pod cap.
pub fn compute_pod_resource_request(pod: &PodInfo) -> Resource {
    let mut request = Resource::new();
    for container in &pod.containers {
        request.add(&container.requests);
    }

    let mut init_peak = Resource::new();
    for container in &pod.init_containers {
        init_peak.set_max_resource(&container.requests);
    }
    request.set_max_resource(&init_peak);

    if let Some(overhead) = &pod.overhead {
        request.add(overhead);
    }

    request.allowed_pod_number = if pod.ignores_pod_limit() { 0 } else { 1 };
    request
}
