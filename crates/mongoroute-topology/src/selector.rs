//! Latency-windowed round-robin proxy selection.

use std::sync::Arc;

use mongoroute_common::proxy::Proxy;

use crate::state::TopologyCore;

impl TopologyCore {
    /// Picks one proxy for an operation, or `None` when nothing is eligible.
    ///
    /// Eligibility is the latency window: a connected proxy whose last
    /// ismaster round-trip is within `local_threshold_ms` of the lowest
    /// round-trip ever observed. The rotating index distributes consecutive
    /// picks fairly across the eligible proxies; insertion order of the
    /// connected set breaks ties. A proxy without a latency sample yet is
    /// not eligible.
    pub(crate) fn pick_proxy(&mut self, local_threshold_ms: u64) -> Option<Arc<dyn Proxy>> {
        let window = self.min_latency_ms.saturating_add(local_threshold_ms);
        let eligible: Vec<&Arc<dyn Proxy>> = self
            .connected
            .iter()
            .filter(|p| p.is_connected() && p.last_ismaster_ms().is_some_and(|ms| ms <= window))
            .collect();

        if eligible.is_empty() {
            return None;
        }

        let picked = eligible[self.index % eligible.len()].clone();
        self.index = (self.index + 1) % eligible.len();
        Some(picked)
    }
}
