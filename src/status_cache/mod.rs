//! Status Cache (C1): hash + threshold + rate-limit telemetry broadcast
//! decisions, and keep bounded history.
//!
//! Never raises: a digest failure or any other internal hiccup falls
//! through to "always broadcast" — safety over silence.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::types::DroneStatus;

#[derive(Debug, Clone)]
pub struct Thresholds {
    pub battery: i64,
    pub temperature: i64,
    pub height: i64,
    pub position: f64,
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub status: DroneStatus,
    pub hash: String,
    pub changed_fields: Vec<String>,
    pub captured_at: Instant,
}

#[derive(Debug, Clone, Default)]
pub struct CacheStatistics {
    pub total_updates: u64,
    pub broadcasts: u64,
    pub suppressed: u64,
    pub history_len: usize,
}

struct Inner {
    current: Option<CacheEntry>,
    history: VecDeque<CacheEntry>,
    last_broadcast_at: Option<Instant>,
    thresholds: Thresholds,
    stats: CacheStatistics,
}

pub struct StatusCache {
    history_capacity: usize,
    min_broadcast_interval: Duration,
    cache_ttl: Duration,
    inner: Mutex<Inner>,
}

/// Computes a stable, field-order-independent digest of a status snapshot.
fn stable_digest(status: &DroneStatus) -> String {
    let mut fields: BTreeMap<&str, String> = BTreeMap::new();
    fields.insert("connected", status.connected.to_string());
    fields.insert("flying", status.flying.to_string());
    fields.insert("battery", status.battery.to_string());
    fields.insert("temperature", status.temperature.to_string());
    fields.insert("height_cm", status.height_cm.to_string());
    fields.insert("position_x", format!("{:.4}", status.position.x));
    fields.insert("position_y", format!("{:.4}", status.position.y));
    fields.insert("position_z", format!("{:.4}", status.position.z));
    fields.insert("wifi_signal", status.wifi_signal.to_string());
    fields.insert("flight_time_s", status.flight_time_s.to_string());
    fields.insert("mission_pad_id", status.mission_pad_id.to_string());

    let canonical = fields
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(";");

    format!("{:x}", md5::compute(canonical.as_bytes()))
}

fn position_distance(a: &DroneStatus, b: &DroneStatus) -> f64 {
    let (dx, dy, dz) = (
        a.position.x - b.position.x,
        a.position.y - b.position.y,
        a.position.z - b.position.z,
    );
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// Field-wise differ: returns the set of field names whose delta crosses
/// its configured threshold (booleans and mission_pad_id count as "any
/// change").
fn diff_fields(prev: &DroneStatus, next: &DroneStatus, t: &Thresholds) -> Vec<String> {
    let mut changed = Vec::new();
    if prev.connected != next.connected {
        changed.push("connected".to_string());
    }
    if prev.flying != next.flying {
        changed.push("flying".to_string());
    }
    if prev.mission_pad_id != next.mission_pad_id {
        changed.push("mission_pad_id".to_string());
    }
    if (prev.battery - next.battery).abs() >= t.battery {
        changed.push("battery".to_string());
    }
    if (prev.temperature - next.temperature).abs() >= t.temperature {
        changed.push("temperature".to_string());
    }
    if (prev.height_cm - next.height_cm).abs() >= t.height {
        changed.push("height_cm".to_string());
    }
    if position_distance(prev, next) >= t.position {
        changed.push("position".to_string());
    }
    changed
}

impl StatusCache {
    pub fn new(
        thresholds: Thresholds,
        min_broadcast_interval: Duration,
        cache_ttl: Duration,
        history_capacity: usize,
    ) -> Self {
        Self {
            history_capacity,
            min_broadcast_interval,
            cache_ttl,
            inner: Mutex::new(Inner {
                current: None,
                history: VecDeque::with_capacity(history_capacity),
                last_broadcast_at: None,
                thresholds,
                stats: CacheStatistics::default(),
            }),
        }
    }

    pub fn from_config(cfg: &crate::config::StatusCacheConfig) -> Self {
        Self::new(
            Thresholds {
                battery: cfg.battery_threshold,
                temperature: cfg.temperature_threshold,
                height: cfg.height_threshold,
                position: cfg.position_threshold,
            },
            Duration::from_millis(cfg.min_broadcast_interval_ms),
            Duration::from_secs(cfg.cache_ttl_secs),
            cfg.history_capacity,
        )
    }

    /// Decide whether `status` deserves a broadcast and record it in history.
    pub fn update(&self, status: DroneStatus) -> (bool, bool) {
        let now = Instant::now();
        let digest = stable_digest(&status);

        let mut inner = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.stats.total_updates += 1;

        let (changed, ttl_expired, changed_fields) = match &inner.current {
            None => (true, false, Vec::new()),
            Some(cur) => {
                let ttl_expired = now.duration_since(cur.captured_at) >= self.cache_ttl;
                if cur.hash == digest && !ttl_expired {
                    return (false, false);
                }
                if cur.hash == digest {
                    (false, ttl_expired, Vec::new())
                } else {
                    let fields = diff_fields(&cur.status, &status, &inner.thresholds);
                    let changed = !fields.is_empty();
                    (changed, ttl_expired, fields)
                }
            }
        };

        let interval = if changed {
            self.min_broadcast_interval
        } else {
            self.min_broadcast_interval * 2
        };
        let interval_ok = inner
            .last_broadcast_at
            .map_or(true, |t| now.duration_since(t) >= interval);
        let should_broadcast = (changed || ttl_expired) && interval_ok;

        if should_broadcast {
            inner.last_broadcast_at = Some(now);
            inner.stats.broadcasts += 1;
        } else {
            inner.stats.suppressed += 1;
        }

        let entry = CacheEntry {
            status,
            hash: digest,
            changed_fields,
            captured_at: now,
        };
        inner.current = Some(entry.clone());
        if inner.history.len() >= self.history_capacity {
            inner.history.pop_front();
        }
        inner.history.push_back(entry);
        inner.stats.history_len = inner.history.len();

        (should_broadcast, changed)
    }

    pub fn history(&self, limit: Option<usize>) -> Vec<CacheEntry> {
        let inner = self.lock();
        let iter = inner.history.iter().rev();
        match limit {
            Some(n) => iter.take(n).cloned().collect::<Vec<_>>().into_iter().rev().collect(),
            None => inner.history.iter().cloned().collect(),
        }
    }

    pub fn field_history(&self, field: &str, limit: Option<usize>) -> Vec<String> {
        self.history(limit)
            .into_iter()
            .filter(|e| e.changed_fields.iter().any(|f| f == field) || field == "all")
            .map(|e| e.hash)
            .collect()
    }

    pub fn changes_since(&self, since: Instant) -> Vec<CacheEntry> {
        self.lock()
            .history
            .iter()
            .filter(|e| e.captured_at >= since && !e.changed_fields.is_empty())
            .cloned()
            .collect()
    }

    pub fn statistics(&self) -> CacheStatistics {
        self.lock().stats.clone()
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.current = None;
        inner.history.clear();
        inner.last_broadcast_at = None;
        inner.stats = CacheStatistics::default();
    }

    pub fn set_threshold(&self, field: &str, value: f64) {
        let mut inner = self.lock();
        match field {
            "battery" => inner.thresholds.battery = value as i64,
            "temperature" => inner.thresholds.temperature = value as i64,
            "height" => inner.thresholds.height = value as i64,
            "position" => inner.thresholds.position = value,
            _ => tracing::warn!(field, "unknown status cache threshold field, ignoring"),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_with_battery(battery: i64) -> DroneStatus {
        DroneStatus {
            battery,
            ..DroneStatus::default()
        }
    }

    fn cache() -> StatusCache {
        StatusCache::new(
            Thresholds {
                battery: 1,
                temperature: 1,
                height: 5,
                position: 2.0,
            },
            Duration::from_millis(0),
            Duration::from_secs(60),
            100,
        )
    }

    #[test]
    fn identical_snapshot_suppresses() {
        let cache = cache();
        let (broadcast, changed) = cache.update(status_with_battery(80));
        assert!(broadcast);
        assert!(changed);
        let (broadcast, changed) = cache.update(status_with_battery(80));
        assert!(!broadcast);
        assert!(!changed);
    }

    #[test]
    fn threshold_hysteresis_matches_battery_deltas() {
        let cache = cache();
        let expect = [(80, true), (80, false), (79, true), (79, false), (75, true)];
        for (battery, want_broadcast) in expect {
            let (broadcast, _) = cache.update(status_with_battery(battery));
            assert_eq!(broadcast, want_broadcast, "battery={battery}");
        }
    }

    #[test]
    fn clear_resets_history_and_stats() {
        let cache = cache();
        cache.update(status_with_battery(80));
        cache.clear();
        assert!(cache.history(None).is_empty());
        assert_eq!(cache.statistics().total_updates, 0);
    }

    #[test]
    fn never_raises_on_first_update() {
        let cache = cache();
        let (broadcast, changed) = cache.update(DroneStatus::default());
        assert!(broadcast);
        assert!(changed);
    }
}
