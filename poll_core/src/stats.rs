//! Run statistics.
//!
//! Counts events and bytes per module and channel in two windows: a rate
//! window that is cleared at every periodic dump, and run totals that are
//! cleared when a run ends or a new run is opened.

use poll_common::ModuleIndex;
use poll_common::hal::consts::CHANNELS_PER_MODULE;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Copy, Default)]
struct Counter {
    events: u64,
    bytes: u64,
}

impl Counter {
    fn add(&mut self, bytes: usize) {
        self.events += 1;
        self.bytes += bytes as u64;
    }
}

#[derive(Debug, Clone, Default)]
struct ModuleCounters {
    rate: [Counter; CHANNELS_PER_MODULE],
    total: [Counter; CHANNELS_PER_MODULE],
}

impl ModuleCounters {
    fn sum(counters: &[Counter]) -> Counter {
        counters.iter().fold(Counter::default(), |acc, c| Counter {
            events: acc.events + c.events,
            bytes: acc.bytes + c.bytes,
        })
    }
}

/// Event and data-rate statistics of the current run.
#[derive(Debug, Clone)]
pub struct RunStatistics {
    modules: Vec<ModuleCounters>,
    dump_interval: Option<Duration>,
    since_dump: Duration,
    rate_time: Duration,
    total_time: Duration,
}

impl RunStatistics {
    /// Create statistics for `module_count` modules.
    ///
    /// With a `dump_interval`, [`add_elapsed`](Self::add_elapsed) reports
    /// when that much acquisition time has passed since the last dump.
    pub fn new(module_count: usize, dump_interval: Option<Duration>) -> Self {
        Self {
            modules: vec![ModuleCounters::default(); module_count],
            dump_interval,
            since_dump: Duration::ZERO,
            rate_time: Duration::ZERO,
            total_time: Duration::ZERO,
        }
    }

    /// Count one event of `bytes` on `module`/`channel`.
    pub fn add_event(&mut self, module: ModuleIndex, channel: u8, bytes: usize) {
        let Some(counters) = self.modules.get_mut(module) else {
            return;
        };
        let ch = channel as usize;
        if ch < CHANNELS_PER_MODULE {
            counters.rate[ch].add(bytes);
            counters.total[ch].add(bytes);
        }
    }

    /// Account acquisition time. Returns `true` when the dump interval elapsed.
    pub fn add_elapsed(&mut self, elapsed: Duration) -> bool {
        self.rate_time += elapsed;
        self.total_time += elapsed;
        self.since_dump += elapsed;

        match self.dump_interval {
            Some(interval) if self.since_dump >= interval => {
                self.since_dump = Duration::ZERO;
                true
            }
            _ => false,
        }
    }

    /// Log rates and totals of every module.
    pub fn dump(&self) {
        let rate_secs = self.rate_time.as_secs_f64();
        for (module, counters) in self.modules.iter().enumerate() {
            let rate = ModuleCounters::sum(&counters.rate);
            let total = ModuleCounters::sum(&counters.total);
            let (event_rate, byte_rate) = if rate_secs > 0.0 {
                (rate.events as f64 / rate_secs, rate.bytes as f64 / rate_secs)
            } else {
                (0.0, 0.0)
            };
            info!(
                "Module {}: {:.1} events/s, {:.1} B/s, {} events and {} bytes total",
                module, event_rate, byte_rate, total.events, total.bytes
            );
        }
        info!(
            "Run time {:.3} s, average data rate {:.1} B/s",
            self.total_time.as_secs_f64(),
            self.total_data_rate()
        );
    }

    /// Clear the rate window.
    pub fn clear_rates(&mut self) {
        for counters in &mut self.modules {
            counters.rate = Default::default();
        }
        self.rate_time = Duration::ZERO;
        self.since_dump = Duration::ZERO;
    }

    /// Clear run totals.
    pub fn clear_totals(&mut self) {
        for counters in &mut self.modules {
            counters.total = Default::default();
        }
        self.total_time = Duration::ZERO;
    }

    /// Clear everything.
    pub fn clear(&mut self) {
        self.clear_rates();
        self.clear_totals();
    }

    /// Acquisition time accounted since the totals were last cleared.
    pub fn total_time(&self) -> Duration {
        self.total_time
    }

    /// Events counted on `module` since the totals were last cleared.
    pub fn total_events(&self, module: ModuleIndex) -> u64 {
        self.modules
            .get(module)
            .map_or(0, |c| ModuleCounters::sum(&c.total).events)
    }

    /// Average data rate over the run in bytes per second.
    pub fn total_data_rate(&self) -> f64 {
        let secs = self.total_time.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        let bytes: u64 = self
            .modules
            .iter()
            .map(|c| ModuleCounters::sum(&c.total).bytes)
            .sum();
        bytes as f64 / secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_events_per_module() {
        let mut stats = RunStatistics::new(2, None);
        stats.add_event(0, 3, 200);
        stats.add_event(0, 4, 200);
        stats.add_event(1, 0, 100);
        stats.add_event(7, 0, 100);
        assert_eq!(stats.total_events(0), 2);
        assert_eq!(stats.total_events(1), 1);
    }

    #[test]
    fn dump_interval_fires_once_per_interval() {
        let mut stats = RunStatistics::new(1, Some(Duration::from_secs(3)));
        assert!(!stats.add_elapsed(Duration::from_secs(2)));
        assert!(stats.add_elapsed(Duration::from_secs(2)));
        assert!(!stats.add_elapsed(Duration::from_secs(1)));
        assert_eq!(stats.total_time(), Duration::from_secs(5));
    }

    #[test]
    fn data_rate_uses_totals() {
        let mut stats = RunStatistics::new(1, None);
        stats.add_event(0, 0, 1000);
        stats.add_elapsed(Duration::from_secs(2));
        assert!((stats.total_data_rate() - 500.0).abs() < 1e-9);

        stats.clear_rates();
        assert!((stats.total_data_rate() - 500.0).abs() < 1e-9);

        stats.clear_totals();
        assert_eq!(stats.total_data_rate(), 0.0);
        assert_eq!(stats.total_events(0), 0);
    }
}
