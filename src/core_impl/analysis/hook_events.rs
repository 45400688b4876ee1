use std::collections::VecDeque;

use super::*;

/// Bounded log of hooked calls. When full, the oldest tenth is evicted in
/// one go.
pub(crate) struct HookEventLog {
    events: VecDeque<HookEvent>,
    capacity: usize,
    recorded: u64,
    dropped: u64,
}

impl HookEventLog {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            capacity,
            recorded: 0,
            dropped: 0,
        }
    }

    pub(crate) fn record(
        &mut self,
        category: HookCategory,
        name: &str,
        severity: u8,
        detail: Option<String>,
    ) {
        let seq = self.recorded;
        self.recorded += 1;
        tracing::debug!(seq, name, severity, ?category, "hook event");
        if self.capacity == 0 {
            self.dropped += 1;
            return;
        }
        if self.events.len() >= self.capacity {
            let evicted = (self.capacity / 10).max(1);
            self.events.drain(..evicted);
            self.dropped += evicted as u64;
        }
        self.events.push_back(HookEvent {
            seq,
            category,
            name: name.to_string(),
            severity: severity.min(10),
            detail,
        });
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped
    }

    pub(crate) fn take_events(&mut self) -> Vec<HookEvent> {
        self.events.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_log_evicts_the_oldest_tenth() {
        let mut log = HookEventLog::new(20);
        for idx in 0..21 {
            log.record(HookCategory::FunctionCall, &format!("f{idx}"), 4, None);
        }
        assert_eq!(log.dropped(), 2);
        let events = log.take_events();
        assert_eq!(events.len(), 19);
        assert_eq!(events[0].seq, 2);
        assert_eq!(events[18].name, "f20");
    }

    #[test]
    fn zero_capacity_counts_everything_as_dropped() {
        let mut log = HookEventLog::new(0);
        log.record(HookCategory::NetworkRequest, "fetch", 12, None);
        assert_eq!(log.dropped(), 1);
        assert!(log.take_events().is_empty());
    }

    #[test]
    fn severities_are_clamped() {
        let mut log = HookEventLog::new(4);
        log.record(HookCategory::CryptoOperation, "atob", 12, Some("x".into()));
        assert_eq!(log.take_events()[0].severity, 10);
    }
}
