use super::*;

/// Mints taint tags for source operations. The minted count never
/// decreases; records past `record_limit` are counted but not kept.
pub(crate) struct TaintTracker {
    minted: u64,
    records: Vec<TaintRecord>,
    record_limit: usize,
    per_source: BTreeMap<String, u64>,
}

impl TaintTracker {
    pub(crate) fn new(record_limit: usize) -> Self {
        Self {
            minted: 0,
            records: Vec::new(),
            record_limit,
            per_source: BTreeMap::new(),
        }
    }

    /// Returns the fresh tag; `TaintSet::single` wraps it for values.
    pub(crate) fn mint(&mut self, source: &str, kind: TaintSourceKind) -> TaintTagId {
        self.minted += 1;
        let tag = self.minted;
        if self.records.len() < self.record_limit {
            self.records.push(TaintRecord {
                tag,
                source: source.to_string(),
                kind,
            });
        }
        *self.per_source.entry(source.to_string()).or_default() += 1;
        tracing::debug!(tag, source, %kind, "minted taint tag");
        tag
    }

    pub(crate) fn count(&self) -> u64 {
        self.minted
    }

    pub(crate) fn take_records(&mut self) -> Vec<TaintRecord> {
        std::mem::take(&mut self.records)
    }

    pub(crate) fn per_source(&self) -> &BTreeMap<String, u64> {
        &self.per_source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_fresh_and_counted_per_source() {
        let mut tracker = TaintTracker::new(10);
        let first = tracker.mint("atob", TaintSourceKind::Decode);
        let second = tracker.mint("atob", TaintSourceKind::Decode);
        let third = tracker.mint("String.fromCharCode", TaintSourceKind::CharSynthesis);
        assert_eq!((first, second, third), (1, 2, 3));
        assert_eq!(tracker.count(), 3);
        assert_eq!(tracker.per_source()["atob"], 2);
        let records = tracker.take_records();
        assert_eq!(records[2].kind, TaintSourceKind::CharSynthesis);
        assert_eq!(records[2].source, "String.fromCharCode");
    }

    #[test]
    fn record_limit_caps_storage_but_not_the_counter() {
        let mut tracker = TaintTracker::new(2);
        for _ in 0..5 {
            tracker.mint("escape", TaintSourceKind::Encode);
        }
        assert_eq!(tracker.count(), 5);
        let records = tracker.take_records();
        assert_eq!(records.iter().map(|record| record.tag).collect::<Vec<_>>(), vec![1, 2]);
    }
}
