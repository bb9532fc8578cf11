use std::collections::BTreeSet;

use crate::entry::{LogEntry, LogLevel};
use crate::stream::RawBuffer;

/// Inputs of the filter predicate
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    /// Levels to keep. Empty keeps every level.
    pub levels: BTreeSet<LogLevel>,
    /// Search text, matched case-insensitively as a plain substring
    pub search: String,
    /// Hide entries matching `search` instead of only highlighting them
    pub exclude_matches: bool,
}

impl FilterCriteria {
    /// Toggle membership of a level in the level filter
    pub fn toggle_level(&mut self, level: LogLevel) {
        if !self.levels.remove(&level) {
            self.levels.insert(level);
        }
    }

    /// Whether `entry` is filtered out
    pub fn excludes(&self, entry: &LogEntry) -> bool {
        Exclusion::new(self).excludes(entry)
    }
}

/// Criteria with the search needle lowercased once per pass
struct Exclusion<'a> {
    levels: &'a BTreeSet<LogLevel>,
    needle: Option<String>,
}

impl<'a> Exclusion<'a> {
    fn new(criteria: &'a FilterCriteria) -> Self {
        let needle = (criteria.exclude_matches && !criteria.search.is_empty())
            .then(|| criteria.search.to_lowercase());
        Self {
            levels: &criteria.levels,
            needle,
        }
    }

    fn excludes(&self, entry: &LogEntry) -> bool {
        if !self.levels.is_empty() {
            let kept = entry.level.is_some_and(|level| self.levels.contains(&level));
            if !kept {
                return true;
            }
        }
        match &self.needle {
            Some(needle) => contains_ignore_case(entry.display_text(), needle),
            None => false,
        }
    }
}

/// Case-insensitive substring test. `needle_lower` must already be lowercase.
pub fn contains_ignore_case(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

/// The visible subsequence of the raw buffer, stored as a strictly increasing
/// map from filtered index to original index
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilteredView {
    indices: Vec<usize>,
    /// Bumped whenever the view is rebuilt rather than extended
    revision: u64,
}

impl FilteredView {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// The filtered-to-original index map
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn original_index(&self, filtered: usize) -> Option<usize> {
        self.indices.get(filtered).copied()
    }

    /// Position of an original index in the view, if it is visible
    pub fn filtered_index(&self, original: usize) -> Option<usize> {
        self.indices.binary_search(&original).ok()
    }

    pub fn entry<'a>(&self, raw: &'a RawBuffer, filtered: usize) -> Option<&'a LogEntry> {
        self.original_index(filtered).and_then(|i| raw.get(i))
    }

    pub fn entries<'a>(&'a self, raw: &'a RawBuffer) -> impl Iterator<Item = &'a LogEntry> + 'a {
        self.indices.iter().filter_map(move |&i| raw.get(i))
    }
}

/// Derive the filtered view of `entries` in one pass
pub fn derive_view(entries: &[LogEntry], criteria: &FilterCriteria) -> FilteredView {
    let exclusion = Exclusion::new(criteria);
    let indices = entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| !exclusion.excludes(entry))
        .map(|(i, _)| i)
        .collect();
    FilteredView {
        indices,
        revision: 0,
    }
}

/// What `LogFilterEngine::refresh` had to do
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Refresh {
    Unchanged,
    /// Only entries appended since the last refresh were filtered
    Extended,
    Rebuilt,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct DeriveKey {
    generation: u64,
    scanned: usize,
    criteria: FilterCriteria,
}

/// Memoized derivation of the filtered view.
///
/// Keyed on the buffer generation, the number of entries already filtered and
/// the criteria. Appends to the same buffer generation are filtered
/// incrementally; anything else rebuilds the view.
#[derive(Default)]
pub struct LogFilterEngine {
    key: Option<DeriveKey>,
    view: FilteredView,
}

impl LogFilterEngine {
    pub fn view(&self) -> &FilteredView {
        &self.view
    }

    pub fn refresh(&mut self, raw: &RawBuffer, criteria: &FilterCriteria) -> Refresh {
        if let Some(key) = &self.key {
            let same_source = key.generation == raw.generation() && key.criteria == *criteria;
            if same_source && key.scanned == raw.len() {
                return Refresh::Unchanged;
            }
            if same_source && key.scanned < raw.len() {
                let from = key.scanned;
                let exclusion = Exclusion::new(criteria);
                for (offset, entry) in raw.entries()[from..].iter().enumerate() {
                    if !exclusion.excludes(entry) {
                        self.view.indices.push(from + offset);
                    }
                }
                if let Some(key) = &mut self.key {
                    key.scanned = raw.len();
                }
                return Refresh::Extended;
            }
        }

        let revision = self.view.revision + 1;
        self.view = derive_view(raw.entries(), criteria);
        self.view.revision = revision;
        self.key = Some(DeriveKey {
            generation: raw.generation(),
            scanned: raw.len(),
            criteria: criteria.clone(),
        });
        Refresh::Rebuilt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::entry;

    fn buffer(entries: Vec<LogEntry>) -> RawBuffer {
        let mut raw = RawBuffer::default();
        raw.replace(entries);
        raw
    }

    fn sample() -> RawBuffer {
        buffer(vec![
            entry(Some(LogLevel::Info), "a"),
            entry(Some(LogLevel::Error), "b"),
            entry(Some(LogLevel::Warn), "c"),
        ])
    }

    fn messages<'a>(view: &'a FilteredView, raw: &'a RawBuffer) -> Vec<&'a str> {
        view.entries(raw).map(|e| e.message.as_str()).collect()
    }

    #[test]
    fn test_level_filter_builds_index_map() {
        let raw = sample();
        let criteria = FilterCriteria {
            levels: [LogLevel::Error, LogLevel::Warn].into_iter().collect(),
            ..Default::default()
        };
        let view = derive_view(raw.entries(), &criteria);
        assert_eq!(messages(&view, &raw), vec!["b", "c"]);
        assert_eq!(view.indices(), &[1, 2]);
    }

    #[test]
    fn test_empty_criteria_keeps_everything() {
        let raw = sample();
        let view = derive_view(raw.entries(), &FilterCriteria::default());
        assert_eq!(view.indices(), &[0, 1, 2]);
    }

    #[test]
    fn test_search_only_excludes_when_exclude_flag_set() {
        let raw = buffer(vec![
            entry(Some(LogLevel::Info), "GET /health"),
            entry(Some(LogLevel::Info), "POST /orders"),
            entry(None, "get /metrics"),
        ]);
        let mut criteria = FilterCriteria {
            search: "get".to_string(),
            ..Default::default()
        };
        assert_eq!(derive_view(raw.entries(), &criteria).len(), 3);

        criteria.exclude_matches = true;
        let view = derive_view(raw.entries(), &criteria);
        assert_eq!(messages(&view, &raw), vec!["POST /orders"]);
    }

    #[test]
    fn test_unleveled_entries_hidden_by_level_filter() {
        let raw = buffer(vec![entry(None, "x"), entry(Some(LogLevel::Debug), "y")]);
        let mut criteria = FilterCriteria::default();
        criteria.toggle_level(LogLevel::Debug);
        assert_eq!(derive_view(raw.entries(), &criteria).indices(), &[1]);

        criteria.toggle_level(LogLevel::Debug);
        assert!(criteria.levels.is_empty());
    }

    #[test]
    fn test_partition_matches_predicate() {
        let raw = buffer(
            (0..40)
                .map(|i| {
                    let level = LogLevel::ALL[i % LogLevel::ALL.len()];
                    let level = if i % 7 == 0 { None } else { Some(level) };
                    entry(level, &format!("line {} {}", i, if i % 3 == 0 { "Timeout" } else { "ok" }))
                })
                .collect(),
        );
        let criteria = FilterCriteria {
            levels: [LogLevel::Info, LogLevel::Error, LogLevel::Panic].into_iter().collect(),
            search: "timeout".to_string(),
            exclude_matches: true,
        };
        let view = derive_view(raw.entries(), &criteria);

        for (i, e) in raw.entries().iter().enumerate() {
            let visible = view.filtered_index(i).is_some();
            assert_eq!(visible, !criteria.excludes(e), "entry {}", i);
        }
        for (filtered, &original) in view.indices().iter().enumerate() {
            assert_eq!(view.entry(&raw, filtered), raw.get(original));
        }
        assert!(view.indices().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_duplicate_entries_map_to_distinct_indices() {
        let raw = buffer(vec![
            entry(Some(LogLevel::Info), "same"),
            entry(Some(LogLevel::Debug), "same"),
            entry(Some(LogLevel::Info), "same"),
        ]);
        let criteria = FilterCriteria {
            levels: [LogLevel::Info].into_iter().collect(),
            ..Default::default()
        };
        assert_eq!(derive_view(raw.entries(), &criteria).indices(), &[0, 2]);
    }

    #[test]
    fn test_engine_extends_on_append_and_rebuilds_on_change() {
        let mut raw = sample();
        let mut criteria = FilterCriteria {
            levels: [LogLevel::Error, LogLevel::Warn].into_iter().collect(),
            ..Default::default()
        };
        let mut engine = LogFilterEngine::default();

        assert_eq!(engine.refresh(&raw, &criteria), Refresh::Rebuilt);
        let revision = engine.view().revision();
        assert_eq!(engine.refresh(&raw, &criteria), Refresh::Unchanged);

        raw.extend(vec![
            entry(Some(LogLevel::Error), "d"),
            entry(Some(LogLevel::Info), "e"),
        ]);
        assert_eq!(engine.refresh(&raw, &criteria), Refresh::Extended);
        assert_eq!(engine.view().indices(), &[1, 2, 3]);
        assert_eq!(engine.view().revision(), revision);
        assert_eq!(*engine.view(), {
            let mut v = derive_view(raw.entries(), &criteria);
            v.revision = revision;
            v
        });

        criteria.levels.clear();
        assert_eq!(engine.refresh(&raw, &criteria), Refresh::Rebuilt);
        assert_eq!(engine.view().len(), 5);
        assert!(engine.view().revision() > revision);

        raw.replace(vec![entry(Some(LogLevel::Info), "fresh")]);
        assert_eq!(engine.refresh(&raw, &criteria), Refresh::Rebuilt);
        assert_eq!(engine.view().indices(), &[0]);
    }
}
