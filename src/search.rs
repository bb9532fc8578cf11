use crate::filter::{FilteredView, contains_ignore_case};
use crate::stream::RawBuffer;

/// Positions of the search text within the filtered view, with a cyclic
/// cursor for `n`/`N` navigation
#[derive(Default)]
pub struct SearchNavigator {
    query: String,
    needle: String,
    /// Filtered indices whose text contains the query
    matches: Vec<usize>,
    current: usize,
    /// Revision of the view the matches were computed against
    revision: Option<u64>,
    /// Number of filtered rows already scanned
    scanned: usize,
}

impl SearchNavigator {
    /// Bring the matches up to date with `view` and `query`.
    ///
    /// The cursor goes back to the first match whenever the query changes.
    /// Rows appended to an unchanged view are scanned incrementally.
    pub fn refresh(&mut self, raw: &RawBuffer, view: &FilteredView, query: &str) {
        if query != self.query {
            self.query = query.to_string();
            self.needle = query.to_lowercase();
            self.current = 0;
            self.revision = None;
        }

        if self.revision != Some(view.revision()) || self.scanned > view.len() {
            self.matches.clear();
            self.scanned = 0;
            self.revision = Some(view.revision());
        }

        if !self.needle.is_empty() {
            for filtered in self.scanned..view.len() {
                let hit = view
                    .entry(raw, filtered)
                    .is_some_and(|e| contains_ignore_case(e.display_text(), &self.needle));
                if hit {
                    self.matches.push(filtered);
                }
            }
        }
        self.scanned = view.len();

        if !self.matches.is_empty() && self.current >= self.matches.len() {
            self.current = self.matches.len() - 1;
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn matches(&self) -> &[usize] {
        &self.matches
    }

    pub fn current_match_index(&self) -> usize {
        self.current
    }

    /// Filtered index of the current match
    pub fn current_target(&self) -> Option<usize> {
        self.matches.get(self.current).copied()
    }

    pub fn is_match(&self, filtered: usize) -> bool {
        self.matches.binary_search(&filtered).is_ok()
    }

    /// Advance to the next match, wrapping around. Returns the filtered index
    /// to scroll to.
    pub fn next(&mut self) -> Option<usize> {
        if self.matches.is_empty() {
            return None;
        }
        self.current = (self.current + 1) % self.matches.len();
        self.current_target()
    }

    pub fn previous(&mut self) -> Option<usize> {
        if self.matches.is_empty() {
            return None;
        }
        let len = self.matches.len();
        self.current = (self.current + len - 1) % len;
        self.current_target()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{LogEntry, LogLevel, entry};
    use crate::filter::{FilterCriteria, LogFilterEngine};

    fn setup(entries: Vec<LogEntry>, criteria: &FilterCriteria) -> (RawBuffer, LogFilterEngine) {
        let mut raw = RawBuffer::default();
        raw.replace(entries);
        let mut engine = LogFilterEngine::default();
        engine.refresh(&raw, criteria);
        (raw, engine)
    }

    #[test]
    fn test_matches_are_filtered_indices() {
        let criteria = FilterCriteria {
            levels: [LogLevel::Error, LogLevel::Warn].into_iter().collect(),
            search: "b".to_string(),
            exclude_matches: false,
        };
        let (raw, engine) = setup(
            vec![
                entry(Some(LogLevel::Info), "a"),
                entry(Some(LogLevel::Error), "b"),
                entry(Some(LogLevel::Warn), "c"),
            ],
            &criteria,
        );
        let mut search = SearchNavigator::default();
        search.refresh(&raw, engine.view(), &criteria.search);
        assert_eq!(search.matches(), &[0]);
    }

    #[test]
    fn test_next_and_previous_wrap_around() {
        let criteria = FilterCriteria::default();
        let (raw, engine) = setup(
            vec![
                entry(None, "Timeout 1"),
                entry(None, "ok"),
                entry(None, "timeout 2"),
                entry(None, "TIMEOUT 3"),
            ],
            &criteria,
        );
        let mut search = SearchNavigator::default();
        search.refresh(&raw, engine.view(), "timeout");
        assert_eq!(search.matches(), &[0, 2, 3]);
        assert_eq!(search.current_target(), Some(0));

        assert_eq!(search.previous(), Some(3));
        assert_eq!(search.next(), Some(0));
        assert_eq!(search.next(), Some(2));
        assert_eq!(search.next(), Some(3));
        assert_eq!(search.next(), Some(0));
    }

    #[test]
    fn test_next_then_previous_is_identity() {
        let (raw, engine) = setup(
            vec![entry(None, "x"), entry(None, "x"), entry(None, "x")],
            &FilterCriteria::default(),
        );
        let mut search = SearchNavigator::default();
        search.refresh(&raw, engine.view(), "x");
        for _ in 0..3 {
            let start = search.current_match_index();
            search.next();
            search.previous();
            assert_eq!(search.current_match_index(), start);
            search.next();
        }
    }

    #[test]
    fn test_no_matches_is_noop() {
        let (raw, engine) = setup(vec![entry(None, "abc")], &FilterCriteria::default());
        let mut search = SearchNavigator::default();
        search.refresh(&raw, engine.view(), "zzz");
        assert_eq!(search.next(), None);
        assert_eq!(search.previous(), None);
        assert_eq!(search.current_match_index(), 0);

        search.refresh(&raw, engine.view(), "");
        assert!(search.matches().is_empty());
    }

    #[test]
    fn test_query_change_resets_cursor() {
        let (raw, engine) = setup(
            vec![entry(None, "ab"), entry(None, "ab"), entry(None, "b")],
            &FilterCriteria::default(),
        );
        let mut search = SearchNavigator::default();
        search.refresh(&raw, engine.view(), "ab");
        search.next();
        assert_eq!(search.current_match_index(), 1);

        search.refresh(&raw, engine.view(), "b");
        assert_eq!(search.current_match_index(), 0);
        assert_eq!(search.matches(), &[0, 1, 2]);
    }

    #[test]
    fn test_no_regex_interpretation() {
        let (raw, engine) = setup(
            vec![entry(None, "a.c"), entry(None, "abc")],
            &FilterCriteria::default(),
        );
        let mut search = SearchNavigator::default();
        search.refresh(&raw, engine.view(), "a.c");
        assert_eq!(search.matches(), &[0]);
    }

    #[test]
    fn test_appended_rows_are_scanned_incrementally() {
        let criteria = FilterCriteria::default();
        let (mut raw, mut engine) = setup(vec![entry(None, "err 1")], &criteria);
        let mut search = SearchNavigator::default();
        search.refresh(&raw, engine.view(), "err");
        search.next();

        raw.extend(vec![entry(None, "fine"), entry(None, "err 2")]);
        engine.refresh(&raw, &criteria);
        search.refresh(&raw, engine.view(), "err");
        assert_eq!(search.matches(), &[0, 2]);
        assert_eq!(search.current_match_index(), 0);
        assert!(search.is_match(2));
        assert!(!search.is_match(1));
    }
}
