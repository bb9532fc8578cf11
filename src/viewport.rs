//! Windowing over the filtered rows.
//!
//! Rows have an estimated height that depends only on the wrap toggle. Rows
//! that render taller, such as expanded JSON, report a measured height that
//! overrides the estimate. Offsets are in terminal lines.

use std::collections::BTreeMap;

/// Estimated height of a row with wrapping off
pub const ROW_HEIGHT: usize = 1;
/// Estimated height of a row with wrapping on
pub const WRAPPED_ROW_HEIGHT: usize = 2;

pub fn estimated_row_height(wrap: bool) -> usize {
    if wrap { WRAPPED_ROW_HEIGHT } else { ROW_HEIGHT }
}

/// Where a row should land when scrolled to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Align {
    Start,
    Center,
    End,
    /// Scroll the least amount that makes the row fully visible
    Auto,
}

/// One materialized row: its index and the line it starts at
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VisibleRow {
    pub index: usize,
    pub start: usize,
    pub height: usize,
}

#[derive(Clone, Debug)]
pub struct Viewport {
    count: usize,
    row_height: usize,
    /// Lines available for rows
    height: usize,
    /// First visible line
    offset: usize,
    measured: BTreeMap<usize, usize>,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            count: 0,
            row_height: ROW_HEIGHT,
            height: 0,
            offset: 0,
            measured: BTreeMap::new(),
        }
    }
}

impl Viewport {
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn row_height(&self) -> usize {
        self.row_height
    }

    /// Row count changed; keeps the offset unless it would run past the end
    pub fn set_count(&mut self, count: usize) {
        self.count = count;
        self.clamp();
    }

    pub fn set_height(&mut self, height: usize) {
        self.height = height;
        self.clamp();
    }

    /// Change the estimate, keeping the first visible row in place
    pub fn set_row_height(&mut self, row_height: usize) {
        let row_height = row_height.max(1);
        if row_height == self.row_height {
            return;
        }
        let first = self.index_at(self.offset);
        self.row_height = row_height;
        if let Some(first) = first {
            self.offset = self.start_of(first);
        }
        self.clamp();
    }

    /// Replace measured heights. Keys are row indices, values line counts.
    pub fn set_measured(&mut self, measured: BTreeMap<usize, usize>) {
        self.measured = measured
            .into_iter()
            .filter(|&(_, height)| height > 0)
            .collect();
        self.clamp();
    }

    pub fn total_height(&self) -> usize {
        self.start_of(self.count)
    }

    pub fn max_offset(&self) -> usize {
        self.total_height().saturating_sub(self.height)
    }

    pub fn is_at_bottom(&self) -> bool {
        self.offset >= self.max_offset()
    }

    /// Rows intersecting the visible lines, in order
    pub fn window(&self) -> Vec<VisibleRow> {
        let mut rows = Vec::new();
        let Some(mut index) = self.index_at(self.offset) else {
            return rows;
        };
        let end = self.offset + self.height;
        let mut start = self.start_of(index);
        while index < self.count && start < end {
            let height = self.height_of(index);
            rows.push(VisibleRow {
                index,
                start,
                height,
            });
            start += height;
            index += 1;
        }
        rows
    }

    pub fn scroll_to_index(&mut self, index: usize, align: Align) {
        if self.count == 0 {
            return;
        }
        let index = index.min(self.count - 1);
        let start = self.start_of(index);
        let height = self.height_of(index);
        self.offset = match align {
            Align::Start => start,
            Align::End => (start + height).saturating_sub(self.height),
            Align::Center => (start + height / 2).saturating_sub(self.height / 2),
            Align::Auto if start < self.offset => start,
            Align::Auto if start + height > self.offset + self.height => {
                (start + height).saturating_sub(self.height)
            }
            Align::Auto => self.offset,
        };
        self.clamp();
    }

    pub fn scroll_to_bottom(&mut self) {
        self.offset = self.max_offset();
    }

    pub fn scroll_to_top(&mut self) {
        self.offset = 0;
    }

    pub fn scroll_by(&mut self, lines: isize) {
        self.offset = self.offset.saturating_add_signed(lines);
        self.clamp();
    }

    /// Row under the `y`th visible line
    pub fn row_at(&self, y: usize) -> Option<usize> {
        if y >= self.height {
            return None;
        }
        self.index_at(self.offset + y)
    }

    fn height_of(&self, index: usize) -> usize {
        self.measured.get(&index).copied().unwrap_or(self.row_height)
    }

    fn start_of(&self, index: usize) -> usize {
        let (measured_rows, measured_lines) = self
            .measured
            .range(..index)
            .fold((0, 0), |(rows, lines), (_, h)| (rows + 1, lines + h));
        (index - measured_rows) * self.row_height + measured_lines
    }

    /// Row containing absolute line `line`
    fn index_at(&self, line: usize) -> Option<usize> {
        if line >= self.total_height() {
            return None;
        }
        let mut base_index = 0;
        let mut base_start = 0;
        for (&index, &height) in self.measured.range(..self.count) {
            let start = base_start + (index - base_index) * self.row_height;
            if line < start {
                break;
            }
            if line < start + height {
                return Some(index);
            }
            base_index = index + 1;
            base_start = start + height;
        }
        Some(base_index + (line - base_start) / self.row_height)
    }

    fn clamp(&mut self) {
        self.offset = self.offset.min(self.max_offset());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport(count: usize, height: usize) -> Viewport {
        let mut v = Viewport::default();
        v.set_height(height);
        v.set_count(count);
        v
    }

    fn indices(v: &Viewport) -> Vec<usize> {
        v.window().iter().map(|r| r.index).collect()
    }

    #[test]
    fn test_window_follows_offset() {
        let mut v = viewport(100, 5);
        assert_eq!(indices(&v), vec![0, 1, 2, 3, 4]);
        v.scroll_by(10);
        assert_eq!(indices(&v), vec![10, 11, 12, 13, 14]);
        assert_eq!(v.window()[0].start, 10);
        v.scroll_by(-50);
        assert_eq!(v.offset(), 0);
    }

    #[test]
    fn test_short_list_and_empty_list() {
        let v = viewport(3, 10);
        assert_eq!(indices(&v), vec![0, 1, 2]);
        assert_eq!(v.max_offset(), 0);
        assert!(viewport(0, 10).window().is_empty());
    }

    #[test]
    fn test_scroll_to_index_alignments() {
        let mut v = viewport(100, 10);
        v.scroll_to_index(50, Align::Center);
        assert_eq!(v.offset(), 45);
        v.scroll_to_index(50, Align::Start);
        assert_eq!(v.offset(), 50);
        v.scroll_to_index(50, Align::End);
        assert_eq!(v.offset(), 41);
        v.scroll_to_index(99, Align::Start);
        assert_eq!(v.offset(), 90);
    }

    #[test]
    fn test_auto_align_scrolls_minimally() {
        let mut v = viewport(100, 10);
        v.scroll_to_index(5, Align::Auto);
        assert_eq!(v.offset(), 0);
        v.scroll_to_index(12, Align::Auto);
        assert_eq!(v.offset(), 3);
        v.scroll_to_index(2, Align::Auto);
        assert_eq!(v.offset(), 2);
    }

    #[test]
    fn test_appends_do_not_move_window() {
        let mut v = viewport(20, 5);
        v.scroll_by(7);
        v.set_count(25);
        assert_eq!(v.offset(), 7);
        v.scroll_to_bottom();
        assert!(v.is_at_bottom());
        assert_eq!(v.offset(), 20);

        v.set_count(4);
        assert_eq!(v.offset(), 0);
    }

    #[test]
    fn test_wrap_doubles_rows_and_keeps_first_row() {
        let mut v = viewport(100, 10);
        v.scroll_to_index(30, Align::Start);
        v.set_row_height(estimated_row_height(true));
        assert_eq!(v.offset(), 60);
        assert_eq!(indices(&v), vec![30, 31, 32, 33, 34]);
        assert_eq!(v.total_height(), 200);
    }

    #[test]
    fn test_measured_rows_shift_later_rows() {
        let mut v = viewport(10, 6);
        v.set_measured(BTreeMap::from([(1, 4)]));
        assert_eq!(v.total_height(), 13);

        let window = v.window();
        assert_eq!(
            window,
            vec![
                VisibleRow { index: 0, start: 0, height: 1 },
                VisibleRow { index: 1, start: 1, height: 4 },
                VisibleRow { index: 2, start: 5, height: 1 },
            ]
        );
        assert_eq!(v.row_at(3), Some(1));
        assert_eq!(v.row_at(5), Some(2));
        assert_eq!(v.row_at(6), None);
    }

    #[test]
    fn test_row_at_past_end() {
        let v = viewport(2, 10);
        assert_eq!(v.row_at(1), Some(1));
        assert_eq!(v.row_at(2), None);
    }
}
