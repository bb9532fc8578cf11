use std::collections::BTreeSet;

/// Line selection over filtered indices.
///
/// The anchor is the last row targeted by a plain click or a single-step
/// move; shift-click and shift-moves extend from it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectionModel {
    selected: BTreeSet<usize>,
    anchor: Option<usize>,
}

/// Direction of a keyboard step
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Up,
    Down,
}

impl Step {
    fn delta(self) -> isize {
        match self {
            Step::Up => -1,
            Step::Down => 1,
        }
    }
}

impl SelectionModel {
    pub fn selected(&self) -> &BTreeSet<usize> {
        &self.selected
    }

    pub fn anchor(&self) -> Option<usize> {
        self.anchor
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selected.contains(&index)
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    /// Mouse click on a row. Shift with an anchor selects the inclusive range
    /// between anchor and `index`; otherwise toggles `index` and anchors it.
    pub fn click(&mut self, index: usize, extend: bool) {
        match (extend, self.anchor) {
            (true, Some(anchor)) => {
                self.selected = range(anchor, index);
            }
            _ => {
                if !self.selected.remove(&index) {
                    self.selected.insert(index);
                }
                self.anchor = Some(index);
            }
        }
    }

    /// Replace the selection with a single anchored row
    pub fn select_only(&mut self, index: usize) {
        self.selected = BTreeSet::from([index]);
        self.anchor = Some(index);
    }

    /// Move a single-row selection one line from the anchor.
    ///
    /// Without an anchor the move starts from the selection edge facing the
    /// direction, or from just outside the view when nothing is selected.
    /// Returns the new row, or `None` when already at the boundary.
    pub fn step(&mut self, step: Step, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        let fallback = match step {
            Step::Down => self.selected.last().map(|&i| i as isize).unwrap_or(-1),
            Step::Up => self.selected.first().map(|&i| i as isize).unwrap_or(len as isize),
        };
        let base = self.anchor.map(|a| a as isize).unwrap_or(fallback);
        let next = clamp(base + step.delta(), len);
        if next as isize == base {
            return None;
        }
        self.select_only(next);
        Some(next)
    }

    /// Grow or shrink the selected range by one line, keeping the anchor
    /// fixed. Returns the row that became the moving edge.
    pub fn extend(&mut self, step: Step, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        let first = self.selected.first().copied();
        let last = self.selected.last().copied();

        let anchor = match self.anchor {
            Some(anchor) => anchor,
            None => {
                let anchor = match (step, first, last) {
                    (Step::Down, Some(first), _) => first,
                    (Step::Up, _, Some(last)) => last,
                    (Step::Down, None, _) => 0,
                    (Step::Up, _, None) => len - 1,
                };
                self.anchor = Some(anchor);
                anchor
            }
        };

        let active = match step {
            Step::Down => last.unwrap_or(anchor),
            Step::Up => first.unwrap_or(anchor),
        };
        let target = clamp(active as isize + step.delta(), len);
        if target == active {
            return None;
        }
        self.selected = range(anchor, target);
        Some(target)
    }

    pub fn clear(&mut self) {
        self.selected.clear();
        self.anchor = None;
    }

    /// Selected rows that still exist in a view of `len` rows, ascending
    pub fn valid_indices(&self, len: usize) -> Vec<usize> {
        self.selected.range(..len).copied().collect()
    }
}

fn range(a: usize, b: usize) -> BTreeSet<usize> {
    (a.min(b)..=a.max(b)).collect()
}

fn clamp(index: isize, len: usize) -> usize {
    index.clamp(0, len as isize - 1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[usize]) -> BTreeSet<usize> {
        items.iter().copied().collect()
    }

    #[test]
    fn test_click_toggles_and_anchors() {
        let mut sel = SelectionModel::default();
        sel.click(3, false);
        sel.click(5, false);
        assert_eq!(sel.selected(), &set(&[3, 5]));
        assert_eq!(sel.anchor(), Some(5));

        sel.click(3, false);
        assert_eq!(sel.selected(), &set(&[5]));
        assert_eq!(sel.anchor(), Some(3));
    }

    #[test]
    fn test_shift_click_selects_range_from_anchor() {
        let mut sel = SelectionModel::default();
        sel.click(6, false);
        sel.click(2, true);
        assert_eq!(sel.selected(), &set(&[2, 3, 4, 5, 6]));
        // Anchor stays put so the range can be re-extended
        assert_eq!(sel.anchor(), Some(6));
        sel.click(8, true);
        assert_eq!(sel.selected(), &set(&[6, 7, 8]));
    }

    #[test]
    fn test_shift_click_without_anchor_is_plain_click() {
        let mut sel = SelectionModel::default();
        sel.click(4, true);
        assert_eq!(sel.selected(), &set(&[4]));
        assert_eq!(sel.anchor(), Some(4));
    }

    #[test]
    fn test_step_from_empty_selection_starts_at_boundary() {
        let mut sel = SelectionModel::default();
        assert_eq!(sel.step(Step::Down, 5), Some(0));
        assert_eq!(sel.selected(), &set(&[0]));

        let mut sel = SelectionModel::default();
        assert_eq!(sel.step(Step::Up, 5), Some(4));
        assert_eq!(sel.anchor(), Some(4));
    }

    #[test]
    fn test_step_moves_from_anchor_and_clamps() {
        let mut sel = SelectionModel::default();
        sel.click(1, false);
        sel.click(3, false);
        assert_eq!(sel.step(Step::Up, 4), Some(2));
        assert_eq!(sel.selected(), &set(&[2]));
        assert_eq!(sel.step(Step::Down, 4), Some(3));
        assert_eq!(sel.step(Step::Down, 4), None);
        assert_eq!(sel.selected(), &set(&[3]));
        assert_eq!(sel.step(Step::Down, 0), None);
    }

    #[test]
    fn test_extend_grows_from_anchor() {
        let mut sel = SelectionModel::default();
        sel.select_only(2);
        assert_eq!(sel.extend(Step::Down, 10), Some(3));
        assert_eq!(sel.extend(Step::Down, 10), Some(4));
        assert_eq!(sel.selected(), &set(&[2, 3, 4]));
        assert_eq!(sel.anchor(), Some(2));

        assert_eq!(sel.extend(Step::Up, 10), Some(1));
        assert_eq!(sel.selected(), &set(&[1, 2]));
    }

    #[test]
    fn test_extend_without_anchor_picks_edge() {
        let mut sel = SelectionModel::default();
        assert_eq!(sel.extend(Step::Up, 3), Some(1));
        assert_eq!(sel.anchor(), Some(2));
        assert_eq!(sel.selected(), &set(&[1, 2]));

        let mut sel = SelectionModel::default();
        assert_eq!(sel.extend(Step::Up, 1), None);
        assert_eq!(sel.anchor(), Some(0));
    }

    #[test]
    fn test_clear_and_valid_indices() {
        let mut sel = SelectionModel::default();
        sel.click(1, false);
        sel.click(7, false);
        assert_eq!(sel.valid_indices(5), vec![1]);
        sel.clear();
        assert!(sel.is_empty());
        assert_eq!(sel.anchor(), None);
    }
}
