use std::collections::BTreeSet;

use crate::filter::FilteredView;

/// Outcome of toggling pins on a selection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinToggle {
    Pinned(usize),
    Unpinned(usize),
}

/// Outcome of stepping through pinned lines
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinTarget {
    /// The pinned line is visible at this filtered index
    Visible(usize),
    /// The pinned line exists but the current filters hide it
    Hidden(usize),
}

/// Pinned lines, keyed by original buffer index so pins survive filter
/// changes
#[derive(Clone, Debug, Default)]
pub struct PinRegistry {
    pinned: BTreeSet<usize>,
    /// Position in the ascending list of pinned indices
    cursor: usize,
}

impl PinRegistry {
    pub fn is_pinned(&self, original: usize) -> bool {
        self.pinned.contains(&original)
    }

    pub fn pinned(&self) -> &BTreeSet<usize> {
        &self.pinned
    }

    pub fn len(&self) -> usize {
        self.pinned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pinned.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Pin every selected line, or unpin them all when every one of them is
    /// already pinned. `selected` holds filtered indices.
    pub fn toggle_selected(
        &mut self,
        selected: impl IntoIterator<Item = usize>,
        view: &FilteredView,
    ) -> Option<PinToggle> {
        let originals: Vec<usize> = selected
            .into_iter()
            .filter_map(|filtered| view.original_index(filtered))
            .collect();
        if originals.is_empty() {
            return None;
        }

        let all_pinned = originals.iter().all(|i| self.pinned.contains(i));
        if all_pinned {
            for i in &originals {
                self.pinned.remove(i);
            }
            self.clamp_cursor();
            Some(PinToggle::Unpinned(originals.len()))
        } else {
            self.pinned.extend(originals.iter().copied());
            Some(PinToggle::Pinned(originals.len()))
        }
    }

    /// Step the cursor by `offset` (cyclic) and resolve the pinned line into
    /// the current view. `None` when nothing is pinned.
    pub fn navigate(&mut self, offset: isize, view: &FilteredView) -> Option<PinTarget> {
        let len = self.pinned.len();
        if len == 0 {
            return None;
        }
        let len = len as isize;
        self.cursor = (self.cursor as isize + offset).rem_euclid(len) as usize;

        let original = *self.pinned.iter().nth(self.cursor)?;
        Some(match view.filtered_index(original) {
            Some(filtered) => PinTarget::Visible(filtered),
            None => PinTarget::Hidden(original),
        })
    }

    /// Filtered indices of pinned lines visible in `view`
    pub fn visible_in(&self, view: &FilteredView) -> BTreeSet<usize> {
        self.pinned
            .iter()
            .filter_map(|&original| view.filtered_index(original))
            .collect()
    }

    pub fn clear(&mut self) {
        self.pinned.clear();
        self.cursor = 0;
    }

    fn clamp_cursor(&mut self) {
        if self.pinned.is_empty() {
            self.cursor = 0;
        } else if self.cursor >= self.pinned.len() {
            self.cursor = self.pinned.len() - 1;
        }
    }
}
