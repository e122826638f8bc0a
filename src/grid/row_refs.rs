//! Row renumbering for references held outside the grid.
//!
//! Row positions are not stable identifiers. Anything that remembers a row
//! index (an error list entry, a pending notice) stores it in a [`RowRefs`]
//! and applies every [`RowShift`] the grid reports after a structural change.

/// A structural change to the grid's rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowShift {
    /// `amount` rows were inserted before `index`.
    Inserted { index: usize, amount: usize },
    /// Rows `[index, index + amount)` were removed.
    Removed { index: usize, amount: usize },
}

impl RowShift {
    /// Maps a row index from before the change to after it.
    ///
    /// Returns `None` when the row itself was removed.
    pub fn remap(&self, row: usize) -> Option<usize> {
        match *self {
            RowShift::Inserted { index, amount } => {
                if row >= index {
                    Some(row + amount)
                } else {
                    Some(row)
                }
            }
            RowShift::Removed { index, amount } => {
                if row < index {
                    Some(row)
                } else if row < index + amount {
                    None
                } else {
                    Some(row - amount)
                }
            }
        }
    }
}

/// Items keyed by a grid row index that follow the grid's renumbering.
#[derive(Debug, Clone)]
pub struct RowRefs<T> {
    entries: Vec<(usize, T)>,
}

impl<T> Default for RowRefs<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RowRefs<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, row: usize, item: T) {
        self.entries.push((row, item));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Applies a structural change: entries inside a removed range are
    /// discarded, entries after it move by the size of the change.
    pub fn apply(&mut self, shift: &RowShift) {
        self.entries.retain_mut(|(row, _)| match shift.remap(*row) {
            Some(new_row) => {
                *row = new_row;
                true
            }
            None => false,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.entries.iter().map(|(row, item)| (*row, item))
    }

    /// Distinct rows referenced, ascending.
    pub fn rows(&self) -> Vec<usize> {
        let mut rows: Vec<usize> = self.entries.iter().map(|(row, _)| *row).collect();
        rows.sort_unstable();
        rows.dedup();
        rows
    }

    pub fn for_row(&self, row: usize) -> impl Iterator<Item = &T> {
        self.entries
            .iter()
            .filter(move |(r, _)| *r == row)
            .map(|(_, item)| item)
    }
}
