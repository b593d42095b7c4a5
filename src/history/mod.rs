//! Undo/redo history of label edits.
//!
//! The history is a bounded list of [`LabelEdit`]s plus a cursor on the
//! last applied one. Undo restores the edit under the cursor and steps
//! back; redo restores the next one and steps forward. A fresh edit after
//! an undo drops the entries that could have been redone.

mod edit;
mod persist;

use crate::volume::VolumeError;

pub use edit::{DirectTarget, EditTarget, LabelEdit};
pub use persist::PersistError;

// ============================================================================
// History Manager
// ============================================================================

/// Bounded undo/redo log.
#[derive(Debug, Clone)]
pub struct HistoryManager {
    entries: Vec<LabelEdit>,
    /// Number of entries currently applied; the cursor is `applied - 1`.
    applied: usize,
    /// Oldest entries are evicted beyond this
    max_size: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_HISTORY_SIZE)
    }
}

impl HistoryManager {
    /// An empty history keeping at most `max_size` edits (at least one).
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Vec::new(),
            applied: 0,
            max_size: max_size.max(1),
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LabelEdit] {
        &self.entries
    }

    /// Index of the last applied edit, `None` when everything is undone.
    pub fn cursor(&self) -> Option<usize> {
        self.applied.checked_sub(1)
    }

    pub fn can_undo(&self) -> bool {
        self.applied > 0
    }

    pub fn can_redo(&self) -> bool {
        self.applied < self.entries.len()
    }

    /// Record an edit that has just been applied.
    pub fn append(&mut self, edit: LabelEdit) {
        if self.applied < self.entries.len() {
            log::debug!(
                "🗑️ History: dropping {} redoable edits",
                self.entries.len() - self.applied
            );
            self.entries.truncate(self.applied);
        }
        self.entries.push(edit);

        if self.entries.len() > self.max_size {
            let excess = self.entries.len() - self.max_size;
            self.entries.drain(..excess);
            log::trace!("History: evicted {} oldest edits", excess);
        }
        self.applied = self.entries.len();
        log::debug!("📝 History: {} edits", self.entries.len());
    }

    /// Undo the edit under the cursor. `Ok(false)` when there is nothing
    /// to undo. On error the cursor stays put.
    pub fn undo(&mut self, target: &mut dyn EditTarget) -> Result<bool, VolumeError> {
        let Some(index) = self.cursor() else {
            return Ok(false);
        };
        self.entries[index].restore(target)?;
        self.applied -= 1;
        log::debug!("⏪ Undo: edit {} (label {})", index, self.entries[index].label_number);
        Ok(true)
    }

    /// Redo the edit after the cursor. `Ok(false)` when there is nothing
    /// to redo.
    pub fn redo(&mut self, target: &mut dyn EditTarget) -> Result<bool, VolumeError> {
        if !self.can_redo() {
            return Ok(false);
        }
        let index = self.applied;
        self.entries[index].restore(target)?;
        self.applied += 1;
        log::debug!("⏩ Redo: edit {} (label {})", index, self.entries[index].label_number);
        Ok(true)
    }

    /// Forget every edit of `label` and renumber the others so label ids
    /// stay dense. Expects no edit in flight.
    pub fn remove_label(&mut self, label: u8) {
        if label == 0 {
            log::warn!("History: label 0 cannot be removed");
            return;
        }
        let before = self.entries.len();
        let mut index = 0;
        let applied = &mut self.applied;
        self.entries.retain_mut(|edit| {
            let keep = edit.label_number != label;
            if keep {
                edit.renumber_without(label);
                if edit.label_number > label {
                    edit.label_number -= 1;
                }
            } else if index < *applied {
                *applied -= 1;
            }
            index += 1;
            keep
        });
        log::debug!(
            "History: removed label {} ({} edits dropped)",
            label,
            before - self.entries.len()
        );
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.applied = 0;
        log::debug!("🗑️ History cleared");
    }

    /// Rebuild from persisted parts, clamping the applied count.
    pub(crate) fn from_parts(entries: Vec<LabelEdit>, applied: usize, max_size: usize) -> Self {
        let mut history = Self::new(max_size);
        let excess = entries.len().saturating_sub(history.max_size);
        history.entries = entries;
        history.entries.drain(..excess);
        history.applied = applied.saturating_sub(excess).min(history.entries.len());
        history
    }
}
