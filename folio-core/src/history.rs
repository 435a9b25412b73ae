use std::collections::VecDeque;

pub type Snapshot = Vec<String>;

/// Linear undo/redo over full page snapshots.
///
/// Recording a new snapshot discards everything that could have been redone.
#[derive(Debug, Clone, Default)]
pub struct EditHistory {
    undo: VecDeque<Snapshot>,
    redo: Vec<Snapshot>,
    limit: Option<usize>,
}

impl EditHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps at most `limit` undo snapshots, dropping the oldest first.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn record(&mut self, previous: Snapshot) {
        self.redo.clear();
        self.push_undo(previous);
    }

    pub fn undo(&mut self, current: Snapshot) -> Option<Snapshot> {
        let previous = self.undo.pop_back()?;
        self.redo.push(current);
        Some(previous)
    }

    pub fn redo(&mut self, current: Snapshot) -> Option<Snapshot> {
        let next = self.redo.pop()?;
        self.push_undo(current);
        Some(next)
    }

    pub fn reset(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    fn push_undo(&mut self, snapshot: Snapshot) {
        self.undo.push_back(snapshot);
        if let Some(limit) = self.limit {
            while self.undo.len() > limit {
                self.undo.pop_front();
            }
        }
    }
}
