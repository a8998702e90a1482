//! Undo/redo history owned by a chapter session.

use crate::capture::VerseNumber;
use crate::config::DEFAULT_MAX_UNDO_HISTORY;
use crate::ink::Drawing;
use crate::model::VerseUpdateRequest;
use crate::persistence::VerseInk;
use crate::storage::{StorageError, StorageResult};

/// Ink of one verse before and after a command.
#[derive(Debug, Clone, PartialEq)]
pub struct VerseChange {
    pub verse: VerseNumber,
    /// `None` when the verse had no ink before the command.
    pub before: Option<VerseInk>,
    pub after: VerseInk,
}

impl VerseChange {
    /// Request that writes the pre-command ink back. A verse that had no ink
    /// gets an empty drawing, which loads as "no ink".
    pub fn undo_request(&self, updated_at: i64) -> StorageResult<VerseUpdateRequest> {
        match &self.before {
            Some(before) => before.to_request(updated_at),
            None => {
                let ink = Drawing::new()
                    .to_bytes()
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(VerseUpdateRequest {
                    chapter: self.after.record.chapter.clone(),
                    verse: self.verse,
                    ink,
                    base_width: None,
                    base_height: None,
                    base_first_underline_offset: None,
                    updated_at,
                    replace_base: true,
                })
            }
        }
    }

    pub fn redo_request(&self, updated_at: i64) -> StorageResult<VerseUpdateRequest> {
        self.after.to_request(updated_at)
    }
}

/// One saved gesture, recorded so it can be reverted.
#[derive(Debug, Clone, PartialEq)]
pub struct InkCommand {
    pub composite_before: Drawing,
    pub composite_after: Drawing,
    pub verses: Vec<VerseChange>,
}

/// Bounded undo and redo stacks of ink commands.
#[derive(Debug, Clone)]
pub struct CommandHistory {
    undo_stack: Vec<InkCommand>,
    redo_stack: Vec<InkCommand>,
    max_len: usize,
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UNDO_HISTORY)
    }
}

impl CommandHistory {
    pub fn new(max_len: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_len: max_len.max(1),
        }
    }

    /// Record a new command. Clears the redo stack.
    pub fn push(&mut self, command: InkCommand) {
        self.undo_stack.push(command);
        self.redo_stack.clear();

        if self.undo_stack.len() > self.max_len {
            self.undo_stack.remove(0);
        }
    }

    /// Move the latest command to the redo stack and return it.
    pub fn undo(&mut self) -> Option<InkCommand> {
        let command = self.undo_stack.pop()?;
        self.redo_stack.push(command.clone());
        Some(command)
    }

    /// Move the latest undone command back and return it.
    pub fn redo(&mut self) -> Option<InkCommand> {
        let command = self.redo_stack.pop()?;
        self.undo_stack.push(command.clone());
        Some(command)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ink::{InkStyle, Stroke};
    use crate::model::{ChapterId, VerseDrawing};
    use kurbo::Point;

    fn ink(verse: VerseNumber, y: f64) -> VerseInk {
        let local = Drawing::from_strokes(vec![Stroke::from_locations(
            [Point::new(10.0, y), Point::new(20.0, y)],
            InkStyle::default(),
        )]);
        let record = VerseDrawing::new(ChapterId::new("ruth", 1), verse, local.to_bytes().unwrap(), 5);
        VerseInk { record, local }
    }

    fn command(tag: f64) -> InkCommand {
        InkCommand {
            composite_before: Drawing::new(),
            composite_after: ink(1, tag).local,
            verses: vec![VerseChange {
                verse: 1,
                before: None,
                after: ink(1, tag),
            }],
        }
    }

    #[test]
    fn test_undo_redo_cycle() {
        let mut history = CommandHistory::new(10);
        assert!(!history.can_undo());

        let pushed = command(1.0);
        history.push(pushed.clone());
        assert!(history.can_undo());
        assert_eq!(history.undo(), Some(pushed));
        assert!(history.can_redo());
        assert!(!history.can_undo());

        assert!(history.redo().is_some());
        assert!(history.can_undo());
        assert!(history.redo().is_none());
    }

    #[test]
    fn test_push_clears_redo() {
        let mut history = CommandHistory::new(10);
        history.push(command(1.0));
        history.undo();
        history.push(command(2.0));
        assert!(!history.can_redo());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut history = CommandHistory::new(3);
        for i in 0..5 {
            history.push(command(i as f64));
        }
        let mut undone = 0;
        while history.undo().is_some() {
            undone += 1;
        }
        assert_eq!(undone, 3);
    }

    #[test]
    fn test_undo_request_for_new_verse_is_empty_ink() {
        let change = VerseChange {
            verse: 2,
            before: None,
            after: ink(2, 4.0),
        };
        let request = change.undo_request(9).unwrap();
        assert_eq!(request.verse, 2);
        assert!(Drawing::from_bytes(&request.ink).unwrap().is_empty());

        let redo = change.redo_request(10).unwrap();
        assert_eq!(Drawing::from_bytes(&redo.ink).unwrap().len(), 1);
    }
}
