use std::collections::VecDeque;

use crate::dimensions;
use crate::document::Document;

// ============================================================================
// COMMAND TRAIT
// ============================================================================

/// Lifecycle of a command.
///
/// `Created -> Applied <-> Reverted`.  `Cancelled` is only reachable from
/// `Created`, when the gesture that was building the command is aborted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CommandState {
    #[default]
    Created,
    Applied,
    Reverted,
    Cancelled,
}

impl CommandState {
    /// Moves to `Applied`.  Returns false (and leaves the state alone) when
    /// the command is not in a state that can be executed.
    pub fn try_apply(&mut self, name: &str) -> bool {
        match self {
            CommandState::Created | CommandState::Reverted => {
                *self = CommandState::Applied;
                true
            }
            other => {
                debug_assert!(false, "execute '{}' while {:?}", name, other);
                log_err!("Command '{}' executed while {:?}", name, other);
                false
            }
        }
    }

    pub fn try_revert(&mut self, name: &str) -> bool {
        match self {
            CommandState::Applied => {
                *self = CommandState::Reverted;
                true
            }
            other => {
                debug_assert!(false, "unexecute '{}' while {:?}", name, other);
                log_err!("Command '{}' unexecuted while {:?}", name, other);
                false
            }
        }
    }

    pub fn try_cancel(&mut self, name: &str) -> bool {
        if *self == CommandState::Created {
            *self = CommandState::Cancelled;
            true
        } else {
            log_err!("Command '{}' cancelled while {:?}", name, self);
            false
        }
    }
}

/// An undoable document mutation.
///
/// `execute` followed by `unexecute` restores the document bit for bit.
pub trait Command: Send + Sync {
    fn execute(&mut self, doc: &mut Document);
    fn unexecute(&mut self, doc: &mut Document);
    fn name(&self) -> String;
    /// Bytes held for undo, saturated.
    fn size(&self) -> i32;
    fn state(&self) -> CommandState;
}

// ============================================================================
// MACRO COMMAND - several commands as one history entry
// ============================================================================

pub struct MacroCommand {
    name: String,
    commands: Vec<Box<dyn Command>>,
    state: CommandState,
}

impl MacroCommand {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            commands: Vec::new(),
            state: CommandState::Created,
        }
    }

    /// Adds a child.  Children already applied by the caller make the macro
    /// applied as a whole.
    pub fn add(&mut self, command: Box<dyn Command>) {
        if command.state() == CommandState::Applied {
            self.state = CommandState::Applied;
        }
        self.commands.push(command);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Command for MacroCommand {
    fn execute(&mut self, doc: &mut Document) {
        if !self.state.try_apply(&self.name) {
            return;
        }
        for c in &mut self.commands {
            c.execute(doc);
        }
    }

    fn unexecute(&mut self, doc: &mut Document) {
        if !self.state.try_revert(&self.name) {
            return;
        }
        for c in self.commands.iter_mut().rev() {
            c.unexecute(doc);
        }
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn size(&self) -> i32 {
        dimensions::sum_sizes(self.commands.iter().map(|c| c.size()))
    }

    fn state(&self) -> CommandState {
        self.state
    }
}

// ============================================================================
// HISTORY MANAGER - Manages undo/redo stacks with memory limits
// ============================================================================

/// Linear undo/redo history with entry and memory limits.
pub struct HistoryManager {
    undo_stack: VecDeque<Box<dyn Command>>,
    redo_stack: VecDeque<Box<dyn Command>>,
    max_history_size: usize,
    /// Optional memory cap in bytes.
    max_memory_bytes: Option<usize>,
    /// Running memory total across both stacks.
    total_memory: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(50)
    }
}

fn command_bytes(c: &dyn Command) -> usize {
    c.size().max(0) as usize
}

impl HistoryManager {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_history_size: max_history_size.max(1),
            max_memory_bytes: Some(100 * 1024 * 1024), // 100 MB default limit
            total_memory: 0,
        }
    }

    pub fn with_limits(max_history_size: usize, max_memory_bytes: Option<usize>) -> Self {
        Self {
            max_memory_bytes,
            ..Self::new(max_history_size)
        }
    }

    /// Executes `command` and records it.
    pub fn push(&mut self, mut command: Box<dyn Command>, doc: &mut Document) {
        log_debug!("Execute: {}", command.name());
        command.execute(doc);
        self.record(command);
    }

    /// Records a command its gesture has already applied to the document.
    pub fn push_applied(&mut self, command: Box<dyn Command>) {
        debug_assert_eq!(command.state(), CommandState::Applied, "push_applied: {}", command.name());
        log_debug!("Record: {}", command.name());
        self.record(command);
    }

    fn record(&mut self, command: Box<dyn Command>) {
        // Clear redo stack when a new action is performed
        for cmd in self.redo_stack.drain(..) {
            self.total_memory = self.total_memory.saturating_sub(command_bytes(cmd.as_ref()));
        }

        self.total_memory = self.total_memory.saturating_add(command_bytes(command.as_ref()));
        self.undo_stack.push_back(command);

        self.prune();
    }

    pub fn undo(&mut self, doc: &mut Document) -> Option<String> {
        let mut command = self.undo_stack.pop_back()?;
        let description = command.name();
        log_debug!("Undo: {}", description);
        command.unexecute(doc);
        self.redo_stack.push_back(command);
        Some(description)
    }

    pub fn redo(&mut self, doc: &mut Document) -> Option<String> {
        let mut command = self.redo_stack.pop_back()?;
        let description = command.name();
        log_debug!("Redo: {}", description);
        command.execute(doc);
        self.undo_stack.push_back(command);
        Some(description)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.undo_stack.back().map(|c| c.name())
    }

    pub fn redo_description(&self) -> Option<String> {
        self.redo_stack.back().map(|c| c.name())
    }

    /// Menu text, e.g. "Undo: Rotate".
    pub fn undo_label(&self) -> String {
        self.undo_description().map_or_else(|| "Undo".to_string(), |d| format!("Undo: {}", d))
    }

    pub fn redo_label(&self) -> String {
        self.redo_description().map_or_else(|| "Redo".to_string(), |d| format!("Redo: {}", d))
    }

    /// All undo descriptions, most recent first.
    pub fn undo_history(&self) -> Vec<String> {
        self.undo_stack.iter().rev().map(|c| c.name()).collect()
    }

    /// All redo descriptions, next redo first.
    pub fn redo_history(&self) -> Vec<String> {
        self.redo_stack.iter().rev().map(|c| c.name()).collect()
    }

    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    fn drop_oldest(&mut self) {
        if let Some(removed) = self.undo_stack.pop_front() {
            self.total_memory = self.total_memory.saturating_sub(command_bytes(removed.as_ref()));
            log_info!("History full, dropped '{}'", removed.name());
        }
    }

    /// Drops the oldest entries until both limits hold.  The newest entry is
    /// always kept.
    fn prune(&mut self) {
        while self.undo_stack.len() > self.max_history_size {
            self.drop_oldest();
        }
        if let Some(max_bytes) = self.max_memory_bytes {
            while self.total_memory > max_bytes && self.undo_stack.len() > 1 {
                self.drop_oldest();
            }
        }
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.total_memory = 0;
    }

    /// Undoes `count` entries (0 = nothing, 1 = the most recent).
    pub fn undo_to(&mut self, count: usize, doc: &mut Document) {
        for _ in 0..count {
            if self.undo(doc).is_none() {
                break;
            }
        }
    }

    pub fn redo_to(&mut self, count: usize, doc: &mut Document) {
        for _ in 0..count {
            if self.redo(doc).is_none() {
                break;
            }
        }
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::geometry::Point;

    /// Sets one pixel, remembering the old colour.
    struct SetPixel {
        at: Point,
        color: Color,
        old: Color,
        bytes: i32,
        state: CommandState,
    }

    impl SetPixel {
        fn boxed(x: i32, color: Color, bytes: i32) -> Box<dyn Command> {
            Box::new(SetPixel {
                at: Point::new(x, 0),
                color,
                old: Color::Invalid,
                bytes,
                state: CommandState::Created,
            })
        }
    }

    impl Command for SetPixel {
        fn execute(&mut self, doc: &mut Document) {
            if self.state.try_apply("Set") {
                self.old = doc.color_at(self.at);
                doc.pixmap_mut().set_pixel(self.at, self.color);
            }
        }
        fn unexecute(&mut self, doc: &mut Document) {
            if self.state.try_revert("Set") {
                doc.pixmap_mut().set_pixel(self.at, self.old);
            }
        }
        fn name(&self) -> String {
            format!("Set {}", self.at.x)
        }
        fn size(&self) -> i32 {
            self.bytes
        }
        fn state(&self) -> CommandState {
            self.state
        }
    }

    #[test]
    fn undo_redo_linear() {
        let mut doc = Document::new(4, 1, Color::WHITE);
        let mut h = HistoryManager::new(10);
        h.push(SetPixel::boxed(0, Color::RED, 1), &mut doc);
        h.push(SetPixel::boxed(1, Color::BLUE, 1), &mut doc);
        assert_eq!(h.undo_label(), "Undo: Set 1");

        assert_eq!(h.undo(&mut doc).as_deref(), Some("Set 1"));
        assert_eq!(doc.color_at(Point::new(1, 0)), Color::WHITE);
        assert_eq!(h.redo(&mut doc).as_deref(), Some("Set 1"));
        assert_eq!(doc.color_at(Point::new(1, 0)), Color::BLUE);

        h.undo_to(2, &mut doc);
        assert!(!h.can_undo());
        assert_eq!(doc.color_at(Point::new(0, 0)), Color::WHITE);
        assert_eq!(h.redo_history(), vec!["Set 0".to_string(), "Set 1".to_string()]);
    }

    #[test]
    fn push_discards_redo_tail() {
        let mut doc = Document::new(4, 1, Color::WHITE);
        let mut h = HistoryManager::new(10);
        h.push(SetPixel::boxed(0, Color::RED, 5), &mut doc);
        h.push(SetPixel::boxed(1, Color::RED, 5), &mut doc);
        h.undo(&mut doc);
        h.push(SetPixel::boxed(2, Color::RED, 5), &mut doc);
        assert!(!h.can_redo());
        assert_eq!(h.memory_usage(), 10);
        assert_eq!(h.undo_history(), vec!["Set 2".to_string(), "Set 0".to_string()]);
    }

    #[test]
    fn prunes_by_count_and_memory() {
        let mut doc = Document::new(8, 1, Color::WHITE);
        let mut h = HistoryManager::with_limits(3, Some(100));
        for x in 0..5 {
            h.push(SetPixel::boxed(x, Color::RED, 10), &mut doc);
        }
        assert_eq!(h.undo_count(), 3);
        h.push(SetPixel::boxed(5, Color::RED, 95), &mut doc);
        assert_eq!(h.undo_count(), 1);
        assert_eq!(h.undo_description().as_deref(), Some("Set 5"));
    }

    #[test]
    fn macro_undoes_in_reverse() {
        let mut doc = Document::new(2, 1, Color::WHITE);
        let mut m = MacroCommand::new("Both");
        m.add(SetPixel::boxed(0, Color::RED, 1));
        m.add(SetPixel::boxed(0, Color::BLUE, 1));
        let mut h = HistoryManager::default();
        h.push(Box::new(m), &mut doc);
        assert_eq!(doc.color_at(Point::new(0, 0)), Color::BLUE);
        h.undo(&mut doc);
        assert_eq!(doc.color_at(Point::new(0, 0)), Color::WHITE);
    }

    #[test]
    fn cancel_only_from_created() {
        let mut s = CommandState::Created;
        assert!(s.try_cancel("x"));
        let mut s = CommandState::Applied;
        assert!(!s.try_cancel("x"));
        assert_eq!(s, CommandState::Applied);
    }
}
