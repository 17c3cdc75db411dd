use crate::models::ChatTurn;

/// Append-only question/answer log with a selection for the sidebar.
#[derive(Debug, Clone, Default)]
pub struct History {
    turns: Vec<ChatTurn>,
    selected: Option<usize>,
}

impl History {
    /// Same text as the last stored question (exact match).
    pub fn is_repeat(&self, question: &str) -> bool {
        self.turns
            .last()
            .map(|turn| turn.question == question)
            .unwrap_or(false)
    }

    /// Appends unless the question repeats the previous one. Returns whether it was stored.
    pub fn push(&mut self, turn: ChatTurn) -> bool {
        if self.is_repeat(&turn.question) {
            tracing::debug!("Dropping repeated question: {}", turn.question);
            return false;
        }
        self.turns.push(turn);
        true
    }

    pub fn select(&mut self, index: usize) -> Option<&ChatTurn> {
        if index < self.turns.len() {
            self.selected = Some(index);
        }
        self.selected()
    }

    pub fn selected(&self) -> Option<&ChatTurn> {
        self.selected.and_then(|i| self.turns.get(i))
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    pub fn latest(&self) -> Option<&ChatTurn> {
        self.turns.last()
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
