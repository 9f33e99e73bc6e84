use serde_json::Value;

/// One level of loop iteration. Nested loops link to their enclosing
/// level through `parent`, so the chain lives exactly as long as the
/// expansion that created it.
#[derive(Debug, Clone)]
pub struct LoopContext<'p> {
    pub variable: String,
    pub item: Value,
    pub index: usize,
    pub total: usize,
    pub parent: Option<&'p LoopContext<'p>>,
}

impl<'p> LoopContext<'p> {
    pub fn new(
        variable: impl Into<String>,
        item: Value,
        index: usize,
        total: usize,
        parent: Option<&'p LoopContext<'p>>,
    ) -> Self {
        Self {
            variable: variable.into(),
            item,
            index,
            total,
            parent,
        }
    }

    pub fn is_first(&self) -> bool {
        self.index == 0
    }

    pub fn is_last(&self) -> bool {
        self.total > 0 && self.index + 1 == self.total
    }

    /// Nesting depth, 1 for an outermost loop.
    pub fn depth(&self) -> usize {
        1 + self.parent.map(LoopContext::depth).unwrap_or(0)
    }
}
