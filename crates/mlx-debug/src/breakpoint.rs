//! Breakpoint locations and their lazily-resolved expression ids.

/// Remote expression id for a breakpoint location.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExprId {
    #[default]
    Unresolved,
    Resolved(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    /// Remote module URI, passed through untouched.
    pub uri: String,
    /// 1-based.
    pub line: u32,
    pub column: Option<u32>,
    pub condition: Option<String>,
    expr: ExprId,
}

impl Breakpoint {
    #[must_use]
    pub fn new(uri: impl Into<String>, line: u32) -> Self {
        Self {
            uri: uri.into(),
            line,
            column: None,
            condition: None,
            expr: ExprId::Unresolved,
        }
    }

    #[must_use]
    pub fn with_column(mut self, column: u32) -> Self {
        self.column = Some(column);
        self
    }

    #[must_use]
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Parse `uri:line` or `uri:line:column`.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let (head, last) = text.rsplit_once(':')?;
        let last = last.parse::<u32>().ok()?;
        if let Some((uri, line)) = head.rsplit_once(':') {
            if let Ok(line) = line.parse::<u32>() {
                if !uri.is_empty() {
                    return Some(Self::new(uri, line).with_column(last));
                }
            }
        }
        (!head.is_empty()).then(|| Self::new(head, last))
    }

    #[must_use]
    pub fn expr(&self) -> &ExprId {
        &self.expr
    }

    #[must_use]
    pub fn expr_id(&self) -> Option<&str> {
        match &self.expr {
            ExprId::Resolved(id) => Some(id),
            ExprId::Unresolved => None,
        }
    }

    /// Cache `id` and return the id now in effect. An already-resolved id
    /// is kept.
    pub(crate) fn resolve(&mut self, id: String) -> String {
        match &self.expr {
            ExprId::Resolved(existing) => existing.clone(),
            ExprId::Unresolved => {
                self.expr = ExprId::Resolved(id.clone());
                id
            }
        }
    }
}
