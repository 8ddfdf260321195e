use regex::{Regex, RegexBuilder};

use crate::attribute::AttributeId;
use crate::call::Call;
use crate::error::StorageError;

/// Filter and sort applied to a snapshot of stored calls.
///
/// ```rust
/// use sipscope_core::attribute::AttributeId;
/// use sipscope_core::storage::CallQuery;
///
/// let query = CallQuery::new()
///     .filter(AttributeId::SipFrom, "^alice@")
///     .unwrap()
///     .sort_by(AttributeId::MsgCnt, true);
/// assert_eq!(query.filters().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallQuery {
    filters: Vec<(AttributeId, Regex)>,
    sort: Option<(AttributeId, bool)>,
}

impl CallQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only calls whose attribute value matches `pattern`.
    ///
    /// Matching is case-insensitive. Calls without a value never match.
    pub fn filter(mut self, id: AttributeId, pattern: &str) -> Result<Self, StorageError> {
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        self.filters.push((id, regex));
        Ok(self)
    }

    pub fn sort_by(mut self, id: AttributeId, descending: bool) -> Self {
        self.sort = Some((id, descending));
        self
    }

    pub fn filters(&self) -> &[(AttributeId, Regex)] {
        &self.filters
    }

    pub fn sort(&self) -> Option<(AttributeId, bool)> {
        self.sort
    }

    pub fn matches(&self, call: &Call) -> bool {
        self.filters.iter().all(|(id, regex)| {
            call.attribute(*id)
                .is_some_and(|value| regex.is_match(&value))
        })
    }
}
