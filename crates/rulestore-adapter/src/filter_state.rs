use crate::errors::{AdapterError, AdapterResult};
use crate::selector::Selector;

/// Whether the model was last populated from a subset of storage.
///
/// Every load overwrites the flag; nothing else changes it. A full save is
/// refused while it is set, since writing a partial model back would delete
/// every rule the filter left out.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FilterState {
    filtered: bool,
}

impl FilterState {
    pub fn record_load(&mut self, selector: &Selector) {
        self.filtered = !selector.is_empty();
    }

    pub fn is_filtered(&self) -> bool {
        self.filtered
    }

    pub fn ensure_savable(&self) -> AdapterResult<()> {
        if self.filtered {
            return Err(AdapterError::FilteredSave);
        }
        Ok(())
    }
}
