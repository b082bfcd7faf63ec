//! Pagination ownership.

use crate::models::{PaginationState, PaginationUpdate, TableState};

/// Who owns page index and size. Fixed for the lifetime of a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationContext {
    /// The engine owns pagination, starting from the given state
    Standalone(PaginationState),
    /// An external table-state owner supplies pagination every render
    Integrated,
}

impl Default for PaginationContext {
    fn default() -> Self {
        PaginationContext::Standalone(PaginationState::default())
    }
}

#[derive(Debug, Clone)]
pub struct StateReconciler {
    context: PaginationContext,
    last_criteria: Option<String>,
}

impl StateReconciler {
    pub fn new(context: PaginationContext) -> Self {
        Self {
            context,
            last_criteria: None,
        }
    }

    pub fn context(&self) -> PaginationContext {
        self.context
    }

    /// Effective pagination for this render.
    ///
    /// Standalone: a change in sort, filter or search criteria since the
    /// previous render moves back to the first page.
    pub fn reconcile(&mut self, table: &TableState) -> PaginationState {
        match &mut self.context {
            PaginationContext::Integrated => table.pagination,
            PaginationContext::Standalone(state) => {
                let criteria = table.criteria_fingerprint();
                let changed = self
                    .last_criteria
                    .as_ref()
                    .is_some_and(|last| *last != criteria);
                if changed && state.page_index != 0 {
                    log::debug!("Criteria changed; resetting page index {} to 0", state.page_index);
                    state.page_index = 0;
                }
                self.last_criteria = Some(criteria);
                *state
            }
        }
    }

    /// Apply a pagination update. Returns whether the state changed.
    ///
    /// Any page-size change also moves back to the first page. Integrated
    /// views ignore updates; their owner is the source of truth.
    pub fn set_pagination(&mut self, update: PaginationUpdate) -> bool {
        match &mut self.context {
            PaginationContext::Integrated => {
                log::debug!("Ignoring pagination update {update:?} in integrated context");
                false
            }
            PaginationContext::Standalone(state) => {
                let current = *state;
                let mut next = update.apply(current);
                if next.page_size != current.page_size {
                    next.page_index = 0;
                }
                *state = next;
                next != current
            }
        }
    }
}
