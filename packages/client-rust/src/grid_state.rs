//! Shared pagination/sort/filter state.
//!
//! Every grid created with [`GridStateHandle::global`] reads and writes the
//! same process-wide state, last write wins. A grid that must not see other
//! grids' paging (a detail tab next to a background list) takes
//! [`GridStateHandle::isolated`] instead.

use std::sync::{Arc, OnceLock};

use maestro_core::query::GridState;
use parking_lot::RwLock;

#[derive(Debug, Clone)]
pub struct GridStateHandle {
    inner: Arc<RwLock<GridState>>,
}

static GLOBAL: OnceLock<GridStateHandle> = OnceLock::new();

impl GridStateHandle {
    /// The process-wide state.
    #[must_use]
    pub fn global() -> Self {
        GLOBAL
            .get_or_init(|| Self::isolated(GridState::default()))
            .clone()
    }

    /// A private state owned by one grid.
    #[must_use]
    pub fn isolated(state: GridState) -> Self {
        Self { inner: Arc::new(RwLock::new(state)) }
    }

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> GridState {
        self.inner.read().clone()
    }

    pub fn read<R>(&self, f: impl FnOnce(&GridState) -> R) -> R {
        f(&self.inner.read())
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut GridState) -> R) -> R {
        f(&mut self.inner.write())
    }

    /// Whether both handles point at the same state.
    #[must_use]
    pub fn shares_state_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
