//! Case store boundary
//!
//! The engine only reads from the store. Write helpers on
//! [`SqliteCaseStore`] exist for ingestion tooling and tests.

pub mod database;

use crate::error::Result;
use crate::model::{CaseCategory, CaseRecord};

pub use database::{SqliteCaseStore, StoreStats};

/// Read-only view of the durable case store
///
/// Failures surface as `CaseIndexError::StoreUnavailable` and are never
/// retried here; callers needing resilience wrap the calls themselves.
pub trait CaseStore: Send + Sync {
    /// Every case that has an embedding, in ascending case id order
    fn scan_embedded_cases(&self) -> Result<Vec<CaseRecord>>;

    /// Category label of a case, `None` if the case is unknown
    fn lookup_category(&self, case_id: i64) -> Result<Option<CaseCategory>>;

    /// Statute text cited by a case, `None` if unknown or absent
    fn lookup_statutes(&self, case_id: i64) -> Result<Option<String>>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::CaseStore;
    use crate::error::{CaseIndexError, Result};
    use crate::model::{CaseCategory, CaseRecord};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Delegating store that can be switched off to simulate an outage
    pub struct SwitchableStore<S> {
        inner: Arc<S>,
        available: AtomicBool,
    }

    impl<S: CaseStore> SwitchableStore<S> {
        pub fn new(inner: Arc<S>) -> Self {
            Self {
                inner,
                available: AtomicBool::new(true),
            }
        }

        pub fn set_available(&self, available: bool) {
            self.available.store(available, Ordering::SeqCst);
        }

        fn check(&self) -> Result<()> {
            if self.available.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(CaseIndexError::StoreUnavailable("connection refused".to_string()))
            }
        }
    }

    impl<S: CaseStore> CaseStore for SwitchableStore<S> {
        fn scan_embedded_cases(&self) -> Result<Vec<CaseRecord>> {
            self.check()?;
            self.inner.scan_embedded_cases()
        }

        fn lookup_category(&self, case_id: i64) -> Result<Option<CaseCategory>> {
            self.check()?;
            self.inner.lookup_category(case_id)
        }

        fn lookup_statutes(&self, case_id: i64) -> Result<Option<String>> {
            self.check()?;
            self.inner.lookup_statutes(case_id)
        }
    }
}
