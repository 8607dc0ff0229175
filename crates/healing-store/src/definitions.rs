use dashmap::DashMap;
use healrun_core_types::TestId;

use crate::errors::HealingStoreError;

/// Read/write access to the selector field of a test's steps. This is the
/// user-owned artifact a promoted heal rewrites.
pub trait TestDefinitionStore: Send + Sync {
    /// Selector per step (`None` for steps without one, e.g. navigation)
    fn step_selectors(&self, test_id: &TestId) -> Option<Vec<Option<String>>>;

    /// Replace the selector of one step, returning the previous value
    fn set_step_selector(
        &self,
        test_id: &TestId,
        step_index: usize,
        selector: &str,
    ) -> Result<String, HealingStoreError>;
}

#[derive(Default)]
pub struct InMemoryDefinitionStore {
    tests: DashMap<TestId, Vec<Option<String>>>,
}

impl InMemoryDefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, test_id: TestId, selectors: Vec<Option<String>>) {
        self.tests.insert(test_id, selectors);
    }
}

impl TestDefinitionStore for InMemoryDefinitionStore {
    fn step_selectors(&self, test_id: &TestId) -> Option<Vec<Option<String>>> {
        self.tests.get(test_id).map(|entry| entry.value().clone())
    }

    fn set_step_selector(
        &self,
        test_id: &TestId,
        step_index: usize,
        selector: &str,
    ) -> Result<String, HealingStoreError> {
        let mut steps = self
            .tests
            .get_mut(test_id)
            .ok_or_else(|| HealingStoreError::DefinitionNotFound(test_id.clone()))?;
        let len = steps.len();
        let slot = steps
            .get_mut(step_index)
            .ok_or_else(|| HealingStoreError::InvalidStepIndex {
                test_id: test_id.clone(),
                index: step_index,
                len,
            })?;
        // Steps without a selector never get one through healing.
        let current = slot
            .as_mut()
            .ok_or_else(|| HealingStoreError::StepWithoutSelector {
                test_id: test_id.clone(),
                index: step_index,
            })?;
        Ok(std::mem::replace(current, selector.to_string()))
    }
}
