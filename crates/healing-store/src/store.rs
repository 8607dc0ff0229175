use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use healrun_core_types::{HealingId, TestId};
use tracing::{debug, info};

use crate::definitions::{InMemoryDefinitionStore, TestDefinitionStore};
use crate::errors::HealingStoreError;
use crate::history::{HealingEventEntry, HistorySource, SelectorHistoryEntry, StepKey};
use crate::records::{HealingRecord, HealingRecordStatus, NewHeal};
use crate::stats::{HealingStats, HealingTelemetry};

/// Healing telemetry plus the override store that promotes runtime heals
/// into test definitions.
pub struct HealingStore {
    definitions: Arc<dyn TestDefinitionStore>,
    telemetry: HealingTelemetry,
    records: DashMap<HealingId, HealingRecord>,
    selector_history: DashMap<StepKey, Vec<SelectorHistoryEntry>>,
    healing_events: DashMap<StepKey, Vec<HealingEventEntry>>,
}

impl HealingStore {
    pub fn new(definitions: Arc<dyn TestDefinitionStore>) -> Self {
        Self {
            definitions,
            telemetry: HealingTelemetry::new(),
            records: DashMap::new(),
            selector_history: DashMap::new(),
            healing_events: DashMap::new(),
        }
    }

    pub fn in_memory() -> (Self, Arc<InMemoryDefinitionStore>) {
        let definitions = Arc::new(InMemoryDefinitionStore::new());
        (Self::new(definitions.clone()), definitions)
    }

    pub fn telemetry(&self) -> &HealingTelemetry {
        &self.telemetry
    }

    pub fn stats(&self) -> HealingStats {
        self.telemetry.snapshot()
    }

    /// Store a successful runtime heal as a pending record and append it to
    /// the audit logs of its step.
    pub fn record_heal(&self, heal: NewHeal) -> HealingRecord {
        let record = HealingRecord::from_heal(heal);
        let key = StepKey::new(record.test_id.clone(), record.step_index);
        let source = if record.manual_override.is_some() {
            HistorySource::ApprovedHeal
        } else {
            HistorySource::AutoHeal
        };

        let mut history = SelectorHistoryEntry::new(
            &key,
            record.healed_selector.clone(),
            Some(record.original_selector.clone()),
            record.strategy.clone(),
            record.confidence,
            source,
        );
        history.healing_id = Some(record.id.clone());
        history.run_id = Some(record.run_id.clone());
        self.selector_history
            .entry(key.clone())
            .or_default()
            .push(history);

        self.healing_events
            .entry(key)
            .or_default()
            .push(HealingEventEntry::healed(&record));

        info!(
            target: "healing-store",
            healing_id = %record.id,
            test_id = %record.test_id,
            step = record.step_index,
            strategy = %record.strategy,
            "recorded heal"
        );
        self.records.insert(record.id.clone(), record.clone());
        record
    }

    /// Append a failed or rejected attempt to the step's healing log.
    pub fn record_healing_event(&self, entry: HealingEventEntry) {
        let key = StepKey::new(entry.test_id.clone(), entry.step_index);
        debug!(
            target: "healing-store",
            test_id = %entry.test_id,
            step = entry.step_index,
            outcome = ?entry.outcome,
            "recorded healing event"
        );
        self.healing_events.entry(key).or_default().push(entry);
    }

    pub fn healing_record(&self, id: &HealingId) -> Option<HealingRecord> {
        self.records.get(id).map(|entry| entry.value().clone())
    }

    pub fn list_healing_records(
        &self,
        test_id: &TestId,
        status: Option<HealingRecordStatus>,
    ) -> Vec<HealingRecord> {
        let mut records: Vec<HealingRecord> = self
            .records
            .iter()
            .filter(|entry| &entry.test_id == test_id)
            .filter(|entry| status.map_or(true, |status| entry.status == status))
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        records
    }

    /// Promote a pending heal into the test definition.
    ///
    /// The record stays locked for the whole check-and-write, so two
    /// concurrent calls can never both rewrite the definition.
    pub fn apply_healed_selector(
        &self,
        id: &HealingId,
        user: Option<&str>,
    ) -> Result<HealingRecord, HealingStoreError> {
        let mut record = self
            .records
            .get_mut(id)
            .ok_or_else(|| HealingStoreError::NotFound(id.clone()))?;
        if !record.is_pending() {
            return Err(HealingStoreError::AlreadyResolved {
                id: id.clone(),
                status: record.status,
            });
        }

        let previous = self.definitions.set_step_selector(
            &record.test_id,
            record.step_index,
            &record.healed_selector,
        )?;
        record.status = HealingRecordStatus::Applied;
        record.resolved_at = Some(Utc::now());
        record.resolved_by = user.map(str::to_string);
        let applied = record.clone();
        drop(record);

        let key = StepKey::new(applied.test_id.clone(), applied.step_index);
        if let Some(mut entries) = self.selector_history.get_mut(&key) {
            for entry in entries
                .iter_mut()
                .filter(|entry| entry.healing_id.as_ref() == Some(id))
            {
                entry.applied = true;
                entry.previous_selector = Some(previous.clone());
            }
        }
        self.mark_events(&key, id, |event| event.applied = true);

        info!(
            target: "healing-store",
            healing_id = %id,
            test_id = %applied.test_id,
            step = applied.step_index,
            previous = %previous,
            selector = %applied.healed_selector,
            "applied healed selector"
        );
        Ok(applied)
    }

    /// Discard a pending heal without touching the test definition.
    pub fn dismiss_healing_update(
        &self,
        id: &HealingId,
        user: Option<&str>,
    ) -> Result<HealingRecord, HealingStoreError> {
        let mut record = self
            .records
            .get_mut(id)
            .ok_or_else(|| HealingStoreError::NotFound(id.clone()))?;
        if !record.is_pending() {
            return Err(HealingStoreError::AlreadyResolved {
                id: id.clone(),
                status: record.status,
            });
        }
        record.status = HealingRecordStatus::Dismissed;
        record.resolved_at = Some(Utc::now());
        record.resolved_by = user.map(str::to_string);
        let dismissed = record.clone();
        drop(record);

        let key = StepKey::new(dismissed.test_id.clone(), dismissed.step_index);
        if let Some(mut entries) = self.selector_history.get_mut(&key) {
            for entry in entries
                .iter_mut()
                .filter(|entry| entry.healing_id.as_ref() == Some(id))
            {
                entry.rejected = true;
            }
        }
        self.mark_events(&key, id, |event| event.rejected = true);

        info!(target: "healing-store", healing_id = %id, "dismissed healing update");
        Ok(dismissed)
    }

    fn mark_events(&self, key: &StepKey, id: &HealingId, mark: impl Fn(&mut HealingEventEntry)) {
        if let Some(mut events) = self.healing_events.get_mut(key) {
            events
                .iter_mut()
                .filter(|event| event.healing_id.as_ref() == Some(id))
                .for_each(&mark);
        }
    }

    /// Restore the selector a history entry replaced.
    pub fn revert_selector(
        &self,
        test_id: &TestId,
        step_index: usize,
        history_entry_id: &str,
        user: Option<&str>,
    ) -> Result<SelectorHistoryEntry, HealingStoreError> {
        let key = StepKey::new(test_id.clone(), step_index);
        let target = self
            .selector_history
            .get(&key)
            .and_then(|entries| {
                entries
                    .iter()
                    .find(|entry| entry.id == history_entry_id)
                    .cloned()
            })
            .ok_or_else(|| HealingStoreError::HistoryEntryNotFound(history_entry_id.to_string()))?;
        let restore = target
            .previous_selector
            .clone()
            .ok_or_else(|| HealingStoreError::NothingToRevert(history_entry_id.to_string()))?;

        let replaced = self
            .definitions
            .set_step_selector(test_id, step_index, &restore)?;
        let mut entry = SelectorHistoryEntry::new(
            &key,
            restore,
            Some(replaced),
            target.strategy.clone(),
            1.0,
            HistorySource::Revert,
        );
        entry.applied = true;
        self.selector_history
            .entry(key)
            .or_default()
            .push(entry.clone());

        info!(
            target: "healing-store",
            test_id = %test_id,
            step = step_index,
            reverted = %history_entry_id,
            user = user.unwrap_or("system"),
            "reverted selector"
        );
        Ok(entry)
    }

    pub fn get_selector_history(
        &self,
        test_id: &TestId,
        step_index: usize,
    ) -> Vec<SelectorHistoryEntry> {
        self.selector_history
            .get(&StepKey::new(test_id.clone(), step_index))
            .map(|entries| entries.value().clone())
            .unwrap_or_default()
    }

    pub fn get_healing_history(&self, test_id: &TestId, step_index: usize) -> Vec<HealingEventEntry> {
        self.healing_events
            .get(&StepKey::new(test_id.clone(), step_index))
            .map(|entries| entries.value().clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HealingEventOutcome;
    use healrun_core_types::RunId;

    fn heal(test: &str, step: usize) -> NewHeal {
        NewHeal {
            run_id: RunId::from("run-1"),
            test_id: TestId::from(test),
            step_index: step,
            original_selector: "#old".into(),
            healed_selector: "[data-testid=submit]".into(),
            strategy: "selector_fallback".into(),
            confidence: 0.92,
            manual_override: None,
        }
    }

    #[test]
    fn record_heal_appends_history_and_event() {
        let (store, _) = HealingStore::in_memory();
        let record = store.record_heal(heal("t1", 2));
        assert!(record.is_pending());

        let history = store.get_selector_history(&TestId::from("t1"), 2);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].source, HistorySource::AutoHeal);
        assert_eq!(history[0].healing_id.as_ref(), Some(&record.id));

        let events = store.get_healing_history(&TestId::from("t1"), 2);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, HealingEventOutcome::Healed);
        assert_eq!(events[0].detail, None);
        assert_eq!(events[0].healing_id.as_ref(), Some(&record.id));
        assert_eq!(events[0].healed_selector.as_deref(), Some(record.healed_selector.as_str()));
        assert_eq!(events[0].strategy.as_deref(), Some("selector_fallback"));
        assert_eq!(events[0].approval_id, None);
        assert!(!events[0].rejected);
    }

    #[test]
    fn apply_rewrites_definition_once() {
        let (store, definitions) = HealingStore::in_memory();
        let test = TestId::from("t1");
        definitions.insert(test.clone(), vec![None, None, Some("#old".into())]);
        let record = store.record_heal(heal("t1", 2));

        let applied = store
            .apply_healed_selector(&record.id, Some("alice"))
            .unwrap();
        assert_eq!(applied.status, HealingRecordStatus::Applied);
        assert_eq!(applied.resolved_by.as_deref(), Some("alice"));
        assert_eq!(
            definitions.step_selectors(&test).unwrap()[2].as_deref(),
            Some("[data-testid=submit]")
        );

        // someone edits the definition by hand afterwards
        definitions.set_step_selector(&test, 2, "#manual").unwrap();
        let err = store.apply_healed_selector(&record.id, None).unwrap_err();
        assert_eq!(
            err,
            HealingStoreError::AlreadyResolved {
                id: record.id.clone(),
                status: HealingRecordStatus::Applied,
            }
        );
        assert!(err.to_string().contains("already applied"));
        assert_eq!(
            definitions.step_selectors(&test).unwrap()[2].as_deref(),
            Some("#manual")
        );
        assert!(store.get_selector_history(&test, 2)[0].applied);
        assert!(store.get_healing_history(&test, 2)[0].applied);
    }

    #[test]
    fn apply_reports_invalid_step_and_keeps_record_pending() {
        let (store, definitions) = HealingStore::in_memory();
        definitions.insert(TestId::from("t1"), vec![Some("#a".into())]);
        let record = store.record_heal(heal("t1", 5));

        let err = store.apply_healed_selector(&record.id, None).unwrap_err();
        assert!(matches!(
            err,
            HealingStoreError::InvalidStepIndex { index: 5, len: 1, .. }
        ));
        assert!(store.healing_record(&record.id).unwrap().is_pending());
    }

    #[test]
    fn unknown_record_is_not_found() {
        let (store, _) = HealingStore::in_memory();
        let id = HealingId::from("nope");
        assert_eq!(
            store.apply_healed_selector(&id, None),
            Err(HealingStoreError::NotFound(id.clone()))
        );
        assert_eq!(
            store.dismiss_healing_update(&id, None),
            Err(HealingStoreError::NotFound(id))
        );
    }

    #[test]
    fn dismiss_marks_rejected_and_blocks_apply() {
        let (store, definitions) = HealingStore::in_memory();
        let test = TestId::from("t1");
        definitions.insert(test.clone(), vec![Some("#old".into())]);
        let record = store.record_heal(heal("t1", 0));

        store.dismiss_healing_update(&record.id, Some("bob")).unwrap();
        assert!(store.get_selector_history(&test, 0)[0].rejected);
        assert!(matches!(
            store.apply_healed_selector(&record.id, None),
            Err(HealingStoreError::AlreadyResolved {
                status: HealingRecordStatus::Dismissed,
                ..
            })
        ));
        assert_eq!(
            definitions.step_selectors(&test).unwrap()[0].as_deref(),
            Some("#old")
        );
    }

    #[test]
    fn list_filters_by_test_and_status() {
        let (store, definitions) = HealingStore::in_memory();
        definitions.insert(TestId::from("t1"), vec![Some("#old".into())]);
        let first = store.record_heal(heal("t1", 0));
        store.record_heal(heal("t1", 0));
        store.record_heal(heal("t2", 0));
        store.apply_healed_selector(&first.id, None).unwrap();

        let test = TestId::from("t1");
        assert_eq!(store.list_healing_records(&test, None).len(), 2);
        let pending = store.list_healing_records(&test, Some(HealingRecordStatus::Pending));
        assert_eq!(pending.len(), 1);
        assert_ne!(pending[0].id, first.id);
    }
}
