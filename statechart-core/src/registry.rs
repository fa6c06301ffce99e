//! Shared chart and instance registry.
//!
//! Charts are stored once per (name, version) and shared by reference;
//! instances each own an [`Executor`] behind a lock. The maps are sharded,
//! so unrelated machines and instances never contend.

use crate::chart::Chart;
use crate::error::ModelError;
use crate::event::TriggerEvent;
use crate::executor::Executor;
use crate::status::Status;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds the per-instance driver; supplies the evaluator and any custom
/// dispatcher or reporter.
pub type ExecutorFactory = Box<dyn Fn() -> Executor + Send + Sync>;

pub struct ChartRegistry {
    definitions: DashMap<(String, u32), Arc<Chart>>,
    instances: DashMap<String, RwLock<Executor>>,
    make_executor: ExecutorFactory,
}

impl ChartRegistry {
    pub fn new(make_executor: ExecutorFactory) -> Self {
        Self {
            definitions: DashMap::new(),
            instances: DashMap::new(),
            make_executor,
        }
    }

    /// Registers a chart version. Re-registering the identical definition
    /// is accepted and reports `created = false`; a different definition
    /// under an existing (name, version) is rejected.
    pub fn put_chart(&self, chart: Chart) -> Result<(String, bool), ModelError> {
        let key = (chart.name.clone(), chart.version);

        if let Some(existing) = self.definitions.get(&key) {
            if existing.checksum == chart.checksum {
                return Ok((chart.name, false));
            }
            return Err(ModelError::ChartVersionExists {
                machine: key.0,
                version: key.1,
            });
        }

        tracing::info!(machine = %chart.name, version = chart.version, "chart registered");
        let name = chart.name.clone();
        self.definitions.insert(key, Arc::new(chart));
        Ok((name, true))
    }

    pub fn get_chart(&self, machine: &str, version: u32) -> Result<Arc<Chart>, ModelError> {
        self.definitions
            .get(&(machine.to_string(), version))
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ModelError::ChartVersionNotFound {
                machine: machine.to_string(),
                version,
            })
    }

    /// All registered machines with their versions, sorted.
    pub fn list_charts(&self) -> HashMap<String, Vec<u32>> {
        let mut out: HashMap<String, Vec<u32>> = HashMap::new();
        for entry in self.definitions.iter() {
            let (machine, version) = entry.key();
            out.entry(machine.clone()).or_default().push(*version);
        }
        for versions in out.values_mut() {
            versions.sort_unstable();
        }
        out
    }

    /// Creates an instance of a registered chart and runs it to its
    /// initial configuration.
    pub fn create_instance(
        &self,
        instance_id: &str,
        machine: &str,
        version: u32,
    ) -> Result<(), ModelError> {
        if self.instances.contains_key(instance_id) {
            return Err(ModelError::InstanceExists {
                instance_id: instance_id.to_string(),
            });
        }
        let chart = self.get_chart(machine, version)?;

        let mut executor = (self.make_executor)();
        executor.load_machine(chart)?;

        tracing::info!(instance = %instance_id, machine = %machine, version, "instance created");
        self.instances
            .insert(instance_id.to_string(), RwLock::new(executor));
        Ok(())
    }

    /// Feeds events to an instance and returns its new active state ids.
    pub fn trigger_instance(
        &self,
        instance_id: &str,
        events: Vec<TriggerEvent>,
    ) -> Result<Vec<String>, ModelError> {
        let entry = self
            .instances
            .get(instance_id)
            .ok_or_else(|| ModelError::InstanceNotFound {
                instance_id: instance_id.to_string(),
            })?;
        let mut executor = entry.write();
        executor.trigger(events)?;
        Ok(executor.active_ids().iter().map(|s| s.to_string()).collect())
    }

    /// Snapshot of an instance's published status.
    pub fn instance_status(&self, instance_id: &str) -> Result<Status, ModelError> {
        let entry = self
            .instances
            .get(instance_id)
            .ok_or_else(|| ModelError::InstanceNotFound {
                instance_id: instance_id.to_string(),
            })?;
        let executor = entry.read();
        Ok(executor.current_status().clone())
    }

    /// Removes an instance. Returns whether it existed.
    pub fn remove_instance(&self, instance_id: &str) -> bool {
        self.instances.remove(instance_id).is_some()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TestEvaluator;
    use serde_json::json;

    fn registry() -> ChartRegistry {
        ChartRegistry::new(Box::new(|| Executor::new(Box::new(TestEvaluator))))
    }

    fn toggle_chart(version: u32) -> Chart {
        Chart::from_json(
            "toggle",
            version,
            &json!({
                "states": [
                    {"id": "off", "transitions": [{"event": "flip", "to": "on"}]},
                    {"id": "on", "transitions": [{"event": "flip", "to": "off"}]}
                ]
            }),
        )
        .unwrap()
    }

    #[test]
    fn test_put_chart_is_idempotent_for_identical_definitions() {
        let reg = registry();

        let (name, created) = reg.put_chart(toggle_chart(1)).unwrap();
        assert_eq!(name, "toggle");
        assert!(created);

        let (_, created) = reg.put_chart(toggle_chart(1)).unwrap();
        assert!(!created);
    }

    #[test]
    fn test_put_chart_rejects_conflicting_definition() {
        let reg = registry();
        reg.put_chart(toggle_chart(1)).unwrap();

        let other = Chart::from_json("toggle", 1, &json!({"states": [{"id": "x"}]})).unwrap();
        let err = reg.put_chart(other).unwrap_err();
        assert!(matches!(err, ModelError::ChartVersionExists { .. }));
    }

    #[test]
    fn test_list_charts_sorts_versions() {
        let reg = registry();
        reg.put_chart(toggle_chart(2)).unwrap();
        reg.put_chart(toggle_chart(1)).unwrap();

        let charts = reg.list_charts();
        assert_eq!(charts.get("toggle"), Some(&vec![1, 2]));
    }

    #[test]
    fn test_instance_lifecycle() {
        let reg = registry();
        reg.put_chart(toggle_chart(1)).unwrap();

        reg.create_instance("i1", "toggle", 1).unwrap();
        assert_eq!(reg.instance_count(), 1);

        let active = reg
            .trigger_instance("i1", vec![TriggerEvent::new("flip")])
            .unwrap();
        assert_eq!(active, vec!["on"]);

        let status = reg.instance_status("i1").unwrap();
        assert_eq!(status.states().len(), 1);

        assert!(reg.remove_instance("i1"));
        assert!(!reg.remove_instance("i1"));
        assert_eq!(reg.instance_count(), 0);
    }

    #[test]
    fn test_duplicate_instance_id_rejected() {
        let reg = registry();
        reg.put_chart(toggle_chart(1)).unwrap();
        reg.create_instance("i1", "toggle", 1).unwrap();

        let err = reg.create_instance("i1", "toggle", 1).unwrap_err();
        assert!(matches!(err, ModelError::InstanceExists { .. }));
    }

    #[test]
    fn test_unknown_chart_and_instance() {
        let reg = registry();

        let err = reg.create_instance("i1", "ghost", 1).unwrap_err();
        assert!(matches!(err, ModelError::ChartVersionNotFound { .. }));

        let err = reg.trigger_instance("i1", Vec::new()).unwrap_err();
        assert!(matches!(err, ModelError::InstanceNotFound { .. }));
    }

    #[test]
    fn test_instances_share_one_chart() {
        let reg = registry();
        reg.put_chart(toggle_chart(1)).unwrap();

        reg.create_instance("i1", "toggle", 1).unwrap();
        reg.create_instance("i2", "toggle", 1).unwrap();

        reg.trigger_instance("i1", vec![TriggerEvent::new("flip")])
            .unwrap();

        // i2 is unaffected by i1's progress.
        let active = reg.trigger_instance("i2", Vec::new()).unwrap();
        assert_eq!(active, vec!["off"]);
    }
}
