use std::cmp::Reverse;
use std::collections::BTreeMap;

use log::{debug, info};

use crate::data::batch::{Batch, FieldUpdate};
use crate::error::{RecoError, RecoResult};

use super::stopwatch::StopwatchManager;
use super::{post_processor_factory, PostProcessor};

/// Priority of a module whose configuration does not specify one.
pub const DEFAULT_PRIORITY: i32 = -1;

// ---------------------------------------------------------------------------
// Priority ordering
// ---------------------------------------------------------------------------

/// Remove the `priority` option from a module configuration.
pub fn take_priority(name: &str, cfg: &mut serde_json::Value) -> RecoResult<i32> {
    let Some(value) = cfg.as_object_mut().and_then(|o| o.remove("priority")) else {
        return Ok(DEFAULT_PRIORITY);
    };
    value
        .as_i64()
        .and_then(|p| i32::try_from(p).ok())
        .ok_or_else(|| RecoError::config(name, format!("invalid priority {value}")))
}

/// Execution order for the given priorities: decreasing priority, ties in
/// declaration order.
pub fn order_by_priority(priorities: &[i32]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..priorities.len()).collect();
    order.sort_by_key(|&i| Reverse(priorities[i]));
    order
}

// ---------------------------------------------------------------------------
// PostManager
// ---------------------------------------------------------------------------

/// Runs the post-processors over a batch, in decreasing order of priority.
///
/// The modules are instantiated once and fed every batch.
pub struct PostManager {
    modules: Vec<(String, Box<dyn PostProcessor>)>,
    watch: StopwatchManager,
}

impl PostManager {
    /// Build from an ordered map `module name → options`.
    pub fn new(cfg: serde_json::Map<String, serde_json::Value>) -> RecoResult<Self> {
        let mut declared = Vec::with_capacity(cfg.len());
        for (name, mut module_cfg) in cfg {
            let priority = take_priority(&name, &mut module_cfg)?;
            let module = post_processor_factory(&name, module_cfg)?;
            declared.push((name, priority, module));
        }
        Ok(Self::from_modules(declared))
    }

    /// Build from already instantiated modules, given in declaration order
    /// with their priority.
    pub fn from_modules(declared: Vec<(String, i32, Box<dyn PostProcessor>)>) -> Self {
        let priorities: Vec<i32> = declared.iter().map(|(_, p, _)| *p).collect();
        let order = order_by_priority(&priorities);

        let mut slots: Vec<Option<(String, Box<dyn PostProcessor>)>> = declared
            .into_iter()
            .map(|(name, _, module)| Some((name, module)))
            .collect();
        let mut watch = StopwatchManager::default();
        let mut modules = Vec::with_capacity(slots.len());
        for i in order {
            if let Some((name, module)) = slots[i].take() {
                watch.initialize(&name);
                modules.push((name, module));
            }
        }
        PostManager { modules, watch }
    }

    /// Module names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.modules.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn watch(&self) -> &StopwatchManager {
        &self.watch
    }

    /// Pass one batch through every post-processor.
    ///
    /// Each module must produce every field it writes for every entry of
    /// the batch; partial coverage is an error and nothing of that module is
    /// written back.
    pub fn run(&mut self, batch: &mut Batch) -> RecoResult<()> {
        let num_entries = batch.num_entries();
        for (name, module) in &self.modules {
            for key in module.required_keys() {
                if !batch.entries.iter().all(|e| e.has(&key)) {
                    return Err(RecoError::MissingField {
                        module: name.clone(),
                        key,
                    });
                }
            }

            // Run the post-processor on each entry
            let batch_ref: &Batch = batch;
            let result = self.watch.time(name, || {
                let mut result: BTreeMap<String, (usize, Vec<Option<FieldUpdate>>)> =
                    BTreeMap::new();
                for entry in 0..num_entries {
                    for update in module.process(batch_ref, entry)? {
                        let (count, slots) = result
                            .entry(update.field())
                            .or_insert_with(|| (0, (0..num_entries).map(|_| None).collect()));
                        *count += 1;
                        slots[entry] = Some(update);
                    }
                }
                RecoResult::Ok(result)
            })?;

            // Update the input batch
            let mut columns = Vec::with_capacity(result.len());
            for (field, (count, slots)) in result {
                let filled = slots.iter().filter(|s| s.is_some()).count();
                if count != num_entries || filled != num_entries {
                    return Err(RecoError::IncompleteUpdate {
                        module: name.clone(),
                        field,
                        expected: num_entries,
                        got: count,
                    });
                }
                columns.push(slots);
            }
            for slots in columns {
                for (entry, update) in batch.entries.iter_mut().zip(slots.into_iter().flatten()) {
                    entry.apply(update);
                }
            }

            if let Some(w) = self.watch.get(name) {
                debug!("Post-processor `{name}` took {:?}", w.last());
            }
        }

        info!(
            "Ran {} post-processors over {num_entries} entries",
            self.modules.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batch::{Index, Product};
    use ndarray::array;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records its name when run and writes the entry position into a product.
    struct Recorder {
        name: &'static str,
        log: Rc<RefCell<Vec<&'static str>>>,
        skip_entry: Option<usize>,
        fail_entry: Option<usize>,
    }

    impl PostProcessor for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn process(&self, _batch: &Batch, entry: usize) -> RecoResult<Vec<FieldUpdate>> {
            if entry == 0 {
                self.log.borrow_mut().push(self.name);
            }
            if self.fail_entry == Some(entry) {
                return Err(RecoError::Config(format!("{} failed", self.name)));
            }
            if self.skip_entry == Some(entry) {
                return Ok(Vec::new());
            }
            Ok(vec![FieldUpdate::Product(
                "written".to_string(),
                Product::Labels(vec![entry as i64]),
            )])
        }
    }

    fn batch(n: usize) -> Batch {
        let mut columns = BTreeMap::new();
        columns.insert(
            "data".to_string(),
            (0..n)
                .map(|_| Product::Tensor(array![[0.0, 1.0, 1.0, 1.0, 1.0]]))
                .collect(),
        );
        Batch::from_columns(Index::Batched((0..n as u64).collect()), columns).unwrap()
    }

    fn recorder(
        name: &'static str,
        priority: i32,
        log: &Rc<RefCell<Vec<&'static str>>>,
    ) -> (String, i32, Box<dyn PostProcessor>) {
        let module = Recorder {
            name,
            log: Rc::clone(log),
            skip_entry: None,
            fail_entry: None,
        };
        (name.to_string(), priority, Box::new(module))
    }

    #[test]
    fn priority_order_is_descending_and_stable() {
        assert_eq!(order_by_priority(&[5, -1, 5, 10]), vec![3, 0, 2, 1]);
    }

    #[test]
    fn modules_run_in_priority_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut manager = PostManager::from_modules(vec![
            recorder("five_a", 5, &log),
            recorder("minus_one", -1, &log),
            recorder("five_b", 5, &log),
            recorder("ten", 10, &log),
        ]);
        assert_eq!(manager.names(), vec!["ten", "five_a", "five_b", "minus_one"]);

        let mut b = batch(3);
        manager.run(&mut b).unwrap();
        assert_eq!(*log.borrow(), vec!["ten", "five_a", "five_b", "minus_one"]);
        for (i, entry) in b.entries.iter().enumerate() {
            assert_eq!(entry.product("written"), Some(&Product::Labels(vec![i as i64])));
        }
        assert_eq!(manager.watch().get("ten").unwrap().laps(), 1);
    }

    #[test]
    fn partial_coverage_is_rejected() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let module = Recorder {
            name: "partial",
            log,
            skip_entry: Some(1),
            fail_entry: None,
        };
        let mut manager =
            PostManager::from_modules(vec![("partial".to_string(), -1, Box::new(module))]);
        let mut b = batch(2);
        let err = manager.run(&mut b).unwrap_err();
        assert!(matches!(
            err,
            RecoError::IncompleteUpdate { expected: 2, got: 1, .. }
        ));
        assert!(b.entries[0].product("written").is_none());
    }

    #[test]
    fn failing_modules_stop_their_watch() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let module = Recorder {
            name: "failing",
            log,
            skip_entry: None,
            fail_entry: Some(1),
        };
        let mut manager =
            PostManager::from_modules(vec![("failing".to_string(), -1, Box::new(module))]);
        let mut b = batch(2);
        assert!(matches!(manager.run(&mut b), Err(RecoError::Config(_))));
        assert_eq!(manager.watch().get("failing").unwrap().laps(), 1);
        assert!(b.entries[0].product("written").is_none());
    }

    #[test]
    fn priorities_are_read_from_the_config() {
        let mut cfg = json!({"priority": 3, "method": "local"});
        assert_eq!(take_priority("track_extrema", &mut cfg).unwrap(), 3);
        assert_eq!(cfg, json!({"method": "local"}));
        assert_eq!(take_priority("x", &mut json!({})).unwrap(), DEFAULT_PRIORITY);
        assert!(take_priority("x", &mut json!({"priority": "high"})).is_err());
    }

    #[test]
    fn unknown_modules_are_configuration_errors() {
        let cfg = json!({"teleport": {}});
        let err = PostManager::new(cfg.as_object().unwrap().clone()).err().unwrap();
        assert!(matches!(err, RecoError::Config(_)));
    }
}
