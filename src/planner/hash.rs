//! Plan fingerprinting.
//!
//! A fingerprint identifies the normalized content of a plan, so two runs
//! can be compared without diffing their configuration files.

use sha2::{Digest, Sha256};
use tracing::warn;

use super::plan::{Phase, Plan};
use super::step::{Priority, Step, StepVariant};

/// Hasher for computing plan fingerprints.
#[derive(Debug, Default)]
pub struct PlanHasher;

impl PlanHasher {
    /// Creates a new plan hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the fingerprint of an entire plan.
    #[must_use]
    pub fn hash_plan(&self, plan: &Plan) -> String {
        let mut hasher = Sha256::new();

        field(&mut hasher, "kind", plan.kind().to_string().as_bytes());

        for phase in Phase::ALL {
            let steps = plan.phase(phase);
            field(&mut hasher, phase.config_key(), &(steps.len() as u64).to_be_bytes());
            for step in steps {
                field(&mut hasher, "step", self.hash_step(step).as_bytes());
            }
        }

        hex::encode(hasher.finalize())
    }

    /// Computes the fingerprint of a single step.
    ///
    /// Every field is tagged and length-prefixed, so adjacent fields can
    /// never be re-split into the same byte stream.
    #[must_use]
    pub fn hash_step(&self, step: &Step) -> String {
        let mut hasher = Sha256::new();

        field(&mut hasher, "name", step.name.as_bytes());
        field(&mut hasher, "variant", step.variant.kind_label().as_bytes());
        for trigger in &step.triggers {
            field(&mut hasher, "trigger", trigger.as_str().as_bytes());
        }

        match &step.variant {
            StepVariant::Command(command) => {
                field(&mut hasher, "line", command.line.as_bytes());
                if let Some(dir) = &command.working_dir {
                    field(&mut hasher, "cwd", dir.to_string_lossy().as_bytes());
                }
                // BTreeMap iteration is already sorted
                for (key, value) in &command.env {
                    field(&mut hasher, "env.key", key.as_bytes());
                    field(&mut hasher, "env.value", value.as_bytes());
                }
                let priority = match command.priority {
                    Priority::Low => "low",
                    Priority::Normal => "normal",
                    Priority::High => "high",
                };
                field(&mut hasher, "priority", priority.as_bytes());
                if let Some(timeout) = command.timeout_secs {
                    field(&mut hasher, "timeout", &timeout.to_be_bytes());
                }
            }
            StepVariant::Callable { reference } => {
                field(&mut hasher, "callable", reference.as_bytes());
            }
            StepVariant::Class(class) => {
                field(&mut hasher, "class", class.type_name.as_bytes());
                for (key, value) in &class.options {
                    field(&mut hasher, "option.key", key.as_bytes());
                    match serde_yaml::to_string(value) {
                        Ok(encoded) => field(&mut hasher, "option.yaml", encoded.as_bytes()),
                        Err(e) => {
                            warn!("Hashing option {key} of {} by debug form: {e}", step.name);
                            field(&mut hasher, "option.debug", format!("{value:?}").as_bytes());
                        }
                    }
                }
            }
            StepVariant::Parallel(group) => {
                for child in &group.children {
                    field(&mut hasher, "child", self.hash_step(child).as_bytes());
                }
            }
        }

        hex::encode(hasher.finalize())
    }

    /// Returns a short form of a fingerprint for display.
    #[must_use]
    pub fn short(hash: &str) -> &str {
        hash.get(..12).unwrap_or(hash)
    }
}

/// Feeds one tagged, length-prefixed field into the hasher.
fn field(hasher: &mut Sha256, tag: &str, bytes: &[u8]) {
    hasher.update((tag.len() as u64).to_be_bytes());
    hasher.update(tag.as_bytes());
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{PlanKind, PlanNormalizer, RawPlan};
    use crate::testing::test_registry;

    fn plan(yaml: &str) -> Plan {
        let raw = RawPlan::from_yaml(yaml).expect("valid raw plan");
        PlanNormalizer::new(&test_registry(), PlanKind::Deploy)
            .normalize(&raw)
            .expect("plan should normalize")
    }

    #[test]
    fn test_hash_deterministic() {
        let yaml = "steps:\n  - echo one\n  - DeployCode\n";
        let hash1 = PlanHasher::new().hash_plan(&plan(yaml));
        let hash2 = PlanHasher::new().hash_plan(&plan(yaml));

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_hash_changes_with_content() {
        let hasher = PlanHasher::new();
        let base = hasher.hash_plan(&plan("steps:\n  - echo one\n"));
        let reordered = hasher.hash_plan(&plan("steps:\n  - echo one\n  - echo two\n"));
        let triggered = hasher.hash_plan(&plan(
            "steps:\n  - command: echo one\n    triggers: [assets]\n",
        ));

        assert_ne!(base, reordered);
        assert_ne!(base, triggered);
    }

    #[test]
    fn test_list_placement_matters() {
        let hasher = PlanHasher::new();
        let main = hasher.hash_plan(&plan("steps:\n  - echo one\n"));
        let with_rollback =
            hasher.hash_plan(&plan("steps:\n  - echo one\nrollback_steps:\n  - echo one\n"));

        assert_ne!(main, with_rollback);
        assert_eq!(PlanHasher::short(&main).len(), 12);
    }

    #[test]
    fn test_adjacent_fields_do_not_collide() {
        let hasher = PlanHasher::new();
        let with_cwd = hasher.hash_plan(&plan(
            "steps:\n  - name: s\n    command: make\n    cwd: x\n",
        ));
        let joined = hasher.hash_plan(&plan("steps:\n  - name: s\n    command: makex\n"));
        assert_ne!(with_cwd, joined);

        let split_key = hasher.hash_plan(&plan(
            "steps:\n  - name: s\n    command: make\n    env: {AB: C}\n",
        ));
        let split_value = hasher.hash_plan(&plan(
            "steps:\n  - name: s\n    command: make\n    env: {A: BC}\n",
        ));
        assert_ne!(split_key, split_value);
    }

    #[test]
    fn test_priority_is_part_of_fingerprint() {
        let hasher = PlanHasher::new();
        let normal = hasher.hash_plan(&plan("steps:\n  - command: make\n"));
        let high = hasher.hash_plan(&plan("steps:\n  - command: make\n    priority: high\n"));
        let low = hasher.hash_plan(&plan("steps:\n  - command: make\n    priority: low\n"));

        assert_ne!(normal, high);
        assert_ne!(normal, low);
        assert_ne!(high, low);
    }

    #[test]
    fn test_class_options_are_hashed() {
        let hasher = PlanHasher::new();
        let plain = hasher.hash_plan(&plan("steps:\n  - class: DeployCode\n"));
        let with_options =
            hasher.hash_plan(&plan("steps:\n  - class: DeployCode\n    mode: [fast, 1]\n"));

        assert_ne!(plain, with_options);
    }
}
