//! Normalization of raw step definitions into a [`Plan`].
//!
//! Step lists come from YAML in several shapes: bare strings, maps with a
//! discriminator key (`class`, `command`, `callable`, `steps`), and maps of
//! sibling steps that form an implicit parallel group. Normalization turns
//! every entry into a [`Step`] and rejects anything ambiguous or unknown
//! before a single step runs.

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::error::PlanError;
use crate::runner::{StepRegistry, StepType};

use super::condition::Condition;
use super::plan::{Phase, Plan, PlanKind};
use super::step::{ClassStep, CommandStep, ParallelGroup, Priority, Step, StepVariant};

/// Keys that select the variant of a mapping definition.
const DISCRIMINATORS: [&str; 4] = ["class", "command", "callable", "steps"];

/// Keys every mapping definition may carry besides its discriminator.
const COMMON_KEYS: [&str; 2] = ["name", "triggers"];

/// Keys understood by command definitions.
const COMMAND_KEYS: [&str; 5] = ["cwd", "working_dir", "env", "priority", "timeout"];

/// Deepest nesting level a step may sit at; groups live at level 0 only.
const MAX_DEPTH: u8 = 1;

/// A plan as written in configuration, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPlan {
    /// Steps run before the main list.
    #[serde(default)]
    pub preflight_steps: Value,
    /// Steps run when a clean run is requested.
    #[serde(default)]
    pub clean_steps: Value,
    /// The main, condition-filtered list.
    #[serde(default)]
    pub steps: Value,
    /// Steps run first on rollback.
    #[serde(default)]
    pub rollback_preflight_steps: Value,
    /// Steps that undo partial effects.
    #[serde(default)]
    pub rollback_steps: Value,
}

/// Turns a [`RawPlan`] into a [`Plan`] for one plan kind.
#[derive(Debug, Clone, Copy)]
pub struct PlanNormalizer<'a> {
    /// Step types and callables known to this run.
    registry: &'a StepRegistry,
    /// Kind of plan being built.
    kind: PlanKind,
}

/// Where an entry sits in its list.
struct EntryKey<'k> {
    /// Name taken from a non-numeric map key.
    name: Option<String>,
    /// Position within the list.
    index: usize,
    /// Name of the enclosing list or group, for error messages.
    parent: &'k str,
}

impl RawPlan {
    /// Parses a raw plan from YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is not a map of step lists.
    pub fn from_yaml(content: &str) -> Result<Self, PlanError> {
        serde_yaml::from_str(content).map_err(|e| PlanError::invalid("plan", e.to_string()))
    }

    /// Returns the raw list for `phase`.
    #[must_use]
    pub const fn list(&self, phase: Phase) -> &Value {
        match phase {
            Phase::Clean => &self.clean_steps,
            Phase::Preflight => &self.preflight_steps,
            Phase::Steps => &self.steps,
            Phase::RollbackPreflight => &self.rollback_preflight_steps,
            Phase::RollbackSteps => &self.rollback_steps,
        }
    }
}

impl<'a> PlanNormalizer<'a> {
    /// Creates a normalizer for plans of `kind`.
    #[must_use]
    pub const fn new(registry: &'a StepRegistry, kind: PlanKind) -> Self {
        Self { registry, kind }
    }

    /// Normalizes every list of `raw`.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error found, or
    /// [`PlanError::EmptySteps`] if the main list is empty.
    pub fn normalize(&self, raw: &RawPlan) -> Result<Plan, PlanError> {
        let preflight = self.normalize_phase(raw, Phase::Preflight)?;
        let clean = self.normalize_phase(raw, Phase::Clean)?;
        let steps = self.normalize_phase(raw, Phase::Steps)?;
        let rollback_preflight = self.normalize_phase(raw, Phase::RollbackPreflight)?;
        let rollback_steps = self.normalize_phase(raw, Phase::RollbackSteps)?;

        if steps.is_empty() {
            return Err(PlanError::EmptySteps { kind: self.kind });
        }

        let plan = Plan::from_lists(
            self.kind,
            preflight,
            clean,
            steps,
            rollback_preflight,
            rollback_steps,
        );
        debug!("Normalized {} plan with {} steps", self.kind, plan.step_count());
        Ok(plan)
    }

    fn normalize_phase(&self, raw: &RawPlan, phase: Phase) -> Result<Vec<Step>, PlanError> {
        self.normalize_list(phase.config_key(), raw.list(phase), 0)
    }

    /// Normalizes a list given as a map, a sequence, or nothing.
    fn normalize_list(&self, parent: &str, list: &Value, depth: u8) -> Result<Vec<Step>, PlanError> {
        match list {
            Value::Null => Ok(Vec::new()),
            Value::Mapping(map) => self.normalize_map_entries(parent, map, depth),
            Value::Sequence(items) => items
                .iter()
                .enumerate()
                .map(|(index, definition)| {
                    let key = EntryKey {
                        name: None,
                        index,
                        parent,
                    };
                    self.normalize_entry(&key, definition, depth)
                })
                .collect(),
            _ => Err(PlanError::invalid(
                parent,
                "expected a map or a list of steps",
            )),
        }
    }

    fn normalize_map_entries(
        &self,
        parent: &str,
        map: &Mapping,
        depth: u8,
    ) -> Result<Vec<Step>, PlanError> {
        map.iter()
            .enumerate()
            .map(|(index, (key, definition))| {
                let key = EntryKey {
                    name: explicit_name(key),
                    index,
                    parent,
                };
                self.normalize_entry(&key, definition, depth)
            })
            .collect()
    }

    fn normalize_entry(
        &self,
        key: &EntryKey<'_>,
        definition: &Value,
        depth: u8,
    ) -> Result<Step, PlanError> {
        let label = key.label();
        match definition {
            Value::String(text) => {
                let variant = self.classify(&label, text)?;
                let triggers = self.default_triggers(&variant);
                let name = key.name.clone().unwrap_or_else(|| text.clone());
                Ok(Step::new(name, variant).with_triggers(triggers))
            }
            Value::Mapping(map) => self.normalize_mapping(key, &label, map, depth),
            _ => Err(PlanError::invalid(
                label,
                "expected a string or a map",
            )),
        }
    }

    /// Classifies a bare string: step type, then callable, then command.
    fn classify(&self, label: &str, text: &str) -> Result<StepVariant, PlanError> {
        if let Some(step_type) = self.registry.step_type(text) {
            self.check_kind(label, text, step_type)?;
            return Ok(StepVariant::Class(ClassStep {
                type_name: text.to_string(),
                options: BTreeMap::new(),
            }));
        }
        if self.registry.callable(text).is_some() {
            return Ok(StepVariant::Callable {
                reference: text.to_string(),
            });
        }
        if text.trim().is_empty() {
            return Err(PlanError::invalid(label, "command is empty"));
        }
        Ok(StepVariant::Command(CommandStep::new(text)))
    }

    fn normalize_mapping(
        &self,
        key: &EntryKey<'_>,
        label: &str,
        map: &Mapping,
        depth: u8,
    ) -> Result<Step, PlanError> {
        let present: Vec<&str> = DISCRIMINATORS
            .iter()
            .copied()
            .filter(|k| map.contains_key(*k))
            .collect();

        match present.as_slice() {
            [] if depth == 0 => {
                if let Some(reserved) = COMMON_KEYS.iter().find(|k| map.contains_key(**k)) {
                    return Err(PlanError::invalid(
                        label,
                        format!(
                            "'{reserved}' cannot be set on an implicit group; \
                             list the members under 'steps:' instead"
                        ),
                    ));
                }
                let children = self.normalize_map_entries(label, map, depth + 1)?;
                let name = key.name.clone().unwrap_or_else(|| key.group_name());
                group_step(label, name, children, Vec::new())
            }
            [] => Err(PlanError::NestedParallelGroup {
                step: label.to_string(),
            }),
            ["steps"] => {
                if depth >= MAX_DEPTH {
                    return Err(PlanError::NestedParallelGroup {
                        step: label.to_string(),
                    });
                }
                let children = match map.get("steps") {
                    Some(steps) => self.normalize_list(label, steps, depth + 1)?,
                    None => Vec::new(),
                };
                let triggers = parse_triggers(label, map)?.unwrap_or_default();
                let name = Self::resolve_name(key, map, None)?;
                group_step(label, name.unwrap_or_else(|| key.group_name()), children, triggers)
            }
            [discriminator] => {
                let variant = match *discriminator {
                    "command" => Self::command_variant(label, map)?,
                    "callable" => self.callable_variant(label, map)?,
                    _ => self.class_variant(label, map)?,
                };
                let triggers = match parse_triggers(label, map)? {
                    Some(triggers) => triggers,
                    None => self.default_triggers(&variant),
                };
                let derived = variant.derived_name().map(str::to_string);
                let name = Self::resolve_name(key, map, derived)?
                    .unwrap_or_else(|| key.group_name());
                Ok(Step::new(name, variant).with_triggers(triggers))
            }
            keys => Err(PlanError::AmbiguousStep {
                step: label.to_string(),
                keys: keys.join(", "),
            }),
        }
    }

    fn command_variant(label: &str, map: &Mapping) -> Result<StepVariant, PlanError> {
        let line = match map.get("command") {
            Some(Value::String(line)) if !line.trim().is_empty() => line.clone(),
            Some(Value::String(_)) => return Err(PlanError::invalid(label, "command is empty")),
            _ => return Err(PlanError::invalid(label, "command must be a string")),
        };

        let mut command = CommandStep::new(line);

        let working_dir = map.get("cwd").or_else(|| map.get("working_dir"));
        if let Some(dir) = working_dir {
            let dir = dir
                .as_str()
                .ok_or_else(|| PlanError::invalid(label, "working directory must be a string"))?;
            command.working_dir = Some(PathBuf::from(dir));
        }

        if let Some(env) = map.get("env") {
            command.env = parse_env(label, env)?;
        }

        if let Some(priority) = map.get("priority") {
            command.priority = serde_yaml::from_value::<Priority>(priority.clone()).map_err(|_| {
                PlanError::invalid(label, "priority must be one of low, normal, high")
            })?;
        }

        if let Some(timeout) = map.get("timeout") {
            let secs = timeout
                .as_u64()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| PlanError::invalid(label, "timeout must be a positive number of seconds"))?;
            command.timeout_secs = Some(secs);
        }

        warn_unknown_keys(label, map, "command", &COMMAND_KEYS);
        Ok(StepVariant::Command(command))
    }

    fn callable_variant(&self, label: &str, map: &Mapping) -> Result<StepVariant, PlanError> {
        let Some(Value::String(reference)) = map.get("callable") else {
            return Err(PlanError::ClosureCallable {
                step: label.to_string(),
            });
        };

        if self.registry.callable(reference).is_none() {
            return Err(PlanError::UnknownCallable {
                step: label.to_string(),
                reference: reference.clone(),
            });
        }

        warn_unknown_keys(label, map, "callable", &[]);
        Ok(StepVariant::Callable {
            reference: reference.clone(),
        })
    }

    fn class_variant(&self, label: &str, map: &Mapping) -> Result<StepVariant, PlanError> {
        let Some(Value::String(type_name)) = map.get("class") else {
            return Err(PlanError::invalid(label, "class must be a step type name"));
        };

        let step_type = self
            .registry
            .step_type(type_name)
            .ok_or_else(|| PlanError::UnknownStepType {
                step: label.to_string(),
                type_name: type_name.clone(),
            })?;
        self.check_kind(label, type_name, step_type)?;

        let mut options = BTreeMap::new();
        match map.get("options") {
            Some(Value::Mapping(explicit)) => {
                for (key, value) in explicit {
                    options.insert(option_key(label, key)?, value.clone());
                }
            }
            Some(Value::Null) | None => {}
            Some(_) => return Err(PlanError::invalid(label, "options must be a map")),
        }

        // Any other key is a step option too.
        for (key, value) in map {
            let key = option_key(label, key)?;
            if key != "class" && key != "options" && !COMMON_KEYS.contains(&key.as_str()) {
                options.insert(key, value.clone());
            }
        }

        Ok(StepVariant::Class(ClassStep {
            type_name: type_name.clone(),
            options,
        }))
    }

    fn check_kind(&self, label: &str, type_name: &str, step_type: &StepType) -> Result<(), PlanError> {
        if step_type.supports(self.kind) {
            Ok(())
        } else {
            Err(PlanError::UnsupportedStepType {
                step: label.to_string(),
                type_name: type_name.to_string(),
                kind: self.kind,
            })
        }
    }

    fn default_triggers(&self, variant: &StepVariant) -> Vec<Condition> {
        match variant {
            StepVariant::Class(class) => self
                .registry
                .step_type(&class.type_name)
                .map(|t| t.default_triggers.clone())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// List key first, then an explicit `name` field, then `derived`.
    fn resolve_name(
        key: &EntryKey<'_>,
        map: &Mapping,
        derived: Option<String>,
    ) -> Result<Option<String>, PlanError> {
        if let Some(name) = &key.name {
            return Ok(Some(name.clone()));
        }
        match map.get("name") {
            Some(Value::String(name)) if !name.is_empty() => Ok(Some(name.clone())),
            Some(Value::Null) | None => Ok(derived),
            Some(_) => Err(PlanError::invalid(key.label(), "name must be a non-empty string")),
        }
    }
}

impl EntryKey<'_> {
    fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}[{}]", self.parent, self.index))
    }

    fn group_name(&self) -> String {
        format!("group-{}", self.index)
    }
}

/// A map key names a step unless it is empty or numeric.
fn explicit_name(key: &Value) -> Option<String> {
    match key {
        Value::String(s) if !s.is_empty() && !s.chars().all(|c| c.is_ascii_digit()) => {
            Some(s.clone())
        }
        _ => None,
    }
}

fn group_step(
    label: &str,
    name: String,
    children: Vec<Step>,
    triggers: Vec<Condition>,
) -> Result<Step, PlanError> {
    if children.is_empty() {
        return Err(PlanError::invalid(label, "a parallel group needs at least one step"));
    }
    Ok(Step::new(name, StepVariant::Parallel(ParallelGroup { children })).with_triggers(triggers))
}

fn parse_triggers(label: &str, map: &Mapping) -> Result<Option<Vec<Condition>>, PlanError> {
    let names: Vec<&str> = match map.get("triggers") {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(name)) => vec![name.as_str()],
        Some(Value::Sequence(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .ok_or_else(|| PlanError::invalid(label, "triggers must be strings"))
            })
            .collect::<Result<_, _>>()?,
        Some(_) => return Err(PlanError::invalid(label, "triggers must be a list")),
    };

    let mut triggers = Vec::with_capacity(names.len());
    for name in names {
        let condition = name
            .parse::<Condition>()
            .map_err(|condition| PlanError::UnknownCondition {
                step: label.to_string(),
                condition,
            })?;
        if !triggers.contains(&condition) {
            triggers.push(condition);
        }
    }
    Ok(Some(triggers))
}

fn parse_env(label: &str, env: &Value) -> Result<BTreeMap<String, String>, PlanError> {
    let Value::Mapping(map) = env else {
        return Err(PlanError::invalid(label, "env must be a map"));
    };

    let mut parsed = BTreeMap::new();
    for (key, value) in map {
        let key = option_key(label, key)?;
        let value = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => String::new(),
            _ => {
                return Err(PlanError::invalid(
                    label,
                    format!("env value for {key} must be a scalar"),
                ));
            }
        };
        parsed.insert(key, value);
    }
    Ok(parsed)
}

fn option_key(label: &str, key: &Value) -> Result<String, PlanError> {
    match key {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(PlanError::invalid(label, "keys must be strings")),
    }
}

fn warn_unknown_keys(label: &str, map: &Mapping, discriminator: &str, allowed: &[&str]) {
    for key in map.keys() {
        let Some(key) = key.as_str() else { continue };
        if key != discriminator && !COMMON_KEYS.contains(&key) && !allowed.contains(&key) {
            warn!("Ignoring unknown key '{key}' on step '{label}'");
        }
    }
}
