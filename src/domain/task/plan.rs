//! Task Plan Generation
//!
//! A plan spec is an ordered list of groups. Expanding it yields the flat,
//! ordered list of task names persisted for one wallet.

use crate::error::PlanError;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One element of a plan spec
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawGroup", into = "RawGroup")]
pub enum TaskGroup {
    /// Always included
    Single(String),
    /// Exactly one member, chosen uniformly
    PickOne(Vec<String>),
    /// All members, in random order
    ShuffleAll(Vec<String>),
}

impl TaskGroup {
    pub fn single(name: impl Into<String>) -> Self {
        TaskGroup::Single(name.into())
    }

    pub fn pick_one<S: Into<String>>(members: impl IntoIterator<Item = S>) -> Self {
        TaskGroup::PickOne(members.into_iter().map(Into::into).collect())
    }

    pub fn shuffle_all<S: Into<String>>(members: impl IntoIterator<Item = S>) -> Self {
        TaskGroup::ShuffleAll(members.into_iter().map(Into::into).collect())
    }

    fn members(&self) -> &[String] {
        match self {
            TaskGroup::Single(name) => std::slice::from_ref(name),
            TaskGroup::PickOne(members) | TaskGroup::ShuffleAll(members) => members,
        }
    }

    fn check(&self, position: usize) -> Result<(), PlanError> {
        let members = self.members();
        if members.is_empty() {
            return Err(PlanError::EmptyGroup { position });
        }
        if members.iter().any(|m| m.trim().is_empty()) {
            return Err(PlanError::EmptyName { position });
        }
        Ok(())
    }
}

/// TOML/JSON shape: a bare name or `{ group = "...", members = [...] }`
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawGroup {
    Name(String),
    Group { group: GroupKind, members: Vec<String> },
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum GroupKind {
    PickOne,
    ShuffleAll,
}

impl TryFrom<RawGroup> for TaskGroup {
    type Error = PlanError;

    fn try_from(raw: RawGroup) -> Result<Self, Self::Error> {
        let group = match raw {
            RawGroup::Name(name) => TaskGroup::Single(name),
            RawGroup::Group {
                group: GroupKind::PickOne,
                members,
            } => TaskGroup::PickOne(members),
            RawGroup::Group {
                group: GroupKind::ShuffleAll,
                members,
            } => TaskGroup::ShuffleAll(members),
        };
        // position is unknown here; TaskPlanSpec::new reports it
        group.check(0)?;
        Ok(group)
    }
}

impl From<TaskGroup> for RawGroup {
    fn from(group: TaskGroup) -> Self {
        match group {
            TaskGroup::Single(name) => RawGroup::Name(name),
            TaskGroup::PickOne(members) => RawGroup::Group {
                group: GroupKind::PickOne,
                members,
            },
            TaskGroup::ShuffleAll(members) => RawGroup::Group {
                group: GroupKind::ShuffleAll,
                members,
            },
        }
    }
}

/// Validated, ordered list of groups
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskPlanSpec {
    groups: Vec<TaskGroup>,
}

impl TaskPlanSpec {
    pub fn new(groups: Vec<TaskGroup>) -> Result<Self, PlanError> {
        if groups.is_empty() {
            return Err(PlanError::EmptyPlan);
        }
        for (i, group) in groups.iter().enumerate() {
            group.check(i + 1)?;
        }
        Ok(Self { groups })
    }

    pub fn groups(&self) -> &[TaskGroup] {
        &self.groups
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of task names every expansion produces
    pub fn expanded_len(&self) -> usize {
        self.groups
            .iter()
            .map(|g| match g {
                TaskGroup::Single(_) | TaskGroup::PickOne(_) => 1,
                TaskGroup::ShuffleAll(members) => members.len(),
            })
            .sum()
    }

    /// Every task name this plan can produce, deduplicated
    pub fn task_names(&self) -> BTreeSet<&str> {
        self.groups
            .iter()
            .flat_map(|g| match g {
                TaskGroup::Single(name) => std::slice::from_ref(name),
                TaskGroup::PickOne(members) | TaskGroup::ShuffleAll(members) => members.as_slice(),
            })
            .map(String::as_str)
            .collect()
    }
}

/// Expands plan specs into concrete task lists
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanGenerator;

impl PlanGenerator {
    /// Expand `spec` using `rng`. Same seed, same output.
    pub fn generate<R: Rng + ?Sized>(spec: &TaskPlanSpec, rng: &mut R) -> Vec<String> {
        let mut plan = Vec::with_capacity(spec.expanded_len());
        for group in &spec.groups {
            match group {
                TaskGroup::Single(name) => plan.push(name.clone()),
                TaskGroup::PickOne(members) => {
                    if let Some(choice) = members.choose(rng) {
                        plan.push(choice.clone());
                    }
                }
                TaskGroup::ShuffleAll(members) => {
                    let mut shuffled = members.clone();
                    shuffled.shuffle(rng);
                    plan.extend(shuffled);
                }
            }
        }
        plan
    }

    /// Expand with the thread-local generator
    pub fn generate_now(spec: &TaskPlanSpec) -> Vec<String> {
        Self::generate(spec, &mut rand::thread_rng())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn sample_spec() -> TaskPlanSpec {
        TaskPlanSpec::new(vec![
            TaskGroup::single("A"),
            TaskGroup::pick_one(["B", "C"]),
            TaskGroup::shuffle_all(["D", "E"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_same_seed_same_plan() {
        let spec = sample_spec();
        let first = PlanGenerator::generate(&spec, &mut StdRng::seed_from_u64(42));
        let second = PlanGenerator::generate(&spec, &mut StdRng::seed_from_u64(42));
        assert_eq!(first, second);
    }

    #[test]
    fn test_plan_shape() {
        let spec = sample_spec();
        for seed in 0..50 {
            let plan = PlanGenerator::generate(&spec, &mut StdRng::seed_from_u64(seed));
            assert_eq!(plan.len(), 4);
            assert_eq!(plan[0], "A");
            assert!(plan[1] == "B" || plan[1] == "C");
            let mut tail = plan[2..].to_vec();
            tail.sort();
            assert_eq!(tail, vec!["D".to_string(), "E".to_string()]);
        }
    }

    #[test]
    fn test_pick_one_is_roughly_uniform() {
        let spec = TaskPlanSpec::new(vec![TaskGroup::pick_one(["x", "y", "z"])]).unwrap();
        let mut rng = StdRng::seed_from_u64(1234);
        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..1000 {
            let plan = PlanGenerator::generate(&spec, &mut rng);
            assert_eq!(plan.len(), 1);
            *counts.entry(plan[0].clone()).or_default() += 1;
        }
        for member in ["x", "y", "z"] {
            let n = counts.get(member).copied().unwrap_or(0);
            assert!((250..=420).contains(&n), "{} picked {} times", member, n);
        }
    }

    #[test]
    fn test_shuffle_all_produces_both_orders() {
        let spec = TaskPlanSpec::new(vec![TaskGroup::shuffle_all(["D", "E"])]).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        let mut d_first = false;
        let mut e_first = false;
        for _ in 0..100 {
            let plan = PlanGenerator::generate(&spec, &mut rng);
            match plan[0].as_str() {
                "D" => d_first = true,
                _ => e_first = true,
            }
        }
        assert!(d_first && e_first);
    }

    #[test]
    fn test_invalid_specs_rejected() {
        assert_eq!(TaskPlanSpec::new(vec![]), Err(PlanError::EmptyPlan));
        assert_eq!(
            TaskPlanSpec::new(vec![TaskGroup::single("A"), TaskGroup::PickOne(vec![])]),
            Err(PlanError::EmptyGroup { position: 2 })
        );
        assert_eq!(
            TaskPlanSpec::new(vec![TaskGroup::shuffle_all(["ok", " "])]),
            Err(PlanError::EmptyName { position: 1 })
        );
    }

    #[test]
    fn test_groups_deserialize_from_toml() {
        #[derive(Deserialize)]
        struct Doc {
            daily: Vec<TaskGroup>,
        }

        let doc: Doc = toml::from_str(
            r#"
            daily = [
                "faucet",
                { group = "pick_one", members = ["swap", "bridge"] },
                { group = "shuffle_all", members = ["mint", "stake"] },
            ]
            "#,
        )
        .unwrap();

        assert_eq!(
            doc.daily,
            vec![
                TaskGroup::single("faucet"),
                TaskGroup::pick_one(["swap", "bridge"]),
                TaskGroup::shuffle_all(["mint", "stake"]),
            ]
        );
    }

    #[test]
    fn test_empty_group_fails_to_deserialize() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Doc {
            daily: Vec<TaskGroup>,
        }

        let result: Result<Doc, _> =
            toml::from_str(r#"daily = [{ group = "pick_one", members = [] }]"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_task_names_deduplicated() {
        let spec = TaskPlanSpec::new(vec![
            TaskGroup::single("faucet"),
            TaskGroup::pick_one(["swap", "faucet"]),
            TaskGroup::shuffle_all(["mint", "bridge"]),
        ])
        .unwrap();
        let names: Vec<&str> = spec.task_names().into_iter().collect();
        assert_eq!(names, vec!["bridge", "faucet", "mint", "swap"]);
    }
}
