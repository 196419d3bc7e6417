// ABOUTME: Combination table driving combinatorial invocation enumeration
// ABOUTME: Correlated groups multiply; reduce groups contribute exactly one slot

use super::error::{DagError, Derivable, NotDerivable};
use crate::lang::{GroupMode, ParamGroup, TASK_PARAM};

/// Ephemeral per-task-node table of parameter groups and their sizes. Groups
/// are treated as digits of a mixed-radix number ordered by registration; the
/// first-registered group is the least significant digit and varies fastest.
#[derive(Debug, Default)]
pub struct CombiTable {
    groups: Vec<Group>,
}

#[derive(Debug)]
struct Group {
    mode: GroupMode,
    members: Vec<String>,
    count: Option<usize>,
}

impl CombiTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, group: &ParamGroup) {
        self.groups.push(Group {
            mode: group.mode,
            members: group.members.iter().map(|m| m.name.clone()).collect(),
            // A reduce group is consumed whole and contributes one combination.
            count: match group.mode {
                GroupMode::Reduce => Some(1),
                GroupMode::Correlated => None,
            },
        });
    }

    /// Records the observed size of the data list bound to `param`. Reduce
    /// members ignore the size; correlated members must agree with any
    /// previously recorded size of their group.
    pub fn set_size(&mut self, param: &str, count: usize) -> Result<(), DagError> {
        for group in &mut self.groups {
            if !group.members.iter().any(|m| m == param) {
                continue;
            }

            if group.mode == GroupMode::Reduce {
                return Ok(());
            }

            if let Some(existing) = group.count {
                if existing != count {
                    return Err(DagError::SizeConflict {
                        param: param.to_string(),
                        expected: existing,
                        actual: count,
                    });
                }
            }

            group.count = Some(count);
            return Ok(());
        }

        Err(DagError::UnknownParam(param.to_string()))
    }

    pub fn all_sizes_known(&self) -> bool {
        self.groups.iter().all(|g| g.count.is_some())
    }

    /// Total combination count: the product of correlated group sizes.
    pub fn combination_count(&self) -> Derivable<usize> {
        let mut total = 1;
        for group in &self.groups {
            total *= group.count.ok_or(NotDerivable)?;
        }
        Ok(total)
    }

    /// Decomposes `iteration` into the sub-index of the group containing
    /// `param`. Reduce parameters cannot be enumerated.
    pub fn sub_index(&self, param: &str, iteration: usize) -> Result<usize, DagError> {
        let mut i = iteration;

        for group in &self.groups {
            let contains = group.members.iter().any(|m| m == param);

            if group.mode == GroupMode::Reduce {
                if contains {
                    return Err(DagError::EnumerateReduce(param.to_string()));
                }
                continue;
            }

            let count = group.count.ok_or_else(|| {
                DagError::Inconsistent(format!("size of group {:?} never recorded", group.members))
            })?;

            if contains {
                return Ok(i % count);
            }

            i /= count;
        }

        Err(DagError::UnknownParam(param.to_string()))
    }

    pub fn task_sub_index(&self, iteration: usize) -> Result<usize, DagError> {
        self.sub_index(TASK_PARAM, iteration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::ParamDecl;

    fn correlated(members: &[&str]) -> ParamGroup {
        ParamGroup {
            mode: GroupMode::Correlated,
            members: members
                .iter()
                .map(|m| ParamDecl {
                    name: m.to_string(),
                    stage: false,
                })
                .collect(),
        }
    }

    fn reduce(members: &[&str]) -> ParamGroup {
        ParamGroup {
            mode: GroupMode::Reduce,
            members: members
                .iter()
                .map(|m| ParamDecl {
                    name: m.to_string(),
                    stage: true,
                })
                .collect(),
        }
    }

    #[test]
    fn test_combination_count_multiplies_correlated_groups() {
        let mut table = CombiTable::new();
        table.register(&correlated(&[TASK_PARAM, "idx"]));
        table.register(&reduce(&["fastq"]));
        table.register(&correlated(&["group"]));

        assert!(!table.all_sizes_known());
        assert_eq!(table.combination_count(), Err(NotDerivable));

        table.set_size(TASK_PARAM, 3).unwrap();
        table.set_size("idx", 3).unwrap();
        table.set_size("fastq", 5).unwrap();
        table.set_size("group", 3).unwrap();

        assert!(table.all_sizes_known());
        assert_eq!(table.combination_count().unwrap(), 9);
    }

    #[test]
    fn test_first_registered_group_varies_fastest() {
        let mut table = CombiTable::new();
        table.register(&correlated(&["a"]));
        table.register(&correlated(&["b"]));
        table.set_size("a", 2).unwrap();
        table.set_size("b", 3).unwrap();

        assert_eq!(table.combination_count().unwrap(), 6);

        let pairs: Vec<(usize, usize)> = (0..6)
            .map(|i| {
                (
                    table.sub_index("a", i).unwrap(),
                    table.sub_index("b", i).unwrap(),
                )
            })
            .collect();

        assert_eq!(
            pairs,
            vec![(0, 0), (1, 0), (0, 1), (1, 1), (0, 2), (1, 2)]
        );
    }

    #[test]
    fn test_reduce_group_does_not_shift_radix() {
        let mut table = CombiTable::new();
        table.register(&correlated(&["a"]));
        table.register(&reduce(&["r"]));
        table.register(&correlated(&["b"]));
        table.set_size("a", 2).unwrap();
        table.set_size("r", 7).unwrap();
        table.set_size("b", 2).unwrap();

        assert_eq!(table.combination_count().unwrap(), 4);
        assert_eq!(table.sub_index("b", 3).unwrap(), 1);
        assert!(matches!(
            table.sub_index("r", 0),
            Err(DagError::EnumerateReduce(_))
        ));
    }

    #[test]
    fn test_correlated_size_disagreement_is_fatal() {
        let mut table = CombiTable::new();
        table.register(&correlated(&["x", "y"]));
        table.set_size("x", 4).unwrap();

        let err = table.set_size("y", 5).unwrap_err();
        assert!(matches!(
            err,
            DagError::SizeConflict {
                expected: 4,
                actual: 5,
                ..
            }
        ));
    }

    #[test]
    fn test_unregistered_param_is_rejected() {
        let mut table = CombiTable::new();
        table.register(&correlated(&["a"]));
        assert!(matches!(
            table.set_size("nope", 1),
            Err(DagError::UnknownParam(_))
        ));
    }
}
