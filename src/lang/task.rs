// ABOUTME: Task prototype declarations with correlated/reduce parameter groups
// ABOUTME: Provides lookup helpers used by the enumerator and the code generator

use serde::{Deserialize, Serialize};

/// Name of the implicit parameter that selects which prototype an apply
/// expression runs. Every task node carries a binding for it.
pub const TASK_PARAM: &str = "task";

/// A task prototype: the declaration side of a `deftask`. Immutable once
/// built; call sites reference it by name through their `task` parameter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskPrototype {
    /// Free-form labels; the script language is picked from the recognized
    /// subset, remaining labels are carried as annotations.
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub params: Vec<ParamGroup>,
    pub outputs: Vec<OutputDecl>,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParamGroup {
    #[serde(default)]
    pub mode: GroupMode,
    pub members: Vec<ParamDecl>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GroupMode {
    /// Members are iterated in lock-step; all must agree on size.
    #[default]
    Correlated,
    /// Members are consumed as one whole list, contributing a single slot.
    Reduce,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParamDecl {
    pub name: String,
    #[serde(default)]
    pub stage: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputDecl {
    pub name: String,
    #[serde(default)]
    pub stage: bool,
    #[serde(default)]
    pub reduce: bool,
}

/// Script dialect a prototype body is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Bash,
    Python,
}

impl Language {
    pub fn label(&self) -> &'static str {
        match self {
            Language::Bash => "bash",
            Language::Python => "python",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "bash" => Some(Language::Bash),
            "python" => Some(Language::Python),
            _ => None,
        }
    }
}

impl TaskPrototype {
    /// The declared parameter groups plus the implicit correlated `task`
    /// group when the prototype does not declare one. Registration order is
    /// declaration order; the implicit group comes last.
    pub fn all_param_groups(&self) -> Vec<ParamGroup> {
        let mut groups = self.params.clone();
        if !self.declares_task_param() {
            groups.push(ParamGroup {
                mode: GroupMode::Correlated,
                members: vec![ParamDecl {
                    name: TASK_PARAM.to_string(),
                    stage: false,
                }],
            });
        }
        groups
    }

    pub fn declares_task_param(&self) -> bool {
        self.params
            .iter()
            .any(|g| g.members.iter().any(|m| m.name == TASK_PARAM))
    }

    /// All parameter names, including the implicit `task` parameter.
    pub fn param_names(&self) -> Vec<String> {
        self.all_param_groups()
            .iter()
            .flat_map(|g| g.members.iter().map(|m| m.name.clone()))
            .collect()
    }

    pub fn param_decl(&self, name: &str) -> Option<(&ParamDecl, GroupMode)> {
        for group in &self.params {
            for member in &group.members {
                if member.name == name {
                    return Some((member, group.mode));
                }
            }
        }
        None
    }

    pub fn is_param_reduce(&self, name: &str) -> bool {
        matches!(self.param_decl(name), Some((_, GroupMode::Reduce)))
    }

    pub fn is_param_stage(&self, name: &str) -> bool {
        matches!(self.param_decl(name), Some((decl, _)) if decl.stage)
    }

    pub fn n_output_channels(&self) -> usize {
        self.outputs.len()
    }

    pub fn output_index_of(&self, name: &str) -> Option<usize> {
        self.outputs.iter().position(|o| o.name == name)
    }

    pub fn output(&self, channel: usize) -> &OutputDecl {
        &self.outputs[channel]
    }

    pub fn single_output_names(&self) -> Vec<&str> {
        self.outputs
            .iter()
            .filter(|o| !o.reduce)
            .map(|o| o.name.as_str())
            .collect()
    }

    pub fn reduce_output_names(&self) -> Vec<&str> {
        self.outputs
            .iter()
            .filter(|o| o.reduce)
            .map(|o| o.name.as_str())
            .collect()
    }

    /// The script language derived from the label set. Exactly one
    /// recognized language label may appear; none defaults to bash.
    pub fn language(&self) -> Result<Language, String> {
        let mut found = None;
        for label in &self.labels {
            if let Some(lang) = Language::from_label(label) {
                if let Some(prev) = found {
                    if prev != lang {
                        return Err(format!(
                            "conflicting language labels '{}' and '{}'",
                            Language::label(&prev),
                            label
                        ));
                    }
                }
                found = Some(lang);
            }
        }
        Ok(found.unwrap_or(Language::Bash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proto(params: Vec<ParamGroup>) -> TaskPrototype {
        TaskPrototype {
            labels: vec![],
            params,
            outputs: vec![OutputDecl {
                name: "out".to_string(),
                stage: false,
                reduce: false,
            }],
            body: "true".to_string(),
        }
    }

    #[test]
    fn test_implicit_task_group_appended() {
        let p = proto(vec![ParamGroup {
            mode: GroupMode::Correlated,
            members: vec![ParamDecl {
                name: "a".to_string(),
                stage: false,
            }],
        }]);

        let groups = p.all_param_groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].members[0].name, TASK_PARAM);
        assert!(p.param_names().contains(&TASK_PARAM.to_string()));
    }

    #[test]
    fn test_explicit_task_group_not_duplicated() {
        let p = proto(vec![ParamGroup {
            mode: GroupMode::Correlated,
            members: vec![
                ParamDecl {
                    name: TASK_PARAM.to_string(),
                    stage: false,
                },
                ParamDecl {
                    name: "idx".to_string(),
                    stage: false,
                },
            ],
        }]);

        assert!(p.declares_task_param());
        assert_eq!(p.all_param_groups().len(), 1);
    }

    #[test]
    fn test_language_from_labels() {
        let mut p = proto(vec![]);
        assert_eq!(p.language().unwrap(), Language::Bash);

        p.labels = vec!["aligner".to_string(), "python".to_string()];
        assert_eq!(p.language().unwrap(), Language::Python);

        p.labels = vec!["bash".to_string(), "python".to_string()];
        assert!(p.language().is_err());
    }

    #[test]
    fn test_output_lookups() {
        let p = TaskPrototype {
            labels: vec![],
            params: vec![],
            outputs: vec![
                OutputDecl {
                    name: "sam".to_string(),
                    stage: true,
                    reduce: false,
                },
                OutputDecl {
                    name: "parts".to_string(),
                    stage: true,
                    reduce: true,
                },
            ],
            body: "true".to_string(),
        };

        assert_eq!(p.output_index_of("parts"), Some(1));
        assert_eq!(p.output_index_of("bam"), None);
        assert_eq!(p.single_output_names(), vec!["sam"]);
        assert_eq!(p.reduce_output_names(), vec!["parts"]);
    }
}
