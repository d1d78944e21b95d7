//! Per-modality inspection of a session tree against the static schema tables.

use std::collections::BTreeMap;
use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::Serialize;

use crate::domain::Modality;
use crate::error::BndError;
use crate::fs_util::{self, Entry};
use crate::paths::SessionPath;
use crate::schema::{Bindings, Cardinality, Consistency, EntryKind, LevelSchema};

mod behavior;
mod ephys;
mod video;

pub use behavior::BehaviorInspector;
pub use ephys::EphysInspector;
pub use video::VideoInspector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ViolationKind {
    Missing,
    Unexpected,
    Malformed,
    CountMismatch,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationKind::Missing => write!(f, "missing"),
            ViolationKind::Unexpected => write!(f, "unexpected"),
            ViolationKind::Malformed => write!(f, "malformed"),
            ViolationKind::CountMismatch => write!(f, "count mismatch"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationViolation {
    pub modality: Modality,
    pub path: Utf8PathBuf,
    pub kind: ViolationKind,
    pub detail: String,
}

impl fmt::Display for ValidationViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} ({})",
            self.modality, self.kind, self.detail, self.path
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum InspectPolicy {
    /// Stop at the first violation in traversal order.
    #[default]
    FirstProblem,
    CollectAll,
}

/// One modality's check of a session subtree.
pub trait ModalityInspector: Send + Sync {
    fn modality(&self) -> Modality;

    fn inspect(
        &self,
        session: &SessionPath,
        policy: InspectPolicy,
    ) -> Result<Vec<ValidationViolation>, BndError>;
}

/// Accumulates violations and knows when the policy says to stop.
pub(crate) struct Collector {
    modality: Modality,
    policy: InspectPolicy,
    violations: Vec<ValidationViolation>,
}

impl Collector {
    pub(crate) fn new(modality: Modality, policy: InspectPolicy) -> Self {
        Self {
            modality,
            policy,
            violations: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, path: Utf8PathBuf, kind: ViolationKind, detail: String) {
        if self.done() {
            return;
        }
        self.violations.push(ValidationViolation {
            modality: self.modality,
            path,
            kind,
            detail,
        });
    }

    pub(crate) fn done(&self) -> bool {
        self.policy == InspectPolicy::FirstProblem && !self.violations.is_empty()
    }

    pub(crate) fn finish(self) -> Vec<ValidationViolation> {
        self.violations
    }
}

/// Checks the modality folder of `session` against `schema`, recursing into matched folders.
pub(crate) fn inspect_tree(
    session: &SessionPath,
    modality: Modality,
    schema: &LevelSchema,
    extensions: &[String],
    collector: &mut Collector,
) -> Result<(), BndError> {
    let dir = session.modality_dir(modality);
    if !dir.as_std_path().is_dir() {
        collector.push(
            dir,
            ViolationKind::Missing,
            format!("missing {} folder", modality.dir_name()),
        );
        return Ok(());
    }
    let bindings = Bindings::for_session(&session.name(), extensions);
    check_level(&dir, schema, &bindings, collector)
}

struct Matched<'e> {
    entry: &'e Entry,
    rule: usize,
    captures: BTreeMap<String, String>,
}

fn check_level(
    dir: &Utf8Path,
    schema: &LevelSchema,
    bindings: &Bindings,
    collector: &mut Collector,
) -> Result<(), BndError> {
    let entries = fs_util::read_dir_sorted(dir)?;
    let patterns: Vec<Regex> = schema
        .rules
        .iter()
        .map(|rule| bindings.compile(rule.pattern))
        .collect();
    let families: Vec<Regex> = schema
        .families
        .iter()
        .map(|family| bindings.compile(family.pattern))
        .collect();

    let mut matched = Vec::new();
    for entry in &entries {
        let kind = entry_kind(entry);
        let hit = schema
            .rules
            .iter()
            .zip(&patterns)
            .enumerate()
            .find_map(|(index, (rule, re))| {
                (rule.kind == kind)
                    .then(|| re.captures(&entry.name))
                    .flatten()
                    .map(|caps| (index, named_captures(re, &caps)))
            });
        match hit {
            Some((rule, captures)) => matched.push(Matched {
                entry,
                rule,
                captures,
            }),
            None => {
                let family = schema
                    .families
                    .iter()
                    .zip(&families)
                    .find(|(family, re)| family.kind == kind && re.is_match(&entry.name));
                match family {
                    Some((family, _)) => {
                        let expected = schema
                            .rule(family.resembles)
                            .map(|rule| bindings.display(rule.expected, schema.defaults))
                            .unwrap_or_default();
                        collector.push(
                            entry.path.clone(),
                            ViolationKind::Malformed,
                            format!(
                                "{} '{}' looks like a {} but does not match '{}'",
                                kind.noun(),
                                entry.name,
                                family.resembles,
                                expected
                            ),
                        );
                    }
                    None => collector.push(
                        entry.path.clone(),
                        ViolationKind::Unexpected,
                        format!("unexpected {} '{}'", kind.noun(), entry.name),
                    ),
                }
            }
        }
        if collector.done() {
            return Ok(());
        }
    }

    // sibling captures make the expected names of missing entries concrete
    let mut display = bindings.clone();
    for item in &matched {
        for (name, value) in &item.captures {
            display.set_if_absent(name, value);
        }
    }

    for (index, rule) in schema.rules.iter().enumerate() {
        let hits: Vec<&Matched> = matched.iter().filter(|item| item.rule == index).collect();
        let count = hits.len();
        let expected = display.display(rule.expected, schema.defaults);
        let wanted = match rule.cardinality {
            Cardinality::ExactlyOne => Some(1),
            Cardinality::Exactly(n) => Some(n),
            _ => None,
        };
        if count == 0
            && matches!(
                rule.cardinality,
                Cardinality::ExactlyOne | Cardinality::AtLeastOne | Cardinality::Exactly(_)
            )
        {
            collector.push(
                dir.join(&expected),
                ViolationKind::Missing,
                format!("missing {}: expected '{}'", rule.label, expected),
            );
        } else if let Some(wanted) = wanted.filter(|wanted| *wanted != count) {
            collector.push(
                dir.to_path_buf(),
                ViolationKind::CountMismatch,
                format!(
                    "expected {wanted} {}, found {count}: {}",
                    rule.label,
                    names(&hits)
                ),
            );
        } else if rule.cardinality == Cardinality::Optional && count > 1 {
            collector.push(
                dir.to_path_buf(),
                ViolationKind::CountMismatch,
                format!(
                    "expected at most one {}, found {count}: {}",
                    rule.label,
                    names(&hits)
                ),
            );
        }
        if collector.done() {
            return Ok(());
        }
    }

    for rule in schema.consistency {
        check_consistency(dir, schema, rule, &matched, collector);
        if collector.done() {
            return Ok(());
        }
    }

    for item in &matched {
        let rule = &schema.rules[item.rule];
        let Some(children) = rule.children else {
            continue;
        };
        let mut child_bindings = bindings.clone();
        if let Some(name) = rule.binds {
            child_bindings.set(name, &item.entry.name);
        }
        for (name, value) in &item.captures {
            child_bindings.set(name, value);
        }
        check_level(&item.entry.path, children, &child_bindings, collector)?;
        if collector.done() {
            return Ok(());
        }
    }
    Ok(())
}

fn check_consistency(
    dir: &Utf8Path,
    schema: &LevelSchema,
    rule: &Consistency,
    matched: &[Matched],
    collector: &mut Collector,
) {
    let count_of = |label: &str| {
        schema
            .rules
            .iter()
            .position(|rule| rule.label == label)
            .map(|index| matched.iter().filter(|item| item.rule == index).count())
            .unwrap_or(0)
    };
    match rule {
        Consistency::Paired(left, right) => {
            let (a, b) = (count_of(left), count_of(right));
            if a != b {
                collector.push(
                    dir.to_path_buf(),
                    ViolationKind::CountMismatch,
                    format!("found {a} {left} but {b} {right}"),
                );
            }
        }
        Consistency::ContiguousIndices { rule, capture } => {
            let Some(index) = schema.rules.iter().position(|r| r.label == *rule) else {
                return;
            };
            let mut indices: Vec<usize> = matched
                .iter()
                .filter(|item| item.rule == index)
                .filter_map(|item| item.captures.get(*capture))
                .filter_map(|value| value.parse().ok())
                .collect();
            indices.sort_unstable();
            if let Some(pair) = indices.windows(2).find(|pair| pair[0] == pair[1]) {
                collector.push(
                    dir.to_path_buf(),
                    ViolationKind::CountMismatch,
                    format!("more than one {rule} with {capture} index {}", pair[0]),
                );
            } else if indices.iter().enumerate().any(|(pos, value)| pos != *value) {
                collector.push(
                    dir.to_path_buf(),
                    ViolationKind::CountMismatch,
                    format!("{capture} indices {indices:?} are not contiguous from 0"),
                );
            }
        }
    }
}

fn entry_kind(entry: &Entry) -> EntryKind {
    if entry.is_dir {
        EntryKind::Folder
    } else {
        EntryKind::File
    }
}

fn named_captures(re: &Regex, caps: &regex::Captures<'_>) -> BTreeMap<String, String> {
    re.capture_names()
        .flatten()
        .filter_map(|name| {
            caps.name(name)
                .map(|value| (name.to_string(), value.as_str().to_string()))
        })
        .collect()
}

fn names(hits: &[&Matched]) -> String {
    hits.iter()
        .map(|item| item.entry.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
