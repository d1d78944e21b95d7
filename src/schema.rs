//! Static description of the expected subtree of every modality.
//!
//! Patterns are anchored regex templates. `{name}` placeholders are filled from the
//! bindings collected while walking down the tree (`session`, `recording`, `probe`, ...)
//! and are regex-escaped; `{extra_ext}` expands to the configured extra-file extensions.

use std::collections::BTreeMap;

use regex::Regex;

use crate::domain::Modality;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Folder,
}

impl EntryKind {
    pub fn noun(self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Folder => "folder",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    ExactlyOne,
    AtLeastOne,
    Exactly(usize),
    Optional,
    Any,
}

#[derive(Debug)]
pub struct EntryRule {
    pub label: &'static str,
    pub kind: EntryKind,
    pub pattern: &'static str,
    pub cardinality: Cardinality,
    /// Human-readable name used when the entry is missing.
    pub expected: &'static str,
    /// Binding set to the matched entry's own name for the level below.
    pub binds: Option<&'static str>,
    pub children: Option<&'static LevelSchema>,
}

/// Entries that look like they belong to a rule but fail its pattern are malformed,
/// not unexpected.
#[derive(Debug)]
pub struct Family {
    pub kind: EntryKind,
    pub pattern: &'static str,
    pub resembles: &'static str,
}

#[derive(Debug)]
pub enum Consistency {
    /// Two rules must match the same number of entries.
    Paired(&'static str, &'static str),
    /// The named capture of a rule must enumerate 0..n without gaps or duplicates.
    ContiguousIndices {
        rule: &'static str,
        capture: &'static str,
    },
}

#[derive(Debug)]
pub struct LevelSchema {
    pub rules: &'static [EntryRule],
    pub families: &'static [Family],
    pub consistency: &'static [Consistency],
    /// Fallback values for placeholders in `expected` names.
    pub defaults: &'static [(&'static str, &'static str)],
}

impl LevelSchema {
    pub fn rule(&self, label: &str) -> Option<&EntryRule> {
        self.rules.iter().find(|rule| rule.label == label)
    }
}

const fn file(
    label: &'static str,
    pattern: &'static str,
    cardinality: Cardinality,
    expected: &'static str,
) -> EntryRule {
    EntryRule {
        label,
        kind: EntryKind::File,
        pattern,
        cardinality,
        expected,
        binds: None,
        children: None,
    }
}

const fn folder(
    label: &'static str,
    pattern: &'static str,
    cardinality: Cardinality,
    expected: &'static str,
    binds: Option<&'static str>,
    children: &'static LevelSchema,
) -> EntryRule {
    EntryRule {
        label,
        kind: EntryKind::Folder,
        pattern,
        cardinality,
        expected,
        binds,
        children: Some(children),
    }
}

const EXTRA_FILE: EntryRule = file(
    "extra file",
    r"^{session}_.+{extra_ext}$",
    Cardinality::Any,
    "{session}_<name>",
);

pub static TASK_FILES: LevelSchema = LevelSchema {
    rules: &[
        file("task script", r"^[^.].*\.py$", Cardinality::ExactlyOne, "<task>.py"),
        file("task resource", r"^.+$", Cardinality::Any, "<file>"),
    ],
    families: &[],
    consistency: &[],
    defaults: &[],
};

pub static BEHAVIOR: LevelSchema = LevelSchema {
    rules: &[
        file(
            "pycontrol event log",
            r"^{session}_.+\.txt$",
            Cardinality::ExactlyOne,
            "{session}_<task>.txt",
        ),
        file(
            "motion sensor data",
            r"^{session}_.+_MotSen\d-(X|Y)\.pca$",
            Cardinality::Exactly(2),
            "{session}_<task>_MotSen1-X.pca",
        ),
        folder(
            "task files",
            r"^run_task-task_files$",
            Cardinality::Optional,
            "run_task-task_files",
            None,
            &TASK_FILES,
        ),
    ],
    families: &[
        Family {
            kind: EntryKind::File,
            pattern: r"\.txt$",
            resembles: "pycontrol event log",
        },
        Family {
            kind: EntryKind::File,
            pattern: r"\.pca$",
            resembles: "motion sensor data",
        },
    ],
    consistency: &[],
    defaults: &[],
};

pub static PROBE: LevelSchema = LevelSchema {
    rules: &[
        file(
            "AP binary",
            r"^{recording}_t(?P<trigger>\d+)\.imec{probe}\.ap\.bin$",
            Cardinality::ExactlyOne,
            "{recording}_t{trigger}.imec{probe}.ap.bin",
        ),
        file(
            "AP metadata",
            r"^{recording}_t\d+\.imec{probe}\.ap\.meta$",
            Cardinality::ExactlyOne,
            "{recording}_t{trigger}.imec{probe}.ap.meta",
        ),
        file(
            "LFP binary",
            r"^{recording}_t\d+\.imec{probe}\.lf\.bin$",
            Cardinality::Optional,
            "{recording}_t{trigger}.imec{probe}.lf.bin",
        ),
        file(
            "LFP metadata",
            r"^{recording}_t\d+\.imec{probe}\.lf\.meta$",
            Cardinality::Optional,
            "{recording}_t{trigger}.imec{probe}.lf.meta",
        ),
        EXTRA_FILE,
    ],
    families: &[
        Family {
            kind: EntryKind::File,
            pattern: r"\.bin$",
            resembles: "AP binary",
        },
        Family {
            kind: EntryKind::File,
            pattern: r"\.meta$",
            resembles: "AP metadata",
        },
    ],
    consistency: &[Consistency::Paired("LFP binary", "LFP metadata")],
    defaults: &[("trigger", "0")],
};

pub static RECORDING: LevelSchema = LevelSchema {
    rules: &[
        folder(
            "probe folder",
            r"^{recording}_imec(?P<probe>\d+)$",
            Cardinality::AtLeastOne,
            "{recording}_imec0",
            None,
            &PROBE,
        ),
        file(
            "NIDQ binary",
            r"^{recording}_t\d+\.nidq\.bin$",
            Cardinality::Optional,
            "{recording}_t0.nidq.bin",
        ),
        file(
            "NIDQ metadata",
            r"^{recording}_t\d+\.nidq\.meta$",
            Cardinality::Optional,
            "{recording}_t0.nidq.meta",
        ),
        EXTRA_FILE,
    ],
    families: &[
        Family {
            kind: EntryKind::Folder,
            pattern: r"_imec\d+$",
            resembles: "probe folder",
        },
        Family {
            kind: EntryKind::File,
            pattern: r"\.(bin|meta)$",
            resembles: "NIDQ binary",
        },
    ],
    consistency: &[Consistency::Paired("NIDQ binary", "NIDQ metadata")],
    defaults: &[],
};

pub static EPHYS: LevelSchema = LevelSchema {
    rules: &[
        folder(
            "recording folder",
            r"^{session}_g(?P<gate>\d+)$",
            Cardinality::AtLeastOne,
            "{session}_g0",
            Some("recording"),
            &RECORDING,
        ),
        EXTRA_FILE,
    ],
    families: &[Family {
        kind: EntryKind::Folder,
        pattern: r"_g\d+$",
        resembles: "recording folder",
    }],
    consistency: &[],
    defaults: &[],
};

pub static CAMERAS: LevelSchema = LevelSchema {
    rules: &[
        file(
            "camera video",
            r"^{session}_camera_(?P<camera>\d+)\.avi$",
            Cardinality::AtLeastOne,
            "{session}_camera_0.avi",
        ),
        file(
            "camera metadata",
            r"^metadata\.csv$",
            Cardinality::Optional,
            "metadata.csv",
        ),
    ],
    families: &[Family {
        kind: EntryKind::File,
        pattern: r"\.avi$",
        resembles: "camera video",
    }],
    consistency: &[Consistency::ContiguousIndices {
        rule: "camera video",
        capture: "camera",
    }],
    defaults: &[],
};

pub static VIDEO: LevelSchema = LevelSchema {
    rules: &[folder(
        "camera folder",
        r"^{session}_cameras$",
        Cardinality::ExactlyOne,
        "{session}_cameras",
        None,
        &CAMERAS,
    )],
    families: &[Family {
        kind: EntryKind::Folder,
        pattern: r"_cameras$",
        resembles: "camera folder",
    }],
    consistency: &[],
    defaults: &[],
};

pub fn modality_schema(modality: Modality) -> &'static LevelSchema {
    match modality {
        Modality::Behavior => &BEHAVIOR,
        Modality::Ephys => &EPHYS,
        Modality::Video => &VIDEO,
    }
}

/// Placeholder values in scope while checking one folder.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: BTreeMap<String, String>,
    extensions: Vec<String>,
}

impl Bindings {
    pub fn for_session(session_name: &str, extensions: &[String]) -> Self {
        let mut values = BTreeMap::new();
        values.insert("session".to_string(), session_name.to_string());
        Self {
            values,
            extensions: extensions.to_vec(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: &str, value: &str) {
        self.values.insert(name.to_string(), value.to_string());
    }

    pub fn set_if_absent(&mut self, name: &str, value: &str) {
        self.values
            .entry(name.to_string())
            .or_insert_with(|| value.to_string());
    }

    pub fn compile(&self, pattern: &str) -> Regex {
        let rendered = render(pattern, |name| {
            if name == "extra_ext" {
                return Some(self.extension_alternation());
            }
            self.get(name).map(regex::escape)
        });
        Regex::new(&rendered).expect("schema pattern")
    }

    pub fn display(&self, template: &str, defaults: &[(&str, &str)]) -> String {
        render(template, |name| {
            self.get(name)
                .or_else(|| {
                    defaults
                        .iter()
                        .find(|(key, _)| *key == name)
                        .map(|(_, value)| *value)
                })
                .map(str::to_string)
        })
    }

    fn extension_alternation(&self) -> String {
        if self.extensions.is_empty() {
            // matches nothing
            return r"(?:\z.)".to_string();
        }
        let alternatives: Vec<String> = self
            .extensions
            .iter()
            .map(String::as_str)
            .map(regex::escape)
            .collect();
        format!("(?:{})", alternatives.join("|"))
    }
}

/// Replaces `{name}` placeholders. Unknown names are left in place, regex quantifiers
/// such as `{2}` are never bound so they survive too.
fn render(template: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match lookup(name) {
                    Some(value) => out.push_str(&value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
