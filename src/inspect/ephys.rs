use std::collections::BTreeMap;

use regex::Regex;

use crate::domain::Modality;
use crate::error::BndError;
use crate::fs_util;
use crate::paths::SessionPath;
use crate::schema;

use super::{
    Collector, InspectPolicy, ModalityInspector, ValidationViolation, ViolationKind, inspect_tree,
};

/// SpikeGLX recordings: gate folders, probe folders and their binary/metadata pairs.
#[derive(Debug, Clone, Default)]
pub struct EphysInspector {
    extensions: Vec<String>,
}

impl EphysInspector {
    /// `extensions` are the extra-file extensions allowed once prefixed with the session name.
    pub fn new(extensions: Vec<String>) -> Self {
        Self { extensions }
    }

    /// Every recording of a session must see the same probes.
    fn check_probe_sets(
        &self,
        session: &SessionPath,
        collector: &mut Collector,
    ) -> Result<(), BndError> {
        let ephys_dir = session.modality_dir(Modality::Ephys);
        let recording = Regex::new(&format!(r"^{}_g\d+$", regex::escape(&session.name())))
            .expect("recording folder regex");
        let mut probes_per_recording = BTreeMap::new();
        for entry in fs_util::read_dir_sorted(&ephys_dir)? {
            if !entry.is_dir || !recording.is_match(&entry.name) {
                continue;
            }
            let prefix = format!("{}_imec", entry.name);
            let probes: Vec<String> = fs_util::read_dir_sorted(&entry.path)?
                .into_iter()
                .filter(|probe| probe.is_dir)
                .filter_map(|probe| {
                    let index = probe.name.strip_prefix(&prefix)?;
                    index
                        .chars()
                        .all(|c| c.is_ascii_digit())
                        .then(|| index.to_string())
                })
                .collect();
            probes_per_recording.insert(entry.name, probes);
        }

        let mut iter = probes_per_recording.iter();
        let Some((first_name, first)) = iter.next() else {
            return Ok(());
        };
        for (name, probes) in iter {
            if probes != first {
                collector.push(
                    ephys_dir.join(name),
                    ViolationKind::CountMismatch,
                    format!(
                        "recording {name} has probes [{}] but {first_name} has [{}]",
                        probes.join(", "),
                        first.join(", ")
                    ),
                );
                if collector.done() {
                    break;
                }
            }
        }
        Ok(())
    }
}

impl ModalityInspector for EphysInspector {
    fn modality(&self) -> Modality {
        Modality::Ephys
    }

    fn inspect(
        &self,
        session: &SessionPath,
        policy: InspectPolicy,
    ) -> Result<Vec<ValidationViolation>, BndError> {
        let mut collector = Collector::new(Modality::Ephys, policy);
        inspect_tree(
            session,
            Modality::Ephys,
            &schema::EPHYS,
            &self.extensions,
            &mut collector,
        )?;
        if !collector.done() && session.modality_dir(Modality::Ephys).as_std_path().is_dir() {
            self.check_probe_sets(session, &mut collector)?;
        }
        Ok(collector.finish())
    }
}
