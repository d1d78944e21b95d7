use crate::domain::Modality;
use crate::error::BndError;
use crate::paths::SessionPath;
use crate::schema;

use super::{Collector, InspectPolicy, ModalityInspector, ValidationViolation, inspect_tree};

/// PyControl event log, motion sensor files and the optional task-file folder.
#[derive(Debug, Clone, Default)]
pub struct BehaviorInspector;

impl ModalityInspector for BehaviorInspector {
    fn modality(&self) -> Modality {
        Modality::Behavior
    }

    fn inspect(
        &self,
        session: &SessionPath,
        policy: InspectPolicy,
    ) -> Result<Vec<ValidationViolation>, BndError> {
        let mut collector = Collector::new(Modality::Behavior, policy);
        inspect_tree(
            session,
            Modality::Behavior,
            &schema::BEHAVIOR,
            &[],
            &mut collector,
        )?;
        if !collector.done() {
            let task_files = session.modality_dir(Modality::Behavior).join("run_task-task_files");
            if !task_files.as_std_path().exists() {
                tracing::warn!(session = %session.name(), "no run_task-task_files folder in behavior");
            }
        }
        Ok(collector.finish())
    }
}
