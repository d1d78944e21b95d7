use regex::Regex;

use crate::domain::Modality;
use crate::error::BndError;
use crate::fs_util;
use crate::paths::SessionPath;
use crate::schema;

use super::{
    Collector, InspectPolicy, ModalityInspector, ValidationViolation, ViolationKind, inspect_tree,
};

/// The single camera folder and its per-camera `.avi` files.
#[derive(Debug, Clone, Default)]
pub struct VideoInspector {
    expected_cameras: Option<usize>,
}

impl VideoInspector {
    pub fn new(expected_cameras: Option<usize>) -> Self {
        Self { expected_cameras }
    }
}

impl ModalityInspector for VideoInspector {
    fn modality(&self) -> Modality {
        Modality::Video
    }

    fn inspect(
        &self,
        session: &SessionPath,
        policy: InspectPolicy,
    ) -> Result<Vec<ValidationViolation>, BndError> {
        let mut collector = Collector::new(Modality::Video, policy);
        inspect_tree(session, Modality::Video, &schema::VIDEO, &[], &mut collector)?;

        if let Some(expected) = self.expected_cameras
            && !collector.done()
        {
            let name = session.name();
            let cameras_dir = session
                .modality_dir(Modality::Video)
                .join(format!("{name}_cameras"));
            if cameras_dir.as_std_path().is_dir() {
                let video = Regex::new(&format!(
                    r"^{}_camera_\d+\.avi$",
                    regex::escape(&name)
                ))
                .expect("camera file regex");
                let found = fs_util::read_dir_sorted(&cameras_dir)?
                    .iter()
                    .filter(|entry| !entry.is_dir && video.is_match(&entry.name))
                    .count();
                if found != expected {
                    collector.push(
                        cameras_dir,
                        ViolationKind::CountMismatch,
                        format!("expected {expected} camera videos, found {found}"),
                    );
                }
            }
        }
        Ok(collector.finish())
    }
}
