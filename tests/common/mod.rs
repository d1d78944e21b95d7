#![allow(dead_code)]

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

use beneuro_data::app::App;
use beneuro_data::config::ResolvedConfig;
use beneuro_data::domain::StorageKind;
use beneuro_data::inspect::InspectPolicy;

pub const SESSION: &str = "M020_2024-05-01_s1";
pub const SUBJECT: &str = "M020";

/// A local and a remote root in a temp dir, with `raw/` present on both sides.
pub struct Fixture {
    _temp: TempDir,
    pub root: Utf8PathBuf,
    pub config: ResolvedConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        for dir in ["local/raw", "local/processed", "remote/raw"] {
            fs::create_dir_all(root.join(dir)).unwrap();
        }
        let config = ResolvedConfig::with_roots(root.join("local"), root.join("remote"));
        Self {
            _temp: temp,
            root,
            config,
        }
    }

    pub fn app(&self) -> App {
        App::new(self.config.clone(), InspectPolicy::FirstProblem)
    }

    pub fn app_with(&self, policy: InspectPolicy) -> App {
        App::new(self.config.clone(), policy)
    }

    pub fn base(&self, kind: StorageKind) -> Utf8PathBuf {
        match kind {
            StorageKind::Local => self.root.join("local"),
            StorageKind::Remote => self.root.join("remote"),
        }
    }

    pub fn session_dir(&self, kind: StorageKind, name: &str) -> Utf8PathBuf {
        let subject = name.split('_').next().unwrap();
        self.base(kind).join("raw").join(subject).join(name)
    }

    /// Writes a session that passes validation for every modality.
    pub fn valid_session(&self, kind: StorageKind, name: &str) -> Utf8PathBuf {
        let dir = self.session_dir(kind, name);
        write(&dir.join(format!("behavior/{name}_task.txt")), "events");
        write(&dir.join(format!("behavior/{name}_task_MotSen1-X.pca")), "x");
        write(&dir.join(format!("behavior/{name}_task_MotSen1-Y.pca")), "y");
        let probe = dir.join(format!("ephys/{name}_g0/{name}_g0_imec0"));
        write(&probe.join(format!("{name}_g0_t0.imec0.ap.bin")), "ap-binary");
        write(&probe.join(format!("{name}_g0_t0.imec0.ap.meta")), "ap-meta");
        write(
            &dir.join(format!("video/{name}_cameras/{name}_camera_0.avi")),
            "frames",
        );
        dir
    }
}

pub fn write(path: &Utf8Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

pub fn read(path: &Utf8Path) -> String {
    fs::read_to_string(path).unwrap()
}
