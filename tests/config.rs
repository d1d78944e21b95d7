use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use beneuro_data::config::{Config, ConfigLoader};
use beneuro_data::error::BndError;

fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

#[test]
fn resolve_reads_a_config_file() {
    let (_temp, root) = temp_root();
    let path = root.join("config.json");
    fs::write(
        &path,
        r#"{
            "local_path": "/data/local",
            "remote_path": "/mnt/rds/remote",
            "extensions_to_rename_and_upload": [".txt", ".csv"],
            "expected_cameras": 2
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(Some(path.as_str())).unwrap();
    assert_eq!(resolved.local_path, "/data/local");
    assert_eq!(resolved.remote_path, "/mnt/rds/remote");
    assert_eq!(resolved.extensions_to_rename_and_upload, vec![".txt", ".csv"]);
    assert_eq!(resolved.expected_cameras, Some(2));
    assert_eq!(resolved.ignored_subject_level_dirs, vec!["treadmill-calibration"]);
}

#[test]
fn missing_and_broken_files_are_reported() {
    let (_temp, root) = temp_root();
    let missing = root.join("nope.json");
    assert_matches!(
        ConfigLoader::resolve(Some(missing.as_str())),
        Err(BndError::MissingConfig(_))
    );

    let broken = root.join("broken.json");
    fs::write(&broken, "{ local_path: ").unwrap();
    assert_matches!(
        ConfigLoader::resolve(Some(broken.as_str())),
        Err(BndError::ConfigParse(_))
    );
}

#[test]
fn invalid_values_are_rejected() {
    let base = || Config {
        schema_version: None,
        local_path: "/data/local".to_string(),
        remote_path: "/mnt/remote".to_string(),
        ignored_subject_level_dirs: None,
        whitelisted_files_in_root: None,
        extensions_to_rename_and_upload: None,
        expected_cameras: None,
    };

    let config = Config {
        extensions_to_rename_and_upload: Some(vec!["txt".to_string()]),
        ..base()
    };
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(BndError::InvalidConfig(_))
    );

    let config = Config {
        schema_version: Some(7),
        ..base()
    };
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(BndError::InvalidConfig(ref msg)) if msg.contains("schema_version")
    );

    let config = Config {
        expected_cameras: Some(0),
        ..base()
    };
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(BndError::InvalidConfig(_))
    );
}

#[test]
fn init_writes_once() {
    let (_temp, root) = temp_root();
    let path = root.join("bnd/config.json");

    let (written, resolved) =
        ConfigLoader::init(Some(path.as_str()), "/data/local", "/mnt/remote").unwrap();
    assert_eq!(written, path.as_std_path());
    assert_eq!(resolved.local_path, "/data/local");

    let reread = ConfigLoader::resolve(Some(path.as_str())).unwrap();
    assert_eq!(reread.remote_path, "/mnt/remote");
    assert_eq!(reread.whitelisted_files_in_root.len(), 4);

    assert_matches!(
        ConfigLoader::init(Some(path.as_str()), "/other", "/mnt/other"),
        Err(BndError::InvalidConfig(_))
    );
}
