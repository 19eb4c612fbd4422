use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_simdex")
}

fn unique_temp_path(name: &str) -> PathBuf {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock should be after unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("simdex-{name}-{stamp}"))
}

/// Command with an isolated home so settings never touch the real one.
fn simdex(home: &Path) -> Command {
    let mut command = Command::new(bin());
    command
        .env("HOME", home)
        .env_remove("SIMDEX_CONFIG_PATH")
        .env_remove("SIMDEX_REGISTRY")
        .env_remove("SIMDEX_CACHEDIR");
    command
}

const REGISTRY: &str = r#"
defs:
  tng_params: &tng_params
    unitfile: units/illustris.yaml
data:
  TNG50:
    <<: *tng_params
    aliases: [IllustrisTNG50, TNG50-1]
    identifiers:
      Parameters:
        InitCondFile: { content: L35n2160TNG, match: substring }
"#;

#[test]
fn unknown_command_prints_usage() {
    let home = unique_temp_path("home-usage");
    let output = simdex(&home).arg("frobnicate").output().expect("simdex should run");

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("usage: simdex"));
}

#[test]
fn resolve_alias_emits_canonical_entry_json() {
    let home = unique_temp_path("home-resolve");
    let path = unique_temp_path("resolve.yaml");
    fs::write(&path, REGISTRY).expect("fixture should be written");

    let output = simdex(&home)
        .args(["resolve", "TNG50-1", "--registry", path.to_string_lossy().as_ref()])
        .output()
        .expect("resolve should run");

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let payload: serde_json::Value =
        serde_json::from_str(&stdout).expect("resolve should emit json");
    assert_eq!(payload["name"], "TNG50");
    assert_eq!(payload["unit_file"], "units/illustris.yaml");
    assert_eq!(payload["identifiers"][0]["kind"], "field_matches");

    let _ = fs::remove_file(path);
}

#[test]
fn resolve_unknown_name_exits_with_not_found() {
    let home = unique_temp_path("home-missing");
    let path = unique_temp_path("missing.yaml");
    fs::write(&path, REGISTRY).expect("fixture should be written");

    let output = simdex(&home)
        .args(["resolve", "nonexistent-name", "--registry", path.to_string_lossy().as_ref()])
        .output()
        .expect("resolve should run");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("not found"));

    let _ = fs::remove_file(path);
}

#[test]
fn list_uses_bundled_registry_and_creates_settings() {
    let home = unique_temp_path("home-list");
    let output = simdex(&home).arg("list").output().expect("list should run");

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("name\taliases\ttype\tunitfile"));
    assert!(stdout.contains("TNG50\tIllustrisTNG50,TNG50-1"));
    assert!(home.join(".config/simdex/config.yaml").is_file());

    let _ = fs::remove_dir_all(home);
}

#[test]
fn list_csv_has_header_and_rows() {
    let home = unique_temp_path("home-csv");
    let output = simdex(&home)
        .args(["list", "--csv"])
        .output()
        .expect("list should run");

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut lines = stdout.lines();
    assert_eq!(lines.next(), Some("name,aliases,type,unitfile,suite,code"));
    assert!(stdout.contains("gaia-dr3,GaiaDR3,dataset,units/gaia.yaml,Gaia,"));

    let _ = fs::remove_dir_all(home);
}

#[test]
fn validate_reports_undefined_template() {
    let home = unique_temp_path("home-validate");
    let path = unique_temp_path("broken.yaml");
    fs::write(
        &path,
        "data:\n  X:\n    <<: nowhere\n    identifiers: { name_contains: x }\n",
    )
    .expect("fixture should be written");

    let output = simdex(&home)
        .args(["validate", path.to_string_lossy().as_ref()])
        .output()
        .expect("validate should run");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("validation failed"));
    assert!(stderr.contains("nowhere"));

    let _ = fs::remove_file(path);
}

#[test]
fn validate_passes_when_unit_files_resolve() {
    let home = unique_temp_path("home-valid");
    let path = unique_temp_path("valid.yaml");
    fs::write(&path, REGISTRY).expect("fixture should be written");

    let output = simdex(&home)
        .args(["validate", path.to_string_lossy().as_ref()])
        .output()
        .expect("validate should run");

    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("validation passed"));

    let _ = fs::remove_file(path);
}

#[test]
fn dump_output_reloads() {
    let home = unique_temp_path("home-dump");
    let path = unique_temp_path("dump.yaml");
    fs::write(&path, REGISTRY).expect("fixture should be written");

    let output = simdex(&home)
        .args(["dump", "--registry", path.to_string_lossy().as_ref()])
        .output()
        .expect("dump should run");

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let reloaded = simdex::Registry::from_yaml_str(&stdout).expect("dump should reload");
    assert_eq!(
        reloaded.resolve("IllustrisTNG50").and_then(|e| e.unit_file.as_deref()),
        Some("units/illustris.yaml")
    );

    let _ = fs::remove_file(path);
}

#[test]
fn layout_requires_a_path() {
    let home = unique_temp_path("home-layout");
    let output = simdex(&home).arg("layout").output().expect("layout should run");

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("usage: simdex layout"));
}

#[test]
fn option_without_value_is_a_usage_error() {
    let home = unique_temp_path("home-dangling");
    for args in [
        vec!["resolve", "TNG50", "--registry"],
        vec!["list", "--registry", "--csv"],
        vec!["layout", ".", "--prefix"],
    ] {
        let output = simdex(&home).args(&args).output().expect("simdex should run");
        assert_eq!(output.status.code(), Some(2), "{args:?}");
        assert!(String::from_utf8_lossy(&output.stderr).contains("requires a value"));
    }
    assert!(!home.exists());
}

#[test]
fn init_config_writes_once_unless_overwritten() {
    let home = unique_temp_path("home-init");
    let config = home.join(".config/simdex/config.yaml");

    let output = simdex(&home)
        .arg("init-config")
        .env("SIMDEX_CACHEDIR", "/tmp/simdex-cache")
        .output()
        .expect("init-config should run");
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("wrote default configuration"));
    assert!(stdout.contains("registry: simulations.yaml"));
    assert!(stdout.contains("cachedir: /tmp/simdex-cache"));
    assert!(config.is_file());

    fs::write(&config, "registry: simulations.yaml\n").expect("config should be edited");
    let output = simdex(&home)
        .arg("init-config")
        .output()
        .expect("init-config should run");
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("already exists"));
    assert_eq!(
        fs::read_to_string(&config).unwrap(),
        "registry: simulations.yaml\n"
    );

    let output = simdex(&home)
        .args(["init-config", "--overwrite"])
        .output()
        .expect("init-config should run");
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("cachedir: (unset)"));
    assert!(fs::read_to_string(&config).unwrap().contains("copied_default: true"));

    let _ = fs::remove_dir_all(home);
}

#[test]
fn layout_reports_chunked_directory_as_json() {
    let home = unique_temp_path("home-layout-json");
    let dir = unique_temp_path("chunks");
    fs::create_dir_all(&dir).expect("chunk dir should be created");
    for n in [1, 0, 2] {
        fs::write(dir.join(format!("snap_033.{n}.hdf5")), b"").expect("chunk should be written");
    }

    let output = simdex(&home)
        .args(["layout", dir.to_string_lossy().as_ref()])
        .output()
        .expect("layout should run");

    assert_eq!(output.status.code(), Some(0));
    let payload: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("layout should emit json");
    assert_eq!(payload["format"], "multi_file_hdf5");
    assert_eq!(payload["prefix"], "snap_033");
    let files = payload["files"].as_array().expect("files should be a list");
    assert_eq!(files.len(), 3);
    assert!(files[2].as_str().unwrap().ends_with("snap_033.2.hdf5"));

    let _ = fs::remove_dir_all(dir);
}
