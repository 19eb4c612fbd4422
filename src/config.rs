//! User settings and configuration resources.
//!
//! Settings live in `~/.config/simdex/config.yaml` (created from the bundled
//! default on first use) and are overlaid by `SIMDEX_*` environment
//! variables. Resources such as registry and unit files are looked up as an
//! absolute path, then relative to the user config directory, then among the
//! files compiled into the crate.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::{debug, warn};

pub const ENV_PREFIX: &str = "SIMDEX_";
pub const CONFIG_FILE_NAME: &str = "config.yaml";
pub const DEFAULT_REGISTRY_RESOURCE: &str = "simulations.yaml";
const CONFIG_PATH_KEY: &str = "config_path";
const COPIED_DEFAULT_KEY: &str = "copied_default";

/// Resources compiled into the crate, addressed by relative name.
const BUNDLED_RESOURCES: &[(&str, &str)] = &[
    ("config.yaml", include_str!("../resources/config.yaml")),
    ("simulations.yaml", include_str!("../resources/simulations.yaml")),
    ("units/illustris.yaml", include_str!("../resources/units/illustris.yaml")),
    ("units/eagle.yaml", include_str!("../resources/units/eagle.yaml")),
    (
        "units/gadget_cosmological.yaml",
        include_str!("../resources/units/gadget_cosmological.yaml"),
    ),
    ("units/gaia.yaml", include_str!("../resources/units/gaia.yaml")),
];

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("config resource name cannot be empty")]
    EmptyResourceName,

    #[error("config resource '{0}' not found")]
    ResourceNotFound(String),

    #[error("failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse '{resource}': {source}")]
    Parse {
        resource: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("config resource '{0}' must be a YAML mapping")]
    NotAMapping(String),

    #[error("conflicting values at '{0}'")]
    MergeConflict(String),

    #[error("configuration file already exists at '{0}'")]
    AlreadyExists(PathBuf),

    #[error("cannot determine the home directory")]
    NoHomeDir,
}

/// Where a resource's text came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceOrigin {
    File(PathBuf),
    Bundled,
}

/// Text of a bundled resource, if the crate ships one under `name`.
pub fn bundled_resource(name: &str) -> Option<&'static str> {
    BUNDLED_RESOURCES
        .iter()
        .find(|(resource, _)| *resource == name)
        .map(|(_, text)| *text)
}

pub fn bundled_resource_names() -> impl Iterator<Item = &'static str> {
    BUNDLED_RESOURCES.iter().map(|(name, _)| *name)
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
}

/// `~/.config/simdex`, if a home directory is known.
pub fn user_config_dir() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".config").join("simdex"))
}

fn expand_home(resource: &str) -> PathBuf {
    if resource == "~" {
        if let Some(home) = home_dir() {
            return home;
        }
    }
    if let Some(rest) = resource.strip_prefix("~/") {
        if let Some(home) = home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(resource)
}

/// Copy the bundled default settings into the user config directory.
pub fn copy_default_config(overwrite: bool) -> Result<PathBuf, SettingsError> {
    let dir = user_config_dir().ok_or(SettingsError::NoHomeDir)?;
    copy_default_config_to(&dir, overwrite)
}

/// Copy the bundled default settings into `dir`, creating it if needed.
pub fn copy_default_config_to(dir: &Path, overwrite: bool) -> Result<PathBuf, SettingsError> {
    fs::create_dir_all(dir).map_err(|source| SettingsError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let path = dir.join(CONFIG_FILE_NAME);
    if path.exists() && !overwrite {
        return Err(SettingsError::AlreadyExists(path));
    }
    let text = bundled_resource(CONFIG_FILE_NAME)
        .ok_or_else(|| SettingsError::ResourceNotFound(CONFIG_FILE_NAME.to_string()))?;
    fs::write(&path, text).map_err(|source| SettingsError::Io {
        path: path.clone(),
        source,
    })?;
    debug!(path = %path.display(), "wrote default configuration");
    Ok(path)
}

/// Read a resource's text: absolute path, then `config_dir/<resource>`,
/// then the bundled copy.
pub fn read_config_resource(
    resource: &str,
    config_dir: Option<&Path>,
) -> Result<(String, ResourceOrigin), SettingsError> {
    if resource.trim().is_empty() {
        return Err(SettingsError::EmptyResourceName);
    }

    let path = expand_home(resource);
    if path.is_absolute() {
        let text = fs::read_to_string(&path).map_err(|source| SettingsError::Io {
            path: path.clone(),
            source,
        })?;
        return Ok((text, ResourceOrigin::File(path)));
    }

    if let Some(dir) = config_dir {
        let candidate = dir.join(&path);
        if candidate.is_file() {
            let text = fs::read_to_string(&candidate).map_err(|source| SettingsError::Io {
                path: candidate.clone(),
                source,
            })?;
            return Ok((text, ResourceOrigin::File(candidate)));
        }
    }

    bundled_resource(resource)
        .map(|text| (text.to_string(), ResourceOrigin::Bundled))
        .ok_or_else(|| SettingsError::ResourceNotFound(resource.to_string()))
}

/// True if `resource` resolves under the same rules as [`read_config_resource`].
pub fn resource_exists(resource: &str, config_dir: Option<&Path>) -> bool {
    if resource.trim().is_empty() {
        return false;
    }
    let path = expand_home(resource);
    if path.is_absolute() {
        return path.is_file();
    }
    config_dir.map_or(false, |dir| dir.join(&path).is_file()) || bundled_resource(resource).is_some()
}

/// Load a YAML resource as a mapping (an empty document is an empty mapping).
pub fn load_config_resource(
    resource: &str,
    config_dir: Option<&Path>,
) -> Result<Mapping, SettingsError> {
    let (text, _) = read_config_resource(resource, config_dir)?;
    let value: Value = serde_yaml::from_str(&text).map_err(|source| SettingsError::Parse {
        resource: resource.to_string(),
        source,
    })?;
    match value {
        Value::Mapping(mapping) => Ok(mapping),
        Value::Null => Ok(Mapping::new()),
        _ => Err(SettingsError::NotAMapping(resource.to_string())),
    }
}

/// Load several resources and merge them with [`merge_recursively`].
pub fn load_config_resources(
    resources: &[&str],
    config_dir: Option<&Path>,
) -> Result<Mapping, SettingsError> {
    let mut merged = Mapping::new();
    for resource in resources {
        let next = load_config_resource(resource, config_dir)?;
        merge_recursively(&mut merged, &next)?;
    }
    Ok(merged)
}

/// Merge `other` into `base`. Nested mappings merge key by key; equal leaves
/// are accepted; differing leaves are a conflict at their dotted path.
pub fn merge_recursively(base: &mut Mapping, other: &Mapping) -> Result<(), SettingsError> {
    merge_at(base, other, &mut Vec::new())
}

fn merge_at(base: &mut Mapping, other: &Mapping, path: &mut Vec<String>) -> Result<(), SettingsError> {
    for (key, incoming) in other {
        path.push(key_label(key));
        match base.get_mut(key) {
            None => {
                base.insert(key.clone(), incoming.clone());
            }
            Some(Value::Mapping(existing)) if incoming.is_mapping() => {
                if let Value::Mapping(incoming) = incoming {
                    merge_at(existing, incoming, path)?;
                }
            }
            Some(existing) if *existing == *incoming => {}
            Some(_) => return Err(SettingsError::MergeConflict(path.join("."))),
        }
        path.pop();
    }
    Ok(())
}

fn key_label(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| format!("{other:?}")),
    }
}

/// Effective settings: the config file overlaid with environment variables.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    values: Mapping,
    config_dir: Option<PathBuf>,
    source_path: Option<PathBuf>,
}

impl Settings {
    /// Load from the user config directory and the process environment.
    pub fn load() -> Result<Self, SettingsError> {
        let dir = user_config_dir().ok_or(SettingsError::NoHomeDir)?;
        Self::from_env_and_file(&dir, env::vars())
    }

    /// Load from `config_dir` with an explicit environment.
    ///
    /// `SIMDEX_CONFIG_PATH` replaces the config file path; every other
    /// `SIMDEX_<KEY>` becomes the lower-cased string setting `<key>`.
    pub fn from_env_and_file<I>(config_dir: &Path, vars: I) -> Result<Self, SettingsError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut overrides: Vec<(String, String)> = vars
            .into_iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(ENV_PREFIX)
                    .filter(|rest| !rest.is_empty())
                    .map(|rest| (rest.to_lowercase(), value))
            })
            .collect();

        let default_path = config_dir.join(CONFIG_FILE_NAME);
        if !default_path.exists() {
            copy_default_config_to(config_dir, false)?;
        }

        let path = match overrides.iter().position(|(key, _)| key == CONFIG_PATH_KEY) {
            Some(index) => expand_home(&overrides.remove(index).1),
            None => default_path,
        };
        let resource = path.display().to_string();
        let mut values = load_config_resource(&resource, Some(config_dir))?;

        if values
            .get(COPIED_DEFAULT_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            warn!(path = %path.display(), "using default configuration; adjust or replace it");
        }

        for (key, value) in overrides {
            // `log` is consumed by the subscriber, not a setting.
            if key == "log" {
                continue;
            }
            values.insert(Value::String(key), Value::String(value));
        }

        Ok(Settings {
            values,
            config_dir: Some(config_dir.to_path_buf()),
            source_path: Some(path),
        })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn config_dir(&self) -> Option<&Path> {
        self.config_dir.as_deref()
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    pub fn is_default_copy(&self) -> bool {
        self.get(COPIED_DEFAULT_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// `cachedir`, with `~` expanded.
    pub fn cache_dir(&self) -> Option<PathBuf> {
        self.get("cachedir")
            .and_then(Value::as_str)
            .filter(|dir| !dir.trim().is_empty())
            .map(expand_home)
    }

    /// Registry resource to load (`registry` key, bundled file by default).
    pub fn registry_resource(&self) -> String {
        self.get("registry")
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(DEFAULT_REGISTRY_RESOURCE)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_dir(name: &str) -> PathBuf {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        env::temp_dir().join(format!("simdex-config-{name}-{stamp}"))
    }

    fn mapping(yaml: &str) -> Mapping {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn merge_combines_nested_mappings_and_equal_leaves() {
        let mut base = mapping("a: 1\nnested: { x: 1 }");
        merge_recursively(&mut base, &mapping("a: 1\nb: 2\nnested: { y: 2 }")).unwrap();
        assert_eq!(base, mapping("a: 1\nnested: { x: 1, y: 2 }\nb: 2"));
    }

    #[test]
    fn merge_reports_conflict_path() {
        let mut base = mapping("outer: { inner: { leaf: 1 } }");
        let err = merge_recursively(&mut base, &mapping("outer: { inner: { leaf: 2 } }")).unwrap_err();
        assert!(matches!(err, SettingsError::MergeConflict(path) if path == "outer.inner.leaf"));
    }

    #[test]
    fn bundled_resources_resolve_without_files() {
        let units = load_config_resource("units/illustris.yaml", None).unwrap();
        assert!(!units.is_empty());
        assert!(resource_exists("simulations.yaml", None));
        assert!(!resource_exists("units/nowhere.yaml", None));
        assert!(matches!(
            load_config_resource("", None).unwrap_err(),
            SettingsError::EmptyResourceName
        ));
        assert!(matches!(
            load_config_resource("nope.yaml", None).unwrap_err(),
            SettingsError::ResourceNotFound(_)
        ));
    }

    #[test]
    fn several_resources_merge_or_conflict() {
        assert!(bundled_resource_names().all(|name| bundled_resource(name).is_some()));

        let merged = load_config_resources(&["units/illustris.yaml", "units/gaia.yaml"], None).unwrap();
        let units = merged.get("units").and_then(Value::as_mapping).unwrap();
        assert!(units.contains_key("length"));
        assert!(units.contains_key("parallax"));

        let err = load_config_resources(&["units/illustris.yaml", "units/eagle.yaml"], None).unwrap_err();
        assert!(matches!(err, SettingsError::MergeConflict(path) if path == "units.length"));
    }

    #[test]
    fn user_dir_file_shadows_bundled_resource() {
        let dir = unique_temp_dir("shadow");
        fs::create_dir_all(dir.join("units")).unwrap();
        fs::write(dir.join("units/illustris.yaml"), "custom: true\n").unwrap();

        let (text, origin) = read_config_resource("units/illustris.yaml", Some(&dir)).unwrap();
        assert_eq!(text, "custom: true\n");
        assert_eq!(origin, ResourceOrigin::File(dir.join("units/illustris.yaml")));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn first_load_copies_default_and_env_overrides_apply() {
        let dir = unique_temp_dir("settings");
        let settings = Settings::from_env_and_file(
            &dir,
            vec![
                ("SIMDEX_CACHEDIR".to_string(), "/tmp/simdex-cache".to_string()),
                ("OTHER_VAR".to_string(), "ignored".to_string()),
            ],
        )
        .unwrap();

        assert!(dir.join(CONFIG_FILE_NAME).is_file());
        assert!(settings.is_default_copy());
        assert_eq!(settings.cache_dir(), Some(PathBuf::from("/tmp/simdex-cache")));
        assert_eq!(settings.registry_resource(), DEFAULT_REGISTRY_RESOURCE);
        assert!(settings.get("var").is_none());

        let err = copy_default_config_to(&dir, false).unwrap_err();
        assert!(matches!(err, SettingsError::AlreadyExists(_)));
        copy_default_config_to(&dir, true).unwrap();

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn config_path_override_points_at_another_file() {
        let dir = unique_temp_dir("override");
        fs::create_dir_all(&dir).unwrap();
        let custom = dir.join("custom.yaml");
        fs::write(&custom, "registry: /data/registry.yaml\n").unwrap();

        let settings = Settings::from_env_and_file(
            &dir,
            vec![(
                "SIMDEX_CONFIG_PATH".to_string(),
                custom.display().to_string(),
            )],
        )
        .unwrap();
        assert_eq!(settings.registry_resource(), "/data/registry.yaml");
        assert_eq!(settings.source_path(), Some(custom.as_path()));
        assert!(!settings.is_default_copy());

        let _ = fs::remove_dir_all(dir);
    }
}
