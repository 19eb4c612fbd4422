use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::{self, ResourceOrigin, Settings};
use crate::layout::detect_layout;
use crate::registry::{validate_registry, Registry};

const USAGE: &str = "usage: simdex <list|resolve|validate|dump|layout|init-config>";
const OPTIONS_WITH_VALUES: &[&str] = &["--registry", "--prefix"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    List,
    Resolve,
    Validate,
    Dump,
    Layout,
    InitConfig,
}

pub fn parse_command(args: &[String]) -> Option<Command> {
    match args.get(1).map(String::as_str) {
        Some("list") => Some(Command::List),
        Some("resolve") => Some(Command::Resolve),
        Some("validate") => Some(Command::Validate),
        Some("dump") => Some(Command::Dump),
        Some("layout") => Some(Command::Layout),
        Some("init-config") => Some(Command::InitConfig),
        _ => None,
    }
}

pub fn run_with_args(args: &[String]) -> i32 {
    if let Some(option) = option_missing_value(args) {
        eprintln!("option '{option}' requires a value");
        eprintln!("{USAGE}");
        return 2;
    }

    match parse_command(args) {
        Some(Command::List) => handle_list(args),
        Some(Command::Resolve) => handle_resolve(args),
        Some(Command::Validate) => handle_validate(args),
        Some(Command::Dump) => handle_dump(args),
        Some(Command::Layout) => handle_layout(args),
        Some(Command::InitConfig) => handle_init_config(args),
        None => {
            eprintln!("{USAGE}");
            2
        }
    }
}

/// Value following `--name`, if present.
fn option_value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == name)
        .and_then(|index| args.get(index + 1))
        .map(String::as_str)
}

/// First option from `OPTIONS_WITH_VALUES` that is last or followed by
/// another option.
fn option_missing_value(args: &[String]) -> Option<&str> {
    args.iter().enumerate().find_map(|(index, arg)| {
        let arg = arg.as_str();
        let missing = OPTIONS_WITH_VALUES.contains(&arg)
            && args
                .get(index + 1)
                .map_or(true, |value| value.starts_with("--"));
        missing.then_some(arg)
    })
}

fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|arg| arg == name)
}

/// First positional argument after the command, skipping `--opt value` pairs.
fn positional(args: &[String], options_with_values: &[&str]) -> Option<String> {
    let mut iter = args.iter().skip(2);
    while let Some(arg) = iter.next() {
        if options_with_values.contains(&arg.as_str()) {
            iter.next();
            continue;
        }
        if arg.starts_with("--") {
            continue;
        }
        return Some(arg.clone());
    }
    None
}

/// Registry from `--registry <path>`, else the settings' registry resource,
/// else the bundled one.
fn load_registry(args: &[String]) -> Result<Registry, String> {
    if let Some(path) = option_value(args, "--registry") {
        return Registry::load_file(path).map_err(|err| err.to_string());
    }

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(err) => {
            warn!(error = %err, "settings unavailable, using bundled registry");
            return Registry::bundled().map_err(|err| err.to_string());
        }
    };
    let resource = settings.registry_resource();
    let (text, origin) = config::read_config_resource(&resource, settings.config_dir())
        .map_err(|err| err.to_string())?;
    let registry = Registry::from_yaml_str(&text).map_err(|err| match origin {
        ResourceOrigin::File(path) => format!("{}: {err}", path.display()),
        ResourceOrigin::Bundled => format!("{resource}: {err}"),
    })?;
    Ok(registry)
}

fn handle_list(args: &[String]) -> i32 {
    let registry = match load_registry(args) {
        Ok(registry) => registry,
        Err(err) => {
            eprintln!("failed to load registry: {err}");
            return 1;
        }
    };

    if has_flag(args, "--csv") {
        return match write_csv(&registry) {
            Ok(()) => 0,
            Err(err) => {
                eprintln!("failed to write csv: {err}");
                1
            }
        };
    }

    println!("name\taliases\ttype\tunitfile");
    for entry in &registry {
        println!(
            "{}\t{}\t{}\t{}",
            entry.name,
            entry.aliases.join(","),
            entry.dataset_type.map(|t| t.as_str()).unwrap_or("-"),
            entry.unit_file.as_deref().unwrap_or("-")
        );
    }
    0
}

fn write_csv(registry: &Registry) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(std::io::stdout());
    writer.write_record(["name", "aliases", "type", "unitfile", "suite", "code"])?;
    for entry in registry {
        let aliases = entry.aliases.join(";");
        writer.write_record([
            entry.name.as_str(),
            aliases.as_str(),
            entry.dataset_type.map(|t| t.as_str()).unwrap_or(""),
            entry.unit_file.as_deref().unwrap_or(""),
            entry.suite.as_deref().unwrap_or(""),
            entry.code.as_deref().unwrap_or(""),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn handle_resolve(args: &[String]) -> i32 {
    let Some(name) = positional(args, OPTIONS_WITH_VALUES) else {
        eprintln!("usage: simdex resolve <name> [--registry <path>]");
        return 2;
    };

    let registry = match load_registry(args) {
        Ok(registry) => registry,
        Err(err) => {
            eprintln!("failed to load registry: {err}");
            return 1;
        }
    };

    let Some(entry) = registry.resolve(&name) else {
        eprintln!("dataset '{name}' not found");
        return 1;
    };
    match serde_json::to_string_pretty(entry) {
        Ok(payload) => {
            println!("{payload}");
            0
        }
        Err(err) => {
            eprintln!("failed to serialize entry: {err}");
            1
        }
    }
}

fn handle_validate(args: &[String]) -> i32 {
    let Some(path) = positional(args, &[]) else {
        eprintln!("usage: simdex validate <path-to-registry.yaml>");
        return 2;
    };
    let path = PathBuf::from(path);

    let registry = match Registry::load_file(&path) {
        Ok(registry) => registry,
        Err(err) => {
            eprintln!("validation failed: {err}");
            return 1;
        }
    };

    let registry_dir = path.parent().map(Path::to_path_buf);
    let user_dir = config::user_config_dir();
    let report = validate_registry(&registry, |unit_file| {
        registry_dir
            .as_deref()
            .map_or(false, |dir| dir.join(unit_file).is_file())
            || config::resource_exists(unit_file, user_dir.as_deref())
    });

    for diag in &report.diagnostics {
        eprintln!("- {diag}");
    }
    if report.has_errors() {
        eprintln!("validation failed: {} issue(s)", report.diagnostics.len());
        1
    } else {
        println!(
            "validation passed: {} ({} datasets)",
            path.display(),
            registry.len()
        );
        0
    }
}

fn handle_dump(args: &[String]) -> i32 {
    let registry = match load_registry(args) {
        Ok(registry) => registry,
        Err(err) => {
            eprintln!("failed to load registry: {err}");
            return 1;
        }
    };
    match registry.to_yaml() {
        Ok(yaml) => {
            print!("{yaml}");
            0
        }
        Err(err) => {
            eprintln!("{err}");
            1
        }
    }
}

fn handle_layout(args: &[String]) -> i32 {
    let Some(path) = positional(args, OPTIONS_WITH_VALUES) else {
        eprintln!("usage: simdex layout <path> [--prefix <file-prefix>]");
        return 2;
    };

    match detect_layout(&path, option_value(args, "--prefix")) {
        Ok(layout) => match serde_json::to_string_pretty(&layout) {
            Ok(payload) => {
                println!("{payload}");
                0
            }
            Err(err) => {
                eprintln!("failed to serialize layout: {err}");
                1
            }
        },
        Err(err) => {
            eprintln!("layout detection failed: {err}");
            1
        }
    }
}

fn handle_init_config(args: &[String]) -> i32 {
    let path = match config::copy_default_config(has_flag(args, "--overwrite")) {
        Ok(path) => path,
        Err(err) => {
            eprintln!("init-config failed: {err}");
            return 1;
        }
    };
    println!("wrote default configuration to {}", path.display());

    // Environment overrides still apply on top of the fresh file.
    match Settings::load() {
        Ok(settings) => {
            println!("registry: {}", settings.registry_resource());
            match settings.cache_dir() {
                Some(dir) => println!("cachedir: {}", dir.display()),
                None => println!("cachedir: (unset)"),
            }
            0
        }
        Err(err) => {
            eprintln!("init-config failed: {err}");
            1
        }
    }
}
