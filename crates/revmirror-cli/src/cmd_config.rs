use clap::Subcommand;
use revmirror_store::{Config, StatePaths};

// ── CLI Schema ──

#[derive(Subcommand)]
pub enum ConfigCmd {
    /// Set a config value
    Set {
        /// Config key (e.g. project_root, secret, tracked_ref)
        key: String,
        /// Config value (true/false/number/string)
        value: String,
    },
    /// Get a config value
    Get {
        /// Config key
        key: String,
    },
    /// Remove a value, restoring its default
    Unset { key: String },
    /// List all config values
    List,
}

// ── Dispatch ──

pub fn run(cmd: ConfigCmd, paths: &StatePaths) -> anyhow::Result<()> {
    match cmd {
        ConfigCmd::Set { key, value } => set(paths, &key, &value),
        ConfigCmd::Get { key } => get(paths, &key),
        ConfigCmd::Unset { key } => unset(paths, &key),
        ConfigCmd::List => list(paths),
    }
}

// ── Command Implementations ──

type ConfigMap = serde_json::Map<String, serde_json::Value>;

fn to_map(config: &Config) -> anyhow::Result<ConfigMap> {
    match serde_json::to_value(config)? {
        serde_json::Value::Object(map) => Ok(map),
        _ => anyhow::bail!("config did not serialize to an object"),
    }
}

fn require_known(key: &str) -> anyhow::Result<()> {
    if !to_map(&Config::default())?.contains_key(key) {
        anyhow::bail!("unknown config key: {key}");
    }
    Ok(())
}

fn require_init(paths: &StatePaths) -> anyhow::Result<()> {
    if !paths.is_initialized() {
        anyhow::bail!("no state at {} (run `revmirror init` first)", paths.root.display());
    }
    Ok(())
}

/// Parse a string value into an appropriate JSON value (bool/number/string).
fn parse_value(s: &str) -> serde_json::Value {
    match s {
        "true" => serde_json::Value::Bool(true),
        "false" => serde_json::Value::Bool(false),
        _ => match s.parse::<u64>() {
            Ok(n) => serde_json::Value::Number(n.into()),
            Err(_) => serde_json::Value::String(s.to_string()),
        },
    }
}

/// Apply `key = value` to the file contents and check the result still
/// deserializes, so a bad value never reaches disk.
fn apply(paths: &StatePaths, key: &str, value: serde_json::Value) -> anyhow::Result<Config> {
    require_known(key)?;
    let mut map = to_map(&Config::load_file(&paths.config_json)?)?;
    map.insert(key.to_string(), value);
    serde_json::from_value(serde_json::Value::Object(map))
        .map_err(|e| anyhow::anyhow!("invalid value for {key}: {e}"))
}

/// `revmirror config set <key> <value>`
pub fn set(paths: &StatePaths, key: &str, value: &str) -> anyhow::Result<()> {
    require_init(paths)?;
    let mut parsed = parse_value(value);
    // Numeric-looking secrets and refs stay strings.
    if matches!(
        key,
        "secret" | "tracked_ref" | "bind" | "buildbot_master" | "buildbot_repository"
    ) {
        parsed = serde_json::Value::String(value.to_string());
    }
    let config = apply(paths, key, parsed)?;
    config.save(paths)?;
    println!("{key} = {}", display_value(key, &to_map(&config)?));
    Ok(())
}

/// `revmirror config unset <key>`
pub fn unset(paths: &StatePaths, key: &str) -> anyhow::Result<()> {
    require_init(paths)?;
    let default = to_map(&Config::default())?;
    let value = default.get(key).cloned().unwrap_or(serde_json::Value::Null);
    let config = apply(paths, key, value)?;
    config.save(paths)?;
    println!("{key} reset");
    Ok(())
}

/// `revmirror config get <key>`
pub fn get(paths: &StatePaths, key: &str) -> anyhow::Result<()> {
    require_init(paths)?;
    require_known(key)?;
    let map = to_map(&Config::load(paths)?)?;
    println!("{}", display_value(key, &map));
    Ok(())
}

/// `revmirror config list`
pub fn list(paths: &StatePaths) -> anyhow::Result<()> {
    require_init(paths)?;
    let map = to_map(&Config::load(paths)?)?;
    for key in map.keys() {
        println!("{key} = {}", display_value(key, &map));
    }
    Ok(())
}

fn display_value(key: &str, map: &ConfigMap) -> String {
    match map.get(key) {
        None | Some(serde_json::Value::Null) => "(not set)".to_string(),
        Some(_) if key == "secret" => "********".to_string(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(v) => v.to_string(),
    }
}
