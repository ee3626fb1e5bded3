use anyhow::{bail, Context as _, Result};
use bandstand_ingest::config;

use super::Context;

const STRING_KEYS: [&str; 3] = ["database_path", "documents_dir", "staging_dir"];
const NUMBER_KEYS: [&str; 2] = ["busy_timeout_ms", "staging_max_age_secs"];

#[derive(Debug, clap::Subcommand)]
pub enum ConfigAction {
    /// Create the config file with commented defaults
    Init,
    /// Show the effective configuration
    Show,
    /// Print one effective value, or the raw config file without a key
    Get { key: Option<String> },
    /// Set a top-level value in the config file
    Set { key: String, value: String },
    /// Print the config file path
    Path,
    /// Print an example config file
    Example,
}

pub fn run(ctx: &Context, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Init => init_config(),
        ConfigAction::Show => show_config(ctx),
        ConfigAction::Get { key } => get_config(ctx, key),
        ConfigAction::Set { key, value } => set_config(&key, &value),
        ConfigAction::Path => {
            println!("{}", config::config_file_path().display());
            Ok(())
        }
        ConfigAction::Example => {
            print!("{}", config::example_config());
            Ok(())
        }
    }
}

fn init_config() -> Result<()> {
    let created = config::ensure_config_file()?;
    let config_path = config::config_file_path();

    if created {
        println!("✓ Created config file: {}", config_path.display());
        println!("\nEdit this file to configure bandstand.");
    } else {
        println!("Config file already exists: {}", config_path.display());
    }
    Ok(())
}

fn show_config(ctx: &Context) -> Result<()> {
    let config_path = config::config_file_path();
    let exists = config_path.exists();

    println!("Config file: {}", config_path.display());
    println!("File exists: {}\n", if exists { "yes" } else { "no (using defaults)" });
    println!("{}", serde_json::to_string_pretty(&ctx.config)?);
    println!("\nPriority: CLI args > ENV vars (BANDSTAND_*) > Config file > Defaults");
    Ok(())
}

fn get_config(ctx: &Context, key: Option<String>) -> Result<()> {
    let Some(key) = key else {
        let config_path = config::config_file_path();
        if config_path.exists() {
            let contents =
                std::fs::read_to_string(&config_path).context("Failed to read config file")?;
            print!("{contents}");
        } else {
            println!("Config file does not exist: {}", config_path.display());
            println!("\nRun 'bandstand config init' to create it.");
        }
        return Ok(());
    };

    let config = &ctx.config;
    match key.as_str() {
        "database_path" => println!("{}", config.database_path.display()),
        "documents_dir" => println!("{}", config.documents_dir.display()),
        "staging_dir" => println!("{}", config.staging_dir.display()),
        "busy_timeout_ms" => println!("{}", config.busy_timeout_ms),
        "staging_max_age_secs" => println!("{}", config.staging_max_age_secs),
        "logging.level" => println!("{}", config.logging.level),
        "logging.coloured" => println!("{}", config.logging.coloured),
        _ => bail!("Unknown config key: {key}"),
    }
    Ok(())
}

fn set_config(key: &str, value: &str) -> Result<()> {
    let line = if STRING_KEYS.contains(&key) {
        format!("{key} = {}", toml_basic_string(value))
    } else if NUMBER_KEYS.contains(&key) {
        let n: u64 = value
            .parse()
            .with_context(|| format!("{key} must be a whole number"))?;
        format!("{key} = {n}")
    } else {
        bail!(
            "Unknown config key: {key}\n\nValid keys: {}, {}",
            STRING_KEYS.join(", "),
            NUMBER_KEYS.join(", ")
        );
    };

    config::ensure_config_file()?;
    let config_path = config::config_file_path();
    let contents = std::fs::read_to_string(&config_path).context("Failed to read config file")?;
    std::fs::write(&config_path, replace_top_level(&contents, key, &line))
        .context("Failed to write config file")?;

    println!("✓ Updated {key} = {value}");
    println!("  in {}", config_path.display());
    Ok(())
}

/// Quote `value` as a TOML basic string. Only the backslash, the double
/// quote, and control characters need escaping there.
fn toml_basic_string(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            c if c.is_control() && c != '\t' => {
                let code = u32::from(c);
                quoted.push_str("\\u");
                for shift in [12, 8, 4, 0] {
                    let digit = char::from_digit((code >> shift) & 0xF, 16).unwrap_or('0');
                    quoted.push(digit.to_ascii_uppercase());
                }
            }
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

/// Replace the uncommented `key = ...` line before the first table, or
/// insert one there.
fn replace_top_level(contents: &str, key: &str, line: &str) -> String {
    let mut out = Vec::new();
    let mut done = false;

    for existing in contents.lines() {
        let trimmed = existing.trim_start();
        let assigns_key = trimmed
            .strip_prefix(key)
            .is_some_and(|rest| rest.trim_start().starts_with('='));

        if !done && assigns_key {
            out.push(line.to_string());
            done = true;
        } else if !done && trimmed.starts_with('[') {
            out.push(line.to_string());
            out.push(String::new());
            out.push(existing.to_string());
            done = true;
        } else {
            out.push(existing.to_string());
        }
    }
    if !done {
        out.push(line.to_string());
    }

    let mut joined = out.join("\n");
    joined.push('\n');
    joined
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_basic_string_escapes() {
        assert_eq!(toml_basic_string("/var/lib/bandstand.db"), r#""/var/lib/bandstand.db""#);
        assert_eq!(toml_basic_string(r#"C:\docs "x""#), r#""C:\\docs \"x\"""#);
        assert_eq!(toml_basic_string("a\u{7f}b\nc"), r#""a\u007Fb\u000Ac""#);
        assert_eq!(toml_basic_string("tab\there"), "\"tab\there\"");
        assert_eq!(toml_basic_string("Ünïcødé"), "\"Ünïcødé\"");
    }

    #[test]
    fn test_replace_existing_line() {
        let contents = "#database_path = \"x\"\ndatabase_path = \"old\"\n\n[logging]\n";
        let updated = replace_top_level(contents, "database_path", "database_path = \"new\"");
        assert!(updated.contains("database_path = \"new\""));
        assert!(!updated.contains("\"old\""));
        assert!(updated.contains("#database_path = \"x\""));
    }

    #[test]
    fn test_insert_before_first_table() {
        let contents = "# comment\n[logging]\nlevel = \"info\"\n";
        let updated = replace_top_level(contents, "busy_timeout_ms", "busy_timeout_ms = 5000");
        let timeout = updated.find("busy_timeout_ms").unwrap();
        let table = updated.find("[logging]").unwrap();
        assert!(timeout < table);
    }

    #[test]
    fn test_key_prefix_does_not_match_longer_key() {
        let contents = "staging_dir_extra = 1\n";
        let updated = replace_top_level(contents, "staging_dir", "staging_dir = \"/s\"");
        assert!(updated.contains("staging_dir_extra = 1"));
        assert!(updated.contains("staging_dir = \"/s\""));
    }
}
