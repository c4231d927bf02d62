//! giftwheel setup wizard.
//!
//! Asks a few questions on the terminal and writes `config.toml` to the
//! project root (`GIFTWHEEL_ROOT`, default the current directory).

use anyhow::{Context, Result};
use std::io::{self, Write};
use std::path::PathBuf;

// ── Config formatting ──────────────────────────────────────────────────────────

struct ConfigParams<'a> {
    channel_id: &'a str,
    interval_secs: u64,
    backend: &'a str,
    redis_url: &'a str,
    data_dir: &'a str,
    bind: &'a str,
    clear_token: &'a str,
}

/// Render a string as a TOML value, quoted and escaped
fn toml_str(value: &str) -> String {
    toml::Value::String(value.to_owned()).to_string()
}

/// Produces a valid config.toml string. Extracted so it can be unit-tested.
fn format_config(p: &ConfigParams<'_>) -> String {
    let data_file = |name: &str| toml_str(&format!("{}/{}", p.data_dir, name));

    let storage = match p.backend {
        "redis" => format!(
            "backend = \"redis\"\nurl = {}\nentries_key = \"wheelEntries\"\nprocessed_key = \"processedGiftIds\"",
            toml_str(p.redis_url)
        ),
        "sqlite" => format!(
            "backend = \"sqlite\"\ndatabase_path = {}",
            data_file("giftwheel.db")
        ),
        "memory" => "backend = \"memory\"".to_string(),
        _ => format!(
            "backend = \"file\"\nentries_path = {}\nprocessed_path = {}",
            data_file("entries.json"),
            data_file("processed.json")
        ),
    };

    let token_line = if p.clear_token.is_empty() {
        "# clear_token = \"...\"  (or set GIFTWHEEL_CLEAR_TOKEN)".to_owned()
    } else {
        format!("clear_token = {}", toml_str(p.clear_token))
    };

    let channel_id = toml_str(p.channel_id);
    let interval_secs = p.interval_secs;
    let bind = toml_str(p.bind);

    format!(
        r#"[channel]
id = {channel_id}

[poller]
interval_secs = {interval_secs}
processed_id_cap = 500
retry_queue_cap = 1000
max_gift_count = 50

[source]
kind = "youtube"

[storage]
{storage}

[server]
bind = {bind}
{token_line}

[status]
enabled = true
probe_timeout_secs = 10
refresh_cron = "30 * * * * *"
"#
    )
}

// ── CLI prompts ────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    // Resolve project root: prefer GIFTWHEEL_ROOT env, fall back to cwd.
    let project_root =
        PathBuf::from(std::env::var("GIFTWHEEL_ROOT").unwrap_or_else(|_| ".".to_string()));

    println!("=== giftwheel setup ===\n");

    let read_line = |prompt: &str| -> Result<String> {
        print!("{prompt}");
        io::stdout().flush()?;
        let mut buf = String::new();
        io::stdin().read_line(&mut buf)?;
        Ok(buf.trim().to_owned())
    };

    let or_default = |s: String, default: &str| {
        if s.is_empty() {
            default.to_owned()
        } else {
            s
        }
    };

    let channel_id = read_line("YouTube channel ID (UC...): ")?;
    let interval_secs: u64 = or_default(read_line("Poll interval in seconds [10]: ")?, "10")
        .parse()
        .context("Poll interval must be a whole number of seconds")?;
    let backend = or_default(
        read_line("Storage backend (file/redis/sqlite/memory) [file]: ")?,
        "file",
    );
    let redis_url = if backend == "redis" {
        read_line("Redis URL (redis://host:6379/): ")?
    } else {
        String::new()
    };
    let data_dir = or_default(read_line("Data directory [data]: ")?, "data");
    let bind = or_default(
        read_line("HTTP bind address [127.0.0.1:3001]: ")?,
        "127.0.0.1:3001",
    );
    let clear_token = read_line("Clear token (leave empty to use GIFTWHEEL_CLEAR_TOKEN): ")?;

    let config = format_config(&ConfigParams {
        channel_id: &channel_id,
        interval_secs,
        backend: &backend,
        redis_url: &redis_url,
        data_dir: &data_dir,
        bind: &bind,
        clear_token: &clear_token,
    });

    let config_path = project_root.join("config.toml");
    std::fs::write(&config_path, &config)
        .with_context(|| format!("Could not write {}", config_path.display()))?;

    println!("\n✓  config.toml saved to {}", config_path.display());
    println!("   Run the wheel backend with:  cargo run --bin giftwheel");
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(backend: &str, clear_token: &str) -> String {
        format_config(&ConfigParams {
            channel_id: "UC123",
            interval_secs: 10,
            backend,
            redis_url: "redis://127.0.0.1/",
            data_dir: "data",
            bind: "127.0.0.1:3001",
            clear_token,
        })
    }

    #[test]
    fn test_channel_and_poller_sections() {
        let parsed: toml::Value = toml::from_str(&cfg("file", "s3cret")).unwrap();
        assert_eq!(parsed["channel"]["id"].as_str(), Some("UC123"));
        assert_eq!(parsed["poller"]["interval_secs"].as_integer(), Some(10));
        assert_eq!(parsed["poller"]["max_gift_count"].as_integer(), Some(50));
    }

    #[test]
    fn test_file_backend_paths() {
        let parsed: toml::Value = toml::from_str(&cfg("file", "s3cret")).unwrap();
        assert_eq!(parsed["storage"]["backend"].as_str(), Some("file"));
        assert_eq!(
            parsed["storage"]["entries_path"].as_str(),
            Some("data/entries.json")
        );
        assert_eq!(
            parsed["storage"]["processed_path"].as_str(),
            Some("data/processed.json")
        );
    }

    #[test]
    fn test_redis_backend() {
        let parsed: toml::Value = toml::from_str(&cfg("redis", "s3cret")).unwrap();
        assert_eq!(parsed["storage"]["url"].as_str(), Some("redis://127.0.0.1/"));
    }

    #[test]
    fn test_token_commented_when_empty() {
        let out = cfg("file", "");
        assert!(out.contains("# clear_token ="));
        assert!(!out.contains("\nclear_token = "));
    }

    #[test]
    fn test_output_is_valid_toml() {
        for backend in ["file", "redis", "sqlite", "memory"] {
            let out = cfg(backend, "s3cret");
            let parsed: toml::Value = toml::from_str(&out).unwrap();
            assert_eq!(parsed["storage"]["backend"].as_str(), Some(backend));
            assert_eq!(parsed["server"]["clear_token"].as_str(), Some("s3cret"));
        }
    }

    #[test]
    fn test_quotes_and_backslashes_survive() {
        let token = r#"pa"ss\word'"#;
        let out = format_config(&ConfigParams {
            channel_id: "UC\"odd",
            interval_secs: 10,
            backend: "sqlite",
            redis_url: "",
            data_dir: r"C:\giftwheel",
            bind: "127.0.0.1:3001",
            clear_token: token,
        });
        let parsed: toml::Value = toml::from_str(&out).unwrap();
        assert_eq!(parsed["server"]["clear_token"].as_str(), Some(token));
        assert_eq!(parsed["channel"]["id"].as_str(), Some("UC\"odd"));
        assert_eq!(
            parsed["storage"]["database_path"].as_str(),
            Some(r"C:\giftwheel/giftwheel.db")
        );
    }
}
