mod serve;
mod store_cmd;

use anyhow::{Result, bail};
use console::style;
use std::path::PathBuf;

use crate::core::store::RetentionPolicy;
use crate::core::terminal::{self, GuideSection, print_error};
use crate::logging::init_cli_logging;
use crate::platform::{NativePlatform, Platform};

use store_cmd::AppendArgs;

fn print_help() {
    terminal::print_banner();
    let bin = NativePlatform::binary_name();

    GuideSection::new("Daemon")
        .command("serve", "Run the query API and supervise configured workers")
        .print();

    GuideSection::new("Store")
        .command("append", "Append a snapshot to a track")
        .command("stats", "Show per-track snapshot counts and sizes")
        .command("cleanup", "Delete historical snapshots by retention policy")
        .command("insights", "Show ranked opportunities across all tracks")
        .print();

    GuideSection::new("Examples")
        .hint(&format!("{} serve --api-port 18000", bin), "")
        .hint(
            &format!("{} append --track alpha_discovery --file signal.json", bin),
            "",
        )
        .hint(&format!("{} cleanup --keep-days 7", bin), "")
        .hint(&format!("{} insights --limit 10 --min 0.6", bin), "")
        .blank()
        .text("Every command accepts --config <path> (default: <data dir>/trackd.toml).")
        .print();

    println!(
        "\n {} {} <command> [options]\n",
        style("Usage:").bold(),
        style(bin).green()
    );
}

pub(crate) fn parse_config_flag(args: &[String], start: usize) -> Option<PathBuf> {
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    return Some(PathBuf::from(&args[i + 1]));
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    None
}

pub(crate) fn parse_api_server_flags(
    args: &[String],
    start: usize,
    mut api_host: String,
    mut api_port: u16,
) -> (String, u16) {
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--api-port" => {
                if i + 1 < args.len() {
                    api_port = args[i + 1].parse().unwrap_or(api_port);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--api-host" => {
                if i + 1 < args.len() {
                    api_host = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    (api_host, api_port)
}

pub(crate) fn parse_append_args(args: &[String], start: usize) -> AppendArgs {
    let mut parsed = AppendArgs::default();
    let mut i = start;
    while i < args.len() {
        let value = args.get(i + 1).cloned();
        let slot = match args[i].as_str() {
            "--track" | "-t" => {
                parsed.track = value;
                true
            }
            "--id" => {
                parsed.id = value;
                true
            }
            "--file" | "-f" => {
                parsed.file = value.map(PathBuf::from);
                true
            }
            "--content" => {
                parsed.content = value;
                true
            }
            "--status" => {
                parsed.status = value;
                true
            }
            _ => false,
        };
        i += if slot { 2 } else { 1 };
    }
    parsed
}

/// Exactly one of `--keep-days N`, `--keep-latest N` or `--wipe`.
pub(crate) fn parse_cleanup_policy(args: &[String], start: usize) -> Result<RetentionPolicy, String> {
    let mut policies = Vec::new();
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--keep-days" => {
                let days = args
                    .get(i + 1)
                    .and_then(|v| v.parse::<u32>().ok())
                    .ok_or("--keep-days expects a number of days")?;
                policies.push(RetentionPolicy::KeepDays(days));
                i += 2;
            }
            "--keep-latest" => {
                let n = args
                    .get(i + 1)
                    .and_then(|v| v.parse::<usize>().ok())
                    .ok_or("--keep-latest expects a snapshot count")?;
                policies.push(RetentionPolicy::KeepLatest(n));
                i += 2;
            }
            "--wipe" => {
                policies.push(RetentionPolicy::Wipe);
                i += 1;
            }
            _ => i += 1,
        }
    }
    match policies.as_slice() {
        [policy] => Ok(*policy),
        [] => Err("one of --keep-days, --keep-latest or --wipe is required".to_string()),
        _ => Err("only one retention policy may be given".to_string()),
    }
}

/// Prints the cleanup usage guide and fails when the flags do not name a policy.
fn cleanup_policy_or_usage(args: &[String], start: usize) -> Result<RetentionPolicy> {
    match parse_cleanup_policy(args, start) {
        Ok(policy) => Ok(policy),
        Err(msg) => {
            GuideSection::new("trackd cleanup")
                .text("--keep-days <n>     Delete snapshots older than n days")
                .text("--keep-latest <n>   Keep the n newest snapshots per track")
                .text("--wipe              Delete every snapshot")
                .blank()
                .info("The newest snapshot of each track survives all but --wipe.")
                .print();
            println!();
            bail!(msg)
        }
    }
}

pub(crate) fn parse_insights_flags(
    args: &[String],
    start: usize,
    mut limit: usize,
    mut min_confidence: f64,
) -> (usize, f64) {
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--limit" | "-n" => {
                if i + 1 < args.len() {
                    limit = args[i + 1].parse().unwrap_or(limit);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--min" => {
                if i + 1 < args.len() {
                    min_confidence = args[i + 1].parse().unwrap_or(min_confidence);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    (limit, min_confidence)
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let Some(cmd) = args.get(1).map(String::as_str) else {
        print_help();
        return Ok(());
    };
    if matches!(cmd, "help" | "--help" | "-h") {
        print_help();
        return Ok(());
    }

    let config_path = parse_config_flag(&args, 2);
    let config = store_cmd::load_config(config_path.as_deref()).await?;

    match cmd {
        "serve" => {
            let (api_host, api_port) =
                parse_api_server_flags(&args, 2, config.api.host.clone(), config.api.port);
            serve::run_daemon(config, api_host, api_port).await
        }
        "append" => {
            init_cli_logging("warn");
            store_cmd::run_append(&config, parse_append_args(&args, 2)).await
        }
        "stats" => {
            init_cli_logging("warn");
            store_cmd::run_stats(&config).await
        }
        "cleanup" => {
            init_cli_logging(&config.logging.level);
            let policy = cleanup_policy_or_usage(&args, 2)?;
            store_cmd::run_cleanup(&config, policy).await
        }
        "insights" => {
            init_cli_logging("warn");
            let (limit, min) = parse_insights_flags(&args, 2, 20, 0.0);
            store_cmd::run_insights(&config, limit, min).await
        }
        _ => {
            print_error(&format!("Unknown command: {}", cmd));
            print_help();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_api_server_flags_reads_host_and_port() {
        let args = argv(&["trackd", "serve", "--api-host", "0.0.0.0", "--api-port", "19000"]);
        let (host, port) = parse_api_server_flags(&args, 2, "127.0.0.1".to_string(), 17900);
        assert_eq!(host, "0.0.0.0");
        assert_eq!(port, 19000);
    }

    #[test]
    fn parse_api_server_flags_keeps_configured_port_on_garbage() {
        let args = argv(&["trackd", "serve", "--api-port", "lots"]);
        let (_, port) = parse_api_server_flags(&args, 2, "127.0.0.1".to_string(), 18123);
        assert_eq!(port, 18123);
    }

    #[test]
    fn parse_config_flag_finds_path_anywhere() {
        let args = argv(&["trackd", "stats", "--config", "/etc/trackd.toml"]);
        assert_eq!(
            parse_config_flag(&args, 2),
            Some(PathBuf::from("/etc/trackd.toml"))
        );
        assert_eq!(parse_config_flag(&argv(&["trackd", "stats"]), 2), None);
    }

    #[test]
    fn parse_append_args_reads_all_options() {
        let args = argv(&[
            "trackd", "append", "--track", "risk_assessment", "--id", "r-1", "--content",
            "{\"risk\": 3}", "--status", "reviewed",
        ]);
        let parsed = parse_append_args(&args, 2);
        assert_eq!(parsed.track.as_deref(), Some("risk_assessment"));
        assert_eq!(parsed.id.as_deref(), Some("r-1"));
        assert_eq!(parsed.content.as_deref(), Some("{\"risk\": 3}"));
        assert_eq!(parsed.status.as_deref(), Some("reviewed"));
        assert_eq!(parsed.file, None);
    }

    #[test]
    fn parse_cleanup_policy_requires_exactly_one() {
        let keep = argv(&["trackd", "cleanup", "--keep-days", "3"]);
        assert_eq!(parse_cleanup_policy(&keep, 2), Ok(RetentionPolicy::KeepDays(3)));

        let wipe = argv(&["trackd", "cleanup", "--wipe"]);
        assert_eq!(parse_cleanup_policy(&wipe, 2), Ok(RetentionPolicy::Wipe));

        assert!(parse_cleanup_policy(&argv(&["trackd", "cleanup"]), 2).is_err());
        assert!(parse_cleanup_policy(&argv(&["trackd", "cleanup", "--keep-days", "x"]), 2).is_err());
        assert!(
            parse_cleanup_policy(&argv(&["trackd", "cleanup", "--wipe", "--keep-latest", "2"]), 2)
                .is_err()
        );
    }

    #[test]
    fn cleanup_without_a_policy_is_an_error() {
        let err = cleanup_policy_or_usage(&argv(&["trackd", "cleanup", "--keep-days"]), 2)
            .unwrap_err();
        assert!(err.to_string().contains("--keep-days"));
        assert!(cleanup_policy_or_usage(&argv(&["trackd", "cleanup", "--bogus"]), 2).is_err());
        assert_eq!(
            cleanup_policy_or_usage(&argv(&["trackd", "cleanup", "--keep-latest", "4"]), 2).unwrap(),
            RetentionPolicy::KeepLatest(4)
        );
    }

    #[test]
    fn parse_insights_flags_reads_limit_and_min() {
        let args = argv(&["trackd", "insights", "--limit", "5", "--min", "0.75"]);
        assert_eq!(parse_insights_flags(&args, 2, 20, 0.0), (5, 0.75));
        assert_eq!(
            parse_insights_flags(&argv(&["trackd", "insights"]), 2, 20, 0.0),
            (20, 0.0)
        );
    }
}
