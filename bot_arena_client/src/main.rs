// CLI entry point for the arena game client.
//
// Connects to a game server, logs in with the credentials file, and plays
// games with the selected controller until the session ends. See
// `session.rs` for the protocol state machine and `sender.rs` for the
// command pacing.
//
// Usage:
//   arena-client [OPTIONS]
//     --server <HOST:PORT>     Server address (default: 127.0.0.1:2000)
//     --credentials <FILE>     JSON credentials file (default: credentials.json)
//     --ai <NAME>              Controller: idle | chase (default: chase)
//     --commlog <DIR>          Comm-log directory (default: CommLogs; "none" disables)
//     --text-log               Also write the human-readable log twin
//     --show-comm              Echo all traffic to stdout
//
// Log verbosity follows RUST_LOG (default: info).

use std::path::PathBuf;

use bot_arena_client::app::{self, AppConfig};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = parse_args();
    std::process::exit(app::run(&config));
}

/// Parse command-line arguments into an `AppConfig`. Uses simple
/// `std::env::args()` matching — no clap dependency.
fn parse_args() -> AppConfig {
    let mut config = AppConfig {
        server: "127.0.0.1:2000".to_string(),
        credentials: PathBuf::from("credentials.json"),
        controller: "chase".to_string(),
        commlog_dir: Some(PathBuf::from("CommLogs")),
        text_log: false,
        show_comm: false,
    };
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--server" => {
                i += 1;
                config.server = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--server requires a HOST:PORT value");
                    std::process::exit(2);
                });
            }
            "--credentials" => {
                i += 1;
                config.credentials = args.get(i).map(PathBuf::from).unwrap_or_else(|| {
                    eprintln!("--credentials requires a file path");
                    std::process::exit(2);
                });
            }
            "--ai" => {
                i += 1;
                config.controller = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--ai requires a controller name");
                    std::process::exit(2);
                });
            }
            "--commlog" => {
                i += 1;
                let dir = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--commlog requires a directory (or \"none\")");
                    std::process::exit(2);
                });
                config.commlog_dir = if dir == "none" {
                    None
                } else {
                    Some(PathBuf::from(dir))
                };
            }
            "--text-log" => config.text_log = true,
            "--show-comm" => config.show_comm = true,
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(2);
            }
        }
        i += 1;
    }

    config
}

fn print_usage() {
    println!("Usage: arena-client [OPTIONS]");
    println!("  --server <HOST:PORT>   Server address (default: 127.0.0.1:2000)");
    println!("  --credentials <FILE>   JSON credentials file (default: credentials.json)");
    println!("  --ai <NAME>            Controller: idle | chase (default: chase)");
    println!("  --commlog <DIR>        Comm-log directory (default: CommLogs; \"none\" disables)");
    println!("  --text-log             Also write the human-readable log twin");
    println!("  --show-comm            Echo all traffic to stdout");
}
