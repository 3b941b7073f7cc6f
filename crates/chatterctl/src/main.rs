use anyhow::{Context, Result};
use chatterd_core::config;
use chatterd_core::ipc::{self, ClientMsg, DaemonMsg};
use clap::{Parser, Subcommand};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;

#[derive(Parser)]
#[command(name = "chatterctl", about = "Control the chatterd daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show daemon status
    Status,
    /// Enable chatter filtering
    Enable,
    /// Disable chatter filtering (all keys pass through)
    Disable,
    /// Toggle chatter filtering on/off
    Toggle,
    /// Show blocked presses per key
    Stats,
}

impl Command {
    fn to_msg(&self) -> ClientMsg {
        match self {
            Command::Status => ClientMsg::GetStatus,
            Command::Enable => ClientMsg::Enable,
            Command::Disable => ClientMsg::Disable,
            Command::Toggle => ClientMsg::Toggle,
            Command::Stats => ClientMsg::GetStats,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let socket_path = config::socket_path();
    let stream = UnixStream::connect(&socket_path).with_context(|| {
        format!("connecting to chatterd at {}\nIs the daemon running?", socket_path.display())
    })?;

    let mut writer = stream.try_clone().context("cloning stream")?;
    let reader = BufReader::new(stream);

    let line = ipc::encode(&cli.command.to_msg());
    writer.write_all(line.as_bytes()).context("sending command")?;

    for line in reader.lines() {
        let line = line.context("reading response")?;
        let Some(resp) = ipc::decode_daemon(&line) else {
            continue;
        };
        match resp {
            DaemonMsg::Status { enabled, strategy, total_blocked, version } => {
                println!("chatterd v{}", version);
                println!("  enabled:  {}", enabled);
                println!("  strategy: {}", strategy);
                println!("  blocked:  {}", total_blocked);
            }
            DaemonMsg::Stats { keys } => {
                if keys.is_empty() {
                    println!("no presses blocked");
                }
                for k in keys {
                    println!("{:>5}  {}", k.code, k.blocked);
                }
            }
            DaemonMsg::Ack { ok, message } => {
                if !ok {
                    eprintln!("error: {}", message);
                    std::process::exit(1);
                }
                println!("{}", message);
            }
        }
        break;
    }

    Ok(())
}
