use anyhow::{Context, Result};
use clap::Parser;
use maze_node::rpc::server;
use maze_node::{
    Command, CommandError, HttpDirectory, HttpTracker, NodeConfig, PeerInfo, PeerNode, PlayerId,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// One player of the maze game
#[derive(Debug, Parser)]
#[command(name = "player", version)]
struct Args {
    /// Tracker IP address
    tracker_ip: String,

    /// Tracker port
    tracker_port: u16,

    /// Two-character player id
    player_id: PlayerId,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);
    let config = NodeConfig::from_env()?;

    // Peer server first: the advertised port must already accept calls
    let bind_addr = format!("0.0.0.0:{}", config.peer_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    let port = listener.local_addr()?.port();
    let me = PeerInfo::new(args.player_id.clone(), config.advertise_ip.clone(), port);

    let tracker_url = format!("http://{}:{}", args.tracker_ip, args.tracker_port);
    let tracker = HttpTracker::new(tracker_url.clone(), config.rpc_timeout)?;
    let directory = HttpDirectory::new(config.rpc_timeout)?;
    let node = PeerNode::new(me, config, Arc::new(directory), Arc::new(tracker));

    let server_node = node.clone();
    tokio::spawn(async move {
        if let Err(e) = server::serve(listener, server_node).await {
            error!(error = %e, "Peer server stopped");
        }
    });

    let me = node.me();
    info!(player = %me.id, endpoint = %me.endpoint(), tracker = %tracker_url, "Joining game");
    let role = node
        .join()
        .await
        .with_context(|| format!("Player {} could not join", me.id))?;
    println!("Joined as {} ({})", me.id, role);
    println!("{}", node.game_state().await);

    run_commands(&node).await?;

    node.shutdown().await;
    Ok(())
}

/// Read commands from stdin until Exit or end of input
async fn run_commands(node: &PeerNode) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let command: Command = match line.parse() {
            Ok(command) => command,
            Err(e) => {
                println!("{} (use 0 refresh, 1 west, 2 south, 3 east, 4 north, 9 exit)", e);
                continue;
            }
        };

        match node.submit(command).await {
            Ok(state) => {
                println!("{}", state);
                if command == Command::Exit {
                    return Ok(());
                }
            }
            Err(CommandError::NotDelivered(e)) => {
                warn!(error = %e, "Command not delivered");
                println!("command not delivered, try again");
            }
            Err(e) => println!("{}", e),
        }
    }

    // End of input leaves the game the same way as an explicit exit
    if let Err(e) = node.submit(Command::Exit).await {
        warn!(error = %e, "Exit was not delivered");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args() {
        let args = Args::try_parse_from(["player", "127.0.0.1", "9000", "ab"]).unwrap();
        assert_eq!(args.tracker_ip, "127.0.0.1");
        assert_eq!(args.tracker_port, 9000);
        assert_eq!(args.player_id.as_str(), "ab");
        assert_eq!(args.verbose, 0);
    }

    #[test]
    fn test_args_reject_bad_player_id() {
        assert!(Args::try_parse_from(["player", "127.0.0.1", "9000", "abc"]).is_err());
        assert!(Args::try_parse_from(["player", "127.0.0.1", "port", "ab"]).is_err());
    }
}
