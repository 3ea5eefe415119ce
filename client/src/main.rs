use clap::Parser;
use client::network::Client;
use log::info;
use shared::udp::UdpDriver;
use shared::Command;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short, long, default_value = "127.0.0.1:9000")]
    server: String,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value = "30")]
    tick_rate: u32,

    /// Seconds between keep-alive commands
    #[arg(short, long, default_value = "5")]
    keep_alive: u64,

    /// Text message to send once after connecting
    #[arg(short, long)]
    message: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let server_addr = args.server.parse()?;

    info!("Connecting to: {}", args.server);

    let mut client = Client::new(
        UdpDriver::new(),
        Duration::from_secs(args.keep_alive),
    );
    client.start();
    client.connect(server_addr)?;

    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / args.tick_rate as f64));
    let mut greeted = false;
    let mut was_connected = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                client.tick();

                if client.is_connected() {
                    was_connected = true;
                    if !greeted {
                        greeted = true;
                        if let Some(message) = &args.message {
                            client.send_to_server(Command::CustomMessage(message.clone()));
                        }
                    }
                } else if was_connected {
                    info!("Connection closed, exiting");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, disconnecting");
                client.disconnect();
                break;
            }
        }
    }

    Ok(())
}
