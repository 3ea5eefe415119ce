use clap::Parser;
use log::info;
use rand::Rng;
use server::network::Server;
use shared::udp::UdpDriver;
use shared::{Command, Target, Vec3};
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "9000")]
    port: u16,

    /// Maximum number of concurrent client connections
    #[arg(short, long, default_value = "16")]
    max_clients: usize,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value = "30")]
    tick_rate: u32,

    /// Broadcast a random position to all clients every N seconds
    #[arg(long)]
    announce_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut server = Server::new(UdpDriver::new());
    server.start(args.port, args.max_clients)?;

    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / args.tick_rate as f64));
    let announce_every = args.announce_secs.map(Duration::from_secs);
    let mut last_announce = Instant::now();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                server.tick();

                if let Some(every) = announce_every {
                    if last_announce.elapsed() >= every && !server.client_ids().is_empty() {
                        last_announce = Instant::now();
                        let mut rng = rand::thread_rng();
                        let position = Vec3::new(
                            rng.gen_range(0.0..255.0),
                            rng.gen_range(0.0..255.0),
                            rng.gen_range(0.0..255.0),
                        );
                        server.send_to_clients(Command::Position(position), Target::Broadcast);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    Ok(())
}
