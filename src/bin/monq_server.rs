//! monq-server - Unix socket server for the query engine
//!
//! Serves LQL queries over a world snapshot. Meant for testing clients and
//! dashboards without a live monitoring daemon behind the engine.
//!
//! Usage:
//!   monq-server <world.json> [--socket /tmp/monq.sock] [--threads N]
//!
//! Protocol:
//!   Request:  "GET <table>\n" + header lines + "\n"
//!   Response: optional fixed16 status header + payload

use std::io::BufReader;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use monq::{Engine, EngineConfig, StaticWorld};

fn usage() -> ! {
    eprintln!("Usage: monq-server <world.json> [--socket <socket-path>] [--threads <n>]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <world.json>   Path to a world snapshot file");
    eprintln!("  --socket       Unix socket path (default: /tmp/monq.sock)");
    eprintln!("  --threads      Size of the worker pool (default: 10)");
    std::process::exit(1);
}

fn handle_client(engine: &Engine, stream: UnixStream, client_id: usize) {
    tracing::info!("client {} connected", client_id);
    let reader = match stream.try_clone() {
        Ok(read_half) => BufReader::new(read_half),
        Err(e) => {
            tracing::error!("client {}: cannot clone stream: {}", client_id, e);
            return;
        }
    };
    match engine.serve_connection(reader, stream) {
        Ok(()) => tracing::info!("client {} disconnected", client_id),
        Err(e) => tracing::warn!("client {}: {}", client_id, e),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        usage();
    }

    let world_path = PathBuf::from(&args[1]);
    let socket_path = args
        .iter()
        .position(|a| a == "--socket")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("/tmp/monq.sock")
        .to_string();
    let threads = args
        .iter()
        .position(|a| a == "--threads")
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(10);

    tracing::info!("loading world snapshot from {:?}", world_path);
    let world = match StaticWorld::from_json_file(&world_path) {
        Ok(world) => world,
        Err(e) => {
            tracing::error!("cannot load {:?}: {}", world_path, e);
            std::process::exit(1);
        }
    };

    let config = EngineConfig {
        num_client_threads: threads,
        ..EngineConfig::default()
    };
    let engine = Arc::new(Engine::new(Arc::new(world), config));

    // Remove stale socket file
    let _ = std::fs::remove_file(&socket_path);
    let listener = match UnixListener::bind(&socket_path) {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("cannot bind {}: {}", socket_path, e);
            std::process::exit(1);
        }
    };
    tracing::info!("listening on {}", socket_path);

    // Fixed worker pool, one connection per worker at a time.
    let (tx, rx) = crossbeam_channel::bounded::<(UnixStream, usize)>(threads * 2);
    for worker_id in 0..threads {
        let rx = rx.clone();
        let engine = Arc::clone(&engine);
        thread::Builder::new()
            .name(format!("monq-worker-{}", worker_id))
            .spawn(move || {
                for (stream, client_id) in rx.iter() {
                    handle_client(&engine, stream, client_id);
                }
            })
            .expect("failed to spawn worker thread");
    }

    let socket_path_for_signal = socket_path.clone();
    let mut signals = signal_hook::iterator::Signals::new([
        signal_hook::consts::SIGINT,
        signal_hook::consts::SIGTERM,
    ])
    .expect("failed to register signal handlers");
    thread::spawn(move || {
        for signal in signals.forever() {
            tracing::info!("received signal {}, exiting", signal);
            let _ = std::fs::remove_file(&socket_path_for_signal);
            std::process::exit(0);
        }
    });

    let mut client_id = 0;
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                client_id += 1;
                if tx.send((stream, client_id)).is_err() {
                    tracing::error!("worker pool is gone, exiting");
                    break;
                }
            }
            Err(e) => {
                tracing::warn!("accept error: {}", e);
            }
        }
    }
}
