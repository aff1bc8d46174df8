mod config;
mod error;
mod routes;
mod state;
mod static_files;

use std::net::SocketAddr;

use clap::Parser;
use socket2::{Domain, Socket, Type};
use tracing_subscriber::EnvFilter;

use config::Cli;
use state::AppState;

fn main() {
  let cli = Cli::parse();
  let (server_config, log_level) = cli.resolve().expect("failed to resolve configuration");

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let addr: SocketAddr = format!("{}:{}", server_config.host, server_config.port)
    .parse()
    .expect("invalid host/port");

  tracing::info!(%addr, threads = server_config.threads, "starting wisp-server");

  // Each worker gets its own OS thread, its own single-threaded tokio
  // runtime, and its own independent `AppState`/rate limiter — mirroring
  // the original's `multiprocessing.Process` fanout, minus the separate
  // process boundary. Every listener binds the same address via
  // `SO_REUSEPORT`, so the kernel load-balances accepted connections
  // across workers.
  let mut workers = Vec::with_capacity(server_config.threads);
  for worker_id in 0..server_config.threads {
    let state = AppState::new(server_config.clone());
    workers.push(std::thread::spawn(move || run_worker(worker_id, addr, state)));
  }

  for worker in workers {
    let _ = worker.join();
  }
}

fn run_worker(worker_id: usize, addr: SocketAddr, state: AppState) {
  let runtime = tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .expect("failed to build tokio runtime");

  runtime.block_on(async move {
    let listener = match bind_reuseport(addr) {
      Ok(listener) => listener,
      Err(err) => {
        tracing::error!(worker_id, %err, "failed to bind listening socket");
        return;
      }
    };

    tracing::info!(worker_id, %addr, "worker listening");

    wisp_core::ratelimit::spawn_resetter(state.limiter.clone());

    let app = routes::router(state);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    if let Err(err) = axum::serve(listener, make_service).await {
      tracing::error!(worker_id, %err, "server error");
    }
  });
}

fn bind_reuseport(addr: SocketAddr) -> std::io::Result<tokio::net::TcpListener> {
  let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
  let socket = Socket::new(domain, Type::STREAM, None)?;
  socket.set_reuse_address(true)?;
  #[cfg(unix)]
  socket.set_reuse_port(true)?;
  socket.set_nonblocking(true)?;
  socket.bind(&addr.into())?;
  socket.listen(1024)?;
  let std_listener: std::net::TcpListener = socket.into();
  tokio::net::TcpListener::from_std(std_listener)
}
