use clap::Parser;
use std::{
    io::{self, BufRead},
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};
use threadweb::{
    limits::ServerLimits,
    services::{EchoService, FilesService},
    vfs::{DiskFileSystem, FileSystem, MemoryFileSystem},
    Server,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "threadweb")]
#[command(about = "Thread-pool HTTP/1.1 server with file browsing and upload", long_about = None)]
struct Cli {
    /// Port to listen on
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Worker threads; zero or negative selects 64
    #[arg(short, long, default_value_t = 64, allow_negative_numbers = true)]
    threads: i64,

    /// Directory served under /files; an in-memory tree if omitted
    #[arg(short, long)]
    root: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "threadweb=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let fs: Arc<dyn FileSystem> = match &cli.root {
        Some(root) => Arc::new(DiskFileSystem::open(root)?),
        None => Arc::new(MemoryFileSystem::new()),
    };
    match &cli.root {
        Some(root) => tracing::info!(root = %root.display(), "serving directory"),
        None => tracing::info!("serving in-memory filesystem"),
    }

    let mut server = Server::builder()
        .bind(SocketAddr::new(cli.host, cli.port))
        .server_limits(ServerLimits::with_requested_threads(cli.threads))
        .service(FilesService::shared(fs))
        .service(EchoService)
        .build();

    let addr = server.start()?;
    tracing::info!(addr = %addr, "type \"Stop\" to shut down");

    for line in io::stdin().lock().lines() {
        if line?.trim() == "Stop" {
            break;
        }
    }

    server.stop();
    Ok(())
}
