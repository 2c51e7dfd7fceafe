use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::info;

use flaunch_core::{
    ipc::is_daemon_running as is_socket_live,
    rpc::{registry, CallPath, GrpcChannel},
    AppConfig, Bridge, DaemonClient, DaemonServer,
};

/// Get the PID file path
fn pid_file_path() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("flaunch")
        .join("daemon.pid")
}

/// Check if daemon is running
fn is_daemon_running() -> Option<u32> {
    let pid_path = pid_file_path();
    if !pid_path.exists() {
        return None;
    }

    let mut file = fs::File::open(&pid_path).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    let pid: u32 = contents.trim().parse().ok()?;

    // Check if process is still running
    #[cfg(unix)]
    {
        use std::process::Command;
        let output = Command::new("kill")
            .arg("-0")
            .arg(pid.to_string())
            .output()
            .ok()?;
        if output.status.success() {
            return Some(pid);
        }
    }

    // Process not running, clean up stale PID file
    let _ = fs::remove_file(&pid_path);
    None
}

/// Write PID file
fn write_pid_file() -> Result<()> {
    let pid_path = pid_file_path();
    if let Some(parent) = pid_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(&pid_path)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(())
}

/// Remove PID file
fn remove_pid_file() {
    let _ = fs::remove_file(pid_file_path());
}

/// Start the daemon
pub async fn start(config: Arc<AppConfig>) -> Result<()> {
    // Check if already running
    if let Some(pid) = is_daemon_running() {
        println!("Daemon is already running (PID: {})", pid);
        return Ok(());
    }

    // A bad endpoint or call name stops startup here, before anything listens
    let call = CallPath::parse(&config.rpc.call)?;
    let channel = GrpcChannel::from_config(&config.rpc)
        .with_context(|| format!("cannot use backend endpoint {}", config.rpc.endpoint))?;
    info!("Backend endpoint: {} (call: {})", channel.endpoint(), call);
    registry::install(Arc::new(channel));
    let bridge = Arc::new(Bridge::from_registry(call)?);

    println!("Starting flaunch daemon...");

    // Write PID file
    write_pid_file()?;

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Setup signal handlers for graceful shutdown
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal");
        let _ = shutdown_tx_clone.send(true);
    });

    let server = DaemonServer::new(bridge, &config);

    println!(
        "Daemon started (PID: {}). Press Ctrl+C or run 'flaunch daemon stop' to stop.",
        std::process::id()
    );
    println!("  Backend: {}", config.rpc.endpoint);
    println!("  Socket:  {}", server.socket_path().display());

    // Serve UI connections (blocks until shutdown)
    let result = server.run(shutdown_rx).await;

    // Cleanup
    registry::teardown();
    remove_pid_file();
    println!("Daemon stopped.");

    result.map_err(Into::into)
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(_) => {
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
}

/// Stop the daemon
pub async fn stop() -> Result<()> {
    match is_daemon_running() {
        Some(pid) => {
            println!("Stopping daemon (PID: {})...", pid);

            #[cfg(unix)]
            {
                use std::process::Command;
                let output = Command::new("kill")
                    .arg("-TERM")
                    .arg(pid.to_string())
                    .output()?;

                if output.status.success() {
                    // Wait a moment for graceful shutdown
                    tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;

                    // Check if still running
                    if is_daemon_running().is_none() {
                        println!("Daemon stopped successfully.");
                    } else {
                        // Force kill
                        let _ = Command::new("kill")
                            .arg("-9")
                            .arg(pid.to_string())
                            .output();
                        remove_pid_file();
                        println!("Daemon forcefully terminated.");
                    }
                } else {
                    println!("Failed to stop daemon. You may need to kill it manually: kill {}", pid);
                }
            }
        }
        None => {
            println!("Daemon is not running.");
        }
    }

    Ok(())
}

/// Show daemon status
pub async fn status(config: &AppConfig) -> Result<()> {
    match is_daemon_running() {
        Some(pid) => {
            println!("Daemon is running (PID: {})", pid);
            println!("PID file: {}", pid_file_path().display());
        }
        None => {
            println!("Daemon is not running.");
            return Ok(());
        }
    }

    let socket_path = config.socket_path();
    if !is_socket_live(&socket_path).await {
        println!("Socket {} is not answering.", socket_path.display());
        return Ok(());
    }

    let status = DaemonClient::new(socket_path).status().await?;
    println!(
        "Started: {}",
        status.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("Uptime: {} seconds", status.uptime_secs);
    println!("Backend: {} ({})", status.endpoint, status.call);
    println!("Active streams: {}", status.active_streams);

    Ok(())
}
