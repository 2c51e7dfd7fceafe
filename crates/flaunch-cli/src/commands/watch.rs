use anyhow::{bail, Result};

use flaunch_core::{ipc::StreamEvent, AppConfig, DaemonClient};

/// Trigger `count` streams through the daemon and print their events
pub async fn run(config: &AppConfig, count: usize) -> Result<()> {
    let client = DaemonClient::new(config.socket_path());
    let mut conn = client.connect().await?;

    for _ in 0..count {
        conn.trigger_stream().await?;
    }

    let mut finished = 0;
    let mut failed = 0;
    while finished < count {
        let Some(event) = conn.next_event().await? else {
            bail!("daemon closed the connection with {} streams still open", count - finished);
        };

        let short_id = event.stream_id().simple().to_string();
        let short_id = &short_id[..8];
        match event {
            StreamEvent::Message { payload, .. } => {
                if payload.description.is_empty() {
                    println!("[{}] {}", short_id, payload.text());
                } else {
                    println!("[{}] {} - {}", short_id, payload.text(), payload.description);
                }
            }
            StreamEvent::Completed { .. } => {
                println!("[{}] done", short_id);
                finished += 1;
            }
            StreamEvent::Failed { error, .. } => {
                eprintln!("[{}] connection lost: {}", short_id, error);
                finished += 1;
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} streams failed", failed, count);
    }
    Ok(())
}
