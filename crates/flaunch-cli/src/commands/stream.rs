use std::sync::Arc;

use anyhow::{bail, Result};

use flaunch_core::{
    relay::{LogSink, Sink, StreamState},
    rpc::{CallPath, GrpcChannel},
    AppConfig, Bridge,
};

/// Open one stream in-process and log what arrives
pub async fn run(config: &AppConfig) -> Result<()> {
    let call = CallPath::parse(&config.rpc.call)?;
    let channel = GrpcChannel::from_config(&config.rpc)?;
    println!("Streaming {} from {}...\n", call, channel.endpoint());

    let bridge = Bridge::new(Arc::new(channel), call);
    let outcome = bridge
        .run(|id| Arc::new(LogSink::new(id)) as Arc<dyn Sink>)
        .await;

    match outcome.state {
        StreamState::Completed => {
            println!("\nStream complete. {} messages received.", outcome.delivered);
            Ok(())
        }
        _ => {
            let reason = outcome
                .failure
                .map(|f| f.message)
                .unwrap_or_else(|| "unknown error".to_string());
            bail!(
                "stream failed after {} messages: {}",
                outcome.delivered,
                reason
            )
        }
    }
}
