//! Line-oriented console. `stop` begins shutdown; anything else is reported
//! back as unknown.

use std::io::BufRead;

use tracing::info;

/// Reads stdin until a `stop` command (or EOF) arrives. Runs the blocking
/// reads on the blocking pool so the runtime stays free.
pub async fn wait_for_stop() {
    let _ = tokio::task::spawn_blocking(|| {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                return;
            };
            let command = line.trim();
            if command == "stop" {
                return;
            }
            if !command.is_empty() {
                info!("Unknown command: {command}");
            }
        }
    })
    .await;
}
