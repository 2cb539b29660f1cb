//! The install worker: answers one install request per message.

use serde_json::Value;

use crate::install::{InstallRequest, InstallResult, PackageManager};
use crate::ipc::{ChannelError, WorkerClient};
use crate::protocol::{INSTALL_REQUEST, INSTALL_RESULT, KILL_EVENT, QUIT_EVENT};

/// Serve install requests until the host says quit or disconnects.
///
/// # Errors
///
/// Returns an error if the channel cannot be opened or written.
pub async fn run() -> Result<(), ChannelError> {
    let mut client = WorkerClient::connect_from_env().await?;

    while let Some((event, args)) = client.next_event().await? {
        match event.as_str() {
            INSTALL_REQUEST => {
                let result = handle_request(args.into_iter().next()).await;
                client
                    .emit(INSTALL_RESULT, vec![serde_json::to_value(&result)?])
                    .await?;
            }
            QUIT_EVENT | KILL_EVENT => break,
            other => tracing::debug!(event = other, "Ignoring event"),
        }
    }
    Ok(())
}

async fn handle_request(payload: Option<Value>) -> InstallResult {
    let Some(payload) = payload else {
        return InstallResult::failed("Empty install request");
    };
    match serde_json::from_value::<InstallRequest>(payload) {
        Ok(request) => {
            println!("Checking dependencies in {}", request.path.display());
            PackageManager::new(&request).install_if_needed().await
        }
        Err(e) => InstallResult::failed(format!("Malformed install request: {e}")),
    }
}
