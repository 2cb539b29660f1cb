//! Sample worker that echoes events back to the host.
//!
//! Handy for trying out a host by hand and used heavily by the tests:
//!
//! - `echo` is emitted back with the same arguments;
//! - `log` prints its arguments to stdout;
//! - `fail` prints its argument to stderr and exits with status 1;
//! - `quit` and `kill` end the worker, unless it is stubborn;
//! - anything else is answered with `received` carrying the event name.

use serde_json::Value;

use crate::ipc::{ChannelError, WorkerClient};
use crate::protocol::{KILL_EVENT, QUIT_EVENT};

/// Options for the echo worker.
#[derive(Debug, Clone, Default)]
pub struct EchoOptions {
    /// Ignore exit events and channel loss; only a kill ends the process.
    pub stubborn: bool,
    /// Launch parameters, reported in the `ready` event.
    pub args: Vec<String>,
}

/// Run the echo worker until told to stop. Returns the exit status.
///
/// # Errors
///
/// Returns an error if the channel cannot be opened or written.
pub async fn run(options: EchoOptions) -> Result<i32, ChannelError> {
    println!(
        "echo-worker started with {} argument(s): {}",
        options.args.len(),
        options.args.join(" ")
    );

    let mut client = WorkerClient::connect_from_env().await?;
    let ready = options.args.iter().cloned().map(Value::String).collect();
    client.emit("ready", vec![Value::Array(ready)]).await?;

    while let Some((event, args)) = client.next_event().await? {
        match event.as_str() {
            "echo" => client.emit("echo", args).await?,
            "log" => println!("{}", render_args(&args)),
            "fail" => {
                eprintln!("{}", render_args(&args));
                return Ok(1);
            }
            QUIT_EVENT | KILL_EVENT if options.stubborn => {
                println!("ignoring {event}");
            }
            QUIT_EVENT | KILL_EVENT => {
                println!("echo-worker exiting on {event}");
                return Ok(0);
            }
            other => {
                let mut reply = vec![Value::String(other.to_string())];
                reply.extend(args);
                client.emit("received", reply).await?;
            }
        }
    }

    if options.stubborn {
        println!("channel closed, staying alive");
        std::future::pending::<()>().await;
    }
    Ok(0)
}

/// Render event arguments as one line; strings are printed bare.
fn render_args(args: &[Value]) -> String {
    args.iter()
        .map(|arg| match arg {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn args_render_bare_strings() {
        assert_eq!(
            render_args(&[json!("boom"), json!(3), json!({"a": 1})]),
            r#"boom 3 {"a":1}"#
        );
        assert_eq!(render_args(&[]), "");
    }
}
