//! End-to-end tests: a host server, a session client and real workers.

mod common;

use std::path::Path;
use std::time::Duration;

use script_host::protocol::{
    FrameLines, OutboundFrame, LIST_SCRIPTS, RUN_SCRIPT, SCRIPT_ENDED, SCRIPT_ERROR, SCRIPT_LOG,
    SCRIPT_RELOADED, SESSION_ENDED, STOP_SCRIPT, STOP_SESSION, UNWATCH_SCRIPT, WATCH_SCRIPT,
};
use script_host::transport::HostClient;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

use common::{write_echo_script, write_script, TestHost, WAIT};

/// Start a script and return the worker id from the ack.
async fn run_script(client: &mut HostClient, request: &str) -> u32 {
    let ack = client.emit_with_ack(RUN_SCRIPT, json!(request)).await.unwrap();
    let args = client.wait_for_ack(ack, WAIT).await.unwrap();
    let id = args[0].as_u64().expect("worker id");
    u32::try_from(id).unwrap()
}

/// Wait for the event named `name` and return its payload.
async fn wait_event(client: &mut HostClient, name: &str) -> Value {
    match client
        .wait_for(WAIT, |frame| frame.event_name() == Some(name))
        .await
        .unwrap_or_else(|e| panic!("waiting for {name}: {e}"))
    {
        OutboundFrame::Event { payload, .. } => payload,
        OutboundFrame::Ack { .. } => unreachable!(),
    }
}

/// Barrier: once this ack arrives, every earlier frame has been handled.
async fn list_scripts(client: &mut HostClient) -> Vec<Value> {
    let ack = client.emit_with_ack(LIST_SCRIPTS, Value::Null).await.unwrap();
    let args = client.wait_for_ack(ack, WAIT).await.unwrap();
    args[0].as_array().cloned().unwrap_or_default()
}

fn process_alive(id: u32) -> bool {
    Path::new("/proc").join(id.to_string()).exists()
}

#[tokio::test]
async fn run_script_passes_parameters_and_routes_events() {
    let host = TestHost::start();
    write_echo_script(host.scripts(), "echo.sh");
    let mut client = host.connect().await;

    let id = run_script(&mut client, r#"echo.sh|--name "two words""#).await;
    let ready = wait_event(&mut client, &format!("{id}@ready")).await;
    assert_eq!(ready, json!(["--name", "two words"]));

    client.emit(&format!("{id}@ping"), json!("x")).await.unwrap();
    let received = wait_event(&mut client, &format!("{id}@received")).await;
    assert_eq!(received, json!(["ping", "x"]));

    let workers = list_scripts(&mut client).await;
    assert_eq!(workers.len(), 1);
    assert_eq!(workers[0]["id"], json!(id));
}

#[tokio::test]
async fn stdout_lines_become_script_logs() {
    let host = TestHost::start();
    write_script(host.scripts(), "talk.sh", "echo first\necho second\nsleep 5");
    let mut client = host.connect().await;

    let id = run_script(&mut client, "talk.sh").await;
    assert_eq!(wait_event(&mut client, SCRIPT_LOG).await, json!(["first", id]));
    assert_eq!(wait_event(&mut client, SCRIPT_LOG).await, json!(["second", id]));
}

#[tokio::test]
async fn broadcast_reaches_every_worker_and_targeted_only_one() {
    let host = TestHost::start();
    write_echo_script(host.scripts(), "echo.sh");
    let mut client = host.connect().await;

    let a = run_script(&mut client, "echo.sh").await;
    let b = run_script(&mut client, "echo.sh").await;
    assert_ne!(a, b);
    // Ready events can arrive in either order.
    let mut pending = vec![format!("{a}@ready"), format!("{b}@ready")];
    while !pending.is_empty() {
        let frame = client
            .wait_for(WAIT, |frame| {
                frame
                    .event_name()
                    .is_some_and(|name| pending.iter().any(|p| p == name))
            })
            .await
            .unwrap();
        let name = frame.event_name().unwrap().to_string();
        pending.retain(|p| *p != name);
    }

    // Targeted at `a` only; `b` must see the marker first.
    client.emit(&format!("{a}@only-a"), json!(1)).await.unwrap();
    client.emit(&format!("{b}@marker"), json!(2)).await.unwrap();
    client.emit("hello", json!(3)).await.unwrap();

    let mut from_a = Vec::new();
    let mut from_b = Vec::new();
    while from_a.len() < 2 || from_b.len() < 2 {
        let frame = client.next_frame_timeout(WAIT).await.unwrap().unwrap();
        let OutboundFrame::Event { event, payload } = frame else {
            continue;
        };
        if event == format!("{a}@received") {
            from_a.push(payload);
        } else if event == format!("{b}@received") {
            from_b.push(payload);
        }
    }

    assert_eq!(from_a, vec![json!(["only-a", 1]), json!(["hello", 3])]);
    assert_eq!(from_b, vec![json!(["marker", 2]), json!(["hello", 3])]);
}

#[tokio::test]
async fn invalid_bytes_are_rejected_without_closing_session() {
    let host = TestHost::start();
    let stream = UnixStream::connect(host.handle.socket_path()).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut lines = FrameLines::new(reader);

    writer.write_all(b"{\"event\":\"x\xff\"}\n").await.unwrap();
    writer
        .write_all(b"{\"event\":\"list-scripts\",\"payload\":null,\"ack\":1}\n")
        .await
        .unwrap();

    let mut rejected = false;
    loop {
        let line = tokio::time::timeout(WAIT, lines.next_line())
            .await
            .expect("frame in time")
            .unwrap()
            .expect("session still open");
        match serde_json::from_slice::<OutboundFrame>(line).unwrap() {
            OutboundFrame::Event { event, payload } if event == "log" => {
                if payload
                    .as_str()
                    .is_some_and(|text| text.starts_with("Malformed frame"))
                {
                    rejected = true;
                }
            }
            OutboundFrame::Ack { ack: 1, args } => {
                assert_eq!(args, vec![json!([])]);
                break;
            }
            _ => {}
        }
    }
    assert!(rejected);
}

#[tokio::test]
async fn stop_script_ends_worker_once() {
    let host = TestHost::start();
    write_echo_script(host.scripts(), "echo.sh");
    let mut client = host.connect().await;

    let id = run_script(&mut client, "echo.sh").await;
    wait_event(&mut client, &format!("{id}@ready")).await;

    client.emit(STOP_SCRIPT, json!(id)).await.unwrap();
    assert_eq!(wait_event(&mut client, SCRIPT_ENDED).await, json!(id));
    assert!(list_scripts(&mut client).await.is_empty());

    // A second stop names a worker that is gone.
    client.emit(STOP_SCRIPT, json!(id.to_string())).await.unwrap();
    let log = wait_event(&mut client, "log").await;
    assert_eq!(
        log,
        json!(format!("{id} process no longer valid for termination"))
    );
}

#[tokio::test]
async fn failing_script_reports_stderr_before_ending() {
    let host = TestHost::start();
    write_script(host.scripts(), "crash.sh", "echo 'bad input' >&2\nexit 1");
    let mut client = host.connect().await;

    let id = run_script(&mut client, "crash.sh").await;
    let mut seen = Vec::new();
    loop {
        let frame = client.next_frame_timeout(WAIT).await.unwrap().unwrap();
        if let OutboundFrame::Event { event, payload } = frame {
            if event == SCRIPT_ERROR || event == SCRIPT_ENDED {
                seen.push((event.clone(), payload));
            }
            if event == SCRIPT_ENDED {
                break;
            }
        }
    }

    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].0, SCRIPT_ERROR);
    assert!(seen[0].1.as_str().unwrap().contains("bad input"));
    assert_eq!(seen[1], (SCRIPT_ENDED.to_string(), json!(id)));
}

#[tokio::test]
async fn clean_exit_sends_no_error() {
    let host = TestHost::start();
    write_script(host.scripts(), "quick.sh", "echo done >&2\nexit 0");
    let mut client = host.connect().await;

    let id = run_script(&mut client, "quick.sh").await;
    let frame = client
        .wait_for(WAIT, |frame| {
            matches!(frame.event_name(), Some(SCRIPT_ERROR | SCRIPT_ENDED))
        })
        .await
        .unwrap();
    assert_eq!(frame, OutboundFrame::event(SCRIPT_ENDED, json!(id)));
}

#[tokio::test]
async fn stop_session_stops_workers_and_closes() {
    let host = TestHost::start();
    write_echo_script(host.scripts(), "echo.sh");
    let mut client = host.connect().await;

    let id = run_script(&mut client, "echo.sh").await;
    wait_event(&mut client, &format!("{id}@ready")).await;

    client.emit(STOP_SESSION, json!("finished")).await.unwrap();
    assert_eq!(wait_event(&mut client, SESSION_ENDED).await, json!("finished"));

    // The host closes the connection after the shutdown delay.
    loop {
        match client.next_frame_timeout(WAIT).await.unwrap() {
            Some(_) => {}
            None => break,
        }
    }
    assert!(!process_alive(id));
}

#[tokio::test]
async fn disconnect_stops_workers() {
    let host = TestHost::start();
    write_echo_script(host.scripts(), "echo.sh");
    let mut client = host.connect().await;

    let id = run_script(&mut client, "echo.sh").await;
    wait_event(&mut client, &format!("{id}@ready")).await;
    assert!(process_alive(id));
    drop(client);

    let deadline = tokio::time::Instant::now() + WAIT;
    while process_alive(id) {
        assert!(tokio::time::Instant::now() < deadline, "worker outlived session");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn sessions_are_isolated() {
    let host = TestHost::start();
    write_echo_script(host.scripts(), "echo.sh");
    let mut first = host.connect().await;
    let mut second = host.connect().await;

    let id = run_script(&mut first, "echo.sh").await;
    wait_event(&mut first, &format!("{id}@ready")).await;

    assert!(list_scripts(&mut second).await.is_empty());
    assert_eq!(list_scripts(&mut first).await.len(), 1);
}

#[tokio::test]
async fn watched_script_reloads_only_on_real_change() {
    let host = TestHost::start();
    let script = write_echo_script(host.scripts(), "echo.sh");
    let original = std::fs::read_to_string(&script).unwrap();
    let mut client = host.connect().await;

    let old = run_script(&mut client, "echo.sh").await;
    wait_event(&mut client, &format!("{old}@ready")).await;

    let watch_ack = client.emit_with_ack(WATCH_SCRIPT, json!("echo.sh")).await.unwrap();
    list_scripts(&mut client).await;

    // Same bytes written again: no notification.
    std::fs::write(&script, &original).unwrap();
    let quiet = client
        .wait_for(Duration::from_millis(400), |frame| {
            matches!(frame, OutboundFrame::Ack { ack, .. } if *ack == watch_ack)
        })
        .await;
    assert!(quiet.is_err());

    std::fs::write(&script, format!("{original}# edited\n")).unwrap();
    let args = client.wait_for_ack(watch_ack, WAIT).await.unwrap();
    assert_eq!(args, vec![json!("echo.sh")]);
    assert_eq!(
        wait_event(&mut client, "script-changed:echo.sh").await,
        json!("echo.sh")
    );

    let reloaded = wait_event(&mut client, SCRIPT_RELOADED).await;
    let new = reloaded[1].as_u64().unwrap();
    assert_eq!(reloaded[0], json!(old));
    assert_ne!(new, u64::from(old));

    // The replacement is registered before the reload is announced.
    let workers = list_scripts(&mut client).await;
    assert_eq!(workers.len(), 1);
    assert_eq!(workers[0]["id"], json!(new));

    client.emit(UNWATCH_SCRIPT, json!("echo.sh")).await.unwrap();
}
