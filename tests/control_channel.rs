// tests/control_channel.rs

mod common;

use std::fs;
use std::time::Duration;

use common::{spawn_runner, with_timeout, Harness};
use deployer::control::SENTINEL;
use deployer::errors::DeployerError;
use deployer::exec::{DispatchEvent, Runner};
use deployer::types::{Command, ExitCode};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

fn sh(name: &str, script: &str) -> Command {
    Command::shell(name, script).unwrap()
}

/// Wait until the dispatcher has queued `name`.
async fn queued(harness: &Harness, name: &str) {
    while !harness.volume.queue_entry(name).exists() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn exit_zero_is_success_with_all_output() {
    let h = Harness::new();
    let runner = spawn_runner(h.volume.clone());

    let captured = with_timeout(h.dispatcher().capture(&sh("01-ok", "echo hello; echo world")))
        .await
        .unwrap();

    assert_eq!(captured.output, b"hello\nworld\n");
    assert_eq!(captured.code, ExitCode::SUCCESS);
    assert_eq!(fs::read_to_string(h.volume.status_path("01-ok")).unwrap(), "0");
    assert!(!h.volume.socket_path("01-ok").exists());

    h.volume.mark_complete().unwrap();
    with_timeout(runner).await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn non_zero_exit_is_an_outcome_not_an_error() {
    let h = Harness::new();
    let runner = spawn_runner(h.volume.clone());

    let captured = with_timeout(h.dispatcher().capture(&sh("01-fail", "echo failing; exit 37")))
        .await
        .unwrap();

    assert_eq!(captured.output, b"failing\n");
    assert_eq!(captured.code, ExitCode(37));
    assert!(!captured.code.is_success());

    h.volume.mark_complete().unwrap();
    with_timeout(runner).await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stderr_and_unterminated_tail_are_captured() {
    let h = Harness::new();
    let runner = spawn_runner(h.volume.clone());

    let captured = with_timeout(
        h.dispatcher()
            .capture(&sh("01-mixed", "echo out; echo err >&2; printf 'no newline'")),
    )
    .await
    .unwrap();

    assert_eq!(captured.output, b"out\nerr\nno newline\n");

    h.volume.mark_complete().unwrap();
    with_timeout(runner).await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn output_bytes_survive_unchanged() {
    let h = Harness::new();
    let runner = spawn_runner(h.volume.clone());

    let captured = with_timeout(
        h.dispatcher()
            .capture(&sh("01-binary", r"printf 'raw \377\376 byte\r\ntail\200'")),
    )
    .await
    .unwrap();

    assert_eq!(captured.output, b"raw \xff\xfe byte\r\ntail\x80\n");

    h.volume.mark_complete().unwrap();
    with_timeout(runner).await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn commands_run_in_the_release_workdir() {
    let h = Harness::new();
    let runner = spawn_runner(h.volume.clone());

    let captured = with_timeout(h.dispatcher().capture(&sh("01-pwd", "pwd -P")))
        .await
        .unwrap();

    let expected = fs::canonicalize(h.volume.workdir()).unwrap();
    let printed = String::from_utf8_lossy(&captured.output);
    assert_eq!(printed.trim_end(), expected.to_string_lossy());

    h.volume.mark_complete().unwrap();
    with_timeout(runner).await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn output_is_streamed_before_the_command_exits() {
    let h = Harness::new();
    let runner = spawn_runner(h.volume.clone());

    let mut events = with_timeout(
        h.dispatcher()
            .dispatch(&sh("01-slow", "echo first; sleep 0.5; echo second")),
    )
    .await
    .unwrap();

    match with_timeout(events.recv()).await {
        Some(DispatchEvent::Lines(group)) => assert_eq!(group.lines, vec![b"first".to_vec()]),
        other => panic!("expected the first line early, got {other:?}"),
    }
    assert!(!h.volume.status_path("01-slow").exists());

    let mut rest = Vec::new();
    loop {
        match with_timeout(events.recv()).await {
            Some(DispatchEvent::Lines(group)) => rest.extend(group.lines),
            Some(DispatchEvent::Finished(result)) => {
                assert_eq!(result.unwrap(), ExitCode::SUCCESS);
                break;
            }
            None => panic!("stream ended without an outcome"),
        }
    }
    assert_eq!(rest, vec![b"second".to_vec()]);

    h.volume.mark_complete().unwrap();
    with_timeout(runner).await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reusing_a_name_fails_fast() {
    let h = Harness::new();
    let runner = spawn_runner(h.volume.clone());
    let dispatcher = h.dispatcher();

    with_timeout(dispatcher.capture(&sh("01-once", "true")))
        .await
        .unwrap();

    match dispatcher.dispatch(&sh("01-once", "true")).await {
        Err(DeployerError::DuplicateCommand(name)) => assert_eq!(name, "01-once"),
        other => panic!("expected DuplicateCommand, got {other:?}"),
    }
    assert!(!h.volume.queue_entry("01-once").exists());

    h.volume.mark_complete().unwrap();
    with_timeout(runner).await.unwrap().unwrap();
}

#[tokio::test]
async fn accept_deadline_turns_a_hang_into_a_timeout() {
    let mut h = Harness::new();
    h.settings.dispatcher.accept_timeout_ms = Some(100);

    match h.dispatcher().dispatch(&sh("01-nobody", "true")).await {
        Err(DeployerError::Timeout { name, waiting_for, .. }) => {
            assert_eq!(name, "01-nobody");
            assert_eq!(waiting_for, "runner connection");
        }
        other => panic!("expected Timeout, got {other:?}"),
    }
    assert!(h.volume.queue_entry("01-nobody").exists());
    assert!(!h.volume.socket_path("01-nobody").exists());
}

#[tokio::test]
async fn consumed_entry_without_connect_blocks_the_dispatcher() {
    let h = Harness::new();
    let dispatcher = h.dispatcher();
    let pending = tokio::spawn(async move { dispatcher.dispatch(&sh("01-lost", "true")).await });

    with_timeout(queued(&h, "01-lost")).await;
    fs::remove_file(h.volume.queue_entry("01-lost")).unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!pending.is_finished());
    pending.abort();
}

#[tokio::test]
async fn malformed_status_is_a_hard_error() {
    let h = Harness::new();
    let dispatcher = h.dispatcher();
    let pending = tokio::spawn(async move { dispatcher.dispatch(&sh("01-odd", "true")).await });

    with_timeout(queued(&h, "01-odd")).await;
    fs::remove_file(h.volume.queue_entry("01-odd")).unwrap();
    let mut conn = UnixStream::connect(h.volume.socket_path("01-odd")).await.unwrap();
    conn.write_all(b"x\n").await.unwrap();
    fs::write(h.volume.status_path("01-odd"), "not a number").unwrap();
    drop(conn);

    let mut events = with_timeout(pending).await.unwrap().unwrap();
    match with_timeout(events.recv()).await {
        Some(DispatchEvent::Lines(group)) => assert_eq!(group.lines, vec![b"x".to_vec()]),
        other => panic!("expected output, got {other:?}"),
    }
    match with_timeout(events.recv()).await {
        Some(DispatchEvent::Finished(Err(DeployerError::MalformedStatus { name, content }))) => {
            assert_eq!(name, "01-odd");
            assert_eq!(content, "not a number");
        }
        other => panic!("expected MalformedStatus, got {other:?}"),
    }
}

#[tokio::test]
async fn status_deadline_turns_a_missing_artifact_into_a_timeout() {
    let mut h = Harness::new();
    h.settings.dispatcher.status_timeout_ms = Some(100);
    let dispatcher = h.dispatcher();
    let pending = tokio::spawn(async move { dispatcher.dispatch(&sh("01-mute", "true")).await });

    with_timeout(queued(&h, "01-mute")).await;
    let conn = UnixStream::connect(h.volume.socket_path("01-mute")).await.unwrap();
    drop(conn);

    let mut events = with_timeout(pending).await.unwrap().unwrap();
    match with_timeout(events.recv()).await {
        Some(DispatchEvent::Finished(Err(DeployerError::Timeout { waiting_for, .. }))) => {
            assert_eq!(waiting_for, "status artifact");
        }
        other => panic!("expected Timeout, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn runner_goes_in_name_order_and_stops_at_the_sentinel() {
    let h = Harness::new();
    let log = h.dir.path().join("order.log");
    let log = log.display();

    let first = {
        let dispatcher = h.dispatcher();
        let cmd = sh("a", &format!("sleep 0.2; echo a >> {log}"));
        tokio::spawn(async move { dispatcher.capture(&cmd).await })
    };
    let second = {
        let dispatcher = h.dispatcher();
        let a_status = h.volume.status_path("a");
        let cmd = sh(
            "b",
            &format!("test -f {} || exit 9; echo b >> {log}", a_status.display()),
        );
        tokio::spawn(async move { dispatcher.capture(&cmd).await })
    };
    with_timeout(queued(&h, "a")).await;
    with_timeout(queued(&h, "b")).await;
    h.volume.publish_entry(SENTINEL, b"").unwrap();
    h.volume.publish_entry("zzz", br#"["true"]"#).unwrap();

    let runner = spawn_runner(h.volume.clone());

    assert_eq!(with_timeout(first).await.unwrap().unwrap().code, ExitCode::SUCCESS);
    assert_eq!(with_timeout(second).await.unwrap().unwrap().code, ExitCode::SUCCESS);
    with_timeout(runner).await.unwrap().unwrap();

    assert_eq!(fs::read_to_string(h.dir.path().join("order.log")).unwrap(), "a\nb\n");
    assert!(h.volume.queue_entry("zzz").exists());
    assert!(!h.volume.status_path("zzz").exists());
}

#[tokio::test]
async fn runner_outlives_an_unlistable_queue() {
    let h = Harness::new();
    let commands = h.volume.commands_dir();
    fs::remove_dir(&commands).unwrap();
    fs::write(&commands, b"not a directory").unwrap();

    let runner = spawn_runner(h.volume.clone());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!runner.is_finished());

    fs::remove_file(&commands).unwrap();
    fs::create_dir(&commands).unwrap();
    h.volume.mark_complete().unwrap();
    with_timeout(runner).await.unwrap().unwrap();
}

#[tokio::test]
async fn runner_fails_when_no_one_listens() {
    let h = Harness::new();
    h.volume.publish_entry("01-orphan", br#"["true"]"#).unwrap();

    let result = with_timeout(Runner::new(h.volume.clone(), Duration::from_millis(10)).run()).await;

    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("connecting to"), "{err:#}");
    assert!(!h.volume.queue_entry("01-orphan").exists());
    assert!(!h.volume.status_path("01-orphan").exists());
}
