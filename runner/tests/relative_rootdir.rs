//! Changes the working directory of the test process, kept in its own test
//! binary so no other test observes it.

use fsjob_runner::{
    config::{local_hostname, propagated_env, Context, RunnerConfig},
    executors::{Executors, LocalExecutor},
    launcher::Launcher,
    waiter::{WaitOutcome, Waiter},
};
use std::{env, fs, os::unix::fs::PermissionsExt, path::Path, time::Duration};
use tempfile::tempdir;

const WORKER: &str = r#"#!/bin/sh
run_dir=$(dirname "$1")
echo "worker $2 starting in $(pwd)"
touch "$run_dir/logs/$(printf 'worker-s%04d' "$2").finished"
"#;

#[test]
fn launch_and_wait_with_a_relative_rootdir() {
    let dir = tempdir().unwrap();
    for sub in ["runs/r1/logs", "runs/r1/pids", "runs/bin"] {
        fs::create_dir_all(dir.path().join(sub)).unwrap();
    }
    fs::write(dir.path().join("runs/r1/config.yaml"), "workers: 2\n").unwrap();
    fs::write(dir.path().join("runs/r1/other.yaml"), "workers: 1\n").unwrap();

    let worker = dir.path().join("runs/bin/worker");
    fs::write(&worker, WORKER).unwrap();
    fs::set_permissions(&worker, fs::Permissions::from_mode(0o755)).unwrap();

    env::set_current_dir(dir.path()).unwrap();

    let config = RunnerConfig {
        rootdir: "runs".into(),
        rundir: "r1".into(),
        poll_interval_ms: 50,
        propagate_env: vec!["PATH".to_string()],
        ..RunnerConfig::default()
    };
    let context = Context::new(
        "tester",
        local_hostname().unwrap(),
        propagated_env(&config.propagate_env),
    )
    .unwrap();
    let mut launcher = Launcher::new(
        &config,
        context,
        Executors::Local(LocalExecutor::load(&config)),
    );

    launcher
        .launch("worker", &["local", "local"], Some(Path::new("runs/r1/other.yaml")))
        .unwrap();

    let cwd = env::current_dir().unwrap();
    let records = launcher.records();
    assert_eq!(records.len(), 2);
    for record in records {
        assert!(record.command.contains(&format!(
            " {} {} ",
            cwd.join("runs/r1/other.yaml").to_string_lossy(),
            record.index
        )));
        assert!(
            record.command.contains(&format!(
                ">{}",
                cwd.join(format!("runs/r1/logs/worker_{}.log", record.index))
                    .to_string_lossy()
            )),
            "{}",
            record.command
        );
    }

    let outcome = Waiter::new(&config)
        .with_deadline(Some(Duration::from_secs(10)))
        .wait(records)
        .unwrap();
    assert_eq!(outcome, WaitOutcome::Completed);

    for index in 0..2 {
        let log = dir.path().join(format!("runs/r1/logs/worker_{index}.log"));
        assert!(fs::read_to_string(&log)
            .unwrap()
            .contains(&format!("worker {index} starting")));
    }
}
