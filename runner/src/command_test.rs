use crate::command::{CommandLine, RemoteShell};

#[test]
pub fn local_background_job() {
    let command = CommandLine::new("bin/worker")
        .env("PATH", "/usr/bin")
        .arg("/data/run7/config.yaml")
        .arg("0")
        .redirect_output("/data/run7/logs/worker_0.log")
        .background();

    assert_eq!(
        command.render(),
        "PATH=/usr/bin bin/worker /data/run7/config.yaml 0 >/data/run7/logs/worker_0.log 2>&1 &"
    );
    assert_eq!(command.host(), None);
    assert!(command.is_background());
}

#[test]
pub fn remote_wraps_the_whole_command() {
    let command = CommandLine::new("bin/worker")
        .env("PATH", "/usr/bin")
        .arg("cfg.yaml")
        .arg("1")
        .redirect_output("/logs/worker_1.log")
        .background()
        .remote(&RemoteShell::default(), "box2");

    assert_eq!(
        command.render(),
        "ssh box2 'PATH=/usr/bin bin/worker cfg.yaml 1' >/logs/worker_1.log 2>&1 &"
    );
    assert_eq!(command.host(), Some("box2"));
}

#[test]
pub fn remote_shell_arguments() {
    let shell = RemoteShell {
        program: "ssh".to_string(),
        args: vec!["-x".to_string(), "-p".to_string(), "2222".to_string()],
    };
    let command = CommandLine::new("kill").arg("-9").arg("4242").remote(&shell, "box2");

    assert_eq!(command.render(), "ssh -x -p 2222 box2 'kill -9 4242'");
}

#[test]
pub fn values_are_quoted() {
    let command = CommandLine::new("bin/worker")
        .env("PYTHONPATH", "/opt/my lib")
        .arg("a b");

    assert_eq!(command.render(), "PYTHONPATH='/opt/my lib' bin/worker 'a b'");
}

#[test]
pub fn nested_quotes_survive_the_remote_shell() {
    let command = CommandLine::new("echo")
        .arg("a b")
        .remote(&RemoteShell::default(), "box2");

    assert_eq!(command.render(), r#"ssh box2 'echo '\''a b'\'''"#);
    assert_eq!(
        shell_words::split(&command.render()).unwrap(),
        vec!["ssh", "box2", "echo 'a b'"]
    );
}
