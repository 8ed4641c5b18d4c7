#![cfg(all(unix, feature = "cli"))]

use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/svcbus-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn wait_for_socket(path: &Path, timeout: Duration) {
    let start = Instant::now();
    loop {
        if UnixStream::connect(path).is_ok() {
            return;
        }
        if start.elapsed() >= timeout {
            panic!("socket {} never became connectable", path.display());
        }
        thread::sleep(Duration::from_millis(25));
    }
}

/// A running `svcbus serve`, killed and cleaned up on drop.
struct Server {
    child: Child,
    dir: PathBuf,
    socket: PathBuf,
}

impl Server {
    fn start(tag: &str, extra: &[&str]) -> Self {
        let dir = unique_temp_dir(tag);
        let socket = dir.join("svcbus.sock");
        let child = Command::new(env!("CARGO_BIN_EXE_svcbus"))
            .args(["--log-level", "error", "serve"])
            .arg(&socket)
            .args(extra)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("serve should start");
        wait_for_socket(&socket, Duration::from_secs(3));
        Self { child, dir, socket }
    }

    fn run(&self, args: &[&str]) -> Output {
        let (command, rest) = args.split_first().expect("command name");
        Command::new(env!("CARGO_BIN_EXE_svcbus"))
            .args(["--log-level", "error", "--format", "json", command])
            .arg(&self.socket)
            .args(rest)
            .output()
            .expect("command should run")
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

#[test]
fn version_prints_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_svcbus"))
        .arg("version")
        .output()
        .expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("svcbus {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn call_add_prints_result() {
    let server = Server::start("add", &[]);
    let output = server.run(&["call", "math.add", "--args", "[2,3]"]);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let line: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be one JSON object");
    assert_eq!(line["kind"], "result");
    assert_eq!(line["name"], "math.add");
    assert_eq!(line["value"], 5);
}

#[test]
fn division_by_zero_exits_1() {
    let server = Server::start("divide", &[]);
    let output = server.run(&["call", "math.divide", "--args", "[1,0]"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("division by zero"), "stderr: {stderr}");
}

#[test]
fn unknown_method_exits_1() {
    let server = Server::start("missing", &[]);
    let output = server.run(&["call", "math.missing"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown method"), "stderr: {stderr}");
}

#[test]
fn non_array_args_exit_64() {
    let server = Server::start("usage", &[]);
    let output = server.run(&["call", "math.add", "--args", "{\"a\":1}"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn listen_prints_requested_number_of_ticks() {
    let server = Server::start("listen", &["--interval", "20ms"]);
    let output = server.run(&["listen", "clock.tick", "--count", "2"]);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let events: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line should be JSON"))
        .collect();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|event| event["kind"] == "event"));
    assert!(events[0]["value"].as_u64() < events[1]["value"].as_u64());
}

#[test]
fn listen_ends_when_event_completes() {
    let server = Server::start("complete", &["--interval", "20ms", "--ticks", "3"]);
    let output = server.run(&["listen", "clock.tick"]);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.lines().count() <= 3);
}

#[test]
fn call_against_missing_socket_exits_3() {
    let dir = unique_temp_dir("nosock");
    let output = Command::new(env!("CARGO_BIN_EXE_svcbus"))
        .args(["--log-level", "error", "call"])
        .arg(dir.join("absent.sock"))
        .arg("math.add")
        .output()
        .expect("call should run");

    assert_eq!(output.status.code(), Some(3));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn serve_reads_socket_path_from_environment() {
    let dir = unique_temp_dir("env");
    let socket = dir.join("env.sock");
    let mut child = Command::new(env!("CARGO_BIN_EXE_svcbus"))
        .env("SVCBUS_SOCKET", &socket)
        .args(["--log-level", "error", "serve"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("serve should start");
    wait_for_socket(&socket, Duration::from_secs(3));

    let output = Command::new(env!("CARGO_BIN_EXE_svcbus"))
        .args(["--log-level", "error", "--format", "json", "call"])
        .arg(&socket)
        .args(["math.multiply", "--args", "[6,7]"])
        .output()
        .expect("call should run");

    let _ = child.kill();
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(&dir);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let line: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json output");
    assert_eq!(line["value"], 42);
}
