//! End-to-end tests for the fetcher binary
//!
//! Each test runs the real binary in a scratch directory with its own config.
//! Tests that stream talk to a one-shot HTTP server on localhost.

use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::thread::{self, JoinHandle};

use tempfile::TempDir;

/// Helper to get the fetcher binary path
fn fetcher_binary() -> PathBuf {
    // When running tests, the binary is in target/debug/fetcher
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // Remove test binary name
    path.pop(); // Remove deps
    path.push("fetcher");
    path
}

/// Scratch workspace with a config pointing logs and output inside it
struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new(endpoint: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let config = format!(
            r#"stream:
  endpoint: {endpoint}
  connect_timeout_secs: 5
  idle_timeout_secs: 10
output:
  path: {out}
log_file: {log}
log_level: debug
"#,
            endpoint = endpoint,
            out = dir.path().join("out.jsonl").display(),
            log = dir.path().join("fetcher.log").display(),
        );
        fs::write(dir.path().join("fetcher.yaml"), config).unwrap();
        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn output(&self) -> PathBuf {
        self.path().join("out.jsonl")
    }

    fn write_credentials(&self) -> PathBuf {
        let path = self.path().join("creds.json");
        fs::write(
            &path,
            r#"{"CONSUMER_KEY":"ckey1234","CONSUMER_SECRET":"csecret","ACCESS_TOKEN":"atoken5678","ACCESS_SECRET":"asecret"}"#,
        )
        .unwrap();
        path
    }

    fn write_terms(&self, content: &str) -> PathBuf {
        let path = self.path().join("hashtags.txt");
        fs::write(&path, content).unwrap();
        path
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(fetcher_binary())
            .current_dir(self.path())
            .env("FETCHER_CONFIG", self.path().join("fetcher.yaml"))
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG")
            .args(args)
            .output()
            .expect("Failed to execute fetcher")
    }
}

/// Serve one connection: read the request, answer with `status` and `body`, then close
fn serve_once(status: &'static str, body: String) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let endpoint = format!("http://{}/1.1/statuses/filter.json", listener.local_addr().unwrap());

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        let mut request = String::new();
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                content_length = value.trim().parse().unwrap();
            }
            request.push_str(&line);
            if line == "\r\n" || line.is_empty() {
                break;
            }
        }
        let mut form = vec![0u8; content_length];
        reader.read_exact(&mut form).unwrap();
        request.push_str(&String::from_utf8_lossy(&form));

        let mut stream = stream;
        write!(
            stream,
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n{}",
            status, body
        )
        .unwrap();
        stream.flush().unwrap();
        request
    });

    (endpoint, handle)
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn test_fetch_without_credentials_fails_before_creating_output() {
    let ws = Workspace::new("http://127.0.0.1:9/unused");
    let terms = ws.write_terms("#rust\n");

    let output = ws.run(&["fetch", "-f", terms.to_str().unwrap()]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("No credentials"), "stderr: {}", stderr(&output));
    assert!(!ws.output().exists());
}

#[test]
fn test_fetch_with_incomplete_credential_values_fails() {
    let ws = Workspace::new("http://127.0.0.1:9/unused");
    let terms = ws.write_terms("#rust\n");

    let output = ws.run(&["fetch", "-f", terms.to_str().unwrap(), "--consumer-key", "only-one"]);

    assert!(!output.status.success());
    assert!(!ws.output().exists());
}

#[test]
fn test_fetch_with_missing_terms_file_fails() {
    let ws = Workspace::new("http://127.0.0.1:9/unused");
    let creds = ws.write_credentials();

    let output = ws.run(&["fetch", "-c", creds.to_str().unwrap(), "-f", "does-not-exist.txt"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("terms file"), "stderr: {}", stderr(&output));
    assert!(!ws.output().exists());
}

#[test]
fn test_fetch_with_empty_terms_file_fails() {
    let ws = Workspace::new("http://127.0.0.1:9/unused");
    let creds = ws.write_credentials();
    let terms = ws.write_terms("\n  \n");

    let output = ws.run(&["fetch", "-c", creds.to_str().unwrap(), "-f", terms.to_str().unwrap()]);

    assert!(!output.status.success());
    assert!(!ws.output().exists());
}

#[test]
fn test_check_reports_inputs() {
    let ws = Workspace::new("http://127.0.0.1:9/unused");
    let creds = ws.write_credentials();
    let terms = ws.write_terms("#rust\n#tokio\n");

    let output = ws.run(&["check", "-c", creds.to_str().unwrap(), "-f", terms.to_str().unwrap()]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout.contains("Tracked terms: 2"));
    assert!(stdout.contains("#tokio"));
    assert!(stdout.contains("Languages: en"));
    // Secrets never reach the terminal
    assert!(!stdout.contains("csecret"));
    assert!(!stdout.contains("asecret"));
}

#[test]
fn test_check_saves_discrete_credentials_when_asked() {
    let ws = Workspace::new("http://127.0.0.1:9/unused");
    let terms = ws.write_terms("#rust\n");

    let output = ws.run(&[
        "check",
        "-f",
        terms.to_str().unwrap(),
        "--consumer-key",
        "ck",
        "--consumer-secret",
        "cs",
        "--access-token",
        "at",
        "--access-secret",
        "as",
        "--save-credentials",
    ]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let saved = fs::read_to_string(ws.path().join("twitter_credentials.json")).unwrap();
    assert!(saved.contains("\"CONSUMER_KEY\""));
    assert!(saved.contains("\"ck\""));
}

#[test]
fn test_fetch_appends_only_accepted_languages() {
    let body = [
        r#"{"id_str":"1","text":"first","lang":"en"}"#,
        "",
        r#"{"id_str":"2","text":"deuxieme","lang":"fr"}"#,
        "{broken",
        r#"{"limit":{"track":3}}"#,
        r#"{"id_str":"3","text":"third","lang":"en"}"#,
    ]
    .join("\r\n")
        + "\r\n";
    let (endpoint, server) = serve_once("200 OK", body);

    let ws = Workspace::new(&endpoint);
    let creds = ws.write_credentials();
    let terms = ws.write_terms("#rust\n#tokio\n");
    fs::write(ws.output(), "{\"id_str\":\"0\",\"lang\":\"en\"}\n").unwrap();

    let output = ws.run(&[
        "fetch",
        "-c",
        creds.to_str().unwrap(),
        "-f",
        terms.to_str().unwrap(),
        "--no-retry",
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let request = server.join().unwrap();
    assert!(request.starts_with("POST /1.1/statuses/filter.json"));
    assert!(request.contains("OAuth oauth_consumer_key=\"ckey1234\""));
    assert!(request.contains("track=%23rust%2C%23tokio"));
    assert!(request.contains("language=en"));

    let lines: Vec<String> = fs::read_to_string(ws.output())
        .unwrap()
        .lines()
        .map(String::from)
        .collect();
    assert_eq!(
        lines,
        vec![
            r#"{"id_str":"0","lang":"en"}"#,
            r#"{"id_str":"1","text":"first","lang":"en"}"#,
            r#"{"id_str":"3","text":"third","lang":"en"}"#,
        ]
    );

    let log = fs::read_to_string(ws.path().join("fetcher.log")).unwrap();
    assert!(log.contains("Opening session #1"));
}

#[test]
fn test_fetch_stops_on_authentication_failure() {
    let (endpoint, server) = serve_once("401 Unauthorized", "Unauthorized".to_string());

    let ws = Workspace::new(&endpoint);
    let creds = ws.write_credentials();
    let terms = ws.write_terms("#rust\n");

    // Default policy does not reconnect after an authentication failure
    let output = ws.run(&["fetch", "-c", creds.to_str().unwrap(), "-f", terms.to_str().unwrap()]);
    server.join().unwrap();

    assert!(!output.status.success());
    assert!(stderr(&output).contains("401"), "stderr: {}", stderr(&output));
    assert_eq!(fs::read_to_string(ws.output()).unwrap(), "");
}

#[test]
fn test_completions() {
    let output = Command::new(fetcher_binary())
        .args(["completions", "bash"])
        .output()
        .expect("Failed to execute fetcher");

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("fetcher"));
}
