//! Shared test infrastructure for integration tests.

use serde_json::{json, Value};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::{Arc, Mutex};
use std::thread;
use tempfile::TempDir;

/// Isolated prompts directory plus a clean environment for the binary.
pub struct TestFixture {
    pub temp: TempDir,
}

impl TestFixture {
    /// Create a prompts dir holding `grammars/<name>` for every rule.
    pub fn with_grammars(rules: &[(&str, &str)]) -> Self {
        let temp = TempDir::new().expect("create temp dir");
        let grammars = temp.path().join("prompts/grammars");
        std::fs::create_dir_all(&grammars).expect("create grammars dir");
        for (name, prompt) in rules {
            std::fs::write(grammars.join(name), prompt).expect("write grammar");
        }
        Self { temp }
    }

    pub fn prompts_dir(&self) -> PathBuf {
        self.temp.path().join("prompts")
    }

    /// Command for the binary with user config, proxies, and `TIMELESS_*`
    /// vars masked.
    pub fn command(&self) -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_timeless"));
        let home = self.temp.path().join("home");
        command
            .env("HOME", &home)
            .env("XDG_CONFIG_HOME", home.join(".config"))
            .env_remove("RUST_LOG")
            .env_remove("OPENAI_API_KEY");
        for key in [
            "TIMELESS_MODEL",
            "TIMELESS_BASE_URL",
            "TIMELESS_TEMPERATURE",
            "TIMELESS_TIMEOUT_SECS",
            "TIMELESS_PROMPTS_DIR",
            "HTTP_PROXY",
            "HTTPS_PROXY",
            "ALL_PROXY",
            "http_proxy",
            "https_proxy",
            "all_proxy",
        ] {
            command.env_remove(key);
        }
        command.arg("--prompts-dir").arg(self.prompts_dir());
        command
    }
}

#[allow(dead_code)]
pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[allow(dead_code)]
pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Canned HTTP answer from the stub chat endpoint.
#[derive(Clone)]
pub struct StubReply {
    pub status: u16,
    pub body: Value,
}

impl StubReply {
    /// Successful chat completion whose message content is `content` as JSON.
    pub fn completion(content: Value) -> Self {
        Self {
            status: 200,
            body: json!({
                "id": "chatcmpl-test",
                "object": "chat.completion",
                "choices": [{
                    "index": 0,
                    "message": {
                        "role": "assistant",
                        "content": content.to_string(),
                        "refusal": null
                    },
                    "finish_reason": "stop"
                }]
            }),
        }
    }

    pub fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: json!({ "error": { "message": message, "type": "invalid_request_error" } }),
        }
    }
}

/// Loopback HTTP server answering chat completions by requested schema name.
pub struct StubServer {
    pub base_url: String,
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl StubServer {
    pub fn spawn(translation: StubReply, classification: StubReply) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub server");
        let base_url = format!("http://{}", listener.local_addr().expect("local addr"));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let (translation, classification) = (translation.clone(), classification.clone());
                let seen = Arc::clone(&seen);
                thread::spawn(move || {
                    let body = read_request_body(&stream);
                    let reply = if body.contains("sentence_grammar") {
                        classification
                    } else {
                        translation
                    };
                    seen.lock().expect("requests lock").push(body);
                    write_response(stream, &reply);
                });
            }
        });
        Self { base_url, requests }
    }

    #[allow(dead_code)]
    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }
}

/// Loopback server that accepts connections and never answers.
pub struct SilentServer {
    pub base_url: String,
}

impl SilentServer {
    #[allow(dead_code)]
    pub fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind silent server");
        let base_url = format!("http://{}", listener.local_addr().expect("local addr"));
        thread::spawn(move || {
            let mut held = Vec::new();
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                held.push(stream);
            }
        });
        Self { base_url }
    }
}

/// Base URL of a loopback port with nothing listening on it.
#[allow(dead_code)]
pub fn closed_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind free port");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}")
}

fn read_request_body(mut stream: &TcpStream) -> String {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let read = stream.read(&mut chunk).expect("read request");
        if read == 0 {
            return String::new();
        }
        buffer.extend_from_slice(&chunk[..read]);
        if let Some(pos) = find(&buffer, b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let headers = String::from_utf8_lossy(&buffer[..header_end]).to_ascii_lowercase();
    let content_length = headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok());
    let chunked = headers.contains("transfer-encoding: chunked");
    loop {
        let body = &buffer[header_end..];
        let done = match content_length {
            Some(length) => body.len() >= length,
            None if chunked => body.ends_with(b"0\r\n\r\n"),
            None => true,
        };
        if done {
            break;
        }
        let read = stream.read(&mut chunk).expect("read request body");
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
    }
    String::from_utf8_lossy(&buffer[header_end..]).into_owned()
}

fn write_response(mut stream: TcpStream, reply: &StubReply) {
    let body = reply.body.to_string();
    let response = format!(
        "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        reply.status,
        body.len(),
        body
    );
    stream
        .write_all(response.as_bytes())
        .expect("write response");
    stream.flush().expect("flush response");
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[allow(dead_code)]
pub fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent directory");
    }
    std::fs::write(path, contents.as_bytes()).expect("write file");
}
