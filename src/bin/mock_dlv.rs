//! Mock Delve backend for integration testing
//!
//! Accepts the same command line as `dlv` and serves a small subset of the
//! v2 JSON API over HTTP, so the broker can be tested without a Go toolchain.
//!
//! Special targets change startup behavior:
//! - `exit-early`: exit with status 3 before listening
//! - `no-listen`: stay alive without listening; if a path follows `--`, the
//!   process ID is written there

use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const VERSION_TEXT: &str = "Delve Debugger\nVersion: 1.23.0-mock\nBuild: $Id: mock $\n";

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let Some(subcommand) = args.first() else {
        eprintln!("usage: mock_dlv <command> [flags] [target]");
        std::process::exit(2);
    };
    if subcommand == "version" {
        print!("{}", VERSION_TEXT);
        return;
    }

    let listen = args
        .iter()
        .find_map(|a| a.strip_prefix("--listen="))
        .unwrap_or("127.0.0.1:0")
        .to_string();
    let (before, after) = match args.iter().position(|a| a == "--") {
        Some(idx) => (&args[1..idx], &args[idx + 1..]),
        None => (&args[1..], &args[args.len()..]),
    };
    let target = before.iter().find(|a| !a.starts_with('-')).cloned();

    match target.as_deref() {
        Some("exit-early") => {
            eprintln!("could not launch process: exit-early");
            std::process::exit(3);
        }
        Some("no-listen") => {
            if let Some(path) = after.first() {
                std::fs::write(path, std::process::id().to_string()).ok();
            }
            loop {
                std::thread::sleep(Duration::from_secs(60));
            }
        }
        _ => {}
    }

    let listener = match TcpListener::bind(&listen) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("could not listen on {}: {}", listen, e);
            std::process::exit(1);
        }
    };
    println!("API server listening at: {}", listen);

    let state = Arc::new(Mutex::new(MockState::default()));
    for stream in listener.incoming().flatten() {
        let state = Arc::clone(&state);
        std::thread::spawn(move || serve(stream, &state));
    }
}

/// Answer one HTTP request and close the connection
fn serve(stream: TcpStream, state: &Mutex<MockState>) {
    let mut reader = BufReader::new(match stream.try_clone() {
        Ok(s) => s,
        Err(_) => return,
    });
    let mut writer = stream;

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).unwrap_or(0) == 0 {
        return; // readiness probe
    }

    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            return;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }

    let mut body = vec![0u8; content_length];
    if reader.read_exact(&mut body).is_err() {
        return;
    }
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    let path = request_line.split_whitespace().nth(1).unwrap_or("");
    let (status, reply) = match path.strip_prefix("/api/v2/") {
        Some(method) => match state.lock() {
            Ok(mut state) => state.handle(method, &body),
            Err(_) => (500, json!({"error": "mock state poisoned"})),
        },
        None => (404, json!({"error": format!("no handler for {}", path)})),
    };

    let text = reply.to_string();
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        _ => "Internal Server Error",
    };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        text.len(),
        text
    );
    writer.write_all(response.as_bytes()).ok();
    writer.flush().ok();
}

struct MockState {
    next_breakpoint: i64,
    breakpoints: HashMap<i64, (String, u32)>,
    file: String,
    line: u32,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            next_breakpoint: 1,
            breakpoints: HashMap::new(),
            file: "main.go".to_string(),
            line: 1,
        }
    }
}

impl MockState {
    fn handle(&mut self, method: &str, body: &Value) -> (u16, Value) {
        match method {
            "CreateBreakpoint" => self.create_breakpoint(body),
            "ClearBreakpoint" => self.clear_breakpoint(body),
            "Command" => self.command(body),
            "ListLocalVars" => (
                200,
                json!({"Variables": [
                    {"name": "x", "type": "int", "value": "41", "kind": 2},
                    {"name": "name", "type": "string", "value": "\"gopher\"", "kind": 24}
                ]}),
            ),
            "Eval" => self.eval(body),
            other => (404, json!({"error": format!("unknown method {}", other)})),
        }
    }

    fn create_breakpoint(&mut self, body: &Value) -> (u16, Value) {
        let (Some(file), Some(line)) = (body["file"].as_str(), body["line"].as_u64()) else {
            return (400, json!({"error": "file and line are required"}));
        };
        let line = line as u32;

        if let Some((id, _)) = self
            .breakpoints
            .iter()
            .find(|(_, (f, l))| f == file && *l == line)
        {
            return (
                500,
                json!({"error": format!("Breakpoint exists at {}:{} at {}", file, line, id)}),
            );
        }

        let id = self.next_breakpoint;
        self.next_breakpoint += 1;
        self.breakpoints.insert(id, (file.to_string(), line));
        (
            200,
            json!({"Breakpoint": {"id": id, "file": file, "line": line, "Cond": body["cond"]}}),
        )
    }

    fn clear_breakpoint(&mut self, body: &Value) -> (u16, Value) {
        let id = body["id"].as_i64().unwrap_or(-1);
        match self.breakpoints.remove(&id) {
            Some((file, line)) => (
                200,
                json!({"Breakpoint": {"id": id, "file": file, "line": line}}),
            ),
            None => (500, json!({"error": format!("Breakpoint {} not found", id)})),
        }
    }

    fn command(&mut self, body: &Value) -> (u16, Value) {
        match body["name"].as_str().unwrap_or("") {
            "continue" => {
                match self.breakpoints.values().min_by_key(|(_, l)| *l) {
                    Some((file, line)) => {
                        self.file = file.clone();
                        self.line = *line;
                    }
                    None => {
                        return (
                            200,
                            json!({"State": {"Running": false, "exited": true, "exitStatus": 0}}),
                        );
                    }
                }
            }
            "next" | "step" | "stepout" => self.line += 1,
            other => {
                return (500, json!({"error": format!("unknown command {}", other)}));
            }
        }
        (
            200,
            json!({"State": {
                "Running": false,
                "currentThread": {"id": 1, "file": self.file, "line": self.line},
                "exited": false,
                "exitStatus": 0
            }}),
        )
    }

    fn eval(&self, body: &Value) -> (u16, Value) {
        let expr = body["expr"].as_str().unwrap_or("");
        let value = match expr.replace(' ', "").as_str() {
            "x" => "41",
            "x+1" => "42",
            _ if expr.ends_with('+') => {
                return (500, json!({"error": format!("1:{}: expected operand", expr.len() + 1)}));
            }
            _ => {
                return (
                    500,
                    json!({"error": format!("could not find symbol value for {}", expr)}),
                );
            }
        };
        (
            200,
            json!({"Variable": {"name": expr, "type": "int", "value": value, "kind": 2}}),
        )
    }
}
