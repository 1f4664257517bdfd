//! Test-only builders and scripted fakes for the I/O seams.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use anyhow::{Result, anyhow};

use crate::core::types::{Command, ExecutionRecord, Plan};
use crate::io::health::HealthProbe;
use crate::io::llm::{CompletionClient, CompletionRequest};
use crate::io::process::{CommandOutput, CommandRunner};

/// A command with a fixed rationale.
pub fn cmd(text: &str) -> Command {
    Command {
        text: text.to_string(),
        rationale: format!("{text} rationale"),
    }
}

/// A plan with the given command texts in order.
pub fn plan_of(texts: &[&str]) -> Plan {
    Plan::new("summary", texts.iter().map(|t| cmd(t)).collect(), "notes")
}

/// A record with a fixed timestamp and goal and empty previews.
pub fn record(command: &str, exit_code: i32) -> ExecutionRecord {
    ExecutionRecord {
        timestamp: "2026-01-01T00:00:00".to_string(),
        goal: "goal".to_string(),
        command: command.to_string(),
        exit_code,
        stdout_preview: String::new(),
        stderr_preview: String::new(),
    }
}

/// A finished command's output with nothing truncated.
pub fn output(exit_code: i32, stdout: &str, stderr: &str) -> CommandOutput {
    CommandOutput {
        exit_code,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        stdout_truncated: 0,
        stderr_truncated: 0,
        timed_out: false,
    }
}

/// Health probe answering from a script; `false` once the script runs out.
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    answers: RefCell<VecDeque<bool>>,
    fallback: bool,
    calls: Cell<u32>,
}

impl ScriptedProbe {
    pub fn new(answers: Vec<bool>) -> Self {
        Self {
            answers: RefCell::new(answers.into()),
            fallback: false,
            calls: Cell::new(0),
        }
    }

    pub fn always(answer: bool) -> Self {
        Self {
            answers: RefCell::new(VecDeque::new()),
            fallback: answer,
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.get()
    }
}

impl HealthProbe for ScriptedProbe {
    fn check(&self, _url: &str) -> bool {
        self.calls.set(self.calls.get() + 1);
        self.answers.borrow_mut().pop_front().unwrap_or(self.fallback)
    }
}

/// Command runner returning queued outputs and recording what it was asked to run.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    outputs: RefCell<VecDeque<CommandOutput>>,
    error: Option<String>,
    commands: RefCell<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new(outputs: Vec<CommandOutput>) -> Self {
        Self {
            outputs: RefCell::new(outputs.into()),
            ..Self::default()
        }
    }

    /// A runner whose every call fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, command: &str) -> Result<CommandOutput> {
        self.commands.borrow_mut().push(command.to_string());
        if let Some(message) = &self.error {
            return Err(anyhow!("{message}"));
        }
        self.outputs
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted output left for `{command}`"))
    }
}

/// Completion client replaying queued replies (`Err` strings become errors).
#[derive(Debug, Default)]
pub struct ScriptedClient {
    replies: RefCell<VecDeque<Result<String, String>>>,
    requests: RefCell<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    pub fn new(replies: Vec<Result<String, String>>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.borrow().clone()
    }
}

impl CompletionClient for ScriptedClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests.borrow_mut().push(request.clone());
        match self.replies.borrow_mut().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(anyhow!("{message}")),
            None => Err(anyhow!("no scripted reply left")),
        }
    }
}

/// Serve one chat-completions reply per connection, in order, on localhost.
///
/// Returns the API base URL to put in `planner.api_base`.
pub fn serve_chat_replies(replies: Vec<String>) -> String {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake chat server");
    let port = listener.local_addr().expect("fake chat server addr").port();
    std::thread::spawn(move || {
        for content in replies {
            let Ok((stream, _)) = listener.accept() else {
                return;
            };
            let mut reader = BufReader::new(stream);
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
                    break;
                }
                if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap_or(0);
                }
            }
            let mut body = vec![0u8; content_length];
            let _ = reader.read_exact(&mut body);

            let payload = serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": content}}]
            })
            .to_string();
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
                payload.len()
            );
            let mut stream = reader.into_inner();
            let _ = stream.write_all(response.as_bytes());
        }
    });
    format!("http://127.0.0.1:{port}/v1")
}
