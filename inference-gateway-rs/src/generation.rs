// inference-gateway-rs/src/generation.rs
//
// Local text generation through the llama.cpp command line.
//
// Generation is CPU bound and blocking; callers run it on a dedicated worker
// thread (`tokio::task::spawn_blocking`). No timeout is enforced on the
// subprocess, so a hung model run holds its worker until it exits.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use resilience::{Error, ErrorKind, Result};
use tracing::debug;

/// Number of trailing stderr characters kept in execution errors
const STDERR_TAIL: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub max_tokens: u32,
    /// Worker threads for this run, read from the live tuning state
    pub threads: usize,
}

/// A blocking text-generation backend
pub trait TextGenerator: Send + Sync + 'static {
    fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// Runs `llama-cli` against a local GGUF model
#[derive(Debug, Clone)]
pub struct LlamaCliGenerator {
    binary: String,
    model_path: PathBuf,
    context_size: u32,
}

impl LlamaCliGenerator {
    pub fn new(binary: impl Into<String>, model_path: impl Into<PathBuf>, context_size: u32) -> Self {
        Self {
            binary: binary.into(),
            model_path: model_path.into(),
            context_size,
        }
    }

    fn command(&self, request: &GenerationRequest) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .arg("--model")
            .arg(&self.model_path)
            .arg("--threads")
            .arg(request.threads.max(1).to_string())
            .arg("--n-predict")
            .arg(request.max_tokens.to_string())
            .arg("--ctx-size")
            .arg(self.context_size.to_string())
            .arg("--no-display-prompt")
            // chat-template models otherwise start an interactive session and never exit
            .arg("-no-cnv")
            .arg("--prompt")
            .arg(chat_prompt(&request.prompt))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }
}

impl TextGenerator for LlamaCliGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<String> {
        if !self.model_path.is_file() {
            return Err(Error::new(
                ErrorKind::NotFound,
                format!("Model file not found at {}", self.model_path.display()),
            )
            .service("generate"));
        }

        debug!(
            binary = %self.binary,
            threads = request.threads,
            max_tokens = request.max_tokens,
            "Starting local generation"
        );

        // a missing executable is an execution fault; fetching the model would not fix it
        let output = self.command(request).output().map_err(|e| {
            Error::new(ErrorKind::Execution, format!("Failed to launch {}: {}", self.binary, e))
                .service("generate")
                .cause(e)
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::new(
                ErrorKind::Execution,
                format!("{} exited with {}: {}", self.binary, output.status, tail(&stderr, STDERR_TAIL)),
            )
            .service("generate"));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Wraps a user prompt in the Zephyr-style chat template used by TinyLlama chat models
pub fn chat_prompt(prompt: &str) -> String {
    format!("<|user|>\n{}</s>\n<|assistant|>\n", prompt)
}

fn tail(text: &str, max_chars: usize) -> &str {
    let text = text.trim();
    match text.char_indices().rev().nth(max_chars.saturating_sub(1)) {
        Some((idx, _)) if idx > 0 => &text[idx..],
        _ => text,
    }
}
