use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("generation failed: {0}")]
    Failed(String),

    #[error("generation timed out after {0:?}")]
    TimedOut(Duration),
}

/// Prompt to text.
pub trait Generator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, GenerateError>;
}

/// Stand-in used when no generator is configured; every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct MissingGenerator;

impl Generator for MissingGenerator {
    fn generate(&self, _prompt: &str) -> Result<String, GenerateError> {
        Err(GenerateError::Failed("no generator configured".to_string()))
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Pipes the prompt to an external command on stdin and returns its trimmed
/// stdout. The child is killed once `timeout` elapses.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandGenerator {
    /// Parses a whitespace-separated command line. Returns `None` if empty.
    pub fn from_command_line(command: &str, timeout: Duration) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            timeout,
        })
    }
}

impl Generator for CommandGenerator {
    fn generate(&self, prompt: &str) -> Result<String, GenerateError> {
        debug!(program = %self.program, "spawning generator command");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| GenerateError::Failed(format!("failed to spawn '{}': {e}", self.program)))?;

        let stdin = child.stdin.take();
        let prompt = prompt.to_string();
        let writer = thread::spawn(move || {
            if let Some(mut stdin) = stdin {
                // A child that exits without reading closes the pipe early.
                let _ = stdin.write_all(prompt.as_bytes());
            }
        });
        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(GenerateError::TimedOut(self.timeout));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(GenerateError::Failed(e.to_string())),
            }
        };

        let _ = writer.join();
        let output = stdout.join().unwrap_or_default();
        let errors = stderr.join().unwrap_or_default();

        if !status.success() {
            return Err(GenerateError::Failed(format!(
                "'{}' exited with {status}: {}",
                self.program,
                errors.trim()
            )));
        }
        let response = output.trim();
        if response.is_empty() {
            return Err(GenerateError::Failed("empty response".to_string()));
        }
        Ok(response.to_string())
    }
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut buf);
        }
        buf
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn echoes_through_cat() {
        let generator = CommandGenerator::from_command_line("cat", Duration::from_secs(5)).unwrap();
        assert_eq!(generator.generate("  hello there \n").unwrap(), "hello there");
    }

    #[test]
    fn non_zero_exit_fails() {
        let generator = CommandGenerator::from_command_line("false", Duration::from_secs(5)).unwrap();
        assert!(matches!(
            generator.generate("x"),
            Err(GenerateError::Failed(_))
        ));
    }

    #[test]
    fn slow_command_times_out() {
        let generator =
            CommandGenerator::from_command_line("sleep 5", Duration::from_millis(100)).unwrap();
        assert!(matches!(
            generator.generate("x"),
            Err(GenerateError::TimedOut(_))
        ));
    }

    #[test]
    fn blank_command_line_is_rejected() {
        assert!(CommandGenerator::from_command_line("   ", Duration::from_secs(1)).is_none());
    }

    #[test]
    fn missing_generator_always_fails() {
        assert!(matches!(
            MissingGenerator.generate("x"),
            Err(GenerateError::Failed(_))
        ));
    }
}
