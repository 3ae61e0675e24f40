#![allow(dead_code)]

use ragstore::{Embedder, GenerateError, Generator, RagError, Result, Vector};
use std::sync::Mutex;
use std::time::Duration;

/// Counts of each letter a-z and digit 0-9, lowercased.
pub struct LetterEmbedder;

impl LetterEmbedder {
    fn embed_one(text: &str) -> Vector {
        let mut v = vec![0.0; 36];
        for c in text.to_lowercase().chars() {
            if c.is_ascii_lowercase() {
                v[(c as u8 - b'a') as usize] += 1.0;
            } else if c.is_ascii_digit() {
                v[26 + (c as u8 - b'0') as usize] += 1.0;
            }
        }
        v
    }
}

impl Embedder for LetterEmbedder {
    fn dim(&self) -> usize {
        36
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vector>> {
        Ok(texts.iter().map(|t| Self::embed_one(t)).collect())
    }
}

/// Emits vectors of a fixed, configurable length.
pub struct FixedDimEmbedder(pub usize);

impl Embedder for FixedDimEmbedder {
    fn dim(&self) -> usize {
        self.0
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vector>> {
        Ok(texts.iter().map(|_| vec![1.0; self.0]).collect())
    }
}

pub struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn dim(&self) -> usize {
        4
    }

    fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vector>> {
        Err(RagError::Embedding("model unavailable".to_string()))
    }
}

/// Records every prompt and answers with a fixed string.
#[derive(Default)]
pub struct RecordingGenerator {
    pub prompts: Mutex<Vec<String>>,
}

impl Generator for RecordingGenerator {
    fn generate(&self, prompt: &str) -> std::result::Result<String, GenerateError> {
        self.prompts
            .lock()
            .map_err(|e| GenerateError::Failed(e.to_string()))?
            .push(prompt.to_string());
        Ok("generated".to_string())
    }
}

pub struct BrokenGenerator;

impl Generator for BrokenGenerator {
    fn generate(&self, _prompt: &str) -> std::result::Result<String, GenerateError> {
        Err(GenerateError::Failed("upstream 500".to_string()))
    }
}

pub struct StalledGenerator;

impl Generator for StalledGenerator {
    fn generate(&self, _prompt: &str) -> std::result::Result<String, GenerateError> {
        Err(GenerateError::TimedOut(Duration::from_secs(30)))
    }
}

pub fn words(prefix: &str, n: usize) -> String {
    (0..n)
        .map(|i| format!("{prefix}{i}"))
        .collect::<Vec<_>>()
        .join(" ")
}
