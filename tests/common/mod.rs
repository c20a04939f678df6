//! Fixtures shared by the root integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use codescope_core::CodescopeError;
use codescope_index::{Embedder, InputKind};

pub const AUTH: &str = "\
pub fn validate_token(token: &str) -> bool {
    !token.is_empty()
}
";

pub const BILLING: &str = "\
def charge_card(amount):
    return amount > 0
";

/// A small project: one Rust and one Python file.
pub fn project_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    write(dir.path(), "src/auth.rs", AUTH);
    write(dir.path(), "src/billing.py", BILLING);
    dir
}

pub fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

/// Maps every text to the same unit vector.
pub struct ConstantEmbedder;

#[async_trait]
impl Embedder for ConstantEmbedder {
    fn provider(&self) -> &str {
        "test:constant"
    }

    fn dimensions(&self) -> usize {
        2
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        _kind: InputKind,
    ) -> Result<Vec<Vec<f32>>, CodescopeError> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }
}

/// [`ConstantEmbedder`] vectors, counting every document text embedded.
#[derive(Default)]
pub struct CountingEmbedder {
    documents: AtomicUsize,
}

impl CountingEmbedder {
    pub fn documents(&self) -> usize {
        self.documents.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    fn provider(&self) -> &str {
        "test:constant"
    }

    fn dimensions(&self) -> usize {
        2
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        kind: InputKind,
    ) -> Result<Vec<Vec<f32>>, CodescopeError> {
        if kind == InputKind::Document {
            self.documents.fetch_add(texts.len(), Ordering::SeqCst);
        }
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }
}
