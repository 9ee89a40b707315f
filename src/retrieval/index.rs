// SPDX-License-Identifier: MIT

//! Markdown document index for research context.
//!
//! Loads `*.md` files from a docs directory, splits them into overlapping
//! chunks on heading/paragraph boundaries, and tags each chunk with the
//! company code encoded in the `CODE_rest.md` filename convention. Queries
//! are ranked by term overlap; this is deliberately not a real vector
//! index, and the [`Retriever`] trait is the contract the rest of the
//! system depends on.

use super::{Retriever, Snippet};
use crate::error::RetrievalError;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

const CHUNK_SIZE: usize = 1000;
const MIN_TERM_LEN: usize = 3;

#[derive(Debug, Clone)]
struct Chunk {
    text: String,
    source: String,
    company_code: Option<String>,
    terms: HashSet<String>,
}

/// Counts reported by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub documents: usize,
    pub chunks: usize,
}

pub struct DocIndex {
    chunks: Vec<Chunk>,
    documents: usize,
}

impl DocIndex {
    /// Build an index from every markdown file in `dir`. A missing or empty
    /// directory yields an empty index rather than an error.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, RetrievalError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            log::warn!("Docs directory {:?} not found, starting with empty index", dir);
            return Ok(Self {
                chunks: vec![],
                documents: 0,
            });
        }

        let mut chunks = Vec::new();
        let mut documents = 0;

        let mut entries: Vec<_> = fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "md"))
            .collect();
        entries.sort();

        for path in entries {
            let text = match fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    log::warn!("Skipping unreadable document {:?}: {}", path, e);
                    continue;
                }
            };
            let source = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let company_code = company_from_filename(&source);

            for piece in chunk_markdown(&text, CHUNK_SIZE) {
                let terms = tokenize(&piece);
                chunks.push(Chunk {
                    text: piece,
                    source: source.clone(),
                    company_code: company_code.clone(),
                    terms,
                });
            }
            documents += 1;
        }

        log::info!(
            "Indexed {} chunks from {} documents in {:?}",
            chunks.len(),
            documents,
            dir
        );

        Ok(Self { chunks, documents })
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            documents: self.documents,
            chunks: self.chunks.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[async_trait]
impl Retriever for DocIndex {
    async fn search(
        &self,
        query: &str,
        company_code: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<Snippet>, RetrievalError> {
        let query_terms = tokenize(query);
        if query_terms.is_empty() {
            return Ok(vec![]);
        }

        let mut scored: Vec<(f32, &Chunk)> = self
            .chunks
            .iter()
            .filter(|c| match company_code {
                Some(code) => c.company_code.as_deref() == Some(code),
                None => true,
            })
            .filter_map(|c| {
                let overlap = query_terms.intersection(&c.terms).count();
                if overlap == 0 {
                    None
                } else {
                    Some((overlap as f32 / query_terms.len() as f32, c))
                }
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let results: Vec<Snippet> = scored
            .into_iter()
            .take(top_k)
            .map(|(score, c)| Snippet {
                text: c.text.clone(),
                source: c.source.clone(),
                company_code: c.company_code.clone(),
                score,
            })
            .collect();

        log::info!(
            "Found {} snippets for query: {:.50}",
            results.len(),
            query
        );
        Ok(results)
    }
}

/// Company code from the `CODE_rest.md` filename convention, e.g.
/// `AAPL_overview.md` → `AAPL`. Files without an underscore carry no code.
fn company_from_filename(name: &str) -> Option<String> {
    let stem = name.strip_suffix(".md").unwrap_or(name);
    if !stem.contains('_') {
        return None;
    }
    stem.split('_').next().map(|s| s.to_string())
}

/// Split markdown into chunks of roughly `chunk_size` characters, breaking
/// on heading and paragraph boundaries.
fn chunk_markdown(text: &str, chunk_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for block in text.split("\n\n") {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }

        let starts_section = block.starts_with('#');
        if !current.is_empty() && (starts_section || current.len() + block.len() > chunk_size) {
            chunks.push(std::mem::take(&mut current));
        }

        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(block);
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= MIN_TERM_LEN)
        .map(|t| t.to_lowercase())
        .collect()
}
