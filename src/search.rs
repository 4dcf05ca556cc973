//! `groundchat search`: inspect what retrieval returns for a query.

use anyhow::{bail, Result};
use groundchat_core::retrieval::Retriever;

use crate::config::Config;
use crate::embedding::create_provider;
use crate::index::create_index;

const EXCERPT_CHARS: usize = 240;

pub async fn run_search(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    if !config.embedding.is_enabled() {
        bail!("search requires embeddings. Set [embedding] provider in config.");
    }

    let k = k.unwrap_or(config.retrieval.top_k);
    if k == 0 {
        bail!("--k must be >= 1");
    }

    let retriever = Retriever::new(
        create_provider(&config.embedding)?,
        create_index(&config.index)?,
    );
    let results = retriever.search(query, k).await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!("{}. [{:.4}]", i + 1, result.score);
        println!("    excerpt: \"{}\"", excerpt(&result.text));
        println!();
    }
    Ok(())
}

/// Single-line excerpt, cut at a character boundary.
fn excerpt(text: &str) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    match flat.char_indices().nth(EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_flattens_and_cuts() {
        assert_eq!(excerpt("a\nb "), "a b");
        let long = "é".repeat(300);
        let cut = excerpt(&long);
        assert_eq!(cut.chars().count(), EXCERPT_CHARS + 3);
        assert!(cut.ends_with("..."));
    }
}
