//! Content similarity
//!
//! Approximate duplicate detection over visible page text:
//! - Exact: identical normalized text (64-bit digest collision)
//! - Near: positional overlap of a short segment signature against the
//!   most recently indexed pages
//!
//! Missed duplicates are acceptable; false positives are kept rare by the
//! high overlap threshold.

use lru::LruCache;
use regex::Regex;
use serde::Serialize;
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::OnceLock;

use crate::config::SimilarityConfig;
use crate::util::fast_hash;

/// Maximum number of text segments in a signature (two hex chars each)
const SIGNATURE_SEGMENTS: usize = 32;

/// Relative length difference tolerated for a near-duplicate comparison
const LENGTH_TOLERANCE: f64 = 0.10;

static RE_NON_VISIBLE: OnceLock<Regex> = OnceLock::new();
static RE_TAG: OnceLock<Regex> = OnceLock::new();

/// Hash of a page's visible text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHash {
    /// Digest of the full normalized text
    pub digest: u64,
    /// Positional signature: one byte per text segment (at most 32), hex encoded
    pub signature: String,
    /// Length of the normalized text in bytes
    pub text_len: usize,
}

impl ContentHash {
    /// Hash raw HTML or plain text. Returns `None` when nothing visible remains.
    pub fn compute(content: &str) -> Option<Self> {
        let text = visible_text(content);
        if text.is_empty() {
            return None;
        }

        let bytes = text.as_bytes();
        let segments = bytes.len().min(SIGNATURE_SEGMENTS);
        let chunk = bytes.len().div_ceil(segments);
        let mut signature = String::with_capacity(segments * 2);
        for piece in bytes.chunks(chunk) {
            let byte = (xxhash_rust::xxh3::xxh3_64(piece) & 0xff) as u8;
            signature.push_str(&format!("{:02x}", byte));
        }

        Some(Self {
            digest: fast_hash(&text),
            signature,
            text_len: text.len(),
        })
    }

    /// Fraction of signature positions that agree
    pub fn positional_overlap(&self, other: &ContentHash) -> f64 {
        let width = self.signature.len().max(other.signature.len());
        if width == 0 {
            return 0.0;
        }
        let same = self
            .signature
            .bytes()
            .zip(other.signature.bytes())
            .filter(|(a, b)| a == b)
            .count();
        same as f64 / width as f64
    }

    fn comparable_length(&self, other: &ContentHash) -> bool {
        let longer = self.text_len.max(other.text_len) as f64;
        let shorter = self.text_len.min(other.text_len) as f64;
        longer == 0.0 || (longer - shorter) / longer <= LENGTH_TOLERANCE
    }
}

/// Strip scripts, styles and tags; collapse whitespace; lowercase
pub fn visible_text(content: &str) -> String {
    let non_visible = RE_NON_VISIBLE.get_or_init(|| {
        Regex::new(
            r"(?is)<script\b[^>]*>.*?</script>|<style\b[^>]*>.*?</style>|<noscript\b[^>]*>.*?</noscript>|<!--.*?-->",
        )
        .expect("valid regex")
    });
    let tag = RE_TAG.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));

    let stripped = non_visible.replace_all(content, " ");
    let stripped = tag.replace_all(&stripped, " ");
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Outcome of a similarity check
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityResult {
    pub is_duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}

impl SimilarityResult {
    fn unique() -> Self {
        Self {
            is_duplicate: false,
            similar_url: None,
            similarity: None,
        }
    }

    fn duplicate_of(url: &str, similarity: f64) -> Self {
        Self {
            is_duplicate: true,
            similar_url: Some(url.to_string()),
            similarity: Some(similarity),
        }
    }
}

#[derive(Debug, Clone)]
struct IndexedContent {
    url: String,
    hash: ContentHash,
}

/// Session-scoped index from content digest to the first URL that produced it.
///
/// A digest is never remapped: later pages with the same or similar content
/// are reported as duplicates instead.
pub struct ContentHashIndex {
    entries: LruCache<u64, IndexedContent>,
    recent: VecDeque<u64>,
    threshold: f64,
    recent_window: usize,
}

impl ContentHashIndex {
    pub fn new(config: &SimilarityConfig) -> Self {
        let cap = NonZeroUsize::new(config.max_entries.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(cap),
            recent: VecDeque::with_capacity(config.recent_window),
            threshold: config.threshold,
            recent_window: config.recent_window,
        }
    }

    /// Check `content` against the index and record it if it is new.
    pub fn check_content_similarity(&mut self, content: &str, url: &str) -> SimilarityResult {
        let hash = match ContentHash::compute(content) {
            Some(h) => h,
            None => return SimilarityResult::unique(),
        };

        if let Some(existing) = self.entries.peek(&hash.digest) {
            if existing.url == url {
                return SimilarityResult::unique();
            }
            return SimilarityResult::duplicate_of(&existing.url, 1.0);
        }

        let mut best: Option<(f64, &str)> = None;
        for digest in self.recent.iter().rev() {
            let Some(candidate) = self.entries.peek(digest) else {
                continue;
            };
            if candidate.url == url || !hash.comparable_length(&candidate.hash) {
                continue;
            }
            let overlap = hash.positional_overlap(&candidate.hash);
            if overlap >= self.threshold && best.map_or(true, |(b, _)| overlap > b) {
                best = Some((overlap, candidate.url.as_str()));
            }
        }

        if let Some((similarity, similar_url)) = best {
            let result = SimilarityResult::duplicate_of(similar_url, similarity);
            tracing::debug!("{} resembles {} ({:.2})", url, similar_url, similarity);
            return result;
        }

        self.index(hash, url);
        SimilarityResult::unique()
    }

    fn index(&mut self, hash: ContentHash, url: &str) {
        let digest = hash.digest;
        self.entries.put(
            digest,
            IndexedContent {
                url: url.to_string(),
                hash,
            },
        );
        self.recent.push_back(digest);
        while self.recent.len() > self.recent_window {
            self.recent.pop_front();
        }
    }

    /// Evict oldest entries until at most `max_entries` remain
    pub fn cleanup_old_hashes(&mut self, max_entries: usize) {
        let mut evicted = 0usize;
        while self.entries.len() > max_entries {
            if self.entries.pop_lru().is_none() {
                break;
            }
            evicted += 1;
        }
        if evicted > 0 {
            let entries = &self.entries;
            self.recent.retain(|d| entries.contains(d));
            tracing::debug!("Evicted {} content hashes", evicted);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.recent.clear();
    }
}
