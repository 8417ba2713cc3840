//! Page cache for oversized fetched content.
//!
//! Content is split once into contiguous slices of at most `max_length`
//! characters, so concatenating every page gives back the input exactly.
//! Entries are immutable and shared as `Arc`s: eviction only drops the
//! map's reference, and a reader holding the entry finishes against it.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PageError {
    #[error("page id not found or expired: {0}")]
    NotFound(String),

    #[error("page {requested} out of range (1-{total})")]
    OutOfRange { requested: usize, total: usize },
}

/// Result of storing a document
#[derive(Debug, Clone)]
pub struct StoredPages {
    pub page_id: String,
    pub total_pages: usize,
    pub total_length: usize,
    pub first_page: String,
}

#[derive(Debug)]
struct PageCacheEntry {
    source: Option<String>,
    pages: Vec<String>,
    total_length: usize,
    expires_at: Instant,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Arc<PageCacheEntry>>,
    /// Page ids, oldest created first
    order: VecDeque<String>,
}

pub struct ContentPaginator {
    state: RwLock<CacheState>,
    max_length: usize,
    ttl: Duration,
    capacity: usize,
}

impl ContentPaginator {
    pub fn new(max_length: usize, ttl: Duration, capacity: usize) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            max_length: max_length.max(1),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Split and cache `content` with the configured page length
    pub fn store(&self, content: &str) -> StoredPages {
        self.store_with(content, self.max_length, None)
    }

    /// Split and cache `content`, remembering where it came from
    pub fn store_with(&self, content: &str, max_length: usize, source: Option<&str>) -> StoredPages {
        let pages = split_into_pages(content, max_length.max(1));
        let now = Instant::now();
        let entry = Arc::new(PageCacheEntry {
            source: source.map(str::to_string),
            total_length: content.chars().count(),
            pages,
            expires_at: now + self.ttl,
        });

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        Self::purge_locked(&mut state, now);

        while state.order.len() >= self.capacity {
            if let Some(oldest) = state.order.pop_front() {
                state.entries.remove(&oldest);
                tracing::debug!(page_id = %oldest, "page cache full, evicted oldest entry");
            }
        }

        let mut page_id = Uuid::new_v4().to_string();
        while state.entries.contains_key(&page_id) {
            page_id = Uuid::new_v4().to_string();
        }

        state.entries.insert(page_id.clone(), Arc::clone(&entry));
        state.order.push_back(page_id.clone());
        drop(state);

        tracing::debug!(
            page_id = %page_id,
            total_pages = entry.pages.len(),
            total_length = entry.total_length,
            "content paginated"
        );

        StoredPages {
            page_id,
            total_pages: entry.pages.len(),
            total_length: entry.total_length,
            first_page: entry.pages.first().cloned().unwrap_or_default(),
        }
    }

    /// Page `page_number` (1-based) of a stored document
    pub fn get_page(&self, page_id: &str, page_number: usize) -> Result<String, PageError> {
        let entry = self.live_entry(page_id)?;
        let total = entry.pages.len();
        if page_number == 0 || page_number > total {
            return Err(PageError::OutOfRange {
                requested: page_number,
                total,
            });
        }
        Ok(entry.pages[page_number - 1].clone())
    }

    pub fn total_pages(&self, page_id: &str) -> Result<usize, PageError> {
        Ok(self.live_entry(page_id)?.pages.len())
    }

    /// Newest live entry stored for `source`, as `(page_id, total_pages)`
    pub fn find_by_source(&self, source: &str) -> Option<(String, usize)> {
        let now = Instant::now();
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.order.iter().rev().find_map(|id| {
            let entry = state.entries.get(id)?;
            (entry.expires_at > now && entry.source.as_deref() == Some(source))
                .then(|| (id.clone(), entry.pages.len()))
        })
    }

    /// Drop expired entries now instead of waiting for the next store
    pub fn purge_expired(&self) -> usize {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        Self::purge_locked(&mut state, Instant::now())
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.entries.clear();
        state.order.clear();
    }

    fn live_entry(&self, page_id: &str) -> Result<Arc<PageCacheEntry>, PageError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        match state.entries.get(page_id) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Arc::clone(entry)),
            _ => Err(PageError::NotFound(page_id.to_string())),
        }
    }

    // TTL is uniform, so creation order is also expiry order.
    fn purge_locked(state: &mut CacheState, now: Instant) -> usize {
        let mut purged = 0;
        while let Some(oldest) = state.order.front() {
            let expired = state
                .entries
                .get(oldest)
                .map_or(true, |entry| entry.expires_at <= now);
            if !expired {
                break;
            }
            if let Some(id) = state.order.pop_front() {
                state.entries.remove(&id);
                purged += 1;
            }
        }
        purged
    }
}

/// Split `content` into contiguous pages of at most `max_chars` characters
///
/// Breaks at the last paragraph break in the window, then line break,
/// sentence end, whitespace, and finally mid-word. A break is only taken
/// when it keeps at least half the window, so pages stay close to full.
pub fn split_into_pages(content: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut pages = Vec::new();
    let mut rest = content;

    loop {
        let Some((limit, _)) = rest.char_indices().nth(max_chars) else {
            pages.push(rest.to_string());
            break;
        };
        let cut = find_break(&rest[..limit]);
        pages.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }

    pages
}

fn find_break(window: &str) -> usize {
    let floor = window.len() / 2;
    let acceptable = |cut: usize| (cut > floor).then_some(cut);

    window
        .rfind("\n\n")
        .and_then(|pos| acceptable(pos + 2))
        .or_else(|| window.rfind('\n').and_then(|pos| acceptable(pos + 1)))
        .or_else(|| last_sentence_end(window).and_then(acceptable))
        .or_else(|| {
            window
                .char_indices()
                .rev()
                .find(|(_, c)| c.is_whitespace())
                .and_then(|(pos, c)| acceptable(pos + c.len_utf8()))
        })
        .unwrap_or(window.len())
}

/// Byte offset just past the last sentence terminator (and its trailing space)
fn last_sentence_end(window: &str) -> Option<usize> {
    let mut following: Option<(usize, char)> = None;
    for (i, c) in window.char_indices().rev() {
        match c {
            '。' | '！' | '？' => return Some(i + c.len_utf8()),
            '.' | '!' | '?' => {
                if let Some((j, next)) = following {
                    if next.is_whitespace() {
                        return Some(j + next.len_utf8());
                    }
                }
            }
            _ => {}
        }
        following = Some((i, c));
    }
    None
}
