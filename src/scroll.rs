//! Scroll Manager (C7, spec §4.7).
//!
//! Process-wide singleton mapping scroll-id (UUID) to cursor. Grounded on the
//! teacher's `SessionManager`: a `parking_lot::RwLock<HashMap<..>>` guarding
//! per-entry state, idle/TTL-based reaping via a background sweep, writer-held
//! during create/update/delete, reader-held during get.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::agg::AggNode;
use crate::engine::SortField;
use crate::error::{Error, Result};
use crate::query::QueryNode;
use crate::value::Value;

const DEFAULT_TTL: Duration = Duration::from_secs(60);
const MAX_TTL: Duration = Duration::from_secs(3600);

/// A scroll cursor: enough state to resume a search at its next page.
#[derive(Debug, Clone)]
pub struct ScrollCursor {
    pub id: String,
    pub index: String,
    pub query: QueryNode,
    pub sort: Vec<SortField>,
    pub source_includes: Vec<String>,
    pub size: usize,
    pub from: usize,
    pub aggs: Vec<AggNode>,
    pub last_sort: Option<Vec<Value>>,
    ttl: Duration,
    created_at: Instant,
    last_touched: Instant,
}

impl ScrollCursor {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.last_touched) >= self.ttl
    }

    /// Whether the next page should use search_after (vs. from-pagination),
    /// per spec §4.7: search_after if `last_sort` is set, or on the first page.
    pub fn use_search_after(&self) -> bool {
        self.last_sort.is_some() || self.from == 0
    }
}

/// Parses a TTL string of the form `<int><unit>`, unit in {s,m,h,d}, case-insensitive.
/// Defaults to 1 minute when absent, hard-capped at 1 hour.
pub fn parse_ttl(input: Option<&str>) -> Result<Duration> {
    let Some(input) = input else { return Ok(DEFAULT_TTL) };
    let input = input.trim();
    if input.is_empty() {
        return Ok(DEFAULT_TTL);
    }
    let unit_char = input
        .chars()
        .last()
        .ok_or_else(|| Error::BadRequest(format!("invalid scroll ttl: {input}")))?;
    let (digits, unit_secs) = match unit_char.to_ascii_lowercase() {
        's' => (&input[..input.len() - 1], 1u64),
        'm' => (&input[..input.len() - 1], 60u64),
        'h' => (&input[..input.len() - 1], 3600u64),
        'd' => (&input[..input.len() - 1], 86_400u64),
        _ => (input, 1u64),
    };
    let amount: u64 = digits
        .parse()
        .map_err(|_| Error::BadRequest(format!("invalid scroll ttl: {input}")))?;
    if amount == 0 {
        return Err(Error::BadRequest("scroll ttl must be greater than zero".to_string()));
    }
    let secs = amount.saturating_mul(unit_secs);
    Ok(Duration::from_secs(secs).min(MAX_TTL))
}

pub struct ScrollManager {
    cursors: RwLock<HashMap<String, ScrollCursor>>,
}

impl ScrollManager {
    pub fn new() -> Self {
        Self { cursors: RwLock::new(HashMap::new()) }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &self,
        index: &str,
        query: QueryNode,
        sort: Vec<SortField>,
        size: usize,
        source_includes: Vec<String>,
        aggs: Vec<AggNode>,
        ttl: Duration,
    ) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Instant::now();
        let cursor = ScrollCursor {
            id: id.clone(),
            index: index.to_string(),
            query,
            sort,
            source_includes,
            size,
            from: 0,
            aggs,
            last_sort: None,
            ttl,
            created_at: now,
            last_touched: now,
        };
        self.cursors.write().insert(id.clone(), cursor);
        id
    }

    /// Returns a clone of the cursor, re-validating its TTL. Expired cursors
    /// are deleted as a side effect of the lookup.
    pub fn get(&self, id: &str) -> Result<ScrollCursor> {
        let now = Instant::now();
        {
            let cursors = self.cursors.read();
            let cursor = cursors.get(id).ok_or_else(|| Error::ScrollNotFound(id.to_string()))?;
            if !cursor.is_expired(now) {
                return Ok(cursor.clone());
            }
        }
        self.cursors.write().remove(id);
        Err(Error::ScrollExpired(id.to_string()))
    }

    /// Advances a cursor after a page has been served.
    ///
    /// `last_sort = Some(..)` keeps `from` fixed (search_after mode); `None`
    /// advances `from += size` (from-mode).
    pub fn update(&self, id: &str, last_sort: Option<Vec<Value>>) -> Result<()> {
        let mut cursors = self.cursors.write();
        let cursor = cursors.get_mut(id).ok_or_else(|| Error::ScrollNotFound(id.to_string()))?;
        if cursor.is_expired(Instant::now()) {
            cursors.remove(id);
            return Err(Error::ScrollExpired(id.to_string()));
        }
        match last_sort {
            Some(sort) => cursor.last_sort = Some(sort),
            None => {
                cursor.from += cursor.size;
                cursor.last_sort = None;
            }
        }
        cursor.last_touched = Instant::now();
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        self.cursors.write().remove(id).map(|_| ()).ok_or_else(|| Error::ScrollNotFound(id.to_string()))
    }

    /// Sweeps expired cursors. Intended to be called by a periodic background task
    /// (every 1 minute per spec §4.7).
    pub fn reap_expired(&self) -> usize {
        let now = Instant::now();
        let mut cursors = self.cursors.write();
        let before = cursors.len();
        cursors.retain(|_, cursor| !cursor.is_expired(now));
        before - cursors.len()
    }

    pub fn cursor_count(&self) -> usize {
        self.cursors.read().len()
    }
}

impl Default for ScrollManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_defaults_to_one_minute_when_absent() {
        assert_eq!(parse_ttl(None).unwrap(), Duration::from_secs(60));
    }

    #[test]
    fn ttl_parses_unit_suffixes_case_insensitively() {
        assert_eq!(parse_ttl(Some("30s")).unwrap(), Duration::from_secs(30));
        assert_eq!(parse_ttl(Some("2M")).unwrap(), Duration::from_secs(120));
        assert_eq!(parse_ttl(Some("1h")).unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn ttl_is_hard_capped_at_one_hour() {
        assert_eq!(parse_ttl(Some("61m")).unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_ttl(Some("2d")).unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn zero_ttl_is_a_bad_request() {
        let err = parse_ttl(Some("0s")).unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[test]
    fn create_then_get_round_trips() {
        let mgr = ScrollManager::new();
        let id = mgr.create("products", QueryNode::match_all(), vec![SortField::asc("_id")], 10, vec![], vec![], Duration::from_secs(60));
        let cursor = mgr.get(&id).unwrap();
        assert_eq!(cursor.index, "products");
        assert_eq!(cursor.from, 0);
        assert!(cursor.use_search_after());
    }

    #[test]
    fn update_with_last_sort_keeps_from_fixed() {
        let mgr = ScrollManager::new();
        let id = mgr.create("products", QueryNode::match_all(), vec![], 10, vec![], vec![], Duration::from_secs(60));
        mgr.update(&id, Some(vec![Value::String("prod5".into())])).unwrap();
        let cursor = mgr.get(&id).unwrap();
        assert_eq!(cursor.from, 0);
        assert!(cursor.last_sort.is_some());
    }

    #[test]
    fn update_without_last_sort_advances_from() {
        let mgr = ScrollManager::new();
        let id = mgr.create("products", QueryNode::match_all(), vec![], 10, vec![], vec![], Duration::from_secs(60));
        mgr.update(&id, None).unwrap();
        let cursor = mgr.get(&id).unwrap();
        assert_eq!(cursor.from, 10);
        assert!(!cursor.use_search_after());
    }

    #[test]
    fn delete_removes_cursor() {
        let mgr = ScrollManager::new();
        let id = mgr.create("products", QueryNode::match_all(), vec![], 10, vec![], vec![], Duration::from_secs(60));
        mgr.delete(&id).unwrap();
        assert!(matches!(mgr.get(&id).unwrap_err(), Error::ScrollNotFound(_)));
    }

    #[test]
    fn expired_cursor_errors_and_is_removed() {
        let mgr = ScrollManager::new();
        let id = mgr.create("products", QueryNode::match_all(), vec![], 10, vec![], vec![], Duration::from_secs(0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(mgr.get(&id).unwrap_err(), Error::ScrollExpired(_)));
        assert_eq!(mgr.cursor_count(), 0);
    }

    #[test]
    fn reap_expired_removes_stale_cursors() {
        let mgr = ScrollManager::new();
        mgr.create("products", QueryNode::match_all(), vec![], 10, vec![], vec![], Duration::from_secs(0));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(mgr.reap_expired(), 1);
        assert_eq!(mgr.cursor_count(), 0);
    }
}
