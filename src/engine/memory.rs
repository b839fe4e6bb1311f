//! In-memory [`SearchEngine`] implementation.
//!
//! The real embedded engine is out of scope (spec §1); this is the one
//! concrete collaborator the rest of the crate is tested against. Storage is
//! a coarse `RwLock<HashMap<index, BTreeMap<id, Document>>>` (teacher's
//! `session.rs` locking style) and matching is a brute-force scan per query,
//! which is exactly right for the fixture-sized indexes this system drives.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use regex::Regex;

use crate::error::{Error, Result};
use crate::query::ast::{QueryNode, Range, RangeEndpoint};
use crate::value::{Document, Value};

use super::codec::encode_prefix_term;
use super::{EngineHit, EngineSearchRequest, EngineSearchResult, RangeCount, RangeSpec, RawFacetEntry, SearchEngine};

pub struct MemoryEngine {
    indexes: RwLock<HashMap<String, BTreeMap<String, Document>>>,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    pub fn new() -> Self {
        MemoryEngine { indexes: RwLock::new(HashMap::new()) }
    }

    fn with_docs<T>(&self, index: &str, f: impl FnOnce(&BTreeMap<String, Document>) -> T) -> Result<T> {
        let guard = self.indexes.read();
        let docs = guard.get(index).ok_or_else(|| Error::IndexNotFound(index.to_string()))?;
        Ok(f(docs))
    }
}

impl SearchEngine for MemoryEngine {
    fn index_exists(&self, index: &str) -> bool {
        self.indexes.read().contains_key(index)
    }

    fn create_index(&self, index: &str) {
        self.indexes.write().entry(index.to_string()).or_default();
    }

    fn search(&self, index: &str, req: &EngineSearchRequest) -> Result<EngineSearchResult> {
        self.with_docs(index, |docs| {
            let mut matched: Vec<(String, f32, &Document)> = Vec::new();
            for (id, doc) in docs {
                if let Some(score) = eval(doc, &req.query)? {
                    matched.push((id.clone(), score, doc));
                }
            }
            let total = matched.len() as u64;

            if req.sort.is_empty() {
                matched.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(&b.0)));
            } else {
                matched.sort_by(|a, b| {
                    for field in &req.sort {
                        let av = a.2.get(&field.field).cloned().unwrap_or(Value::Null);
                        let bv = b.2.get(&field.field).cloned().unwrap_or(Value::Null);
                        let ord = av.cmp_canonical(&bv);
                        let ord = if field.descending { ord.reverse() } else { ord };
                        if ord != std::cmp::Ordering::Equal {
                            return ord;
                        }
                    }
                    a.0.cmp(&b.0)
                });
            }

            let start_index = if let Some(after) = &req.search_after {
                matched.iter().position(|(_, _, doc)| sort_key_after(doc, &req.sort, after)).unwrap_or(matched.len())
            } else {
                req.from
            };

            let page: Vec<EngineHit> = matched
                .into_iter()
                .skip(start_index)
                .take(req.size)
                .map(|(id, score, doc)| {
                    let sort = req.sort.iter().map(|f| doc.get(&f.field).cloned().unwrap_or(Value::Null)).collect();
                    let fields = req.fields_projection.as_ref().map(|projection| project(doc, projection));
                    EngineHit { id, score, sort, fields }
                })
                .collect();

            Ok::<_, Error>(EngineSearchResult { hits: page, total })
        })?
    }

    fn fetch_document(&self, index: &str, id: &str) -> Result<Option<Document>> {
        self.with_docs(index, |docs| docs.get(id).cloned())
    }

    fn facet_terms(&self, index: &str, field: &str, query: &QueryNode, size: usize) -> Result<Vec<RawFacetEntry>> {
        self.with_docs(index, |docs| {
            let mut counts: HashMap<Vec<u8>, u64> = HashMap::new();
            for doc in docs.values() {
                if eval(doc, query)?.is_none() {
                    continue;
                }
                if let Some(value) = doc.get(field) {
                    if value.is_null() {
                        continue;
                    }
                    let key = term_bytes(value);
                    *counts.entry(key).or_insert(0) += 1;
                }
            }
            let mut entries: Vec<RawFacetEntry> =
                counts.into_iter().map(|(term_bytes, count)| RawFacetEntry { term_bytes, count }).collect();
            entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.term_bytes.cmp(&b.term_bytes)));
            entries.truncate(size);
            Ok::<_, Error>(entries)
        })?
    }

    fn facet_ranges(&self, index: &str, field: &str, query: &QueryNode, ranges: &[RangeSpec]) -> Result<Vec<RangeCount>> {
        self.with_docs(index, |docs| {
            let mut counts = vec![0u64; ranges.len()];
            for doc in docs.values() {
                if eval(doc, query)?.is_none() {
                    continue;
                }
                let Some(value) = doc.get(field).and_then(Value::as_f64) else { continue };
                for (i, range) in ranges.iter().enumerate() {
                    let above_from = range.from.map(|from| value >= from).unwrap_or(true);
                    let below_to = range.to.map(|to| value < to).unwrap_or(true);
                    if above_from && below_to {
                        counts[i] += 1;
                    }
                }
            }
            Ok::<_, Error>(
                ranges
                    .iter()
                    .cloned()
                    .zip(counts)
                    .map(|(spec, count)| RangeCount { spec, count })
                    .collect(),
            )
        })?
    }

    fn count(&self, index: &str, query: &QueryNode) -> Result<u64> {
        self.with_docs(index, |docs| {
            let mut n = 0u64;
            for doc in docs.values() {
                if eval(doc, query)?.is_some() {
                    n += 1;
                }
            }
            Ok::<_, Error>(n)
        })?
    }

    fn index_document(&self, index: &str, id: &str, doc: Document) -> Result<()> {
        let mut guard = self.indexes.write();
        let docs = guard.entry(index.to_string()).or_default();
        docs.insert(id.to_string(), doc);
        Ok(())
    }

    fn delete_document(&self, index: &str, id: &str) -> Result<bool> {
        let mut guard = self.indexes.write();
        let docs = guard.get_mut(index).ok_or_else(|| Error::IndexNotFound(index.to_string()))?;
        Ok(docs.remove(id).is_some())
    }
}

fn project(doc: &Document, fields: &[String]) -> Document {
    let mut projected = Document::default();
    for field in fields {
        if let Some(value) = doc.get(field) {
            projected.fields.insert(field.clone(), value.clone());
        }
    }
    projected
}

fn term_bytes(value: &Value) -> Vec<u8> {
    match value.as_f64() {
        Some(f) => encode_prefix_term(f, 0),
        None => value.to_term_string().into_bytes(),
    }
}

fn sort_key_after(doc: &Document, sort: &[crate::engine::SortField], after: &[Value]) -> bool {
    for (field, after_value) in sort.iter().zip(after) {
        let value = doc.get(&field.field).cloned().unwrap_or(Value::Null);
        let ord = value.cmp_canonical(after_value);
        let ord = if field.descending { ord.reverse() } else { ord };
        match ord {
            std::cmp::Ordering::Less => return false,
            std::cmp::Ordering::Greater => return true,
            std::cmp::Ordering::Equal => continue,
        }
    }
    false
}

/// Evaluate a query against a document. `Some(score)` on match, `None` on no
/// match. `has_child`/`has_parent`/`percolate` never reach the engine: the
/// join rewriter resolves them into `ids` queries before search (C2).
fn eval(doc: &Document, node: &QueryNode) -> Result<Option<f32>> {
    Ok(match node {
        QueryNode::Term { field, value, boost } => match doc.get(field) {
            Some(actual) if actual.to_term_string() == value.to_term_string() => Some(*boost),
            _ => None,
        },
        QueryNode::Terms { field, values, boost } => {
            let matched = doc
                .get(field)
                .map(|actual| values.iter().any(|v| v.to_term_string() == actual.to_term_string()))
                .unwrap_or(false);
            matched.then_some(*boost)
        }
        QueryNode::Match { field, query, boost } | QueryNode::MatchPhrase { field, query, boost } => {
            let phrase = matches!(node, QueryNode::MatchPhrase { .. });
            match doc.get(field) {
                Some(actual) => {
                    let haystack = tokenize(&actual.to_term_string());
                    let needle = tokenize(query);
                    if needle.is_empty() {
                        None
                    } else if phrase {
                        contains_subsequence(&haystack, &needle).then_some(*boost)
                    } else {
                        needle.iter().any(|tok| haystack.contains(tok)).then_some(*boost)
                    }
                }
                None => None,
            }
        }
        QueryNode::MatchAll { boost } => Some(*boost),
        QueryNode::Prefix { field, value, boost } => match doc.get(field) {
            Some(actual) => actual.to_term_string().starts_with(value.as_str()).then_some(*boost),
            None => None,
        },
        QueryNode::Wildcard { field, pattern, boost } => match doc.get(field) {
            Some(actual) => {
                let re = wildcard_to_regex(pattern)?;
                re.is_match(&actual.to_term_string()).then_some(*boost)
            }
            None => None,
        },
        QueryNode::Regexp { field, pattern, boost } => match doc.get(field) {
            Some(actual) => {
                let re = Regex::new(pattern).map_err(|e| Error::InvalidQuery(e.to_string()))?;
                re.is_match(&actual.to_term_string()).then_some(*boost)
            }
            None => None,
        },
        QueryNode::Fuzzy { field, value, fuzziness, boost } => match doc.get(field) {
            Some(actual) => {
                (levenshtein(&actual.to_term_string(), value) <= *fuzziness as usize).then_some(*boost)
            }
            None => None,
        },
        QueryNode::Range { field, range, boost } => match doc.get(field) {
            Some(actual) => in_range(actual, range).then_some(*boost),
            None => None,
        },
        QueryNode::Exists { field } => doc.get(field).filter(|v| !v.is_null()).map(|_| 1.0),
        QueryNode::Ids { values, boost } => {
            let matched = doc.get("_id").map(|id| values.iter().any(|v| v == &id.to_term_string())).unwrap_or(false);
            matched.then_some(*boost)
        }
        QueryNode::Bool { must, should, must_not, filter, boost } => {
            for clause in must_not {
                if eval(doc, clause)?.is_some() {
                    return Ok(None);
                }
            }
            let mut score = 0.0f32;
            for clause in must.iter().chain(filter.iter()) {
                match eval(doc, clause)? {
                    Some(s) => score += s,
                    None => return Ok(None),
                }
            }
            if !should.is_empty() {
                let mut any = false;
                for clause in should {
                    if let Some(s) = eval(doc, clause)? {
                        any = true;
                        score += s;
                    }
                }
                if !any && must.is_empty() && filter.is_empty() {
                    return Ok(None);
                }
            }
            Some(score * boost)
        }
        QueryNode::Conjunction(items) => {
            let mut score = 0.0f32;
            for item in items {
                match eval(doc, item)? {
                    Some(s) => score += s,
                    None => return Ok(None),
                }
            }
            Some(score)
        }
        QueryNode::Disjunction(items) => {
            let mut matched = false;
            let mut score = 0.0f32;
            for item in items {
                if let Some(s) = eval(doc, item)? {
                    matched = true;
                    score += s;
                }
            }
            matched.then_some(score)
        }
        QueryNode::Nested { query, .. } => eval(doc, query)?,
        QueryNode::HasChild { .. } | QueryNode::HasParent { .. } | QueryNode::Percolate { .. } => {
            return Err(Error::Internal("join marker reached the engine unrewritten".to_string()));
        }
    })
}

fn tokenize(s: &str) -> Vec<String> {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|tok| !tok.is_empty())
        .map(str::to_string)
        .collect()
}

fn contains_subsequence(haystack: &[String], needle: &[String]) -> bool {
    if needle.is_empty() || needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

const REGEX_METACHARS: &[char] = &['.', '+', '(', ')', '|', '[', ']', '{', '}', '^', '$', '\\'];

fn wildcard_to_regex(pattern: &str) -> Result<Regex> {
    let mut out = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            c if REGEX_METACHARS.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push('$');
    Regex::new(&out).map_err(|e| Error::InvalidQuery(e.to_string()))
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut prev = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let tmp = row[j + 1];
            row[j + 1] = if ca == cb { prev } else { 1 + prev.min(row[j]).min(row[j + 1]) };
            prev = tmp;
        }
    }
    row[b.len()]
}

fn in_range(value: &Value, range: &Range) -> bool {
    let cmp_endpoint = |endpoint: &RangeEndpoint| -> std::cmp::Ordering {
        match endpoint {
            RangeEndpoint::Numeric(n) => value.cmp_canonical(&Value::Float(*n)),
            RangeEndpoint::Date(d) => value.cmp_canonical(&Value::DateTime(*d)),
            RangeEndpoint::String(s) => value.cmp_canonical(&Value::String(s.clone())),
        }
    };
    if let Some(gt) = &range.gt {
        if cmp_endpoint(gt) != std::cmp::Ordering::Greater {
            return false;
        }
    }
    if let Some(gte) = &range.gte {
        if cmp_endpoint(gte) == std::cmp::Ordering::Less {
            return false;
        }
    }
    if let Some(lt) = &range.lt {
        if cmp_endpoint(lt) != std::cmp::Ordering::Less {
            return false;
        }
    }
    if let Some(lte) = &range.lte {
        if cmp_endpoint(lte) == std::cmp::Ordering::Greater {
            return false;
        }
    }
    true
}
