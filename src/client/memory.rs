//! In-process [`SearchClient`] for tests and embedding.
//!
//! Documents live in a `DashMap` of indexes. Searches evaluate the common
//! query DSL clauses (`match_all`, `term`, `terms`, `match`, `range`,
//! `wildcard`, `fuzzy`, `bool`, `nested`) against stored sources, with every
//! hit scored 1.0. Responses can also be scripted to return canned hits.

use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use super::traits::{BulkResponse, SearchClient, SearchHit, SearchResponse};
use crate::error::SearchError;
use crate::mapping::{IndexDocument, TypeMapping};

/// Default page size of a search without `size`
const DEFAULT_SIZE: usize = 10;

/// A request seen by the client, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCall {
    Search { index: String, doc_type: String, body: Value },
    Bulk { index: String, doc_type: String, ids: Vec<String> },
    CreateIndex { index: String, overwrite: bool },
    PutMapping { index: String, doc_type: String },
    DeleteByQuery { index: String, doc_type: String, query: Value },
    Refresh { index: String },
}

#[derive(Debug, Default)]
struct IndexState {
    settings: Value,
    mappings: BTreeMap<String, TypeMapping>,
    /// type → id → source
    documents: BTreeMap<String, BTreeMap<String, Map<String, Value>>>,
}

pub struct MemorySearchClient {
    indexes: DashMap<String, IndexState>,
    scripted: Mutex<VecDeque<SearchResponse>>,
    bulk_failure: Mutex<Option<Value>>,
    calls: Mutex<Vec<ClientCall>>,
}

impl MemorySearchClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            indexes: DashMap::new(),
            scripted: Mutex::new(VecDeque::new()),
            bulk_failure: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer the next search with `response` instead of evaluating it.
    pub fn script_response(&self, response: SearchResponse) {
        self.scripted.lock().push_back(response);
    }

    /// Make the next bulk write fail with `raw` as the engine reply.
    pub fn fail_next_bulk(&self, raw: Value) {
        *self.bulk_failure.lock() = Some(raw);
    }

    pub fn calls(&self) -> Vec<ClientCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Number of bulk writes issued so far
    pub fn bulk_count(&self) -> usize {
        self.calls.lock().iter().filter(|c| matches!(c, ClientCall::Bulk { .. })).count()
    }

    /// Stored documents of a type, ordered by id
    pub fn documents(&self, index: &str, doc_type: &str) -> Vec<(String, Map<String, Value>)> {
        self.indexes
            .get(index)
            .and_then(|state| {
                state.documents.get(doc_type).map(|docs| {
                    let mut list: Vec<_> = docs.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                    list.sort_by(|a, b| compare_ids(&a.0, &b.0));
                    list
                })
            })
            .unwrap_or_default()
    }

    pub fn document(&self, index: &str, doc_type: &str, id: &str) -> Option<Map<String, Value>> {
        self.indexes
            .get(index)
            .and_then(|state| state.documents.get(doc_type)?.get(id).cloned())
    }

    pub fn mapping(&self, index: &str, doc_type: &str) -> Option<TypeMapping> {
        self.indexes.get(index).and_then(|state| state.mappings.get(doc_type).cloned())
    }

    pub fn settings(&self, index: &str) -> Option<Value> {
        self.indexes.get(index).map(|state| state.settings.clone())
    }

    fn record(&self, call: ClientCall) {
        self.calls.lock().push(call);
    }

    fn missing_index(index: &str) -> SearchError {
        SearchError::Engine {
            status: 404,
            message: format!("index_not_found_exception: no such index [{}]", index),
        }
    }
}

impl Default for MemorySearchClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchClient for MemorySearchClient {
    async fn search(&self, index: &str, doc_type: &str, body: &Value) -> Result<SearchResponse, SearchError> {
        self.record(ClientCall::Search {
            index: index.to_string(),
            doc_type: doc_type.to_string(),
            body: body.clone(),
        });
        if let Some(response) = self.scripted.lock().pop_front() {
            return Ok(response);
        }

        let state = self.indexes.get(index).ok_or_else(|| Self::missing_index(index))?;
        let match_all = Value::Object(Map::new());
        let query = body.get("query").filter(|q| !q.is_null()).unwrap_or(&match_all);

        let mut matched: Vec<(&String, &Map<String, Value>)> = state
            .documents
            .get(doc_type)
            .map(|docs| docs.iter().filter(|(_, doc)| matches(query, doc)).collect())
            .unwrap_or_default();
        matched.sort_by(|a, b| compare_ids(a.0, b.0));
        if let Some(sort) = body.get("sort").and_then(Value::as_array) {
            matched.sort_by(|a, b| compare_by_sort(sort, a.1, b.1));
        }

        let total_hits = matched.len() as u64;
        let from = body.get("from").and_then(Value::as_u64).unwrap_or(0) as usize;
        let size = body.get("size").and_then(Value::as_u64).map_or(DEFAULT_SIZE, |s| s as usize);
        let hits = matched
            .into_iter()
            .skip(from)
            .take(size)
            .map(|(id, source)| SearchHit { id: id.clone(), score: 1.0, source: source.clone() })
            .collect();
        Ok(SearchResponse { hits, total_hits })
    }

    async fn add_documents(
        &self,
        index: &str,
        doc_type: &str,
        documents: &[IndexDocument],
    ) -> Result<BulkResponse, SearchError> {
        self.record(ClientCall::Bulk {
            index: index.to_string(),
            doc_type: doc_type.to_string(),
            ids: documents.iter().map(|d| d.id.clone()).collect(),
        });
        if let Some(raw) = self.bulk_failure.lock().take() {
            return Err(SearchError::Bulk {
                index: index.to_string(),
                doc_type: doc_type.to_string(),
                failed: documents.len(),
                total: documents.len(),
                response: raw,
            });
        }

        let mut state = self.indexes.entry(index.to_string()).or_default();
        let docs = state.documents.entry(doc_type.to_string()).or_default();
        for doc in documents {
            docs.insert(doc.id.clone(), doc.body.clone());
        }
        Ok(BulkResponse { total: documents.len(), failed: 0, raw: Value::Null })
    }

    async fn index_exists(&self, index: &str) -> Result<bool, SearchError> {
        Ok(self.indexes.contains_key(index))
    }

    async fn create_index(&self, index: &str, settings: &Value, overwrite: bool) -> Result<(), SearchError> {
        self.record(ClientCall::CreateIndex { index: index.to_string(), overwrite });
        if self.indexes.contains_key(index) && !overwrite {
            return Err(SearchError::Engine {
                status: 400,
                message: format!("index_already_exists_exception: [{}]", index),
            });
        }
        self.indexes.insert(
            index.to_string(),
            IndexState { settings: settings.clone(), ..Default::default() },
        );
        Ok(())
    }

    async fn type_exists(&self, index: &str, doc_type: &str) -> Result<bool, SearchError> {
        Ok(self
            .indexes
            .get(index)
            .is_some_and(|state| state.mappings.contains_key(doc_type)))
    }

    async fn put_mapping(&self, index: &str, doc_type: &str, mapping: &TypeMapping) -> Result<(), SearchError> {
        self.record(ClientCall::PutMapping { index: index.to_string(), doc_type: doc_type.to_string() });
        let mut state = self.indexes.get_mut(index).ok_or_else(|| Self::missing_index(index))?;
        state.mappings.insert(doc_type.to_string(), mapping.clone());
        Ok(())
    }

    async fn delete_by_query(&self, index: &str, doc_type: &str, query: &Value) -> Result<(), SearchError> {
        self.record(ClientCall::DeleteByQuery {
            index: index.to_string(),
            doc_type: doc_type.to_string(),
            query: query.clone(),
        });
        let mut state = self.indexes.get_mut(index).ok_or_else(|| Self::missing_index(index))?;
        if let Some(docs) = state.documents.get_mut(doc_type) {
            docs.retain(|_, doc| !matches(query, doc));
        }
        Ok(())
    }

    async fn refresh(&self, index: &str) -> Result<(), SearchError> {
        self.record(ClientCall::Refresh { index: index.to_string() });
        if !self.indexes.contains_key(index) {
            return Err(Self::missing_index(index));
        }
        Ok(())
    }
}

/// Numeric ids compare as numbers, anything else as text.
fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

fn compare_by_sort(sort: &[Value], a: &Map<String, Value>, b: &Map<String, Value>) -> Ordering {
    for entry in sort {
        let Some((field, direction)) = entry.as_object().and_then(|o| o.iter().next()) else {
            continue; // "_score": every hit scores the same
        };
        let left = lookup(a, field).first().copied();
        let right = lookup(b, field).first().copied();
        let ordering = match (left, right) {
            (Some(l), Some(r)) => compare_values(l, r).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        let ordering = if direction.as_str() == Some("desc") { ordering.reverse() } else { ordering };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Values at a dotted path, flattening arrays. A trailing raw subfield that
/// does not exist in the source resolves to its parent value.
fn lookup<'a>(doc: &'a Map<String, Value>, field: &str) -> Vec<&'a Value> {
    let mut parts = field.split('.');
    let Some(first) = parts.next() else { return Vec::new() };
    let mut current: Vec<&Value> = doc.get(first).into_iter().collect();
    for part in parts {
        let mut next = Vec::new();
        for value in &current {
            match value {
                Value::Object(o) => next.extend(o.get(part)),
                Value::Array(items) => next.extend(items.iter().filter_map(|i| i.get(part))),
                _ => {}
            }
        }
        if next.is_empty() && part == "raw" {
            continue;
        }
        current = next;
    }
    current
        .into_iter()
        .flat_map(|v| match v {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        })
        .collect()
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(f64::from(u8::from(*b))),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => match (a.as_str(), b.as_str()) {
            (Some(x), Some(y)) => Some(x.to_lowercase().cmp(&y.to_lowercase())),
            _ => None,
        },
    }
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).map(str::to_lowercase).collect()
}

/// First (field, clause body) pair of a leaf query
fn field_clause(body: &Value) -> Option<(&String, &Value)> {
    body.as_object()?.iter().next()
}

/// Operand of a leaf clause given either bare or as `{key: operand, ...}`.
fn operand<'a>(clause: &'a Value, key: &str) -> &'a Value {
    clause.get(key).unwrap_or(clause)
}

fn matches(query: &Value, doc: &Map<String, Value>) -> bool {
    let Some((kind, body)) = query.as_object().and_then(|o| o.iter().next()) else {
        return true;
    };
    match kind.as_str() {
        "match_all" => true,
        "term" => field_clause(body).is_some_and(|(field, clause)| {
            let expected = operand(clause, "value");
            lookup(doc, field)
                .iter()
                .any(|v| compare_values(v, expected) == Some(Ordering::Equal) && v.is_string() == expected.is_string())
        }),
        "terms" => field_clause(body).is_some_and(|(field, values)| {
            let values = values.as_array().map(Vec::as_slice).unwrap_or_default();
            lookup(doc, field)
                .iter()
                .any(|v| values.iter().any(|e| compare_values(v, e) == Some(Ordering::Equal)))
        }),
        "match" => field_clause(body).is_some_and(|(field, clause)| {
            let expected = operand(clause, "query");
            lookup(doc, field).iter().any(|v| match (v.as_str(), expected.as_str()) {
                (Some(actual), Some(wanted)) => {
                    let actual = tokens(actual);
                    tokens(wanted).iter().any(|t| actual.contains(t))
                }
                _ => compare_values(v, expected) == Some(Ordering::Equal),
            })
        }),
        "range" => field_clause(body).is_some_and(|(field, bounds)| {
            let Some(bounds) = bounds.as_object() else { return false };
            lookup(doc, field).iter().any(|v| {
                bounds.iter().all(|(op, bound)| {
                    let ordering = compare_values(v, bound);
                    match op.as_str() {
                        "lt" => ordering == Some(Ordering::Less),
                        "lte" => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
                        "gt" => ordering == Some(Ordering::Greater),
                        "gte" => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
                        _ => true,
                    }
                })
            })
        }),
        "wildcard" => field_clause(body).is_some_and(|(field, clause)| {
            let Some(pattern) = operand(clause, "value").as_str() else { return false };
            let pattern = pattern.to_lowercase();
            lookup(doc, field)
                .iter()
                .filter_map(|v| v.as_str())
                .any(|v| glob(&pattern, &v.to_lowercase()))
        }),
        "fuzzy" => field_clause(body).is_some_and(|(field, clause)| {
            let Some(wanted) = operand(clause, "value").as_str() else { return false };
            let max = clause.get("fuzziness").and_then(Value::as_u64).unwrap_or(2) as usize;
            let wanted = wanted.to_lowercase();
            lookup(doc, field)
                .iter()
                .filter_map(|v| v.as_str())
                .flat_map(tokens)
                .any(|t| edit_distance(&t, &wanted) <= max)
        }),
        "bool" => {
            let clauses = |key: &str| body.get(key).and_then(Value::as_array).map(Vec::as_slice).unwrap_or_default();
            clauses("must").iter().all(|q| matches(q, doc))
                && !clauses("must_not").iter().any(|q| matches(q, doc))
        }
        "nested" => {
            let (Some(path), Some(inner)) = (body.get("path").and_then(Value::as_str), body.get("query")) else {
                return false;
            };
            lookup(doc, path).into_iter().any(|element| {
                // Scope the inner query to one element at a time
                let scoped = path.rsplit('.').fold(element.clone(), |acc, part| {
                    let mut wrapper = Map::new();
                    wrapper.insert(part.to_string(), acc);
                    Value::Object(wrapper)
                });
                scoped.as_object().is_some_and(|doc| matches(inner, doc))
            })
        }
        _ => false,
    }
}

/// `*` and `?` wildcard matching.
fn glob(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '*')
}

fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut row = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            row[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(row[j] + 1);
        }
        prev = row;
    }
    prev[b.len()]
}
