//! In-memory search backend
//!
//! Keeps indices and versioned documents behind a `RwLock` and evaluates
//! the subset of the search API the rollup uses: `match_all` queries with
//! `terms` and `date_histogram` aggregations (nested in any order), document
//! writes with create/overwrite semantics, and scripted updates with upsert.
//! Canned responses, simulated outages and unacknowledged index creation
//! make it usable as a test double for the failure paths as well.

use super::script::{self, ScriptEffect};
use super::{
    CreateIndexReceipt, GetReceipt, PingInfo, PutMode, PutReceipt, SearchBackend, UpdateReceipt,
};
use crate::error::BackendError;
use crate::query::{CalendarUnit, Interval};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Months, TimeZone, Utc};
use esrollup_shared::types::aggregation::{HitTotal, Hits, SearchResponse};
use esrollup_shared::utils::time::{parse_backend_time, to_backend_string};
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Upper bound on histogram buckets per aggregation, as enforced by real clusters.
const MAX_BUCKETS: usize = 65_536;

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

#[derive(Debug, Clone)]
struct StoredDocument {
    doc_type: String,
    version: u64,
    source: Value,
}

#[derive(Debug, Default)]
struct IndexState {
    /// Settings/mappings body the index was created with
    body: Option<Value>,
    docs: BTreeMap<String, StoredDocument>,
}

/// Search backend held entirely in process memory. Thread-safe.
#[derive(Debug)]
pub struct InMemoryBackend {
    version: String,
    indices: RwLock<BTreeMap<String, IndexState>>,
    canned: RwLock<HashMap<String, SearchResponse>>,
    reachable: AtomicBool,
    acknowledge_creates: AtomicBool,
    create_calls: AtomicU64,
    flush_calls: AtomicU64,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            version: "8.11.0".to_string(),
            indices: RwLock::new(BTreeMap::new()),
            canned: RwLock::new(HashMap::new()),
            reachable: AtomicBool::new(true),
            acknowledge_creates: AtomicBool::new(true),
            create_calls: AtomicU64::new(0),
            flush_calls: AtomicU64::new(0),
        }
    }

    /// Version reported by `ping`.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// When false every call fails with a transport error.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, AtomicOrdering::SeqCst);
    }

    /// When false index creation succeeds but reports `acknowledged: false`.
    pub fn set_acknowledge_creates(&self, acknowledge: bool) {
        self.acknowledge_creates.store(acknowledge, AtomicOrdering::SeqCst);
    }

    /// Answer searches on `index` with `response` instead of evaluating them.
    pub fn set_search_response(&self, index: &str, response: SearchResponse) {
        if let Ok(mut canned) = self.canned.write() {
            canned.insert(index.to_string(), response);
        }
    }

    /// Store a document directly, bypassing the write API.
    pub fn insert_source(&self, index: &str, id: &str, source: Value) {
        if let Ok(mut indices) = self.indices.write() {
            let state = indices.entry(index.to_string()).or_default();
            let version = state.docs.get(id).map(|d| d.version + 1).unwrap_or(1);
            state.docs.insert(
                id.to_string(),
                StoredDocument {
                    doc_type: "_doc".to_string(),
                    version,
                    source,
                },
            );
        }
    }

    /// Number of `create_index` calls that reached the backend.
    pub fn create_calls(&self) -> u64 {
        self.create_calls.load(AtomicOrdering::SeqCst)
    }

    pub fn flush_calls(&self) -> u64 {
        self.flush_calls.load(AtomicOrdering::SeqCst)
    }

    /// Body the index was created with, if any.
    pub fn index_body(&self, index: &str) -> Option<Value> {
        let indices = self.indices.read().ok()?;
        indices.get(index)?.body.clone()
    }

    /// Source of a stored document.
    pub fn source(&self, index: &str, id: &str) -> Option<Value> {
        let indices = self.indices.read().ok()?;
        Some(indices.get(index)?.docs.get(id)?.source.clone())
    }

    /// All documents of an index as (id, source), ordered by id.
    pub fn documents(&self, index: &str) -> Vec<(String, Value)> {
        let Ok(indices) = self.indices.read() else {
            return Vec::new();
        };
        indices
            .get(index)
            .map(|state| {
                state
                    .docs
                    .iter()
                    .map(|(id, doc)| (id.clone(), doc.source.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn check_reachable(&self) -> Result<(), BackendError> {
        if self.reachable.load(AtomicOrdering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::Transport("connection refused".to_string()))
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, IndexState>>, BackendError> {
        self.indices
            .read()
            .map_err(|e| BackendError::Transport(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, IndexState>>, BackendError> {
        self.indices
            .write()
            .map_err(|e| BackendError::Transport(e.to_string()))
    }
}

#[async_trait]
impl SearchBackend for InMemoryBackend {
    fn endpoint(&self) -> String {
        "memory://".to_string()
    }

    async fn ping(&self) -> Result<PingInfo, BackendError> {
        self.check_reachable()?;
        Ok(PingInfo {
            version: self.version.clone(),
            status_code: 200,
            cluster_name: Some("in-memory".to_string()),
        })
    }

    async fn index_exists(&self, index: &str) -> Result<bool, BackendError> {
        self.check_reachable()?;
        Ok(self.read()?.contains_key(index))
    }

    async fn create_index(
        &self,
        index: &str,
        body: Option<&Value>,
    ) -> Result<CreateIndexReceipt, BackendError> {
        self.check_reachable()?;
        self.create_calls.fetch_add(1, AtomicOrdering::SeqCst);
        let mut indices = self.write()?;
        if indices.contains_key(index) {
            return Err(bad_request(
                400,
                format!("resource_already_exists_exception: index [{index}] already exists"),
            ));
        }
        indices.insert(
            index.to_string(),
            IndexState {
                body: body.cloned(),
                docs: BTreeMap::new(),
            },
        );
        Ok(CreateIndexReceipt {
            acknowledged: self.acknowledge_creates.load(AtomicOrdering::SeqCst),
        })
    }

    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse, BackendError> {
        self.check_reachable()?;
        if let Some(response) = self
            .canned
            .read()
            .map_err(|e| BackendError::Transport(e.to_string()))?
            .get(index)
        {
            return Ok(response.clone());
        }

        let indices = self.read()?;
        let state = indices.get(index).ok_or_else(|| index_not_found(index))?;
        let docs: Vec<&Value> = state.docs.values().map(|d| &d.source).collect();
        execute_search(body, &docs)
    }

    async fn put(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        body: &Value,
        mode: PutMode,
    ) -> Result<PutReceipt, BackendError> {
        self.check_reachable()?;
        let mut indices = self.write()?;
        let state = indices.entry(index.to_string()).or_default();

        let previous = state.docs.get(id).map(|d| d.version);
        if previous.is_some() && mode == PutMode::Create {
            return Err(BackendError::Conflict {
                index: index.to_string(),
                id: id.to_string(),
            });
        }
        let version = previous.map(|v| v + 1).unwrap_or(1);
        state.docs.insert(
            id.to_string(),
            StoredDocument {
                doc_type: doc_type.to_string(),
                version,
                source: body.clone(),
            },
        );
        Ok(PutReceipt {
            id: id.to_string(),
            index: index.to_string(),
            doc_type: doc_type.to_string(),
            version,
            result: if previous.is_some() { "updated" } else { "created" }.to_string(),
        })
    }

    async fn get(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
    ) -> Result<GetReceipt, BackendError> {
        self.check_reachable()?;
        let indices = self.read()?;
        let state = indices.get(index).ok_or_else(|| BackendError::NotFound {
            index: index.to_string(),
            what: "index".to_string(),
        })?;
        Ok(match state.docs.get(id) {
            Some(doc) => GetReceipt {
                found: true,
                id: id.to_string(),
                version: Some(doc.version),
                index: index.to_string(),
                doc_type: doc.doc_type.clone(),
                source: Some(doc.source.clone()),
            },
            None => GetReceipt {
                found: false,
                id: id.to_string(),
                version: None,
                index: index.to_string(),
                doc_type: doc_type.to_string(),
                source: None,
            },
        })
    }

    async fn flush(&self, index: &str) -> Result<(), BackendError> {
        self.check_reachable()?;
        if !self.read()?.contains_key(index) {
            return Err(BackendError::NotFound {
                index: index.to_string(),
                what: "index".to_string(),
            });
        }
        self.flush_calls.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(())
    }

    async fn update(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        body: &Value,
    ) -> Result<UpdateReceipt, BackendError> {
        self.check_reachable()?;
        let mut indices = self.write()?;

        let existing = indices.get(index).and_then(|state| state.docs.get(id)).cloned();
        let Some(mut doc) = existing else {
            let upsert = match (body.get("upsert"), body.get("doc")) {
                (Some(upsert), _) => upsert.clone(),
                (None, Some(partial)) if body["doc_as_upsert"] == json!(true) => partial.clone(),
                _ => {
                    return Err(BackendError::NotFound {
                        index: index.to_string(),
                        what: format!("document {id:?}"),
                    })
                }
            };
            indices.entry(index.to_string()).or_default().docs.insert(
                id.to_string(),
                StoredDocument {
                    doc_type: doc_type.to_string(),
                    version: 1,
                    source: upsert,
                },
            );
            return Ok(UpdateReceipt {
                id: id.to_string(),
                version: 1,
                result: "created".to_string(),
            });
        };

        let mut source = doc.source.clone();
        let effect = match body.get("script") {
            Some(spec) => {
                let (script_source, params) = script_parts(spec)?;
                script::execute(script_source, &params, &mut source)?
            }
            None => match body.get("doc").and_then(Value::as_object) {
                Some(partial) => {
                    let target = source
                        .as_object_mut()
                        .ok_or_else(|| BackendError::Script("source is not an object".to_string()))?;
                    for (k, v) in partial {
                        target.insert(k.clone(), v.clone());
                    }
                    ScriptEffect::Updated
                }
                None => return Err(bad_request(400, "update needs a script or doc".to_string())),
            },
        };

        if effect == ScriptEffect::Noop {
            return Ok(UpdateReceipt {
                id: id.to_string(),
                version: doc.version,
                result: "noop".to_string(),
            });
        }

        doc.version += 1;
        doc.source = source;
        let version = doc.version;
        indices
            .entry(index.to_string())
            .or_default()
            .docs
            .insert(id.to_string(), doc);
        Ok(UpdateReceipt {
            id: id.to_string(),
            version,
            result: "updated".to_string(),
        })
    }
}

fn bad_request(status: u16, body: String) -> BackendError {
    BackendError::Status { status, body }
}

fn index_not_found(index: &str) -> BackendError {
    bad_request(404, format!("index_not_found_exception: no such index [{index}]"))
}

/// Script body: a bare string or `{source|inline, params}`.
fn script_parts(spec: &Value) -> Result<(&str, Map<String, Value>), BackendError> {
    if let Some(source) = spec.as_str() {
        return Ok((source, Map::new()));
    }
    let source = spec
        .get("source")
        .or_else(|| spec.get("inline"))
        .and_then(Value::as_str)
        .ok_or_else(|| bad_request(400, "script needs a source".to_string()))?;
    let params = spec
        .get("params")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    Ok((source, params))
}

fn execute_search(body: &Value, docs: &[&Value]) -> Result<SearchResponse, BackendError> {
    if let Some(query) = body.get("query") {
        if query.get("match_all").is_none() {
            return Err(bad_request(400, "only match_all queries are supported".to_string()));
        }
    }

    let aggregations = match body.get("aggs").or_else(|| body.get("aggregations")) {
        Some(Value::Object(specs)) => Some(run_aggregations(specs, docs)?),
        Some(_) => return Err(bad_request(400, "aggs must be an object".to_string())),
        None => None,
    };

    Ok(SearchResponse {
        took: Some(0),
        timed_out: false,
        hits: Hits {
            total: Some(HitTotal::Detailed {
                value: docs.len() as u64,
                relation: "eq".to_string(),
            }),
        },
        aggregations,
    })
}

fn run_aggregations(
    specs: &Map<String, Value>,
    docs: &[&Value],
) -> Result<Map<String, Value>, BackendError> {
    let mut out = Map::new();
    for (name, spec) in specs {
        let subs = match spec.get("aggs").or_else(|| spec.get("aggregations")) {
            Some(Value::Object(subs)) => Some(subs),
            Some(_) => return Err(bad_request(400, format!("aggs of [{name}] must be an object"))),
            None => None,
        };
        let result = if let Some(terms) = spec.get("terms") {
            terms_aggregation(terms, subs, docs)?
        } else if let Some(histogram) = spec.get("date_histogram") {
            date_histogram(histogram, subs, docs)?
        } else {
            return Err(bad_request(400, format!("unsupported aggregation type for [{name}]")));
        };
        out.insert(name.clone(), result);
    }
    Ok(out)
}

fn bucket(
    mut fields: Map<String, Value>,
    subs: Option<&Map<String, Value>>,
    members: &[&Value],
) -> Result<Value, BackendError> {
    fields.insert("doc_count".to_string(), Value::from(members.len() as u64));
    if let Some(subs) = subs {
        fields.extend(run_aggregations(subs, members)?);
    }
    Ok(Value::Object(fields))
}

/// Field lookup: exact key, then the parent of a `.keyword` sub-field,
/// then a dotted path through nested objects.
fn lookup<'d>(doc: &'d Value, field: &str) -> Option<&'d Value> {
    if let Some(v) = doc.get(field) {
        return Some(v);
    }
    let field = field.strip_suffix(".keyword").unwrap_or(field);
    if let Some(v) = doc.get(field) {
        return Some(v);
    }
    field.split('.').try_fold(doc, |current, part| current.get(part))
}

/// Scalar values of a field; arrays contribute each element.
fn field_values(doc: &Value, field: &str) -> Vec<Value> {
    let scalar = |v: &Value| matches!(v, Value::String(_) | Value::Number(_) | Value::Bool(_));
    match lookup(doc, field) {
        Some(Value::Array(items)) => items.iter().filter(|v| scalar(v)).cloned().collect(),
        Some(v) if scalar(v) => vec![v.clone()],
        _ => Vec::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TermsOrder {
    CountDesc,
    CountAsc,
    KeyAsc,
    KeyDesc,
}

impl TermsOrder {
    fn parse(spec: Option<&Value>) -> Result<Self, BackendError> {
        let spec = match spec {
            None => return Ok(TermsOrder::CountDesc),
            Some(Value::Array(items)) => match items.first() {
                Some(first) => first,
                None => return Ok(TermsOrder::CountDesc),
            },
            Some(other) => other,
        };
        let (key, direction) = spec
            .as_object()
            .and_then(|o| o.iter().next())
            .ok_or_else(|| bad_request(400, "invalid terms order".to_string()))?;
        match (key.as_str(), direction.as_str()) {
            ("_count", Some("desc")) => Ok(TermsOrder::CountDesc),
            ("_count", Some("asc")) => Ok(TermsOrder::CountAsc),
            ("_key" | "_term", Some("asc")) => Ok(TermsOrder::KeyAsc),
            ("_key" | "_term", Some("desc")) => Ok(TermsOrder::KeyDesc),
            _ => Err(bad_request(400, format!("unsupported terms order [{key}]"))),
        }
    }

    fn compare(self, a: &(Value, Vec<&Value>), b: &(Value, Vec<&Value>)) -> Ordering {
        let by_key = compare_keys(&a.0, &b.0);
        match self {
            // ties on count fall back to ascending key
            TermsOrder::CountDesc => b.1.len().cmp(&a.1.len()).then(by_key),
            TermsOrder::CountAsc => a.1.len().cmp(&b.1.len()).then(by_key),
            TermsOrder::KeyAsc => by_key,
            TermsOrder::KeyDesc => by_key.reverse(),
        }
    }
}

fn compare_keys(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Bool(_) => 0,
            Value::Number(_) => 1,
            _ => 2,
        }
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn terms_aggregation(
    spec: &Value,
    subs: Option<&Map<String, Value>>,
    docs: &[&Value],
) -> Result<Value, BackendError> {
    let field = spec
        .get("field")
        .and_then(Value::as_str)
        .ok_or_else(|| bad_request(400, "terms aggregation needs a field".to_string()))?;
    let size = spec.get("size").and_then(Value::as_u64).unwrap_or(10) as usize;
    let order = TermsOrder::parse(spec.get("order"))?;

    let mut groups: Vec<(Value, Vec<&Value>)> = Vec::new();
    for &doc in docs {
        for key in field_values(doc, field) {
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, members)) => members.push(doc),
                None => groups.push((key, vec![doc])),
            }
        }
    }
    groups.sort_by(|a, b| order.compare(a, b));

    let total: usize = groups.iter().map(|(_, members)| members.len()).sum();
    groups.truncate(size);
    let shown: usize = groups.iter().map(|(_, members)| members.len()).sum();

    let mut buckets = Vec::with_capacity(groups.len());
    for (key, members) in &groups {
        let mut fields = Map::new();
        match key {
            // boolean terms come back as 1/0 with a string rendering
            Value::Bool(b) => {
                fields.insert("key".to_string(), Value::from(u8::from(*b)));
                fields.insert("key_as_string".to_string(), Value::String(b.to_string()));
            }
            other => {
                fields.insert("key".to_string(), other.clone());
            }
        }
        buckets.push(bucket(fields, subs, members)?);
    }

    Ok(json!({
        "doc_count_error_upper_bound": 0,
        "sum_other_doc_count": total - shown,
        "buckets": buckets,
    }))
}

fn date_histogram(
    spec: &Value,
    subs: Option<&Map<String, Value>>,
    docs: &[&Value],
) -> Result<Value, BackendError> {
    let field = spec
        .get("field")
        .and_then(Value::as_str)
        .ok_or_else(|| bad_request(400, "date_histogram needs a field".to_string()))?;
    let raw = ["calendar_interval", "fixed_interval", "interval"]
        .iter()
        .find_map(|k| spec.get(*k).and_then(Value::as_str))
        .ok_or_else(|| bad_request(400, "date_histogram needs an interval".to_string()))?;
    let interval = Interval::parse(raw);
    if let Interval::Other(raw) = &interval {
        return Err(bad_request(400, format!("failed to parse interval [{raw}]")));
    }
    let min_doc_count = spec.get("min_doc_count").and_then(Value::as_u64).unwrap_or(0) as usize;

    let mut groups: BTreeMap<i64, Vec<&Value>> = BTreeMap::new();
    for &doc in docs {
        let values = match lookup(doc, field) {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(v) => vec![v],
            None => Vec::new(),
        };
        for ts in values.into_iter().filter_map(parse_backend_time) {
            let start = floor(&interval, ts);
            groups.entry(start.timestamp_millis()).or_default().push(doc);
        }
    }

    let mut buckets = Vec::new();
    let (Some(&first), Some(&last)) = (groups.keys().next(), groups.keys().next_back()) else {
        return Ok(json!({ "buckets": buckets }));
    };

    let empty: Vec<&Value> = Vec::new();
    let mut start = millis_to_time(first);
    loop {
        let key = start.timestamp_millis();
        if key > last {
            break;
        }
        let members = groups.get(&key).unwrap_or(&empty);
        if members.len() >= min_doc_count {
            if buckets.len() >= MAX_BUCKETS {
                return Err(bad_request(
                    400,
                    format!("too_many_buckets_exception: more than {MAX_BUCKETS} buckets"),
                ));
            }
            let mut fields = Map::new();
            fields.insert("key_as_string".to_string(), Value::String(to_backend_string(&start)));
            fields.insert("key".to_string(), Value::from(key));
            buckets.push(bucket(fields, subs, members)?);
        }
        let Some(next) = next_start(&interval, start).filter(|next| *next > start) else {
            break;
        };
        start = next;
    }

    Ok(json!({ "buckets": buckets }))
}

fn millis_to_time(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
}

fn floor_millis(ts: DateTime<Utc>, width: i64) -> DateTime<Utc> {
    let millis = ts.timestamp_millis();
    millis_to_time(millis - millis.rem_euclid(width.max(1)))
}

fn first_of_month(year: i32, month: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Start of the bucket containing `ts`. Weeks start on Monday.
fn floor(interval: &Interval, ts: DateTime<Utc>) -> DateTime<Utc> {
    match interval {
        Interval::Calendar(CalendarUnit::Minute) => floor_millis(ts, MINUTE_MS),
        Interval::Calendar(CalendarUnit::Hour) => floor_millis(ts, HOUR_MS),
        Interval::Calendar(CalendarUnit::Day) => floor_millis(ts, DAY_MS),
        Interval::Calendar(CalendarUnit::Week) => {
            let day = floor_millis(ts, DAY_MS);
            day - Duration::days(i64::from(day.weekday().num_days_from_monday()))
        }
        Interval::Calendar(CalendarUnit::Month) => first_of_month(ts.year(), ts.month()),
        Interval::Calendar(CalendarUnit::Quarter) => {
            first_of_month(ts.year(), ts.month0() / 3 * 3 + 1)
        }
        Interval::Calendar(CalendarUnit::Year) => first_of_month(ts.year(), 1),
        Interval::Fixed { width, .. } => {
            floor_millis(ts, i64::try_from(width.as_millis()).unwrap_or(i64::MAX))
        }
        Interval::Other(_) => ts,
    }
}

/// Start of the bucket after `start`, or `None` past the end of representable time.
fn next_start(interval: &Interval, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let step = |millis| start.checked_add_signed(Duration::milliseconds(millis));
    let months = |n| start.checked_add_months(Months::new(n));
    match interval {
        Interval::Calendar(CalendarUnit::Minute) => step(MINUTE_MS),
        Interval::Calendar(CalendarUnit::Hour) => step(HOUR_MS),
        Interval::Calendar(CalendarUnit::Day) => step(DAY_MS),
        Interval::Calendar(CalendarUnit::Week) => step(7 * DAY_MS),
        Interval::Calendar(CalendarUnit::Month) => months(1),
        Interval::Calendar(CalendarUnit::Quarter) => months(3),
        Interval::Calendar(CalendarUnit::Year) => months(12),
        Interval::Fixed { width, .. } => step(i64::try_from(width.as_millis()).ok()?),
        Interval::Other(_) => None,
    }
}
