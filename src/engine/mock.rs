//! In-memory query engine for tests and `--mock-engine` runs.
//!
//! Understands the statements this crate emits: external tables, views,
//! partitions, partition metadata counts, allow-list counts and the export
//! UNLOAD, which it materializes into a blob store with the same ranked
//! dedup the real query performs. Anything else succeeds with an empty
//! result.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::{Captures, Regex};
use tracing::debug;

use super::{ExecutionStatus, QueryEngine, QueryState, ResultPage};
use crate::error::{CdxError, Result};
use crate::export::dedup::{export_records, AllowList, IndexRow};
use crate::export::record::encode_jsonl_gz;
use crate::schema::PartitionKey;
use crate::storage::{BlobStore, S3Location};

fn pattern(cell: &'static OnceLock<Regex>, re: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(re).expect("valid regex"))
}

fn create_table_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    pattern(&RE, r"(?is)^\s*CREATE\s+EXTERNAL\s+TABLE\s+IF\s+NOT\s+EXISTS\s+([\w.]+)")
}

fn create_view_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    pattern(
        &RE,
        r"(?is)^\s*CREATE\s+OR\s+REPLACE\s+VIEW\s+([\w.]+)\s+AS\s+.*?\bFROM\s+([\w.]+)",
    )
}

fn add_partition_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    pattern(
        &RE,
        r"(?is)^\s*ALTER\s+TABLE\s+([\w.]+)\s+ADD\s+IF\s+NOT\s+EXISTS\s+PARTITION\s*\(\s*crawl\s*=\s*'([^']*)'\s*,\s*subset\s*=\s*'([^']*)'\s*\)",
    )
}

fn partition_count_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    pattern(
        &RE,
        r#"(?is)^\s*SELECT\s+COUNT\(1\)\s+AS\s+(\w+)\s+FROM\s+"(\w+)"\."(\w+)\$partitions"\s+WHERE\s+crawl\s*=\s*'([^']*)'\s+AND\s+subset\s*=\s*'([^']*)'"#,
    )
}

fn row_count_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    pattern(
        &RE,
        r"(?is)^\s*SELECT\s+CAST\(COUNT\(\*\)\s+AS\s+BIGINT\)\s+AS\s+(\w+)\s+FROM\s+([\w.]+)",
    )
}

fn unload_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    pattern(
        &RE,
        r"(?is)^\s*UNLOAD\s*\(.*?\bcc\.crawl\s*=\s*'([^']*)'\s+AND\s+cc\.subset\s*=\s*'([^']*)'.*\)\s*TO\s+'([^']+)'",
    )
}

/// What a statement did once interpreted.
enum Effect {
    Rows(ResultPage),
    Failed(String),
    Ended(QueryState, String),
    Unload {
        target: String,
        records: Vec<crate::export::ExportRecord>,
    },
}

struct MockExecution {
    polls_left: u32,
    outcome: ExecutionStatus,
    page: ResultPage,
}

#[derive(Default)]
struct MockState {
    executions: HashMap<String, MockExecution>,
    submitted: Vec<String>,
    status_calls: usize,
    tables: BTreeMap<String, String>,
    views: BTreeMap<String, String>,
    partitions: BTreeSet<(String, PartitionKey)>,
    domains: Vec<String>,
    index_rows: Vec<IndexRow>,
}

/// An engine that keeps its catalog in memory and answers deterministically.
#[derive(Default)]
pub struct MockQueryEngine {
    state: Mutex<MockState>,
    store: Option<Arc<dyn BlobStore>>,
    pending_polls: u32,
    never_completes: bool,
    data_scanned: u64,
    failures: Vec<(String, QueryState, String)>,
    status_latency: Duration,
    rejections: Vec<(String, String)>,
    drop_partitions: bool,
}

impl MockQueryEngine {
    /// Creates an engine with an empty catalog where every query finishes
    /// on the first status sample.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the raw allow-list the domain table reads.
    pub fn with_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state_mut()
            .domains
            .extend(domains.into_iter().map(Into::into));
        self
    }

    /// Seeds rows of the URL index.
    pub fn with_index_rows(mut self, rows: impl IntoIterator<Item = IndexRow>) -> Self {
        self.state_mut().index_rows.extend(rows);
        self
    }

    /// Writes UNLOAD output into `store`.
    pub fn with_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Reports RUNNING for `polls` samples before the final state.
    pub fn with_pending_polls(mut self, polls: u32) -> Self {
        self.pending_polls = polls;
        self
    }

    /// Keeps every query RUNNING forever.
    pub fn never_completing(mut self) -> Self {
        self.never_completes = true;
        self
    }

    /// Bytes scanned reported by every successful query.
    pub fn with_data_scanned(mut self, bytes: u64) -> Self {
        self.data_scanned = bytes;
        self
    }

    /// Queries containing `pattern` end FAILED with `reason`.
    pub fn fail_when(mut self, pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        self.failures
            .push((pattern.into().to_lowercase(), QueryState::Failed, reason.into()));
        self
    }

    /// Queries containing `pattern` end CANCELLED with `reason`.
    pub fn cancel_when(mut self, pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        self.failures
            .push((pattern.into().to_lowercase(), QueryState::Cancelled, reason.into()));
        self
    }

    /// Every status sample takes `latency` to answer.
    pub fn with_status_latency(mut self, latency: Duration) -> Self {
        self.status_latency = latency;
        self
    }

    /// Queries containing `pattern` are rejected at submission with `diagnostic`.
    pub fn reject_when(
        mut self,
        pattern: impl Into<String>,
        diagnostic: impl Into<String>,
    ) -> Self {
        self.rejections
            .push((pattern.into().to_lowercase(), diagnostic.into()));
        self
    }

    /// `ADD PARTITION` succeeds but never shows up in partition metadata.
    pub fn dropping_partitions(mut self) -> Self {
        self.drop_partitions = true;
        self
    }

    /// Every statement passed to `start_execution`, rejected ones included.
    pub fn submitted_sql(&self) -> Vec<String> {
        self.lock().submitted.clone()
    }

    /// Number of status samples taken so far.
    pub fn status_calls(&self) -> usize {
        self.lock().status_calls
    }

    /// Qualified names of created tables.
    pub fn table_names(&self) -> Vec<String> {
        self.lock().tables.keys().cloned().collect()
    }

    /// Qualified names of created views.
    pub fn view_names(&self) -> Vec<String> {
        self.lock().views.keys().cloned().collect()
    }

    /// Registered partitions across all tables.
    pub fn partitions(&self) -> Vec<PartitionKey> {
        self.lock()
            .partitions
            .iter()
            .map(|(_, key)| key.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn state_mut(&mut self) -> &mut MockState {
        self.state.get_mut().unwrap_or_else(|e| e.into_inner())
    }

    fn count_page(column: &str, count: usize) -> ResultPage {
        ResultPage::with_header(
            vec![column.to_string()],
            vec![vec![Some(count.to_string())]],
        )
    }

    fn interpret(&self, state: &mut MockState, sql: &str) -> Effect {
        if let Some(caps) = create_table_re().captures(sql) {
            state
                .tables
                .entry(caps[1].to_string())
                .or_insert_with(|| sql.to_string());
            return Effect::Rows(ResultPage::default());
        }

        if let Some(caps) = create_view_re().captures(sql) {
            let source = &caps[2];
            if !state.tables.contains_key(source) {
                return Effect::Failed(format!("Table {source} does not exist"));
            }
            state.views.insert(caps[1].to_string(), source.to_string());
            return Effect::Rows(ResultPage::default());
        }

        if let Some(caps) = add_partition_re().captures(sql) {
            return self.add_partition(state, &caps);
        }

        if let Some(caps) = partition_count_re().captures(sql) {
            let table = format!("{}.{}", &caps[2], &caps[3]);
            if !state.tables.contains_key(&table) {
                return Effect::Failed(format!("Table {table} does not exist"));
            }
            let found = PartitionKey::new(&caps[4], &caps[5])
                .map(|key| state.partitions.contains(&(table, key)))
                .unwrap_or(false);
            return Effect::Rows(Self::count_page(&caps[1], usize::from(found)));
        }

        if let Some(caps) = row_count_re().captures(sql) {
            let source = &caps[2];
            let count = if state.views.contains_key(source) {
                AllowList::from_raw(&state.domains).len()
            } else if state.tables.contains_key(source) {
                state.domains.len()
            } else {
                return Effect::Failed(format!("Table {source} does not exist"));
            };
            return Effect::Rows(Self::count_page(&caps[1], count));
        }

        if let Some(caps) = unload_re().captures(sql) {
            let Ok(key) = PartitionKey::new(&caps[1], &caps[2]) else {
                return Effect::Failed(format!("Invalid partition {}/{}", &caps[1], &caps[2]));
            };
            let registered = state.partitions.iter().any(|(_, k)| *k == key);
            let records = if registered {
                export_records(&state.index_rows, &AllowList::from_raw(&state.domains), &key)
            } else {
                Vec::new()
            };
            return Effect::Unload {
                target: caps[3].to_string(),
                records,
            };
        }

        Effect::Rows(ResultPage::default())
    }

    fn add_partition(&self, state: &mut MockState, caps: &Captures<'_>) -> Effect {
        let table = caps[1].to_string();
        if !state.tables.contains_key(&table) {
            return Effect::Failed(format!("Table {table} does not exist"));
        }
        match PartitionKey::new(&caps[2], &caps[3]) {
            Ok(key) => {
                if !self.drop_partitions {
                    state.partitions.insert((table, key));
                }
                Effect::Rows(ResultPage::default())
            }
            Err(e) => Effect::Failed(e.to_string()),
        }
    }

    /// Writes one shard under `target`. Returns a failure reason when the
    /// target already holds objects, as the real engine refuses to unload
    /// into a non-empty location.
    async fn write_unload(
        &self,
        execution_id: &str,
        target: &str,
        records: &[crate::export::ExportRecord],
    ) -> Result<Option<String>> {
        let Some(store) = &self.store else {
            debug!("No store attached; dropping {} exported records", records.len());
            return Ok(None);
        };
        let prefix = S3Location::parse(target)?.as_prefix();
        if !store.list_objects(&prefix).await?.is_empty() {
            return Ok(Some(format!(
                "HIVE_PATH_ALREADY_EXISTS: Target directory for table already exists: {prefix}"
            )));
        }
        if records.is_empty() {
            return Ok(None);
        }
        let location = prefix.join(&format!("{execution_id}_00000.gz"));
        store.put_object(&location, encode_jsonl_gz(records)?).await?;
        Ok(None)
    }

    fn succeeded(&self) -> ExecutionStatus {
        ExecutionStatus {
            state: QueryState::Succeeded,
            data_scanned_bytes: Some(self.data_scanned),
            failure_reason: None,
        }
    }

    fn failed(reason: String) -> ExecutionStatus {
        Self::ended(QueryState::Failed, reason)
    }

    fn ended(state: QueryState, reason: String) -> ExecutionStatus {
        ExecutionStatus {
            state,
            data_scanned_bytes: None,
            failure_reason: Some(reason),
        }
    }
}

#[async_trait]
impl QueryEngine for MockQueryEngine {
    async fn start_execution(&self, sql: &str, _output_location: &str) -> Result<String> {
        let lowered = sql.to_lowercase();
        {
            let mut state = self.lock();
            state.submitted.push(sql.to_string());
            if let Some((_, diagnostic)) =
                self.rejections.iter().find(|(p, _)| lowered.contains(p))
            {
                return Err(CdxError::submission(diagnostic.clone()));
            }
        }

        let id = uuid::Uuid::new_v4().to_string();

        let effect = match self.failures.iter().find(|(p, _, _)| lowered.contains(p)) {
            Some((_, state, reason)) => Effect::Ended(*state, reason.clone()),
            None => {
                let mut state = self.lock();
                self.interpret(&mut state, sql)
            }
        };

        let (outcome, page) = match effect {
            Effect::Rows(page) => (self.succeeded(), page),
            Effect::Failed(reason) => (Self::failed(reason), ResultPage::default()),
            Effect::Ended(state, reason) => (Self::ended(state, reason), ResultPage::default()),
            Effect::Unload { target, records } => {
                let outcome = match self.write_unload(&id, &target, &records).await? {
                    Some(reason) => Self::failed(reason),
                    None => self.succeeded(),
                };
                (outcome, ResultPage::default())
            }
        };

        self.lock().executions.insert(
            id.clone(),
            MockExecution {
                polls_left: self.pending_polls,
                outcome,
                page,
            },
        );
        Ok(id)
    }

    async fn get_execution_status(&self, execution_id: &str) -> Result<ExecutionStatus> {
        if !self.status_latency.is_zero() {
            tokio::time::sleep(self.status_latency).await;
        }
        let mut state = self.lock();
        state.status_calls += 1;
        let never_completes = self.never_completes;
        let execution = state
            .executions
            .get_mut(execution_id)
            .ok_or_else(|| CdxError::engine(format!("Unknown execution {execution_id}")))?;

        if never_completes {
            return Ok(ExecutionStatus::new(QueryState::Running));
        }
        if execution.polls_left > 0 {
            execution.polls_left -= 1;
            return Ok(ExecutionStatus::new(QueryState::Running));
        }
        Ok(execution.outcome.clone())
    }

    async fn get_results(&self, execution_id: &str, page_size: usize) -> Result<ResultPage> {
        let state = self.lock();
        let execution = state
            .executions
            .get(execution_id)
            .ok_or_else(|| CdxError::engine(format!("Unknown execution {execution_id}")))?;

        let mut page = execution.page.clone();
        page.rows.truncate(page_size);
        Ok(page)
    }
}
