//! In-process Northbound database.
//!
//! Backs the `memory:` connection and the test suites. Each transaction runs
//! against a scratch copy of the tables and replaces them only if every
//! operation and every commit-time check succeeds, matching the all or
//! nothing behavior of `ovsdb-server`. Commit-time checks cover the rules the
//! driver relies on:
//!
//! - `Logical_Switch_Port.name` is unique,
//! - every uuid in `Logical_Switch.ports` names an existing port,
//! - ports no switch references are garbage collected.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::client::NbClient;
use crate::datum::{Atom, Datum, Row, Uuid, UUID_COLUMN};
use crate::error::{NbError, NbResult};
use crate::model::{columns, LogicalSwitch, LogicalSwitchPort, TableModel};
use crate::ops::{Condition, Mutation, Mutator, OpResult, Operation, Transaction};

type Table = BTreeMap<String, Row>;
type Tables = BTreeMap<String, Table>;

/// A failure injected into matching operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    /// Table to match; `None` matches every table.
    pub table: Option<String>,
    /// OVSDB op name (`"insert"`, `"mutate"`...) to match; `None` matches all.
    pub op: Option<&'static str>,
    pub message: String,
    /// Removed after the first hit.
    pub once: bool,
}

impl Fault {
    pub fn on(op: &'static str, table: &str) -> Self {
        Self {
            table: Some(table.to_string()),
            op: Some(op),
            message: format!("{} on {} rejected", op, table),
            once: false,
        }
    }

    pub fn any_write() -> Self {
        Self {
            table: None,
            op: None,
            message: "write rejected".to_string(),
            once: false,
        }
    }

    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    fn matches(&self, op: &Operation) -> bool {
        op.is_write()
            && self.table.as_deref().map_or(true, |t| t == op.table())
            && self.op.map_or(true, |name| name == op.name())
    }
}

#[derive(Default)]
struct State {
    tables: Tables,
    faults: Vec<Fault>,
    unreachable: bool,
    latency: Option<Duration>,
    transactions: usize,
    writes: usize,
}

/// Northbound database held in memory.
#[derive(Default)]
pub struct MemoryNb {
    state: Mutex<State>,
}

impl MemoryNb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Injects a fault into every later matching write.
    pub fn inject(&self, fault: Fault) {
        self.state.lock().faults.push(fault);
    }

    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }

    /// While set, every transaction fails as if the server were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// Delays every transaction before it is applied.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state.lock().latency = latency;
    }

    /// Transactions submitted so far, reads included.
    pub fn transaction_count(&self) -> usize {
        self.state.lock().transactions
    }

    /// Transactions submitted so far that carried at least one write.
    pub fn write_count(&self) -> usize {
        self.state.lock().writes
    }

    pub fn switches(&self) -> Vec<LogicalSwitch> {
        self.decode_table()
    }

    pub fn ports(&self) -> Vec<LogicalSwitchPort> {
        self.decode_table()
    }

    fn decode_table<T: TableModel>(&self) -> Vec<T> {
        let state = self.state.lock();
        state
            .tables
            .get(T::TABLE)
            .map(|table| table.values().filter_map(|row| T::from_row(row).ok()).collect())
            .unwrap_or_default()
    }

    fn apply(&self, txn: &Transaction) -> NbResult<Vec<OpResult>> {
        let mut state = self.state.lock();
        state.transactions += 1;
        if state.unreachable {
            return Err(NbError::Connection("northbound database unreachable".to_string()));
        }
        if !txn.is_read_only() {
            state.writes += 1;
        }

        let mut scratch = Scratch {
            tables: state.tables.clone(),
            named: HashMap::new(),
        };
        let mut results = Vec::with_capacity(txn.len());

        for (index, op) in txn.operations().iter().enumerate() {
            let fault = state.faults.iter().position(|f| f.matches(op));
            let outcome = match fault {
                Some(position) => {
                    let fault = state.faults[position].clone();
                    if fault.once {
                        state.faults.remove(position);
                    }
                    Err(OpError::new("injected failure", fault.message))
                }
                None => scratch.execute(op),
            };

            match outcome {
                Ok(result) => results.push(result),
                Err(e) => {
                    debug!(index, op = op.name(), error = %e.error, "Operation failed, aborting");
                    results.push(OpResult::error(e.error, e.details));
                    results.resize(txn.len(), OpResult::default());
                    return Ok(results);
                }
            }
        }

        if txn.is_read_only() {
            return Ok(results);
        }

        match scratch.finish() {
            Ok(tables) => {
                state.tables = tables;
                Ok(results)
            }
            Err(e) => {
                warn!(error = %e.error, details = %e.details, "Commit rejected");
                results.push(OpResult::error(e.error, e.details));
                Ok(results)
            }
        }
    }
}

#[async_trait]
impl NbClient for MemoryNb {
    async fn transact(&self, txn: Transaction) -> NbResult<Vec<OpResult>> {
        let latency = self.state.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.apply(&txn)
    }
}

struct OpError {
    error: String,
    details: String,
}

impl OpError {
    fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }
}

/// Tables being modified by one transaction.
struct Scratch {
    tables: Tables,
    /// uuid-name to the real uuid it was assigned.
    named: HashMap<String, String>,
}

impl Scratch {
    fn execute(&mut self, op: &Operation) -> Result<OpResult, OpError> {
        match op {
            Operation::Insert {
                table,
                row,
                uuid_name,
            } => self.insert(table, row, uuid_name.as_deref()),
            Operation::Select { table, conditions } => {
                let conditions = self.resolve_conditions(conditions)?;
                Ok(OpResult::rows(
                    self.matching(table, &conditions)
                        .map(|(_, row)| row.clone())
                        .collect(),
                ))
            }
            Operation::Update {
                table,
                conditions,
                row,
            } => {
                if row.contains_key(UUID_COLUMN) {
                    return Err(OpError::new("constraint violation", "_uuid is read-only"));
                }
                let conditions = self.resolve_conditions(conditions)?;
                let row = self.resolve_row(row)?;
                let keys = self.matching_keys(table, &conditions);
                let rows = self.table_mut(table);
                for key in &keys {
                    if let Some(existing) = rows.get_mut(key) {
                        existing.extend(row.clone());
                    }
                }
                Ok(OpResult::count(keys.len()))
            }
            Operation::Mutate {
                table,
                conditions,
                mutations,
            } => {
                let conditions = self.resolve_conditions(conditions)?;
                let mutations = mutations
                    .iter()
                    .map(|m| {
                        Ok(Mutation::new(
                            m.column.clone(),
                            m.mutator,
                            self.resolve_datum(&m.value)?,
                        ))
                    })
                    .collect::<Result<Vec<_>, OpError>>()?;
                let keys = self.matching_keys(table, &conditions);
                let rows = self.table_mut(table);
                for key in &keys {
                    if let Some(existing) = rows.get_mut(key) {
                        for mutation in &mutations {
                            mutate(existing, mutation)?;
                        }
                    }
                }
                Ok(OpResult::count(keys.len()))
            }
            Operation::Delete { table, conditions } => {
                let conditions = self.resolve_conditions(conditions)?;
                let keys = self.matching_keys(table, &conditions);
                let rows = self.table_mut(table);
                for key in &keys {
                    rows.remove(key);
                }
                Ok(OpResult::count(keys.len()))
            }
        }
    }

    fn insert(
        &mut self,
        table: &str,
        row: &Row,
        uuid_name: Option<&str>,
    ) -> Result<OpResult, OpError> {
        let mut row = self.resolve_row(row)?;
        let uuid = uuid::Uuid::new_v4().to_string();
        if let Some(name) = uuid_name {
            if self.named.insert(name.to_string(), uuid.clone()).is_some() {
                return Err(OpError::new(
                    "duplicate uuid-name",
                    format!("{} used twice in one transaction", name),
                ));
            }
        }
        row.insert(UUID_COLUMN.to_string(), Datum::uuid(Uuid::real(&uuid)));
        self.table_mut(table).insert(uuid.clone(), row);
        Ok(OpResult::inserted(Uuid::real(uuid)))
    }

    fn table_mut(&mut self, table: &str) -> &mut Table {
        self.tables.entry(table.to_string()).or_default()
    }

    fn matching<'a>(
        &'a self,
        table: &str,
        conditions: &'a [Condition],
    ) -> impl Iterator<Item = (&'a String, &'a Row)> + 'a {
        self.tables
            .get(table)
            .into_iter()
            .flat_map(|rows| rows.iter())
            .filter(move |(_, row)| conditions.iter().all(|c| c.matches(row)))
    }

    fn matching_keys(&self, table: &str, conditions: &[Condition]) -> Vec<String> {
        self.matching(table, conditions)
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn resolve_atom(&self, atom: &Atom) -> Result<Atom, OpError> {
        match atom {
            Atom::Uuid(Uuid::Named(name)) => self
                .named
                .get(name)
                .map(|real| Atom::Uuid(Uuid::real(real)))
                .ok_or_else(|| OpError::new("unknown named-uuid", name.clone())),
            other => Ok(other.clone()),
        }
    }

    fn resolve_datum(&self, datum: &Datum) -> Result<Datum, OpError> {
        Ok(match datum {
            Datum::Atom(a) => Datum::Atom(self.resolve_atom(a)?),
            Datum::Set(set) => Datum::Set(
                set.iter()
                    .map(|a| self.resolve_atom(a))
                    .collect::<Result<BTreeSet<_>, OpError>>()?,
            ),
            Datum::Map(map) => Datum::Map(
                map.iter()
                    .map(|(k, v)| Ok((self.resolve_atom(k)?, self.resolve_atom(v)?)))
                    .collect::<Result<BTreeMap<_, _>, OpError>>()?,
            ),
        })
    }

    fn resolve_row(&self, row: &Row) -> Result<Row, OpError> {
        row.iter()
            .map(|(column, datum)| Ok((column.clone(), self.resolve_datum(datum)?)))
            .collect()
    }

    fn resolve_conditions(&self, conditions: &[Condition]) -> Result<Vec<Condition>, OpError> {
        conditions
            .iter()
            .map(|c| Ok(Condition::new(c.column.clone(), c.function, self.resolve_datum(&c.value)?)))
            .collect()
    }

    /// Commit-time checks, then garbage collection of orphan ports.
    fn finish(mut self) -> Result<Tables, OpError> {
        let ports = self
            .tables
            .get(LogicalSwitchPort::TABLE)
            .cloned()
            .unwrap_or_default();

        let mut names = BTreeSet::new();
        for row in ports.values() {
            if let Some(name) = row.get(columns::NAME).and_then(Datum::as_str) {
                if !names.insert(name.to_string()) {
                    return Err(OpError::new(
                        "constraint violation",
                        format!(
                            "Transaction causes multiple rows in \"{}\" table to have identical values ({}) for index on column \"name\"",
                            LogicalSwitchPort::TABLE,
                            name
                        ),
                    ));
                }
            }
        }

        let mut referenced = BTreeSet::new();
        if let Some(switches) = self.tables.get(LogicalSwitch::TABLE) {
            for row in switches.values() {
                let Some(ports_column) = row.get(columns::PORTS) else {
                    continue;
                };
                for uuid in ports_column.to_uuid_vec() {
                    if !ports.contains_key(uuid.as_str()) {
                        return Err(OpError::new(
                            "referential integrity violation",
                            format!(
                                "Table {} column {} row references nonexistent row {} in table {}",
                                LogicalSwitch::TABLE,
                                columns::PORTS,
                                uuid,
                                LogicalSwitchPort::TABLE
                            ),
                        ));
                    }
                    referenced.insert(uuid.as_str().to_string());
                }
            }
        }

        if let Some(ports) = self.tables.get_mut(LogicalSwitchPort::TABLE) {
            ports.retain(|uuid, _| referenced.contains(uuid));
        }
        Ok(self.tables)
    }
}

fn mutate(row: &mut Row, mutation: &Mutation) -> Result<(), OpError> {
    if mutation.column == UUID_COLUMN {
        return Err(OpError::new("constraint violation", "_uuid is read-only"));
    }
    let updated = match (row.remove(&mutation.column), &mutation.value) {
        (Some(Datum::Map(map)), _) => mutate_map(map, mutation)?,
        (None, Datum::Map(_)) => mutate_map(BTreeMap::new(), mutation)?,
        (current, _) => {
            let mut set = current.map(|d| d.to_set()).unwrap_or_default();
            let elements = mutation.value.to_set();
            match mutation.mutator {
                Mutator::Insert => set.extend(elements),
                Mutator::Delete => set.retain(|a| !elements.contains(a)),
            }
            Datum::Set(set)
        }
    };
    row.insert(mutation.column.clone(), updated);
    Ok(())
}

fn mutate_map(mut map: BTreeMap<Atom, Atom>, mutation: &Mutation) -> Result<Datum, OpError> {
    match (mutation.mutator, &mutation.value) {
        (Mutator::Insert, Datum::Map(pairs)) => {
            for (key, value) in pairs {
                map.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
        (Mutator::Delete, Datum::Map(pairs)) => {
            map.retain(|key, value| pairs.get(key) != Some(value));
        }
        (Mutator::Delete, keys) => {
            let keys = keys.to_set();
            map.retain(|key, _| !keys.contains(key));
        }
        (Mutator::Insert, other) => {
            return Err(OpError::new(
                "constraint violation",
                format!("cannot insert {:?} into a map column", other),
            ))
        }
    }
    Ok(Datum::Map(map))
}
