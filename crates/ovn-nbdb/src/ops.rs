//! Transaction operations and their results.
//!
//! A [`Transaction`] is an ordered batch of [`Operation`]s submitted as one
//! atomic unit: either every operation commits or none does. Rows inserted
//! earlier in a batch can be referenced by later operations through a
//! [`Uuid::Named`] handle minted with [`named_uuid`].

use serde_json::{json, Value};

use crate::datum::{row_from_json, row_to_json, Datum, Row, Uuid, UUID_COLUMN};
use crate::error::{NbError, NbResult};

/// Comparison function of a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Equal,
    NotEqual,
    Includes,
    Excludes,
}

impl Function {
    pub fn as_str(&self) -> &'static str {
        match self {
            Function::Equal => "==",
            Function::NotEqual => "!=",
            Function::Includes => "includes",
            Function::Excludes => "excludes",
        }
    }
}

/// A `where` clause element: `[column, function, value]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub column: String,
    pub function: Function,
    pub value: Datum,
}

impl Condition {
    pub fn new(column: impl Into<String>, function: Function, value: Datum) -> Self {
        Self {
            column: column.into(),
            function,
            value,
        }
    }

    pub fn eq(column: impl Into<String>, value: Datum) -> Self {
        Self::new(column, Function::Equal, value)
    }

    pub fn includes(column: impl Into<String>, value: Datum) -> Self {
        Self::new(column, Function::Includes, value)
    }

    /// Matches exactly one row by identity.
    pub fn uuid_eq(uuid: &Uuid) -> Self {
        Self::eq(UUID_COLUMN, Datum::uuid(uuid.clone()))
    }

    /// Evaluates the condition against a row. Missing columns are empty sets.
    pub fn matches(&self, row: &Row) -> bool {
        let empty = Datum::empty_set();
        let actual = row.get(&self.column).unwrap_or(&empty);
        match self.function {
            Function::Equal => actual.same_value(&self.value),
            Function::NotEqual => !actual.same_value(&self.value),
            Function::Includes => actual.includes(&self.value),
            Function::Excludes => !actual.includes(&self.value),
        }
    }

    pub fn to_json(&self) -> Value {
        json!([self.column, self.function.as_str(), self.value.to_json()])
    }
}

/// Mutators supported on set and map columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutator {
    /// Add elements (sets) or key/value pairs whose key is absent (maps).
    Insert,
    /// Remove elements (sets), keys (map with a set value) or pairs (map with a map value).
    Delete,
}

impl Mutator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mutator::Insert => "insert",
            Mutator::Delete => "delete",
        }
    }
}

/// One `[column, mutator, value]` triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub column: String,
    pub mutator: Mutator,
    pub value: Datum,
}

impl Mutation {
    pub fn new(column: impl Into<String>, mutator: Mutator, value: Datum) -> Self {
        Self {
            column: column.into(),
            mutator,
            value,
        }
    }

    pub fn to_json(&self) -> Value {
        json!([self.column, self.mutator.as_str(), self.value.to_json()])
    }
}

/// One operation inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Create a row, optionally naming it for later forward references.
    Insert {
        table: String,
        row: Row,
        uuid_name: Option<String>,
    },
    Select {
        table: String,
        conditions: Vec<Condition>,
    },
    /// Replace the given columns of every matching row.
    Update {
        table: String,
        conditions: Vec<Condition>,
        row: Row,
    },
    Mutate {
        table: String,
        conditions: Vec<Condition>,
        mutations: Vec<Mutation>,
    },
    Delete {
        table: String,
        conditions: Vec<Condition>,
    },
}

impl Operation {
    pub fn table(&self) -> &str {
        match self {
            Operation::Insert { table, .. }
            | Operation::Select { table, .. }
            | Operation::Update { table, .. }
            | Operation::Mutate { table, .. }
            | Operation::Delete { table, .. } => table,
        }
    }

    /// The OVSDB `op` name.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Insert { .. } => "insert",
            Operation::Select { .. } => "select",
            Operation::Update { .. } => "update",
            Operation::Mutate { .. } => "mutate",
            Operation::Delete { .. } => "delete",
        }
    }

    /// True for every operation but `select`.
    pub fn is_write(&self) -> bool {
        !matches!(self, Operation::Select { .. })
    }

    pub fn to_json(&self) -> Value {
        fn conditions_json(conditions: &[Condition]) -> Value {
            Value::Array(conditions.iter().map(Condition::to_json).collect())
        }

        match self {
            Operation::Insert {
                table,
                row,
                uuid_name,
            } => {
                let mut op = json!({"op": "insert", "table": table, "row": row_to_json(row)});
                if let Some(name) = uuid_name {
                    op["uuid-name"] = Value::String(name.clone());
                }
                op
            }
            Operation::Select { table, conditions } => {
                json!({"op": "select", "table": table, "where": conditions_json(conditions)})
            }
            Operation::Update {
                table,
                conditions,
                row,
            } => json!({
                "op": "update",
                "table": table,
                "where": conditions_json(conditions),
                "row": row_to_json(row),
            }),
            Operation::Mutate {
                table,
                conditions,
                mutations,
            } => json!({
                "op": "mutate",
                "table": table,
                "where": conditions_json(conditions),
                "mutations": mutations.iter().map(Mutation::to_json).collect::<Vec<_>>(),
            }),
            Operation::Delete { table, conditions } => {
                json!({"op": "delete", "table": table, "where": conditions_json(conditions)})
            }
        }
    }
}

/// Mints a named-uuid from a hint.
///
/// OVSDB requires `[A-Za-z_][A-Za-z0-9_]*`; other characters become `_`.
pub fn named_uuid(hint: &str) -> String {
    let cleaned: String = hint
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    match cleaned.chars().next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => cleaned,
        _ => format!("row_{}", cleaned),
    }
}

/// An ordered batch of operations committed atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    operations: Vec<Operation>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an operation (builder style).
    pub fn with(mut self, op: Operation) -> Self {
        self.operations.push(op);
        self
    }

    pub fn push(&mut self, op: Operation) -> &mut Self {
        self.operations.push(op);
        self
    }

    pub fn extend(&mut self, ops: impl IntoIterator<Item = Operation>) -> &mut Self {
        self.operations.extend(ops);
        self
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn is_read_only(&self) -> bool {
        !self.operations.iter().any(Operation::is_write)
    }

    /// JSON-RPC `params` for the `transact` method.
    pub fn to_params(&self, database: &str) -> Value {
        let mut params = vec![Value::String(database.to_string())];
        params.extend(self.operations.iter().map(Operation::to_json));
        Value::Array(params)
    }
}

/// Outcome of one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpResult {
    /// Identity assigned by `insert`.
    pub uuid: Option<Uuid>,
    /// Rows returned by `select`.
    pub rows: Vec<Row>,
    /// Rows touched by `update`, `mutate` and `delete`.
    pub count: Option<i64>,
    pub error: Option<String>,
    pub details: Option<String>,
}

impl OpResult {
    pub fn count(count: usize) -> Self {
        Self {
            count: Some(count as i64),
            ..Self::default()
        }
    }

    pub fn inserted(uuid: Uuid) -> Self {
        Self {
            uuid: Some(uuid),
            ..Self::default()
        }
    }

    pub fn rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    pub fn error(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            details: Some(details.into()),
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// `error: details`, or just `error`.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|e| match &self.details {
            Some(d) if !d.is_empty() => format!("{}: {}", e, d),
            _ => e.clone(),
        })
    }

    /// Decodes one element of a `transact` result array. `null` marks an
    /// operation that was not executed because an earlier one failed.
    pub fn from_json(value: &Value) -> NbResult<Self> {
        let object = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(o) => o,
            other => {
                return Err(NbError::decode(
                    "operation result",
                    format!("unexpected {}", other),
                ))
            }
        };

        let mut result = Self::default();
        if let Some(uuid) = object.get("uuid") {
            result.uuid = crate::datum::Atom::from_json(uuid)?.as_uuid().cloned();
        }
        if let Some(Value::Array(rows)) = object.get("rows") {
            result.rows = rows.iter().map(row_from_json).collect::<NbResult<_>>()?;
        }
        result.count = object.get("count").and_then(Value::as_i64);
        result.error = object
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string);
        result.details = object
            .get("details")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(result)
    }
}

/// Batch-level checks over a result list.
pub trait TransactResultsExt {
    /// First error reported anywhere in the batch.
    fn first_error(&self) -> Option<String>;

    /// Fails with [`NbError::Transaction`] if any operation reported an error.
    /// A batch with an error committed nothing.
    fn check(&self) -> NbResult<()>;
}

impl TransactResultsExt for [OpResult] {
    fn first_error(&self) -> Option<String> {
        self.iter().find_map(OpResult::error_message)
    }

    fn check(&self) -> NbResult<()> {
        match self.first_error() {
            Some(message) => Err(NbError::Transaction(message)),
            None => Ok(()),
        }
    }
}
