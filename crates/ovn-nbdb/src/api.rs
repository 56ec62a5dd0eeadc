//! Typed Northbound queries and operation builders.
//!
//! Reads are `select` transactions; writes are built as [`Operation`]s so
//! callers can compose several of them into one atomic [`Transaction`].

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::client::{transact_checked, NbClient};
use crate::datum::{Datum, Uuid};
use crate::error::NbResult;
use crate::model::{columns, LogicalSwitch, LogicalSwitchPort, TableModel};
use crate::ops::{Condition, Mutation, Mutator, OpResult, Operation, Transaction};

/// Northbound access for logical switches and their ports.
#[derive(Clone)]
pub struct NbApi {
    client: Arc<dyn NbClient>,
}

impl NbApi {
    pub fn new(client: Arc<dyn NbClient>) -> Self {
        Self { client }
    }

    /// Commits a batch; the first per-operation error voids it.
    pub async fn commit(&self, txn: Transaction) -> NbResult<Vec<OpResult>> {
        debug!(operations = txn.len(), "Committing Northbound transaction");
        transact_checked(self.client.as_ref(), txn).await
    }

    async fn select<T: TableModel>(&self, conditions: Vec<Condition>) -> NbResult<Vec<T>> {
        let txn = Transaction::new().with(Operation::Select {
            table: T::TABLE.to_string(),
            conditions,
        });
        let results = self.commit(txn).await?;
        results
            .first()
            .map(|r| r.rows.iter().map(T::from_row).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn select_one<T: TableModel>(&self, conditions: Vec<Condition>) -> NbResult<Option<T>> {
        Ok(self.select(conditions).await?.into_iter().next())
    }

    pub async fn find_switch(&self, name: &str) -> NbResult<Option<LogicalSwitch>> {
        self.select_one(vec![Condition::eq(columns::NAME, Datum::string(name))])
            .await
    }

    /// First switch whose `other_config` holds `key=value`.
    pub async fn find_switch_by_other_config(
        &self,
        key: &str,
        value: &str,
    ) -> NbResult<Option<LogicalSwitch>> {
        self.select_one(vec![Condition::includes(
            columns::OTHER_CONFIG,
            Datum::string_map([(key, value)]),
        )])
        .await
    }

    pub async fn find_port(&self, name: &str) -> NbResult<Option<LogicalSwitchPort>> {
        self.select_one(vec![Condition::eq(columns::NAME, Datum::string(name))])
            .await
    }

    /// Ports referenced by a switch, fetched in one batch.
    pub async fn switch_ports(&self, ls: &LogicalSwitch) -> NbResult<Vec<LogicalSwitchPort>> {
        if ls.ports.is_empty() {
            return Ok(Vec::new());
        }
        let mut txn = Transaction::new();
        txn.extend(ls.ports.iter().map(|uuid| Operation::Select {
            table: LogicalSwitchPort::TABLE.to_string(),
            conditions: vec![Condition::uuid_eq(uuid)],
        }));
        let results = self.commit(txn).await?;
        results
            .iter()
            .flat_map(|r| r.rows.iter())
            .map(LogicalSwitchPort::from_row)
            .collect()
    }

    /// Port on the named switch whose addresses carry `ip`.
    pub async fn find_port_by_ip(
        &self,
        switch_name: &str,
        ip: &str,
    ) -> NbResult<Option<LogicalSwitchPort>> {
        let Some(ls) = self.find_switch(switch_name).await? else {
            return Ok(None);
        };
        Ok(self
            .switch_ports(&ls)
            .await?
            .into_iter()
            .find(|lsp| lsp.has_ip(ip)))
    }

    pub fn create_switch_op(name: &str, other_config: BTreeMap<String, String>) -> Operation {
        Operation::Insert {
            table: LogicalSwitch::TABLE.to_string(),
            row: LogicalSwitch::new(name, other_config).to_row(),
            uuid_name: None,
        }
    }

    pub fn delete_switch_op(ls: &LogicalSwitch) -> NbResult<Operation> {
        Ok(Operation::Delete {
            table: LogicalSwitch::TABLE.to_string(),
            conditions: vec![Condition::uuid_eq(ls.require_uuid()?)],
        })
    }

    /// Adds key/value pairs to a switch's `other_config`. Existing keys keep
    /// their value.
    pub fn insert_switch_other_config_op(
        ls: &LogicalSwitch,
        values: BTreeMap<String, String>,
    ) -> NbResult<Operation> {
        Self::mutate_switch_op(
            ls,
            Mutation::new(columns::OTHER_CONFIG, Mutator::Insert, Datum::string_map(values)),
        )
    }

    /// Removes keys from a switch's `other_config`, whatever their value.
    pub fn delete_switch_other_config_op(ls: &LogicalSwitch, keys: &[String]) -> NbResult<Operation> {
        Self::mutate_switch_op(
            ls,
            Mutation::new(
                columns::OTHER_CONFIG,
                Mutator::Delete,
                Datum::string_set(keys.iter().cloned()),
            ),
        )
    }

    /// Inserts into or deletes from a switch's `ports`. Entries may be
    /// forward references to ports inserted earlier in the same batch.
    pub fn mutate_switch_ports_op(
        ls: &LogicalSwitch,
        mutator: Mutator,
        ports: Vec<Uuid>,
    ) -> NbResult<Operation> {
        Self::mutate_switch_op(ls, Mutation::new(columns::PORTS, mutator, Datum::uuid_set(ports)))
    }

    fn mutate_switch_op(ls: &LogicalSwitch, mutation: Mutation) -> NbResult<Operation> {
        Ok(Operation::Mutate {
            table: LogicalSwitch::TABLE.to_string(),
            conditions: vec![Condition::uuid_eq(ls.require_uuid()?)],
            mutations: vec![mutation],
        })
    }

    pub fn create_port_op(lsp: &LogicalSwitchPort, uuid_name: &str) -> Operation {
        Operation::Insert {
            table: LogicalSwitchPort::TABLE.to_string(),
            row: lsp.to_row(),
            uuid_name: Some(uuid_name.to_string()),
        }
    }

    pub fn delete_port_op(lsp: &LogicalSwitchPort) -> NbResult<Operation> {
        Ok(Operation::Delete {
            table: LogicalSwitchPort::TABLE.to_string(),
            conditions: vec![Condition::uuid_eq(lsp.require_uuid()?)],
        })
    }
}
