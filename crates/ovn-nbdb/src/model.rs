//! OVN Northbound table models.
//!
//! Only the columns the driver reads or writes are modelled; unknown columns
//! are ignored on decode.

use std::collections::BTreeMap;

use crate::datum::{row_uuid, Datum, Row, Uuid};
use crate::error::{NbError, NbResult};

/// Northbound database name.
pub const NB_DATABASE: &str = "OVN_Northbound";

/// Logical_Switch table name.
pub const LOGICAL_SWITCH_TABLE: &str = "Logical_Switch";

/// Logical_Switch_Port table name.
pub const LOGICAL_SWITCH_PORT_TABLE: &str = "Logical_Switch_Port";

/// Column names
pub mod columns {
    pub const NAME: &str = "name";
    pub const PORTS: &str = "ports";
    pub const OTHER_CONFIG: &str = "other_config";
    pub const ADDRESSES: &str = "addresses";
    pub const PORT_SECURITY: &str = "port_security";
    pub const ENABLED: &str = "enabled";
    pub const TYPE: &str = "type";
    pub const OPTIONS: &str = "options";
    pub const EXTERNAL_IDS: &str = "external_ids";
}

/// A type stored in one Northbound table.
pub trait TableModel: Sized {
    const TABLE: &'static str;

    /// Decodes a row returned by `select` (must carry `_uuid`).
    fn from_row(row: &Row) -> NbResult<Self>;

    /// Encodes the writable columns (never `_uuid`).
    fn to_row(&self) -> Row;
}

fn required_uuid(table: &str, row: &Row) -> NbResult<Uuid> {
    row_uuid(row).ok_or_else(|| NbError::decode(format!("{} row", table), "missing _uuid"))
}

fn string_column(row: &Row, column: &str) -> String {
    row.get(column)
        .and_then(Datum::as_str)
        .unwrap_or_default()
        .to_string()
}

fn map_column(row: &Row, column: &str) -> BTreeMap<String, String> {
    row.get(column)
        .map(Datum::to_string_map)
        .unwrap_or_default()
}

fn set_column(row: &Row, column: &str) -> Vec<String> {
    row.get(column)
        .map(Datum::to_string_vec)
        .unwrap_or_default()
}

/// One broadcast domain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogicalSwitch {
    pub uuid: Option<Uuid>,
    pub name: String,
    pub ports: Vec<Uuid>,
    pub other_config: BTreeMap<String, String>,
}

impl LogicalSwitch {
    pub fn new(name: impl Into<String>, other_config: BTreeMap<String, String>) -> Self {
        Self {
            uuid: None,
            name: name.into(),
            ports: Vec::new(),
            other_config,
        }
    }

    /// Identity, or a decode error for rows built locally.
    pub fn require_uuid(&self) -> NbResult<&Uuid> {
        self.uuid
            .as_ref()
            .ok_or_else(|| NbError::decode("Logical_Switch", format!("{} has no _uuid", self.name)))
    }
}

impl TableModel for LogicalSwitch {
    const TABLE: &'static str = LOGICAL_SWITCH_TABLE;

    fn from_row(row: &Row) -> NbResult<Self> {
        Ok(Self {
            uuid: Some(required_uuid(Self::TABLE, row)?),
            name: string_column(row, columns::NAME),
            ports: row
                .get(columns::PORTS)
                .map(Datum::to_uuid_vec)
                .unwrap_or_default(),
            other_config: map_column(row, columns::OTHER_CONFIG),
        })
    }

    fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.insert(columns::NAME.to_string(), Datum::string(&self.name));
        row.insert(
            columns::PORTS.to_string(),
            Datum::uuid_set(self.ports.iter().cloned()),
        );
        row.insert(
            columns::OTHER_CONFIG.to_string(),
            Datum::string_map(self.other_config.clone()),
        );
        row
    }
}

/// One attachment point on a logical switch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogicalSwitchPort {
    pub uuid: Option<Uuid>,
    pub name: String,
    /// `"MAC IP..."` strings.
    pub addresses: Vec<String>,
    pub port_security: Vec<String>,
    pub enabled: Option<bool>,
    pub port_type: String,
    pub options: BTreeMap<String, String>,
    pub external_ids: BTreeMap<String, String>,
}

impl LogicalSwitchPort {
    pub fn require_uuid(&self) -> NbResult<&Uuid> {
        self.uuid.as_ref().ok_or_else(|| {
            NbError::decode("Logical_Switch_Port", format!("{} has no _uuid", self.name))
        })
    }

    /// True if any address string carries `ip` as a whitespace separated token.
    pub fn has_ip(&self, ip: &str) -> bool {
        self.addresses
            .iter()
            .any(|address| address == ip || address.split_whitespace().any(|part| part == ip))
    }
}

impl TableModel for LogicalSwitchPort {
    const TABLE: &'static str = LOGICAL_SWITCH_PORT_TABLE;

    fn from_row(row: &Row) -> NbResult<Self> {
        Ok(Self {
            uuid: Some(required_uuid(Self::TABLE, row)?),
            name: string_column(row, columns::NAME),
            addresses: set_column(row, columns::ADDRESSES),
            port_security: set_column(row, columns::PORT_SECURITY),
            enabled: row
                .get(columns::ENABLED)
                .and_then(Datum::as_atom)
                .and_then(|a| a.as_bool()),
            port_type: string_column(row, columns::TYPE),
            options: map_column(row, columns::OPTIONS),
            external_ids: map_column(row, columns::EXTERNAL_IDS),
        })
    }

    fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.insert(columns::NAME.to_string(), Datum::string(&self.name));
        row.insert(
            columns::ADDRESSES.to_string(),
            Datum::string_set(self.addresses.iter().cloned()),
        );
        row.insert(
            columns::PORT_SECURITY.to_string(),
            Datum::string_set(self.port_security.iter().cloned()),
        );
        // Optional column: an empty set means "unset".
        row.insert(
            columns::ENABLED.to_string(),
            match self.enabled {
                Some(enabled) => Datum::boolean(enabled),
                None => Datum::empty_set(),
            },
        );
        row.insert(columns::TYPE.to_string(), Datum::string(&self.port_type));
        row.insert(
            columns::OPTIONS.to_string(),
            Datum::string_map(self.options.clone()),
        );
        row.insert(
            columns::EXTERNAL_IDS.to_string(),
            Datum::string_map(self.external_ids.clone()),
        );
        row
    }
}
