//! Scope and table definitions.

use crate::error::ProtocolResult;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A setup hash fingerprinting a scope's table and column definitions.
///
/// Both ends of a session compare setup hashes during negotiation;
/// a mismatch means the schemas have drifted apart and the session
/// must not proceed.
pub type SetupHash = [u8; 32];

/// The declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    /// 64-bit signed integer.
    Integer,
    /// UTF-8 text.
    Text,
    /// Opaque bytes.
    Bytes,
}

/// One column of a synchronized table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Column type.
    pub ty: ColumnType,
}

impl ColumnDef {
    /// Creates a column definition.
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// One table of a scope.
///
/// The column order is part of the definition and contributes to the
/// setup hash; primary-key columns are listed by name and must appear
/// in `columns`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnDef>,
    /// Names of the primary-key columns, in key order.
    pub key_columns: Vec<String>,
}

impl TableDef {
    /// Creates a table definition.
    pub fn new(
        name: impl Into<String>,
        columns: Vec<ColumnDef>,
        key_columns: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            columns,
            key_columns,
        }
    }
}

/// A named group of tables synchronized as a unit.
///
/// The table order is the application order: parent tables are declared
/// before the children that reference them, and batches preserve that
/// order so referential integrity holds during apply.
///
/// A scope is immutable once provisioned; changing its definition
/// requires an explicit deprovision followed by a fresh provision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeDef {
    /// Unique scope name.
    pub name: String,
    /// Tables in dependency order (parents before children).
    pub tables: Vec<TableDef>,
}

impl ScopeDef {
    /// Creates a scope definition.
    pub fn new(name: impl Into<String>, tables: Vec<TableDef>) -> Self {
        Self {
            name: name.into(),
            tables,
        }
    }

    /// Returns the table names in declared order.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    /// Returns true if the scope declares the given table.
    pub fn contains_table(&self, table: &str) -> bool {
        self.tables.iter().any(|t| t.name == table)
    }

    /// Computes the setup hash over the canonical CBOR encoding of the
    /// table definitions.
    ///
    /// Any change to a table name, column, column order, or key column
    /// yields a different hash.
    pub fn setup_hash(&self) -> ProtocolResult<SetupHash> {
        let bytes = crate::wire::encode(&self.tables)?;
        let digest = Sha256::digest(&bytes);
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&digest);
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders_scope() -> ScopeDef {
        ScopeDef::new(
            "sales",
            vec![
                TableDef::new(
                    "customers",
                    vec![
                        ColumnDef::new("id", ColumnType::Integer),
                        ColumnDef::new("name", ColumnType::Text),
                    ],
                    vec!["id".into()],
                ),
                TableDef::new(
                    "orders",
                    vec![
                        ColumnDef::new("id", ColumnType::Integer),
                        ColumnDef::new("customer_id", ColumnType::Integer),
                        ColumnDef::new("total", ColumnType::Integer),
                    ],
                    vec!["id".into()],
                ),
            ],
        )
    }

    #[test]
    fn table_names_in_declared_order() {
        let scope = orders_scope();
        assert_eq!(scope.table_names(), vec!["customers", "orders"]);
        assert!(scope.contains_table("orders"));
        assert!(!scope.contains_table("invoices"));
    }

    #[test]
    fn setup_hash_is_stable() {
        let scope = orders_scope();
        assert_eq!(scope.setup_hash().unwrap(), scope.setup_hash().unwrap());
    }

    #[test]
    fn setup_hash_detects_drift() {
        let scope = orders_scope();
        let mut drifted = scope.clone();
        drifted.tables[1]
            .columns
            .push(ColumnDef::new("discount", ColumnType::Integer));

        assert_ne!(scope.setup_hash().unwrap(), drifted.setup_hash().unwrap());
    }

    #[test]
    fn setup_hash_ignores_scope_name() {
        // The fingerprint covers table shape, not the scope's label.
        let scope = orders_scope();
        let mut renamed = scope.clone();
        renamed.name = "sales_v2".into();

        assert_eq!(scope.setup_hash().unwrap(), renamed.setup_hash().unwrap());
    }

    #[test]
    fn scope_roundtrip() {
        let scope = orders_scope();
        let bytes = crate::wire::encode(&scope).unwrap();
        let decoded: ScopeDef = crate::wire::decode(&bytes).unwrap();
        assert_eq!(decoded, scope);
    }
}
