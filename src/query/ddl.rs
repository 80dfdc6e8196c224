/// Schema-management statements

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::catalog::ClusteringOrder;
use crate::config::SchemaOperation;
use crate::error::QueryBuildError;
use crate::query::builder::{quote_identifier, table_ref};
use crate::types::{classify, TypeKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "class")]
pub enum Replication {
    /// Same replica count in every data center
    #[serde(rename = "SimpleStrategy")]
    Simple { replication_factor: u32 },
    /// Replica count per data center
    #[serde(rename = "NetworkTopologyStrategy")]
    NetworkTopology { data_centers: BTreeMap<String, u32> },
}

impl Replication {
    fn to_cql(&self) -> Result<String, QueryBuildError> {
        match self {
            Replication::Simple { replication_factor } => {
                if *replication_factor == 0 {
                    return Err(QueryBuildError::InvalidOption(
                        "replication factor must be positive".to_string(),
                    ));
                }
                Ok(format!(
                    "{{'class': 'SimpleStrategy', 'replication_factor': {}}}",
                    replication_factor
                ))
            }
            Replication::NetworkTopology { data_centers } => {
                if data_centers.is_empty() {
                    return Err(QueryBuildError::InvalidOption(
                        "at least one data center is required".to_string(),
                    ));
                }
                let dcs: Vec<String> = data_centers
                    .iter()
                    .map(|(dc, replicas)| format!("'{}': {}", dc.replace('\'', "''"), replicas))
                    .collect();
                Ok(format!(
                    "{{'class': 'NetworkTopologyStrategy', {}}}",
                    dcs.join(", ")
                ))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: String,
    pub cql_type: String,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, cql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cql_type: cql_type.into(),
        }
    }

    /// `"name" type`, with the type checked against what the API can expose
    fn to_cql(&self) -> Result<String, QueryBuildError> {
        Ok(format!(
            "{} {}",
            quote_identifier(&self.name),
            checked_type(&self.name, &self.cql_type)?.cql_type()
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusteringDefinition {
    pub column: ColumnDefinition,
    pub order: ClusteringOrder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaChange {
    CreateKeyspace {
        name: String,
        replication: Replication,
        if_not_exists: bool,
    },
    DropKeyspace {
        name: String,
        if_exists: bool,
    },
    CreateTable {
        keyspace: String,
        table: String,
        partition_keys: Vec<ColumnDefinition>,
        clustering_keys: Vec<ClusteringDefinition>,
        values: Vec<ColumnDefinition>,
        if_not_exists: bool,
    },
    DropTable {
        keyspace: String,
        table: String,
        if_exists: bool,
    },
    AlterTableAdd {
        keyspace: String,
        table: String,
        columns: Vec<ColumnDefinition>,
    },
    AlterTableDrop {
        keyspace: String,
        table: String,
        columns: Vec<String>,
    },
}

impl SchemaChange {
    /// Whitelist entry that enables this change
    pub fn operation(&self) -> SchemaOperation {
        match self {
            SchemaChange::CreateKeyspace { .. } => SchemaOperation::KeyspaceCreate,
            SchemaChange::DropKeyspace { .. } => SchemaOperation::KeyspaceDrop,
            SchemaChange::CreateTable { .. } => SchemaOperation::TableCreate,
            SchemaChange::DropTable { .. } => SchemaOperation::TableDrop,
            SchemaChange::AlterTableAdd { .. } => SchemaOperation::TableAlterAdd,
            SchemaChange::AlterTableDrop { .. } => SchemaOperation::TableAlterDrop,
        }
    }

    pub fn keyspace(&self) -> &str {
        match self {
            SchemaChange::CreateKeyspace { name, .. } | SchemaChange::DropKeyspace { name, .. } => name,
            SchemaChange::CreateTable { keyspace, .. }
            | SchemaChange::DropTable { keyspace, .. }
            | SchemaChange::AlterTableAdd { keyspace, .. }
            | SchemaChange::AlterTableDrop { keyspace, .. } => keyspace,
        }
    }

    pub fn to_cql(&self) -> Result<String, QueryBuildError> {
        match self {
            SchemaChange::CreateKeyspace {
                name,
                replication,
                if_not_exists,
            } => Ok(format!(
                "CREATE KEYSPACE {}{} WITH REPLICATION = {}",
                if *if_not_exists { "IF NOT EXISTS " } else { "" },
                quote_identifier(checked_name(name)?),
                replication.to_cql()?
            )),
            SchemaChange::DropKeyspace { name, if_exists } => Ok(format!(
                "DROP KEYSPACE {}{}",
                if *if_exists { "IF EXISTS " } else { "" },
                quote_identifier(checked_name(name)?)
            )),
            SchemaChange::CreateTable {
                keyspace,
                table,
                partition_keys,
                clustering_keys,
                values,
                if_not_exists,
            } => create_table(keyspace, table, partition_keys, clustering_keys, values, *if_not_exists),
            SchemaChange::DropTable {
                keyspace,
                table,
                if_exists,
            } => Ok(format!(
                "DROP TABLE {}{}",
                if *if_exists { "IF EXISTS " } else { "" },
                table_ref(checked_name(keyspace)?, checked_name(table)?)
            )),
            SchemaChange::AlterTableAdd {
                keyspace,
                table,
                columns,
            } => {
                if columns.is_empty() {
                    return Err(QueryBuildError::NoValues);
                }
                let columns = columns
                    .iter()
                    .map(ColumnDefinition::to_cql)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!(
                    "ALTER TABLE {} ADD ({})",
                    table_ref(checked_name(keyspace)?, checked_name(table)?),
                    columns.join(", ")
                ))
            }
            SchemaChange::AlterTableDrop {
                keyspace,
                table,
                columns,
            } => {
                if columns.is_empty() {
                    return Err(QueryBuildError::NoValues);
                }
                let columns = columns
                    .iter()
                    .map(|c| checked_name(c).map(quote_identifier))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!(
                    "ALTER TABLE {} DROP ({})",
                    table_ref(checked_name(keyspace)?, checked_name(table)?),
                    columns.join(", ")
                ))
            }
        }
    }
}

fn create_table(
    keyspace: &str,
    table: &str,
    partition_keys: &[ColumnDefinition],
    clustering_keys: &[ClusteringDefinition],
    values: &[ColumnDefinition],
    if_not_exists: bool,
) -> Result<String, QueryBuildError> {
    if partition_keys.is_empty() {
        return Err(QueryBuildError::InvalidOption(
            "a table needs at least one partition key".to_string(),
        ));
    }

    let mut definitions = Vec::new();
    for column in partition_keys
        .iter()
        .chain(clustering_keys.iter().map(|c| &c.column))
    {
        // Collections cannot be part of a primary key unless frozen, which this surface never emits
        let kind = checked_type(&column.name, &column.cql_type)?;
        if kind.is_collection() {
            return Err(QueryBuildError::UnsupportedType {
                column: column.name.clone(),
                cql_type: column.cql_type.clone(),
            });
        }
        definitions.push(column.to_cql()?);
    }
    for column in values {
        definitions.push(column.to_cql()?);
    }

    let partition: Vec<String> = partition_keys
        .iter()
        .map(|c| quote_identifier(&c.name))
        .collect();
    let mut primary_key = format!("({})", partition.join(", "));
    for clustering in clustering_keys {
        primary_key.push_str(", ");
        primary_key.push_str(&quote_identifier(&clustering.column.name));
    }

    let mut statement = format!(
        "CREATE TABLE {}{} ({}, PRIMARY KEY ({}))",
        if if_not_exists { "IF NOT EXISTS " } else { "" },
        table_ref(checked_name(keyspace)?, checked_name(table)?),
        definitions.join(", "),
        primary_key
    );

    if !clustering_keys.is_empty() {
        let order: Vec<String> = clustering_keys
            .iter()
            .map(|c| {
                let direction = match c.order {
                    ClusteringOrder::Asc => "ASC",
                    ClusteringOrder::Desc => "DESC",
                };
                format!("{} {}", quote_identifier(&c.column.name), direction)
            })
            .collect();
        statement.push_str(&format!(" WITH CLUSTERING ORDER BY ({})", order.join(", ")));
    }

    Ok(statement)
}

fn checked_name(name: &str) -> Result<&str, QueryBuildError> {
    if name.trim().is_empty() {
        return Err(QueryBuildError::InvalidOption("names cannot be empty".to_string()));
    }
    Ok(name)
}

fn checked_type(column: &str, cql_type: &str) -> Result<TypeKind, QueryBuildError> {
    checked_name(column)?;
    let kind = classify(cql_type);
    if !kind.is_supported() {
        return Err(QueryBuildError::UnsupportedType {
            column: column.to_string(),
            cql_type: cql_type.to_string(),
        });
    }
    Ok(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_keyspace_simple() {
        let change = SchemaChange::CreateKeyspace {
            name: "store".to_string(),
            replication: Replication::Simple { replication_factor: 1 },
            if_not_exists: true,
        };
        assert_eq!(
            change.to_cql().unwrap(),
            r#"CREATE KEYSPACE IF NOT EXISTS "store" WITH REPLICATION = {'class': 'SimpleStrategy', 'replication_factor': 1}"#
        );
        assert_eq!(change.operation(), SchemaOperation::KeyspaceCreate);
    }

    #[test]
    fn test_create_keyspace_network_topology() {
        let mut dcs = BTreeMap::new();
        dcs.insert("dc2".to_string(), 2);
        dcs.insert("dc1".to_string(), 3);
        let change = SchemaChange::CreateKeyspace {
            name: "store".to_string(),
            replication: Replication::NetworkTopology { data_centers: dcs },
            if_not_exists: false,
        };
        assert_eq!(
            change.to_cql().unwrap(),
            r#"CREATE KEYSPACE "store" WITH REPLICATION = {'class': 'NetworkTopologyStrategy', 'dc1': 3, 'dc2': 2}"#
        );
    }

    #[test]
    fn test_create_table_with_clustering() {
        let change = SchemaChange::CreateTable {
            keyspace: "store".to_string(),
            table: "reviews".to_string(),
            partition_keys: vec![ColumnDefinition::new("book_id", "uuid")],
            clustering_keys: vec![ClusteringDefinition {
                column: ColumnDefinition::new("posted", "timestamp"),
                order: ClusteringOrder::Desc,
            }],
            values: vec![
                ColumnDefinition::new("body", "varchar"),
                ColumnDefinition::new("tags", "set<text>"),
            ],
            if_not_exists: true,
        };
        assert_eq!(
            change.to_cql().unwrap(),
            concat!(
                r#"CREATE TABLE IF NOT EXISTS "store"."reviews" ("book_id" uuid, "posted" timestamp, "#,
                r#""body" text, "tags" set<text>, PRIMARY KEY (("book_id"), "posted")) "#,
                r#"WITH CLUSTERING ORDER BY ("posted" DESC)"#
            )
        );
    }

    #[test]
    fn test_create_table_rejects_unsupported_types() {
        let change = SchemaChange::CreateTable {
            keyspace: "store".to_string(),
            table: "t".to_string(),
            partition_keys: vec![ColumnDefinition::new("id", "int")],
            clustering_keys: vec![],
            values: vec![ColumnDefinition::new("span", "duration")],
            if_not_exists: false,
        };
        assert_eq!(
            change.to_cql().unwrap_err(),
            QueryBuildError::UnsupportedType {
                column: "span".to_string(),
                cql_type: "duration".to_string()
            }
        );
    }

    #[test]
    fn test_create_table_requires_partition_key() {
        let change = SchemaChange::CreateTable {
            keyspace: "store".to_string(),
            table: "t".to_string(),
            partition_keys: vec![],
            clustering_keys: vec![],
            values: vec![ColumnDefinition::new("a", "int")],
            if_not_exists: false,
        };
        assert!(change.to_cql().is_err());
    }

    #[test]
    fn test_alter_and_drop() {
        let add = SchemaChange::AlterTableAdd {
            keyspace: "store".to_string(),
            table: "books".to_string(),
            columns: vec![ColumnDefinition::new("isbn", "text")],
        };
        assert_eq!(add.to_cql().unwrap(), r#"ALTER TABLE "store"."books" ADD ("isbn" text)"#);

        let drop = SchemaChange::AlterTableDrop {
            keyspace: "store".to_string(),
            table: "books".to_string(),
            columns: vec!["isbn".to_string(), "Weird\"Name".to_string()],
        };
        assert_eq!(
            drop.to_cql().unwrap(),
            r#"ALTER TABLE "store"."books" DROP ("isbn", "Weird""Name")"#
        );

        let drop_table = SchemaChange::DropTable {
            keyspace: "store".to_string(),
            table: "books".to_string(),
            if_exists: true,
        };
        assert_eq!(drop_table.to_cql().unwrap(), r#"DROP TABLE IF EXISTS "store"."books""#);
    }
}
