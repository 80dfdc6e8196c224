//! Query translation: requests in, parameterized statements out

pub mod builder;
pub mod consistency;
pub mod ddl;
pub mod plan;
pub mod request;

pub use builder::{quote_identifier, table_ref, QueryBuilder, QueryDefaults};
pub use consistency::Consistency;
pub use ddl::{ClusteringDefinition, ColumnDefinition, Replication, SchemaChange};
pub use plan::{PageCursor, ProjectedColumn, QueryPlan};
pub use request::{FilterOp, MutationRequest, Predicate, QueryRequest, SortDirection, SortOrder};
