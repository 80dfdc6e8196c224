//! Execution gateway: the `Session` boundary, caller identity and plan execution

pub mod execute;
pub mod identity;
#[cfg(feature = "scylla")]
pub mod scylla;
pub mod session;

pub use execute::{ExecutionGateway, ResultPage, APPLIED_COLUMN};
pub use identity::{
    identify, resolver_from_config, ChainedResolver, HttpTokenResolver, IdentityResolver, RequestContext,
    RequestIdentity, StaticTokenResolver,
};
#[cfg(feature = "scylla")]
pub use self::scylla::ScyllaSession;
pub use session::{ExecuteOptions, ResultSet, Row, Session, SessionError};
