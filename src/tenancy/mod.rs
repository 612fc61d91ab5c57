//! Tenant isolation: every request is admitted for exactly one tenant, every
//! storage operation it performs runs on a connection bound to that tenant,
//! and every statement is constrained to that tenant's rows.

pub mod binding;
pub mod context;
pub mod entity;
pub mod error;
pub mod guard;
pub mod resolver;
pub mod scoped;
pub mod statement;
pub mod store;

pub use binding::{BindingOptions, BoundSession, Outcome, TenantSession, TENANT_SETTING};
pub use context::{Tenant, TenantContext, TenantId};
pub use entity::{EntityKind, ScopedEntity, TENANT_COLUMN};
pub use error::{DataError, TenancyError};
pub use guard::admit;
pub use resolver::{ResolvedTenant, TenantResolver, TenantSource};
pub use scoped::{Record, Repository, ScopedDataAccess};
pub use store::{MemoryTenantStore, PgTenantStore, TenantStore};
