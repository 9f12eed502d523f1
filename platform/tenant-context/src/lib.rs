//! # Tenant Context
//!
//! Every storage operation runs on a connection tagged with exactly one
//! tenant. The tag is the session setting `app.tenant_id`, which the
//! row-level policies in `db/migrations` compare against each row's
//! `tenant_id`; application queries still filter explicitly, the policies
//! catch the ones that forget.
//!
//! - [`with_tenant`] tags a pooled connection, runs the body in a
//!   transaction, and clears the tag before the connection goes back.
//! - [`with_admin`] is the cross-tenant variant for system sweeps. It sets
//!   `app.rls_bypass` instead of a tenant.
//!
//! A connection whose tag cannot be cleared, or whose guard is dropped
//! without [`ScopedConnection::release`], is detached from the pool and
//! closed, never handed to the next borrower.
//!
//! ```rust,no_run
//! use tenant_context::{with_tenant, TenantContextError};
//! use futures::FutureExt;
//!
//! # async fn example(pool: sqlx::PgPool, tenant_id: uuid::Uuid) -> Result<(), TenantContextError> {
//! let cameras: i64 = with_tenant(&pool, tenant_id, |conn| {
//!     async move {
//!         let n = sqlx::query_scalar("SELECT COUNT(*) FROM cameras")
//!             .fetch_one(&mut *conn)
//!             .await?;
//!         Ok::<_, TenantContextError>(n)
//!     }
//!     .boxed()
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

mod db;
mod scope;

pub use db::{init_pool, run_migrations};
pub use scope::{with_admin, with_tenant, Scope, ScopedConnection};

pub const TENANT_SETTING: &str = "app.tenant_id";
pub const BYPASS_SETTING: &str = "app.rls_bypass";

#[derive(Debug, thiserror::Error)]
pub enum TenantContextError {
    #[error("failed to acquire connection: {0}")]
    Acquire(#[source] sqlx::Error),

    #[error("failed to tag connection for tenant {tenant_id}: {source}")]
    Tag {
        tenant_id: uuid::Uuid,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to clear tenant tag, connection discarded: {0}")]
    Untag(#[source] sqlx::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}
