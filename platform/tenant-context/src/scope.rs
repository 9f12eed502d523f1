use futures::future::BoxFuture;
use sqlx::pool::PoolConnection;
use sqlx::{Connection, PgConnection, PgPool, Postgres};
use std::ops::{Deref, DerefMut};
use uuid::Uuid;

use crate::{TenantContextError, BYPASS_SETTING, TENANT_SETTING};

/// What a scoped connection is allowed to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Tenant(Uuid),
    Admin,
}

/// A pooled connection carrying a tenant tag (or the admin bypass).
///
/// Call [`release`](Self::release) when done. Dropping the guard instead
/// discards the connection.
pub struct ScopedConnection {
    conn: Option<PoolConnection<Postgres>>,
    scope: Scope,
}

impl ScopedConnection {
    /// Borrow a connection and tag it for `tenant_id`.
    pub async fn tenant(pool: &PgPool, tenant_id: Uuid) -> Result<Self, TenantContextError> {
        Self::acquire(pool, Scope::Tenant(tenant_id)).await
    }

    /// Borrow a connection with row-level filtering bypassed.
    pub async fn admin(pool: &PgPool) -> Result<Self, TenantContextError> {
        Self::acquire(pool, Scope::Admin).await
    }

    async fn acquire(pool: &PgPool, scope: Scope) -> Result<Self, TenantContextError> {
        let mut conn = pool.acquire().await.map_err(TenantContextError::Acquire)?;

        let (setting, value) = match scope {
            Scope::Tenant(tenant_id) => (TENANT_SETTING, tenant_id.to_string()),
            Scope::Admin => (BYPASS_SETTING, "on".to_string()),
        };

        let tagged = sqlx::query("SELECT set_config($1, $2, false)")
            .bind(setting)
            .bind(&value)
            .execute(&mut *conn)
            .await;

        if let Err(source) = tagged {
            // State of the session is unknown; do not recycle it.
            drop(conn.detach());
            return Err(match scope {
                Scope::Tenant(tenant_id) => TenantContextError::Tag { tenant_id, source },
                Scope::Admin => TenantContextError::Database(source),
            });
        }

        tracing::trace!(scope = ?scope, "Connection scoped");
        Ok(Self {
            conn: Some(conn),
            scope,
        })
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn tenant_id(&self) -> Option<Uuid> {
        match self.scope {
            Scope::Tenant(id) => Some(id),
            Scope::Admin => None,
        }
    }

    /// Clear the tag and return the connection to the pool.
    ///
    /// If clearing fails the connection is closed instead.
    pub async fn release(mut self) -> Result<(), TenantContextError> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };

        let reset = match self.scope {
            Scope::Tenant(_) => "RESET app.tenant_id",
            Scope::Admin => "RESET app.rls_bypass",
        };

        match sqlx::query(reset).execute(&mut *conn).await {
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::error!(
                    scope = ?self.scope,
                    error = %e,
                    "Failed to clear tenant tag; discarding connection"
                );
                let raw = conn.detach();
                if let Err(close_err) = raw.close().await {
                    tracing::warn!(error = %close_err, "Closing discarded connection failed");
                }
                Err(TenantContextError::Untag(e))
            }
        }
    }
}

impl Deref for ScopedConnection {
    type Target = PgConnection;

    fn deref(&self) -> &PgConnection {
        match &self.conn {
            Some(conn) => &**conn,
            None => unreachable!("scoped connection used after release"),
        }
    }
}

impl DerefMut for ScopedConnection {
    fn deref_mut(&mut self) -> &mut PgConnection {
        match &mut self.conn {
            Some(conn) => &mut **conn,
            None => unreachable!("scoped connection used after release"),
        }
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::warn!(scope = ?self.scope, "Scoped connection dropped without release; discarding");
            drop(conn.detach());
        }
    }
}

/// Run `body` in a transaction on a connection tagged for `tenant_id`.
///
/// The transaction commits only if `body` returns `Ok`. The tag is cleared
/// afterwards in every case; a connection whose tag cannot be cleared is
/// closed rather than pooled.
pub async fn with_tenant<T, E, F>(pool: &PgPool, tenant_id: Uuid, body: F) -> Result<T, E>
where
    F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, Result<T, E>>,
    E: From<TenantContextError>,
{
    let conn = ScopedConnection::tenant(pool, tenant_id)
        .await
        .map_err(E::from)?;
    run_scoped(conn, body).await
}

/// Run `body` in a transaction with row-level filtering bypassed.
///
/// Reserved for cross-tenant system jobs such as scheduled sweeps.
pub async fn with_admin<T, E, F>(pool: &PgPool, body: F) -> Result<T, E>
where
    F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, Result<T, E>>,
    E: From<TenantContextError>,
{
    let conn = ScopedConnection::admin(pool).await.map_err(E::from)?;
    run_scoped(conn, body).await
}

async fn run_scoped<T, E, F>(mut conn: ScopedConnection, body: F) -> Result<T, E>
where
    F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, Result<T, E>>,
    E: From<TenantContextError>,
{
    let result = in_transaction(&mut conn, body).await;

    if let Err(e) = conn.release().await {
        // The connection is gone; the unit of work itself already settled.
        tracing::error!(error = %e, "Tenant scope release failed");
    }

    result
}

async fn in_transaction<T, E, F>(conn: &mut PgConnection, body: F) -> Result<T, E>
where
    F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, Result<T, E>>,
    E: From<TenantContextError>,
{
    let mut tx = conn
        .begin()
        .await
        .map_err(|e| E::from(TenantContextError::Database(e)))?;

    match body(&mut *tx).await {
        Ok(value) => {
            tx.commit()
                .await
                .map_err(|e| E::from(TenantContextError::Database(e)))?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "Rollback failed");
            }
            Err(e)
        }
    }
}
