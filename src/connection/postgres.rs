//! `ScalarQuery` over tokio-postgres.

use super::config::RouterConfig;
use crate::core::{NodeRole, Result, RouterError};
use crate::interface::ScalarQuery;
use async_trait::async_trait;
use tokio_postgres::{Client, NoTls};
use tracing::{Level, event};

/// One client per node of the primary/replica pair.
pub struct PgScalarQuery {
    primary: Client,
    replica: Client,
}

impl PgScalarQuery {
    pub fn new(primary: Client, replica: Client) -> Self {
        Self { primary, replica }
    }

    /// Connect to both nodes of `config` without TLS.
    ///
    /// The connection drivers are spawned on the current tokio runtime.
    pub async fn connect(config: &RouterConfig) -> Result<Self> {
        let primary = connect_node(NodeRole::Primary, &config.primary_url).await?;
        let replica = connect_node(NodeRole::Replica, &config.replica_url).await?;
        event!(
            Level::INFO,
            primary = %config.redacted_primary_url(),
            replica = %config.redacted_replica_url(),
            "connected to primary and replica"
        );
        Ok(Self::new(primary, replica))
    }

    fn client(&self, role: NodeRole) -> &Client {
        match role {
            NodeRole::Primary => &self.primary,
            NodeRole::Replica => &self.replica,
        }
    }
}

async fn connect_node(role: NodeRole, url: &str) -> Result<Client> {
    let (client, connection) = tokio_postgres::connect(url, NoTls)
        .await
        .map_err(|e| RouterError::ConnectionError(format!("{} connect failed: {}", role, e)))?;

    tokio::spawn(async move {
        if let Err(err) = connection.await {
            event!(Level::ERROR, role = role.as_str(), error = %err, "postgres connection closed");
        }
    });

    Ok(client)
}

fn map_pg_error(role: NodeRole, err: tokio_postgres::Error) -> RouterError {
    if err.is_closed() {
        RouterError::ConnectionError(format!("{} connection closed: {}", role, err))
    } else {
        RouterError::QueryError(format!("{} query failed: {}", role, err))
    }
}

#[async_trait]
impl ScalarQuery for PgScalarQuery {
    async fn query_scalar(&self, role: NodeRole, sql: &str) -> Result<String> {
        let row = self
            .client(role)
            .query_one(sql, &[])
            .await
            .map_err(|e| map_pg_error(role, e))?;

        let value: Option<String> = row.try_get(0).map_err(|e| map_pg_error(role, e))?;
        value.ok_or_else(|| {
            RouterError::QueryError(format!("{} returned NULL for '{}'", role, sql))
        })
    }
}
