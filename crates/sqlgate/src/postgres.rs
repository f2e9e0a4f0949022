//! PostgreSQL backend for sqlgate
//!
//! Provides:
//! - Connections over `tokio-postgres` (libpq keyword or URL descriptors)
//! - Text-format parameter binding, so the server infers argument types
//! - Column decoding into the closed [`DriverValue`] set
//!
//! PostgreSQL has no named parameters; binding one is an `Unsupported` error.

use async_trait::async_trait;
use bytes::BytesMut;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_postgres::types::{to_sql_checked, FromSql, Format, IsNull, ToSql, Type};
use tracing::{debug, warn};

use crate::connection::{Connection, ConnectionFactory, DatabaseType, RowCursor, VecCursor};
use crate::error::{Error, Result};
use crate::params::BoundArgs;
use crate::types::DriverValue;

type BoxError = Box<dyn std::error::Error + Sync + Send>;

/// Query argument sent to the server as text
#[derive(Debug)]
struct TextParam<'a>(&'a str);

impl ToSql for TextParam<'_> {
    fn to_sql(&self, _ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
        out.extend_from_slice(self.0.as_bytes());
        Ok(IsNull::No)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, _ty: &Type) -> Format {
        Format::Text
    }

    to_sql_checked!();
}

/// Accepts any column type; used to tell NULL from an undecodable value
struct Present;

impl<'a> FromSql<'a> for Present {
    fn from_sql(_ty: &Type, _raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        Ok(Present)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

fn get<'a, T: FromSql<'a>>(row: &'a tokio_postgres::Row, idx: usize) -> Result<Option<T>> {
    row.try_get::<_, Option<T>>(idx)
        .map_err(|e| Error::scan(format!("column {idx}: {e}")))
}

/// Decode one column into a driver value
fn decode_value(row: &tokio_postgres::Row, idx: usize, ty: &Type) -> Result<DriverValue> {
    let value: DriverValue = match *ty {
        Type::BOOL => get::<bool>(row, idx)?.into(),
        Type::INT2 => get::<i16>(row, idx)?.into(),
        Type::INT4 => get::<i32>(row, idx)?.into(),
        Type::INT8 => get::<i64>(row, idx)?.into(),
        Type::OID => get::<u32>(row, idx)?.map(i64::from).into(),
        Type::FLOAT4 => get::<f32>(row, idx)?.into(),
        Type::FLOAT8 => get::<f64>(row, idx)?.into(),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => get::<String>(row, idx)?.into(),
        Type::BYTEA => get::<Vec<u8>>(row, idx)?.into(),
        Type::TIMESTAMP => get::<chrono::NaiveDateTime>(row, idx)?.into(),
        Type::TIMESTAMPTZ => get::<chrono::DateTime<chrono::Utc>>(row, idx)?.into(),
        Type::DATE => get::<chrono::NaiveDate>(row, idx)?
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .into(),
        Type::NUMERIC => get::<rust_decimal::Decimal>(row, idx)?
            .map(|d| d.to_string())
            .into(),
        Type::UUID => get::<uuid::Uuid>(row, idx)?.map(|u| u.to_string()).into(),
        Type::JSON | Type::JSONB => get::<serde_json::Value>(row, idx)?
            .map(|j| j.to_string())
            .into(),
        _ => match get::<Present>(row, idx)? {
            Some(Present) => DriverValue::unsupported(ty.name()),
            None => DriverValue::Null,
        },
    };
    Ok(value)
}

fn decode_row(row: &tokio_postgres::Row) -> Result<Vec<DriverValue>> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| decode_value(row, idx, col.type_()))
        .collect()
}

/// Map a connect failure onto the error taxonomy
fn connect_error(e: tokio_postgres::Error) -> Error {
    let refused = std::error::Error::source(&e)
        .and_then(|s| s.downcast_ref::<std::io::Error>())
        .is_some_and(|io| io.kind() == std::io::ErrorKind::ConnectionRefused);

    if refused {
        Error::refused(e.to_string())
    } else {
        Error::connection_with_source("failed to connect", e)
    }
}

/// Map a statement failure; a dead connection stays a connection error
fn query_error(e: tokio_postgres::Error, sql: &str) -> Error {
    if e.is_closed() {
        return Error::connection_with_source("connection closed", e);
    }
    let message = e
        .as_db_error()
        .map(|db| db.to_string())
        .unwrap_or_else(|| e.to_string());
    Error::Query {
        message,
        sql: Some(sql.to_string()),
        source: Some(Box::new(e)),
    }
}

/// PostgreSQL connection
pub struct PgConnection {
    client: tokio_postgres::Client,
    driver: JoinHandle<()>,
    closed: AtomicBool,
}

impl PgConnection {
    fn new(client: tokio_postgres::Client, driver: JoinHandle<()>) -> Self {
        Self {
            client,
            driver,
            closed: AtomicBool::new(false),
        }
    }

    /// Get the underlying client
    pub fn client(&self) -> &tokio_postgres::Client {
        &self.client
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) || self.client.is_closed() {
            return Err(Error::connection("connection is closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for PgConnection {
    async fn ping(&self) -> Result<()> {
        self.ensure_open()?;
        self.client
            .simple_query("SELECT 1")
            .await
            .map(|_| ())
            .map_err(|e| Error::connection_with_source("liveness probe failed", e))
    }

    async fn query(&self, sql: &str, args: &BoundArgs) -> Result<Option<Box<dyn RowCursor>>> {
        self.ensure_open()?;
        if args.has_named() {
            return Err(Error::unsupported(
                "PostgreSQL does not support named parameters",
            ));
        }

        let params: Vec<TextParam<'_>> = args.positional().into_iter().map(TextParam).collect();
        let refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let stmt = self
            .client
            .prepare(sql)
            .await
            .map_err(|e| query_error(e, sql))?;

        if stmt.columns().is_empty() {
            let affected = self
                .client
                .execute(&stmt, &refs)
                .await
                .map_err(|e| query_error(e, sql))?;
            debug!(affected, "statement returned no columns");
            return Ok(None);
        }

        let columns = stmt
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let rows = self
            .client
            .query(&stmt, &refs)
            .await
            .map_err(|e| query_error(e, sql))?;

        let decoded = rows.iter().map(decode_row).collect();
        Ok(Some(Box::new(VecCursor::new(columns, decoded))))
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.driver.abort();
        }
        Ok(())
    }
}

impl Drop for PgConnection {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Parse a libpq or URL descriptor. A descriptor without a host connects to
/// `localhost`.
fn parse_descriptor(descriptor: &str) -> Result<tokio_postgres::Config> {
    let mut config: tokio_postgres::Config = descriptor
        .parse()
        .map_err(|e| Error::descriptor(format!("invalid connection descriptor: {e}")))?;
    if config.get_hosts().is_empty() {
        config.host("localhost");
    }
    Ok(config)
}

/// PostgreSQL connection factory
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnectionFactory;

#[async_trait]
impl ConnectionFactory for PgConnectionFactory {
    async fn connect(&self, descriptor: &str) -> Result<Arc<dyn Connection>> {
        let config = parse_descriptor(descriptor)?;
        let (client, connection) = config
            .connect(tokio_postgres::NoTls)
            .await
            .map_err(connect_error)?;

        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "postgres connection terminated");
            }
        });

        Ok(Arc::new(PgConnection::new(client, driver)))
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::Postgres
    }
}

/// Connect to PostgreSQL
pub async fn connect(descriptor: &str) -> Result<Arc<dyn Connection>> {
    PgConnectionFactory.connect(descriptor).await
}
