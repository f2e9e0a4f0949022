//! SQL Server backend for sqlgate
//!
//! Connections speak TDS through `tiberius` and are configured from ADO.NET
//! descriptors (`server=host,1433;user=sa;password=...`).
//!
//! Arguments are always sent as `NVARCHAR`. Positional arguments bind to
//! `@P1..@Pn` in the statement. Named arguments are declared as variables at
//! the head of the batch and bound to the trailing slots, so
//! `{1: "a", "name": "b"}` runs as
//! `DECLARE @name NVARCHAR(MAX) = @P2; <statement>` with `@P1 = a, @P2 = b`.

use async_trait::async_trait;
use std::borrow::Cow;
use std::sync::Arc;
use tiberius::{Client, ColumnData, Config, FromSql};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::connection::{Connection, ConnectionFactory, DatabaseType, RowCursor, VecCursor};
use crate::error::{Error, Result};
use crate::params::BoundArgs;
use crate::security::validate_sql_identifier;
use crate::types::DriverValue;

type TdsClient = Client<Compat<TcpStream>>;

/// Text argument bound as `NVARCHAR`
struct TextArg<'a>(&'a str);

impl tiberius::ToSql for TextArg<'_> {
    fn to_sql(&self) -> ColumnData<'_> {
        ColumnData::String(Some(Cow::Borrowed(self.0)))
    }
}

/// Rewrite `sql` so named arguments resolve, returning the batch text and
/// the argument values in slot order.
fn prepare_batch<'a>(sql: &str, args: &'a BoundArgs) -> Result<(String, Vec<&'a str>)> {
    let mut values = args.positional();
    let named = args.named();
    if named.is_empty() {
        return Ok((sql.to_string(), values));
    }

    let mut batch = String::new();
    for (name, value) in named {
        validate_sql_identifier(name)?;
        values.push(value);
        batch.push_str(&format!(
            "DECLARE @{name} NVARCHAR(MAX) = @P{};\n",
            values.len()
        ));
    }
    batch.push_str(sql);
    Ok((batch, values))
}

fn decode_value(data: ColumnData<'static>) -> Result<DriverValue> {
    let value: DriverValue = match data {
        ColumnData::U8(v) => v.map(i64::from).into(),
        ColumnData::I16(v) => v.into(),
        ColumnData::I32(v) => v.into(),
        ColumnData::I64(v) => v.into(),
        ColumnData::F32(v) => v.into(),
        ColumnData::F64(v) => v.into(),
        ColumnData::Bit(v) => v.into(),
        ColumnData::String(v) => v.map(Cow::into_owned).into(),
        ColumnData::Binary(v) => v.map(Cow::into_owned).into(),
        ColumnData::Guid(v) => v.map(|g| g.to_string()).into(),
        ColumnData::Numeric(v) => v.map(|n| n.to_string()).into(),
        ColumnData::Date(_) => chrono::NaiveDate::from_sql(&data)
            .map_err(|e| Error::scan(format!("date: {e}")))?
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .into(),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            chrono::NaiveDateTime::from_sql(&data)
                .map_err(|e| Error::scan(format!("datetime: {e}")))?
                .into()
        }
        ColumnData::DateTimeOffset(_) => chrono::DateTime::<chrono::Utc>::from_sql(&data)
            .map_err(|e| Error::scan(format!("datetimeoffset: {e}")))?
            .into(),
        ColumnData::Time(v) => v.map_or(DriverValue::Null, |_| DriverValue::unsupported("time")),
        ColumnData::Xml(v) => v.map_or(DriverValue::Null, |_| DriverValue::unsupported("xml")),
        #[allow(unreachable_patterns)]
        other => DriverValue::unsupported(format!("{other:?}")),
    };
    Ok(value)
}

fn decode_row(row: tiberius::Row) -> Result<Vec<DriverValue>> {
    row.into_iter().map(decode_value).collect()
}

/// Map a statement failure; transport failures stay connection errors
fn query_error(e: tiberius::Error, sql: &str) -> Error {
    match e {
        tiberius::Error::Io { .. } => Error::connection_with_source("connection lost", e),
        e => Error::Query {
            message: e.to_string(),
            sql: Some(sql.to_string()),
            source: Some(Box::new(e)),
        },
    }
}

/// SQL Server connection.
///
/// TDS cannot multiplex requests, so calls are serialized on the client.
pub struct SqlServerConnection {
    client: Mutex<Option<TdsClient>>,
}

impl SqlServerConnection {
    /// Open a connection from an ADO.NET descriptor
    pub async fn connect(descriptor: &str) -> Result<Self> {
        let config = Config::from_ado_string(descriptor)
            .map_err(|e| Error::descriptor(format!("invalid connection descriptor: {e}")))?;

        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| Error::from_connect_io("failed to connect", e))?;
        tcp.set_nodelay(true).ok();

        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| Error::connection_with_source("failed to authenticate", e))?;

        Ok(Self {
            client: Mutex::new(Some(client)),
        })
    }
}

#[async_trait]
impl Connection for SqlServerConnection {
    async fn ping(&self) -> Result<()> {
        let mut guard = self.client.lock().await;
        let client = guard
            .as_mut()
            .ok_or_else(|| Error::connection("connection is closed"))?;
        client
            .execute("SELECT 1", &[])
            .await
            .map(|_| ())
            .map_err(|e| Error::connection_with_source("liveness probe failed", e))
    }

    async fn query(&self, sql: &str, args: &BoundArgs) -> Result<Option<Box<dyn RowCursor>>> {
        let (batch, values) = prepare_batch(sql, args)?;
        let params: Vec<TextArg<'_>> = values.into_iter().map(TextArg).collect();
        let refs: Vec<&dyn tiberius::ToSql> =
            params.iter().map(|p| p as &dyn tiberius::ToSql).collect();

        let mut guard = self.client.lock().await;
        let client = guard
            .as_mut()
            .ok_or_else(|| Error::connection("connection is closed"))?;

        let mut stream = client
            .query(batch.as_str(), &refs)
            .await
            .map_err(|e| query_error(e, sql))?;

        let columns: Option<Vec<String>> = stream
            .columns()
            .await
            .map_err(|e| query_error(e, sql))?
            .map(|cols| cols.iter().map(|c| c.name().to_string()).collect());

        let Some(columns) = columns else {
            stream.into_results().await.map_err(|e| query_error(e, sql))?;
            return Ok(None);
        };

        let rows = stream
            .into_first_result()
            .await
            .map_err(|e| query_error(e, sql))?;

        let decoded = rows.into_iter().map(decode_row).collect();
        Ok(Some(Box::new(VecCursor::new(columns, decoded))))
    }

    async fn close(&self) -> Result<()> {
        let client = self.client.lock().await.take();
        match client {
            Some(client) => client
                .close()
                .await
                .map_err(|e| Error::connection_with_source("failed to close connection", e)),
            None => Ok(()),
        }
    }
}

/// SQL Server connection factory
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerConnectionFactory;

#[async_trait]
impl ConnectionFactory for SqlServerConnectionFactory {
    async fn connect(&self, descriptor: &str) -> Result<Arc<dyn Connection>> {
        let conn = SqlServerConnection::connect(descriptor).await?;
        Ok(Arc::new(conn))
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::SqlServer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{bind, ParamTable};

    #[test]
    fn test_positional_only_batch_is_unchanged() {
        let args = bind(&ParamTable::new().with(1, "a").with(2, 3));
        let (batch, values) = prepare_batch("SELECT @P1, @P2", &args).unwrap();
        assert_eq!(batch, "SELECT @P1, @P2");
        assert_eq!(values, vec!["a", "3"]);
    }

    #[test]
    fn test_named_arguments_use_trailing_slots() {
        let args = bind(&ParamTable::new().with(1, "a").with("name", "b"));
        let (batch, values) = prepare_batch("SELECT @P1, @name", &args).unwrap();
        assert_eq!(
            batch,
            "DECLARE @name NVARCHAR(MAX) = @P2;\nSELECT @P1, @name"
        );
        assert_eq!(values, vec!["a", "b"]);
    }

    #[test]
    fn test_named_argument_injection_rejected() {
        let args = bind(&ParamTable::new().with("x = 1; DROP TABLE t; --", "v"));
        assert!(prepare_batch("SELECT 1", &args).is_err());
    }

    #[test]
    fn test_text_arg_binds_as_string() {
        let arg = TextArg("O'Brien");
        match tiberius::ToSql::to_sql(&arg) {
            ColumnData::String(Some(s)) => assert_eq!(s, "O'Brien"),
            other => panic!("unexpected column data: {other:?}"),
        }
    }

    #[test]
    fn test_decode_values() {
        assert_eq!(
            decode_value(ColumnData::I32(Some(7))).unwrap(),
            DriverValue::Int64(7)
        );
        assert_eq!(
            decode_value(ColumnData::U8(Some(255))).unwrap(),
            DriverValue::Int64(255)
        );
        assert_eq!(
            decode_value(ColumnData::Bit(Some(true))).unwrap(),
            DriverValue::Bool(true)
        );
        assert_eq!(
            decode_value(ColumnData::String(None)).unwrap(),
            DriverValue::Null
        );
        assert_eq!(
            decode_value(ColumnData::Xml(None)).unwrap(),
            DriverValue::Null
        );
    }

    #[tokio::test]
    async fn test_malformed_descriptor() {
        let err = match SqlServerConnectionFactory
            .connect("server=tcp:localhost,notaport")
            .await
        {
            Ok(_) => panic!("expected a descriptor error"),
            Err(e) => e,
        };
        assert_eq!(err.category(), crate::error::ErrorCategory::Descriptor);
    }

    #[test]
    fn test_factory_type() {
        assert_eq!(
            SqlServerConnectionFactory.database_type(),
            DatabaseType::SqlServer
        );
    }
}
