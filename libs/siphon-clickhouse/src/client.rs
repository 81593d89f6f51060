//! ClickHouse destination client over the HTTP interface.

use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;

use siphon_api::column::{ColumnModel, ColumnType, TIMESTAMP_COLUMN};
use siphon_api::destination::{DestinationClient, InsertStatement, TableRef};
use siphon_api::error::ReplicaError;
use siphon_api::value::Row;

use crate::ddl::{self, quote_ident, quote_table};
use crate::literal;
use crate::parse;

#[derive(Debug, Clone)]
pub struct ClickHouseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub tls: bool,
    pub accept_invalid_certs: bool,
}

pub struct ClickHouseClient {
    http: reqwest::Client,
    base_url: String,
    user: String,
    password: String,
}

impl ClickHouseClient {
    pub fn new(config: &ClickHouseConfig) -> Result<Self, ReplicaError> {
        let scheme = if config.tls { "https" } else { "http" };
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| ReplicaError::config(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: format!("{scheme}://{}:{}", config.host, config.port),
            user: config.user.clone(),
            password: config.password.clone(),
        })
    }

    async fn exec(&self, sql: &str) -> Result<String, ReplicaError> {
        tracing::trace!(sql = %sql, "executing");
        let resp = self
            .http
            .post(&self.base_url)
            .query(&[("user", self.user.as_str()), ("password", self.password.as_str())])
            .body(sql.to_owned())
            .send()
            .await
            .map_err(|e| ReplicaError::io(format!("request: {e}")))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| ReplicaError::io(format!("read: {e}")))?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(ReplicaError::io(body))
        }
    }

    async fn table_exists(&self, table: &TableRef) -> Result<bool, ReplicaError> {
        let body = self.exec(&format!("EXISTS TABLE {}", quote_table(table))).await?;
        Ok(body.trim() == "1")
    }
}

#[derive(Deserialize)]
struct DescribeRow {
    name: String,
    #[serde(rename = "type")]
    column_type: String,
}

#[derive(Deserialize)]
struct RangeRow {
    c: u64,
    mn: i64,
    mx: i64,
}

impl DestinationClient for ClickHouseClient {
    fn ensure_database<'a>(
        &'a self,
        database: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), ReplicaError>> + Send + 'a>> {
        Box::pin(async move {
            self.exec(&format!("CREATE DATABASE IF NOT EXISTS {}", quote_ident(database))).await?;
            Ok(())
        })
    }

    fn ensure_table<'a>(
        &'a self,
        table: &'a TableRef,
        columns: &'a [ColumnModel],
    ) -> Pin<Box<dyn Future<Output = Result<(), ReplicaError>> + Send + 'a>> {
        Box::pin(async move {
            let sql = ddl::render_create_table(table, columns)?;
            self.exec(&sql).await.map_err(|e| e.with_context(format!("create {table}")))?;
            Ok(())
        })
    }

    fn describe_table<'a>(
        &'a self,
        table: &'a TableRef,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<(String, ColumnType)>>, ReplicaError>> + Send + 'a>>
    {
        Box::pin(async move {
            if !self.table_exists(table).await? {
                return Ok(None);
            }
            let body = self
                .exec(&format!("DESCRIBE TABLE {} FORMAT JSONEachRow", quote_table(table)))
                .await?;
            let mut columns = Vec::new();
            for line in body.lines().filter(|l| !l.is_empty()) {
                let row: DescribeRow = serde_json::from_str(line)
                    .map_err(|e| ReplicaError::decode(format!("describe row: {e}")))?;
                let ty = parse::parse_column_type(&row.column_type)
                    .map_err(|e| e.with_context(format!("column '{}'", row.name)))?;
                columns.push((row.name, ty));
            }
            Ok(Some(columns))
        })
    }

    fn timestamp_range<'a>(
        &'a self,
        table: &'a TableRef,
    ) -> Pin<Box<dyn Future<Output = Result<Option<(i64, i64)>, ReplicaError>> + Send + 'a>> {
        Box::pin(async move {
            let ts = quote_ident(TIMESTAMP_COLUMN);
            let sql = format!(
                "SELECT count() AS c, toUnixTimestamp64Nano(min({ts})) AS mn, \
                 toUnixTimestamp64Nano(max({ts})) AS mx FROM {} \
                 SETTINGS output_format_json_quote_64bit_integers = 0 FORMAT JSONEachRow",
                quote_table(table)
            );
            let body = self.exec(&sql).await?;
            let line = body.lines().find(|l| !l.is_empty()).ok_or_else(|| {
                ReplicaError::decode(format!("empty aggregate response for {table}"))
            })?;
            let row: RangeRow = serde_json::from_str(line)
                .map_err(|e| ReplicaError::decode(format!("aggregate row: {e}")))?;
            Ok((row.c > 0).then_some((row.mn, row.mx)))
        })
    }

    fn delete_at<'a>(
        &'a self,
        table: &'a TableRef,
        timestamp: i64,
    ) -> Pin<Box<dyn Future<Output = Result<(), ReplicaError>> + Send + 'a>> {
        Box::pin(async move {
            // Synchronous mutation: resume must not race the delete.
            let sql = format!(
                "ALTER TABLE {} DELETE WHERE {} = fromUnixTimestamp64Nano({timestamp}) \
                 SETTINGS mutations_sync = 1",
                quote_table(table),
                quote_ident(TIMESTAMP_COLUMN)
            );
            self.exec(&sql).await?;
            Ok(())
        })
    }

    fn insert<'a>(
        &'a self,
        statement: &'a InsertStatement,
        rows: &'a [Row],
    ) -> Pin<Box<dyn Future<Output = Result<(), ReplicaError>> + Send + 'a>> {
        Box::pin(async move {
            if rows.is_empty() {
                return Ok(());
            }
            let columns: Vec<String> =
                statement.columns.iter().map(|c| quote_ident(c)).collect();
            let mut values = Vec::with_capacity(rows.len());
            for row in rows {
                values.push(literal::render_row(row)?);
            }
            let sql = format!(
                "INSERT INTO {} ({}) VALUES {}",
                quote_table(&statement.table),
                columns.join(", "),
                values.join(",")
            );
            self.exec(&sql).await?;
            Ok(())
        })
    }
}
