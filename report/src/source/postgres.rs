//! PostgreSQL query source.
//!
//! The connection is an explicit handle: open it with
//! [`PostgresSource::connect`], pass it to the driver, and release it with
//! [`PostgresSource::close`] whatever the run's outcome.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use std::error::Error;
use tokio::task::JoinHandle;
use tokio_postgres::config::Host;
use tokio_postgres::types::{FromSql, Kind, Type};
use tokio_postgres::{Client, NoTls};
use uuid::Uuid;

use super::QuerySource;
use crate::config::{ConnectionSettings, DEFAULT_PORT};
use crate::error::{SourceError, SourceResult};
use crate::logs::{log_error, log_success, log_warning};
use crate::models::{QueryOutput, Row, Scalar};

/// How a Postgres column type is read into a [`Scalar`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Bool,
    Int2,
    Int4,
    Int8,
    Oid,
    Float4,
    Float8,
    Numeric,
    Text,
    /// Single-byte `"char"`
    Char,
    /// Label of a user-defined enum type
    Enum,
    Json,
    Uuid,
    Date,
    Time,
    Timestamp,
    TimestampTz,
}

impl ColumnKind {
    /// Map a Postgres type, or `None` if the report cannot represent it.
    ///
    /// Built-in types are matched by name. Outside `pg_catalog` only enum
    /// types and the `citext` extension type are readable.
    pub fn of(ty: &Type) -> Option<Self> {
        if let Kind::Enum(_) = ty.kind() {
            return Some(Self::Enum);
        }
        if ty.name() == "citext" {
            return Some(Self::Text);
        }
        if ty.schema() != "pg_catalog" {
            return None;
        }
        let kind = match ty.name() {
            "bool" => Self::Bool,
            "int2" => Self::Int2,
            "int4" => Self::Int4,
            "int8" => Self::Int8,
            "oid" => Self::Oid,
            "float4" => Self::Float4,
            "float8" => Self::Float8,
            "numeric" => Self::Numeric,
            "text" | "varchar" | "bpchar" | "name" | "unknown" => Self::Text,
            "char" => Self::Char,
            "json" | "jsonb" => Self::Json,
            "uuid" => Self::Uuid,
            "date" => Self::Date,
            "time" => Self::Time,
            "timestamp" => Self::Timestamp,
            "timestamptz" => Self::TimestampTz,
            _ => return None,
        };
        Some(kind)
    }

    fn read(self, row: &tokio_postgres::Row, idx: usize) -> SourceResult<Scalar> {
        let value: Scalar = match self {
            Self::Bool => row.try_get::<_, Option<bool>>(idx)?.into(),
            Self::Int2 => row.try_get::<_, Option<i16>>(idx)?.map(i64::from).into(),
            Self::Int4 => row.try_get::<_, Option<i32>>(idx)?.map(i64::from).into(),
            Self::Int8 => row.try_get::<_, Option<i64>>(idx)?.into(),
            Self::Oid => row.try_get::<_, Option<u32>>(idx)?.map(i64::from).into(),
            Self::Float4 => row.try_get::<_, Option<f32>>(idx)?.map(f64::from).into(),
            Self::Float8 => row.try_get::<_, Option<f64>>(idx)?.into(),
            Self::Numeric => row.try_get::<_, Option<Decimal>>(idx)?.into(),
            Self::Text => row.try_get::<_, Option<String>>(idx)?.into(),
            Self::Char => row
                .try_get::<_, Option<i8>>(idx)?
                .map(|c| char::from(c as u8).to_string())
                .into(),
            Self::Enum => row.try_get::<_, Option<EnumLabel>>(idx)?.map(|l| l.0).into(),
            Self::Json => row
                .try_get::<_, Option<serde_json::Value>>(idx)?
                .map_or(Scalar::Null, Scalar::Json),
            Self::Uuid => row
                .try_get::<_, Option<Uuid>>(idx)?
                .map(|u| u.to_string())
                .into(),
            Self::Date => row
                .try_get::<_, Option<NaiveDate>>(idx)?
                .map(|d| d.format("%Y-%m-%d").to_string())
                .into(),
            Self::Time => row
                .try_get::<_, Option<NaiveTime>>(idx)?
                .map(|t| t.format("%H:%M:%S%.f").to_string())
                .into(),
            Self::Timestamp => row
                .try_get::<_, Option<NaiveDateTime>>(idx)?
                .map(|t| t.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
                .into(),
            Self::TimestampTz => row
                .try_get::<_, Option<DateTime<Utc>>>(idx)?
                .map(|t| t.to_rfc3339())
                .into(),
        };
        Ok(value)
    }
}

/// Text label of any enum value, whatever the enum type.
struct EnumLabel(String);

impl<'a> FromSql<'a> for EnumLabel {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(EnumLabel(std::str::from_utf8(raw)?.to_string()))
    }

    fn accepts(ty: &Type) -> bool {
        matches!(ty.kind(), Kind::Enum(_))
    }
}

/// A live PostgreSQL connection.
pub struct PostgresSource {
    client: Client,
    connection: JoinHandle<()>,
}

impl PostgresSource {
    /// Open a connection.
    ///
    /// Connection and authentication failures are returned as
    /// [`SourceError::Connect`]; nothing is retried.
    pub async fn connect(settings: &ConnectionSettings) -> SourceResult<Self> {
        let config = pg_config(settings)?;
        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(SourceError::Connect)?;

        let connection = tokio::spawn(async move {
            if let Err(e) = connection.await {
                log_error(format!("Database connection error: {}", e));
            }
        });

        log_success(format!("Connected to {}", describe(&config)));
        Ok(Self { client, connection })
    }

    /// Close the connection and wait for its task to finish.
    pub async fn close(self) {
        drop(self.client);
        if let Err(e) = self.connection.await {
            log_warning(format!("Connection task ended abnormally: {}", e));
        }
    }
}

#[async_trait]
impl QuerySource for PostgresSource {
    async fn execute(&mut self, _name: &str, sql: &str) -> SourceResult<QueryOutput> {
        let statement = self.client.prepare(sql).await?;

        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let mut kinds = Vec::with_capacity(columns.len());
        for column in statement.columns() {
            let kind =
                ColumnKind::of(column.type_()).ok_or_else(|| SourceError::UnsupportedType {
                    column: column.name().to_string(),
                    type_name: column.type_().name().to_string(),
                })?;
            kinds.push(kind);
        }

        let pg_rows = self.client.query(&statement, &[]).await?;

        let mut rows = Vec::with_capacity(pg_rows.len());
        for pg_row in &pg_rows {
            let mut row = Row::with_capacity(columns.len());
            for (idx, (name, kind)) in columns.iter().zip(&kinds).enumerate() {
                row.insert(name.clone(), kind.read(pg_row, idx)?);
            }
            rows.push(row);
        }

        Ok(QueryOutput::new(columns, rows))
    }
}

/// Build the driver config from the connection settings.
fn pg_config(settings: &ConnectionSettings) -> SourceResult<tokio_postgres::Config> {
    if let Some(ref url) = settings.url {
        return url.parse().map_err(SourceError::Connect);
    }

    let mut config = tokio_postgres::Config::new();
    config
        .host(&settings.host)
        .port(settings.port)
        .user(&settings.user)
        .dbname(&settings.dbname);
    if let Some(ref password) = settings.password {
        config.password(password);
    }
    Ok(config)
}

/// Connection target as `user@host:port/dbname`, never including the
/// password, whatever form the settings were given in.
fn describe(config: &tokio_postgres::Config) -> String {
    let hosts: Vec<String> = config
        .get_hosts()
        .iter()
        .map(|host| match host {
            Host::Tcp(name) => name.clone(),
            #[cfg(unix)]
            Host::Unix(path) => path.display().to_string(),
        })
        .collect();
    let ports: Vec<String> = match config.get_ports() {
        [] => vec![DEFAULT_PORT.to_string()],
        ports => ports.iter().map(u16::to_string).collect(),
    };

    let mut target = String::new();
    if let Some(user) = config.get_user() {
        target.push_str(user);
        target.push('@');
    }
    target.push_str(&hosts.join(","));
    target.push(':');
    target.push_str(&ports.join(","));
    if let Some(dbname) = config.get_dbname() {
        target.push('/');
        target.push_str(dbname);
    }
    target
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_kinds() {
        assert_eq!(ColumnKind::of(&Type::NUMERIC), Some(ColumnKind::Numeric));
        assert_eq!(ColumnKind::of(&Type::INT8), Some(ColumnKind::Int8));
        assert_eq!(ColumnKind::of(&Type::VARCHAR), Some(ColumnKind::Text));
        assert_eq!(ColumnKind::of(&Type::BPCHAR), Some(ColumnKind::Text));
        assert_eq!(ColumnKind::of(&Type::TIMESTAMPTZ), Some(ColumnKind::TimestampTz));
    }

    #[test]
    fn test_json_uuid_char_time_kinds() {
        assert_eq!(ColumnKind::of(&Type::JSON), Some(ColumnKind::Json));
        assert_eq!(ColumnKind::of(&Type::JSONB), Some(ColumnKind::Json));
        assert_eq!(ColumnKind::of(&Type::UUID), Some(ColumnKind::Uuid));
        assert_eq!(ColumnKind::of(&Type::CHAR), Some(ColumnKind::Char));
        assert_eq!(ColumnKind::of(&Type::TIME), Some(ColumnKind::Time));
    }

    #[test]
    fn test_user_defined_enum_reads_as_label() {
        let state = Type::new(
            "incident_state".into(),
            90_001,
            Kind::Enum(vec!["new".into(), "in_progress".into(), "closed".into()]),
            "public".into(),
        );
        assert_eq!(ColumnKind::of(&state), Some(ColumnKind::Enum));
        assert!(<EnumLabel as FromSql>::accepts(&state));
        assert!(!<EnumLabel as FromSql>::accepts(&Type::TEXT));

        let label = EnumLabel::from_sql(&state, b"in_progress").unwrap();
        assert_eq!(label.0, "in_progress");
    }

    #[test]
    fn test_unsupported_kinds() {
        let composite = Type::new(
            "ticket".into(),
            90_002,
            Kind::Composite(vec![]),
            "public".into(),
        );
        assert_eq!(ColumnKind::of(&composite), None);
        assert_eq!(ColumnKind::of(&Type::BYTEA), None);
        assert_eq!(ColumnKind::of(&Type::INT4_ARRAY), None);
    }

    #[test]
    fn test_pg_config_from_parts() {
        let settings = ConnectionSettings {
            url: None,
            host: "db.internal".into(),
            port: 6543,
            user: "report".into(),
            dbname: "snow".into(),
            password: Some("s3cret".into()),
        };

        let config = pg_config(&settings).unwrap();
        assert_eq!(config.get_ports(), &[6543]);
        assert_eq!(config.get_user(), Some("report"));
        assert_eq!(config.get_dbname(), Some("snow"));
        assert_eq!(config.get_password(), Some(&b"s3cret"[..]));
    }

    #[test]
    fn test_pg_config_from_url() {
        let settings = ConnectionSettings {
            url: Some("postgresql://postgres:pw@localhost:5432/postgres".into()),
            ..ConnectionSettings::default()
        };

        let config = pg_config(&settings).unwrap();
        assert_eq!(config.get_dbname(), Some("postgres"));
        assert_eq!(config.get_password(), Some(&b"pw"[..]));
    }

    #[test]
    fn test_describe_hides_credentials() {
        let url = ConnectionSettings {
            url: Some("postgresql://postgres:pw@db:5432/postgres".into()),
            ..ConnectionSettings::default()
        };
        assert_eq!(describe(&pg_config(&url).unwrap()), "postgres@db:5432/postgres");

        let key_value = ConnectionSettings {
            url: Some("host=db user=postgres password=hunter2".into()),
            ..ConnectionSettings::default()
        };
        let target = describe(&pg_config(&key_value).unwrap());
        assert_eq!(target, "postgres@db:5432");
        assert!(!target.contains("hunter2"));

        let parts = ConnectionSettings {
            password: Some("pw".into()),
            ..ConnectionSettings::default()
        };
        assert_eq!(
            describe(&pg_config(&parts).unwrap()),
            "postgres@localhost:5432/postgres"
        );
    }

    #[test]
    fn test_pg_config_bad_url() {
        let settings = ConnectionSettings {
            url: Some("postgresql://localhost:notaport/db".into()),
            ..ConnectionSettings::default()
        };
        assert!(matches!(pg_config(&settings), Err(SourceError::Connect(_))));
    }
}
