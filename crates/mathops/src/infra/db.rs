use crate::SqliteConfigSerde;
use log::debug;
use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Row, Sqlite, SqlitePool,
};
use std::{
    hash::{DefaultHasher, Hash, Hasher},
    time::Duration as StdDuration,
};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum SqliteMode {
    ReadWriteCreate, // rwc - Read + Write + Create if missing
    ReadWrite,       // rw  - Read + Write (must exist)
    ReadOnly,        // ro  - Read only (must exist)
    Memory,          // memory - In-memory database
}

#[derive(Debug, Clone)]
pub enum JournalMode {
    WAL,    // Best for concurrent access
    DELETE, // Default, good for single writer
    MEMORY, // In-memory journal
    OFF,    // No journal (dangerous)
}

#[derive(Debug, Clone)]
pub enum SynchronousMode {
    OFF,    // Fastest, least safe
    NORMAL, // Good balance
    FULL,   // Safest, slower
}

#[derive(Debug, Clone)]
pub struct SqliteConfig {
    pub mode: SqliteMode,
    pub busy_timeout_ms: u32,
    pub journal_mode: JournalMode,
    pub synchronous: SynchronousMode,
    pub cache_size: i32,
    pub foreign_keys: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            mode: SqliteMode::ReadWriteCreate,
            busy_timeout_ms: 5000,
            journal_mode: JournalMode::WAL,
            synchronous: SynchronousMode::NORMAL,
            cache_size: 1000000,
            foreign_keys: true,
        }
    }
}

impl SqliteConfig {
    pub fn build_connect_options(&self, database_path: &str) -> SqliteConnectOptions {
        let mut options = SqliteConnectOptions::new();

        match self.mode {
            SqliteMode::Memory => {
                // Shared in-memory database so the read and write pools see the
                // same tables. The name is hashed from the path to keep tests
                // from colliding with each other.
                let mut hasher = DefaultHasher::new();
                database_path.hash(&mut hasher);
                let unique_id = hasher.finish();

                let memory_uri = format!("file:memdb_{}?mode=memory&cache=shared", unique_id);
                options = options.filename(&memory_uri).shared_cache(true);
            }
            SqliteMode::ReadOnly => {
                return options
                    .filename(database_path)
                    .read_only(true)
                    .busy_timeout(StdDuration::from_millis(self.busy_timeout_ms as u64));
            }
            SqliteMode::ReadWrite => {
                options = options.filename(database_path).read_only(false);
            }
            SqliteMode::ReadWriteCreate => {
                options = options
                    .filename(database_path)
                    .read_only(false)
                    .create_if_missing(true);
            }
        }

        options = options.busy_timeout(StdDuration::from_millis(self.busy_timeout_ms as u64));

        let journal_mode = match self.journal_mode {
            JournalMode::WAL => "WAL",
            JournalMode::DELETE => "DELETE",
            JournalMode::MEMORY => "MEMORY",
            JournalMode::OFF => "OFF",
        };
        options = options.pragma("journal_mode", journal_mode);

        let sync_mode = match self.synchronous {
            SynchronousMode::OFF => "OFF",
            SynchronousMode::NORMAL => "NORMAL",
            SynchronousMode::FULL => "FULL",
        };
        options = options.pragma("synchronous", sync_mode);

        options = options.pragma("cache_size", self.cache_size.to_string());

        if self.foreign_keys {
            options = options.pragma("foreign_keys", "true");
        }

        options
    }
}

#[derive(Debug, Clone)]
pub struct DatabasePoolConfig {
    pub read_max_connections: u32,
    pub read_min_connections: u32,
    pub write_max_connections: u32,
    pub write_min_connections: u32,
    pub idle_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
    pub sqlite_config: SqliteConfig,
}

impl Default for DatabasePoolConfig {
    fn default() -> Self {
        Self {
            read_max_connections: 8,
            read_min_connections: 2,
            write_max_connections: 3,
            write_min_connections: 1,
            idle_timeout_secs: 600,
            acquire_timeout_secs: 15,
            sqlite_config: SqliteConfig::default(),
        }
    }
}

impl From<SqliteConfigSerde> for SqliteConfig {
    fn from(config: SqliteConfigSerde) -> Self {
        Self {
            mode: match config.mode.as_str() {
                "ReadWriteCreate" => SqliteMode::ReadWriteCreate,
                "ReadWrite" => SqliteMode::ReadWrite,
                "ReadOnly" => SqliteMode::ReadOnly,
                "Memory" => SqliteMode::Memory,
                _ => SqliteMode::ReadWriteCreate,
            },
            busy_timeout_ms: config.busy_timeout_ms,
            journal_mode: match config.journal_mode.as_str() {
                "WAL" => JournalMode::WAL,
                "DELETE" => JournalMode::DELETE,
                "MEMORY" => JournalMode::MEMORY,
                "OFF" => JournalMode::OFF,
                _ => JournalMode::WAL,
            },
            synchronous: match config.synchronous.as_str() {
                "OFF" => SynchronousMode::OFF,
                "NORMAL" => SynchronousMode::NORMAL,
                "FULL" => SynchronousMode::FULL,
                _ => SynchronousMode::NORMAL,
            },
            cache_size: config.cache_size,
            foreign_keys: config.foreign_keys,
        }
    }
}

impl From<crate::config::DBSettings> for DatabasePoolConfig {
    fn from(config: crate::config::DBSettings) -> Self {
        Self {
            read_max_connections: config.read_max_connections,
            read_min_connections: config.read_min_connections,
            write_max_connections: config.write_max_connections,
            write_min_connections: config.write_min_connections,
            idle_timeout_secs: config.idle_timeout_secs,
            acquire_timeout_secs: config.acquire_timeout_secs,
            sqlite_config: config.sqlite_config.into(),
        }
    }
}

static OPERATIONS_MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/operations");

#[derive(Clone, Debug)]
pub struct DBConnection {
    pub database_name: String,
    pub database_path: String,
    read_pool: SqlitePool,
    write_pool: SqlitePool,
}

impl DBConnection {
    /// Opens the read/write pools and runs the idempotent schema migrator.
    /// The process must not serve requests against a store this has not
    /// succeeded for.
    pub async fn new(
        path: &str,
        db_name: &str,
        database_pool_config: DatabasePoolConfig,
    ) -> Result<Self, sqlx::Error> {
        let database_path = format!("{}/{}.db", path, db_name);

        if !matches!(database_pool_config.sqlite_config.mode, SqliteMode::Memory) {
            let database_url = format!("sqlite:{}", database_path);
            if !Sqlite::database_exists(&database_url).await? {
                Sqlite::create_database(&database_url).await?;
            }
        }

        let (read_pool, write_pool) =
            Self::create_pools(&database_path, &database_pool_config).await?;

        OPERATIONS_MIGRATOR
            .run(&write_pool)
            .await
            .map_err(|e| sqlx::Error::Migrate(Box::new(e)))?;

        Ok(Self {
            database_name: db_name.to_string(),
            database_path,
            read_pool,
            write_pool,
        })
    }

    #[cfg(test)]
    pub fn new_with_pools(
        database_name: String,
        database_path: String,
        read_pool: SqlitePool,
        write_pool: SqlitePool,
    ) -> Self {
        Self {
            database_name,
            database_path,
            read_pool,
            write_pool,
        }
    }

    async fn create_pools(
        database_path: &str,
        database_pool_config: &DatabasePoolConfig,
    ) -> Result<(SqlitePool, SqlitePool), sqlx::Error> {
        let (read_config, write_config) =
            if matches!(database_pool_config.sqlite_config.mode, SqliteMode::Memory) {
                let read_config = SqliteConfig {
                    mode: SqliteMode::Memory,
                    synchronous: SynchronousMode::OFF,
                    ..database_pool_config.sqlite_config.clone()
                };
                let write_config = SqliteConfig {
                    mode: SqliteMode::Memory,
                    ..database_pool_config.sqlite_config.clone()
                };
                (read_config, write_config)
            } else {
                let read_config = SqliteConfig {
                    mode: SqliteMode::ReadOnly,
                    synchronous: SynchronousMode::OFF,
                    foreign_keys: false,
                    ..database_pool_config.sqlite_config.clone()
                };
                let write_config = SqliteConfig {
                    mode: SqliteMode::ReadWrite,
                    ..database_pool_config.sqlite_config.clone()
                };
                (read_config, write_config)
            };

        let write_connection = write_config.build_connect_options(database_path);
        debug!("Write connection: {:?}", write_connection);

        let write_pool = SqlitePoolOptions::new()
            .max_connections(database_pool_config.write_max_connections)
            .min_connections(database_pool_config.write_min_connections)
            .acquire_timeout(StdDuration::from_secs(
                database_pool_config.acquire_timeout_secs,
            ))
            .idle_timeout(StdDuration::from_secs(
                database_pool_config.idle_timeout_secs,
            ))
            .connect_with(write_connection)
            .await?;

        let read_connection = read_config.build_connect_options(database_path);
        debug!("Read connection: {:?}", read_connection);

        let read_pool = SqlitePoolOptions::new()
            .max_connections(database_pool_config.read_max_connections)
            .min_connections(database_pool_config.read_min_connections)
            .acquire_timeout(StdDuration::from_secs(
                database_pool_config.acquire_timeout_secs,
            ))
            .idle_timeout(StdDuration::from_secs(
                database_pool_config.idle_timeout_secs,
            ))
            .connect_with(read_connection)
            .await?;

        Ok((read_pool, write_pool))
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        let _: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.read_pool)
            .await?;
        let _: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.write_pool)
            .await?;

        Ok(())
    }

    pub fn read(&self) -> &SqlitePool {
        &self.read_pool
    }

    pub fn write(&self) -> &SqlitePool {
        &self.write_pool
    }
}

pub fn parse_required_datetime(
    row: &SqliteRow,
    column: &str,
) -> Result<OffsetDateTime, sqlx::Error> {
    let date_str: String = row.get(column);
    OffsetDateTime::parse(&date_str, &Rfc3339).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

pub fn parse_required_uuid(row: &SqliteRow, column: &str) -> Result<Uuid, sqlx::Error> {
    let id_str: String = row.get(column);
    Uuid::parse_str(&id_str).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}
