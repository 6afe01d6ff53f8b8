//! MongoDB provider

use crate::command::{CollectionOp, MongoCommand, parse_command};
use crate::connection::{
    DEFAULT_DATABASE, build_connection_string, command_reply_to_result, documents_to_result,
    scalar_column,
};
use crate::schema;
use async_trait::async_trait;
use bson::{Bson, Document, doc};
use dbcx_core::{
    CollectionInfo, ColumnInfo, ConnectionConfig, ConnectionState, DatabaseInfo, DbcxError,
    Dialect, Provider, QueryResult, Result, StateCell, TableInfo,
};
use futures::TryStreamExt;
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};
use parking_lot::RwLock;
use std::time::{Duration, Instant};

const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(10);

fn driver_err(context: &str) -> impl Fn(mongodb::error::Error) -> DbcxError + '_ {
    move |e| DbcxError::Query(format!("{}: {}", context, e))
}

async fn open_client(config: &ConnectionConfig, password: &str) -> Result<Client> {
    let uri = build_connection_string(config, password);
    let mut options = ClientOptions::parse(&uri)
        .await
        .map_err(|e| DbcxError::Configuration(format!("Invalid MongoDB connection string: {}", e)))?;
    options
        .server_selection_timeout
        .get_or_insert(SERVER_SELECTION_TIMEOUT);
    options.app_name.get_or_insert_with(|| "dbcx".to_string());

    let client = Client::with_options(options)
        .map_err(|e| DbcxError::Connection(format!("Failed to create MongoDB client: {}", e)))?;
    client
        .database(DEFAULT_DATABASE)
        .run_command(doc! { "ping": 1 })
        .await
        .map_err(|e| DbcxError::Connection(format!("Failed to connect to MongoDB: {}", e)))?;
    Ok(client)
}

/// Provider wrapping a `mongodb::Client`
pub struct MongoProvider {
    state: StateCell,
    client: RwLock<Option<Client>>,
    default_database: RwLock<String>,
}

impl MongoProvider {
    pub fn new() -> Self {
        Self {
            state: StateCell::new(),
            client: RwLock::new(None),
            default_database: RwLock::new(DEFAULT_DATABASE.to_string()),
        }
    }

    fn label() -> &'static str {
        Dialect::MongoDb.display_name()
    }

    fn live_client(&self) -> Result<Client> {
        self.state.ensure_connected(Self::label())?;
        self.client
            .read()
            .clone()
            .ok_or_else(|| DbcxError::NotConnected(Self::label().into()))
    }

    fn database(&self, client: &Client, database: Option<&str>) -> Database {
        match database.filter(|db| !db.is_empty()) {
            Some(name) => client.database(name),
            None => client.database(&self.default_database.read()),
        }
    }

    async fn collections(db: &Database) -> Vec<CollectionInfo> {
        let mut names = match db.list_collection_names().await {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(database = %db.name(), error = %e, "failed to list collections");
                return Vec::new();
            }
        };
        names.sort();

        let mut collections = Vec::with_capacity(names.len());
        for name in names {
            let estimated_count = db
                .collection::<Document>(&name)
                .estimated_document_count()
                .await
                .ok();
            collections.push(CollectionInfo {
                name,
                estimated_count,
            });
        }
        collections
    }
}

impl Default for MongoProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Execute a parsed command against `db`
pub(crate) async fn run_command(db: &Database, command: MongoCommand) -> Result<QueryResult> {
    let (collection, op) = match command {
        MongoCommand::RunCommand(document) => {
            let reply = db
                .run_command(document)
                .await
                .map_err(driver_err("MongoDB command failed"))?;
            return Ok(command_reply_to_result(&reply));
        }
        MongoCommand::Collection { collection, op } => (collection, op),
    };

    let coll = db.collection::<Document>(&collection);
    let method = op.method();
    let err = driver_err(method);

    let result = match op {
        CollectionOp::Find { filter, options } => {
            let mut find = coll.find(filter);
            if let Some(projection) = options.projection {
                find = find.projection(projection);
            }
            if let Some(sort) = options.sort {
                find = find.sort(sort);
            }
            if let Some(limit) = options.limit {
                find = find.limit(limit);
            }
            if let Some(skip) = options.skip {
                find = find.skip(skip);
            }
            let documents: Vec<Document> = find.await.map_err(&err)?.try_collect().await.map_err(&err)?;
            documents_to_result(&documents)
        }
        CollectionOp::FindOne { filter, projection } => {
            let mut find = coll.find_one(filter);
            if let Some(projection) = projection {
                find = find.projection(projection);
            }
            let documents: Vec<Document> = find.await.map_err(&err)?.into_iter().collect();
            documents_to_result(&documents)
        }
        CollectionOp::Aggregate { pipeline } => {
            let documents: Vec<Document> = coll
                .aggregate(pipeline)
                .await
                .map_err(&err)?
                .try_collect()
                .await
                .map_err(&err)?;
            documents_to_result(&documents)
        }
        CollectionOp::CountDocuments { filter } => {
            let count = coll.count_documents(filter).await.map_err(&err)?;
            scalar_column("count", vec![Bson::Int64(count as i64)])
        }
        CollectionOp::EstimatedDocumentCount => {
            let count = coll.estimated_document_count().await.map_err(&err)?;
            scalar_column("count", vec![Bson::Int64(count as i64)])
        }
        CollectionOp::Distinct { field, filter } => {
            let values = coll.distinct(&field, filter).await.map_err(&err)?;
            scalar_column(&field, values)
        }
        CollectionOp::InsertOne { document } => {
            coll.insert_one(document).await.map_err(&err)?;
            QueryResult::affected(1)
        }
        CollectionOp::InsertMany { documents } => {
            let inserted = coll.insert_many(documents).await.map_err(&err)?;
            QueryResult::affected(inserted.inserted_ids.len() as u64)
        }
        CollectionOp::UpdateOne { filter, update } => {
            let updated = coll.update_one(filter, update).await.map_err(&err)?;
            QueryResult::affected(updated.modified_count)
        }
        CollectionOp::UpdateMany { filter, update } => {
            let updated = coll.update_many(filter, update).await.map_err(&err)?;
            QueryResult::affected(updated.modified_count)
        }
        CollectionOp::DeleteOne { filter } => {
            let deleted = coll.delete_one(filter).await.map_err(&err)?;
            QueryResult::affected(deleted.deleted_count)
        }
        CollectionOp::DeleteMany { filter } => {
            let deleted = coll.delete_many(filter).await.map_err(&err)?;
            QueryResult::affected(deleted.deleted_count)
        }
    };
    Ok(result)
}

#[async_trait]
impl Provider for MongoProvider {
    fn dialect(&self) -> Dialect {
        Dialect::MongoDb
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    #[tracing::instrument(skip(self, config, password), fields(host = %config.host, port = config.port))]
    async fn connect(&self, config: &ConnectionConfig, password: &str) -> Result<()> {
        self.state.set(ConnectionState::Connecting);
        let previous = self.client.write().take();
        if let Some(previous) = previous {
            previous.shutdown().await;
        }

        match open_client(config, password).await {
            Ok(client) => {
                *self.client.write() = Some(client);
                *self.default_database.write() = config
                    .default_database()
                    .unwrap_or(DEFAULT_DATABASE)
                    .to_string();
                self.state.set(ConnectionState::Connected);
                tracing::info!(database = ?config.database, "MongoDB connection established");
                Ok(())
            }
            Err(e) => {
                self.state.set(ConnectionState::Error);
                tracing::error!(error = %e, "MongoDB connection failed");
                Err(e)
            }
        }
    }

    #[tracing::instrument(skip(self))]
    async fn disconnect(&self) -> Result<()> {
        let client = self.client.write().take();
        if let Some(client) = client {
            tracing::info!("closing MongoDB client");
            client.shutdown().await;
        }
        self.state.set(ConnectionState::Disconnected);
        Ok(())
    }

    #[tracing::instrument(skip(self, config, password), fields(host = %config.host))]
    async fn test_connection(&self, config: &ConnectionConfig, password: &str) -> Result<()> {
        let client = open_client(config, password).await?;
        client.shutdown().await;
        Ok(())
    }

    /// Databases with their collections and estimated document counts
    #[tracing::instrument(skip(self))]
    async fn get_databases(&self) -> Result<Vec<DatabaseInfo>> {
        let client = self.live_client()?;
        let names = client
            .list_database_names()
            .await
            .map_err(driver_err("Failed to list databases"))?;

        let mut databases = Vec::with_capacity(names.len());
        for name in names {
            let collections = Self::collections(&client.database(&name)).await;
            databases.push(DatabaseInfo { name, collections });
        }
        Ok(databases)
    }

    /// Documents have no tables; collections are reported by `get_databases`
    async fn get_tables(&self, _database: Option<&str>) -> Result<Vec<TableInfo>> {
        self.state.ensure_connected(Self::label())?;
        Ok(Vec::new())
    }

    #[tracing::instrument(skip(self))]
    async fn get_columns(&self, database: Option<&str>, table: &str) -> Result<Vec<ColumnInfo>> {
        let client = self.live_client()?;
        let sample = self
            .database(&client, database)
            .collection::<Document>(table)
            .find_one(doc! {})
            .await
            .map_err(driver_err("Failed to sample collection"))?;
        Ok(sample.as_ref().map(schema::infer_columns).unwrap_or_default())
    }

    #[tracing::instrument(skip(self, sql), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute_query(&self, sql: &str, database: Option<&str>) -> Result<QueryResult> {
        let client = self.live_client()?;
        let started = Instant::now();
        let db = self.database(&client, database);
        let outcome = async {
            let command = parse_command(sql).map_err(|e| DbcxError::Query(e.to_string()))?;
            tracing::debug!(database = %db.name(), command = command_kind(&command), "running MongoDB command");
            run_command(&db, command).await
        }
        .await;
        let result = QueryResult::from_outcome(outcome, started);
        tracing::debug!(
            row_count = result.row_count,
            execution_time_ms = result.execution_time_ms,
            failed = result.is_error(),
            "statement executed"
        );
        Ok(result)
    }
}

fn command_kind(command: &MongoCommand) -> &'static str {
    match command {
        MongoCommand::RunCommand(_) => "runCommand",
        MongoCommand::Collection { op, .. } => op.method(),
    }
}
