//! MongoDB driver
//!
//! Migrations run inside a multi-document transaction on a client session,
//! so the server must be a replica-set member or a `mongos` router. The
//! applied set lives in a collection of `{filename, source, applied_at}`
//! documents.

mod convert;
mod handle;

use crate::error::{DriverError, DriverResult};
use crate::relational::metadata_from_row;
use crate::traits::{Driver, TransactionBody};
use crate::transaction::{TransactionControl, Transactor};
use convert::{DateRecognizer, ObjectIdRecognizer, OBJECT_ID_HEX_GLOBAL, OBJECT_ID_PRELUDE};
use chrono::DateTime;
use gv_core::{DatabaseConfig, MigrationMetadata, Value};
use gv_script::{ScriptHost, ValueRecognizer};
use mongodb::bson::{doc, DateTime as BsonDateTime, Document};
use mongodb::options::FindOptions;
use mongodb::sync::{Client, ClientSession, Collection, Database};
use std::cell::RefCell;
use std::rc::Rc;

/// Oldest server major version with multi-document transactions.
const MIN_SERVER_MAJOR: u32 = 4;

/// MongoDB driver over the synchronous client
pub struct MongoDriver {
    url: String,
    database_name: Option<String>,
    collection: String,
    state: Option<Rc<MongoState>>,
    transactor: Transactor,
}

/// Connection shared with handles. `session` is set while a transaction is
/// open and every handle operation runs on it.
pub(crate) struct MongoState {
    client: Client,
    database: Database,
    session: RefCell<Option<ClientSession>>,
}

impl MongoDriver {
    pub fn new(config: &DatabaseConfig) -> Self {
        Self {
            url: config.connection_url.clone(),
            database_name: config.database_name.clone(),
            collection: config.metadata_table().to_string(),
            state: None,
            transactor: Transactor::default(),
        }
    }

    fn state(&self) -> DriverResult<&Rc<MongoState>> {
        self.state.as_ref().ok_or(DriverError::NotConnected)
    }

    fn migrations(&self, state: &MongoState) -> Collection<Document> {
        state.database.collection::<Document>(&self.collection)
    }
}

/// Check the `buildInfo` and `hello` replies of the server.
pub(crate) fn check_server(build_info: &Document, hello: &Document) -> DriverResult<()> {
    let version = build_info
        .get_str("version")
        .map_err(|e| DriverError::Connection(format!("failed to read server version: {e}")))?;
    let major = version
        .split('.')
        .next()
        .and_then(|major| major.parse::<u32>().ok())
        .ok_or_else(|| DriverError::Connection(format!("unrecognized server version {version}")))?;
    if major < MIN_SERVER_MAJOR {
        return Err(DriverError::Connection(format!(
            "MongoDB version must be at least {MIN_SERVER_MAJOR}.0, server is {version}"
        )));
    }

    let flag = |name: &str| hello.get_bool(name).unwrap_or(false);
    if flag("secondary") {
        return Err(DriverError::Connection(
            "cannot write to a secondary MongoDB server".to_string(),
        ));
    }
    if !flag("isWritablePrimary") && !flag("ismaster") {
        return Err(DriverError::Connection("MongoDB server is not writable".to_string()));
    }
    let replica_set = hello.get_str("setName").is_ok();
    let router = hello.get_str("msg").is_ok_and(|msg| msg == "isdbgrid");
    if !replica_set && !router {
        return Err(DriverError::Connection(
            "MongoDB server must be a replica set member or a mongos router; transactions are required"
                .to_string(),
        ));
    }
    Ok(())
}

struct SessionTransaction<'a> {
    state: &'a MongoState,
}

impl TransactionControl for SessionTransaction<'_> {
    fn begin(&self) -> DriverResult<()> {
        let mut session = self
            .state
            .client
            .start_session(None)
            .map_err(|e| DriverError::Transaction(format!("failed to start session: {e}")))?;
        session
            .start_transaction(None)
            .map_err(|e| DriverError::Transaction(format!("BEGIN failed: {e}")))?;
        *self.state.session.borrow_mut() = Some(session);
        Ok(())
    }

    fn commit(&self) -> DriverResult<()> {
        let Some(mut session) = self.state.session.borrow_mut().take() else {
            return Err(DriverError::Transaction("no open transaction".to_string()));
        };
        session
            .commit_transaction()
            .map_err(|e| DriverError::Transaction(format!("COMMIT failed: {e}")))
    }

    fn rollback(&self) -> DriverResult<()> {
        // After a failed commit the session is already gone and the server
        // aborts the transaction when it ends.
        let Some(mut session) = self.state.session.borrow_mut().take() else {
            return Ok(());
        };
        session
            .abort_transaction()
            .map_err(|e| DriverError::Transaction(format!("ROLLBACK failed: {e}")))
    }
}

impl ScriptHost for MongoDriver {
    fn handle(&self) -> Value {
        match &self.state {
            Some(state) => handle::handle(state.clone()),
            None => Value::Null,
        }
    }

    fn globals(&self) -> Vec<(String, Value)> {
        vec![(
            OBJECT_ID_HEX_GLOBAL.to_string(),
            Value::Function(convert::object_id_hex()),
        )]
    }

    fn prelude(&self) -> Option<&str> {
        Some(OBJECT_ID_PRELUDE)
    }

    fn recognizers(&self) -> Vec<Rc<dyn ValueRecognizer>> {
        vec![Rc::new(ObjectIdRecognizer), Rc::new(DateRecognizer)]
    }
}

impl Driver for MongoDriver {
    fn kind(&self) -> &'static str {
        "mongodb"
    }

    fn connect(&mut self) -> DriverResult<()> {
        if self.state.is_some() {
            return Ok(());
        }
        let client =
            Client::with_uri_str(&self.url).map_err(|e| DriverError::Connection(e.to_string()))?;
        let database = match &self.database_name {
            Some(name) => client.database(name),
            None => client.default_database().ok_or_else(|| {
                DriverError::Connection(
                    "no database_name configured and none in the connection URL".to_string(),
                )
            })?,
        };

        let build_info = database
            .run_command(doc! { "buildInfo": 1 }, None)
            .map_err(|e| DriverError::Connection(format!("failed to get server version: {e}")))?;
        let hello = database
            .run_command(doc! { "hello": 1 }, None)
            .map_err(|e| DriverError::Connection(format!("failed to get server metadata: {e}")))?;
        check_server(&build_info, &hello)?;

        // Collections cannot always be created inside a transaction.
        let existing = database
            .list_collection_names(doc! { "name": self.collection.as_str() })
            .map_err(|e| DriverError::Connection(e.to_string()))?;
        if existing.is_empty() {
            database
                .create_collection(&self.collection, None)
                .map_err(|e| {
                    DriverError::Connection(format!("failed to create metadata collection: {e}"))
                })?;
        }
        log::debug!("Connected to MongoDB database {}", database.name());

        self.state = Some(Rc::new(MongoState {
            client,
            database,
            session: RefCell::new(None),
        }));
        Ok(())
    }

    fn disconnect(&mut self) -> DriverResult<()> {
        if self.state.take().is_some() {
            log::debug!("Disconnected from MongoDB");
        }
        Ok(())
    }

    fn applied_migrations(&self) -> DriverResult<Vec<MigrationMetadata>> {
        let state = self.state()?;
        let migrations = self.migrations(state);
        let mut options = FindOptions::default();
        options.sort = Some(doc! { "filename": 1 });

        let mut session = state.session.borrow_mut();
        let docs = match session.as_mut() {
            Some(session) => {
                let mut cursor = migrations
                    .find_with_session(None, options, session)
                    .map_err(|e| DriverError::Persistence(e.to_string()))?;
                cursor.iter(session).collect::<Result<Vec<_>, _>>()
            }
            None => migrations
                .find(None, options)
                .map_err(|e| DriverError::Persistence(e.to_string()))?
                .collect::<Result<Vec<_>, _>>(),
        }
        .map_err(|e| DriverError::Persistence(e.to_string()))?;

        docs.iter().map(metadata_from_document).collect()
    }

    fn set_applied_migrations(&self, migrations: &[MigrationMetadata]) -> DriverResult<()> {
        let state = self.state()?;
        let collection = self.migrations(state);
        let docs: Vec<Document> = migrations.iter().map(metadata_document).collect();

        self.transactor
            .join_or_run(&SessionTransaction { state }, &mut || {
                let mut session = state.session.borrow_mut();
                let session = session
                    .as_mut()
                    .ok_or_else(|| DriverError::Transaction("no open transaction".to_string()))?;
                collection
                    .delete_many_with_session(doc! {}, None, session)
                    .map_err(|e| DriverError::Persistence(e.to_string()))?;
                if !docs.is_empty() {
                    collection
                        .insert_many_with_session(&docs, None, session)
                        .map_err(|e| DriverError::Persistence(e.to_string()))?;
                }
                Ok(())
            })
    }

    fn with_transaction(&self, body: TransactionBody<'_>) -> DriverResult<()> {
        let state = self.state()?;
        self.transactor.run(&SessionTransaction { state }, body)
    }
}

fn metadata_document(migration: &MigrationMetadata) -> Document {
    doc! {
        "filename": migration.filename.as_str(),
        "source": migration.source.as_str(),
        "applied_at": BsonDateTime::from_millis(migration.applied_at.timestamp_millis()),
    }
}

fn metadata_from_document(doc: &Document) -> DriverResult<MigrationMetadata> {
    let field_err = |e: mongodb::bson::document::ValueAccessError| {
        DriverError::Persistence(format!("malformed migration document: {e}"))
    };
    let filename = doc.get_str("filename").map_err(field_err)?;
    let source = doc.get_str("source").map_err(field_err)?;
    let millis = doc.get_datetime("applied_at").map_err(field_err)?.timestamp_millis();
    let applied_at = DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| DriverError::Persistence(format!("applied_at out of range: {millis}")))?;
    metadata_from_row(filename.to_string(), source.to_string(), applied_at)
}

#[cfg(test)]
#[path = "mongodb_test.rs"]
mod tests;
