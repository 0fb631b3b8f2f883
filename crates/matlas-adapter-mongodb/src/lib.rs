//! wire-protocol inspector: lists databases, collections and indexes of a
//! running cluster.

use async_trait::async_trait;
use futures::TryStreamExt;
use matlas_core::{
    DiscoveredCollection, DiscoveredDatabase, DiscoveredIndex, Error, Result,
};
use matlas_engine::{ClusterTarget, DatabaseInspector};
use mongodb::bson::{doc, Bson, Document};
use mongodb::error::ErrorKind as DriverErrorKind;
use mongodb::options::ClientOptions;
use mongodb::results::CollectionType;
use mongodb::{Client, Database, IndexModel};
use std::future::IntoFuture;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// server error code for a missing privilege.
const UNAUTHORIZED_CODE: i32 = 13;

/// per-step time limits for one cluster.
#[derive(Debug, Clone)]
pub struct InspectorOptions {
    pub connect_timeout: Duration,
    pub ping_timeout: Duration,
    pub list_databases_timeout: Duration,
    pub stats_timeout: Duration,
    pub list_collections_timeout: Duration,
    pub list_indexes_timeout: Duration,
}

impl Default for InspectorOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            ping_timeout: Duration::from_secs(5),
            list_databases_timeout: Duration::from_secs(30),
            stats_timeout: Duration::from_secs(10),
            list_collections_timeout: Duration::from_secs(30),
            list_indexes_timeout: Duration::from_secs(10),
        }
    }
}

/// [`DatabaseInspector`] over the official driver.
#[derive(Debug, Clone, Default)]
pub struct MongoInspector {
    options: InspectorOptions,
}

impl MongoInspector {
    pub fn new(options: InspectorOptions) -> Self {
        Self { options }
    }

    async fn connect(&self, target: &ClusterTarget) -> Result<Client> {
        let uri = target.uri.expose().ok_or_else(|| {
            Error::Validation(format!(
                "cluster {} has no usable connection string",
                target.cluster_name
            ))
        })?;
        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|err| driver_error(&target.cluster_name, "parse connection string", err))?;
        options.app_name = Some("matlas".to_string());
        options.connect_timeout = Some(self.options.connect_timeout);
        if options.server_selection_timeout.is_none() {
            options.server_selection_timeout = Some(self.options.connect_timeout);
        }
        Client::with_options(options)
            .map_err(|err| driver_error(&target.cluster_name, "connect", err))
    }

    async fn collection(
        &self,
        cancel: &CancellationToken,
        cluster: &str,
        db: &Database,
        name: String,
    ) -> Result<DiscoveredCollection> {
        let mut collection = DiscoveredCollection {
            name,
            document_count: 0,
            size_bytes: 0,
            storage_size_bytes: 0,
            indexes: Vec::new(),
        };
        let stats = bounded(
            cancel,
            self.options.stats_timeout,
            "collStats",
            db.run_command(doc! { "collStats": collection.name.as_str() }),
        )
        .await;
        match stats {
            Ok(stats) => {
                collection.document_count = number(&stats, "count");
                collection.size_bytes = number(&stats, "size");
                collection.storage_size_bytes = number(&stats, "storageSize");
            }
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => warn!(
                cluster,
                database = db.name(),
                collection = %collection.name,
                error = %err,
                "collection stats unavailable"
            ),
        }

        let handle = db.collection::<Document>(&collection.name);
        let models: Vec<IndexModel> = bounded(
            cancel,
            self.options.list_indexes_timeout,
            "listIndexes",
            async {
                let cursor = handle.list_indexes().await?;
                let models: Vec<IndexModel> = cursor.try_collect().await?;
                Ok::<_, mongodb::error::Error>(models)
            },
        )
        .await
        .map_err(|err| annotate(err, cluster, db.name()))?;
        collection.indexes = models.into_iter().map(index_from_model).collect();
        Ok(collection)
    }
}

#[async_trait]
impl DatabaseInspector for MongoInspector {
    async fn inspect(
        &self,
        cancel: &CancellationToken,
        target: &ClusterTarget,
    ) -> Result<Vec<DiscoveredDatabase>> {
        let cluster = target.cluster_name.as_str();
        let client = self.connect(target).await?;
        bounded(
            cancel,
            self.options.ping_timeout,
            "ping",
            client.database("admin").run_command(doc! { "ping": 1 }),
        )
        .await
        .map_err(|err| annotate(err, cluster, "admin"))?;

        let specs = bounded(
            cancel,
            self.options.list_databases_timeout,
            "listDatabases",
            client.list_databases(),
        )
        .await
        .map_err(|err| annotate(err, cluster, "admin"))?;

        let mut databases = Vec::with_capacity(specs.len());
        for spec in specs {
            let db = client.database(&spec.name);
            let names = bounded(
                cancel,
                self.options.list_collections_timeout,
                "listCollections",
                async {
                    let specs: Vec<_> = db.list_collections().await?.try_collect().await?;
                    Ok::<_, mongodb::error::Error>(
                        specs
                            .into_iter()
                            .filter(|spec| matches!(spec.collection_type, CollectionType::Collection))
                            .map(|spec| spec.name)
                            .collect::<Vec<_>>(),
                    )
                },
            )
            .await
            .map_err(|err| annotate(err, cluster, &spec.name))?;

            let mut collections = Vec::with_capacity(names.len());
            for name in names {
                collections.push(self.collection(cancel, cluster, &db, name).await?);
            }
            debug!(cluster, database = %spec.name, collections = collections.len(), "inspected database");
            databases.push(DiscoveredDatabase {
                cluster_name: target.cluster_name.clone(),
                name: spec.name,
                size_on_disk: spec.size_on_disk,
                empty: spec.empty,
                collections,
            });
        }
        Ok(databases)
    }
}

/// run one driver call under a deadline and the cancellation token.
async fn bounded<T, F>(
    cancel: &CancellationToken,
    limit: Duration,
    step: &str,
    call: F,
) -> Result<T>
where
    F: IntoFuture<Output = mongodb::error::Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled(format!("{step}: cancelled"))),
        result = tokio::time::timeout(limit, call.into_future()) => match result {
            Ok(inner) => inner.map_err(|err| classify(step, err)),
            Err(_) => Err(Error::Transient(format!(
                "{step} did not finish within {}s",
                limit.as_secs()
            ))),
        },
    }
}

fn annotate(err: Error, cluster: &str, database: &str) -> Error {
    if err.is_cancelled() {
        return err;
    }
    Error::new(
        err.kind(),
        format!("cluster {cluster}, database {database}: {}", err.message()),
    )
}

fn driver_error(cluster: &str, step: &str, err: mongodb::error::Error) -> Error {
    annotate(classify(step, err), cluster, "admin")
}

/// map a driver error onto the shared taxonomy.
fn classify(step: &str, err: mongodb::error::Error) -> Error {
    let message = format!("{step}: {err}");
    match err.kind.as_ref() {
        DriverErrorKind::Authentication { .. } => Error::Unauthorized(message),
        DriverErrorKind::Command(command) if command.code == UNAUTHORIZED_CODE => {
            Error::Unauthorized(message)
        }
        DriverErrorKind::ServerSelection { .. }
        | DriverErrorKind::Io(_)
        | DriverErrorKind::DnsResolve { .. } => Error::Unavailable(message),
        DriverErrorKind::InvalidArgument { .. } => Error::Validation(message),
        _ => Error::Execution(message),
    }
}

/// numeric field of a command reply; stats mix int32, int64 and double.
fn number(reply: &Document, key: &str) -> u64 {
    match reply.get(key) {
        Some(Bson::Int32(value)) => (*value).max(0) as u64,
        Some(Bson::Int64(value)) => (*value).max(0) as u64,
        Some(Bson::Double(value)) if *value > 0.0 => *value as u64,
        _ => 0,
    }
}

fn index_from_model(model: IndexModel) -> DiscoveredIndex {
    let options = model.options.unwrap_or_default();
    let name = options.name.unwrap_or_else(|| index_name(&model.keys));
    DiscoveredIndex {
        name,
        keys: Bson::Document(model.keys).into_relaxed_extjson(),
        unique: options.unique.unwrap_or(false),
        sparse: options.sparse.unwrap_or(false),
        ttl_seconds: options.expire_after.map(|ttl| ttl.as_secs() as i64),
        partial_filter: options
            .partial_filter_expression
            .map(|filter| Bson::Document(filter).into_relaxed_extjson()),
    }
}

/// server-style default name (`a_1_b_-1`) for an unnamed index.
fn index_name(keys: &Document) -> String {
    keys.iter()
        .map(|(field, direction)| match direction {
            Bson::String(kind) => format!("{field}_{kind}"),
            Bson::Int32(value) => format!("{field}_{value}"),
            Bson::Int64(value) => format!("{field}_{value}"),
            Bson::Double(value) => format!("{field}_{}", *value as i64),
            other => format!("{field}_{other}"),
        })
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use matlas_core::{ErrorKind, Secret};
    use mongodb::options::IndexOptions;
    use serde_json::json;

    #[test]
    fn reads_mixed_numeric_stats() {
        let reply = doc! { "count": 12_i32, "size": 4096_i64, "storageSize": 8192.0, "nindexes": -1 };
        assert_eq!(number(&reply, "count"), 12);
        assert_eq!(number(&reply, "size"), 4096);
        assert_eq!(number(&reply, "storageSize"), 8192);
        assert_eq!(number(&reply, "nindexes"), 0);
        assert_eq!(number(&reply, "missing"), 0);
    }

    #[test]
    fn converts_index_models() {
        let model = IndexModel::builder()
            .keys(doc! { "email": 1, "createdAt": -1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .expire_after(Duration::from_secs(3600))
                    .partial_filter_expression(doc! { "active": true })
                    .build(),
            )
            .build();
        let index = index_from_model(model);
        assert_eq!(index.name, "email_1_createdAt_-1");
        assert_eq!(index.keys, json!({ "email": 1, "createdAt": -1 }));
        assert!(index.unique);
        assert!(!index.sparse);
        assert_eq!(index.ttl_seconds, Some(3600));
        assert_eq!(index.partial_filter, Some(json!({ "active": true })));
    }

    #[test]
    fn text_index_name_uses_kind() {
        assert_eq!(index_name(&doc! { "body": "text" }), "body_text");
    }

    #[tokio::test]
    async fn masked_uri_is_rejected() {
        let target = ClusterTarget {
            cluster_name: "c1".to_string(),
            uri: Secret::Masked,
        };
        let err = MongoInspector::default()
            .inspect(&CancellationToken::new(), &target)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn cancellation_wins_over_a_slow_call() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = bounded(&cancel, Duration::from_secs(5), "ping", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, mongodb::error::Error>(())
        })
        .await
        .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn slow_call_times_out_as_transient() {
        let err = bounded(
            &CancellationToken::new(),
            Duration::from_millis(10),
            "listDatabases",
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, mongodb::error::Error>(())
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(err.message().contains("listDatabases"));
    }
}
