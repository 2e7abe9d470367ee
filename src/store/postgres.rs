use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Object, Pool, PoolConfig, RecyclingMethod, Runtime};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use postgres_types::Json;
use serde_json::Value;
use tokio_postgres::Row;
use tracing::{error, info};

use super::{new_object_id, Document, DocumentStore, SortDirection, SortSpec, ID_FIELD};
use crate::config::DatabaseConfig;
use crate::error::{ApiError, ApiResult};

/// PostgreSQL 上に JSONB でドキュメントを保存するストア。
/// コレクションは `documents.collection` 列の値で区別し、本体は `body` 列に丸ごと入れる。
#[derive(Clone)]
pub struct PostgresStore {
    pool: Pool,
}

impl PostgresStore {
    /// プールを作り、疎通確認とテーブル作成まで済ませる。
    /// 失敗は `ApiError` で返し、呼び出し側 (`StorageClient::connect`) が「利用不可」として扱う。
    pub async fn connect(config: &DatabaseConfig) -> ApiResult<Self> {
        info!(
            "Creating PostgreSQL connection pool for {} (database: {})",
            config.redacted_url(),
            config.name
        );

        let pool = Self::create_pool(config)?;

        let store = PostgresStore { pool };
        store.test_connection().await?;
        store.migrate().await?;

        Ok(store)
    }

    /// 接続文字列をベースに、`DATABASE_NAME` でデータベース名だけ上書きする。
    fn create_pool(config: &DatabaseConfig) -> ApiResult<Pool> {
        let mut pg_config = Config::new();
        pg_config.url = Some(config.url.clone());
        pg_config.dbname = Some(config.name.clone());

        pg_config.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_config = PoolConfig::new(config.max_connections as usize);
        pool_config.timeouts.wait = Some(config.connection_timeout);
        pool_config.timeouts.create = Some(config.connection_timeout);
        pg_config.pool = Some(pool_config);

        let tls_connector = TlsConnector::builder()
            .build()
            .map_err(|e| {
                error!("Failed to create TLS connector: {}", e);
                ApiError::Storage(format!("TLS connector creation failed: {}", e))
            })?;
        let tls = MakeTlsConnector::new(tls_connector);

        pg_config.create_pool(Some(Runtime::Tokio1), tls)
            .map_err(|e| {
                error!("Failed to create connection pool: {}", e);
                ApiError::Storage(format!("Connection pool creation failed: {}", e))
            })
    }

    async fn get_connection(&self) -> ApiResult<Object> {
        self.pool.get().await.map_err(ApiError::from)
    }

    /// `SELECT 1` で起動時の疎通を確認する。
    pub async fn test_connection(&self) -> ApiResult<()> {
        let client = self.get_connection().await?;

        client.execute("SELECT 1", &[])
            .await
            .map_err(|e| {
                error!("Database connection test failed: {}", e);
                ApiError::Storage(format!("Connection test failed: {}", e))
            })?;

        info!("Database connection test successful");
        Ok(())
    }

    /// ドキュメント用テーブルとインデックスを用意する。何度実行しても安全。
    pub async fn migrate(&self) -> ApiResult<()> {
        info!("Bootstrapping documents table");

        let client = self.get_connection().await?;

        let documents_table = r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                collection TEXT NOT NULL,
                body JSONB NOT NULL,
                inserted_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        "#;

        client.execute(documents_table, &[])
            .await
            .map_err(|e| {
                error!("Failed to create documents table: {}", e);
                ApiError::Storage(format!("Documents table creation failed: {}", e))
            })?;

        let collection_index = "CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection, inserted_at)";
        client.execute(collection_index, &[])
            .await
            .map_err(|e| {
                error!("Failed to create documents collection index: {}", e);
                ApiError::Storage(format!("Documents collection index creation failed: {}", e))
            })?;

        let created_index = "CREATE INDEX IF NOT EXISTS idx_documents_created_at ON documents(collection, (body -> 'created_at') DESC)";
        client.execute(created_index, &[])
            .await
            .map_err(|e| {
                error!("Failed to create documents created_at index: {}", e);
                ApiError::Storage(format!("Documents created_at index creation failed: {}", e))
            })?;

        info!("Documents table ready");
        Ok(())
    }

    /// 行から `body` を取り出し、`id` 列を `_id` として差し込む。
    fn row_to_document(row: &Row) -> ApiResult<Document> {
        let id: String = row.try_get(0)?;
        let Json(mut body): Json<Document> = row.try_get(1)?;

        body.insert(ID_FIELD.to_string(), Value::String(id));
        Ok(body)
    }
}

/// `ORDER BY` 句。方向はプレースホルダにできないので固定文字列を選ぶ。
/// 欠損値は昇順で先頭、降順で末尾。
fn order_clause(sort: Option<&SortSpec>) -> &'static str {
    match sort.map(|s| s.direction) {
        Some(SortDirection::Ascending) => "ORDER BY body -> $3::text ASC NULLS FIRST, inserted_at ASC",
        Some(SortDirection::Descending) => "ORDER BY body -> $3::text DESC NULLS LAST, inserted_at DESC",
        None => "ORDER BY inserted_at ASC",
    }
}

#[async_trait]
impl DocumentStore for PostgresStore {
    async fn insert_document(&self, collection: &str, mut document: Document) -> ApiResult<String> {
        let id = new_object_id();
        document.remove(ID_FIELD);

        let client = self.get_connection().await?;

        let query = "INSERT INTO documents (id, collection, body) VALUES ($1, $2, $3)";
        client.execute(query, &[&id, &collection, &Json(&document)])
            .await
            .map_err(ApiError::from)?;

        info!("Inserted document {} into collection '{}'", id, collection);
        Ok(id)
    }

    async fn find_one(&self, collection: &str, id: &str) -> ApiResult<Option<Document>> {
        let client = self.get_connection().await?;
        let query = "SELECT id, body FROM documents WHERE collection = $1 AND id = $2";

        let row = client.query_opt(query, &[&collection, &id])
            .await
            .map_err(ApiError::from)?;

        row.as_ref().map(Self::row_to_document).transpose()
    }

    /// 等値フィルタは JSONB の包含演算子 `@>` で表現する。
    /// `LIMIT NULL` は PostgreSQL では無制限と同じ意味になる。
    async fn find_many(
        &self,
        collection: &str,
        filter: &Document,
        sort: Option<&SortSpec>,
        limit: Option<u64>,
    ) -> ApiResult<Vec<Document>> {
        let client = self.get_connection().await?;

        let filter = Json(filter);
        let limit: Option<i64> = limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX));

        let rows = match sort {
            Some(spec) => {
                let query = format!(
                    "SELECT id, body FROM documents WHERE collection = $1 AND body @> $2::jsonb {} LIMIT $4::bigint",
                    order_clause(sort)
                );
                client.query(&query, &[&collection, &filter, &spec.field, &limit]).await
            }
            None => {
                let query = format!(
                    "SELECT id, body FROM documents WHERE collection = $1 AND body @> $2::jsonb {} LIMIT $3::bigint",
                    order_clause(None)
                );
                client.query(&query, &[&collection, &filter, &limit]).await
            }
        }
        .map_err(ApiError::from)?;

        rows.iter().map(Self::row_to_document).collect()
    }

    async fn list_collection_names(&self) -> ApiResult<Vec<String>> {
        let client = self.get_connection().await?;
        let query = "SELECT DISTINCT collection FROM documents ORDER BY collection";

        let rows = client.query(query, &[])
            .await
            .map_err(ApiError::from)?;

        Ok(rows.iter().map(|row| row.get(0)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{StorageClient, CREATED_AT_FIELD};
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_order_clause_direction() {
        assert!(order_clause(Some(&SortSpec::descending("created_at"))).contains("DESC NULLS LAST"));
        assert!(order_clause(Some(&SortSpec::ascending("created_at"))).contains("ASC NULLS FIRST"));
        assert_eq!(order_clause(None), "ORDER BY inserted_at ASC");
    }

    #[test]
    fn test_order_clause_never_embeds_field_name() {
        let hostile = SortSpec::descending("created_at; DROP TABLE documents");
        assert!(!order_clause(Some(&hostile)).contains("DROP"));
    }

    // 以下は実際の PostgreSQL が必要。
    // TEST_DATABASE_URL / TEST_DATABASE_NAME を設定して `cargo test -- --ignored` で実行する。

    fn test_database_config() -> DatabaseConfig {
        let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
        let name = std::env::var("TEST_DATABASE_NAME").expect("TEST_DATABASE_NAME must be set");

        DatabaseConfig {
            url,
            name,
            max_connections: 2,
            connection_timeout: Duration::from_secs(5),
        }
    }

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("test documents must be objects"),
        }
    }

    async fn delete_collection(store: &PostgresStore, collection: &str) {
        let client = store.get_connection().await.unwrap();
        client
            .execute("DELETE FROM documents WHERE collection = $1", &[&collection])
            .await
            .unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_connect_uses_configured_database_name() {
        let config = test_database_config();
        let store = PostgresStore::connect(&config).await.unwrap();

        let client = store.get_connection().await.unwrap();
        let row = client.query_one("SELECT current_database()", &[]).await.unwrap();
        let current: String = row.get(0);

        assert_eq!(current, config.name);
    }

    #[tokio::test]
    #[ignore]
    async fn test_documents_round_trip_through_postgres() {
        let store = PostgresStore::connect(&test_database_config()).await.unwrap();
        let collection = format!("test_{}", new_object_id());

        let older = store
            .insert_document(&collection, doc(json!({"kind": "note", "created_at": "2024-01-01T09:00:00.000000Z"})))
            .await
            .unwrap();
        let newer = store
            .insert_document(&collection, doc(json!({"kind": "note", "created_at": "2024-01-02T09:00:00.000000Z"})))
            .await
            .unwrap();
        let undated = store
            .insert_document(&collection, doc(json!({"kind": "note"})))
            .await
            .unwrap();
        store
            .insert_document(&collection, doc(json!({"kind": "other", "created_at": "2024-01-03T09:00:00.000000Z"})))
            .await
            .unwrap();

        let found = store.find_one(&collection, &newer).await.unwrap().unwrap();
        assert_eq!(found[ID_FIELD], json!(newer));
        assert_eq!(found["kind"], json!("note"));
        assert!(store.find_one(&collection, "000000000000000000000000").await.unwrap().is_none());

        // `@>` filter, missing sort field last when descending, `LIMIT NULL` returns everything
        let notes = doc(json!({"kind": "note"}));
        let sort = SortSpec::descending(CREATED_AT_FIELD);
        let listed = store.find_many(&collection, &notes, Some(&sort), None).await.unwrap();
        let ids: Vec<&Value> = listed.iter().map(|d| &d[ID_FIELD]).collect();
        assert_eq!(ids, vec![&json!(newer), &json!(older), &json!(undated)]);

        let limited = store.find_many(&collection, &notes, Some(&sort), Some(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0][ID_FIELD], json!(newer));

        let everything = store.find_many(&collection, &Document::new(), None, None).await.unwrap();
        assert_eq!(everything.len(), 4);

        let names = store.list_collection_names().await.unwrap();
        assert!(names.contains(&collection));

        delete_collection(&store, &collection).await;
        assert!(!store.list_collection_names().await.unwrap().contains(&collection));
    }

    #[tokio::test]
    #[ignore]
    async fn test_router_against_postgres() {
        use crate::routes::create_router;
        use axum::body::{to_bytes, Body};
        use axum::http::{header, Method, Request, StatusCode};
        use std::sync::Arc;
        use tower::ServiceExt;

        let config = test_database_config();
        let store = PostgresStore::connect(&config).await.unwrap();
        let app = create_router(
            StorageClient::with_store(Arc::new(store.clone()), config.name.clone()),
            Duration::from_secs(30),
        );

        let request = Request::builder()
            .method(Method::POST)
            .uri("/wishes")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"name":"  Alice ","message":" Happy birthday! "}"#))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let created: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(created["name"], "Alice");
        assert_eq!(created["message"], "Happy birthday!");
        assert!(created["created_at"].is_string());

        let request = Request::builder().uri("/wishes?limit=1").body(Body::empty()).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let listed: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(listed[0]["id"], created["id"]);

        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let report: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(report["connection_status"], "ok");
        assert_eq!(report["database_name"], json!(config.name));

        let client = store.get_connection().await.unwrap();
        let id = created["id"].as_str().unwrap();
        client
            .execute("DELETE FROM documents WHERE id = $1", &[&id])
            .await
            .unwrap();
    }
}
