//! PostgREST client
//!
//! Talks to a PostgREST-compatible REST endpoint (the `rest/v1` API of a
//! hosted Postgres backend). Rows are addressed as `/{table}?id=eq.{id}`.

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Client, RequestBuilder, Response,
};
use tracing::debug;
use url::Url;

use crate::error::RemoteError;
use crate::models::{Record, ID_FIELD, UPDATED_AT_FIELD};
use crate::remote::memory::format_timestamp;
use crate::remote::{RemoteDataService, SelectFilter};

const PREFER_REPRESENTATION: &str = "return=representation";

#[derive(Debug, Clone)]
pub struct PostgrestRemote {
    base: Url,
    client: Client,
}

impl PostgrestRemote {
    /// Creates a client for the REST root at `base`.
    ///
    /// `api_key`, when given, is sent both as the `apikey` header and as a
    /// bearer token.
    pub fn new(base: &Url, api_key: Option<&str>) -> Result<Self, RemoteError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        default_headers.insert("Accept", HeaderValue::from_static("application/json"));

        if let Some(key) = api_key {
            let apikey = HeaderValue::from_str(key)
                .map_err(|e| RemoteError::Network(format!("invalid api key: {}", e)))?;
            let bearer = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|e| RemoteError::Network(format!("invalid api key: {}", e)))?;
            default_headers.insert("apikey", apikey);
            default_headers.insert(AUTHORIZATION, bearer);
        }

        let client = Client::builder().default_headers(default_headers).build()?;

        Ok(Self {
            base: base.clone(),
            client,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// URL of a table endpoint. The table name is percent-encoded as a single segment.
    fn table_url(&self, table: &str) -> Result<Url, RemoteError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::Network(format!("invalid base url {}", self.base)))?
            .pop_if_empty()
            .push(table);
        Ok(url)
    }

    fn by_id(builder: RequestBuilder, id: &str) -> RequestBuilder {
        builder.query(&[(ID_FIELD, format!("eq.{}", id))])
    }

    async fn rows(response: Response) -> Result<Vec<Record>, RemoteError> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json::<Vec<Record>>().await?)
        } else {
            Err(RemoteError::Rejected {
                status: status.as_u16(),
                message: response.text().await?,
            })
        }
    }

    fn single(rows: Vec<Record>, table: &str, id: &str) -> Result<Record, RemoteError> {
        rows.into_iter().next().ok_or_else(|| RemoteError::NotFound {
            table: table.to_string(),
            id: id.to_string(),
        })
    }
}

#[async_trait]
impl RemoteDataService for PostgrestRemote {
    async fn insert(&self, table: &str, record: Record) -> Result<Record, RemoteError> {
        let url = self.table_url(table)?;
        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .header("Prefer", PREFER_REPRESENTATION)
            .json(&record)
            .send()
            .await?;

        Self::rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::Decode("insert returned no rows".to_string()))
    }

    async fn update(&self, table: &str, id: &str, patch: Record) -> Result<Record, RemoteError> {
        let url = self.table_url(table)?;
        debug!("PATCH {} id={}", url, id);
        let request = self
            .client
            .patch(url)
            .header("Prefer", PREFER_REPRESENTATION)
            .json(&patch);
        let response = Self::by_id(request, id).send().await?;

        Self::single(Self::rows(response).await?, table, id)
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), RemoteError> {
        let url = self.table_url(table)?;
        debug!("DELETE {} id={}", url, id);
        let request = self
            .client
            .delete(url)
            .header("Prefer", PREFER_REPRESENTATION);
        let response = Self::by_id(request, id).send().await?;

        Self::single(Self::rows(response).await?, table, id).map(|_| ())
    }

    async fn select(&self, table: &str, filter: &SelectFilter) -> Result<Vec<Record>, RemoteError> {
        let url = self.table_url(table)?;
        let mut query = vec![
            ("select".to_string(), "*".to_string()),
            ("order".to_string(), format!("{}.asc", UPDATED_AT_FIELD)),
        ];
        if let Some(since) = filter.updated_after {
            query.push((
                UPDATED_AT_FIELD.to_string(),
                format!("gt.{}", format_timestamp(since)),
            ));
        }

        debug!("GET {} {:?}", url, query);
        let response = self.client.get(url).query(&query).send().await?;
        Self::rows(response).await
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        let response = self.client.get(self.base.clone()).send().await?;
        if response.status().is_server_error() {
            Err(RemoteError::Rejected {
                status: response.status().as_u16(),
                message: "remote unavailable".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_url_appends_segment() {
        let base = Url::parse("https://db.example.com/rest/v1/").unwrap();
        let remote = PostgrestRemote::new(&base, Some("anon-key")).unwrap();

        assert_eq!(
            remote.table_url("incidents").unwrap().as_str(),
            "https://db.example.com/rest/v1/incidents"
        );
    }

    #[test]
    fn test_table_url_encodes_table_name() {
        let base = Url::parse("https://db.example.com/rest/v1").unwrap();
        let remote = PostgrestRemote::new(&base, None).unwrap();

        assert_eq!(
            remote.table_url("a/b").unwrap().as_str(),
            "https://db.example.com/rest/v1/a%2Fb"
        );
    }

    #[test]
    fn test_invalid_api_key_is_rejected() {
        let base = Url::parse("https://db.example.com/rest/v1").unwrap();
        assert!(PostgrestRemote::new(&base, Some("bad\nkey")).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let base = Url::parse("http://127.0.0.1:9/rest/v1").unwrap();
        let remote = PostgrestRemote::new(&base, None).unwrap();

        let result = remote.select("incidents", &SelectFilter::default()).await;
        assert!(matches!(result, Err(RemoteError::Network(_))));
    }
}
