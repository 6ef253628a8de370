//! `gratitude_messages` over the project's REST endpoint.

use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use gratitude_types::models::{MESSAGE_COLUMNS, MESSAGES_TABLE};
use gratitude_types::{MessageInsert, MessageRow, MessageUpdate};

use crate::client::Client;
use crate::error::{Error, Result};

/// Ask the server to echo affected rows back.
const RETURN_REPRESENTATION: &str = "return=representation";

pub struct MessagesTable {
    client: Client,
}

impl MessagesTable {
    pub(crate) fn new(client: Client) -> Self {
        Self { client }
    }

    /// Every message, newest first.
    pub async fn list(&self) -> Result<Vec<MessageRow>> {
        let url = self.list_url();
        let resp = self.authorized(self.client.http().get(url.clone())).send().await?;
        read_json(&url, resp).await
    }

    /// Insert one message and return the row as the server stored it.
    pub async fn insert(&self, message: &MessageInsert) -> Result<MessageRow> {
        let url = self.table_url();
        let resp = self
            .authorized(self.client.http().post(url.clone()))
            .header("Prefer", RETURN_REPRESENTATION)
            .json(message)
            .send()
            .await?;

        let rows: Vec<MessageRow> = read_json(&url, resp).await?;
        rows.into_iter().next().ok_or_else(|| Error::Rest {
            endpoint: url.path().to_string(),
            status: 200,
            body: "insert returned no row".into(),
        })
    }

    /// Apply `changes` to the row with `id`. Returns `None` if no such row exists.
    pub async fn update(&self, id: i64, changes: &MessageUpdate) -> Result<Option<MessageRow>> {
        let url = self.row_url(id);
        let resp = self
            .authorized(self.client.http().patch(url.clone()))
            .header("Prefer", RETURN_REPRESENTATION)
            .json(changes)
            .send()
            .await?;

        let rows: Vec<MessageRow> = read_json(&url, resp).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        let url = self.row_url(id);
        let resp = self.authorized(self.client.http().delete(url.clone())).send().await?;
        check_status(&url, resp).await?;
        Ok(())
    }

    fn table_url(&self) -> Url {
        self.client.config().rest_url(MESSAGES_TABLE)
    }

    fn list_url(&self) -> Url {
        let mut url = self.table_url();
        url.query_pairs_mut()
            .append_pair("select", &MESSAGE_COLUMNS.join(","))
            .append_pair("order", "created_at.desc");
        url
    }

    fn row_url(&self, id: i64) -> Url {
        let mut url = self.table_url();
        url.query_pairs_mut().append_pair("id", &format!("eq.{}", id));
        url
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", self.client.config().anon_key())
            .bearer_auth(self.client.bearer_token())
    }
}

async fn check_status(url: &Url, resp: Response) -> Result<Response> {
    let status = resp.status();
    debug!("{} -> {}", url.path(), status);
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    Err(Error::Rest {
        endpoint: url.path().to_string(),
        status: status.as_u16(),
        body,
    })
}

async fn read_json<T: DeserializeOwned>(url: &Url, resp: Response) -> Result<T> {
    let resp = check_status(url, resp).await?;
    let bytes = resp.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}
