use std::{
    collections::HashMap,
    fmt,
};

use async_trait::async_trait;
use reqwest::{
    header::AUTHORIZATION,
    Client,
    Method,
    RequestBuilder,
};
use serde::{
    de::DeserializeOwned,
    Deserialize,
    Serialize,
};
use serde_json::{
    json,
    Value,
};
use tracing::{
    debug,
    info,
    warn,
};

use super::CardStore;
use crate::core::{
    http,
    models::{
        CardRecord,
        ImportHistory,
        ImportKind,
        ImportMetadata,
        StatsUpdate,
        SyncSummary,
    },
    ImportError,
};

pub const DEFAULT_UPLOAD_FILENAME: &str = "deck.apkg";

const CARDS_PER_PAGE: u32 = 500;

/// The backend's view of a stored card. Only the ids are needed here.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteCard {
    pub id: i64,
    pub nid: i64,
}

#[derive(Debug, Deserialize)]
struct CardPage {
    #[serde(default)]
    cards: Vec<RemoteCard>,
    #[serde(default = "single_page")]
    pages: u32,
}

fn single_page() -> u32 {
    1
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Preferences {
    #[serde(skip_serializing_if = "Option::is_none")]
    last_full_import: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_anki_sync: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_cards: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    WordAudio,
    SentenceAudio,
    Image,
}

impl MediaKind {
    fn path(&self) -> &'static str {
        match self {
            MediaKind::WordAudio => "audio/word",
            MediaKind::SentenceAudio => "audio/sentence",
            MediaKind::Image => "image",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::WordAudio => write!(f, "word audio"),
            MediaKind::SentenceAudio => write!(f, "sentence audio"),
            MediaKind::Image => write!(f, "card image"),
        }
    }
}

/// Card store backed by the study app's HTTP API.
pub struct RestStore {
    client: Client,
    base_url: String,
    token: Option<String>,
    upload_filename: String,
}

impl RestStore {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, ImportError> {
        Ok(Self {
            client: http::http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            upload_filename: DEFAULT_UPLOAD_FILENAME.to_string(),
        })
    }

    pub fn with_upload_filename(mut self, filename: &str) -> Self {
        self.upload_filename = filename.to_string();
        self
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        let builder = self.client.request(method, format!("{}{}", self.base_url, endpoint));
        match &self.token {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder, endpoint: &str) -> Result<T, ImportError> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = error_message(&body);
            warn!("API error [{}]: {} ({})", endpoint, message, status);
            return Err(ImportError::Persistence(message));
        }

        let body = if body.trim().is_empty() { "null" } else { body.as_str() };
        Ok(serde_json::from_str(body)?)
    }

    /// Every card on the backend, fetched page by page.
    pub async fn list_cards(&self) -> Result<Vec<RemoteCard>, ImportError> {
        let mut cards = Vec::new();
        let mut page = 1;

        loop {
            let endpoint = format!("/cards?page={}&per_page={}", page, CARDS_PER_PAGE);
            let response: CardPage = self.send(self.request(Method::GET, &endpoint), &endpoint).await?;
            cards.extend(response.cards);
            if page >= response.pages {
                break;
            }
            page += 1;
        }

        debug!("Fetched {} cards in {} pages", cards.len(), page);
        Ok(cards)
    }

    /// Raw media for a card, addressed by the backend's card id.
    pub async fn fetch_media(&self, card_id: i64, kind: MediaKind) -> Result<Vec<u8>, ImportError> {
        let response = self
            .request(Method::GET, &format!("/cards/{}/{}", card_id, kind.path()))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ImportError::Persistence(format!("Failed to fetch {}", kind)));
        }
        Ok(response.bytes().await?.to_vec())
    }

    /// Server-side import log, passed through as-is.
    pub async fn import_log(&self) -> Result<Value, ImportError> {
        self.send(self.request(Method::GET, "/imports"), "/imports").await
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            ["error", "message"]
                .iter()
                .find_map(|key| value.get(key).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| "API request failed".to_string())
}

#[async_trait]
impl CardStore for RestStore {
    async fn save_cards(&mut self, batch: &[CardRecord]) -> Result<(), ImportError> {
        let body = json!({ "cards": batch, "filename": self.upload_filename });
        let _: Value = self.send(self.request(Method::POST, "/cards/bulk").json(&body), "/cards/bulk").await?;
        debug!("Uploaded {} cards", batch.len());
        Ok(())
    }

    async fn record_import(&mut self, metadata: &ImportMetadata) -> Result<(), ImportError> {
        let preferences = match metadata.kind {
            ImportKind::FullImport => Preferences {
                last_full_import: Some(metadata.completed_at),
                total_cards: Some(metadata.total_cards),
                ..Default::default()
            },
            ImportKind::StatsSync => {
                Preferences { last_anki_sync: Some(metadata.completed_at), ..Default::default() }
            }
        };
        let _: Value = self
            .send(self.request(Method::PUT, "/user/preferences").json(&preferences), "/user/preferences")
            .await?;
        Ok(())
    }

    async fn apply_stats(&mut self, updates: &[StatsUpdate]) -> Result<SyncSummary, ImportError> {
        let ids: HashMap<i64, i64> = self.list_cards().await?.into_iter().map(|c| (c.nid, c.id)).collect();
        let mut summary = SyncSummary::default();

        for update in updates {
            let Some(id) = ids.get(&update.nid) else {
                debug!("Note {} not on backend, skipping stats", update.nid);
                summary.missing += 1;
                continue;
            };
            let endpoint = format!("/cards/{}", id);
            let _: Value = self.send(self.request(Method::PUT, &endpoint).json(update), &endpoint).await?;
            summary.updated += 1;
        }

        info!("Updated stats for {} cards, {} not on backend", summary.updated, summary.missing);
        Ok(summary)
    }

    async fn import_history(&mut self) -> Result<ImportHistory, ImportError> {
        let value: Value =
            self.send(self.request(Method::GET, "/user/preferences"), "/user/preferences").await?;
        let preferences = value.get("preferences").unwrap_or(&value);
        let preferences: Preferences = serde_json::from_value(preferences.clone()).unwrap_or_default();

        Ok(ImportHistory {
            last_full_import: preferences.last_full_import,
            last_anki_sync: preferences.last_anki_sync,
            total_cards: preferences.total_cards,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        Mutex,
    };

    use tokio::{
        io::{
            AsyncReadExt,
            AsyncWriteExt,
        },
        net::TcpListener,
    };

    use super::*;
    use crate::test_support::card_record;

    type Requests = Arc<Mutex<Vec<String>>>;

    /// Answers each incoming request with the next canned `(status, body)`
    /// and records the raw requests.
    async fn serve(responses: Vec<(u16, &'static str)>) -> (String, Requests) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests: Requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let request = read_request(&mut socket).await;
                seen.lock().unwrap().push(request);

                let response = format!(
                    "HTTP/1.1 {} Status\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
        });

        (base_url, requests)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            buffer.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buffer).to_string();
            if let Some(head_end) = text.find("\r\n\r\n") {
                let content_length = text[..head_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length").then(|| value.trim().parse().ok())?
                    })
                    .unwrap_or(0usize);
                if buffer.len() >= head_end + 4 + content_length {
                    return text;
                }
            }
            if n == 0 {
                return String::from_utf8_lossy(&buffer).to_string();
            }
        }
    }

    fn stats(nid: i64) -> StatsUpdate {
        StatsUpdate { nid, due: Some(10), interval: 3, ease_factor: 2.5, reps: 4, lapses: 0, reviews: Vec::new() }
    }

    #[tokio::test]
    async fn test_bulk_upload_sends_cards_and_token() {
        let (base_url, requests) = serve(vec![(200, r#"{"imported": 1}"#)]).await;
        let mut store = RestStore::new(&format!("{}/", base_url), Some("tok".to_string()))
            .unwrap()
            .with_upload_filename("core2k.apkg");

        store.save_cards(&[card_record(500, "犬")]).await.unwrap();

        let requests = requests.lock().unwrap();
        let request = &requests[0];
        assert!(request.starts_with("POST /cards/bulk HTTP/1.1"));
        assert!(request.to_lowercase().contains("authorization: bearer tok"));
        assert!(request.contains(r#""filename":"core2k.apkg""#));
        assert!(request.contains(r#""nid":500"#));
    }

    #[tokio::test]
    async fn test_error_body_becomes_message() {
        let (base_url, _) = serve(vec![
            (401, r#"{"error": "Token has expired"}"#),
            (500, r#"{"message": "Database unavailable"}"#),
            (502, "<html>Bad Gateway</html>"),
        ])
        .await;
        let mut store = RestStore::new(&base_url, None).unwrap();

        for expected in ["Token has expired", "Database unavailable", "API request failed"] {
            match store.save_cards(&[card_record(1, "a")]).await {
                Err(ImportError::Persistence(msg)) => assert_eq!(msg, expected),
                other => panic!("Expected Persistence error, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_stats_sync_pages_and_skips_unknown() {
        let (base_url, requests) = serve(vec![
            (200, r#"{"cards": [{"id": 11, "nid": 500, "word": "犬"}], "pages": 2}"#),
            (200, r#"{"cards": [{"id": 12, "nid": 501}], "pages": 2}"#),
            (200, r#"{"id": 11}"#),
        ])
        .await;
        let mut store = RestStore::new(&base_url, None).unwrap();

        let summary = store.apply_stats(&[stats(500), stats(999)]).await.unwrap();

        assert_eq!(summary, SyncSummary { updated: 1, missing: 1 });
        let requests = requests.lock().unwrap();
        assert!(requests[0].starts_with("GET /cards?page=1&per_page=500 "));
        assert!(requests[1].starts_with("GET /cards?page=2&per_page=500 "));
        assert!(requests[2].starts_with("PUT /cards/11 "));
        assert!(requests[2].contains(r#""reps":4"#));
    }

    #[tokio::test]
    async fn test_metadata_round_trips_through_preferences() {
        let (base_url, requests) = serve(vec![
            (200, "{}"),
            (200, r#"{"preferences": {"lastFullImport": 1700000000000, "totalCards": 2, "theme": "dark"}}"#),
        ])
        .await;
        let mut store = RestStore::new(&base_url, None).unwrap();

        store
            .record_import(&ImportMetadata {
                run_id: uuid::Uuid::new_v4(),
                kind: ImportKind::FullImport,
                completed_at: 1_700_000_000_000,
                total_cards: 2,
            })
            .await
            .unwrap();
        let history = store.import_history().await.unwrap();

        assert_eq!(history.last_full_import, Some(1_700_000_000_000));
        assert_eq!(history.total_cards, Some(2));
        assert_eq!(history.last_anki_sync, None);
        let requests = requests.lock().unwrap();
        assert!(requests[0].starts_with("PUT /user/preferences "));
        assert!(requests[0].contains(r#""lastFullImport":1700000000000"#));
        assert!(!requests[0].contains("lastAnkiSync"));
    }

    #[tokio::test]
    async fn test_fetch_media() {
        let (base_url, requests) = serve(vec![(200, "ID3-bytes"), (404, "")]).await;
        let store = RestStore::new(&base_url, None).unwrap();

        let bytes = store.fetch_media(11, MediaKind::SentenceAudio).await.unwrap();
        assert_eq!(bytes, b"ID3-bytes".to_vec());
        assert!(requests.lock().unwrap()[0].starts_with("GET /cards/11/audio/sentence "));

        match store.fetch_media(11, MediaKind::Image).await {
            Err(ImportError::Persistence(msg)) => assert_eq!(msg, "Failed to fetch card image"),
            other => panic!("Expected Persistence error, got {:?}", other),
        }
    }

    #[test]
    fn test_error_message_prefers_error_field() {
        assert_eq!(error_message(r#"{"error": "a", "message": "b"}"#), "a");
        assert_eq!(error_message(r#"{"message": "b"}"#), "b");
        assert_eq!(error_message(""), "API request failed");
    }
}
