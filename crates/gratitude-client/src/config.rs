use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

pub const URL_ENV: &str = "VITE_SUPABASE_URL";
pub const ANON_KEY_ENV: &str = "VITE_SUPABASE_ANON_KEY";

/// Phoenix channels protocol version spoken by the realtime endpoint.
pub const REALTIME_VSN: &str = "1.0.0";

const DEFAULT_EVENTS_PER_SECOND: u32 = 10;
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Options handed to the external auth collaborator. The client itself only
/// uses whatever access token it is given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOptions {
    /// Keep the auth session across restarts.
    pub persist_session: bool,
    /// Renew expiring credentials before they lapse.
    pub auto_refresh_token: bool,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            persist_session: true,
            auto_refresh_token: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeOptions {
    /// Upper bound on inbound notifications handed to consumers per second.
    /// Zero disables pacing.
    pub events_per_second: u32,
    pub heartbeat_interval: Duration,
    /// How long a channel join may stay unanswered before it counts as `TIMED_OUT`.
    pub join_timeout: Duration,
}

impl Default for RealtimeOptions {
    fn default() -> Self {
        Self {
            events_per_second: DEFAULT_EVENTS_PER_SECOND,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientOptions {
    pub auth: AuthOptions,
    pub realtime: RealtimeOptions,
}

/// Validated connection parameters for one Supabase project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    url: Url,
    anon_key: String,
    pub options: ClientOptions,
}

impl ClientConfig {
    /// Fails when either the URL or the key is blank, or the URL is not an
    /// http(s)/ws(s) URL. Performs no I/O.
    pub fn new(url: &str, anon_key: &str, options: ClientOptions) -> Result<Self> {
        let url = url.trim();
        let anon_key = anon_key.trim();
        if url.is_empty() {
            return Err(Error::MissingConfig("project url"));
        }
        if anon_key.is_empty() {
            return Err(Error::MissingConfig("anon key"));
        }

        let parsed = Url::parse(url)
            .map_err(|e| Error::InvalidConfig(format!("url '{}': {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https" | "ws" | "wss") {
            return Err(Error::InvalidConfig(format!(
                "url '{}': unsupported scheme '{}'",
                url,
                parsed.scheme()
            )));
        }

        Ok(Self {
            url: parsed,
            anon_key: anon_key.to_string(),
            options,
        })
    }

    /// Read `VITE_SUPABASE_URL` and `VITE_SUPABASE_ANON_KEY` from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`ClientConfig::from_env`] with a caller-supplied variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(Error::MissingConfig(name))
        };
        let url = present(URL_ENV)?;
        let anon_key = present(ANON_KEY_ENV)?;
        Self::new(&url, &anon_key, ClientOptions::default())
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }

    /// WebSocket endpoint of the realtime service, including the connection parameters.
    pub fn realtime_url(&self) -> Url {
        let mut ws = self.endpoint("realtime/v1/websocket");
        let scheme = match self.url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        // http <-> ws and https <-> wss are all "special" schemes, so this can't fail.
        let _ = ws.set_scheme(scheme);

        ws.query_pairs_mut()
            .append_pair("apikey", &self.anon_key)
            .append_pair(
                "eventsPerSecond",
                &self.options.realtime.events_per_second.to_string(),
            )
            .append_pair("vsn", REALTIME_VSN);
        ws
    }

    /// REST endpoint of one table.
    pub fn rest_url(&self, table: &str) -> Url {
        let mut rest = self.endpoint(&format!("rest/v1/{}", table));
        let scheme = match self.url.scheme() {
            "wss" | "https" => "https",
            _ => "http",
        };
        let _ = rest.set_scheme(scheme);
        rest
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.url.clone();
        let base = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{}/{}", base, path));
        url.set_query(None);
        url.set_fragment(None);
        url
    }
}
