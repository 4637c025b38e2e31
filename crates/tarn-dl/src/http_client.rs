use std::{
    sync::{LazyLock, RwLock},
    time::Duration,
};

use ureq::{
    http::{self, Uri},
    typestate::WithoutBody,
    Agent, Proxy, RequestBuilder,
};

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub user_agent: Option<String>,
    pub proxy: Option<Proxy>,
    /// Upper bound for any single request. Per-request deadlines may be shorter.
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: Some(format!("tarn/{}", env!("CARGO_PKG_VERSION"))),
            proxy: None,
            timeout: None,
        }
    }
}

impl ClientConfig {
    /// Builds an [`Agent`] from this configuration.
    ///
    /// Non-2xx responses surface as `ureq::Error::StatusCode`, which
    /// [`FetchError::from_ureq`](crate::error::FetchError::from_ureq) relies on.
    pub fn build(&self) -> Agent {
        let mut config = ureq::Agent::config_builder()
            .proxy(self.proxy.clone())
            .timeout_global(self.timeout)
            .http_status_as_error(true);

        if let Some(user_agent) = &self.user_agent {
            config = config.user_agent(user_agent);
        }

        config.build().into()
    }
}

struct SharedClient {
    agent: Agent,
    config: ClientConfig,
}

static SHARED_CLIENT_STATE: LazyLock<RwLock<SharedClient>> = LazyLock::new(|| {
    let config = ClientConfig::default();
    let agent = config.build();

    RwLock::new(SharedClient {
        agent,
        config,
    })
});

/// Handle to the process-wide agent, so connection pools are shared.
#[derive(Clone, Default)]
pub struct SharedAgent;

impl SharedAgent {
    pub fn new() -> Self {
        Self
    }

    /// Creates a GET request builder on the shared agent.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tarn_dl::http_client::SHARED_AGENT;
    ///
    /// let response = SHARED_AGENT.get("https://registry.npmjs.org/left-pad").call();
    /// ```
    pub fn get<T>(&self, uri: T) -> RequestBuilder<WithoutBody>
    where
        Uri: TryFrom<T>,
        <Uri as TryFrom<T>>::Error: Into<http::Error>,
    {
        let state = SHARED_CLIENT_STATE.read().unwrap();
        state.agent.get(uri)
    }

    pub fn config(&self) -> ClientConfig {
        SHARED_CLIENT_STATE.read().unwrap().config.clone()
    }
}

pub static SHARED_AGENT: LazyLock<SharedAgent> = LazyLock::new(SharedAgent::new);

/// Rebuilds the shared agent after applying `updater` to its configuration.
///
/// # Examples
///
/// ```
/// use tarn_dl::http_client::configure_http_client;
///
/// configure_http_client(|cfg| {
///     cfg.user_agent = Some("tarn-test/1.0".to_string());
/// });
/// ```
pub fn configure_http_client<F>(updater: F)
where
    F: FnOnce(&mut ClientConfig),
{
    let mut state = SHARED_CLIENT_STATE.write().unwrap();
    let mut new_config = state.config.clone();
    updater(&mut new_config);
    state.agent = new_config.build();
    state.config = new_config;
}
