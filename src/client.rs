//! Typed oxd command client
//!
//! [`Client`] wraps a [`Messenger`] with one method per oxd command. Each
//! method builds the command's parameters from its arguments and the site
//! configuration, sends it, and turns `status: "error"` responses into the
//! typed application errors of [`OxdError`].
//!
//! The client remembers the site's `oxd_id` (and client credentials from
//! `setup_client`) in memory only. Persisting them is up to the caller.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::{Config, SiteConfig};
use crate::error::{OxdError, Result};
use crate::messenger::Messenger;
use crate::protocol::{commands, Response, ResponseStatus};
use crate::resource::ResourceSet;

/// Parameters of `uma_rp_get_rpt`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RptRequest {
    /// Permission ticket returned by the resource server
    pub ticket: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Claim token pushed to the authorization server
    pub claim_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Format of `claim_token`
    pub claim_token_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Persisted claims token from an earlier exchange
    pub pct: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Existing RPT to upgrade
    pub rpt: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    /// Requested scopes
    pub scope: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// State returned by claims gathering
    pub state: Option<String>,
}

impl RptRequest {
    /// Request an RPT for `ticket` with no other parameters.
    pub fn new(ticket: impl Into<String>) -> Self {
        Self {
            ticket: ticket.into(),
            ..Self::default()
        }
    }
}

/// Typed client for the oxd command set.
///
/// # Examples
///
/// ```no_run
/// use oxd_messenger::{Client, Config};
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let config = Config::load("config/oxd.yaml")?;
/// let mut client = Client::from_config(&config)?;
///
/// let oxd_id = client.register_site().await?;
/// let url = client.get_authorization_url(&[], None, None).await?;
/// println!("site {} -> {}", oxd_id, url);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Client {
    messenger: Messenger,
    site: SiteConfig,
    oxd_id: Option<String>,
}

impl Client {
    /// Create a client from a messenger and site settings.
    pub fn new(messenger: Messenger, site: SiteConfig) -> Self {
        let oxd_id = site.oxd_id.clone().filter(|id| !id.is_empty());
        if let Some(id) = &oxd_id {
            tracing::info!("Site already registered with oxd id {}", id);
        }

        Self {
            messenger,
            site,
            oxd_id,
        }
    }

    /// Create a socket-backed client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`OxdError::Config`] if the configuration does not validate.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            Messenger::from_config(config)?,
            config.client.clone(),
        ))
    }

    /// The registered site id, if known.
    pub fn oxd_id(&self) -> Option<&str> {
        self.oxd_id.as_deref()
    }

    /// Current site settings, including credentials learned from `setup_client`.
    pub fn site(&self) -> &SiteConfig {
        &self.site
    }

    /// The messenger carrying this client's requests.
    pub fn messenger(&self) -> &Messenger {
        &self.messenger
    }

    /// Mutable access to the messenger, e.g. to replace the access token.
    pub fn messenger_mut(&mut self) -> &mut Messenger {
        &mut self.messenger
    }

    /// Send `ping`.
    pub async fn ping(&mut self) -> Result<Value> {
        self.command(commands::PING, Map::new()).await
    }

    /// Register the site and obtain client credentials in one step.
    ///
    /// Stores the returned `oxd_id`, `client_id`, and `client_secret`.
    pub async fn setup_client(&mut self) -> Result<Value> {
        let params = self.registration_params(true)?;
        let data = self.command(commands::SETUP_CLIENT, params).await?;

        self.oxd_id = Some(string_field(&data, "oxd_id")?);
        self.site.client_id = optional_string_field(&data, "client_id");
        self.site.client_secret = optional_string_field(&data, "client_secret");
        tracing::info!(
            "Client setup complete, oxd id {}",
            self.oxd_id.as_deref().unwrap_or_default()
        );

        Ok(data)
    }

    /// Obtain a protection access token with the client credentials.
    ///
    /// With `auto_update` the returned `access_token` is held by the
    /// messenger and attached to all later requests.
    pub async fn get_client_token(&mut self, auto_update: bool) -> Result<Value> {
        let mut params = Map::new();
        params.insert("client_id".into(), self.required(&self.site.client_id, "client_id")?);
        params.insert(
            "client_secret".into(),
            self.required(&self.site.client_secret, "client_secret")?,
        );
        params.insert("op_host".into(), self.required(&self.site.op_host, "op_host")?);
        insert_list(&mut params, "scope", &self.site.scope);

        let data = self.command(commands::GET_CLIENT_TOKEN, params).await?;

        if auto_update {
            self.messenger.set_access_token_value(&data["access_token"])?;
            tracing::debug!("Protection access token updated");
        }

        Ok(data)
    }

    /// Register the site with the OpenID Provider and return its oxd id.
    ///
    /// Does nothing if the id is already known.
    pub async fn register_site(&mut self) -> Result<String> {
        if let Some(id) = &self.oxd_id {
            tracing::info!("Site already registered, oxd id {}", id);
            return Ok(id.clone());
        }

        let params = self.registration_params(true)?;
        let data = self.command(commands::REGISTER_SITE, params).await?;
        let id = string_field(&data, "oxd_id")?;

        tracing::info!("Site registration successful, oxd id {}", id);
        self.oxd_id = Some(id.clone());
        Ok(id)
    }

    /// Push the current site settings to the OP.
    ///
    /// Returns `false` when the server refuses the update.
    pub async fn update_site(&mut self) -> Result<bool> {
        let mut params = self.registration_params(false)?;
        params.insert("oxd_id".into(), Value::String(self.require_oxd_id()?));

        let response = self.messenger.request(commands::UPDATE_SITE, params).await?;
        let response = Response::from_value(response)?;

        match response.status {
            ResponseStatus::Ok => Ok(true),
            ResponseStatus::Error => {
                let data = response.error_data().unwrap_or_default();
                tracing::warn!(
                    "Site update refused: {}: {}",
                    data.error,
                    data.error_description
                );
                Ok(false)
            }
        }
    }

    /// Remove the site from oxd and forget its id.
    pub async fn remove_site(&mut self) -> Result<String> {
        let mut params = Map::new();
        params.insert("oxd_id".into(), Value::String(self.require_oxd_id()?));

        let data = self.command(commands::REMOVE_SITE, params).await?;
        let removed = string_field(&data, "oxd_id")?;
        self.oxd_id = None;
        Ok(removed)
    }

    /// URL to send the user to for authentication.
    ///
    /// Registers the site first if needed. `acr_values` is sent only when
    /// non-empty.
    pub async fn get_authorization_url(
        &mut self,
        acr_values: &[String],
        prompt: Option<&str>,
        custom_params: Option<Map<String, Value>>,
    ) -> Result<String> {
        let oxd_id = self.register_site().await?;

        let mut params = Map::new();
        params.insert("oxd_id".into(), Value::String(oxd_id));
        insert_list(&mut params, "acr_values", acr_values);
        insert_opt(&mut params, "prompt", prompt);
        if let Some(custom) = custom_params.filter(|c| !c.is_empty()) {
            params.insert("custom_parameters".into(), Value::Object(custom));
        }

        let data = self.command(commands::GET_AUTHORIZATION_URL, params).await?;
        string_field(&data, "authorization_url")
    }

    /// Exchange the authorization callback's `code` and `state` for tokens.
    pub async fn get_tokens_by_code(&mut self, code: &str, state: &str) -> Result<Value> {
        if code.is_empty() || state.is_empty() {
            return Err(OxdError::Config(
                "get_tokens_by_code needs a non-empty code and state".to_string(),
            )
            .into());
        }

        let mut params = Map::new();
        params.insert("oxd_id".into(), Value::String(self.require_oxd_id()?));
        params.insert("code".into(), Value::String(code.to_string()));
        params.insert("state".into(), Value::String(state.to_string()));

        self.command(commands::GET_TOKENS_BY_CODE, params).await
    }

    /// Obtain a fresh access token with a refresh token.
    pub async fn get_access_token_by_refresh_token(
        &mut self,
        refresh_token: &str,
        scope: &[String],
    ) -> Result<Value> {
        if refresh_token.is_empty() {
            return Err(OxdError::Config("refresh token is empty".to_string()).into());
        }

        let mut params = Map::new();
        params.insert("oxd_id".into(), Value::String(self.require_oxd_id()?));
        params.insert(
            "refresh_token".into(),
            Value::String(refresh_token.to_string()),
        );
        insert_list(&mut params, "scope", scope);

        self.command(commands::GET_ACCESS_TOKEN_BY_REFRESH_TOKEN, params)
            .await
    }

    /// The user's claims as returned by the OP.
    pub async fn get_user_info(&mut self, access_token: &str) -> Result<Value> {
        if access_token.is_empty() {
            return Err(OxdError::Config("access token is empty".to_string()).into());
        }

        let mut params = Map::new();
        params.insert("oxd_id".into(), Value::String(self.require_oxd_id()?));
        params.insert(
            "access_token".into(),
            Value::String(access_token.to_string()),
        );

        let data = self.command(commands::GET_USER_INFO, params).await?;
        Ok(data.get("claims").cloned().unwrap_or(Value::Null))
    }

    /// URI to send the user to for logout.
    ///
    /// Without an explicit `post_logout_redirect_uri` the configured one is used.
    pub async fn get_logout_uri(
        &mut self,
        id_token_hint: Option<&str>,
        post_logout_redirect_uri: Option<&str>,
        state: Option<&str>,
        session_state: Option<&str>,
    ) -> Result<String> {
        let redirect = post_logout_redirect_uri
            .map(str::to_string)
            .or_else(|| self.site.post_logout_redirect_uri.clone());

        let mut params = Map::new();
        params.insert("oxd_id".into(), Value::String(self.require_oxd_id()?));
        insert_opt(&mut params, "id_token_hint", id_token_hint);
        insert_opt(&mut params, "post_logout_redirect_uri", redirect.as_deref());
        insert_opt(&mut params, "state", state);
        insert_opt(&mut params, "session_state", session_state);

        let data = self.command(commands::GET_LOGOUT_URI, params).await?;
        string_field(&data, "uri")
    }

    /// Protect `resources` on the resource server side.
    pub async fn uma_rs_protect(&mut self, resources: &ResourceSet, overwrite: bool) -> Result<bool> {
        let mut params = Map::new();
        params.insert("oxd_id".into(), Value::String(self.require_oxd_id()?));
        params.insert(
            "resources".into(),
            serde_json::to_value(resources).map_err(OxdError::Serialization)?,
        );
        if overwrite {
            params.insert("overwrite".into(), Value::Bool(true));
        }

        self.command(commands::UMA_RS_PROTECT, params).await?;
        Ok(true)
    }

    /// Ask whether `rpt` grants `http_method` on `path`.
    ///
    /// Returns the decision data (`access`, and `ticket` when denied).
    /// Checking a path that was never protected fails with
    /// [`OxdError::InvalidRequest`].
    pub async fn uma_rs_check_access(
        &mut self,
        rpt: Option<&str>,
        path: &str,
        http_method: &str,
    ) -> Result<Value> {
        let mut params = Map::new();
        params.insert("oxd_id".into(), Value::String(self.require_oxd_id()?));
        params.insert(
            "rpt".into(),
            rpt.map_or(Value::Null, |r| Value::String(r.to_string())),
        );
        params.insert("path".into(), Value::String(path.to_string()));
        params.insert("http_method".into(), Value::String(http_method.to_string()));

        self.command(commands::UMA_RS_CHECK_ACCESS, params).await
    }

    /// Obtain a requesting party token for a permission ticket.
    ///
    /// Fails with [`OxdError::NeedInfo`] when claims must be gathered first
    /// and [`OxdError::InvalidTicket`] when the ticket is not accepted.
    pub async fn uma_rp_get_rpt(&mut self, request: &RptRequest) -> Result<Value> {
        let mut params = match serde_json::to_value(request).map_err(OxdError::Serialization)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        params.insert("oxd_id".into(), Value::String(self.require_oxd_id()?));

        self.command(commands::UMA_RP_GET_RPT, params).await
    }

    /// URL where the requesting party supplies claims for `ticket`.
    pub async fn uma_rp_get_claims_gathering_url(&mut self, ticket: &str) -> Result<String> {
        let mut params = Map::new();
        params.insert("oxd_id".into(), Value::String(self.require_oxd_id()?));
        params.insert("ticket".into(), Value::String(ticket.to_string()));
        insert_opt(
            &mut params,
            "claims_redirect_uri",
            self.site.authorization_redirect_uri.as_deref(),
        );

        let data = self
            .command(commands::UMA_RP_GET_CLAIMS_GATHERING_URL, params)
            .await?;
        string_field(&data, "url")
    }

    /// Token introspection for an access token.
    pub async fn introspect_access_token(&mut self, access_token: &str) -> Result<Value> {
        let mut params = Map::new();
        params.insert("oxd_id".into(), Value::String(self.require_oxd_id()?));
        params.insert(
            "access_token".into(),
            Value::String(access_token.to_string()),
        );

        self.command(commands::INTROSPECT_ACCESS_TOKEN, params).await
    }

    /// Token introspection for an RPT.
    pub async fn introspect_rpt(&mut self, rpt: &str) -> Result<Value> {
        let mut params = Map::new();
        params.insert("oxd_id".into(), Value::String(self.require_oxd_id()?));
        params.insert("rpt".into(), Value::String(rpt.to_string()));

        self.command(commands::INTROSPECT_RPT, params).await
    }

    async fn command(&mut self, command: &str, params: Map<String, Value>) -> Result<Value> {
        let raw = self.messenger.request(command, params).await?;
        Response::from_value(raw)?.into_result().map_err(|e| {
            tracing::error!(command, "oxd command failed: {}", e);
            e
        })
    }

    /// Site parameters shared by `setup_client`, `register_site`, and `update_site`.
    fn registration_params(&self, with_op_host: bool) -> Result<Map<String, Value>> {
        let site = &self.site;
        let mut params = Map::new();

        if with_op_host {
            params.insert("op_host".into(), self.required(&site.op_host, "op_host")?);
        }
        insert_opt(
            &mut params,
            "authorization_redirect_uri",
            site.authorization_redirect_uri.as_deref(),
        );
        insert_opt(
            &mut params,
            "post_logout_redirect_uri",
            site.post_logout_redirect_uri.as_deref(),
        );
        insert_opt(&mut params, "application_type", site.application_type.as_deref());
        insert_opt(&mut params, "client_name", site.client_name.as_deref());
        insert_opt(&mut params, "client_jwks_uri", site.client_jwks_uri.as_deref());
        insert_opt(
            &mut params,
            "client_token_endpoint_auth_method",
            site.client_token_endpoint_auth_method.as_deref(),
        );
        insert_opt(&mut params, "client_id", site.client_id.as_deref());
        insert_opt(&mut params, "client_secret", site.client_secret.as_deref());
        insert_list(&mut params, "scope", &site.scope);
        insert_list(&mut params, "grant_types", &site.grant_types);
        insert_list(&mut params, "acr_values", &site.acr_values);
        insert_list(&mut params, "response_types", &site.response_types);
        insert_list(&mut params, "contacts", &site.contacts);

        Ok(params)
    }

    fn required(&self, value: &Option<String>, name: &str) -> Result<Value> {
        match value.as_deref().filter(|v| !v.is_empty()) {
            Some(v) => Ok(Value::String(v.to_string())),
            None => Err(OxdError::Config(format!("client.{} is not configured", name)).into()),
        }
    }

    fn require_oxd_id(&self) -> Result<String> {
        self.oxd_id.clone().ok_or_else(|| {
            OxdError::Config("site is not registered; call register_site first".to_string())
                .into()
        })
    }
}

fn insert_opt(params: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        params.insert(key.to_string(), Value::String(value.to_string()));
    }
}

fn insert_list(params: &mut Map<String, Value>, key: &str, values: &[String]) {
    if !values.is_empty() {
        params.insert(
            key.to_string(),
            Value::Array(values.iter().cloned().map(Value::String).collect()),
        );
    }
}

fn string_field(data: &Value, field: &str) -> Result<String> {
    optional_string_field(data, field).ok_or_else(|| {
        OxdError::MalformedFrame(format!("response data has no string field `{}`", field)).into()
    })
}

fn optional_string_field(data: &Value, field: &str) -> Option<String> {
    data.get(field).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ACCESS_TOKEN_PARAM;
    use crate::transport::fake::{FakeTransport, FakeTransportHandle};
    use serde_json::json;

    fn site() -> SiteConfig {
        SiteConfig {
            op_host: Some("https://op.example.com".to_string()),
            authorization_redirect_uri: Some("https://client.example.com/callback".to_string()),
            post_logout_redirect_uri: Some("https://client.example.com/bye".to_string()),
            scope: vec!["openid".to_string(), "profile".to_string()],
            ..SiteConfig::default()
        }
    }

    fn fake_client(site: SiteConfig) -> (Client, FakeTransportHandle) {
        let (transport, handle) = FakeTransport::new();
        (Client::new(Messenger::new(Box::new(transport)), site), handle)
    }

    fn registered_client() -> (Client, FakeTransportHandle) {
        fake_client(SiteConfig {
            oxd_id: Some("6F9619FF-8B86-D011-B42D-00CF4FC964FF".to_string()),
            ..site()
        })
    }

    fn expect_error(err: &anyhow::Error) -> &OxdError {
        err.downcast_ref::<OxdError>().expect("expected OxdError")
    }

    #[tokio::test]
    async fn test_register_site_sends_site_params_and_stores_id() {
        let (mut client, mut handle) = fake_client(site());
        handle.respond_ok(json!({"oxd_id": "new-id"}));

        let id = client.register_site().await.unwrap();

        assert_eq!(id, "new-id");
        assert_eq!(client.oxd_id(), Some("new-id"));
        let sent = handle.sent();
        assert_eq!(sent["command"], "register_site");
        assert_eq!(sent["params"]["op_host"], "https://op.example.com");
        assert_eq!(sent["params"]["scope"], json!(["openid", "profile"]));
        assert!(sent["params"].get("grant_types").is_none());
    }

    #[tokio::test]
    async fn test_register_site_is_noop_when_registered() {
        let (mut client, mut handle) = registered_client();

        let id = client.register_site().await.unwrap();

        assert_eq!(id, "6F9619FF-8B86-D011-B42D-00CF4FC964FF");
        assert!(handle.outbound_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_register_site_requires_op_host() {
        let (mut client, _handle) = fake_client(SiteConfig::default());
        let err = client.register_site().await.unwrap_err();
        assert!(matches!(expect_error(&err), OxdError::Config(_)));
    }

    #[tokio::test]
    async fn test_setup_client_stores_credentials() {
        let (mut client, handle) = fake_client(site());
        handle.respond_ok(json!({
            "oxd_id": "setup-id",
            "client_id": "@!1736.179E",
            "client_secret": "f436b936"
        }));

        client.setup_client().await.unwrap();

        assert_eq!(client.oxd_id(), Some("setup-id"));
        assert_eq!(client.site().client_id.as_deref(), Some("@!1736.179E"));
        assert_eq!(client.site().client_secret.as_deref(), Some("f436b936"));
    }

    #[tokio::test]
    async fn test_get_client_token_updates_messenger_token() {
        let (mut client, mut handle) = fake_client(SiteConfig {
            client_id: Some("id".to_string()),
            client_secret: Some("secret".to_string()),
            ..site()
        });
        handle.respond_ok(json!({"access_token": "pat", "expires_in": 299}));
        handle.respond_ok(json!({"pong": true}));

        client.get_client_token(true).await.unwrap();
        client.ping().await.unwrap();

        let token_request = handle.sent();
        assert_eq!(token_request["params"]["client_id"], "id");
        assert!(token_request["params"].get(ACCESS_TOKEN_PARAM).is_none());
        assert_eq!(handle.sent()["params"][ACCESS_TOKEN_PARAM], "pat");
        assert_eq!(client.messenger().access_token(), Some("pat"));
    }

    #[tokio::test]
    async fn test_get_client_token_without_update_leaves_token() {
        let (mut client, handle) = fake_client(SiteConfig {
            client_id: Some("id".to_string()),
            client_secret: Some("secret".to_string()),
            ..site()
        });
        handle.respond_ok(json!({"access_token": "pat"}));

        client.get_client_token(false).await.unwrap();

        assert_eq!(client.messenger().access_token(), None);
    }

    #[tokio::test]
    async fn test_get_authorization_url_registers_first() {
        let (mut client, mut handle) = fake_client(site());
        handle.respond_ok(json!({"oxd_id": "new-id"}));
        handle.respond_ok(json!({"authorization_url": "https://op.example.com/authorize?x=1"}));

        let url = client
            .get_authorization_url(&["basic".to_string()], Some("login"), None)
            .await
            .unwrap();

        assert_eq!(url, "https://op.example.com/authorize?x=1");
        assert_eq!(handle.sent()["command"], "register_site");
        let sent = handle.sent();
        assert_eq!(sent["command"], "get_authorization_url");
        assert_eq!(sent["params"]["oxd_id"], "new-id");
        assert_eq!(sent["params"]["acr_values"], json!(["basic"]));
        assert_eq!(sent["params"]["prompt"], "login");
    }

    #[tokio::test]
    async fn test_get_tokens_by_code_rejects_empty_input() {
        let (mut client, mut handle) = registered_client();

        for (code, state) in [("", "state"), ("code", "")] {
            let err = client.get_tokens_by_code(code, state).await.unwrap_err();
            assert!(matches!(expect_error(&err), OxdError::Config(_)));
        }
        assert!(handle.outbound_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_get_tokens_by_code_returns_data() {
        let (mut client, mut handle) = registered_client();
        handle.respond_ok(json!({"access_token": "at", "id_token": "it", "expires_in": 3600}));

        let data = client.get_tokens_by_code("code", "state").await.unwrap();

        assert_eq!(data["access_token"], "at");
        let sent = handle.sent();
        assert_eq!(sent["command"], "get_tokens_by_code");
        assert_eq!(sent["params"]["code"], "code");
        assert_eq!(sent["params"]["state"], "state");
        assert!(sent["params"].get("scopes").is_none());
    }

    #[tokio::test]
    async fn test_get_user_info_returns_claims() {
        let (mut client, handle) = registered_client();
        handle.respond_ok(json!({"claims": {"sub": ["24400320"]}}));

        let claims = client.get_user_info("at").await.unwrap();

        assert_eq!(claims, json!({"sub": ["24400320"]}));
    }

    #[tokio::test]
    async fn test_get_user_info_rejects_empty_token() {
        let (mut client, _handle) = registered_client();
        let err = client.get_user_info("").await.unwrap_err();
        assert!(matches!(expect_error(&err), OxdError::Config(_)));
    }

    #[tokio::test]
    async fn test_commands_require_registration() {
        let (mut client, _handle) = fake_client(site());
        let err = client.get_user_info("at").await.unwrap_err();
        assert!(err.to_string().contains("not registered"));
    }

    #[tokio::test]
    async fn test_get_logout_uri_falls_back_to_configured_redirect() {
        let (mut client, mut handle) = registered_client();
        handle.respond_ok(json!({"uri": "https://op.example.com/end_session"}));
        handle.respond_ok(json!({"uri": "https://op.example.com/end_session"}));

        client.get_logout_uri(None, None, None, None).await.unwrap();
        client
            .get_logout_uri(Some("idt"), Some("https://other/"), Some("s"), None)
            .await
            .unwrap();

        assert_eq!(
            handle.sent()["params"]["post_logout_redirect_uri"],
            "https://client.example.com/bye"
        );
        let explicit = handle.sent();
        assert_eq!(explicit["params"]["post_logout_redirect_uri"], "https://other/");
        assert_eq!(explicit["params"]["id_token_hint"], "idt");
        assert!(explicit["params"].get("session_state").is_none());
    }

    #[tokio::test]
    async fn test_update_site_reports_refusal_as_false() {
        let (mut client, handle) = registered_client();
        handle.respond_ok(json!({"oxd_id": "x"}));
        handle.respond_error("invalid_oxd_id", "unknown site", None);

        assert!(client.update_site().await.unwrap());
        assert!(!client.update_site().await.unwrap());
    }

    #[tokio::test]
    async fn test_update_site_sends_current_command_name() {
        let (mut client, mut handle) = registered_client();
        handle.respond_ok(json!({"oxd_id": "x"}));

        client.update_site().await.unwrap();

        let sent = handle.sent();
        assert_eq!(sent["command"], "update_site");
        assert_eq!(sent["params"]["oxd_id"], "6F9619FF-8B86-D011-B42D-00CF4FC964FF");
    }

    #[tokio::test]
    async fn test_remove_site_forgets_id() {
        let (mut client, handle) = registered_client();
        handle.respond_ok(json!({"oxd_id": "6F9619FF-8B86-D011-B42D-00CF4FC964FF"}));

        client.remove_site().await.unwrap();

        assert_eq!(client.oxd_id(), None);
    }

    #[tokio::test]
    async fn test_uma_rs_protect_sends_resources() {
        let (mut client, mut handle) = registered_client();
        handle.respond_ok(json!({"oxd_id": "x"}));

        let mut resources = ResourceSet::new();
        resources
            .add("/photoz")
            .set_scope("GET", "https://example.com/uma/scope/view");

        assert!(client.uma_rs_protect(&resources, true).await.unwrap());

        let sent = handle.sent();
        assert_eq!(sent["params"]["resources"][0]["path"], "/photoz");
        assert_eq!(sent["params"]["overwrite"], true);
    }

    #[tokio::test]
    async fn test_uma_rs_check_access_maps_invalid_request() {
        let (mut client, handle) = registered_client();
        handle.respond_error("invalid_request", "Resource is not protected", None);

        let err = client
            .uma_rs_check_access(None, "/unprotected", "GET")
            .await
            .unwrap_err();

        assert!(matches!(expect_error(&err), OxdError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_uma_rs_check_access_returns_decision() {
        let (mut client, mut handle) = registered_client();
        handle.respond_ok(json!({"access": "denied", "ticket": "tkt"}));

        let data = client
            .uma_rs_check_access(None, "/photoz", "GET")
            .await
            .unwrap();

        assert_eq!(data["access"], "denied");
        assert_eq!(handle.sent()["params"]["rpt"], Value::Null);
    }

    #[tokio::test]
    async fn test_uma_rp_get_rpt_maps_need_info() {
        let (mut client, mut handle) = registered_client();
        handle.respond_error(
            "need_info",
            "The authorization server needs additional information",
            Some(json!({"ticket": "new-ticket", "required_claims": []})),
        );

        let err = client
            .uma_rp_get_rpt(&RptRequest::new("ticket"))
            .await
            .unwrap_err();

        match expect_error(&err) {
            OxdError::NeedInfo { details, .. } => assert_eq!(details["ticket"], "new-ticket"),
            other => panic!("unexpected error: {other:?}"),
        }
        let sent = handle.sent();
        assert_eq!(sent["params"]["ticket"], "ticket");
        assert!(sent["params"].get("claim_token").is_none());
    }

    #[tokio::test]
    async fn test_uma_rp_get_rpt_maps_invalid_ticket() {
        let (mut client, handle) = registered_client();
        handle.respond_error("invalid_ticket", "Ticket is not valid", None);

        let err = client
            .uma_rp_get_rpt(&RptRequest::new("stale"))
            .await
            .unwrap_err();

        assert!(matches!(expect_error(&err), OxdError::InvalidTicket(_)));
    }

    #[tokio::test]
    async fn test_claims_gathering_url() {
        let (mut client, mut handle) = registered_client();
        handle.respond_ok(json!({"url": "https://op.example.com/gather"}));

        let url = client.uma_rp_get_claims_gathering_url("tkt").await.unwrap();

        assert_eq!(url, "https://op.example.com/gather");
        assert_eq!(
            handle.sent()["params"]["claims_redirect_uri"],
            "https://client.example.com/callback"
        );
    }

    #[tokio::test]
    async fn test_introspection_commands() {
        let (mut client, mut handle) = registered_client();
        handle.respond_ok(json!({"active": true}));
        handle.respond_ok(json!({"active": false}));

        assert_eq!(client.introspect_access_token("at").await.unwrap()["active"], true);
        assert_eq!(client.introspect_rpt("rpt").await.unwrap()["active"], false);
        assert_eq!(handle.sent()["command"], "introspect_access_token");
        assert_eq!(handle.sent()["command"], "introspect_rpt");
    }

    #[tokio::test]
    async fn test_unknown_error_code_is_server_error() {
        let (mut client, handle) = registered_client();
        handle.respond_error("internal_error", "boom", None);

        let err = client.introspect_rpt("rpt").await.unwrap_err();

        assert!(matches!(expect_error(&err), OxdError::Server { .. }));
    }

    #[tokio::test]
    async fn test_missing_response_field_is_reported() {
        let (mut client, handle) = registered_client();
        handle.respond_ok(json!({}));

        let err = client.get_logout_uri(None, None, None, None).await.unwrap_err();

        assert!(err.to_string().contains("`uri`"));
    }
}
