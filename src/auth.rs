//! Single sign-on against a dissemination server.
//!
//! The login is a three-legged SAML redirect: the dissemination service sends
//! the browser to the identity provider, the identity provider answers the
//! posted credentials with a self-submitting form, and posting that form back
//! to the service yields the authenticated session cookies.
use crate::config::Credentials;
use crate::error::{Error, Result};
use reqwest::cookie::Jar;
use scraper::{Html, Selector};
use std::sync::Arc;
use tracing::{debug, info};

const SERVICE_LOGIN_PATH: &str = "/oads/access/login";
const SERVICE_LOGOUT_PATH: &str = "/oads/Shibboleth.sso/Logout";
const IDP_SSO_PATH: &str = "/samlsso";
const IDP_LOGOUT_PATH: &str = "/Shibboleth.sso/Logout";

// Form field names fixed by the identity provider.
const SESSION_KEY_FIELD: &str = "sessionDataKey";
const RELAY_STATE_FIELD: &str = "RelayState";
const SAML_RESPONSE_FIELD: &str = "SAMLResponse";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Init,
    ServiceLoginRequested,
    IdpCredentialsSubmitted,
    SamlRedirectReceived,
    Authenticated,
    LoggedOut,
}

/// The self-submitting form the identity provider returns after a
/// successful credential check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamlRedirect {
    pub action: String,
    pub relay_state: String,
    pub saml_response: String,
}

impl SamlRedirect {
    pub fn from_html(html: &str) -> Result<Self> {
        let bad_response = || {
            Error::BadResponse(
                "the identity provider did not respond as expected; check the username and \
                 password in your configuration file"
                    .to_string(),
            )
        };
        Ok(Self {
            relay_state: input_value(html, RELAY_STATE_FIELD).ok_or_else(bad_response)?,
            saml_response: input_value(html, SAML_RESPONSE_FIELD).ok_or_else(bad_response)?,
            action: post_form_action(html).ok_or_else(bad_response)?,
        })
    }
}

pub struct Authenticator<'a> {
    server: String,
    idp_host: String,
    credentials: &'a Credentials,
    client: reqwest::Client,
    state: AuthState,
}

impl<'a> Authenticator<'a> {
    pub fn new(server: &str, idp_host: &str, credentials: &'a Credentials) -> Result<Self> {
        let client = reqwest::Client::builder()
            .cookie_provider(Arc::new(Jar::default()))
            .build()?;
        Ok(Self {
            server: server.to_string(),
            idp_host: idp_host.to_string(),
            credentials,
            client,
            state: AuthState::Init,
        })
    }

    /// Runs the whole login and hands out the authenticated session.
    pub async fn login(mut self: Self) -> Result<AuthSession> {
        info!("Logging in to {}", self.server);
        let session_key = self.request_service_login().await?;
        let redirect = self.submit_credentials(&session_key).await?;
        self.follow_saml_redirect(&redirect).await?;
        Ok(AuthSession {
            server: self.server,
            idp_host: self.idp_host,
            client: self.client,
            state: self.state,
        })
    }

    /// Opens the service login page, which redirects to the identity
    /// provider's form carrying the session correlation key.
    async fn request_service_login(self: &mut Self) -> Result<String> {
        self.require_state(AuthState::Init)?;
        let url = format!("https://{}{}", self.server, SERVICE_LOGIN_PATH);
        debug!("GET {}", url);
        let html = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let key = input_value(&html, SESSION_KEY_FIELD).ok_or_else(|| {
            Error::BadResponse(format!("no {SESSION_KEY_FIELD} in the login page of {}", self.server))
        })?;
        self.state = AuthState::ServiceLoginRequested;
        Ok(key)
    }

    async fn submit_credentials(self: &mut Self, session_key: &str) -> Result<SamlRedirect> {
        self.require_state(AuthState::ServiceLoginRequested)?;
        let url = format!("https://{}{}", self.idp_host, IDP_SSO_PATH);
        debug!("POST {}", url);
        let form = [
            ("tocommonauth", "true"),
            ("username", self.credentials.username.as_str()),
            ("password", self.credentials.password.as_str()),
            (SESSION_KEY_FIELD, session_key),
        ];
        let html = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        self.state = AuthState::IdpCredentialsSubmitted;

        let redirect = SamlRedirect::from_html(&html)?;
        self.state = AuthState::SamlRedirectReceived;
        Ok(redirect)
    }

    async fn follow_saml_redirect(self: &mut Self, redirect: &SamlRedirect) -> Result<()> {
        self.require_state(AuthState::SamlRedirectReceived)?;
        debug!("POST {}", redirect.action);
        let form = [
            (RELAY_STATE_FIELD, redirect.relay_state.as_str()),
            (SAML_RESPONSE_FIELD, redirect.saml_response.as_str()),
        ];
        self.client
            .post(&redirect.action)
            .form(&form)
            .send()
            .await?
            .error_for_status()?;
        self.state = AuthState::Authenticated;
        Ok(())
    }

    fn require_state(self: &Self, state: AuthState) -> Result<()> {
        if self.state != state {
            return Err(Error::BadResponse(format!(
                "login step out of order: expected {:?}, in {:?}",
                state, self.state
            )));
        }
        Ok(())
    }
}

/// Authenticated cookies for one dissemination server.
pub struct AuthSession {
    server: String,
    idp_host: String,
    client: reqwest::Client,
    state: AuthState,
}

impl AuthSession {
    /// Client carrying the session cookies. Fails once the session has been
    /// logged out.
    pub fn client(self: &Self) -> Result<&reqwest::Client> {
        if self.state != AuthState::Authenticated {
            return Err(Error::BadResponse(format!(
                "session for {} is not authenticated ({:?})",
                self.server, self.state
            )));
        }
        Ok(&self.client)
    }

    /// Logs out of the service and the identity provider. Responses are
    /// ignored.
    pub async fn logout(self: &mut Self) {
        for url in [
            format!("https://{}{}", self.server, SERVICE_LOGOUT_PATH),
            format!("https://{}{}", self.idp_host, IDP_LOGOUT_PATH),
        ] {
            debug!("GET {}", url);
            if let Err(e) = self.client.get(&url).send().await {
                debug!("Logout request to {} failed: {}", url, e);
            }
        }
        self.state = AuthState::LoggedOut;
        info!("Logged out of {}", self.server);
    }
}

/// `value` of the first `<input>` called `name`.
fn input_value(html: &str, name: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(&format!(r#"input[name="{name}"]"#)).ok()?;
    document
        .select(&selector)
        .find_map(|input| input.value().attr("value"))
        .map(str::to_string)
}

/// `action` of the first form submitted with POST.
fn post_form_action(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("form[method][action]").ok()?;
    document
        .select(&selector)
        .find(|form| {
            form.value()
                .attr("method")
                .is_some_and(|m| m.eq_ignore_ascii_case("post"))
        })
        .and_then(|form| form.value().attr("action"))
        .map(str::to_string)
}
