//! IMAP client for connecting to email servers.

use async_imap::Session;
use async_native_tls::TlsConnector;
use async_trait::async_trait;
use futures_util::StreamExt;
use log::{debug, info, warn};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;

use crate::config::{AuthType, SourceConfig};
use crate::secrets::SecretSource;

use super::error::{EmailError, Result};
use super::session::{Connector, MailSession, RawMessage};

/// Type alias for the underlying async stream (using async-std compatible TcpStream).
type AsyncTcpStream = async_io::Async<std::net::TcpStream>;

/// Type alias for the TLS stream used by the IMAP session.
type TlsStream = async_native_tls::TlsStream<AsyncTcpStream>;

/// Fetch query; `BODY[]` (not `BODY.PEEK[]`) so the server sets `\Seen`.
const FETCH_QUERY: &str = "(UID BODY[])";

/// Simple authenticator for XOAUTH2.
struct XOAuth2Authenticator {
    response: String,
}

impl async_imap::Authenticator for XOAuth2Authenticator {
    type Response = String;

    fn process(&mut self, _data: &[u8]) -> Self::Response {
        std::mem::take(&mut self.response)
    }
}

/// Opens authenticated IMAP-over-TLS sessions.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImapConnector;

impl ImapConnector {
    pub fn new() -> Self {
        Self
    }

    async fn open(&self, source: &SourceConfig) -> Result<ImapSession> {
        if !source.use_tls {
            return Err(EmailError::ConfigError(
                "TLS is required for secure email connections".to_string(),
            ));
        }

        info!(
            "Connecting to IMAP server at {}:{}",
            source.host, source.port
        );

        let tcp_stream = connect_tcp(&source.host, source.port).await?;

        let tls_stream = TlsConnector::new()
            .connect(&source.host, tcp_stream)
            .await?;

        let client = async_imap::Client::new(tls_stream);

        let session = match source.auth.auth_type {
            AuthType::Password => authenticate_password(client, source).await?,
            AuthType::OAuth2 => authenticate_oauth2(client, source).await?,
        };

        info!(
            "Authenticated to IMAP server {} as {}",
            source.host, source.username
        );
        Ok(ImapSession { session })
    }
}

#[async_trait]
impl Connector for ImapConnector {
    async fn connect(&self, source: &SourceConfig) -> Result<Box<dyn MailSession>> {
        let session = self.open(source).await?;
        Ok(Box::new(session))
    }
}

async fn authenticate_password(
    client: async_imap::Client<TlsStream>,
    source: &SourceConfig,
) -> Result<Session<TlsStream>> {
    if source.auth.password_insecure.is_some() {
        warn!(
            "Using direct password value (passwordInsecure) is not recommended. \
             Consider using passwordEnvVar or passwordFile instead."
        );
    }
    let password = resolve(SecretSource::imap_password(&source.auth))?;

    client
        .login(&source.username, password.expose_secret())
        .await
        .map_err(|(e, _)| EmailError::AuthenticationFailed(e.to_string()))
}

async fn authenticate_oauth2(
    client: async_imap::Client<TlsStream>,
    source: &SourceConfig,
) -> Result<Session<TlsStream>> {
    let access_token = resolve(SecretSource::imap_access_token(&source.auth))?;

    client
        .authenticate(
            "XOAUTH2",
            XOAuth2Authenticator {
                response: xoauth2_response(&source.username, &access_token),
            },
        )
        .await
        .map_err(|(e, _)| EmailError::AuthenticationFailed(e.to_string()))
}

fn resolve(source: SecretSource<'_>) -> Result<SecretString> {
    source
        .resolve()
        .map_err(|e| EmailError::CredentialsNotFound(e.to_string()))
}

/// Format: base64("user=" + user + "^Aauth=Bearer " + token + "^A^A")
fn xoauth2_response(username: &str, access_token: &SecretString) -> String {
    let auth_string = format!(
        "user={}\x01auth=Bearer {}\x01\x01",
        username,
        access_token.expose_secret()
    );
    base64::Engine::encode(
        &base64::engine::general_purpose::STANDARD,
        auth_string.as_bytes(),
    )
}

/// An authenticated IMAP session.
pub struct ImapSession {
    session: Session<TlsStream>,
}

#[async_trait]
impl MailSession for ImapSession {
    async fn select(&mut self, directory: &str) -> Result<()> {
        let not_found = |e: async_imap::error::Error| EmailError::FolderNotFound {
            folder: directory.to_string(),
            reason: e.to_string(),
        };
        let mailbox = self.session.select(directory).await.map_err(not_found)?;

        debug!(
            "Folder '{}' selected with {} messages",
            directory, mailbox.exists
        );
        Ok(())
    }

    async fn search_unseen(&mut self) -> Result<Vec<u32>> {
        let ids = self.session.search("UNSEEN").await?;

        let mut ids: Vec<u32> = ids.into_iter().collect();
        ids.sort_unstable();
        debug!("Found {} unseen messages", ids.len());
        Ok(ids)
    }

    async fn fetch(&mut self, ids: &[u32], sink: mpsc::Sender<RawMessage>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let sequence_set = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");

        debug!("Fetching {} messages: {}", ids.len(), sequence_set);

        let mut messages = self
            .session
            .fetch(&sequence_set, FETCH_QUERY)
            .await
            .map_err(|e| EmailError::FetchFailed(e.to_string()))?;

        // The response stream is always read to the end so the session stays
        // in sync for the next command; only the first failure is reported.
        let mut failure = None;
        while let Some(item) = messages.next().await {
            match item {
                Ok(fetch) => match raw_message(fetch.message, fetch.uid, fetch.body()) {
                    Ok(raw) => {
                        if sink.send(raw).await.is_err() && failure.is_none() {
                            failure = Some(EmailError::FetchFailed(
                                "message consumer went away".to_string(),
                            ));
                        }
                    }
                    Err(e) => {
                        warn!("{}", e);
                        if failure.is_none() {
                            failure = Some(e);
                        }
                    }
                },
                Err(e) => {
                    warn!("Error fetching message: {}", e);
                    if failure.is_none() {
                        failure = Some(EmailError::FetchFailed(e.to_string()));
                    }
                }
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn noop(&mut self) -> Result<()> {
        self.session.noop().await?;
        Ok(())
    }

    async fn logout(&mut self) -> Result<()> {
        info!("Disconnecting from IMAP server");
        self.session.logout().await?;
        Ok(())
    }
}

/// A fetched item without a body is already marked read, so it is reported.
fn raw_message(id: u32, uid: Option<u32>, body: Option<&[u8]>) -> Result<RawMessage> {
    let body = body.ok_or_else(|| {
        EmailError::FetchFailed(format!("message {} returned without a body", id))
    })?;
    Ok(RawMessage {
        id,
        uid,
        body: body.to_vec(),
    })
}

/// Resolves `host:port` and connects to the first address that accepts.
async fn connect_tcp(host: &str, port: u16) -> Result<AsyncTcpStream> {
    let target = format!("{}:{}", host, port);
    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| connection_failed(&target, e))?;

    let mut last_error = None;
    for addr in addrs {
        match AsyncTcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("Connecting to {} failed: {}", addr, e);
                last_error = Some(e);
            }
        }
    }

    Err(match last_error {
        Some(e) => connection_failed(&target, e),
        None => connection_failed(&target, "no addresses resolved"),
    })
}

fn connection_failed(target: &str, reason: impl std::fmt::Display) -> EmailError {
    EmailError::ConnectionFailed(format!("{}: {}", target, reason))
}
