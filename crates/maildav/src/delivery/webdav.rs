use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::config::WebDavSettings;
use crate::sanitize::{directory_segments, redact_url, sanitize_filename};
use crate::secrets::SecretSource;

use super::{DeliveryError, Result};

/// Uploads files to one WebDAV destination.
pub struct WebDavClient<'a> {
    http: &'a Client,
    settings: &'a WebDavSettings,
}

impl<'a> WebDavClient<'a> {
    pub fn new(http: &'a Client, settings: &'a WebDavSettings) -> Self {
        Self { http, settings }
    }

    /// Creates the collections of `directory` below the destination URL and
    /// PUTs `content` into the innermost one. Returns the file URL.
    pub async fn upload(
        &self,
        directory: &str,
        filename: &str,
        content: Vec<u8>,
    ) -> Result<String> {
        let password = SecretSource::webdav_password(self.settings)
            .resolve_optional()
            .map_err(|e| DeliveryError::Credentials(e.to_string()))?;

        let (collections, file_url) = upload_urls(&self.settings.url, directory, filename)?;

        for collection in collections {
            self.make_collection(collection, password.as_ref()).await?;
        }

        let location = redact_url(file_url.as_str());
        let response = self
            .request(Method::PUT, file_url, password.as_ref())
            .body(content)
            .send()
            .await
            .map_err(|e| DeliveryError::WebDav {
                url: location.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::WebDav {
                url: location,
                reason: format!("PUT returned {}", status),
            });
        }

        Ok(location)
    }

    /// MKCOL; an existing collection answers 405 and is fine.
    async fn make_collection(&self, url: Url, password: Option<&SecretString>) -> Result<()> {
        let location = redact_url(url.as_str());
        let method = Method::from_bytes(b"MKCOL").map_err(|e| DeliveryError::WebDav {
            url: location.clone(),
            reason: e.to_string(),
        })?;

        let response = self
            .request(method, url, password)
            .send()
            .await
            .map_err(|e| DeliveryError::WebDav {
                url: location.clone(),
                reason: e.to_string(),
            })?;

        match response.status() {
            status if status.is_success() => {
                debug!("Created collection {}", location);
                Ok(())
            }
            StatusCode::METHOD_NOT_ALLOWED => Ok(()),
            status => Err(DeliveryError::WebDav {
                url: location,
                reason: format!("MKCOL returned {}", status),
            }),
        }
    }

    fn request(&self, method: Method, url: Url, password: Option<&SecretString>) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.settings.username {
            Some(username) => builder.basic_auth(username, password.map(|p| p.expose_secret())),
            None => builder,
        }
    }
}

/// Collection URLs to create, outermost first, and the final file URL.
pub fn upload_urls(base: &str, directory: &str, filename: &str) -> Result<(Vec<Url>, Url)> {
    let invalid = |reason: String| DeliveryError::InvalidUrl {
        url: redact_url(base),
        reason,
    };

    let mut current = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
    if current.cannot_be_a_base() {
        return Err(invalid("URL cannot hold a path".to_string()));
    }

    let mut collections = Vec::new();
    for segment in directory_segments(directory) {
        current = child_url(&current, &sanitize_filename(segment)).map_err(invalid)?;
        collections.push(current.clone());
    }

    let file = child_url(&current, &sanitize_filename(filename)).map_err(invalid)?;
    Ok((collections, file))
}

fn child_url(parent: &Url, segment: &str) -> std::result::Result<Url, String> {
    let mut url = parent.clone();
    url.path_segments_mut()
        .map_err(|()| "URL cannot hold a path".to_string())?
        .pop_if_empty()
        .push(segment);
    Ok(url)
}
