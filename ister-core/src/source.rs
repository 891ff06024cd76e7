//! Template discovery: the pointer file and URL fetching.

use crate::config_states::UnvalidatedTemplate;
use crate::errors::{InstallError, Result};
use anyhow::Context;
use reqwest::blocking::Client;
use std::fs;
use std::path::Path;
use url::Url;

/// Template URL named by the pointer file at `path`.
pub fn read_pointer_file(path: &Path) -> Result<String> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Unable to read configuration file {}", path.display()))?;
    parse_pointer(&contents)
}

/// First line must be `template=<url>`.
pub fn parse_pointer(contents: &str) -> Result<String> {
    let first = contents.lines().next().unwrap_or_default().trim_end();
    match first.split_once('=') {
        Some(("template", url)) if !url.is_empty() => Ok(url.to_string()),
        _ => Err(InstallError::InvalidPointerFile.into()),
    }
}

fn create_http_client() -> Result<Client> {
    Ok(Client::builder().user_agent("ister").build()?)
}

/// Body of a `file://` or `http(s)://` URL.
pub fn fetch_text(location: &str) -> Result<String> {
    let url = Url::parse(location).with_context(|| format!("Invalid URL {}", location))?;
    match url.scheme() {
        "file" => {
            let path = url
                .to_file_path()
                .map_err(|_| InstallError::UnsupportedLocation(location.to_string()))?;
            fs::read_to_string(&path).with_context(|| format!("Unable to read {}", path.display()))
        }
        "http" | "https" => {
            let client = create_http_client()?;
            let response = client
                .get(url)
                .send()
                .with_context(|| format!("Failed to fetch {}", location))?
                .error_for_status()
                .with_context(|| format!("Failed to fetch {}", location))?;
            Ok(response.text()?)
        }
        _ => Err(InstallError::UnsupportedLocation(location.to_string()).into()),
    }
}

pub fn fetch_template(location: &str) -> Result<UnvalidatedTemplate> {
    log::info!("fetching template from {}", location);
    let body = fetch_text(location)?;
    UnvalidatedTemplate::from_json(&body)
        .with_context(|| format!("Invalid template at {}", location))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::GET;
    use httpmock::MockServer;
    use tempfile::tempdir;

    #[test]
    fn pointer_requires_template_key() {
        assert_eq!(
            parse_pointer("template=file:///etc/ister.json\n").unwrap(),
            "file:///etc/ister.json"
        );
        assert_eq!(
            parse_pointer("template=http://h/t.json?a=b\nignored\n").unwrap(),
            "http://h/t.json?a=b"
        );
        for bad in ["", "\n", "tmpl=http://h/t.json", "template=", "template"] {
            let err = parse_pointer(bad).unwrap_err();
            assert_eq!(err.to_string(), "Invalid configuration file", "{bad:?}");
        }
    }

    #[test]
    fn reads_pointer_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ister.conf");
        fs::write(&path, "template=file:///t.json\n").unwrap();
        assert_eq!(read_pointer_file(&path).unwrap(), "file:///t.json");
    }

    #[test]
    fn fetches_file_urls() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.json");
        fs::write(&path, r#"{"ImageSourceType": "local"}"#).unwrap();
        let template = fetch_template(&format!("file://{}", path.display())).unwrap();
        assert_eq!(template.0.image_source_type.as_deref(), Some("local"));
    }

    #[test]
    fn fetches_http_urls() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/keys/ops.pub");
            then.status(200).body("ssh-ed25519 AAAA ops@example\n");
        });
        let body = fetch_text(&server.url("/keys/ops.pub")).unwrap();
        mock.assert();
        assert_eq!(body, "ssh-ed25519 AAAA ops@example\n");
    }

    #[test]
    fn http_error_status_fails() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/missing.json");
            then.status(404);
        });
        assert!(fetch_template(&server.url("/missing.json")).is_err());
    }

    #[test]
    fn other_schemes_are_rejected() {
        let err = fetch_text("ftp://example.com/t.json").unwrap_err();
        assert_eq!(
            err.downcast_ref::<InstallError>(),
            Some(&InstallError::UnsupportedLocation(
                "ftp://example.com/t.json".to_string()
            ))
        );
    }
}
