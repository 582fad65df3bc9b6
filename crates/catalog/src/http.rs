//! HTTP directory-index catalog.

use crate::download::Download;
use crate::error::{ErrorKind, Result};
use crate::links::extract_links;
use crate::metadata::FileMetadata;
use crate::path::RepositoryPath;
use crate::Catalog;
use exn::ResultExt;
use reqwest::StatusCode;
use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder, Response};
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub const DEFAULT_SERVER: &str = "http://193.2.72.57/newsf/";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
/// Extra attempts made when a connection can't be established at all.
const MAX_CONNECT_RETRIES: u32 = 2;
const INFO_SUFFIX: &str = ".info";

/// A catalog served as Apache-style HTML directory indexes.
///
/// Directory `a/b` is listed by `GET <server>/a/b/`; file `a/b/c` is
/// downloaded from `<server>/a/b/c` and described by `<server>/a/b/c.info`.
///
/// Certificate validation is disabled: repositories are commonly served
/// with self-signed certificates.
#[derive(Debug)]
pub struct HttpCatalog {
    base: Url,
    client: Client,
    timeout: Duration,
    credentials: Option<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct HttpCatalogBuilder {
    server: String,
    timeout: Duration,
    credentials: Option<(String, String)>,
}

impl Default for HttpCatalogBuilder {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            timeout: DEFAULT_TIMEOUT,
            credentials: None,
        }
    }
}

impl HttpCatalogBuilder {
    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    /// Socket timeout: bounds connecting, waiting for a response and every
    /// read of a body, so a server that stops sending fails the transfer.
    /// Listing and metadata requests are also bounded overall; a download
    /// may take as long as it keeps making progress.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// HTTP basic authentication for every request.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    pub fn build(self) -> Result<HttpCatalog> {
        let mut server = self.server;
        if !server.ends_with('/') {
            server.push('/');
        }
        let base = Url::parse(&server).or_raise(|| ErrorKind::InvalidUrl(server.clone()))?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            exn::bail!(ErrorKind::InvalidUrl(server));
        }
        let client = Client::builder()
            .connect_timeout(self.timeout)
            .timeout(self.timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .or_raise(|| ErrorKind::Network)?;
        Ok(HttpCatalog {
            base,
            client,
            timeout: self.timeout,
            credentials: self.credentials,
        })
    }
}

impl HttpCatalog {
    pub fn builder() -> HttpCatalogBuilder {
        HttpCatalogBuilder::default()
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url_for<'a>(&self, segments: impl IntoIterator<Item = &'a str>, directory: bool) -> Url {
        let mut url = self.base.clone();
        // Can't fail: the base is checked to be a hierarchical http(s) URL.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
            if directory {
                path.push("");
            }
        }
        url
    }

    fn directory_url(&self, segments: &[String]) -> Url {
        self.url_for(segments.iter().map(String::as_str), true)
    }

    fn file_url(&self, path: &RepositoryPath) -> Url {
        self.url_for(path.segments().iter().map(String::as_str), false)
    }

    fn info_url(&self, path: &RepositoryPath) -> Url {
        let segments = path.segments();
        let info = format!("{}{INFO_SUFFIX}", path.name());
        let parents = segments[..segments.len() - 1].iter().map(String::as_str);
        self.url_for(parents.chain([info.as_str()]), false)
    }

    fn request(&self, url: Url) -> RequestBuilder {
        let request = self.client.get(url);
        match &self.credentials {
            Some((username, password)) => request.basic_auth(username, Some(password)),
            None => request,
        }
    }

    /// Send a request, retrying only when no connection could be made.
    /// `bounded` requests must also finish within the timeout as a whole.
    fn send(&self, url: &Url, bounded: bool) -> Result<Response> {
        let mut attempt = 0;
        loop {
            let mut request = self.request(url.clone());
            if bounded {
                request = request.timeout(self.timeout);
            }
            match request.send() {
                Ok(response) => return Ok(response),
                Err(e) if e.is_connect() && attempt < MAX_CONNECT_RETRIES => {
                    attempt += 1;
                    warn!(%url, attempt, error = %e, "connection failed, retrying");
                },
                Err(e) => return Err(e).or_raise(|| ErrorKind::Network),
            }
        }
    }

    /// Only `200 OK` is a success; anything else is surfaced to the caller.
    fn expect_ok(response: Response, what: impl std::fmt::Display) -> Result<Response> {
        match response.status() {
            StatusCode::OK => Ok(response),
            StatusCode::NOT_FOUND => exn::bail!(ErrorKind::NotFound(what.to_string())),
            status => exn::bail!(ErrorKind::TransferFailed(status.as_u16())),
        }
    }

    fn list_directory(&self, directory: &[String]) -> Result<Vec<String>> {
        let url = self.directory_url(directory);
        debug!(%url, "listing directory");
        let response = Self::expect_ok(self.send(&url, true)?, directory.join("/"))?;
        let body = response.text().or_raise(|| ErrorKind::Network)?;
        Ok(extract_links(&body))
    }
}

impl Catalog for HttpCatalog {
    fn name(&self) -> &str {
        self.base.as_str()
    }

    #[instrument(skip(self))]
    fn list(&self, prefix: Option<&RepositoryPath>, recursive: bool) -> Result<Vec<RepositoryPath>> {
        let mut pending = vec![prefix.map(|p| p.segments().to_vec()).unwrap_or_default()];
        let mut found = Vec::new();
        while let Some(directory) = pending.pop() {
            for link in self.list_directory(&directory)? {
                let (name, is_directory) = match link.strip_suffix('/') {
                    Some(name) => (name, true),
                    None => (link.as_str(), false),
                };
                if name.contains('/') {
                    debug!(%link, "skipping link outside the current directory");
                    continue;
                }
                let mut segments = directory.clone();
                segments.push(name.to_string());
                if is_directory {
                    if recursive {
                        pending.push(segments);
                    }
                } else if !name.ends_with(INFO_SUFFIX) {
                    match RepositoryPath::new(segments) {
                        Ok(path) => found.push(path),
                        Err(e) => debug!(%link, error = ?e, "skipping unusable link"),
                    }
                }
            }
        }
        Ok(found)
    }

    #[instrument(skip(self, path), fields(path = %path))]
    fn metadata(&self, path: &RepositoryPath) -> Result<FileMetadata> {
        let response = self.send(&self.info_url(path), true)?;
        if response.status() != StatusCode::OK {
            debug!(status = response.status().as_u16(), "no metadata published");
            return Ok(FileMetadata::default());
        }
        let body = response.bytes().or_raise(|| ErrorKind::Network)?;
        serde_json::from_slice(&body).or_raise(|| ErrorKind::InvalidMetadata)
    }

    #[instrument(skip(self, path), fields(path = %path))]
    fn fetch(&self, path: &RepositoryPath) -> Result<Download> {
        let response = Self::expect_ok(self.send(&self.file_url(path), false)?, path)?;
        let size = response.content_length().unwrap_or(0);
        debug!(size, "download started");
        Ok(Download::new(size, response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use rstest::rstest;
    use std::collections::BTreeSet;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc::{self, Sender};
    use std::thread;
    use std::time::Instant;

    const ROOT_INDEX: &str = r#"<html><body>
        <a href="?C=N;O=D">Name</a> <a href="/">Parent Directory</a>
        <a href="demo/">demo/</a> <a href="readme.txt">readme.txt</a> <a href="readme.txt.info">readme.txt.info</a>
        </body></html>"#;
    const DEMO_INDEX: &str = r#"<html><body>
        <a href="/newsf/">Parent Directory</a>
        <a href="a.txt">a.txt</a> <a href="a.txt.info">a.txt.info</a>
        <a href="nested/">nested/</a> <a href="http://elsewhere.example/x">elsewhere</a>
        </body></html>"#;
    const NESTED_INDEX: &str = r#"<html><body><a href="deep.tar.gz">deep.tar.gz</a></body></html>"#;

    fn catalog(server: &MockServer) -> HttpCatalog {
        HttpCatalog::builder().server(server.url("/newsf/")).build().unwrap()
    }

    fn mock_tree(server: &MockServer) {
        for (path, body) in [("/newsf/", ROOT_INDEX), ("/newsf/demo/", DEMO_INDEX), ("/newsf/demo/nested/", NESTED_INDEX)] {
            server.mock(|when, then| {
                when.method(GET).path(path);
                then.status(200).header("content-type", "text/html").body(body);
            });
        }
    }

    fn as_strings(paths: Vec<RepositoryPath>) -> BTreeSet<String> {
        paths.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_list_root() {
        let server = MockServer::start();
        mock_tree(&server);
        let paths = catalog(&server).list(None, false).unwrap();
        assert_eq!(as_strings(paths), BTreeSet::from(["readme.txt".to_string()]));
    }

    #[test]
    fn test_list_recursive() {
        let server = MockServer::start();
        mock_tree(&server);
        let paths = catalog(&server).list(None, true).unwrap();
        assert_eq!(
            as_strings(paths),
            BTreeSet::from(["readme.txt".to_string(), "demo/a.txt".to_string(), "demo/nested/deep.tar.gz".to_string()])
        );
    }

    #[test]
    fn test_list_prefix() {
        let server = MockServer::start();
        mock_tree(&server);
        let prefix: RepositoryPath = "demo".parse().unwrap();
        let paths = catalog(&server).list(Some(&prefix), false).unwrap();
        assert_eq!(as_strings(paths), BTreeSet::from(["demo/a.txt".to_string()]));
    }

    #[test]
    fn test_list_missing_directory() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/newsf/nope/");
            then.status(404);
        });
        let prefix: RepositoryPath = "nope".parse().unwrap();
        let err = catalog(&server).list(Some(&prefix), true).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[test]
    fn test_metadata() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/newsf/demo/a.txt.info");
            then.status(200).body(r#"{"datetime": "2020-01-01 00:00:00", "tags": ["x"], "size": 5}"#);
        });
        let metadata = catalog(&server).metadata(&"demo/a.txt".parse().unwrap()).unwrap();
        mock.assert();
        assert_eq!(metadata.datetime.as_deref(), Some("2020-01-01 00:00:00"));
        assert_eq!(metadata.tags(), ["x"]);
        assert_eq!(metadata.extra["size"], 5);
    }

    #[rstest]
    #[case(404)]
    #[case(500)]
    fn test_metadata_unavailable_is_empty(#[case] status: u16) {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/newsf/demo/a.txt.info");
            then.status(status);
        });
        let metadata = catalog(&server).metadata(&"demo/a.txt".parse().unwrap()).unwrap();
        assert_eq!(metadata, FileMetadata::default());
    }

    #[test]
    fn test_metadata_invalid_json() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/newsf/demo/a.txt.info");
            then.status(200).body("<html>not json</html>");
        });
        let err = catalog(&server).metadata(&"demo/a.txt".parse().unwrap()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidMetadata));
    }

    #[test]
    fn test_metadata_with_wrongly_typed_fields() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/newsf/demo/a.txt.info");
            then.status(200).body(r#"{"datetime": 20200101, "title": 5}"#);
        });
        let metadata = catalog(&server).metadata(&"demo/a.txt".parse().unwrap()).unwrap();
        assert_eq!(metadata.modified(), None);
        assert_eq!(metadata.title(), "");
        assert_eq!(metadata.extra["datetime"], 20200101);
    }

    /// Serves one download over raw TCP: a header promising `promised` bytes,
    /// then `chunks` written `pause` apart, then silence until the returned
    /// sender is dropped.
    fn raw_server(promised: usize, chunks: &'static [&'static [u8]], pause: Duration) -> (String, Sender<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/newsf/", listener.local_addr().unwrap());
        let (hold, release) = mpsc::channel::<()>();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut byte = [0u8; 1];
            while !request.ends_with(b"\r\n\r\n") && stream.read(&mut byte).unwrap() == 1 {
                request.push(byte[0]);
            }
            write!(stream, "HTTP/1.1 200 OK\r\nContent-Length: {promised}\r\n\r\n").unwrap();
            for chunk in chunks {
                stream.write_all(chunk).unwrap();
                stream.flush().unwrap();
                thread::sleep(pause);
            }
            // Keep the connection open without sending anything.
            let _ = release.recv();
        });
        (url, hold)
    }

    #[test]
    fn test_stalled_download_times_out() {
        let (url, _hold) = raw_server(100, &[b"abc"], Duration::ZERO);
        let catalog = HttpCatalog::builder().server(url).timeout(Duration::from_millis(500)).build().unwrap();
        let started = Instant::now();
        let download = catalog.fetch(&"demo/a.txt".parse().unwrap()).unwrap();
        let mut body = Vec::new();
        let err = download.write_to(&mut body, None).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Network), "unexpected error: {err:?}");
        assert_eq!(body, b"abc");
        assert!(started.elapsed() < Duration::from_secs(5), "took {:?}", started.elapsed());
    }

    #[test]
    fn test_slow_download_is_not_cut_off() {
        // Longer than the timeout in total, but never idle for that long.
        const CHUNKS: &[&[u8]] = &[b"a", b"b", b"c", b"d", b"e", b"f"];
        let (url, _hold) = raw_server(CHUNKS.len(), CHUNKS, Duration::from_millis(250));
        let catalog = HttpCatalog::builder().server(url).timeout(Duration::from_secs(1)).build().unwrap();
        let download = catalog.fetch(&"demo/a.txt".parse().unwrap()).unwrap();
        let mut body = Vec::new();
        download.write_to(&mut body, None).unwrap();
        assert_eq!(body, b"abcdef");
    }

    #[test]
    fn test_fetch() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/newsf/demo/a.txt");
            then.status(200).body("hello world");
        });
        let download = catalog(&server).fetch(&"demo/a.txt".parse().unwrap()).unwrap();
        assert_eq!(download.size, 11);
        let mut body = Vec::new();
        download.write_to(&mut body, None).unwrap();
        assert_eq!(body, b"hello world");
    }

    #[rstest]
    #[case(404, |kind: &ErrorKind| matches!(kind, ErrorKind::NotFound(p) if p == "demo/a.txt"))]
    #[case(403, |kind: &ErrorKind| matches!(kind, ErrorKind::TransferFailed(403)))]
    #[case(503, |kind: &ErrorKind| matches!(kind, ErrorKind::TransferFailed(503)))]
    fn test_fetch_status(#[case] status: u16, #[case] check: fn(&ErrorKind) -> bool) {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/newsf/demo/a.txt");
            then.status(status);
        });
        let err = catalog(&server).fetch(&"demo/a.txt".parse().unwrap()).unwrap_err();
        assert!(check(&*err), "unexpected error: {err:?}");
    }

    #[test]
    fn test_basic_auth() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            // base64("user:pass")
            when.method(GET).path("/newsf/demo/a.txt.info").header("authorization", "Basic dXNlcjpwYXNz");
            then.status(200).body("{}");
        });
        let catalog = HttpCatalog::builder().server(server.url("/newsf")).credentials("user", "pass").build().unwrap();
        catalog.metadata(&"demo/a.txt".parse().unwrap()).unwrap();
        mock.assert();
    }

    #[test]
    fn test_connection_refused() {
        // Nothing listens on port 1; every attempt fails to connect.
        let catalog = HttpCatalog::builder().server("http://127.0.0.1:1/").build().unwrap();
        let err = catalog.fetch(&"demo/a.txt".parse().unwrap()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Network));
    }

    #[rstest]
    #[case("http://host/newsf/", "demo/wtest file.txt", "http://host/newsf/demo/wtest%20file.txt")]
    #[case("http://host/newsf", "demo/a.txt", "http://host/newsf/demo/a.txt")]
    #[case("http://host", "a.txt", "http://host/a.txt")]
    fn test_file_url(#[case] server: &str, #[case] path: &str, #[case] expected: &str) {
        let catalog = HttpCatalog::builder().server(server).build().unwrap();
        assert_eq!(catalog.file_url(&path.parse().unwrap()).as_str(), expected);
    }

    #[test]
    fn test_info_and_directory_urls() {
        let catalog = HttpCatalog::builder().server("http://host/newsf/").build().unwrap();
        let path: RepositoryPath = "demo/a.txt".parse().unwrap();
        assert_eq!(catalog.info_url(&path).as_str(), "http://host/newsf/demo/a.txt.info");
        assert_eq!(catalog.directory_url(&[]).as_str(), "http://host/newsf/");
        assert_eq!(catalog.directory_url(&["demo".to_string()]).as_str(), "http://host/newsf/demo/");
    }

    #[rstest]
    #[case("not a url")]
    #[case("ftp://host/files/")]
    #[case("mailto:someone@example.com")]
    fn test_invalid_server(#[case] server: &str) {
        let err = HttpCatalog::builder().server(server).build().unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidUrl(_)));
    }
}
