//! Fetching the engine and base image, with retries and a local cache

use crate::{
    errors::SetupError,
    sources::Source,
    storage::{default_cache_dir, ContentDigest, FileStorage, StorageWriter},
};
use reqwest::blocking;
use std::{
    fs,
    fs::File,
    io,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};
use tempfile::NamedTempFile;
use url::Url;

/// Number of attempts per download, unless configured otherwise
pub const DEFAULT_RETRIES: u32 = 5;

/// Pause between failed attempts, unless configured otherwise
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Limit on establishing each connection, unless configured otherwise
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Builder for configuring custom [Client] instances
#[derive(Debug)]
pub struct ClientBuilder {
    req: blocking::ClientBuilder,
    cache_dir: Option<PathBuf>,
    ephemeral: bool,
    offline: bool,
    retries: u32,
    retry_delay: Duration,
    connect_timeout: Option<Duration>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        ClientBuilder::new()
    }
}

impl ClientBuilder {
    /// Start constructing a custom download client
    pub fn new() -> Self {
        let req = blocking::Client::builder()
            .user_agent(Client::default_user_agent())
            .timeout(None::<Duration>);
        ClientBuilder {
            req,
            cache_dir: None,
            ephemeral: false,
            offline: false,
            retries: DEFAULT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
        }
    }

    /// Change the cache directory
    ///
    /// Downloads are stored here by content digest, along with a small link
    /// file per URL. The default directory can be determined with
    /// [Client::default_cache_dir()]
    pub fn cache_dir(mut self, dir: &Path) -> Self {
        self.cache_dir = Some(dir.to_path_buf());
        self
    }

    /// Don't keep downloads after they've been used
    ///
    /// Each download lands in an anonymous temporary file which is deleted
    /// once the caller is done with it.
    pub fn ephemeral_cache(mut self) -> Self {
        self.ephemeral = true;
        self
    }

    /// Never use the network, only the cache and `file://` sources
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    /// Total number of attempts for each download
    pub fn retries(mut self, attempts: u32) -> Self {
        self.retries = attempts.max(1);
        self
    }

    /// Pause between failed attempts
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set a timeout for each network request
    ///
    /// This timeout applies from the beginning of a GET request until the
    /// last byte has been received. By default there is no timeout, since
    /// base images are large and links can be slow. A request that times
    /// out counts as a failed attempt.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.req = self.req.timeout(timeout);
        self
    }

    /// Set a timeout for only the initial connect phase of each request
    ///
    /// Defaults to [DEFAULT_CONNECT_TIMEOUT]. `None` waits indefinitely.
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Ignore any proxy configured in the environment
    pub fn no_proxy(mut self) -> Self {
        self.req = self.req.no_proxy();
        self
    }

    /// Sets the `User-Agent` header used by this client
    pub fn user_agent(mut self, value: &str) -> Self {
        self.req = self.req.user_agent(value.to_owned());
        self
    }

    /// Construct a Client using the parameters from this Builder
    pub fn build(self) -> Result<Client, SetupError> {
        let storage = if self.ephemeral {
            log::info!("using ephemeral download storage");
            None
        } else {
            let cache_dir = match self.cache_dir {
                Some(dir) => dir,
                None => Client::default_cache_dir()?,
            };
            log::info!("using cache directory {:?}", cache_dir);
            Some(FileStorage::new(cache_dir))
        };
        let req = match self.connect_timeout {
            Some(timeout) => self.req.connect_timeout(timeout),
            None => self.req,
        };
        Ok(Client {
            storage,
            offline: self.offline,
            retries: self.retries,
            retry_delay: self.retry_delay,
            req: req.build()?,
        })
    }
}

/// A finished download, either in the cache or in a temporary file
///
/// Temporary files are removed when this drops.
#[derive(Debug)]
pub struct Download {
    url: Url,
    digest: ContentDigest,
    path: PathBuf,
    _temp: Option<NamedTempFile>,
}

impl Download {
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn digest(&self) -> &ContentDigest {
        &self.digest
    }

    /// Local file holding the downloaded bytes
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Download clients fetch payloads over HTTP(S) or from local files
///
/// Each client has its retry settings and an optional cache directory. Every
/// attempt restarts the transfer from the beginning.
#[derive(Clone, Debug)]
pub struct Client {
    storage: Option<FileStorage>,
    req: blocking::Client,
    offline: bool,
    retries: u32,
    retry_delay: Duration,
}

impl Client {
    /// Construct a new download client with default options
    pub fn new() -> Result<Client, SetupError> {
        Client::builder().build()
    }

    /// Construct a download client with custom options, via ClientBuilder
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Return the default `User-Agent` that we use if no other is set
    pub fn default_user_agent() -> &'static str {
        concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"))
    }

    /// Determine the per-user cache directory used when none is configured
    pub fn default_cache_dir() -> Result<PathBuf, SetupError> {
        default_cache_dir()
    }

    /// Total attempts per download
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Fetch a payload into memory
    pub fn fetch(&self, url: &str) -> Result<Vec<u8>, SetupError> {
        let download = self.download(&parse_url(url)?.into())?;
        Ok(fs::read(download.path())?)
    }

    /// Fetch a payload into a file, creating parent directories as needed
    pub fn fetch_to(&self, url: &str, dest: &Path) -> Result<ContentDigest, SetupError> {
        let download = self.download(&parse_url(url)?.into())?;
        copy_download(&download, dest)?;
        Ok(download.digest().clone())
    }

    /// Fetch a [Source], from the cache if possible
    ///
    /// Transport failures and empty payloads are retried up to the
    /// configured number of attempts, then reported as
    /// [SetupError::DownloadFailure]. A digest mismatch is reported right
    /// away.
    pub fn download(&self, source: &Source) -> Result<Download, SetupError> {
        let url = &source.url;
        if let Some(storage) = &self.storage {
            if let Some((digest, path)) = storage.lookup(url)? {
                if source.digest.as_ref().map_or(true, |d| d == &digest) {
                    log::debug!("{} is already cached as {}", url, digest);
                    return Ok(Download {
                        url: url.clone(),
                        digest,
                        path,
                        _temp: None,
                    });
                }
                log::info!("cached copy of {} has an unexpected digest", url);
            }
        }

        match url.scheme() {
            "file" => (),
            "http" | "https" if self.offline => {
                return Err(SetupError::DownloadInOfflineMode(url.clone()))
            }
            "http" | "https" => (),
            _ => return Err(SetupError::UnsupportedScheme(url.clone())),
        }

        let mut attempt = 0;
        let mut writer = loop {
            attempt += 1;
            log::info!("{} downloading, attempt {}/{}", url, attempt, self.retries);
            match self.attempt(url) {
                Ok(writer) => break writer,
                Err(err) => {
                    log::warn!("{} attempt {} failed: {}", url, attempt, err);
                    if attempt >= self.retries {
                        return Err(SetupError::DownloadFailure {
                            url: url.clone(),
                            attempts: attempt,
                            source: Box::new(err),
                        });
                    }
                    thread::sleep(self.retry_delay);
                }
            }
        };

        let digest = writer.finalize()?;
        log::info!("{} downloaded, {} bytes, {}", url, writer.len(), digest);
        if let Some(expected) = &source.digest {
            if expected != &digest {
                return Err(SetupError::ContentDigestMismatch {
                    url: url.clone(),
                    expected: expected.clone(),
                    found: digest,
                });
            }
        }

        match &self.storage {
            Some(storage) => {
                let (digest, path) = storage.commit_write(writer, url)?;
                Ok(Download {
                    url: url.clone(),
                    digest,
                    path,
                    _temp: None,
                })
            }
            None => {
                let temp = writer.into_temp()?;
                Ok(Download {
                    url: url.clone(),
                    digest,
                    path: temp.path().to_path_buf(),
                    _temp: Some(temp),
                })
            }
        }
    }

    fn begin_write(&self) -> Result<StorageWriter, SetupError> {
        match &self.storage {
            Some(storage) => storage.begin_write(),
            None => Ok(StorageWriter::new(NamedTempFile::new()?)),
        }
    }

    /// One complete transfer into a fresh temp file
    ///
    /// On any error the writer drops here, taking its temp file with it.
    fn attempt(&self, url: &Url) -> Result<StorageWriter, SetupError> {
        let mut writer = self.begin_write()?;
        if url.scheme() == "file" {
            let path = url
                .to_file_path()
                .map_err(|()| SetupError::UnsupportedScheme(url.clone()))?;
            io::copy(&mut File::open(path)?, &mut writer)?;
        } else {
            let mut response = self.req.get(url.clone()).send()?.error_for_status()?;
            response.copy_to(&mut writer)?;
        }
        if writer.is_empty() {
            return Err(SetupError::EmptyDownload(url.clone()));
        }
        Ok(writer)
    }
}

fn parse_url(url: &str) -> Result<Url, SetupError> {
    Url::parse(url).map_err(|err| SetupError::InvalidUrl(url.to_owned(), err))
}

/// Copy a finished download to `dest`, creating parent directories
pub(crate) fn copy_download(download: &Download, dest: &Path) -> Result<(), SetupError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(download.path(), dest)?;
    Ok(())
}
