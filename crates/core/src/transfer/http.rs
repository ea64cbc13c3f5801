//! HTTP(S) transfers, also used for OPeNDAP endpoints.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

use super::error::TransferError;
use super::traits::{TransferOptions, TransferSession, TransferStrategy};
use super::validate_settings;

const FILENAME_KEY: &str = "filename=";
const ACCEPTED_TYPES: [&str; 2] = ["/x-netcdf", "/octet-stream"];

/// Downloads over HTTP with optional basic authentication.
///
/// Recognized options:
/// - `username`, `password`: basic auth credentials (both or neither)
/// - `invalid_status_codes`: comma separated status codes meaning the URL
///   is obsolete, in addition to 404
pub struct HttpTransfer {
    client: Client,
}

impl HttpTransfer {
    pub fn new(timeout: Duration) -> Result<Self, TransferError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransferError::InvalidSetting {
                key: "http_client".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }

    fn authenticate(
        request: RequestBuilder,
        options: &TransferOptions,
    ) -> Result<RequestBuilder, TransferError> {
        if let Some(auth_type) = options.get("authentication_type") {
            return Err(TransferError::InvalidSetting {
                key: "authentication_type".to_string(),
                message: format!("unsupported value {:?}", auth_type),
            });
        }
        if options.contains_key("username") || options.contains_key("password") {
            validate_settings(options, &["username", "password"])?;
            let username = options.get("username").map(String::as_str).unwrap_or_default();
            return Ok(request.basic_auth(username, options.get("password")));
        }
        Ok(request)
    }

    /// Fetch the size with a HEAD request when the GET response has no
    /// Content-Length.
    async fn head_size(&self, url: &Url, options: &TransferOptions) -> Option<u64> {
        let request = Self::authenticate(self.client.head(url.clone()), options).ok()?;
        match request.send().await {
            Ok(response) => header_size(response.headers()),
            Err(e) => {
                debug!("HEAD request to {} failed: {}", url, e);
                None
            }
        }
    }
}

fn request_error(uri: &str, e: reqwest::Error) -> TransferError {
    if e.is_timeout() {
        TransferError::Timeout {
            uri: uri.to_string(),
        }
    } else {
        TransferError::Connection {
            uri: uri.to_string(),
            message: e.to_string(),
        }
    }
}

/// Parse the `invalid_status_codes` option.
fn invalid_status_codes(options: &TransferOptions) -> Result<HashSet<u16>, TransferError> {
    let mut codes = HashSet::from([StatusCode::NOT_FOUND.as_u16()]);
    if let Some(raw) = options.get("invalid_status_codes") {
        for code in raw.split(',').map(str::trim).filter(|c| !c.is_empty()) {
            let code = code.parse::<u16>().map_err(|_| TransferError::InvalidSetting {
                key: "invalid_status_codes".to_string(),
                message: format!("{:?} is not a status code", code),
            })?;
            codes.insert(code);
        }
    }
    Ok(codes)
}

fn header_size(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Keep only the last path component of a server supplied name.
fn sanitize(name: &str) -> Option<String> {
    Path::new(name.trim())
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
}

/// Determine the file name from the response headers.
///
/// Content-Disposition `filename=` wins. Without that header, the last URL
/// segment is used when it ends in `.nc` and the content type is netCDF or
/// binary.
pub(crate) fn file_name_from_headers(url: &Url, headers: &HeaderMap) -> Option<String> {
    if let Some(disposition) = headers.get(CONTENT_DISPOSITION) {
        let disposition = disposition.to_str().ok()?;
        let names: Vec<&str> = disposition
            .split(';')
            .map(str::trim)
            .filter(|attr| attr.starts_with(FILENAME_KEY))
            .collect();
        return match names.as_slice() {
            [single] => sanitize(single.trim_start_matches(FILENAME_KEY).trim_matches('"')),
            [] => None,
            _ => {
                error!("Multiple file names in Content-Disposition of {}", url);
                None
            }
        };
    }

    let content_type = headers.get(CONTENT_TYPE)?.to_str().ok()?.to_lowercase();
    let last_segment = url.path_segments()?.next_back()?;
    if ACCEPTED_TYPES.iter().any(|t| content_type.contains(t)) && last_segment.ends_with(".nc") {
        sanitize(last_segment)
    } else {
        None
    }
}

#[async_trait]
impl TransferStrategy for HttpTransfer {
    fn name(&self) -> &str {
        "http"
    }

    async fn connect(
        &self,
        uri: &str,
        options: &TransferOptions,
    ) -> Result<Box<dyn TransferSession>, TransferError> {
        let invalid = invalid_status_codes(options)?;
        let request = Self::authenticate(self.client.get(uri), options)?;
        let response = request.send().await.map_err(|e| request_error(uri, e))?;

        let status = response.status();
        if invalid.contains(&status.as_u16()) {
            return Err(TransferError::Obsolete {
                uri: uri.to_string(),
                reason: status.to_string(),
            });
        }
        if !status.is_success() {
            return Err(TransferError::Status {
                uri: uri.to_string(),
                status: status.as_u16(),
            });
        }

        let file_name = file_name_from_headers(response.url(), response.headers());
        if file_name.is_none() {
            error!(
                "Could not find file name from HTTP response for {}: {}, {:?}",
                uri,
                status,
                response.headers()
            );
        }
        let size = match header_size(response.headers()) {
            Some(size) => Some(size),
            None => self.head_size(response.url(), options).await,
        };

        Ok(Box::new(HttpSession {
            uri: uri.to_string(),
            response,
            file_name,
            size,
        }))
    }
}

struct HttpSession {
    uri: String,
    response: Response,
    file_name: Option<String>,
    size: Option<u64>,
}

#[async_trait]
impl TransferSession for HttpSession {
    fn file_name(&self) -> Option<String> {
        self.file_name.clone()
    }

    fn remote_size(&self) -> Option<u64> {
        self.size
    }

    async fn chunk(&mut self) -> Result<Option<Vec<u8>>, TransferError> {
        match self.response.chunk().await {
            Ok(Some(bytes)) => Ok(Some(bytes.to_vec())),
            Ok(None) => Ok(None),
            Err(e) => Err(TransferError::Interrupted {
                uri: self.uri.clone(),
                message: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(reqwest::header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_file_name_from_content_disposition() {
        let url = Url::parse("https://a.example.org/get?id=3").unwrap();
        let map = headers(&[(CONTENT_DISPOSITION, "attachment; filename=\"sst.nc\"")]);
        assert_eq!(file_name_from_headers(&url, &map).as_deref(), Some("sst.nc"));
    }

    #[test]
    fn test_file_name_strips_directories() {
        let url = Url::parse("https://a.example.org/get").unwrap();
        let map = headers(&[(CONTENT_DISPOSITION, "attachment; filename=\"../../etc/x.nc\"")]);
        assert_eq!(file_name_from_headers(&url, &map).as_deref(), Some("x.nc"));
    }

    #[test]
    fn test_multiple_file_names() {
        let url = Url::parse("https://a.example.org/get").unwrap();
        let map = headers(&[(CONTENT_DISPOSITION, "attachment; filename=a.nc; filename=b.nc")]);
        assert!(file_name_from_headers(&url, &map).is_none());
    }

    #[test]
    fn test_file_name_from_url() {
        let url = Url::parse("https://a.example.org/data/sst_2020.nc").unwrap();
        let map = headers(&[(CONTENT_TYPE, "application/x-netcdf")]);
        assert_eq!(
            file_name_from_headers(&url, &map).as_deref(),
            Some("sst_2020.nc")
        );

        let map = headers(&[(CONTENT_TYPE, "text/html")]);
        assert!(file_name_from_headers(&url, &map).is_none());

        let url = Url::parse("https://a.example.org/data/sst_2020.zip").unwrap();
        let map = headers(&[(CONTENT_TYPE, "application/octet-stream")]);
        assert!(file_name_from_headers(&url, &map).is_none());
    }

    #[test]
    fn test_invalid_status_codes() {
        let mut options = TransferOptions::new();
        assert_eq!(invalid_status_codes(&options).unwrap(), HashSet::from([404]));

        options.insert("invalid_status_codes".to_string(), "403, 410".to_string());
        assert_eq!(
            invalid_status_codes(&options).unwrap(),
            HashSet::from([403, 404, 410])
        );

        options.insert("invalid_status_codes".to_string(), "gone".to_string());
        assert!(matches!(
            invalid_status_codes(&options),
            Err(TransferError::InvalidSetting { .. })
        ));
    }
}
