//! Upstream release metadata.
//!
//! The vendor publishes one of two JSON shapes. The nested shape lists every
//! downloadable file as its own entry:
//!
//! ```json
//! {
//!   "currentRelease": "1.2.3",
//!   "releases": [
//!     {"version": "1.2.3", "updateTo": {"url": ".../kiro_1.2.3_amd64.deb", "pub_date": "..."}},
//!     {"version": "1.2.3", "updateTo": {"url": ".../certificate.pem"}},
//!     {"version": "1.2.3", "updateTo": {"url": ".../signature.bin"}}
//!   ]
//! }
//! ```
//!
//! The older flat shape describes a single release with `version`,
//! `pub_date`, `url`, `certificate` and `signature` keys. Both are decoded
//! into [`ReleaseInfo`] here so nothing downstream cares which one was served.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::models::{ControlDefaults, PackageRecord};
use crate::version::parse_version;

pub const DEFAULT_METADATA_URL: &str =
    "https://prod.download.desktop.kiro.dev/stable/metadata-linux-x64-deb-stable.json";

const FLAT_REQUIRED_FIELDS: [&str; 5] = ["version", "pub_date", "url", "certificate", "signature"];

/// One upstream release and the URLs of its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub version: String,
    pub pub_date: String,
    pub deb_url: String,
    pub certificate_url: Option<String>,
    pub signature_url: Option<String>,
    pub notes: Option<String>,
    /// Expected SHA256 of the `.deb`, when upstream publishes one.
    pub sha256: Option<String>,
}

impl ReleaseInfo {
    /// A fresh record for this release, with control fields from `defaults`.
    pub fn to_record(&self, defaults: &ControlDefaults) -> PackageRecord {
        let mut record =
            PackageRecord::new(defaults, &self.version, &self.pub_date, &self.deb_url);
        record.certificate_url = self.certificate_url.clone();
        record.signature_url = self.signature_url.clone();
        record.notes = self.notes.clone();
        if let Some(sha256) = &self.sha256 {
            record.sha256_hash = sha256.to_lowercase();
        }
        record
    }
}

/// Kind of file behind a release URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlKind {
    Package,
    Certificate,
    Signature,
    Other,
}

impl UrlKind {
    pub fn classify(url: &str) -> Self {
        if url.ends_with(".deb") {
            UrlKind::Package
        } else if url.ends_with("certificate.pem") || url.contains("certificate") {
            UrlKind::Certificate
        } else if url.ends_with("signature.bin") || url.contains("signature") {
            UrlKind::Signature
        } else {
            UrlKind::Other
        }
    }
}

#[derive(Debug, Deserialize)]
struct NestedMetadata {
    #[serde(default)]
    releases: Vec<NestedEntry>,
    #[serde(rename = "currentRelease", default)]
    current_release: Value,
}

#[derive(Debug, Deserialize)]
struct NestedEntry {
    #[serde(default)]
    version: Option<String>,
    #[serde(rename = "updateTo", default)]
    update_to: Option<UpdateTo>,
}

#[derive(Debug, Default, Deserialize)]
struct UpdateTo {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    pub_date: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FlatMetadata {
    version: String,
    pub_date: String,
    url: String,
    certificate: String,
    signature: String,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    sha256: Option<String>,
}

/// Decoded metadata document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseMetadata {
    /// Every release with a `.deb`, highest version first, and the version
    /// upstream names as current.
    Nested {
        releases: Vec<ReleaseInfo>,
        current: Option<String>,
    },
    Flat(ReleaseInfo),
}

impl ReleaseMetadata {
    /// Decode either shape. The nested shape is chosen when both `releases`
    /// and `currentRelease` are present.
    pub fn parse(document: &Value) -> Result<Self> {
        let object = document
            .as_object()
            .ok_or_else(|| Error::Metadata("metadata is not a JSON object".to_string()))?;

        if object.contains_key("releases") && object.contains_key("currentRelease") {
            let nested: NestedMetadata = serde_json::from_value(document.clone())
                .map_err(|e| Error::Metadata(format!("invalid nested metadata: {}", e)))?;
            return Self::from_nested(nested);
        }

        let missing: Vec<&str> = FLAT_REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|field| !object.contains_key(*field))
            .collect();
        if !missing.is_empty() {
            return Err(Error::Metadata(format!(
                "Missing required fields in metadata: {}",
                missing.join(", ")
            )));
        }
        let flat: FlatMetadata = serde_json::from_value(document.clone())
            .map_err(|e| Error::Metadata(format!("invalid metadata: {}", e)))?;
        info!(version = %flat.version, "Parsed flat release metadata");
        Ok(ReleaseMetadata::Flat(ReleaseInfo {
            version: flat.version,
            pub_date: flat.pub_date,
            deb_url: flat.url,
            certificate_url: Some(flat.certificate).filter(|u| !u.is_empty()),
            signature_url: Some(flat.signature).filter(|u| !u.is_empty()),
            notes: flat.notes.filter(|n| !n.is_empty()),
            sha256: flat.sha256.filter(|s| !s.is_empty()),
        }))
    }

    fn from_nested(nested: NestedMetadata) -> Result<Self> {
        if nested.releases.is_empty() {
            return Err(Error::Metadata("No releases found in metadata".to_string()));
        }

        // Grouped by version, in order of first appearance.
        let mut grouped: Vec<(String, UpdateTo, Vec<String>)> = Vec::new();
        for entry in nested.releases {
            let (Some(version), Some(update)) = (entry.version, entry.update_to) else {
                continue;
            };
            if version.is_empty() {
                continue;
            }
            let index = match grouped.iter().position(|(v, _, _)| *v == version) {
                Some(index) => index,
                None => {
                    grouped.push((version, UpdateTo::default(), Vec::new()));
                    grouped.len() - 1
                }
            };
            let (_, details, urls) = &mut grouped[index];
            if details.pub_date.is_none() {
                details.pub_date = update.pub_date;
            }
            if details.notes.is_none() {
                details.notes = update.notes;
            }
            if let Some(url) = update.url.filter(|u| !u.is_empty()) {
                urls.push(url);
            }
        }

        let mut releases = Vec::new();
        for (version, details, urls) in grouped {
            let mut deb_url = None;
            let mut certificate_url = None;
            let mut signature_url = None;
            for url in urls {
                match UrlKind::classify(&url) {
                    UrlKind::Package => deb_url = Some(url),
                    UrlKind::Certificate => certificate_url = Some(url),
                    UrlKind::Signature => signature_url = Some(url),
                    UrlKind::Other => debug!(%version, %url, "Ignoring unrecognised release URL"),
                }
            }
            let Some(deb_url) = deb_url else {
                warn!(%version, "No .deb file found for version");
                continue;
            };
            releases.push(ReleaseInfo {
                version,
                pub_date: details.pub_date.unwrap_or_default(),
                deb_url,
                certificate_url,
                signature_url,
                notes: details.notes.filter(|n| !n.is_empty()),
                sha256: None,
            });
        }

        if releases.is_empty() {
            return Err(Error::Metadata(
                "No valid release information could be parsed".to_string(),
            ));
        }
        releases.sort_by(|a, b| parse_version(&b.version).cmp(&parse_version(&a.version)));
        info!(count = releases.len(), "Parsed nested release metadata");

        let current = match nested.current_release {
            Value::String(version) => Some(version),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        };
        Ok(ReleaseMetadata::Nested { releases, current })
    }

    /// Every release in the document.
    pub fn releases(&self) -> &[ReleaseInfo] {
        match self {
            ReleaseMetadata::Nested { releases, .. } => releases,
            ReleaseMetadata::Flat(release) => std::slice::from_ref(release),
        }
    }

    /// The release to mirror: the one upstream names as current when it has
    /// a package, otherwise the highest version.
    pub fn current_release(&self) -> Result<ReleaseInfo> {
        match self {
            ReleaseMetadata::Flat(release) => Ok(release.clone()),
            ReleaseMetadata::Nested { releases, current } => {
                if let Some(current) = current {
                    if let Some(release) = releases.iter().find(|r| &r.version == current) {
                        return Ok(release.clone());
                    }
                    warn!(current = %current, "Current release has no package, using highest version");
                }
                releases
                    .first()
                    .cloned()
                    .ok_or_else(|| Error::Metadata("No release information found".to_string()))
            }
        }
    }
}

/// Fetches and decodes the vendor metadata document.
#[derive(Debug, Clone)]
pub struct MetadataClient {
    http: HttpClient,
    url: String,
}

impl MetadataClient {
    pub fn new(http: HttpClient, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The raw metadata document.
    pub async fn fetch(&self) -> Result<Value> {
        info!(url = %self.url, "Fetching release metadata");
        let response = self.http.get(&self.url).await?;
        let document = response.json::<Value>().await.map_err(|source| Error::Request {
            url: self.url.clone(),
            source,
        })?;
        debug!(url = %self.url, "Fetched release metadata");
        Ok(document)
    }

    pub async fn fetch_metadata(&self) -> Result<ReleaseMetadata> {
        ReleaseMetadata::parse(&self.fetch().await?)
    }

    /// The release upstream currently ships.
    pub async fn current_release(&self) -> Result<ReleaseInfo> {
        let release = self.fetch_metadata().await?.current_release()?;
        info!(version = %release.version, "Current upstream release");
        Ok(release)
    }
}
