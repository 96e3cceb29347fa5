//! Repairs the storage hostname returned alongside a temporary credential.
//!
//! Providers occasionally hand back hosts such as
//! `bucket.bucket.cos.ap-chengdu.myqcloud.com` or a vendor domain repeated
//! twice. Each repair is an [`EndpointRule`] working on the host's dot-separated
//! labels; the resolver applies its rules until nothing changes, adds a scheme
//! when missing and validates the result.

use url::Url;

use crate::error::StorageError;

pub trait EndpointRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns the repaired labels, or `None` when the rule does not apply.
    /// A repair that does not remove at least one label is ignored.
    fn apply(&self, labels: &[String], bucket: &str) -> Option<Vec<String>>;
}

/// `bucket.bucket.rest` → `bucket.rest`.
pub struct DuplicateBucketRule;

impl EndpointRule for DuplicateBucketRule {
    fn name(&self) -> &'static str {
        "duplicate-bucket"
    }

    fn apply(&self, labels: &[String], bucket: &str) -> Option<Vec<String>> {
        if bucket.is_empty() {
            return None;
        }
        collapse_adjacent_repeat(labels, &split_labels(bucket))
    }
}

/// `vendor.domain.vendor.domain` → `vendor.domain`.
pub struct DuplicateDomainRule {
    domain: Vec<String>,
}

impl DuplicateDomainRule {
    pub fn new(domain: &str) -> Self {
        Self {
            domain: split_labels(domain),
        }
    }
}

impl EndpointRule for DuplicateDomainRule {
    fn name(&self) -> &'static str {
        "duplicate-domain"
    }

    fn apply(&self, labels: &[String], _bucket: &str) -> Option<Vec<String>> {
        collapse_adjacent_repeat(labels, &self.domain)
    }
}

/// `bucket.vendor.domain` → `vendor.domain`; the S3 client adds the bucket
/// back itself when it addresses the object.
pub struct BucketSubdomainRule {
    domain: Vec<String>,
}

impl BucketSubdomainRule {
    pub fn new(domain: &str) -> Self {
        Self {
            domain: split_labels(domain),
        }
    }
}

impl EndpointRule for BucketSubdomainRule {
    fn name(&self) -> &'static str {
        "bucket-subdomain"
    }

    fn apply(&self, labels: &[String], bucket: &str) -> Option<Vec<String>> {
        if bucket.is_empty() || self.domain.is_empty() {
            return None;
        }
        let bucket = split_labels(bucket);
        let mut pattern = bucket.clone();
        pattern.extend(self.domain.iter().cloned());
        let start = find_window(labels, &pattern)?;

        let mut repaired = labels[..start].to_vec();
        repaired.extend_from_slice(&labels[start + bucket.len()..]);
        Some(repaired)
    }
}

pub struct EndpointResolver {
    rules: Vec<Box<dyn EndpointRule>>,
    custom_domain: Option<String>,
}

impl EndpointResolver {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            custom_domain: None,
        }
    }

    /// Bucket de-duplication plus the duplicate-domain and bucket-subdomain
    /// repairs for each listed vendor domain.
    pub fn standard(vendor_domains: &[String]) -> Self {
        let mut resolver = Self::new().with_rule(DuplicateBucketRule);
        for domain in vendor_domains {
            resolver = resolver.with_rule(DuplicateDomainRule::new(domain));
        }
        for domain in vendor_domains {
            resolver = resolver.with_rule(BucketSubdomainRule::new(domain));
        }
        resolver
    }

    pub fn with_rule(mut self, rule: impl EndpointRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn with_custom_domain(mut self, custom_domain: Option<String>) -> Self {
        self.custom_domain = custom_domain
            .map(|d| d.trim().trim_end_matches('/').to_string())
            .filter(|d| !d.is_empty());
        self
    }

    pub fn custom_domain(&self) -> Option<&str> {
        self.custom_domain.as_deref()
    }

    /// Normalized, connectable base URL for `raw`. Idempotent.
    pub fn resolve(&self, raw: &str, bucket: &str) -> Result<String, StorageError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(StorageError::EndpointResolution(
                "provider returned an empty endpoint".to_string(),
            ));
        }

        let parts = EndpointParts::split(trimmed);
        let mut labels = split_labels(parts.host);
        if labels.iter().any(|l| l.is_empty()) {
            return Err(StorageError::EndpointResolution(format!(
                "malformed host in endpoint: {}",
                raw
            )));
        }

        // Only strictly shorter repairs are accepted, so this reaches a fixpoint.
        loop {
            let mut changed = false;
            for rule in &self.rules {
                match rule.apply(&labels, bucket) {
                    Some(repaired) if repaired.len() < labels.len() => {
                        tracing::info!(
                            "Endpoint rule {} repaired {} -> {}",
                            rule.name(),
                            labels.join("."),
                            repaired.join(".")
                        );
                        labels = repaired;
                        changed = true;
                    }
                    _ => {}
                }
            }
            if !changed {
                break;
            }
        }

        let endpoint = format!(
            "{}://{}{}{}",
            parts.scheme.unwrap_or("https"),
            labels.join("."),
            parts.port,
            parts.rest
        );
        let endpoint = endpoint.trim_end_matches('/').to_string();

        let parsed = Url::parse(&endpoint).map_err(|e| {
            StorageError::EndpointResolution(format!("{} is not a valid URL: {}", endpoint, e))
        })?;
        if parsed.host_str().is_none() {
            return Err(StorageError::EndpointResolution(format!(
                "{} has no host",
                endpoint
            )));
        }

        Ok(endpoint)
    }

    /// Public URL of `object_path`. A configured custom domain always wins.
    pub fn object_url(&self, endpoint: &str, object_path: &str) -> String {
        let path = object_path.trim_start_matches('/');
        match &self.custom_domain {
            Some(domain) if domain.contains("://") => format!("{}/{}", domain, path),
            Some(domain) => format!("https://{}/{}", domain, path),
            None => format!("{}/{}", endpoint.trim_end_matches('/'), path),
        }
    }
}

impl Default for EndpointResolver {
    fn default() -> Self {
        Self::new()
    }
}

struct EndpointParts<'a> {
    scheme: Option<&'a str>,
    host: &'a str,
    port: &'a str,
    rest: &'a str,
}

impl<'a> EndpointParts<'a> {
    fn split(raw: &'a str) -> Self {
        let (scheme, after_scheme) = match raw.find("://") {
            Some(idx) => (Some(&raw[..idx]), &raw[idx + 3..]),
            None => (None, raw),
        };
        let authority_end = after_scheme
            .find(['/', '?', '#'])
            .unwrap_or(after_scheme.len());
        let (authority, rest) = after_scheme.split_at(authority_end);
        let authority = authority.rsplit('@').next().unwrap_or(authority);
        let (host, port) = match authority.rfind(':') {
            Some(idx) => authority.split_at(idx),
            None => (authority, ""),
        };
        Self {
            scheme,
            host,
            port,
            rest,
        }
    }
}

fn split_labels(host: &str) -> Vec<String> {
    host.trim_end_matches('.')
        .split('.')
        .map(|l| l.to_ascii_lowercase())
        .collect()
}

fn find_window(labels: &[String], pattern: &[String]) -> Option<usize> {
    if pattern.is_empty() || pattern.len() > labels.len() {
        return None;
    }
    labels.windows(pattern.len()).position(|w| w == pattern)
}

/// Drops one copy where `seq` appears twice back to back.
fn collapse_adjacent_repeat(labels: &[String], seq: &[String]) -> Option<Vec<String>> {
    let mut doubled = seq.to_vec();
    doubled.extend_from_slice(seq);
    let start = find_window(labels, &doubled)?;

    let mut repaired = labels[..start + seq.len()].to_vec();
    repaired.extend_from_slice(&labels[start + doubled.len()..]);
    Some(repaired)
}
