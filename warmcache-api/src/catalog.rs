//! Resource catalog loading.
//!
//! The catalog is the fixed set of cacheable resources, read once at startup
//! from a TOML file of `[[resource]]` tables:
//!
//! ```toml
//! [[resource]]
//! id = "sembako"
//! description = "Daily staple food prices"
//! policy = "calendar-day"
//! utc_offset_hours = 7
//!
//! [resource.source]
//! type = "command"
//! program = "python3"
//! args = ["scrapers/sembako.py"]
//! timeout_secs = 180
//!
//! [[resource]]
//! id = "cinema"
//! ttl_secs = 518400
//!
//! [resource.source]
//! type = "http"
//! url = "http://scraper:8000/cinema"
//! ```

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::FixedOffset;
use warmcache_core::{ConfigError, ResourceId, SharedAcquirer, StalenessPolicy};
use warmcache_refresh::ResourceDescriptor;

use crate::constants::DEFAULT_ACQUIRE_TIMEOUT_SECS;
use crate::providers::{CommandAcquirer, HttpJsonAcquirer, InstrumentedAcquirer};

/// Value of `policy` selecting [`StalenessPolicy::CalendarDay`].
pub const CALENDAR_DAY_POLICY: &str = "calendar-day";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Catalog {
    #[serde(default, rename = "resource")]
    pub resources: Vec<ResourceSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceSpec {
    pub id: String,
    pub description: Option<String>,
    /// Max-age policy, in seconds.
    pub ttl_secs: Option<u64>,
    /// Named policy; only `"calendar-day"` is recognised.
    pub policy: Option<String>,
    /// Offset used to decide the calendar day. Defaults to UTC.
    pub utc_offset_hours: Option<i32>,
    pub source: SourceSpec,
}

/// How the resource's payload is acquired.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceSpec {
    Http {
        url: String,
        timeout_secs: Option<u64>,
    },
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        timeout_secs: Option<u64>,
    },
}

impl Catalog {
    /// Read, parse and validate a catalog file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: display.clone(),
            reason: e.to_string(),
        })?;
        Self::parse(&contents, &display)
    }

    /// Parse and validate catalog text. `origin` names the source in errors.
    pub fn parse(contents: &str, origin: &str) -> Result<Self, ConfigError> {
        let catalog: Catalog = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            reason: e.to_string(),
        })?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resources.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "resource".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for spec in &self.resources {
            let id = spec.resource_id()?;
            if !seen.insert(id.clone()) {
                return Err(invalid("resource.id", id.as_str(), "duplicate resource id"));
            }
            spec.policy()?;
            spec.source.validate(&id)?;
        }
        Ok(())
    }

    /// Build one descriptor per resource, in file order.
    ///
    /// Every acquirer is wrapped in an [`InstrumentedAcquirer`].
    pub fn into_descriptors(self) -> Result<Vec<ResourceDescriptor>, ConfigError> {
        self.resources
            .into_iter()
            .map(ResourceSpec::into_descriptor)
            .collect()
    }
}

impl ResourceSpec {
    pub fn resource_id(&self) -> Result<ResourceId, ConfigError> {
        ResourceId::new(self.id.clone())
            .map_err(|e| invalid("resource.id", &self.id, &e.to_string()))
    }

    /// Resolve the staleness policy. Exactly one of `ttl_secs` and `policy`
    /// must be set.
    pub fn policy(&self) -> Result<StalenessPolicy, ConfigError> {
        match (self.ttl_secs, self.policy.as_deref()) {
            (Some(_), Some(_)) => Err(invalid(
                "resource.policy",
                &self.id,
                "set either ttl_secs or policy, not both",
            )),
            (None, None) => Err(invalid(
                "resource.policy",
                &self.id,
                "one of ttl_secs or policy is required",
            )),
            (Some(0), None) => Err(invalid("resource.ttl_secs", "0", "must be > 0")),
            (Some(ttl), None) => {
                if self.utc_offset_hours.is_some() {
                    return Err(invalid(
                        "resource.utc_offset_hours",
                        &self.id,
                        "only valid with policy = \"calendar-day\"",
                    ));
                }
                Ok(StalenessPolicy::max_age(Duration::from_secs(ttl)))
            }
            (None, Some(CALENDAR_DAY_POLICY)) => {
                let hours = self.utc_offset_hours.unwrap_or(0);
                let offset = FixedOffset::east_opt(hours.saturating_mul(3600)).ok_or_else(|| {
                    invalid(
                        "resource.utc_offset_hours",
                        &hours.to_string(),
                        "must be between -23 and 23",
                    )
                })?;
                Ok(StalenessPolicy::calendar_day(offset))
            }
            (None, Some(other)) => Err(invalid(
                "resource.policy",
                other,
                "expected \"calendar-day\"",
            )),
        }
    }

    fn into_descriptor(self) -> Result<ResourceDescriptor, ConfigError> {
        let id = self.resource_id()?;
        let policy = self.policy()?;
        let acquirer = self.source.build(&id)?;
        let descriptor = ResourceDescriptor::new(id, policy, acquirer);
        Ok(match self.description {
            Some(description) => descriptor.with_description(description),
            None => descriptor,
        })
    }
}

impl SourceSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http { .. } => "http",
            Self::Command { .. } => "command",
        }
    }

    pub fn timeout(&self) -> Duration {
        let secs = match self {
            Self::Http { timeout_secs, .. } | Self::Command { timeout_secs, .. } => *timeout_secs,
        };
        Duration::from_secs(secs.unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS))
    }

    fn validate(&self, id: &ResourceId) -> Result<(), ConfigError> {
        match self {
            Self::Http { url, .. } => {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(invalid(
                        "resource.source.url",
                        url,
                        "must be an http:// or https:// URL",
                    ));
                }
            }
            Self::Command { program, .. } => {
                if program.trim().is_empty() {
                    return Err(invalid("resource.source.program", id.as_str(), "must not be empty"));
                }
            }
        }
        if self.timeout().is_zero() {
            return Err(invalid("resource.source.timeout_secs", "0", "must be > 0"));
        }
        Ok(())
    }

    fn build(self, id: &ResourceId) -> Result<SharedAcquirer, ConfigError> {
        self.validate(id)?;
        let timeout = self.timeout();
        let inner: SharedAcquirer = match self {
            Self::Http { url, .. } => Arc::new(HttpJsonAcquirer::new(url, timeout)?),
            Self::Command { program, args, .. } => {
                Arc::new(CommandAcquirer::new(program, args, timeout))
            }
        };
        Ok(Arc::new(InstrumentedAcquirer::new(inner)))
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
