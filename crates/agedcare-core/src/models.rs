use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// One search origin: a postcode plus the locality/state it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "LocationEntry")]
pub struct Location {
    pub postcode: String,
    pub locality: String,
    pub state: String,
}

/// Input entries may be a bare postcode or an object with locality details.
#[derive(Deserialize)]
#[serde(untagged)]
enum LocationEntry {
    Postcode(PostcodeValue),
    Detailed {
        #[serde(alias = "postCode")]
        postcode: PostcodeValue,
        #[serde(default, alias = "suburb")]
        locality: String,
        #[serde(default)]
        state: String,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PostcodeValue {
    Text(String),
    Number(u32),
}

impl PostcodeValue {
    fn into_string(self) -> String {
        match self {
            PostcodeValue::Text(s) => s.trim().to_string(),
            // Numeric postcodes lose their leading zero ("0800" -> 800).
            PostcodeValue::Number(n) => format!("{n:04}"),
        }
    }
}

impl From<LocationEntry> for Location {
    fn from(entry: LocationEntry) -> Self {
        match entry {
            LocationEntry::Postcode(postcode) => Location::new(postcode.into_string()),
            LocationEntry::Detailed {
                postcode,
                locality,
                state,
            } => Location {
                postcode: postcode.into_string(),
                locality: locality.trim().to_string(),
                state: state.trim().to_string(),
            },
        }
    }
}

impl Location {
    /// A location known only by its postcode.
    pub fn new(postcode: impl Into<String>) -> Self {
        Self {
            postcode: postcode.into(),
            locality: String::new(),
            state: String::new(),
        }
    }

    pub fn with_locality(mut self, locality: impl Into<String>, state: impl Into<String>) -> Self {
        self.locality = locality.into();
        self.state = state.into();
        self
    }

    /// Free-text query typed into the directory's location box.
    ///
    /// Example: `"SYDNEY NSW 2000"`; empty parts are dropped.
    pub fn search_query(&self) -> String {
        [
            self.locality.to_uppercase(),
            self.state.to_uppercase(),
            self.postcode.clone(),
        ]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }

    /// Load the ordered location list from a JSON file.
    ///
    /// Entries without a postcode are dropped with a warning, so indices refer
    /// to the list as returned here.
    pub fn load_all(path: &Path) -> Result<Vec<Location>, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!("Failed to read {}: {e}", path.display()))
        })?;
        let entries: Vec<Location> = serde_json::from_str(&raw).map_err(|e| {
            AppError::ConfigError(format!("Invalid JSON in {}: {e}", path.display()))
        })?;

        let total = entries.len();
        let locations: Vec<Location> = entries
            .into_iter()
            .filter(|l| !l.postcode.is_empty())
            .collect();

        if locations.len() < total {
            tracing::warn!(
                dropped = total - locations.len(),
                "Ignoring location entries without a postcode"
            );
        }
        tracing::info!("Loaded {} locations from {}", locations.len(), path.display());
        Ok(locations)
    }
}

/// Fields pulled off a provider detail page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderDetails {
    pub company_name: String,
    pub address: String,
    pub telephone: String,
    pub email: String,
    pub website: String,
}

/// One row of the output CSV. Field order is the column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRecord {
    pub company_name: String,
    pub address: String,
    pub suburb: String,
    pub state: String,
    pub postcode: String,
    pub telephone: String,
    pub email: String,
    pub website: String,
}

impl ProviderRecord {
    pub const HEADERS: [&'static str; 8] = [
        "company_name",
        "address",
        "suburb",
        "state",
        "postcode",
        "telephone",
        "email",
        "website",
    ];

    /// Combine extracted details with the location the provider was found from.
    pub fn from_details(details: ProviderDetails, location: &Location) -> Self {
        let company_name = details
            .company_name
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();

        Self {
            company_name,
            address: details.address,
            suburb: location.locality.to_uppercase(),
            state: location.state.to_uppercase(),
            postcode: location.postcode.clone(),
            telephone: details.telephone,
            email: details.email,
            website: details.website,
        }
    }
}

/// Durable marker of the last location whose search types all finished.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCursor {
    /// 0-based index into the location list; `None` before anything completes.
    pub last_completed: Option<usize>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProgressCursor {
    /// Cursor for a first run.
    pub fn initial() -> Self {
        Self::default()
    }

    pub fn at(index: usize) -> Self {
        Self {
            last_completed: Some(index),
            updated_at: Some(Utc::now()),
        }
    }

    /// First location index that still needs processing.
    pub fn next_index(&self) -> usize {
        self.last_completed.map_or(0, |i| i + 1)
    }
}
