//! Search-space vocabulary of the provider directory and search URL building.

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::error::AppError;
use crate::models::Location;

/// Public search-results page of the My Aged Care provider directory.
pub const DEFAULT_BASE_URL: &str = "https://www.myagedcare.gov.au/find-a-provider/search/results";

/// Services ticked for every help-at-home search.
pub const HELP_AT_HOME_SERVICES: [&str; 5] = [
    "Assistive technology prescription and clinical support",
    "Client advisory services",
    "Community and centre-based respite",
    "Mobility products",
    "Self-care products",
];

/// Provider category searched at every location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchType {
    AgedCareHomes,
    HelpAtHome,
}

impl SearchType {
    /// All search types in the order they are run per location.
    pub const ALL: [SearchType; 2] = [SearchType::AgedCareHomes, SearchType::HelpAtHome];

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::AgedCareHomes => "aged-care-homes",
            SearchType::HelpAtHome => "help-at-home",
        }
    }

    /// Extra `services` filter sent with the search, if any.
    pub fn services(&self) -> Option<String> {
        match self {
            SearchType::AgedCareHomes => None,
            SearchType::HelpAtHome => Some(HELP_AT_HOME_SERVICES.join("|")),
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SearchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "aged-care-homes" => Ok(SearchType::AgedCareHomes),
            "help-at-home" => Ok(SearchType::HelpAtHome),
            _ => Err(format!("Unknown search type: {s}")),
        }
    }
}

/// Radius filter applied to every search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Distance {
    /// No `distance` parameter at all.
    Any,
    Km5,
    Km10,
    Km20,
    Km50,
    #[default]
    Km250,
}

impl Distance {
    /// Value of the `distance` query parameter, `None` for no filter.
    pub fn as_param(&self) -> Option<&'static str> {
        match self {
            Distance::Any => None,
            Distance::Km5 => Some("5"),
            Distance::Km10 => Some("10"),
            Distance::Km20 => Some("20"),
            Distance::Km50 => Some("50"),
            Distance::Km250 => Some("250"),
        }
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_param() {
            Some(km) => write!(f, "{km} km"),
            None => write!(f, "any distance"),
        }
    }
}

impl FromStr for Distance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_end_matches("km").trim() {
            "" | "any" | "none" => Ok(Distance::Any),
            "5" => Ok(Distance::Km5),
            "10" => Ok(Distance::Km10),
            "20" => Ok(Distance::Km20),
            "50" => Ok(Distance::Km50),
            "250" => Ok(Distance::Km250),
            other => Err(format!(
                "Unsupported distance '{other}' (expected 5, 10, 20, 50, 250 or empty)"
            )),
        }
    }
}

/// Build the results URL for one (location, search type, page) search.
///
/// Parameter order follows what the site's own search form produces.
pub fn search_url(
    base_url: &str,
    location: &Location,
    search_type: SearchType,
    distance: Distance,
    page: u32,
) -> Result<String, AppError> {
    let mut url = Url::parse(base_url)
        .map_err(|e| AppError::ConfigError(format!("Invalid base URL '{base_url}': {e}")))?;

    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("searchType", search_type.as_str())
            .append_pair("location", &location.search_query())
            .append_pair("sort", "relevance");
        if let Some(km) = distance.as_param() {
            query.append_pair("distance", km);
        }
        if let Some(services) = search_type.services() {
            query.append_pair("services", &services);
        }
        query
            .append_pair("page", &page.to_string())
            .append_pair("hasSearched", "true");
    }

    Ok(url.into())
}
