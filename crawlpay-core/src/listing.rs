//! Body of the resource listing served at `GET /resources`.

use serde::{Deserialize, Serialize};

/// One listed resource.
///
/// `url` may be relative to the listing URL or absolute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSummary {
    pub id: String,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceListing {
    pub resources: Vec<ResourceSummary>,
}
