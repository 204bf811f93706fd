use serde::{Deserialize, Serialize};

/// Versioned description of what the offline cache should hold.
///
/// The wire format is the `cache.json` document served next to the
/// application: `{ "cache": id, "archivos": [...], "imagenes": [...] }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Name of the store that holds this manifest's files.
    #[serde(rename = "cache")]
    pub generation_id: String,
    /// Files every installation needs, regardless of location selection.
    #[serde(rename = "archivos", default)]
    pub baseline_files: Vec<String>,
    #[serde(rename = "imagenes", default)]
    pub location_image_sets: Vec<LocationImageSet>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationImageSet {
    #[serde(rename = "codigo")]
    pub code: String,
    #[serde(rename = "archivos", default)]
    pub files: Vec<String>,
}

impl Manifest {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Image sets whose location code is among `codes`, in manifest order.
    /// Codes the manifest does not know are simply not matched.
    pub fn image_sets_for<'a>(
        &'a self,
        codes: &'a [String],
    ) -> impl Iterator<Item = &'a LocationImageSet> + 'a {
        self.location_image_sets
            .iter()
            .filter(move |set| codes.iter().any(|code| code == &set.code))
    }

    pub fn has_location(&self, code: &str) -> bool {
        self.location_image_sets.iter().any(|set| set.code == code)
    }
}
