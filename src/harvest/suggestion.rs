use std::collections::HashMap;

use crate::model::PackageRecord;

/// Placeholder substituted with the suggested package name.
pub const NAME_PLACEHOLDER: &str = "{name}";

/// Attaches recommended replacements to records.
#[derive(Debug, Clone, Default)]
pub struct SuggestionAnnotator {
    mapping: HashMap<String, String>,
    url_template: String,
}

impl SuggestionAnnotator {
    /// `url_template` must contain `{name}`, e.g.
    /// `https://packagist.org/packages/{name}`.
    pub fn new(mapping: HashMap<String, String>, url_template: impl Into<String>) -> Self {
        Self {
            mapping,
            url_template: url_template.into(),
        }
    }

    /// Sets both suggestion fields when the record's name is mapped.
    pub fn annotate(&self, record: &mut PackageRecord) {
        if let Some(replacement) = self.mapping.get(&record.name) {
            record.suggested_package_url =
                Some(self.url_template.replace(NAME_PLACEHOLDER, replacement));
            record.suggested_package = Some(replacement.clone());
        }
    }
}
