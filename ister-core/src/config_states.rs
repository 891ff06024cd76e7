//! TypeState wrappers for the install template (parsed -> validated).
//!
//! Destructive stages only accept a [`ValidatedTemplate`], and the only way to build one is
//! [`UnvalidatedTemplate::validate`].

use crate::errors::Result;
use crate::template::{InstallTemplate, Template};
use crate::validate::validate_template;
use anyhow::Context;
use std::ops::Deref;

#[derive(Debug, Clone)]
pub struct UnvalidatedTemplate(pub Template);

#[derive(Debug, Clone)]
pub struct ValidatedTemplate(InstallTemplate);

impl UnvalidatedTemplate {
    pub fn new(template: Template) -> Self {
        Self(template)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let template = Template::from_json(text).context("Template is not valid JSON")?;
        Ok(Self(template))
    }

    /// Validate, placing the default layout on the disk `find_disk` returns when the
    /// template has none.
    pub fn validate(
        self,
        find_disk: impl FnOnce() -> Result<String>,
    ) -> Result<ValidatedTemplate> {
        let template = validate_template(self.0, find_disk)?;
        Ok(ValidatedTemplate(template))
    }
}

impl ValidatedTemplate {
    pub fn into_inner(self) -> InstallTemplate {
        self.0
    }
}

impl Deref for ValidatedTemplate {
    type Target = InstallTemplate;

    fn deref(&self) -> &InstallTemplate {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_errors_carry_context() {
        let err = UnvalidatedTemplate::from_json("{not json").unwrap_err();
        assert!(format!("{:#}", err).starts_with("Template is not valid JSON"));
    }

    #[test]
    fn validation_unlocks_typed_template() {
        let raw = UnvalidatedTemplate::from_json(
            r#"{"ImageSourceType": "local", "ImageSourceLocation": "file:///img.xz"}"#,
        )
        .unwrap();
        let validated = raw.validate(|| Ok("sda".to_string())).unwrap();
        assert_eq!(validated.source_location, "file:///img.xz");
        assert_eq!(validated.partitions[0].key.disk, "sda");
    }
}
