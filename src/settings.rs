use serde::{Deserialize, Serialize};

use crate::dialect::BackendDialect;
use crate::types::{BaseTypeCatalog, BaseTypeDef};

/// What happens when an output expression touches a member of an empty value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NullBehaviour {
    /// The expression yields an empty value.
    #[default]
    Lenient,
    /// The failure propagates as a named, wrapped error.
    Strict,
}

/// Replaces `<elementName ...>` with an expression built from `phrase`.
/// `@attr` inside the phrase is the attribute's code, `"@attr"` its text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    pub element_name: String,
    pub phrase: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompilerSettings {
    /// Base type used when no template overrides it.
    pub base_type: String,
    pub dialect: BackendDialect,
    pub null_behaviour: NullBehaviour,
    /// Align generated statements with template columns and record a source map.
    pub debug: bool,
    /// HTML-encode `${}` output unless written as `!{}`.
    pub automatic_encoding: bool,
    /// When set, only `prefix:name` elements are recognized as directives.
    pub prefix: Option<String>,
    pub use_namespaces: Vec<String>,
    pub use_modules: Vec<String>,
    /// When set, referenced modules must appear in this list.
    pub known_modules: Option<Vec<String>>,
    pub bindings: Vec<Binding>,
    /// Extra base types registered on top of the built-in catalog.
    pub base_types: Vec<BaseTypeDef>,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            base_type: "ViewBase".to_string(),
            dialect: BackendDialect::default(),
            null_behaviour: NullBehaviour::default(),
            debug: false,
            automatic_encoding: false,
            prefix: None,
            use_namespaces: Vec::new(),
            use_modules: Vec::new(),
            known_modules: None,
            bindings: Vec::new(),
            base_types: Vec::new(),
        }
    }
}

impl CompilerSettings {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_dialect(mut self, dialect: BackendDialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn catalog(&self) -> BaseTypeCatalog {
        let mut catalog = BaseTypeCatalog::default();
        for def in &self.base_types {
            catalog.register(def.clone());
        }
        catalog
    }
}

/// A class-level property whose value is an expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Accessor {
    pub name: String,
    #[serde(default)]
    pub var_type: Option<String>,
    pub value: String,
}

/// Names the templates of one compiled view, innermost first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewDescriptor {
    #[serde(default)]
    pub target_namespace: Option<String>,
    pub templates: Vec<String>,
    #[serde(default)]
    pub accessors: Vec<Accessor>,
}

impl ViewDescriptor {
    pub fn new<I, T>(templates: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            target_namespace: None,
            templates: templates.into_iter().map(Into::into).collect(),
            accessors: Vec::new(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.target_namespace = Some(namespace.into());
        self
    }

    pub fn with_accessor(mut self, name: &str, value: &str) -> Self {
        self.accessors.push(Accessor {
            name: name.to_string(),
            var_type: None,
            value: value.to_string(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_partial_json() {
        let settings = CompilerSettings::from_json(
            r#"{ "dialect": "csharp", "nullBehaviour": "strict", "knownModules": ["System.Web"] }"#,
        )
        .unwrap();
        assert_eq!(settings.dialect, BackendDialect::CSharp);
        assert_eq!(settings.null_behaviour, NullBehaviour::Strict);
        assert_eq!(settings.base_type, "ViewBase", "unspecified fields keep defaults");
        assert_eq!(settings.known_modules, Some(vec!["System.Web".to_string()]));
    }

    #[test]
    fn test_descriptor_from_json() {
        let descriptor: ViewDescriptor = serde_json::from_str(
            r#"{ "targetNamespace": "Site.Views", "templates": ["home/index.spark", "layouts/app.spark"] }"#,
        )
        .unwrap();
        assert_eq!(descriptor.templates.len(), 2);
        assert!(descriptor.accessors.is_empty());
    }
}
