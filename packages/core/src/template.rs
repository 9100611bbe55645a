//! Templates: named bundles that populate a mock through the control API.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::handle::MockHandle;
use crate::value::Value;
use crate::{Error, Result};

/// Template parameters, as passed to `AddTemplate`.
pub type Parameters = BTreeMap<String, Value>;

/// A mock of one well-known service.
///
/// `load` receives a handle to the object the template is applied to and
/// builds everything through the same operations the control interface
/// offers.
pub trait Template: Send + Sync {
    fn name(&self) -> &str;

    fn bus_name(&self) -> &str;

    fn main_path(&self) -> &str {
        "/"
    }

    fn main_interface(&self) -> &str;

    fn system_bus(&self) -> bool {
        false
    }

    fn object_manager(&self) -> bool {
        false
    }

    fn load(&self, mock: &MockHandle, parameters: &Parameters) -> Result<()>;
}

/// Templates known to a server, by name.
#[derive(Clone, Default)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, Arc<dyn Template>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template, replacing one of the same name.
    pub fn register(&mut self, template: impl Template + 'static) {
        self.templates
            .insert(template.name().to_string(), Arc::new(template));
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Template>> {
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownTemplate(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }
}

impl fmt::Debug for TemplateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.templates.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Empty;

    impl Template for Empty {
        fn name(&self) -> &str {
            "empty"
        }

        fn bus_name(&self) -> &str {
            "org.example.Empty"
        }

        fn main_interface(&self) -> &str {
            "org.example.Empty"
        }

        fn load(&self, _mock: &MockHandle, _parameters: &Parameters) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = TemplateRegistry::new();
        registry.register(Empty);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["empty"]);
        let template = registry.get("empty").unwrap();
        assert_eq!(template.main_path(), "/");
        assert!(!template.system_bus());
        assert_eq!(
            registry.get("missing").err(),
            Some(Error::UnknownTemplate("missing".to_string()))
        );
    }
}
