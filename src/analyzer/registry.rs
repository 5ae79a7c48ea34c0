//! Ordered registry of named analyzers.
//!
//! Registration is where analyzer schemas are validated, so dispatch and
//! decision code can rely on names being unique and schemas well formed.

use super::Analyzer;
use crate::error::RegistryError;
use crate::models::ScoreSchema;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// How a registered analyzer takes part in the join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationOptions {
    /// Blocking analyzers must finish before the join returns. Non-blocking
    /// ones still running at that point are cancelled.
    pub blocking: bool,
    /// Overrides the dispatcher's default timeout.
    pub timeout: Option<Duration>,
}

impl Default for RegistrationOptions {
    fn default() -> Self {
        Self {
            blocking: true,
            timeout: None,
        }
    }
}

impl RegistrationOptions {
    pub fn non_blocking(mut self) -> Self {
        self.blocking = false;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// An analyzer together with the schema captured when it was registered.
#[derive(Clone)]
pub struct RegisteredAnalyzer {
    name: String,
    analyzer: Arc<dyn Analyzer>,
    schema: ScoreSchema,
    options: RegistrationOptions,
}

impl RegisteredAnalyzer {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn analyzer(&self) -> &Arc<dyn Analyzer> {
        &self.analyzer
    }

    pub fn schema(&self) -> &ScoreSchema {
        &self.schema
    }

    pub fn is_blocking(&self) -> bool {
        self.options.blocking
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.options.timeout
    }
}

/// Fixed, ordered set of analyzers for a review.
#[derive(Clone, Default)]
pub struct AnalyzerRegistry {
    entries: Vec<RegisteredAnalyzer>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a blocking analyzer with the default timeout.
    pub fn register<A>(&mut self, analyzer: A) -> Result<&mut Self, RegistryError>
    where
        A: Analyzer + 'static,
    {
        self.register_with(Arc::new(analyzer), RegistrationOptions::default())
    }

    pub fn register_with(
        &mut self,
        analyzer: Arc<dyn Analyzer>,
        options: RegistrationOptions,
    ) -> Result<&mut Self, RegistryError> {
        let name = analyzer.name().trim().to_string();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.get(&name).is_some() {
            return Err(RegistryError::DuplicateName { name });
        }

        let schema = analyzer.schema();
        schema
            .validate()
            .map_err(|source| RegistryError::InvalidSchema {
                analyzer: name.clone(),
                source,
            })?;

        debug!(
            "Registered analyzer {} ({} score keys, blocking: {})",
            name,
            schema.specs().len(),
            options.blocking
        );

        self.entries.push(RegisteredAnalyzer {
            name,
            analyzer,
            schema,
            options,
        });
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredAnalyzer> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredAnalyzer> {
        self.entries.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::StaticAnalyzer;
    use crate::error::SchemaError;

    #[test]
    fn test_registration_keeps_order() {
        let mut registry = AnalyzerRegistry::new();
        registry
            .register(StaticAnalyzer::scored("security", "score", 10.0, 9.0))
            .unwrap()
            .register(StaticAnalyzer::scored("quality", "score", 10.0, 8.0))
            .unwrap();

        assert_eq!(registry.names(), vec!["security", "quality"]);
        assert_eq!(registry.len(), 2);
        assert!(registry.get("quality").unwrap().is_blocking());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = AnalyzerRegistry::new();
        registry
            .register(StaticAnalyzer::scored("security", "score", 10.0, 9.0))
            .unwrap();
        let err = registry
            .register(StaticAnalyzer::scored("security", "score", 10.0, 1.0))
            .err();
        assert_eq!(
            err,
            Some(RegistryError::DuplicateName {
                name: "security".to_string()
            })
        );
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut registry = AnalyzerRegistry::new();
        let err = registry
            .register(StaticAnalyzer::scored("  ", "score", 10.0, 9.0))
            .err();
        assert_eq!(err, Some(RegistryError::EmptyName));
    }

    #[test]
    fn test_invalid_schema_rejected() {
        let analyzer = StaticAnalyzer::new(
            "quality",
            ScoreSchema::new().with("score", 10.0, 0.0),
            crate::models::AnalyzerResult::success([("score", 5.0)], vec![]),
        );
        let mut registry = AnalyzerRegistry::new();
        let err = registry.register(analyzer).err();
        assert!(matches!(
            err,
            Some(RegistryError::InvalidSchema {
                source: SchemaError::InvalidRange { .. },
                ..
            })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_options() {
        let mut registry = AnalyzerRegistry::new();
        registry
            .register_with(
                Arc::new(StaticAnalyzer::scored("advisory", "score", 1.0, 0.5)),
                RegistrationOptions::default()
                    .non_blocking()
                    .with_timeout(Duration::from_secs(3)),
            )
            .unwrap();

        let entry = registry.get("advisory").unwrap();
        assert!(!entry.is_blocking());
        assert_eq!(entry.timeout(), Some(Duration::from_secs(3)));
    }
}
