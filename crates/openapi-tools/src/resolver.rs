//! `OpenAPI` `$ref` resolver.
//!
//! The `openapiv3` crate models `$ref`s using `ReferenceOr<T>` but does not resolve them.
//! This resolver follows local refs (`#/components/...`) within the root document, including
//! chains of refs. External refs (other files or URLs) are rejected.

use crate::error::{OpenApiToolsError, Result};
use openapiv3::{OpenAPI, ReferenceOr};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;

#[derive(Debug)]
pub struct LocalResolver {
    /// Where the document came from (used in error messages).
    location: String,
    root: Value,
}

impl LocalResolver {
    /// Create a resolver over a parsed root document.
    ///
    /// # Errors
    ///
    /// Returns an error if the spec cannot be converted into JSON.
    pub fn new(location: impl Into<String>, spec: &OpenAPI) -> Result<Self> {
        let root =
            serde_json::to_value(spec).map_err(|e| OpenApiToolsError::OpenApi(e.to_string()))?;
        Ok(Self {
            location: location.into(),
            root,
        })
    }

    /// Resolve `r` to an item, following refs until one points at an inline value.
    ///
    /// # Errors
    ///
    /// Returns an error for external refs, dangling pointers, cycles, or a target that does not
    /// deserialize as `T`.
    pub fn resolve<T>(&self, r: &ReferenceOr<T>) -> Result<T>
    where
        T: Clone + DeserializeOwned,
    {
        let mut seen: HashSet<String> = HashSet::new();
        let mut cur = r.clone();

        loop {
            match cur {
                ReferenceOr::Item(item) => return Ok(item),
                ReferenceOr::Reference { reference } => {
                    if !seen.insert(reference.clone()) {
                        return Err(OpenApiToolsError::OpenApi(format!(
                            "Cyclic $ref detected while resolving: {reference}",
                        )));
                    }
                    let value = self.lookup(&reference)?;
                    cur = serde_json::from_value(value).map_err(|e| {
                        OpenApiToolsError::OpenApi(format!(
                            "Failed to deserialize referenced value '{reference}' (doc {}) as expected type: {e}",
                            self.location
                        ))
                    })?;
                }
            }
        }
    }

    fn lookup(&self, reference: &str) -> Result<Value> {
        let Some(fragment) = reference.strip_prefix('#') else {
            return Err(OpenApiToolsError::OpenApi(format!(
                "External $ref is not supported: {reference}",
            )));
        };
        if fragment.is_empty() {
            return Ok(self.root.clone());
        }
        if !fragment.starts_with('/') {
            return Err(OpenApiToolsError::OpenApi(format!(
                "Unsupported $ref fragment (expected JSON pointer starting with '/'): {reference}",
            )));
        }
        self.root.pointer(fragment).cloned().ok_or_else(|| {
            OpenApiToolsError::OpenApi(format!(
                "Unresolved $ref '{reference}' (doc {}, missing pointer '{fragment}')",
                self.location
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openapiv3::{Parameter, Schema};

    fn spec(yaml: &str) -> OpenAPI {
        serde_yaml::from_str(yaml).unwrap()
    }

    const BASE: &str = r#"
openapi: "3.0.0"
info: { title: t, version: "1" }
paths: {}
components:
  parameters:
    Limit:
      name: limit
      in: query
      schema: { type: integer }
    LimitAlias:
      $ref: '#/components/parameters/Limit'
  schemas:
    A:
      $ref: '#/components/schemas/B'
    B:
      $ref: '#/components/schemas/A'
"#;

    #[test]
    fn follows_chained_refs() {
        let s = spec(BASE);
        let resolver = LocalResolver::new("inline", &s).unwrap();
        let r: ReferenceOr<Parameter> = ReferenceOr::Reference {
            reference: "#/components/parameters/LimitAlias".to_string(),
        };
        let p = resolver.resolve(&r).unwrap();
        assert_eq!(p.parameter_data_ref().name, "limit");
    }

    #[test]
    fn detects_cycles() {
        let s = spec(BASE);
        let resolver = LocalResolver::new("inline", &s).unwrap();
        let r: ReferenceOr<Schema> = ReferenceOr::Reference {
            reference: "#/components/schemas/A".to_string(),
        };
        let err = resolver.resolve(&r).unwrap_err().to_string();
        assert!(err.contains("Cyclic"), "{err}");
    }

    #[test]
    fn rejects_external_and_dangling_refs() {
        let s = spec(BASE);
        let resolver = LocalResolver::new("inline", &s).unwrap();

        let external: ReferenceOr<Schema> = ReferenceOr::Reference {
            reference: "common.yaml#/components/schemas/X".to_string(),
        };
        assert!(resolver.resolve(&external).is_err());

        let dangling: ReferenceOr<Schema> = ReferenceOr::Reference {
            reference: "#/components/schemas/Nope".to_string(),
        };
        let err = resolver.resolve(&dangling).unwrap_err().to_string();
        assert!(err.contains("missing pointer"), "{err}");
    }
}
