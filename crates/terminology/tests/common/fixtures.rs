//! Resource fixtures.

use serde_json::{Value, json};

/// Example code system url used across the tests.
pub const CS_URL: &str = "http://ex.org/cs";

/// Example value set url used across the tests.
pub const VS_URL: &str = "http://ex.org/vs";

/// Builder for CodeSystem resources.
#[derive(Debug, Clone)]
pub struct CodeSystemFixture {
    url: String,
    version: Option<String>,
    name: Option<String>,
    concepts: Vec<Value>,
}

impl CodeSystemFixture {
    /// A code system with the given url and no concepts.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            version: None,
            name: None,
            concepts: Vec::new(),
        }
    }

    /// Sets the version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Adds a top-level concept.
    pub fn with_concept(mut self, code: &str, display: &str) -> Self {
        self.concepts.push(json!({"code": code, "display": display}));
        self
    }

    /// Adds a raw concept, e.g. one with nested children.
    pub fn with_raw_concept(mut self, concept: Value) -> Self {
        self.concepts.push(concept);
        self
    }

    /// Builds the JSON resource.
    pub fn build(&self) -> Value {
        let mut resource = json!({
            "resourceType": "CodeSystem",
            "url": self.url,
            "status": "active",
            "content": "complete",
            "count": self.concepts.len(),
            "concept": self.concepts,
        });
        if let Some(version) = &self.version {
            resource["version"] = json!(version);
        }
        if let Some(name) = &self.name {
            resource["name"] = json!(name);
        }
        resource
    }
}

/// Builder for ValueSet resources enumerating codes of one or more systems.
#[derive(Debug, Clone)]
pub struct ValueSetFixture {
    url: String,
    version: Option<String>,
    includes: Vec<Value>,
}

impl ValueSetFixture {
    /// A value set with the given url and no members.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            version: None,
            includes: Vec::new(),
        }
    }

    /// Sets the version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Includes `codes` of `system`.
    pub fn include(mut self, system: &str, codes: &[&str]) -> Self {
        let concepts: Vec<Value> = codes.iter().map(|code| json!({"code": code})).collect();
        self.includes
            .push(json!({"system": system, "concept": concepts}));
        self
    }

    /// Includes `codes` of a pinned version of `system`.
    pub fn include_version(mut self, system: &str, version: &str, codes: &[&str]) -> Self {
        let concepts: Vec<Value> = codes.iter().map(|code| json!({"code": code})).collect();
        self.includes.push(json!({
            "system": system,
            "version": version,
            "concept": concepts,
        }));
        self
    }

    /// Builds the JSON resource.
    pub fn build(&self) -> Value {
        let mut resource = json!({
            "resourceType": "ValueSet",
            "url": self.url,
            "status": "active",
            "compose": {"include": self.includes},
        });
        if let Some(version) = &self.version {
            resource["version"] = json!(version);
        }
        resource
    }
}

/// Scenario 1 code system: one concept `A` ("Alpha").
pub fn alpha_code_system() -> Value {
    CodeSystemFixture::new(CS_URL)
        .with_name("Example")
        .with_concept("A", "Alpha")
        .build()
}
