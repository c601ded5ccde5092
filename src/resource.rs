//! UMA resource descriptions for `uma_rs_protect`
//!
//! A [`ResourceSet`] lists the paths a resource server wants protected and,
//! per path, which scopes are required for which HTTP methods. It
//! serializes to the shape the server expects:
//!
//! ```json
//! [{"path": "/photoz",
//!   "conditions": [{"httpMethods": ["GET"], "scopes": ["https://example.com/uma/scope/view"]}]}]
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Scopes required for a set of HTTP methods on one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// HTTP methods this condition applies to
    #[serde(rename = "httpMethods")]
    pub http_methods: Vec<String>,
    /// Scopes required for those methods
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    /// Logical scope rule, used instead of `scopes` when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_expression: Option<Value>,
}

impl Condition {
    fn for_method(http_method: &str) -> Self {
        Self {
            http_methods: vec![http_method.to_string()],
            scopes: Vec::new(),
            scope_expression: None,
        }
    }

    fn applies_to(&self, http_method: &str) -> bool {
        self.http_methods.iter().any(|m| m == http_method)
    }
}

/// One protected path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// URL path being protected, e.g. `/photoz`
    pub path: String,
    /// Scope rules per HTTP method set
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl Resource {
    /// A resource with no conditions.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            conditions: Vec::new(),
        }
    }

    /// Require `scope` for `http_method`.
    ///
    /// The scope is added to the condition that already covers the method,
    /// or a new single-method condition is created.
    pub fn set_scope(&mut self, http_method: &str, scope: impl Into<String>) -> &mut Self {
        let scope = scope.into();
        match self.condition_mut(http_method) {
            Some(condition) => {
                if !condition.scopes.contains(&scope) {
                    condition.scopes.push(scope);
                }
            }
            None => {
                let mut condition = Condition::for_method(http_method);
                condition.scopes.push(scope);
                self.conditions.push(condition);
            }
        }
        self
    }

    /// Attach a scope expression (`{"rule": ..., "data": [...]}`) for `http_method`.
    pub fn set_scope_expression(&mut self, http_method: &str, expression: Value) -> &mut Self {
        match self.condition_mut(http_method) {
            Some(condition) => condition.scope_expression = Some(expression),
            None => {
                let mut condition = Condition::for_method(http_method);
                condition.scope_expression = Some(expression);
                self.conditions.push(condition);
            }
        }
        self
    }

    fn condition_mut(&mut self, http_method: &str) -> Option<&mut Condition> {
        self.conditions
            .iter_mut()
            .find(|c| c.applies_to(http_method))
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

/// Ordered set of resources keyed by path.
///
/// # Examples
///
/// ```
/// use oxd_messenger::ResourceSet;
///
/// let mut resources = ResourceSet::new();
/// resources
///     .add("/photoz")
///     .set_scope("GET", "https://example.com/uma/scope/view")
///     .set_scope("POST", "https://example.com/uma/scope/add");
///
/// assert_eq!(resources.len(), 1);
/// assert!(resources.to_string().starts_with(r#"[{"path":"/photoz""#));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceSet {
    resources: Vec<Resource>,
}

impl ResourceSet {
    /// Create an empty resource set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an empty resource for `path` and return it for configuration.
    ///
    /// An existing resource with the same path is replaced in place.
    pub fn add(&mut self, path: impl Into<String>) -> &mut Resource {
        let resource = Resource::new(path);
        let index = match self.position(&resource.path) {
            Some(index) => {
                self.resources[index] = resource;
                index
            }
            None => {
                self.resources.push(resource);
                self.resources.len() - 1
            }
        };
        &mut self.resources[index]
    }

    /// Remove and return the resource for `path`.
    pub fn remove(&mut self, path: &str) -> Option<Resource> {
        self.position(path).map(|index| self.resources.remove(index))
    }

    /// The resource registered for `path`, if any.
    ///
    /// # Examples
    ///
    /// ```
    /// use oxd_messenger::resource::ResourceSet;
    ///
    /// let mut resources = ResourceSet::new();
    /// assert!(resources.is_empty());
    /// resources.add("/photoz").set_scope("GET", "https://photoz.example.com/view");
    ///
    /// assert!(resources.get("/photoz").is_some());
    /// assert!(resources.get("/albums").is_none());
    /// assert_eq!(resources.iter().count(), resources.len());
    /// ```
    pub fn get(&self, path: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.path == path)
    }

    /// Number of resources in the set.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// `true` when no resource has been added.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Iterate over the resources in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }

    fn position(&self, path: &str) -> Option<usize> {
        self.resources.iter().position(|r| r.path == path)
    }
}

impl fmt::Display for ResourceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}
