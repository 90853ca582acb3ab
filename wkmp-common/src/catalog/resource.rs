//! Catalog resources
//!
//! A resource describes one way of serving an object's content. Parameters
//! and options only mean something together with the resource's position in
//! the owning object's resource list, so resources are always handled as an
//! ordered `Vec<Resource>`.

use super::vocabulary::ResAttr;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Content handler code for the default (file) handler
pub const HANDLER_DEFAULT: i64 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Resource {
    /// Content handler that serves this resource
    pub handler_type: i64,
    /// Controlled-vocabulary attributes
    #[serde(default)]
    pub attributes: BTreeMap<ResAttr, String>,
    /// Free-form URL parameters
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Free-form handler options
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl Resource {
    pub fn new(handler_type: i64) -> Self {
        Self {
            handler_type,
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, attr: ResAttr, value: impl Into<String>) -> Self {
        self.attributes.insert(attr, value.into());
        self
    }

    pub fn attribute(&self, attr: ResAttr) -> Option<&str> {
        self.attributes.get(&attr).map(String::as_str)
    }
}
