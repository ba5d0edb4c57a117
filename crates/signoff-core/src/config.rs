//! Engine configuration
//!
//! Business-type and priority descriptors are passed in at construction
//! instead of living in process-wide static tables, so embedders can supply
//! their own catalogs.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A display descriptor for a configured code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    pub code: String,
    pub label: String,
}

impl Descriptor {
    pub fn new(code: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            label: label.into(),
        }
    }
}

/// Configuration handed to the engines at construction
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Business-type code → descriptor
    pub business_types: HashMap<String, Descriptor>,

    /// Priority level → descriptor
    pub priorities: HashMap<i32, Descriptor>,
}

impl EngineConfig {
    pub fn business_type(&self, code: &str) -> Option<&Descriptor> {
        self.business_types.get(code)
    }

    pub fn priority(&self, level: i32) -> Option<&Descriptor> {
        self.priorities.get(&level)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let business_types = [
            Descriptor::new("leave", "Leave Request"),
            Descriptor::new("expense", "Expense Claim"),
            Descriptor::new("purchase", "Purchase Request"),
            Descriptor::new("travel", "Business Travel"),
            Descriptor::new("general", "General Approval"),
        ]
        .into_iter()
        .map(|d| (d.code.clone(), d))
        .collect();

        let priorities = [
            (0, Descriptor::new("low", "Low")),
            (1, Descriptor::new("normal", "Normal")),
            (2, Descriptor::new("high", "High")),
            (3, Descriptor::new("urgent", "Urgent")),
        ]
        .into_iter()
        .collect();

        Self {
            business_types,
            priorities,
        }
    }
}
