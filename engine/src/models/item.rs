//! Item model
//!
//! A uniquely identifiable tradeable asset. Identity is immutable and
//! caller-supplied; metadata (display name, collection reference, valuation)
//! is optional and opaque to the discovery algorithms except for the scorer,
//! which reads the valuation when present.

use serde::{Deserialize, Serialize};

/// A tradeable asset known to one tenant
///
/// # Example
/// ```
/// use tradeweave_engine::models::Item;
///
/// let item = Item::new("nft_1".to_string())
///     .with_display_name("Bored Mallard #1".to_string())
///     .with_valuation(2.5);
/// assert_eq!(item.id(), "nft_1");
/// assert_eq!(item.valuation(), Some(2.5));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Globally unique identifier within the tenant
    id: String,

    /// Human-readable name, if the submitter provided one
    display_name: Option<String>,

    /// Collection the item belongs to (opaque reference)
    collection: Option<String>,

    /// Opaque valuation in an abstract currency; used only for fairness
    /// scoring when present
    valuation: Option<f64>,
}

impl Item {
    /// Create an item with no metadata
    pub fn new(id: String) -> Self {
        Self {
            id,
            display_name: None,
            collection: None,
            valuation: None,
        }
    }

    pub fn with_display_name(mut self, name: String) -> Self {
        self.display_name = Some(name);
        self
    }

    pub fn with_collection(mut self, collection: String) -> Self {
        self.collection = Some(collection);
        self
    }

    pub fn with_valuation(mut self, valuation: f64) -> Self {
        self.valuation = Some(valuation);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    pub fn valuation(&self) -> Option<f64> {
        self.valuation
    }
}
