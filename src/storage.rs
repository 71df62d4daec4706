//! Remote-storage duplicate index

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of listing remote storage by name
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveListing {
    /// Rendered result pages, ready for [`Messenger::paginated_link`](crate::messaging::Messenger::paginated_link)
    pub pages: Vec<String>,
    /// Number of matching entries
    pub count: usize,
}

impl DriveListing {
    /// Whether nothing matched
    pub fn is_empty(&self) -> bool {
        self.count == 0 || self.pages.is_empty()
    }
}

/// Lists remote-storage entries that match a name
#[async_trait]
pub trait DuplicateIndex: Send + Sync {
    /// List entries named `name`; `summarize` collapses folder contents into one entry
    async fn list_by_name(&self, name: &str, summarize: bool) -> Result<DriveListing>;
}
