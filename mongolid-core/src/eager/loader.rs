use bson::{Document, doc};
use indexmap::IndexMap;
use smol_str::SmolStr;
use tracing::{debug, warn};

use super::{EagerLoad, RelationExtractor};
use crate::backend::FindOptions;
use crate::cache::CacheKey;
use crate::context::Context;
use crate::error::OdmResult;
use crate::query;

/// Prefetches related documents into the cache.
pub struct EagerLoadCache<'a> {
    context: &'a Context,
}

impl<'a> EagerLoadCache<'a> {
    /// Create a prefetcher over a context.
    pub fn new(context: &'a Context) -> Self {
        Self { context }
    }

    /// Prefetch the relations of a batch of source documents.
    ///
    /// Only the first `eager_load_limit` documents are scanned, however many
    /// are passed. Each relation costs one query. Failures to store an entry
    /// are logged and skipped; query failures propagate.
    pub async fn cache(&self, documents: &[Document], eager_loads: &IndexMap<SmolStr, EagerLoad>) -> OdmResult<()> {
        if eager_loads.is_empty() || documents.is_empty() {
            return Ok(());
        }

        let limit = self.context.config().eager_load_limit;
        let mut extractor = RelationExtractor::new(eager_loads);
        for document in documents.iter().take(limit) {
            extractor.extract_from(document)?;
        }

        let ttl = Some(self.context.config().cache_ttl);
        for (relation, extracted) in extractor.into_related() {
            if extracted.is_empty() {
                continue;
            }
            let related = self.context.registry().model_type(&extracted.model)?;
            let collection_name = related.collection()?;
            let filter = query::resolve(doc! { "_id": { "$in": extracted.values() } }, related, false);

            debug!(
                relation = %relation,
                model = %extracted.model,
                ids = extracted.ids.len(),
                "Eager loading relation"
            );
            let found = self
                .context
                .connection()
                .collection(collection_name)
                .find(filter, &FindOptions::default())
                .await?;

            for document in &found {
                let Some(id) = document.get("_id") else {
                    continue;
                };
                let key = CacheKey::document(collection_name, id);
                if let Err(err) = self.context.cache().put(&key, document, ttl).await {
                    warn!(key = %key, error = %err, "Failed to cache eager loaded document");
                }
            }
        }
        Ok(())
    }
}
