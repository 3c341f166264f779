//! Parallel batch transformation.
//!
//! A compiled [`Stylesheet`](weft_xslt::Stylesheet) is immutable, so any number
//! of runs can share it. `BatchTransformer` fans a list of documents out over
//! rayon's work-stealing pool and returns the results in input order.
//!
//! Without the `rayon-executor` feature the documents are transformed one after
//! another on the calling thread.

use weft_xpath1::TreeFragment;
use weft_xslt::{Transformer, XsltError};

#[cfg(feature = "rayon-executor")]
use rayon::prelude::*;

/// Runs one [`Transformer`] over many documents.
#[derive(Debug, Clone)]
pub struct BatchTransformer {
    transformer: Transformer,
    #[cfg(feature = "rayon-executor")]
    pool: Option<std::sync::Arc<rayon::ThreadPool>>,
}

impl BatchTransformer {
    /// Uses rayon's global pool.
    pub fn new(transformer: Transformer) -> Self {
        Self {
            transformer,
            #[cfg(feature = "rayon-executor")]
            pool: None,
        }
    }

    /// Uses a dedicated pool of `num_threads` threads. If the pool cannot be
    /// created the global pool is used instead.
    #[cfg(feature = "rayon-executor")]
    pub fn with_threads(mut self, num_threads: usize) -> Self {
        match rayon::ThreadPoolBuilder::new().num_threads(num_threads).build() {
            Ok(pool) => {
                log::debug!("batch transformer using a dedicated pool of {} threads", num_threads);
                self.pool = Some(std::sync::Arc::new(pool));
            }
            Err(e) => {
                log::warn!("Failed to build a thread pool: {}. Using the global pool.", e);
            }
        }
        self
    }

    pub fn transformer(&self) -> &Transformer {
        &self.transformer
    }

    /// Number of threads the batch can run on.
    pub fn parallelism(&self) -> usize {
        #[cfg(feature = "rayon-executor")]
        {
            match &self.pool {
                Some(pool) => pool.current_num_threads(),
                None => rayon::current_num_threads(),
            }
        }
        #[cfg(not(feature = "rayon-executor"))]
        {
            1
        }
    }

    /// Transforms every document. The result for `documents[i]` is at index `i`;
    /// a failing document does not affect the others.
    pub fn transform_all<S>(&self, documents: &[S]) -> Vec<Result<TreeFragment, XsltError>>
    where
        S: AsRef<str> + Sync,
    {
        log::debug!(
            "transforming {} document(s) on up to {} thread(s)",
            documents.len(),
            self.parallelism()
        );
        #[cfg(feature = "rayon-executor")]
        {
            let run = || -> Vec<Result<TreeFragment, XsltError>> {
                documents
                    .par_iter()
                    .map(|doc| self.transformer.transform_to_fragment(doc.as_ref()))
                    .collect()
            };
            match &self.pool {
                Some(pool) => pool.install(run),
                None => run(),
            }
        }
        #[cfg(not(feature = "rayon-executor"))]
        {
            documents
                .iter()
                .map(|doc| self.transformer.transform_to_fragment(doc.as_ref()))
                .collect()
        }
    }
}
