//! # Batch Chunker
//!
//! Pure grouping of candidates into bounded, single-kind batches.

use crate::item::{BatchId, CreativeItem, CreativeKind, RunId, UploadBatch};
use crate::{Result, UploadError};
use std::collections::HashSet;
use tracing::{debug, info};

/// Splits candidates into [`UploadBatch`]es of at most `max_batch_size` items
#[derive(Debug, Clone, Copy)]
pub struct BatchChunker {
    max_batch_size: usize,
}

impl BatchChunker {
    /// # Errors
    ///
    /// Returns [`UploadError::InvalidInput`] when `max_batch_size` is zero.
    pub fn new(max_batch_size: usize) -> Result<Self> {
        if max_batch_size == 0 {
            return Err(UploadError::InvalidInput(
                "max_batch_size must be at least 1".to_string(),
            ));
        }
        Ok(Self { max_batch_size })
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Group `items` by kind in upload order, then split each group
    ///
    /// Items keep their relative order inside a kind. Batch sequences start
    /// at 1 and increase across kinds.
    pub fn chunk(&self, run_id: &RunId, items: Vec<CreativeItem>) -> Vec<UploadBatch> {
        let mut batches = Vec::new();
        let mut sequence = 0u32;

        for kind in CreativeKind::UPLOAD_ORDER {
            let group: Vec<CreativeItem> = items
                .iter()
                .filter(|item| item.creative_kind == kind)
                .cloned()
                .collect();

            for chunk in group.chunks(self.max_batch_size) {
                sequence += 1;
                batches.push(UploadBatch {
                    id: BatchId::new(run_id.clone(), sequence),
                    kind,
                    items: chunk.to_vec(),
                });
            }
        }

        debug!(batches = batches.len(), max = self.max_batch_size, "Chunked candidates");
        batches
    }
}

/// Cap every kind at `limit` items, keeping native pairs complete
///
/// When native videos are present, a native image survives only if its
/// `pair_id` belongs to a kept native video; images without a pair id then
/// fill whatever capacity is left. Without native videos the cap is applied
/// as for any other kind.
pub fn apply_kind_limit(items: Vec<CreativeItem>, limit: Option<usize>) -> Vec<CreativeItem> {
    let Some(limit) = limit else {
        return items;
    };

    let kept_pairs: HashSet<String> = items
        .iter()
        .filter(|item| item.creative_kind == CreativeKind::NativeVideo)
        .take(limit)
        .filter_map(|item| item.pair_id.clone())
        .collect();
    let has_native_video = items
        .iter()
        .any(|item| item.creative_kind == CreativeKind::NativeVideo);

    let mut keep = vec![false; items.len()];
    for kind in CreativeKind::UPLOAD_ORDER {
        let indices: Vec<usize> = (0..items.len())
            .filter(|&i| items[i].creative_kind == kind)
            .collect();

        if kind == CreativeKind::NativeImage && has_native_video {
            let paired = indices.iter().copied().filter(|&i| {
                items[i]
                    .pair_id
                    .as_ref()
                    .is_some_and(|pair| kept_pairs.contains(pair))
            });
            let unpaired = indices
                .iter()
                .copied()
                .filter(|&i| items[i].pair_id.is_none());
            for i in paired.chain(unpaired).take(limit) {
                keep[i] = true;
            }
        } else {
            for &i in indices.iter().take(limit) {
                keep[i] = true;
            }
        }
    }

    let before = items.len();
    let limited: Vec<CreativeItem> = items
        .into_iter()
        .zip(keep)
        .filter_map(|(item, kept)| kept.then_some(item))
        .collect();

    if limited.len() < before {
        info!(limit, kept = limited.len(), dropped = before - limited.len(), "Applied per-kind limit");
    }
    limited
}
