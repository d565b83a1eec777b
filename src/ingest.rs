//! Ingestion orchestration.
//!
//! Walks one file through the document lifecycle: a placeholder item is
//! created in `processing` state, the processor extracts and enriches, and
//! the item lands in `ready` (or `failed` when extraction was impossible).
//! Each status transition has exactly one writer, so concurrent ingestions
//! never race on the same item.

use tracing::warn;

use crate::error::RagError;
use crate::models::{DocumentFile, ItemKind, ItemStatus, ProcessOptions};
use crate::processor::DocumentProcessor;
use crate::rag::RagService;

/// Parameters for [`ingest_file`].
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub workspace_id: String,
    pub collection_id: Option<String>,
    pub kind: ItemKind,
    /// Display title; defaults to the file name.
    pub title: Option<String>,
    pub options: ProcessOptions,
}

impl IngestRequest {
    pub fn new(workspace_id: &str) -> Self {
        Self {
            workspace_id: workspace_id.to_string(),
            collection_id: None,
            kind: ItemKind::Document,
            title: None,
            options: ProcessOptions::default(),
        }
    }
}

/// Result of one ingestion.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub item_id: String,
    pub status: ItemStatus,
    pub word_count: usize,
}

/// Ingest a single file into a workspace's knowledge base.
///
/// Extraction failure marks the item `failed` and is reported through the
/// outcome status, not as an error; errors are reserved for the stores
/// being unreachable.
pub async fn ingest_file(
    service: &RagService,
    processor: &DocumentProcessor,
    file: &DocumentFile,
    request: &IngestRequest,
) -> Result<IngestOutcome, RagError> {
    let title = request.title.clone().unwrap_or_else(|| file.name.clone());
    let item_id = service
        .begin_ingest(
            &request.workspace_id,
            request.collection_id.clone(),
            request.kind,
            &title,
        )
        .await?;

    match processor.process_document(file, &request.options).await {
        Ok(processed) => {
            service.complete_ingest(&item_id, &processed).await?;
            Ok(IngestOutcome {
                item_id,
                status: ItemStatus::Ready,
                word_count: processed.word_count,
            })
        }
        Err(e) => {
            warn!(item_id = %item_id, file = %file.name, error = %e, "document processing failed");
            service.fail_ingest(&item_id).await?;
            Ok(IngestOutcome {
                item_id,
                status: ItemStatus::Failed,
                word_count: 0,
            })
        }
    }
}
