//! Backend values used across tests
//!
//! The status catalogue mirrors a typical purchase-invoice circuit:
//! Draft (1), Submitted (3), Approved (7), Archived (9, final).

use chrono::{TimeZone, Utc};
use docflow_core::{
    Action, ActionId, ApprovalHistoryEntry, ApprovalId, ApprovalResponse, CircuitId, DocumentId,
    DocumentSnapshot, StatusId, StatusInfo, StepId, Transition, WorkflowStatus,
};

pub const DRAFT: StatusId = StatusId(1);
pub const SUBMITTED: StatusId = StatusId(3);
pub const APPROVED: StatusId = StatusId(7);
pub const ARCHIVED: StatusId = StatusId(9);

fn catalogue() -> Vec<StatusInfo> {
    [
        (DRAFT, "Draft", false),
        (SUBMITTED, "Submitted", true),
        (APPROVED, "Approved", true),
        (ARCHIVED, "Archived", false),
    ]
    .into_iter()
    .map(|(status_id, title, is_required)| StatusInfo {
        status_id,
        title: title.to_string(),
        is_required,
        is_final: status_id == ARCHIVED,
    })
    .collect()
}

fn title_of(status_id: StatusId) -> Option<String> {
    catalogue()
        .into_iter()
        .find(|s| s.status_id == status_id)
        .map(|s| s.title)
}

/// Status of a document sitting in `current`, every catalogue status reachable
pub fn workflow_status(document_id: i64, current: StatusId) -> WorkflowStatus {
    WorkflowStatus {
        document_id: DocumentId(document_id),
        circuit_id: Some(CircuitId(1)),
        current_step_id: Some(StepId(2)),
        current_step_title: Some("Manager review".to_string()),
        current_status_id: Some(current),
        current_status_title: title_of(current),
        available_statuses: catalogue(),
        available_actions: vec![
            Action {
                action_id: ActionId(1),
                title: "Approve".to_string(),
                description: None,
            },
            Action {
                action_id: ActionId(2),
                title: "Reject".to_string(),
                description: Some("Send back to the requester".to_string()),
            },
        ],
        can_advance: true,
        can_return: true,
        is_circuit_completed: false,
    }
}

/// Document with an optional ERP archival code
pub fn document(document_id: i64, erp_code: Option<&str>) -> DocumentSnapshot {
    DocumentSnapshot {
        id: DocumentId(document_id),
        document_key: Some(format!("INV-{document_id:05}")),
        title: Some(format!("Invoice {document_id}")),
        erp_document_code: erp_code.map(str::to_string),
    }
}

/// `n` fetches without ERP code followed by one carrying `code`
pub fn archived_after(document_id: i64, n: usize, code: &str) -> Vec<DocumentSnapshot> {
    let mut sequence = vec![document(document_id, None); n];
    sequence.push(document(document_id, Some(code)));
    sequence
}

/// Transitions matching the catalogue
pub fn transitions() -> Vec<Transition> {
    catalogue()
        .into_iter()
        .map(|s| Transition {
            status_id: s.status_id,
            title: s.title,
            is_final: s.is_final,
        })
        .collect()
}

/// One approved request
pub fn approval_history() -> Vec<ApprovalHistoryEntry> {
    let requested = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).single().unwrap_or_default();
    let answered = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).single().unwrap_or_default();
    vec![ApprovalHistoryEntry {
        approval_id: ApprovalId(100),
        step_title: "Manager review".to_string(),
        requester: "a.martin".to_string(),
        timestamp: requested,
        status: "Approved".to_string(),
        responses: vec![ApprovalResponse {
            responder: "c.durand".to_string(),
            is_approved: true,
            comments: Some("OK for payment".to_string()),
            responded_at: answered,
        }],
    }]
}
