//! Typed Identifiers

use uuid::Uuid;

/// Tenant ID
pub type TenantId = Uuid;

/// Clone job ID
pub type JobId = Uuid;

/// Domain binding ID
pub type BindingId = Uuid;

/// Template ID
///
/// Templates are named by operators ("TPL-A"), not generated, so this is a
/// string rather than a uuid.
pub type TemplateId = String;
