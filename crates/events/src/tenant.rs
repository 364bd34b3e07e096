use syncgate_core::TenantId;

/// Marker trait for tenant-scoped messages.
///
/// Infrastructure that fans out changes (SSE streams, client feed pumps)
/// uses this to filter messages down to one tenant's authorization boundary
/// without knowing the concrete message type.
pub trait TenantScoped {
    fn tenant_id(&self) -> TenantId;
}
