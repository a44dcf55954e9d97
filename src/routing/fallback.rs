use crate::types::ProviderKind;

/// Candidate order for one request: the preferred provider (if configured)
/// followed by the remaining providers in configured order.
pub fn candidate_order(preferred: Option<ProviderKind>, configured: &[ProviderKind]) -> Vec<ProviderKind> {
    let mut order = Vec::with_capacity(configured.len());
    if let Some(p) = preferred.filter(|p| configured.contains(p)) {
        order.push(p);
    }
    for kind in configured {
        if !order.contains(kind) {
            order.push(*kind);
        }
    }
    order
}
