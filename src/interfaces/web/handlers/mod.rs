pub mod admin;
pub mod insights;
pub mod ranked;
pub mod status;
pub mod tracks;

/// Upper bound applied to every `limit` query parameter.
pub(super) const MAX_LIMIT: usize = 1000;

pub(super) fn clamp_limit(limit: Option<usize>, default: usize) -> usize {
    limit.unwrap_or(default).min(MAX_LIMIT)
}
