use assettree_core::VisibilityStatus;

/// Override counts of one scope (category pair, whole model or grouping).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeCounts {
    /// Elements in scope.
    pub total: u64,
    /// In-scope entries of the always-drawn set.
    pub always: u64,
    /// In-scope entries of the never-drawn set.
    pub never: u64,
}

/// Status of a scope from its override counts and the status its elements
/// would have without any element override.
pub fn status_from_override_counts(
    counts: ScopeCounts,
    default_status: VisibilityStatus,
    exclusive: bool,
) -> VisibilityStatus {
    let ScopeCounts {
        total,
        always,
        never,
    } = counts;

    if total > 0 && never >= total {
        return VisibilityStatus::Hidden;
    }
    if total > 0 && always >= total {
        return VisibilityStatus::Visible;
    }
    if exclusive {
        return if always > 0 {
            VisibilityStatus::Partial
        } else {
            VisibilityStatus::Hidden
        };
    }
    match default_status {
        VisibilityStatus::Visible if never == 0 => VisibilityStatus::Visible,
        VisibilityStatus::Hidden if always == 0 => VisibilityStatus::Hidden,
        _ => VisibilityStatus::Partial,
    }
}
