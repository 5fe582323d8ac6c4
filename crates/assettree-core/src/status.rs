use crate::EnumConversionError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tri-state display status of a tree node, plus `Disabled` for nodes where
/// display does not apply (e.g. a non-spatial view).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VisibilityStatus {
    Visible,
    Hidden,
    Partial,
    Disabled,
}

impl VisibilityStatus {
    pub fn from_visible(visible: bool) -> Self {
        if visible { Self::Visible } else { Self::Hidden }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Visible => "visible",
            Self::Hidden => "hidden",
            Self::Partial => "partial",
            Self::Disabled => "disabled",
        }
    }

    /// Folds child statuses: all visible => visible, all hidden => hidden,
    /// anything else => partial. `Disabled` children are skipped and an empty
    /// input is vacuously visible.
    pub fn aggregate<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = VisibilityStatus>,
    {
        let mut result: Option<VisibilityStatus> = None;
        for status in statuses {
            match (result, status) {
                (_, Self::Disabled) => continue,
                (_, Self::Partial) => return Self::Partial,
                (None, s) => result = Some(s),
                (Some(prev), s) if prev != s => return Self::Partial,
                _ => {}
            }
        }
        result.unwrap_or(Self::Visible)
    }
}

impl fmt::Display for VisibilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-(model, category) display override kept by the rendering surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum CategoryOverride {
    #[default]
    None,
    Show,
    Hide,
}

impl TryFrom<i32> for CategoryOverride {
    type Error = EnumConversionError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CategoryOverride::None),
            1 => Ok(CategoryOverride::Show),
            2 => Ok(CategoryOverride::Hide),
            _ => Err(EnumConversionError::InvalidCategoryOverride(value)),
        }
    }
}
