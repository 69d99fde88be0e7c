use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(UserRole {
    Patient => "patient",
    Doctor => "doctor",
});

str_enum!(Gender {
    Male => "male",
    Female => "female",
    Other => "other",
});

str_enum!(ReportType {
    Blood => "blood",
    Urine => "urine",
});

str_enum!(ReviewStatus {
    Pending => "pending",
    UnderReview => "under_review",
    Modified => "modified",
    Approved => "approved",
    Rejected => "rejected",
});

str_enum!(Urgency {
    Low => "low",
    Medium => "medium",
    High => "high",
});

str_enum!(RiskLevel {
    Moderate => "moderate",
    High => "high",
});

str_enum!(SuggestionPriority {
    Low => "low",
    Medium => "medium",
    High => "high",
});

impl ReviewStatus {
    /// Approved and rejected recommendations never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn review_status_round_trip() {
        for (variant, s) in [
            (ReviewStatus::Pending, "pending"),
            (ReviewStatus::UnderReview, "under_review"),
            (ReviewStatus::Modified, "modified"),
            (ReviewStatus::Approved, "approved"),
            (ReviewStatus::Rejected, "rejected"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(ReviewStatus::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn serde_uses_database_spelling() {
        let json = serde_json::to_string(&ReviewStatus::UnderReview).unwrap();
        assert_eq!(json, "\"under_review\"");
        let role: UserRole = serde_json::from_str("\"doctor\"").unwrap();
        assert_eq!(role, UserRole::Doctor);
    }

    #[test]
    fn terminal_statuses() {
        assert!(ReviewStatus::Approved.is_terminal());
        assert!(ReviewStatus::Rejected.is_terminal());
        assert!(!ReviewStatus::Modified.is_terminal());
        assert!(!ReviewStatus::Pending.is_terminal());
    }

    #[test]
    fn invalid_enum_returns_error() {
        assert!(UserRole::from_str("admin").is_err());
        assert!(Urgency::from_str("critical").is_err());
        assert!(ReportType::from_str("").is_err());
    }
}
