use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    ReadAnalytics,
    WriteOperation,
    Mixed,
    Greeting,
    Ambiguous,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadAnalytics => "READ_ANALYTICS",
            Self::WriteOperation => "WRITE_OPERATION",
            Self::Mixed => "MIXED",
            Self::Greeting => "GREETING",
            Self::Ambiguous => "AMBIGUOUS",
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Self::WriteOperation | Self::Mixed)
    }
}

impl std::str::FromStr for Intent {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize_label(value).as_str() {
            "READ_ANALYTICS" | "READ" => Ok(Self::ReadAnalytics),
            "WRITE_OPERATION" | "WRITE" => Ok(Self::WriteOperation),
            "MIXED" => Ok(Self::Mixed),
            "GREETING" => Ok(Self::Greeting),
            "AMBIGUOUS" => Ok(Self::Ambiguous),
            other => Err(format!("unknown intent `{other}`")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    RegisterSale,
    RegisterExpense,
    RegisterProduct,
    AddStock,
    RemoveStock,
    MarkSalePaid,
    CancelSale,
    CancelExpense,
    CancelStock,
    CancelLastOperation,
    DeactivateProduct,
    Unknown,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RegisterSale => "REGISTER_SALE",
            Self::RegisterExpense => "REGISTER_EXPENSE",
            Self::RegisterProduct => "REGISTER_PRODUCT",
            Self::AddStock => "ADD_STOCK",
            Self::RemoveStock => "REMOVE_STOCK",
            Self::MarkSalePaid => "MARK_SALE_PAID",
            Self::CancelSale => "CANCEL_SALE",
            Self::CancelExpense => "CANCEL_EXPENSE",
            Self::CancelStock => "CANCEL_STOCK",
            Self::CancelLastOperation => "CANCEL_LAST_OPERATION",
            Self::DeactivateProduct => "DEACTIVATE_PRODUCT",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::str::FromStr for OperationKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize_label(value).as_str() {
            "REGISTER_SALE" => Ok(Self::RegisterSale),
            "REGISTER_EXPENSE" => Ok(Self::RegisterExpense),
            "REGISTER_PRODUCT" => Ok(Self::RegisterProduct),
            "ADD_STOCK" => Ok(Self::AddStock),
            "REMOVE_STOCK" => Ok(Self::RemoveStock),
            "MARK_SALE_PAID" => Ok(Self::MarkSalePaid),
            "CANCEL_SALE" => Ok(Self::CancelSale),
            "CANCEL_EXPENSE" => Ok(Self::CancelExpense),
            "CANCEL_STOCK" | "CANCEL_STOCK_MOVEMENT" => Ok(Self::CancelStock),
            "CANCEL_LAST_OPERATION" => Ok(Self::CancelLastOperation),
            "DEACTIVATE_PRODUCT" => Ok(Self::DeactivateProduct),
            "UNKNOWN" | "" | "NONE" => Ok(Self::Unknown),
            other => Err(format!("unknown operation kind `{other}`")),
        }
    }
}

fn normalize_label(value: &str) -> String {
    value.trim().replace(['-', ' '], "_").to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::{Intent, OperationKind};

    #[test]
    fn labels_parse_case_insensitively() {
        assert_eq!("read_analytics".parse::<Intent>(), Ok(Intent::ReadAnalytics));
        assert_eq!(" Mixed ".parse::<Intent>(), Ok(Intent::Mixed));
        assert_eq!("cancel-last-operation".parse::<OperationKind>(), Ok(OperationKind::CancelLastOperation));
        assert_eq!("".parse::<OperationKind>(), Ok(OperationKind::Unknown));
        assert!("SHOUT".parse::<Intent>().is_err());
    }

    #[test]
    fn labels_round_trip_through_as_str() {
        for intent in [
            Intent::ReadAnalytics,
            Intent::WriteOperation,
            Intent::Mixed,
            Intent::Greeting,
            Intent::Ambiguous,
        ] {
            assert_eq!(intent.as_str().parse::<Intent>(), Ok(intent));
        }
        assert!(Intent::Mixed.is_write());
        assert!(!Intent::ReadAnalytics.is_write());
    }
}
