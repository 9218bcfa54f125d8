use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use strum_macros::EnumString;

use crate::ids::{AgreementId, OfferId};

/// ODRL action granted by a permission. Everything we don't know keeps its
/// wire spelling, so the enforcement side can fail closed on it.
#[derive(EnumString, Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Use,
    #[strum(default)]
    Other(String),
}

#[derive(EnumString, Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LeftOperand {
    Count,
    DateTime,
    Purpose,
    Spatial,
    #[strum(default)]
    Other(String),
}

#[derive(EnumString, Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Eq,
    Lt,
    Gt,
    Lteq,
    Gteq,
    #[strum(default)]
    Other(String),
}

macro_rules! wire_enum_strings {
    ($name:ident) => {
        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name::from_str(&s).unwrap_or($name::Other(s))
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> String {
                value.to_string()
            }
        }
    };
}

wire_enum_strings!(Action);
wire_enum_strings!(LeftOperand);
wire_enum_strings!(Operator);

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Use => write!(f, "USE"),
            Action::Other(s) => write!(f, "{}", s),
        }
    }
}

impl fmt::Display for LeftOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeftOperand::Count => write!(f, "COUNT"),
            LeftOperand::DateTime => write!(f, "DATE_TIME"),
            LeftOperand::Purpose => write!(f, "PURPOSE"),
            LeftOperand::Spatial => write!(f, "SPATIAL"),
            LeftOperand::Other(s) => write!(f, "{}", s),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Eq => write!(f, "EQ"),
            Operator::Lt => write!(f, "LT"),
            Operator::Gt => write!(f, "GT"),
            Operator::Lteq => write!(f, "LTEQ"),
            Operator::Gteq => write!(f, "GTEQ"),
            Operator::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Atomic usage condition. The right operand stays a string on the wire;
/// interpretation depends on the left operand.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constraint {
    pub left_operand: LeftOperand,
    pub operator: Operator,
    pub right_operand: String,
}

impl Constraint {
    pub fn new(
        left_operand: LeftOperand,
        operator: Operator,
        right_operand: impl Into<String>,
    ) -> Constraint {
        Constraint {
            left_operand,
            operator,
            right_operand: right_operand.into(),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.left_operand, self.operator, self.right_operand
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub action: Action,
    /// Empty list means the action is granted unconditionally.
    #[serde(default)]
    pub constraint: Vec<Constraint>,
}

impl Permission {
    pub fn new(action: Action, constraint: Vec<Constraint>) -> Permission {
        Permission { action, constraint }
    }
}

/// Usage proposal for a single target dataset. Consumer-supplied offers may
/// omit assigner and assignee. The provider normalizes both on admission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub id: OfferId,
    /// Wire id the offer arrived under, kept when the provider re-mints the id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_id: Option<OfferId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    pub target: String,
    #[serde(default)]
    pub permission: Vec<Permission>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agreement {
    pub id: AgreementId,
    pub assigner: String,
    pub assignee: String,
    pub target: String,
    pub timestamp: DateTime<Utc>,
    pub permission: Vec<Permission>,
}

impl Agreement {
    /// Promotes an accepted Offer to an Agreement. Permissions are carried
    /// over verbatim so both sides enforce exactly what was negotiated.
    pub fn from_offer(
        offer: &Offer,
        assigner: String,
        assignee: String,
        timestamp: DateTime<Utc>,
    ) -> Agreement {
        Agreement {
            id: AgreementId::generate(),
            assigner,
            assignee,
            target: offer.target.clone(),
            timestamp,
            permission: offer.permission.clone(),
        }
    }
}
