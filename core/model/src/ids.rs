use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::Display;
use std::str::FromStr;
use uuid::Uuid;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("Negotiation id [{0}] is not a valid uuid.")]
pub struct NegotiationIdParseError(String);

/// Local identifier of a Negotiation record. Never sent to the other party,
/// which addresses us by pid only.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct NegotiationId(Uuid);

impl NegotiationId {
    pub fn generate() -> NegotiationId {
        NegotiationId(Uuid::new_v4())
    }
}

impl FromStr for NegotiationId {
    type Err = NegotiationIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(NegotiationId(
            Uuid::parse_str(s).map_err(|_| NegotiationIdParseError(s.to_string()))?,
        ))
    }
}

impl Display for NegotiationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for NegotiationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for NegotiationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(de::Error::custom)
    }
}

macro_rules! opaque_wire_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn generate() -> $name {
                $name(format!("urn:uuid:{}", Uuid::new_v4()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

opaque_wire_id!(
    Pid,
    "Process id correlating one negotiation between two connectors. Opaque for the \
     receiving side, so any non-blank string sent by the peer is accepted as is."
);
opaque_wire_id!(OfferId, "Offer identifier. Remote ids are arbitrary IRIs.");
opaque_wire_id!(
    AgreementId,
    "Agreement identifier, minted by the provider. The consumer stores it verbatim."
);

impl Pid {
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}
