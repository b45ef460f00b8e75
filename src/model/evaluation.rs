use serde::{Deserialize, Serialize};

/// Why the server (or the client, for defaults) picked a variation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonType {
    Target,
    Rule,
    Default,
    /// Evaluation was synthesized locally because no usable server evaluation was cached.
    Client,
    OffVariation,
    Prerequisite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reason {
    #[serde(rename = "type")]
    pub reason_type: ReasonType,
    #[serde(default)]
    pub rule_id: String,
}

impl Reason {
    pub fn client() -> Reason {
        Reason {
            reason_type: ReasonType::Client,
            rule_id: String::new(),
        }
    }
}

/// One feature's resolved value for the current user, as computed by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub id: String,
    pub feature_id: String,
    pub feature_version: i32,
    pub user_id: String,
    pub variation_id: String,
    #[serde(default)]
    pub variation_name: String,
    /// Raw variation value. Interpreted by [`crate::VariationKind`] on lookup.
    pub variation_value: String,
    pub reason: Reason,
}
