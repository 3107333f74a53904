use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Payment gateway kind - the external processor a credential set belongs to.
///
/// This is a closed set: gateway behaviour is resolved once when the owning
/// account is loaded, via `GatewayClientFactory`, not by string dispatch at
/// each call site.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, AsRefStr, Display,
    EnumString,
)]
#[sqlx(type_name = "gateway_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum GatewayKind {
    Stripe,
    Paypal,
}

impl GatewayKind {
    /// Human-readable display name for the gateway
    pub fn display_name(&self) -> &'static str {
        match self {
            GatewayKind::Stripe => "Stripe",
            GatewayKind::Paypal => "PayPal",
        }
    }

    /// All supported gateways
    pub fn all() -> &'static [GatewayKind] {
        &[GatewayKind::Stripe, GatewayKind::Paypal]
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(GatewayKind::from_str("stripe").unwrap(), GatewayKind::Stripe);
        assert_eq!(GatewayKind::from_str("PayPal").unwrap(), GatewayKind::Paypal);
        assert!(GatewayKind::from_str("square").is_err());
    }

    #[test]
    fn serializes_snake_case() {
        assert_eq!(GatewayKind::Paypal.to_string(), "paypal");
        assert_eq!(GatewayKind::Stripe.as_ref(), "stripe");
    }
}
