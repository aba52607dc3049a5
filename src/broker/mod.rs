// =============================================================================
// Broker REST client
// =============================================================================

pub mod gmo;

pub use gmo::GmoClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }

    pub fn inverted(self) -> OrderSide {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl From<crate::types::Direction> for OrderSide {
    fn from(d: crate::types::Direction) -> Self {
        match d {
            crate::types::Direction::Buy => OrderSide::Buy,
            crate::types::Direction::Sell => OrderSide::Sell,
        }
    }
}
